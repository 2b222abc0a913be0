mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use jarvis_core::ports::cache_key;
use jarvis_core::{AbiProvider, KvCache, MetadataService, PortError};

use common::{network, Harness, LocalKeySigner};

#[test]
fn gas_settings_are_cached_for_the_ttl() {
    let h = Harness::new();
    let net = network();

    let first = h.context.gas_setting(&net).expect("gas");
    assert!(first.dynamic_fee);
    assert_eq!(first.suggested_tip, 2_000_000_000);
    h.clock.advance(59_000);
    let second = h.context.gas_setting(&net).expect("gas");
    assert_eq!(first, second);
    assert_eq!(h.reader.gas_price_queries.load(Ordering::SeqCst), 1);

    h.clock.advance(2_000);
    let third = h.context.gas_setting(&net).expect("gas");
    assert_eq!(h.reader.gas_price_queries.load(Ordering::SeqCst), 2);
    assert!(third.sampled_at_ms > first.sampled_at_ms);
}

#[test]
fn legacy_chain_skips_tip_query() {
    let h = Harness::new();
    h.reader.with(|s| s.base_fee = 0);
    let gas = h.context.gas_setting(&network()).expect("gas");
    assert!(!gas.dynamic_fee);
    assert_eq!(gas.suggested_tip, 0);
}

#[test]
fn pending_nonce_never_moves_backwards() {
    let h = Harness::new();
    let net = network();
    assert_eq!(h.context.nonce(h.alice.address, &net).expect("nonce"), 5);

    h.context
        .set_pending_nonce(h.alice.address, net.chain_id, 8)
        .expect("advance");
    h.context
        .set_pending_nonce(h.alice.address, net.chain_id, 6)
        .expect("stale update");
    assert_eq!(
        h.context.pending_nonce(h.alice.address, net.chain_id).expect("read"),
        Some(8)
    );
    assert_eq!(h.context.nonce(h.alice.address, &net).expect("nonce"), 8);
    assert_eq!(h.reader.nonce_queries.load(Ordering::SeqCst), 1);
}

#[test]
fn abnormal_node_nonces_are_rejected() {
    let h = Harness::new();
    h.reader.with(|s| {
        s.nonces.insert(h.alice.address, (9, 7));
    });
    let err = h
        .context
        .nonce(h.alice.address, &network())
        .expect_err("mined above pending");
    assert!(matches!(err, PortError::Validation(_)));
}

#[test]
fn signer_is_unlocked_once() {
    let h = Harness::new();
    let first = h.context.signer(&h.alice).expect("unlock");
    let second = h.context.signer(&h.alice).expect("cached");
    assert_eq!(first.address(), second.address());
    assert_eq!(h.signers.unlocks.load(Ordering::SeqCst), 1);
}

#[test]
fn unlocked_wallet_must_match_account() {
    let h = Harness::new();
    h.signers
        .insert(h.alice.address, Arc::new(LocalKeySigner::from_seed(0x22)));
    let err = h
        .context
        .signer(&h.alice)
        .err()
        .expect("wrong key behind the account");
    assert!(err.to_string().contains("does not match account"));
}

#[test]
fn abi_is_fetched_once_and_cached() {
    let h = Harness::new();
    let service = MetadataService::new(h.reader.clone(), h.explorer.clone(), h.cache.clone());

    let abi = service.get_abi(h.staking).expect("abi");
    assert!(abi.function("stake").is_some());
    service.get_abi(h.staking).expect("cached abi");
    assert_eq!(h.explorer.calls.load(Ordering::SeqCst), 1);
    assert!(h.cache.get(&cache_key(h.staking, "abi")).is_some());
}

#[test]
fn token_metadata_is_cached() {
    let h = Harness::new();
    let service = MetadataService::new(h.reader.clone(), h.explorer.clone(), h.cache.clone());

    assert!(service.is_erc20(h.knc).expect("erc20 check"));
    assert!(!service.is_erc20(h.staking).expect("erc20 check"));
    assert_eq!(service.token_info(h.knc).expect("info"), (18, "KNC".to_owned()));
    assert_eq!(h.cache.get_bool(&cache_key(h.staking, "isERC20")), Some(false));
    assert_eq!(h.cache.get_i64(&cache_key(h.knc, "decimal")), Some(18));
}

#[test]
fn unverified_contract_reports_explorer_error() {
    let h = Harness::new();
    let service = MetadataService::new(h.reader.clone(), h.explorer.clone(), h.cache.clone());
    let err = service
        .get_abi(common::addr(0x01))
        .expect_err("nothing verified");
    assert!(matches!(err, PortError::Explorer(_)));
}

#[test]
fn oversized_decimals_and_bytes32_symbols() {
    use alloy::dyn_abi::DynSolValue;
    use alloy::primitives::{B256, U256};

    let h = Harness::new();
    let odd = common::addr(0x77);
    let mkr = common::addr(0x78);
    let mut mkr_word = [0u8; 32];
    mkr_word[..3].copy_from_slice(b"MKR");
    h.reader.with(|s| {
        s.calls.insert(
            (odd, [0x31, 0x3c, 0xe5, 0x67]),
            common::encode_ret(vec![DynSolValue::Uint(U256::from(300u64), 256)]),
        );
        s.calls.insert(
            (mkr, [0x95, 0xd8, 0x9b, 0x41]),
            common::encode_ret(vec![DynSolValue::FixedBytes(B256::from(mkr_word), 32)]),
        );
    });
    let service = MetadataService::new(h.reader.clone(), h.explorer.clone(), h.cache.clone());

    let err = service.decimals(odd).expect_err("300 decimals");
    assert!(matches!(err, PortError::Validation(_)), "{err}");
    assert!(h.cache.get_i64(&cache_key(odd, "decimal")).is_none());
    assert_eq!(service.symbol(mkr).expect("bytes32 symbol"), "MKR");
}
