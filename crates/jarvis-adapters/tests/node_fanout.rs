mod common;

use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256};
use serde_json::json;

use common::{spawn_rpc_node, Reply};
use jarvis_adapters::{FanoutBroadcaster, FanoutReader, HttpNode, RpcNode};
use jarvis_core::{ChainReader, PortError, TxBroadcaster};

fn node(label: &str, url: &str) -> Arc<dyn RpcNode> {
    Arc::new(HttpNode::new(label, url, 2_000).expect("http node"))
}

#[test]
fn reader_fails_over_past_a_broken_node() {
    let (broken, _) = spawn_rpc_node(|_, _| Reply::Http(500));
    let (healthy, seen) = spawn_rpc_node(|method, _| match method {
        "eth_getTransactionCount" => Reply::Result(json!("0x5")),
        _ => Reply::Http(404),
    });
    let reader =
        FanoutReader::new(vec![node("broken", &broken), node("healthy", &healthy)], 2_000)
            .expect("reader");

    let nonce = reader
        .get_pending_nonce(Address::repeat_byte(0x01))
        .expect("nonce from healthy node");
    assert_eq!(nonce, 5);
    assert_eq!(
        seen.lock().expect("seen lock").as_slice(),
        ["eth_getTransactionCount"]
    );
}

#[test]
fn reader_reports_every_node_when_all_fail() {
    let (a, _) = spawn_rpc_node(|_, _| Reply::Http(502));
    let (b, _) = spawn_rpc_node(|_, _| {
        Reply::Error(json!({"code": -32000, "message": "header not found"}))
    });
    let reader = FanoutReader::new(vec![node("primary", &a), node("backup", &b)], 2_000)
        .expect("reader");

    let err = reader
        .header_by_number(None)
        .expect_err("no node can answer");
    let PortError::Node(message) = err else {
        panic!("expected node error, got {err:?}");
    };
    assert!(message.contains("primary"), "{message}");
    assert!(message.contains("backup"), "{message}");
    assert!(message.contains("header not found"), "{message}");
}

#[test]
fn receipt_lookup_prefers_a_node_that_knows_the_transaction() {
    let hash = B256::repeat_byte(0xab);
    let (lagging, _) = spawn_rpc_node(|_, _| Reply::Result(json!(null)));
    let (synced, _) = spawn_rpc_node(move |_, _| {
        Reply::Result(json!({
            "transactionHash": hash,
            "status": "0x1",
            "blockNumber": "0x10",
            "gasUsed": "0x5208",
            "logs": []
        }))
    });
    let reader = FanoutReader::new(vec![node("lagging", &lagging), node("synced", &synced)], 2_000)
        .expect("reader");

    let receipt = reader
        .transaction_receipt(hash)
        .expect("lookup")
        .expect("synced node has the receipt");
    assert!(receipt.succeeded());
    assert_eq!(receipt.gas_used.to::<u64>(), 21_000);
}

#[test]
fn unknown_transaction_is_none_not_an_error() {
    let (a, _) = spawn_rpc_node(|_, _| Reply::Result(json!(null)));
    let reader = FanoutReader::new(vec![node("a", &a)], 2_000).expect("reader");
    let found = reader
        .transaction_by_hash(B256::repeat_byte(0x01))
        .expect("lookup");
    assert!(found.is_none());
}

#[test]
fn suggested_gas_price_is_padded() {
    let (a, _) = spawn_rpc_node(|method, _| match method {
        "eth_gasPrice" => Reply::Result(json!("0x64")),
        _ => Reply::Http(404),
    });
    let reader = FanoutReader::new(vec![node("a", &a)], 2_000).expect("reader");
    assert_eq!(reader.suggest_gas_price().expect("gas price"), 150);
}

#[test]
fn call_revert_keeps_revert_data() {
    let (a, _) = spawn_rpc_node(|_, _| {
        Reply::Error(json!({"code": 3, "message": "execution reverted", "data": "0x08c379a0"}))
    });
    let reader = FanoutReader::new(vec![node("a", &a)], 2_000).expect("reader");
    let err = reader
        .call_contract(&Default::default(), None)
        .expect_err("reverted");
    assert!(err.to_string().contains("data=0x08c379a0"), "{err}");
}

#[test]
fn broadcast_rejected_everywhere_is_not_accepted() {
    let reject = |_: &str, _: &serde_json::Value| {
        Reply::Error(json!({"code": -32000, "message": "nonce too low"}))
    };
    let (a, _) = spawn_rpc_node(reject);
    let (b, _) = spawn_rpc_node(reject);
    let broadcaster = FanoutBroadcaster::new(vec![node("a", &a), node("b", &b)], 2_000)
        .expect("broadcaster");

    let raw = Bytes::from(vec![0x02, 0xf8, 0x01]);
    let outcome = broadcaster.broadcast(&raw);
    assert!(!outcome.accepted);
    assert_eq!(outcome.errors.len(), 2);
    assert!(outcome.errors.iter().all(|e| e.message.contains("nonce too low")));
    assert_eq!(outcome.tx_hash, alloy::primitives::keccak256(&raw));
}

#[test]
fn already_known_counts_as_accepted() {
    let (a, _) = spawn_rpc_node(|_, _| {
        Reply::Error(json!({"code": -32000, "message": "already known"}))
    });
    let (b, _) = spawn_rpc_node(|_, _| Reply::Http(503));
    let broadcaster = FanoutBroadcaster::new(vec![node("a", &a), node("b", &b)], 2_000)
        .expect("broadcaster");

    let outcome = broadcaster.broadcast(&Bytes::from(vec![0x01]));
    assert!(outcome.accepted);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].label, "b");
}

#[test]
fn empty_node_pool_is_rejected() {
    assert!(FanoutReader::new(Vec::new(), 1_000).is_err());
    assert!(FanoutBroadcaster::new(Vec::new(), 1_000).is_err());
}
