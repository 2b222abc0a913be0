//! Upgradeable proxy detection through well-known storage slots.

use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use tracing::debug;

use crate::abis::IMPLEMENTATION_SELECTOR;
use crate::domain::CallRequest;
use crate::ports::{ChainReader, PortError};

/// `keccak256(label)`, minus one when `minus_one` is set (EIP-1967 style).
pub fn storage_slot(label: &str, minus_one: bool) -> B256 {
    let hash = keccak256(label.as_bytes());
    if minus_one {
        B256::from(
            U256::from_be_bytes(hash.0)
                .wrapping_sub(U256::from(1u8))
                .to_be_bytes::<32>(),
        )
    } else {
        hash
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotKind {
    Implementation,
    Beacon,
}

fn probe_slots() -> [(&'static str, B256, SlotKind); 4] {
    [
        (
            "eip1967.implementation",
            storage_slot("eip1967.proxy.implementation", true),
            SlotKind::Implementation,
        ),
        (
            "eip1967.beacon",
            storage_slot("eip1967.proxy.beacon", true),
            SlotKind::Beacon,
        ),
        (
            "zeppelinos",
            storage_slot("org.zeppelinos.proxy.implementation", false),
            SlotKind::Implementation,
        ),
        (
            "matic",
            storage_slot("matic.network.proxy.implementation", true),
            SlotKind::Implementation,
        ),
    ]
}

fn word_to_address(word: B256) -> Option<Address> {
    let addr = Address::from_word(word);
    (!addr.is_zero()).then_some(addr)
}

/// First non-zero implementation found in the probed slots; `None` for a
/// plain contract. Never returns the zero address.
pub fn implementation_of(
    reader: &dyn ChainReader,
    address: Address,
) -> Result<Option<Address>, PortError> {
    for (name, slot, kind) in probe_slots() {
        let Some(found) = word_to_address(reader.storage_at(address, slot)?) else {
            continue;
        };
        let implementation = match kind {
            SlotKind::Implementation => Some(found),
            SlotKind::Beacon => beacon_implementation(reader, found)?,
        };
        if let Some(implementation) = implementation {
            debug!(%address, %implementation, slot = name, "proxy detected");
            return Ok(Some(implementation));
        }
    }
    Ok(None)
}

fn beacon_implementation(
    reader: &dyn ChainReader,
    beacon: Address,
) -> Result<Option<Address>, PortError> {
    let call = CallRequest {
        to: Some(beacon),
        data: Some(Bytes::copy_from_slice(&IMPLEMENTATION_SELECTOR)),
        ..Default::default()
    };
    let out = reader.call_contract(&call, None)?;
    if out.len() < 32 {
        return Ok(None);
    }
    Ok(word_to_address(B256::from_slice(&out[..32])))
}
