//! Unsigned/signed transaction values and their consensus encoding.

use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{keccak256, Address, Bytes, PrimitiveSignature, TxKind, B256, U256};
use serde::Serialize;

use crate::ports::PortError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeeMode {
    Legacy {
        gas_price: u128,
    },
    Dynamic {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
}

impl FeeMode {
    /// Upper bound of the per-gas price the sender may pay.
    pub fn max_price(&self) -> u128 {
        match self {
            FeeMode::Legacy { gas_price } => *gas_price,
            FeeMode::Dynamic {
                max_fee_per_gas, ..
            } => *max_fee_per_gas,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnsignedTx {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_limit: u64,
    /// `None` deploys a contract.
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub fees: FeeMode,
}

impl UnsignedTx {
    pub fn is_dynamic(&self) -> bool {
        matches!(self.fees, FeeMode::Dynamic { .. })
    }

    pub fn max_gas_cost(&self) -> U256 {
        U256::from(self.gas_limit) * U256::from(self.fees.max_price())
    }

    pub fn to_typed(&self) -> TypedUnsigned {
        let to = match self.to {
            Some(addr) => TxKind::Call(addr),
            None => TxKind::Create,
        };
        match self.fees {
            FeeMode::Legacy { gas_price } => TypedUnsigned::Legacy(TxLegacy {
                chain_id: Some(self.chain_id),
                nonce: self.nonce,
                gas_price,
                gas_limit: self.gas_limit,
                to,
                value: self.value,
                input: self.data.clone(),
            }),
            FeeMode::Dynamic {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => TypedUnsigned::Eip1559(TxEip1559 {
                chain_id: self.chain_id,
                nonce: self.nonce,
                gas_limit: self.gas_limit,
                max_fee_per_gas,
                max_priority_fee_per_gas,
                to,
                value: self.value,
                input: self.data.clone(),
                ..Default::default()
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub enum TypedUnsigned {
    Legacy(TxLegacy),
    Eip1559(TxEip1559),
}

impl TypedUnsigned {
    pub fn as_signable(&mut self) -> &mut dyn SignableTransaction<PrimitiveSignature> {
        match self {
            TypedUnsigned::Legacy(tx) => tx,
            TypedUnsigned::Eip1559(tx) => tx,
        }
    }

    pub fn signature_hash(&self) -> B256 {
        match self {
            TypedUnsigned::Legacy(tx) => tx.signature_hash(),
            TypedUnsigned::Eip1559(tx) => tx.signature_hash(),
        }
    }

    fn into_envelope(self, signature: PrimitiveSignature) -> TxEnvelope {
        match self {
            TypedUnsigned::Legacy(tx) => TxEnvelope::from(tx.into_signed(signature)),
            TypedUnsigned::Eip1559(tx) => TxEnvelope::from(tx.into_signed(signature)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedTx {
    pub tx: UnsignedTx,
    pub raw: Bytes,
    pub hash: B256,
    pub signer: Address,
}

/// Attaches a signature, serializes per EIP-2718 and recovers the sender.
pub fn assemble_signed(
    tx: UnsignedTx,
    typed: TypedUnsigned,
    signature: PrimitiveSignature,
) -> Result<SignedTx, PortError> {
    let prehash = typed.signature_hash();
    let signer = signature
        .recover_address_from_prehash(&prehash)
        .map_err(|e| PortError::Validation(format!("signature recovery failed: {e}")))?;
    let envelope = typed.into_envelope(signature);
    let raw = Bytes::from(envelope.encoded_2718());
    let hash = keccak256(&raw);
    Ok(SignedTx {
        tx,
        raw,
        hash,
        signer,
    })
}

pub fn create_address(from: Address, nonce: u64) -> Address {
    from.create(nonce)
}
