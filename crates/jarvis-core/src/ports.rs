use alloy::json_abi::JsonAbi;
use alloy::primitives::{Address, Bytes, B256, U256};
use thiserror::Error;

use crate::domain::{
    AccountDescriptor, AddressMatch, BroadcastOutcome, CallRequest, LogFilter, Network,
    RpcHeader, RpcLog, RpcReceipt, RpcTransaction,
};
use crate::domain::FunctionCall;
use crate::state_machine::StateTransition;
use crate::tx::{SignedTx, UnsignedTx};

#[derive(Debug, Error)]
pub enum PortError {
    #[error("invalid input: {0}")]
    UserInput(String),
    #[error("all nodes failed: {0}")]
    Node(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("execution reverted: {0}")]
    Reverted(String),
    #[error("transaction lost: {0}")]
    Lost(String),
    #[error("explorer error: {0}")]
    Explorer(String),
    #[error("cache error: {0}")]
    Cache(String),
    #[error("signer unavailable: {0}")]
    SignerUnavailable(String),
    #[error("aborted: {0}")]
    Aborted(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl PortError {
    pub fn exit_code(&self) -> i32 {
        match self {
            PortError::UserInput(_) | PortError::Aborted(_) | PortError::NotFound(_) => 1,
            PortError::SignerUnavailable(_) => 126,
            _ => 2,
        }
    }
}

pub trait ChainReader: Send + Sync {
    fn get_code(&self, address: Address) -> Result<Bytes, PortError>;
    fn get_balance(&self, address: Address) -> Result<U256, PortError>;
    fn get_mined_nonce(&self, address: Address) -> Result<u64, PortError>;
    fn get_pending_nonce(&self, address: Address) -> Result<u64, PortError>;
    fn transaction_by_hash(&self, hash: B256) -> Result<Option<RpcTransaction>, PortError>;
    fn transaction_receipt(&self, hash: B256) -> Result<Option<RpcReceipt>, PortError>;
    /// `None` means the latest block.
    fn header_by_number(&self, number: Option<u64>) -> Result<RpcHeader, PortError>;
    fn estimate_gas(&self, call: &CallRequest) -> Result<u64, PortError>;
    /// Node gas price padded by 1.5x, in wei.
    fn suggest_gas_price(&self) -> Result<u128, PortError>;
    /// Node priority fee padded by 1.2x, in wei.
    fn suggest_gas_tip(&self) -> Result<u128, PortError>;
    fn call_contract(&self, call: &CallRequest, block: Option<u64>) -> Result<Bytes, PortError>;
    fn storage_at(&self, address: Address, slot: B256) -> Result<B256, PortError>;
    fn filter_logs(&self, filter: &LogFilter) -> Result<Vec<RpcLog>, PortError>;
}

pub trait TxBroadcaster: Send + Sync {
    fn broadcast(&self, raw: &Bytes) -> BroadcastOutcome;
}

/// Persistent key/value store. Keys are case-insensitive.
pub trait KvCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    fn set_bool(&self, key: &str, value: bool) {
        self.set(key, &value.to_string());
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    fn set_i64(&self, key: &str, value: i64) {
        self.set(key, &value.to_string());
    }
}

pub fn cache_key(address: Address, namespace: &str) -> String {
    format!("{}_{}", address, namespace).to_lowercase()
}

pub trait ExplorerPort: Send + Sync {
    fn fetch_abi(&self, address: Address) -> Result<String, PortError>;
}

pub trait AddressResolver: Send + Sync {
    /// Single best match for a free-form query.
    fn resolve(&self, input: &str) -> Result<(Address, String), PortError>;
    fn search(&self, input: &str) -> Vec<AddressMatch>;
    fn describe(&self, address: Address) -> Option<String>;
}

/// ABI and token metadata for addresses on one chain.
pub trait AbiProvider: Send + Sync {
    /// ABI used to talk to `address`; for proxies this is the implementation's ABI.
    fn get_abi(&self, address: Address) -> Result<JsonAbi, PortError>;
    fn is_erc20(&self, address: Address) -> Result<bool, PortError>;
    fn decimals(&self, address: Address) -> Result<u64, PortError>;
    fn symbol(&self, address: Address) -> Result<String, PortError>;

    fn token_info(&self, address: Address) -> Result<(u64, String), PortError> {
        Ok((self.decimals(address)?, self.symbol(address)?))
    }
}

pub trait WalletSigner: Send + Sync {
    fn address(&self) -> Address;
    fn sign_tx(&self, tx: UnsignedTx) -> Result<SignedTx, PortError>;
}

/// Unlocks wallets on first use (passphrase prompt or device handshake).
pub trait SignerFactory: Send + Sync {
    fn unlock(
        &self,
        account: &AccountDescriptor,
    ) -> Result<std::sync::Arc<dyn WalletSigner>, PortError>;
}

pub trait ChainBackend: Send + Sync {
    fn reader(&self, network: &Network) -> Result<std::sync::Arc<dyn ChainReader>, PortError>;
    fn broadcaster(
        &self,
        network: &Network,
    ) -> Result<std::sync::Arc<dyn TxBroadcaster>, PortError>;
    fn abi_provider(
        &self,
        network: &Network,
        reader: std::sync::Arc<dyn ChainReader>,
    ) -> Result<std::sync::Arc<dyn AbiProvider>, PortError>;
}

/// Operator interaction. Blocking, no timeout.
pub trait Prompter: Send + Sync {
    fn confirm(&self, message: &str) -> Result<bool, PortError>;
    fn input(&self, message: &str) -> Result<String, PortError>;
    fn secret(&self, message: &str) -> Result<String, PortError>;
    fn select(&self, message: &str, options: &[String]) -> Result<usize, PortError>;
}

pub trait ClockPort: Send + Sync {
    fn now_ms(&self) -> Result<u64, PortError>;
    fn sleep_ms(&self, ms: u64);
}

/// Receives progress of an action as it happens, before the outcome exists.
pub trait ActionObserver: Send + Sync {
    fn transition(&self, _transition: &StateTransition) {}
    fn preview(&self, _tx: &UnsignedTx, _call: &FunctionCall) {}
    fn note(&self, _message: &str) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ActionObserver for NoopObserver {}
