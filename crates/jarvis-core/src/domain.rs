use std::collections::BTreeMap;
use std::path::PathBuf;

use alloy::primitives::{Address, Bytes, B256, U128, U256, U64};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    #[serde(default)]
    pub alternative_names: Vec<String>,
    pub chain_id: u64,
    pub native_token_symbol: String,
    pub native_token_decimal: u64,
    /// Expected block time in seconds.
    pub block_time: u64,
    #[serde(default)]
    pub node_variable_name: String,
    #[serde(default)]
    pub default_nodes: BTreeMap<String, String>,
    #[serde(default)]
    pub block_explorer_api_key_variable_name: String,
    #[serde(default)]
    pub block_explorer_api_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_call_contract_address: Option<Address>,
}

impl Network {
    pub fn matches(&self, name: &str) -> bool {
        let name = name.trim();
        self.name.eq_ignore_ascii_case(name)
            || self
                .alternative_names
                .iter()
                .any(|alt| alt.eq_ignore_ascii_case(name))
    }

    /// Effective node map. A non-empty comma separated override replaces the
    /// default nodes entirely.
    pub fn node_map(&self, env_override: Option<&str>) -> BTreeMap<String, String> {
        if let Some(raw) = env_override {
            let urls: Vec<&str> = raw
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .collect();
            if !urls.is_empty() {
                return urls
                    .into_iter()
                    .enumerate()
                    .map(|(i, url)| (format!("env-{i}"), url.to_owned()))
                    .collect();
            }
        }
        self.default_nodes.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountKind {
    Keystore,
    Ledger,
    LedgerLive,
    Trezor,
}

impl AccountKind {
    pub fn is_hardware(&self) -> bool {
        !matches!(self, AccountKind::Keystore)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDescriptor {
    pub address: Address,
    pub kind: AccountKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keypath: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derpath: Option<String>,
    #[serde(default)]
    pub desc: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBookEntry {
    pub address: Address,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressMatch {
    pub address: Address,
    pub description: String,
    pub score: f64,
}

// --- Decoded call tree ---

/// Decoded function call; `inner_calls` is non-empty only for recognized
/// multisig wrappers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionCall {
    pub destination: Address,
    pub destination_desc: String,
    pub value: U256,
    pub value_display: String,
    pub method: String,
    pub params: Vec<DecodedParam>,
    pub inner_calls: Vec<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedParam {
    pub name: String,
    pub ty: String,
    pub value: ParamValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    Scalar(String),
    Tuple(Vec<DecodedParam>),
    Array(Vec<ParamValue>),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedLog {
    pub address: Address,
    pub address_desc: String,
    pub event: String,
    pub params: Vec<DecodedParam>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// --- Transactions ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Done,
    Reverted,
    NotFound,
    Lost,
    Error,
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Done | TxStatus::Reverted | TxStatus::Lost)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TxInfo {
    pub status: TxStatus,
    pub tx: Option<RpcTransaction>,
    pub receipt: Option<RpcReceipt>,
    pub header: Option<RpcHeader>,
}

/// Cached gas settings for one chain, in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasInfo {
    pub max_fee_per_gas: u128,
    pub suggested_tip: u128,
    pub base_fee: u128,
    pub dynamic_fee: bool,
    pub sampled_at_ms: u64,
}

// --- JSON-RPC payloads ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    pub hash: B256,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    pub nonce: U64,
    pub value: U256,
    pub input: Bytes,
    pub gas: U64,
    #[serde(default)]
    pub gas_price: Option<U128>,
    #[serde(default)]
    pub max_fee_per_gas: Option<U128>,
    #[serde(default)]
    pub max_priority_fee_per_gas: Option<U128>,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default, rename = "type")]
    pub tx_type: Option<U64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
    pub transaction_hash: B256,
    #[serde(default)]
    pub status: Option<U64>,
    #[serde(default)]
    pub block_number: Option<U64>,
    pub gas_used: U64,
    #[serde(default)]
    pub effective_gas_price: Option<U128>,
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(default)]
    pub logs: Vec<RpcLog>,
}

impl RpcReceipt {
    pub fn succeeded(&self) -> bool {
        self.status.map(|s| s.to::<u64>() == 1).unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    #[serde(default)]
    pub log_index: Option<U64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcHeader {
    pub number: U64,
    #[serde(default)]
    pub hash: Option<B256>,
    #[serde(default)]
    pub base_fee_per_gas: Option<U128>,
    pub timestamp: U64,
}

impl RpcHeader {
    pub fn base_fee(&self) -> u128 {
        self.base_fee_per_gas.map(|b| b.to::<u128>()).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub address: Vec<Address>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<Option<B256>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_block: Option<U64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_block: Option<U64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeFailure {
    pub label: String,
    pub message: String,
}

pub fn join_failures(failures: &[NodeFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.label, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BroadcastOutcome {
    pub tx_hash: B256,
    pub accepted: bool,
    pub errors: Vec<NodeFailure>,
}
