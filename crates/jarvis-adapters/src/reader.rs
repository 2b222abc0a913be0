//! Node fan-out reader: every request goes to the whole pool and the first
//! good answer wins.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use alloy::primitives::{Address, Bytes, B256, U128, U256, U64};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use jarvis_core::domain::{join_failures, LogFilter};
use jarvis_core::{
    CallRequest, ChainReader, NodeFailure, PortError, RpcHeader, RpcLog, RpcReceipt,
    RpcTransaction,
};

use crate::rpc::RpcNode;

type Reply<T> = (String, Result<T, PortError>);

/// `value * num / den` in integer space.
pub fn pad(value: u128, num: u128, den: u128) -> u128 {
    value.saturating_mul(num) / den
}

fn block_tag(block: Option<u64>) -> Value {
    match block {
        Some(n) => Value::String(format!("0x{n:x}")),
        None => Value::String("latest".to_owned()),
    }
}

fn decode<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, PortError> {
    serde_json::from_value(value)
        .map_err(|e| PortError::Transport(format!("{method} returned malformed data: {e}")))
}

pub struct FanoutReader {
    nodes: Vec<Arc<dyn RpcNode>>,
    deadline: Duration,
}

impl FanoutReader {
    pub fn new(nodes: Vec<Arc<dyn RpcNode>>, deadline_ms: u64) -> Result<Self, PortError> {
        if nodes.is_empty() {
            return Err(PortError::UserInput(
                "no rpc nodes configured for this network".to_owned(),
            ));
        }
        Ok(Self {
            nodes,
            deadline: Duration::from_millis(deadline_ms),
        })
    }

    fn dispatch<T>(&self, method: &str, params: Value) -> mpsc::Receiver<Reply<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        for node in &self.nodes {
            let node = Arc::clone(node);
            let tx = tx.clone();
            let method = method.to_owned();
            let params = params.clone();
            thread::spawn(move || {
                let result = node
                    .call(&method, params)
                    .and_then(|value| decode::<T>(&method, value));
                // the receiver is gone once another node answered
                let _ = tx.send((node.label().to_owned(), result));
            });
        }
        rx
    }

    /// Collects replies until `accept` takes one or every node answered.
    fn collect<T>(
        &self,
        method: &str,
        rx: mpsc::Receiver<Reply<T>>,
        mut accept: impl FnMut(&str, T) -> Option<T>,
    ) -> (Option<T>, Vec<NodeFailure>) {
        let started = Instant::now();
        let mut failures = Vec::new();
        let mut answered = 0usize;
        while answered < self.nodes.len() {
            let remaining = self.deadline.saturating_sub(started.elapsed());
            let (label, result) = match rx.recv_timeout(remaining) {
                Ok(reply) => reply,
                Err(_) => break,
            };
            answered += 1;
            match result {
                Ok(value) => {
                    if let Some(found) = accept(&label, value) {
                        return (Some(found), failures);
                    }
                }
                Err(e) => {
                    warn!(node = %label, method, error = %e, "node request failed");
                    failures.push(NodeFailure {
                        label,
                        message: e.to_string(),
                    });
                }
            }
        }
        let silent = self.nodes.len() - answered;
        if silent > 0 {
            failures.push(NodeFailure {
                label: format!("{silent} node(s)"),
                message: format!("no answer within {} ms", self.deadline.as_millis()),
            });
        }
        (None, failures)
    }

    fn request<T>(&self, method: &str, params: Value) -> Result<T, PortError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let rx = self.dispatch::<T>(method, params);
        let (found, failures) = self.collect(method, rx, |label, value| {
            debug!(node = %label, method, "first answer");
            Some(value)
        });
        if let Some(value) = found {
            if !failures.is_empty() {
                info!(method, failed = failures.len(), "answer served after node failover");
            }
            return Ok(value);
        }
        Err(PortError::Node(format!(
            "{method}: {}",
            join_failures(&failures)
        )))
    }

    /// Like `request`, but a `null` answer only wins when no node knows better.
    fn request_found<T>(&self, method: &str, params: Value) -> Result<Option<T>, PortError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let rx = self.dispatch::<Option<T>>(method, params);
        let mut saw_null = false;
        let (found, failures) = self.collect(method, rx, |_, value| match value {
            Some(v) => Some(Some(v)),
            None => {
                saw_null = true;
                None
            }
        });
        match found {
            Some(value) => Ok(value),
            None if saw_null => Ok(None),
            None => Err(PortError::Node(format!(
                "{method}: {}",
                join_failures(&failures)
            ))),
        }
    }
}

impl ChainReader for FanoutReader {
    fn get_code(&self, address: Address) -> Result<Bytes, PortError> {
        self.request("eth_getCode", json!([address, "latest"]))
    }

    fn get_balance(&self, address: Address) -> Result<U256, PortError> {
        self.request("eth_getBalance", json!([address, "latest"]))
    }

    fn get_mined_nonce(&self, address: Address) -> Result<u64, PortError> {
        let n: U64 = self.request("eth_getTransactionCount", json!([address, "latest"]))?;
        Ok(n.to::<u64>())
    }

    fn get_pending_nonce(&self, address: Address) -> Result<u64, PortError> {
        let n: U64 = self.request("eth_getTransactionCount", json!([address, "pending"]))?;
        Ok(n.to::<u64>())
    }

    fn transaction_by_hash(&self, hash: B256) -> Result<Option<RpcTransaction>, PortError> {
        self.request_found("eth_getTransactionByHash", json!([hash]))
    }

    fn transaction_receipt(&self, hash: B256) -> Result<Option<RpcReceipt>, PortError> {
        self.request_found("eth_getTransactionReceipt", json!([hash]))
    }

    fn header_by_number(&self, number: Option<u64>) -> Result<RpcHeader, PortError> {
        self.request_found("eth_getBlockByNumber", json!([block_tag(number), false]))?
            .ok_or_else(|| PortError::NotFound(format!("block {number:?}")))
    }

    fn estimate_gas(&self, call: &CallRequest) -> Result<u64, PortError> {
        let gas: U64 = self.request("eth_estimateGas", json!([call]))?;
        Ok(gas.to::<u64>())
    }

    fn suggest_gas_price(&self) -> Result<u128, PortError> {
        let price: U128 = self.request("eth_gasPrice", json!([]))?;
        Ok(pad(price.to::<u128>(), 3, 2))
    }

    fn suggest_gas_tip(&self) -> Result<u128, PortError> {
        let tip: U128 = self.request("eth_maxPriorityFeePerGas", json!([]))?;
        Ok(pad(tip.to::<u128>(), 6, 5))
    }

    fn call_contract(&self, call: &CallRequest, block: Option<u64>) -> Result<Bytes, PortError> {
        self.request("eth_call", json!([call, block_tag(block)]))
    }

    fn storage_at(&self, address: Address, slot: B256) -> Result<B256, PortError> {
        self.request("eth_getStorageAt", json!([address, slot, "latest"]))
    }

    fn filter_logs(&self, filter: &LogFilter) -> Result<Vec<RpcLog>, PortError> {
        self.request("eth_getLogs", json!([filter]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_is_integer_math() {
        assert_eq!(pad(20_000_000_000, 3, 2), 30_000_000_000);
        assert_eq!(pad(1_000_000_001, 6, 5), 1_200_000_001);
        assert_eq!(pad(u128::MAX, 3, 2), u128::MAX / 2);
    }

    #[test]
    fn block_tags() {
        assert_eq!(block_tag(None), json!("latest"));
        assert_eq!(block_tag(Some(255)), json!("0xff"));
    }
}
