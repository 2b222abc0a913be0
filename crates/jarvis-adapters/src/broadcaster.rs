use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use alloy::primitives::{keccak256, Bytes};
use serde_json::json;
use tracing::{info, warn};

use jarvis_core::{BroadcastOutcome, NodeFailure, PortError, TxBroadcaster};

use crate::rpc::RpcNode;

/// Sends raw transactions to every node of the pool.
pub struct FanoutBroadcaster {
    nodes: Vec<Arc<dyn RpcNode>>,
    deadline: Duration,
}

impl FanoutBroadcaster {
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
}

fn already_known(err: &PortError) -> bool {
    let msg = err.to_string().to_lowercase();
    msg.contains("already known") || msg.contains("known transaction")
}

impl TxBroadcaster for FanoutBroadcaster {
    fn broadcast(&self, raw: &Bytes) -> BroadcastOutcome {
        let tx_hash = keccak256(raw);
        let (tx, rx) = mpsc::channel();
        for node in &self.nodes {
            let node = Arc::clone(node);
            let tx = tx.clone();
            let params = json!([raw]);
            thread::spawn(move || {
                let result = node.call("eth_sendRawTransaction", params);
                let _ = tx.send((node.label().to_owned(), result));
            });
        }
        drop(tx);

        let started = Instant::now();
        let mut accepted = false;
        let mut errors = Vec::new();
        let mut answered = 0usize;
        while answered < self.nodes.len() {
            let remaining = self.deadline.saturating_sub(started.elapsed());
            let Ok((label, result)) = rx.recv_timeout(remaining) else {
                break;
            };
            answered += 1;
            match result {
                Ok(_) => {
                    info!(node = %label, hash = %tx_hash, "node accepted transaction");
                    accepted = true;
                }
                Err(e) if already_known(&e) => {
                    info!(node = %label, hash = %tx_hash, "node already knows transaction");
                    accepted = true;
                }
                Err(e) => {
                    warn!(node = %label, hash = %tx_hash, error = %e, "node rejected transaction");
                    errors.push(NodeFailure {
                        label,
                        message: e.to_string(),
                    });
                }
            }
        }
        let silent = self.nodes.len() - answered;
        if silent > 0 {
            errors.push(NodeFailure {
                label: format!("{silent} node(s)"),
                message: format!("no answer within {} ms", self.deadline.as_millis()),
            });
        }
        BroadcastOutcome {
            tx_hash,
            accepted,
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_known_counts_as_accepted() {
        assert!(already_known(&PortError::Node("already known".to_owned())));
        assert!(already_known(&PortError::Node(
            "Known transaction: 0xabc".to_owned()
        )));
        assert!(!already_known(&PortError::Node("nonce too low".to_owned())));
    }
}
