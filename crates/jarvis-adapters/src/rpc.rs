//! Single-node JSON-RPC transport.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use jarvis_core::PortError;

/// One labelled JSON-RPC endpoint.
pub trait RpcNode: Send + Sync {
    fn label(&self) -> &str;
    fn call(&self, method: &str, params: Value) -> Result<Value, PortError>;
}

#[derive(Debug, Clone)]
pub struct HttpNode {
    label: String,
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpNode {
    pub fn new(label: &str, url: &str, timeout_ms: u64) -> Result<Self, PortError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| PortError::Transport(format!("failed to build http client: {e}")))?;
        Ok(Self {
            label: label.to_owned(),
            url: url.to_owned(),
            client,
        })
    }
}

impl RpcNode for HttpNode {
    fn label(&self) -> &str {
        &self.label
    }

    fn call(&self, method: &str, params: Value) -> Result<Value, PortError> {
        debug!(node = %self.label, method, "rpc request");
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .map_err(|e| PortError::Transport(format!("{method} request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PortError::Transport(format!("{method} http status {status}")));
        }
        let body: Value = response
            .json()
            .map_err(|e| PortError::Transport(format!("{method} json decode failed: {e}")))?;
        if let Some(err) = body.get("error") {
            return Err(PortError::Node(rpc_error_message(err)));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| PortError::Transport(format!("{method} response missing result")))
    }
}

/// `message` of a JSON-RPC error object, with revert data appended as
/// `data=0x…` when the node returned any.
pub fn rpc_error_message(err: &Value) -> String {
    let message = err
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_else(|| err.to_string());
    match err.get("data").and_then(Value::as_str) {
        Some(data) if data.starts_with("0x") => format!("{message} data={data}"),
        _ => message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revert_data_is_kept_in_the_message() {
        let err = serde_json::json!({
            "code": 3,
            "message": "execution reverted",
            "data": "0x08c379a0"
        });
        assert_eq!(rpc_error_message(&err), "execution reverted data=0x08c379a0");
        let plain = serde_json::json!({"code": -32000, "message": "nonce too low"});
        assert_eq!(rpc_error_message(&plain), "nonce too low");
    }
}
