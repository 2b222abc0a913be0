use std::time::Duration;

use alloy::primitives::Address;
use serde::Deserialize;
use tracing::debug;

use jarvis_core::{ExplorerPort, PortError};

/// Etherscan-compatible `module=contract&action=getabi` client.
#[derive(Debug, Clone)]
pub struct EtherscanExplorer {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
}

#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: serde_json::Value,
}

impl EtherscanExplorer {
    pub fn new(base_url: &str, api_key: Option<String>, timeout_ms: u64) -> Result<Self, PortError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| PortError::Transport(format!("failed to build http client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client,
        })
    }
}

impl ExplorerPort for EtherscanExplorer {
    fn fetch_abi(&self, address: Address) -> Result<String, PortError> {
        if self.base_url.is_empty() {
            return Err(PortError::Explorer(
                "no block explorer configured for this network".to_owned(),
            ));
        }
        let address = address.to_string();
        let mut query = vec![
            ("module", "contract"),
            ("action", "getabi"),
            ("address", address.as_str()),
        ];
        if let Some(key) = &self.api_key {
            query.push(("apikey", key.as_str()));
        }
        debug!(%address, url = %self.base_url, "explorer abi request");
        let response = self
            .client
            .get(&self.base_url)
            .query(&query)
            .send()
            .map_err(|e| PortError::Explorer(format!("getabi request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PortError::Explorer(format!("getabi http status {status}")));
        }
        let body: ExplorerResponse = response
            .json()
            .map_err(|e| PortError::Explorer(format!("getabi json decode failed: {e}")))?;
        match (body.status.as_str(), body.result) {
            ("1", serde_json::Value::String(abi)) => Ok(abi),
            (_, serde_json::Value::String(reason)) => Err(PortError::Explorer(format!(
                "{address}: {} ({reason})",
                body.message
            ))),
            (_, other) => Err(PortError::Explorer(format!(
                "{address}: unexpected getabi result {other}"
            ))),
        }
    }
}
