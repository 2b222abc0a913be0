use std::sync::Arc;

use tracing::debug;

use jarvis_core::{
    AbiProvider, ChainBackend, ChainReader, KvCache, MetadataService, Network, PortError,
    TxBroadcaster,
};

use crate::broadcaster::FanoutBroadcaster;
use crate::cache::FileCache;
use crate::config::AdapterConfig;
use crate::explorer::EtherscanExplorer;
use crate::reader::FanoutReader;
use crate::rpc::{HttpNode, RpcNode};

/// Wires HTTP node pools, the explorer and the file cache for a network.
#[derive(Debug, Clone)]
pub struct HttpChainBackend {
    config: AdapterConfig,
    cache: Arc<FileCache>,
}

impl HttpChainBackend {
    pub fn new(config: AdapterConfig, cache: Arc<FileCache>) -> Self {
        Self { config, cache }
    }

    fn env(name: &str) -> Option<String> {
        if name.is_empty() {
            return None;
        }
        std::env::var(name).ok().filter(|v| !v.trim().is_empty())
    }

    pub fn nodes(&self, network: &Network) -> Result<Vec<Arc<dyn RpcNode>>, PortError> {
        let overrides = Self::env(&network.node_variable_name);
        let nodes = network
            .node_map(overrides.as_deref())
            .into_iter()
            .map(|(label, url)| {
                HttpNode::new(&label, &url, self.config.node_timeout_ms)
                    .map(|node| Arc::new(node) as Arc<dyn RpcNode>)
            })
            .collect::<Result<Vec<_>, _>>()?;
        if nodes.is_empty() {
            return Err(PortError::UserInput(format!(
                "network {} has no nodes; set {}",
                network.name, network.node_variable_name
            )));
        }
        debug!(network = %network.name, nodes = nodes.len(), "node pool ready");
        Ok(nodes)
    }
}

impl ChainBackend for HttpChainBackend {
    fn reader(&self, network: &Network) -> Result<Arc<dyn ChainReader>, PortError> {
        let reader = FanoutReader::new(self.nodes(network)?, self.config.node_timeout_ms)?;
        Ok(Arc::new(reader))
    }

    fn broadcaster(&self, network: &Network) -> Result<Arc<dyn TxBroadcaster>, PortError> {
        let broadcaster =
            FanoutBroadcaster::new(self.nodes(network)?, self.config.node_timeout_ms)?;
        Ok(Arc::new(broadcaster))
    }

    fn abi_provider(
        &self,
        network: &Network,
        reader: Arc<dyn ChainReader>,
    ) -> Result<Arc<dyn AbiProvider>, PortError> {
        let explorer = EtherscanExplorer::new(
            &network.block_explorer_api_url,
            Self::env(&network.block_explorer_api_key_variable_name),
            self.config.explorer_timeout_ms,
        )?;
        let cache: Arc<dyn KvCache> = self.cache.clone();
        Ok(Arc::new(MetadataService::new(
            reader,
            Arc::new(explorer),
            cache,
        )))
    }
}
