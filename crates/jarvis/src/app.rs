//! Process-level state shared by every command.

use std::sync::Arc;

use tracing::debug;

use jarvis_adapters::{
    AccountStore, AdapterConfig, DeviceSignerFactory, FileCache, FileResolver, HttpChainBackend,
    InquirePrompter, NetworkStore, SystemClock,
};
use jarvis_core::{Context, MonitorSettings, Network, Orchestrator, PortError, Prompter};

use crate::render::TerminalObserver;

pub struct App {
    pub config: AdapterConfig,
    pub networks: NetworkStore,
    pub accounts: AccountStore,
    pub json_output: bool,
}

impl App {
    pub fn new(config: AdapterConfig, json_output: bool) -> Self {
        Self {
            networks: NetworkStore::new(config.networks_dir()),
            accounts: AccountStore::new(config.accounts_dir()),
            config,
            json_output,
        }
    }

    pub fn network(&self, name: &str) -> Result<Network, PortError> {
        let registry = self.networks.registry()?;
        registry.get(name).cloned()
    }

    pub fn resolver(&self) -> FileResolver {
        FileResolver::open(&self.config, &self.accounts.list())
    }

    fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            poll_ms: self.config.monitor_poll_ms,
            lost_after_ms: self.config.lost_after_ms,
            broadcast_retries: self.config.broadcast_retries,
        }
    }

    /// Wires the adapters for one network into an orchestrator.
    pub fn orchestrator(&self, network_name: &str) -> Result<Orchestrator, PortError> {
        let network = self.network(network_name)?;
        let accounts = self.accounts.list();
        let resolver = Arc::new(FileResolver::open(&self.config, &accounts));
        let prompter: Arc<dyn Prompter> = Arc::new(InquirePrompter);
        let cache = Arc::new(FileCache::new(self.config.cache_path()));
        let backend = Arc::new(HttpChainBackend::new(self.config.clone(), cache));
        let signers = Arc::new(DeviceSignerFactory::new(Arc::clone(&prompter)));
        let context = Arc::new(
            Context::new(backend, signers, Arc::new(SystemClock))
                .with_gas_ttl_ms(self.config.gas_ttl_ms),
        );
        let observer = Arc::new(TerminalObserver::new(&network));
        debug!(network = %network.name, wallets = accounts.len(), "orchestrator ready");
        Ok(Orchestrator::new(context, network, resolver, accounts, prompter, observer)
            .with_settings(self.monitor_settings()))
    }
}
