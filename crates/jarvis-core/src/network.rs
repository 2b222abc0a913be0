use std::collections::HashSet;

use crate::domain::Network;
use crate::ports::PortError;

/// Networks loaded for one run. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    networks: Vec<Network>,
}

impl NetworkRegistry {
    pub fn new(networks: Vec<Network>) -> Result<Self, PortError> {
        let mut chain_ids = HashSet::new();
        let mut names = HashSet::new();
        for network in &networks {
            if !chain_ids.insert(network.chain_id) {
                return Err(PortError::Validation(format!(
                    "duplicate chain id {} ({})",
                    network.chain_id, network.name
                )));
            }
            for name in std::iter::once(&network.name).chain(network.alternative_names.iter()) {
                if !names.insert(name.to_lowercase()) {
                    return Err(PortError::Validation(format!(
                        "duplicate network name '{name}'"
                    )));
                }
            }
        }
        Ok(Self { networks })
    }

    pub fn get(&self, name: &str) -> Result<&Network, PortError> {
        self.networks
            .iter()
            .find(|n| n.matches(name))
            .ok_or_else(|| PortError::UserInput(format!("unknown network '{name}'")))
    }

    pub fn by_chain_id(&self, chain_id: u64) -> Option<&Network> {
        self.networks.iter().find(|n| n.chain_id == chain_id)
    }

    pub fn list(&self) -> &[Network] {
        &self.networks
    }

    /// Registry with `network` appended, re-checking the invariants.
    pub fn with(&self, network: Network) -> Result<Self, PortError> {
        let mut networks = self.networks.clone();
        networks.push(network);
        Self::new(networks)
    }
}
