//! Built-in networks plus user descriptor files in `.jarvis/networks/`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use jarvis_core::{Network, NetworkRegistry, PortError};

const BUILTIN_NETWORKS: &str = include_str!("networks.json");

pub fn builtin_networks() -> Result<Vec<Network>, PortError> {
    serde_json::from_str(BUILTIN_NETWORKS)
        .map_err(|e| PortError::Validation(format!("built-in network list is invalid: {e}")))
}

fn descriptor_file_name(network: &Network) -> String {
    format!("{}.json", network.name.to_lowercase().replace(' ', "_"))
}

/// Network descriptors stored one per file.
#[derive(Debug, Clone)]
pub struct NetworkStore {
    dir: PathBuf,
}

impl NetworkStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// User descriptors; unreadable files are skipped with a warning.
    pub fn load_user(&self) -> Vec<Network> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            debug!(dir = %self.dir.display(), "no user network directory");
            return Vec::new();
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();
        paths
            .into_iter()
            .filter_map(|path| {
                let parsed = fs::read(&path)
                    .map_err(|e| e.to_string())
                    .and_then(|raw| serde_json::from_slice(&raw).map_err(|e| e.to_string()));
                match parsed {
                    Ok(network) => Some(network),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping network descriptor");
                        None
                    }
                }
            })
            .collect()
    }

    /// Built-ins followed by user networks, uniqueness checked.
    pub fn registry(&self) -> Result<NetworkRegistry, PortError> {
        let mut networks = builtin_networks()?;
        networks.extend(self.load_user());
        NetworkRegistry::new(networks)
    }

    /// Validates `network` against the current registry and writes its file.
    pub fn add(&self, network: &Network) -> Result<PathBuf, PortError> {
        self.registry()?.with(network.clone())?;
        fs::create_dir_all(&self.dir)
            .map_err(|e| PortError::Cache(format!("create {}: {e}", self.dir.display())))?;
        let path = self.dir.join(descriptor_file_name(network));
        if path.exists() {
            return Err(PortError::UserInput(format!(
                "network descriptor {} already exists",
                path.display()
            )));
        }
        let body = serde_json::to_vec_pretty(network)
            .map_err(|e| PortError::Validation(format!("serialize network: {e}")))?;
        fs::write(&path, body)
            .map_err(|e| PortError::Cache(format!("write {}: {e}", path.display())))?;
        Ok(path)
    }
}
