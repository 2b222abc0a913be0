use std::path::{Path, PathBuf};

/// Runtime settings for the I/O adapters, resolved once at startup.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub home_dir: PathBuf,
    pub node_timeout_ms: u64,
    pub explorer_timeout_ms: u64,
    pub gas_ttl_ms: u64,
    pub monitor_poll_ms: u64,
    pub lost_after_ms: u64,
    pub broadcast_retries: u32,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            home_dir: PathBuf::from("."),
            node_timeout_ms: 4_000,
            explorer_timeout_ms: 10_000,
            gas_ttl_ms: 60_000,
            monitor_poll_ms: 5_000,
            lost_after_ms: 180_000,
            broadcast_retries: 3,
        }
    }
}

impl AdapterConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(home) = std::env::var_os("JARVIS_HOME").or_else(|| std::env::var_os("HOME")) {
            cfg.home_dir = PathBuf::from(home);
        }
        if let Some(ms) = env_u64("JARVIS_NODE_TIMEOUT_MS") {
            cfg.node_timeout_ms = ms;
        }
        if let Some(ms) = env_u64("JARVIS_EXPLORER_TIMEOUT_MS") {
            cfg.explorer_timeout_ms = ms;
        }
        cfg
    }

    pub fn with_home(mut self, home: impl AsRef<Path>) -> Self {
        self.home_dir = home.as_ref().to_path_buf();
        self
    }

    fn state_dir(&self) -> PathBuf {
        self.home_dir.join(".jarvis")
    }

    pub fn addresses_path(&self) -> PathBuf {
        self.home_dir.join("addresses.json")
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.home_dir.join("secrets.json")
    }

    pub fn cache_path(&self) -> PathBuf {
        self.state_dir().join("cache.json")
    }

    pub fn accounts_dir(&self) -> PathBuf {
        self.state_dir().join("accounts")
    }

    pub fn networks_dir(&self) -> PathBuf {
        self.state_dir().join("networks")
    }

    pub fn index_path(&self) -> PathBuf {
        self.state_dir().join("address_index.json")
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
