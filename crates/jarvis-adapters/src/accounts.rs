//! Wallet book: one JSON descriptor per account under `.jarvis/accounts/`.

use std::fs;
use std::path::{Path, PathBuf};

use alloy::primitives::Address;
use tracing::warn;

use jarvis_core::{AccountDescriptor, AccountKind, PortError};

#[derive(Debug, Clone)]
pub struct AccountStore {
    dir: PathBuf,
}

fn descriptor_path(dir: &Path, address: Address) -> PathBuf {
    dir.join(format!("{}.json", address.to_string().to_lowercase()))
}

fn validate(account: &AccountDescriptor) -> Result<(), PortError> {
    match account.kind {
        AccountKind::Keystore => {
            let path = account.keypath.as_ref().ok_or_else(|| {
                PortError::UserInput("keystore accounts need a keystore file path".to_owned())
            })?;
            if !path.is_file() {
                return Err(PortError::UserInput(format!(
                    "keystore file {} does not exist",
                    path.display()
                )));
            }
        }
        AccountKind::Ledger | AccountKind::LedgerLive | AccountKind::Trezor => {
            if account.derpath.as_deref().map_or(true, |p| p.trim().is_empty()) {
                return Err(PortError::UserInput(
                    "hardware accounts need a derivation path".to_owned(),
                ));
            }
        }
    }
    Ok(())
}

impl AccountStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// All descriptors, sorted by description. Broken files are skipped.
    pub fn list(&self) -> Vec<AccountDescriptor> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut accounts: Vec<AccountDescriptor> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| {
                let raw = fs::read(&path).ok()?;
                match serde_json::from_slice(&raw) {
                    Ok(account) => Some(account),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping account descriptor");
                        None
                    }
                }
            })
            .collect();
        accounts.sort_by(|a, b| a.desc.cmp(&b.desc).then(a.address.cmp(&b.address)));
        accounts
    }

    pub fn find(&self, address: Address) -> Option<AccountDescriptor> {
        self.list().into_iter().find(|a| a.address == address)
    }

    /// Writes a new descriptor. Existing accounts are never overwritten.
    pub fn add(&self, account: &AccountDescriptor) -> Result<PathBuf, PortError> {
        validate(account)?;
        let path = descriptor_path(&self.dir, account.address);
        if path.exists() {
            return Err(PortError::UserInput(format!(
                "account {} is already registered",
                account.address
            )));
        }
        fs::create_dir_all(&self.dir)
            .map_err(|e| PortError::Cache(format!("create {}: {e}", self.dir.display())))?;
        let body = serde_json::to_vec_pretty(account)
            .map_err(|e| PortError::Validation(format!("serialize account: {e}")))?;
        fs::write(&path, body)
            .map_err(|e| PortError::Cache(format!("write {}: {e}", path.display())))?;
        Ok(path)
    }
}
