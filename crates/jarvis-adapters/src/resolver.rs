//! Address book resolver backed by a persisted index that is rebuilt only
//! when its sources change.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use alloy::primitives::{hex, Address};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use jarvis_core::params::{is_address, parse_address_hex};
use jarvis_core::{AccountDescriptor, AddressBookEntry, AddressMatch, AddressResolver, PortError};

use crate::config::AdapterConfig;
use crate::index::AddressIndex;

const BUILTIN_TOKENS: &str = include_str!("tokens.json");

/// `{ "0x…": "description" }`; unparseable addresses are skipped.
fn read_book(path: &Path) -> BTreeMap<Address, String> {
    let Ok(raw) = fs::read(path) else {
        return BTreeMap::new();
    };
    let parsed: BTreeMap<String, String> = match serde_json::from_slice(&raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "address book is not a JSON object");
            return BTreeMap::new();
        }
    };
    parsed
        .into_iter()
        .filter_map(|(addr, desc)| match parse_address_hex(&addr) {
            Ok(address) => Some((address, desc)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping address book entry");
                None
            }
        })
        .collect()
}

fn builtin_tokens() -> BTreeMap<Address, String> {
    let parsed: BTreeMap<String, String> = serde_json::from_str(BUILTIN_TOKENS).unwrap_or_default();
    parsed
        .into_iter()
        .filter_map(|(addr, symbol)| {
            parse_address_hex(&addr)
                .ok()
                .map(|a| (a, format!("{symbol} token")))
        })
        .collect()
}

fn modified_stamp(path: &Path) -> String {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos().to_string())
        .unwrap_or_else(|| "absent".to_owned())
}

/// Hash over the source files' modification times and the wallet book.
pub fn source_hash(files: &[PathBuf], accounts: &[AccountDescriptor]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(BUILTIN_TOKENS.as_bytes());
    for path in files {
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update(modified_stamp(path).as_bytes());
    }
    for account in accounts {
        hasher.update(account.address.as_slice());
        hasher.update(account.desc.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Union of all address sources; later sources overwrite earlier ones.
pub fn collect_entries(
    addresses: &Path,
    secrets: &Path,
    accounts: &[AccountDescriptor],
) -> Vec<AddressBookEntry> {
    let mut merged: BTreeMap<Address, String> = builtin_tokens();
    merged.extend(read_book(addresses));
    merged.extend(read_book(secrets));
    for account in accounts {
        let desc = if account.desc.is_empty() {
            format!("{:?} wallet", account.kind).to_lowercase()
        } else {
            account.desc.clone()
        };
        merged.insert(account.address, desc);
    }
    merged
        .into_iter()
        .map(|(address, description)| AddressBookEntry {
            address,
            description,
            decimals: None,
        })
        .collect()
}

#[derive(Debug)]
pub struct FileResolver {
    index: AddressIndex,
    rebuilt: bool,
}

impl FileResolver {
    pub fn open(config: &AdapterConfig, accounts: &[AccountDescriptor]) -> Self {
        let addresses = config.addresses_path();
        let secrets = config.secrets_path();
        let hash = source_hash(&[addresses.clone(), secrets.clone()], accounts);
        let index_path = config.index_path();
        if let Some(index) = AddressIndex::load(&index_path).filter(|i| i.source_hash == hash) {
            return Self {
                index,
                rebuilt: false,
            };
        }
        let entries = collect_entries(&addresses, &secrets, accounts);
        let index = AddressIndex::build(hash, &entries);
        info!(entries = index.len(), path = %index_path.display(), "address index rebuilt");
        if let Err(e) = index.save(&index_path) {
            warn!(error = %e, "address index not persisted");
        }
        Self {
            index,
            rebuilt: true,
        }
    }

    /// Whether `open` had to rebuild the index.
    pub fn rebuilt(&self) -> bool {
        self.rebuilt
    }
}

impl AddressResolver for FileResolver {
    fn resolve(&self, input: &str) -> Result<(Address, String), PortError> {
        if is_address(input) {
            let address = parse_address_hex(input)?;
            let desc = self
                .describe(address)
                .unwrap_or_else(|| "unknown".to_owned());
            return Ok((address, desc));
        }
        self.search(input)
            .into_iter()
            .next()
            .map(|m| (m.address, m.description))
            .ok_or_else(|| {
                PortError::UserInput(format!("no address in the address book matches '{input}'"))
            })
    }

    fn search(&self, input: &str) -> Vec<AddressMatch> {
        self.index.search(input)
    }

    fn describe(&self, address: Address) -> Option<String> {
        self.index.describe(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tokens_carry_token_suffix() {
        let tokens = builtin_tokens();
        assert!(tokens.len() >= 5);
        assert!(tokens.values().all(|d| d.ends_with(" token")));
    }

    #[test]
    fn missing_sources_hash_stably() {
        let files = [PathBuf::from("/nonexistent/a.json")];
        assert_eq!(source_hash(&files, &[]), source_hash(&files, &[]));
    }
}
