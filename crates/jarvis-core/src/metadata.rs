//! ABI and token metadata service: cache first, then chain or explorer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::json_abi::JsonAbi;
use alloy::primitives::{Address, Bytes, U256};
use tracing::{debug, info};

use crate::abis::{parse_abi, DECIMALS_SELECTOR, SYMBOL_SELECTOR};
use crate::domain::CallRequest;
use crate::ports::{cache_key, AbiProvider, ChainReader, ExplorerPort, KvCache, PortError};
use crate::proxy::implementation_of;

const NS_ABI: &str = "abi";
const NS_IS_ERC20: &str = "isERC20";
const NS_DECIMAL: &str = "decimal";
const NS_SYMBOL: &str = "symbol";

/// Largest decimals value whose power of ten fits in a `U256`.
pub const MAX_TOKEN_DECIMALS: u64 = 77;

pub struct MetadataService {
    reader: Arc<dyn ChainReader>,
    explorer: Arc<dyn ExplorerPort>,
    cache: Arc<dyn KvCache>,
    implementations: Mutex<HashMap<Address, Option<Address>>>,
}

impl MetadataService {
    pub fn new(
        reader: Arc<dyn ChainReader>,
        explorer: Arc<dyn ExplorerPort>,
        cache: Arc<dyn KvCache>,
    ) -> Self {
        Self {
            reader,
            explorer,
            cache,
            implementations: Mutex::new(HashMap::new()),
        }
    }

    /// Proxy slot lookup, memoized for the lifetime of the service.
    pub fn implementation(&self, address: Address) -> Result<Option<Address>, PortError> {
        {
            let known = self
                .implementations
                .lock()
                .map_err(|e| PortError::Transport(format!("metadata lock poisoned: {e}")))?;
            if let Some(found) = known.get(&address) {
                return Ok(*found);
            }
        }
        let found = implementation_of(self.reader.as_ref(), address)?;
        self.implementations
            .lock()
            .map_err(|e| PortError::Transport(format!("metadata lock poisoned: {e}")))?
            .insert(address, found);
        Ok(found)
    }

    /// ABI of exactly `address`, without proxy substitution.
    pub fn own_abi(&self, address: Address) -> Result<JsonAbi, PortError> {
        let key = cache_key(address, NS_ABI);
        if let Some(raw) = self.cache.get(&key) {
            debug!(%address, "abi cache hit");
            return parse_abi(&raw);
        }
        let raw = self.explorer.fetch_abi(address)?;
        let abi = parse_abi(&raw)?;
        self.cache.set(&key, &raw);
        info!(%address, "abi fetched from explorer");
        Ok(abi)
    }

    fn call(&self, address: Address, selector: [u8; 4]) -> Result<Bytes, PortError> {
        let call = CallRequest {
            to: Some(address),
            data: Some(Bytes::copy_from_slice(&selector)),
            ..Default::default()
        };
        self.reader.call_contract(&call, None)
    }

    fn fetch_decimals(&self, address: Address) -> Result<Option<u64>, PortError> {
        let out = match self.call(address, DECIMALS_SELECTOR) {
            Ok(out) => out,
            Err(e) if e.to_string().contains("execution reverted") => return Ok(None),
            Err(e) => return Err(e),
        };
        if out.is_empty() {
            return Ok(None);
        }
        let value = decode_single(DynSolType::Uint(256), &out).map_err(|e| {
            PortError::Validation(format!("decimals() of {address} returned bad data: {e}"))
        })?;
        match value {
            Some(DynSolValue::Uint(v, _)) => match u64::try_from(v) {
                Ok(d) if d <= MAX_TOKEN_DECIMALS => Ok(Some(d)),
                _ => Err(PortError::Validation(format!(
                    "decimals() of {address} out of range: {v}"
                ))),
            },
            _ => Ok(None),
        }
    }
}

pub fn decode_single(
    ty: DynSolType,
    out: &[u8],
) -> Result<Option<DynSolValue>, alloy::dyn_abi::Error> {
    match DynSolType::Tuple(vec![ty]).abi_decode_params(out)? {
        DynSolValue::Tuple(mut values) => Ok(values.pop()),
        _ => Ok(None),
    }
}

/// Decodes `symbol()` output as `string`, falling back to `bytes32`.
pub fn decode_symbol(out: &[u8]) -> Option<String> {
    if is_abi_string(out) {
        if let Ok(Some(DynSolValue::String(s))) = decode_single(DynSolType::String, out) {
            if !s.is_empty() {
                return Some(s);
            }
        }
    }
    if out.len() >= 32 {
        let trimmed: Vec<u8> = out[..32].iter().copied().take_while(|b| *b != 0).collect();
        return String::from_utf8(trimmed).ok().filter(|s| !s.is_empty());
    }
    None
}

// Offset word must be 0x20 and the length must fit in the remaining data.
fn is_abi_string(out: &[u8]) -> bool {
    if out.len() < 64 {
        return false;
    }
    let offset = U256::from_be_slice(&out[..32]);
    let len = U256::from_be_slice(&out[32..64]);
    offset == U256::from(32) && len <= U256::from(out.len() - 64)
}

impl AbiProvider for MetadataService {
    fn get_abi(&self, address: Address) -> Result<JsonAbi, PortError> {
        match self.implementation(address)? {
            Some(implementation) => {
                info!(proxy = %address, %implementation, "using implementation abi");
                self.own_abi(implementation)
            }
            None => self.own_abi(address),
        }
    }

    fn is_erc20(&self, address: Address) -> Result<bool, PortError> {
        let key = cache_key(address, NS_IS_ERC20);
        if let Some(cached) = self.cache.get_bool(&key) {
            return Ok(cached);
        }
        let decimals = self.fetch_decimals(address)?;
        if let Some(d) = decimals {
            self.cache.set_i64(&cache_key(address, NS_DECIMAL), d as i64);
        }
        self.cache.set_bool(&key, decimals.is_some());
        Ok(decimals.is_some())
    }

    fn decimals(&self, address: Address) -> Result<u64, PortError> {
        let key = cache_key(address, NS_DECIMAL);
        if let Some(cached) = self.cache.get_i64(&key) {
            return Ok(cached as u64);
        }
        let decimals = self.fetch_decimals(address)?.ok_or_else(|| {
            PortError::Validation(format!("{address} does not implement decimals()"))
        })?;
        self.cache.set_i64(&key, decimals as i64);
        Ok(decimals)
    }

    fn symbol(&self, address: Address) -> Result<String, PortError> {
        let key = cache_key(address, NS_SYMBOL);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }
        let out = self.call(address, SYMBOL_SELECTOR)?;
        let symbol = decode_symbol(&out).ok_or_else(|| {
            PortError::Validation(format!("symbol() of {address} returned bad data"))
        })?;
        self.cache.set(&key, &symbol);
        Ok(symbol)
    }

    fn token_info(&self, address: Address) -> Result<(u64, String), PortError> {
        let (decimals, symbol) = std::thread::scope(|s| {
            let decimals = s.spawn(|| self.decimals(address));
            let symbol = self.symbol(address);
            let decimals = decimals.join().unwrap_or_else(|_| {
                Err(PortError::Transport("decimals worker panicked".to_owned()))
            });
            (decimals, symbol)
        });
        Ok((decimals?, symbol?))
    }
}
