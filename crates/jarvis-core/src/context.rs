//! Session state for one run: per-chain handles, pending nonces, cached gas
//! settings and unlocked signers.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use alloy::primitives::Address;
use tracing::{debug, info};

use crate::domain::{AccountDescriptor, GasInfo, Network};
use crate::nonce::reconcile;
use crate::ports::{
    AbiProvider, ChainBackend, ChainReader, ClockPort, PortError, SignerFactory, TxBroadcaster,
    WalletSigner,
};

pub const DEFAULT_GAS_TTL_MS: u64 = 60_000;

#[derive(Clone)]
struct ChainHandles {
    reader: Arc<dyn ChainReader>,
    broadcaster: Arc<dyn TxBroadcaster>,
    abis: Arc<dyn AbiProvider>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingNonce {
    next: u64,
    /// Set once this process broadcast from the wallet on the chain.
    broadcast: bool,
}

#[derive(Default)]
struct ContextState {
    chains: HashMap<u64, ChainHandles>,
    nonces: HashMap<(Address, u64), PendingNonce>,
    gas: HashMap<u64, GasInfo>,
    signers: HashMap<Address, Arc<dyn WalletSigner>>,
}

pub struct Context {
    backend: Arc<dyn ChainBackend>,
    signer_factory: Arc<dyn SignerFactory>,
    clock: Arc<dyn ClockPort>,
    gas_ttl_ms: u64,
    state: RwLock<ContextState>,
}

impl Context {
    pub fn new(
        backend: Arc<dyn ChainBackend>,
        signer_factory: Arc<dyn SignerFactory>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            backend,
            signer_factory,
            clock,
            gas_ttl_ms: DEFAULT_GAS_TTL_MS,
            state: RwLock::new(ContextState::default()),
        }
    }

    pub fn with_gas_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.gas_ttl_ms = ttl_ms;
        self
    }

    pub fn clock(&self) -> &Arc<dyn ClockPort> {
        &self.clock
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, ContextState>, PortError> {
        self.state
            .read()
            .map_err(|e| PortError::Transport(format!("context lock poisoned: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, ContextState>, PortError> {
        self.state
            .write()
            .map_err(|e| PortError::Transport(format!("context lock poisoned: {e}")))
    }

    fn handles(&self, network: &Network) -> Result<ChainHandles, PortError> {
        if let Some(h) = self.read()?.chains.get(&network.chain_id) {
            return Ok(h.clone());
        }
        let reader = self.backend.reader(network)?;
        let broadcaster = self.backend.broadcaster(network)?;
        let abis = self.backend.abi_provider(network, reader.clone())?;
        let built = ChainHandles {
            reader,
            broadcaster,
            abis,
        };
        // a concurrent build may have won; keep the first one
        let mut state = self.write()?;
        let handles = state
            .chains
            .entry(network.chain_id)
            .or_insert_with(|| {
                debug!(chain_id = network.chain_id, "chain handles built");
                built
            })
            .clone();
        Ok(handles)
    }

    pub fn reader(&self, network: &Network) -> Result<Arc<dyn ChainReader>, PortError> {
        Ok(self.handles(network)?.reader)
    }

    pub fn broadcaster(&self, network: &Network) -> Result<Arc<dyn TxBroadcaster>, PortError> {
        Ok(self.handles(network)?.broadcaster)
    }

    pub fn abi_provider(&self, network: &Network) -> Result<Arc<dyn AbiProvider>, PortError> {
        Ok(self.handles(network)?.abis)
    }

    /// Next nonce for `wallet`. After the first broadcast in this run the
    /// local record is authoritative and no node is queried.
    pub fn nonce(&self, wallet: Address, network: &Network) -> Result<u64, PortError> {
        let key = (wallet, network.chain_id);
        let local = self.read()?.nonces.get(&key).copied();
        if let Some(record) = local.filter(|r| r.broadcast) {
            debug!(%wallet, nonce = record.next, "nonce from local pending record");
            return Ok(record.next);
        }

        let reader = self.reader(network)?;
        let mined = reader.get_mined_nonce(wallet)?;
        let remote = reader.get_pending_nonce(wallet)?;

        let mut state = self.write()?;
        let current = state.nonces.get(&key).copied();
        if let Some(record) = current.filter(|r| r.broadcast) {
            return Ok(record.next);
        }
        let decision = reconcile(mined, remote, current.map(|r| r.next))?;
        state.nonces.insert(
            key,
            PendingNonce {
                next: decision.local,
                broadcast: false,
            },
        );
        debug!(%wallet, mined, remote, nonce = decision.nonce, "nonce reconciled");
        Ok(decision.nonce)
    }

    /// Records a successful broadcast of `nonce - 1`. The record never moves
    /// backwards.
    pub fn set_pending_nonce(
        &self,
        wallet: Address,
        chain_id: u64,
        nonce: u64,
    ) -> Result<(), PortError> {
        let mut state = self.write()?;
        let entry = state.nonces.entry((wallet, chain_id)).or_insert(PendingNonce {
            next: nonce,
            broadcast: true,
        });
        entry.next = entry.next.max(nonce);
        entry.broadcast = true;
        info!(%wallet, chain_id, next = entry.next, "pending nonce advanced");
        Ok(())
    }

    pub fn pending_nonce(&self, wallet: Address, chain_id: u64) -> Result<Option<u64>, PortError> {
        Ok(self
            .read()?
            .nonces
            .get(&(wallet, chain_id))
            .map(|r| r.next))
    }

    /// Gas settings served from cache while younger than the TTL.
    pub fn gas_setting(&self, network: &Network) -> Result<GasInfo, PortError> {
        let now = self.clock.now_ms()?;
        if let Some(info) = self.read()?.gas.get(&network.chain_id) {
            if now.saturating_sub(info.sampled_at_ms) < self.gas_ttl_ms {
                return Ok(*info);
            }
        }
        let reader = self.reader(network)?;
        let base_fee = reader.header_by_number(None)?.base_fee();
        let dynamic_fee = base_fee > 0;
        let max_fee_per_gas = reader.suggest_gas_price()?;
        let suggested_tip = if dynamic_fee {
            reader.suggest_gas_tip()?
        } else {
            0
        };
        let info = GasInfo {
            max_fee_per_gas,
            suggested_tip,
            base_fee,
            dynamic_fee,
            sampled_at_ms: now,
        };
        info!(
            chain_id = network.chain_id,
            max_fee_per_gas, suggested_tip, dynamic_fee, "gas settings refreshed"
        );
        self.write()?.gas.insert(network.chain_id, info);
        Ok(info)
    }

    pub fn signer(&self, account: &AccountDescriptor) -> Result<Arc<dyn WalletSigner>, PortError> {
        if let Some(signer) = self.read()?.signers.get(&account.address) {
            return Ok(signer.clone());
        }
        let signer = self.signer_factory.unlock(account)?;
        if signer.address() != account.address {
            return Err(PortError::Validation(format!(
                "unlocked wallet {} does not match account {}",
                signer.address(),
                account.address
            )));
        }
        info!(address = %account.address, kind = ?account.kind, "wallet unlocked");
        let mut state = self.write()?;
        Ok(state
            .signers
            .entry(account.address)
            .or_insert(signer)
            .clone())
    }
}
