use alloy::network::TxSigner;
use alloy::primitives::{Address, PrimitiveSignature};
use alloy::signers::ledger::{HDPath, LedgerSigner};
use tokio::runtime::Runtime;

use jarvis_core::{PortError, TypedUnsigned};

use super::hardware::{session_state, DeviceState, HardwareDevice};

/// Ledger over USB. The PIN is entered on the device, so the host only
/// learns whether a session opens or the device reports itself locked.
pub struct LedgerDevice {
    runtime: Runtime,
    session: Option<(String, LedgerSigner)>,
}

fn device_err(e: impl std::fmt::Display) -> PortError {
    PortError::SignerUnavailable(format!("ledger: {e}"))
}

impl LedgerDevice {
    pub fn open() -> Result<Self, PortError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(device_err)?;
        Ok(Self {
            runtime,
            session: None,
        })
    }

    fn session(&mut self, derpath: &str) -> Result<&LedgerSigner, PortError> {
        let stale = self.session.as_ref().map_or(true, |(path, _)| path != derpath);
        if stale {
            let signer = self
                .runtime
                .block_on(LedgerSigner::new(HDPath::Other(derpath.to_owned()), None))
                .map_err(device_err)?;
            self.session = Some((derpath.to_owned(), signer));
        }
        self.session
            .as_ref()
            .map(|(_, signer)| signer)
            .ok_or_else(|| device_err("no session"))
    }
}

impl HardwareDevice for LedgerDevice {
    fn name(&self) -> &str {
        "Ledger"
    }

    fn status(&mut self, derpath: &str) -> Result<DeviceState, PortError> {
        session_state(self.session(derpath).map(|_| ()))
    }

    fn derive_address(&mut self, derpath: &str) -> Result<Address, PortError> {
        let runtime = self.runtime.handle().clone();
        let signer = self.session(derpath)?;
        runtime.block_on(signer.get_address()).map_err(device_err)
    }

    fn sign(
        &mut self,
        derpath: &str,
        tx: &mut TypedUnsigned,
    ) -> Result<PrimitiveSignature, PortError> {
        let runtime = self.runtime.handle().clone();
        let signer = self.session(derpath)?;
        runtime
            .block_on(signer.sign_transaction(tx.as_signable()))
            .map_err(device_err)
    }
}
