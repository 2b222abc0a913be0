use alloy::network::TxSigner;
use alloy::primitives::{Address, PrimitiveSignature};
use alloy::signers::trezor::{TrezorHDPath, TrezorSigner};
use tokio::runtime::Runtime;

use jarvis_core::{PortError, TypedUnsigned};

use super::hardware::{session_state, DeviceState, HardwareDevice};

/// Trezor over USB. The driver asks for the PIN matrix on its own terminal
/// prompt while the session opens; a device it cannot open is unavailable.
pub struct TrezorDevice {
    runtime: Runtime,
    session: Option<(String, TrezorSigner)>,
}

fn device_err(e: impl std::fmt::Display) -> PortError {
    PortError::SignerUnavailable(format!("trezor: {e}"))
}

impl TrezorDevice {
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

    fn session(&mut self, derpath: &str) -> Result<&TrezorSigner, PortError> {
        let stale = self.session.as_ref().map_or(true, |(path, _)| path != derpath);
        if stale {
            let signer = self
                .runtime
                .block_on(TrezorSigner::new(
                    TrezorHDPath::Other(derpath.to_owned()),
                    None,
                ))
                .map_err(device_err)?;
            self.session = Some((derpath.to_owned(), signer));
        }
        self.session
            .as_ref()
            .map(|(_, signer)| signer)
            .ok_or_else(|| device_err("no session"))
    }
}

impl HardwareDevice for TrezorDevice {
    fn name(&self) -> &str {
        "Trezor"
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
