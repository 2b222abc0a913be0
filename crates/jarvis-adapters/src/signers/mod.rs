//! Wallet unlocking: keystore files and hardware devices.

pub mod hardware;
pub mod keystore;
#[cfg(feature = "ledger")]
pub mod ledger;
#[cfg(feature = "trezor")]
pub mod trezor;

use std::sync::Arc;

use tracing::info;

use jarvis_core::{AccountDescriptor, AccountKind, PortError, Prompter, SignerFactory, WalletSigner};

pub use hardware::{DeviceState, HardwareDevice, HardwareSigner};
pub use keystore::KeystoreSigner;

type DeviceOpener = dyn Fn(AccountKind) -> Result<Box<dyn HardwareDevice>, PortError> + Send + Sync;

/// Opens the USB driver compiled in for `kind`.
pub fn open_device(kind: AccountKind) -> Result<Box<dyn HardwareDevice>, PortError> {
    match kind {
        #[cfg(feature = "ledger")]
        AccountKind::Ledger | AccountKind::LedgerLive => Ok(Box::new(ledger::LedgerDevice::open()?)),
        #[cfg(feature = "trezor")]
        AccountKind::Trezor => Ok(Box::new(trezor::TrezorDevice::open()?)),
        AccountKind::Keystore => Err(PortError::SignerUnavailable(
            "keystore accounts are not hardware devices".to_owned(),
        )),
        #[allow(unreachable_patterns)]
        other => Err(PortError::SignerUnavailable(format!(
            "{other:?} support is not compiled into this build"
        ))),
    }
}

pub struct DeviceSignerFactory {
    prompter: Arc<dyn Prompter>,
    opener: Box<DeviceOpener>,
}

impl DeviceSignerFactory {
    pub fn new(prompter: Arc<dyn Prompter>) -> Self {
        Self {
            prompter,
            opener: Box::new(open_device),
        }
    }

    /// Replaces the USB drivers, mostly for tests.
    pub fn with_opener(
        mut self,
        opener: impl Fn(AccountKind) -> Result<Box<dyn HardwareDevice>, PortError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.opener = Box::new(opener);
        self
    }
}

impl SignerFactory for DeviceSignerFactory {
    fn unlock(&self, account: &AccountDescriptor) -> Result<Arc<dyn WalletSigner>, PortError> {
        let label = if account.desc.is_empty() {
            account.address.to_string()
        } else {
            format!("{} ({})", account.desc, account.address)
        };
        info!(account = %label, kind = ?account.kind, "unlocking wallet");
        match account.kind {
            AccountKind::Keystore => {
                let path = account.keypath.as_deref().ok_or_else(|| {
                    PortError::SignerUnavailable(format!("{label} has no keystore path"))
                })?;
                let signer = KeystoreSigner::unlock(path, &label, self.prompter.as_ref())?;
                Ok(Arc::new(signer))
            }
            kind => {
                let device = (self.opener)(kind)?;
                let signer = HardwareSigner::connect(device, account, self.prompter.as_ref())?;
                Ok(Arc::new(signer))
            }
        }
    }
}
