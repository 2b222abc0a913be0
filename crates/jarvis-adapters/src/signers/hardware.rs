//! Hardware wallets behind a small device trait. The PIN and passphrase
//! handshake happens once, at connect time; signing is serialized per device.

use std::sync::Mutex;

use alloy::primitives::{Address, PrimitiveSignature};
use tracing::{debug, info};

use jarvis_core::{
    assemble_signed, AccountDescriptor, PortError, Prompter, SignedTx, TypedUnsigned, UnsignedTx,
    WalletSigner,
};

const MAX_HANDSHAKE_ROUNDS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Ready,
    /// Host must send a PIN.
    NeedsPin,
    /// Host must send a passphrase.
    NeedsPassphrase,
    /// Operator must act on the device itself (PIN on the device, app not open).
    Locked,
}

/// One connected device.
pub trait HardwareDevice: Send {
    fn name(&self) -> &str;
    /// Opens a session for `derpath` and reports what it is waiting for.
    fn status(&mut self, derpath: &str) -> Result<DeviceState, PortError>;

    fn unlock_pin(&mut self, _pin: &str) -> Result<(), PortError> {
        Err(PortError::SignerUnavailable(format!(
            "{} does not take a PIN from the host",
            self.name()
        )))
    }

    fn unlock_passphrase(&mut self, _passphrase: &str) -> Result<(), PortError> {
        Err(PortError::SignerUnavailable(format!(
            "{} does not take a passphrase from the host",
            self.name()
        )))
    }

    fn derive_address(&mut self, derpath: &str) -> Result<Address, PortError>;
    fn sign(
        &mut self,
        derpath: &str,
        tx: &mut TypedUnsigned,
    ) -> Result<PrimitiveSignature, PortError>;
}

// APDU status words for a locked device or a closed Ethereum app.
const LOCKED_MARKERS: [&str; 5] = ["locked", "5515", "6511", "6d00", "6e00"];

/// Maps the outcome of opening a device session to a handshake state.
pub(crate) fn session_state(opened: Result<(), PortError>) -> Result<DeviceState, PortError> {
    match opened {
        Ok(()) => Ok(DeviceState::Ready),
        Err(e) => {
            let text = e.to_string().to_lowercase();
            if LOCKED_MARKERS.iter().any(|m| text.contains(m)) {
                Ok(DeviceState::Locked)
            } else {
                Err(e)
            }
        }
    }
}

pub struct HardwareSigner {
    address: Address,
    derpath: String,
    device: Mutex<Box<dyn HardwareDevice>>,
}

impl std::fmt::Debug for HardwareSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareSigner")
            .field("address", &self.address)
            .field("derpath", &self.derpath)
            .finish_non_exhaustive()
    }
}

impl HardwareSigner {
    /// Unlocks the device and checks it derives the registered address.
    pub fn connect(
        mut device: Box<dyn HardwareDevice>,
        account: &AccountDescriptor,
        prompter: &dyn Prompter,
    ) -> Result<Self, PortError> {
        let derpath = account
            .derpath
            .clone()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                PortError::SignerUnavailable(format!(
                    "{} has no derivation path",
                    account.address
                ))
            })?;

        let mut rounds = 0;
        loop {
            let state = device.status(&derpath)?;
            debug!(device = device.name(), ?state, rounds, "hardware status");
            match state {
                DeviceState::Ready => break,
                _ if rounds >= MAX_HANDSHAKE_ROUNDS => {
                    return Err(PortError::SignerUnavailable(format!(
                        "{} did not unlock",
                        device.name()
                    )));
                }
                DeviceState::Locked => {
                    let go_on = prompter.confirm(&format!(
                        "{} is locked. Unlock it and open the Ethereum app, then continue?",
                        device.name()
                    ))?;
                    if !go_on {
                        return Err(PortError::Aborted(format!(
                            "{} left locked",
                            device.name()
                        )));
                    }
                }
                DeviceState::NeedsPin => {
                    let pin = prompter.secret(&format!("{} PIN:", device.name()))?;
                    device.unlock_pin(&pin)?;
                }
                DeviceState::NeedsPassphrase => {
                    let passphrase =
                        prompter.secret(&format!("{} passphrase:", device.name()))?;
                    device.unlock_passphrase(&passphrase)?;
                }
            }
            rounds += 1;
        }

        let derived = device.derive_address(&derpath)?;
        if derived != account.address {
            return Err(PortError::Validation(format!(
                "{} derived {derived} at {derpath}, account is {}",
                device.name(),
                account.address
            )));
        }
        info!(device = device.name(), address = %derived, "hardware wallet connected");
        Ok(Self {
            address: derived,
            derpath,
            device: Mutex::new(device),
        })
    }
}

impl WalletSigner for HardwareSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn sign_tx(&self, tx: UnsignedTx) -> Result<SignedTx, PortError> {
        let mut device = self
            .device
            .lock()
            .map_err(|e| PortError::Transport(format!("device lock poisoned: {e}")))?;
        let mut typed = tx.to_typed();
        let signature = device.sign(&self.derpath, &mut typed)?;
        let signed = assemble_signed(tx, typed, signature)?;
        if signed.signer != self.address {
            return Err(PortError::Validation(format!(
                "device signature recovers to {}, expected {}",
                signed.signer, self.address
            )));
        }
        Ok(signed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_status_words_map_to_locked() {
        let locked = session_state(Err(PortError::SignerUnavailable(
            "ledger: APDU error 0x5515".into(),
        )));
        assert_eq!(locked.expect("state"), DeviceState::Locked);
        let closed_app = session_state(Err(PortError::SignerUnavailable(
            "ledger: status 0x6E00".into(),
        )));
        assert_eq!(closed_app.expect("state"), DeviceState::Locked);
        assert_eq!(session_state(Ok(())).expect("state"), DeviceState::Ready);
        let unplugged = session_state(Err(PortError::SignerUnavailable(
            "trezor: no device found".into(),
        )));
        assert!(matches!(unplugged, Err(PortError::SignerUnavailable(_))));
    }
}
