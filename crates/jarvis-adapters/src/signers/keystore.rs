use std::path::Path;

use alloy::network::TxSignerSync;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use tracing::warn;

use jarvis_core::{assemble_signed, PortError, Prompter, SignedTx, UnsignedTx, WalletSigner};

const PASSPHRASE_ATTEMPTS: usize = 3;

/// Decrypted JSON keystore held in memory for the rest of the process.
#[derive(Debug, Clone)]
pub struct KeystoreSigner {
    inner: PrivateKeySigner,
}

impl KeystoreSigner {
    pub fn from_signer(inner: PrivateKeySigner) -> Self {
        Self { inner }
    }

    pub fn decrypt(path: &Path, passphrase: &str) -> Result<Self, PortError> {
        PrivateKeySigner::decrypt_keystore(path, passphrase)
            .map(Self::from_signer)
            .map_err(|e| PortError::SignerUnavailable(format!("{}: {e}", path.display())))
    }

    /// Prompts for the passphrase until the keystore opens.
    pub fn unlock(path: &Path, label: &str, prompter: &dyn Prompter) -> Result<Self, PortError> {
        if !path.is_file() {
            return Err(PortError::SignerUnavailable(format!(
                "keystore file {} not found",
                path.display()
            )));
        }
        let mut last = None;
        for attempt in 1..=PASSPHRASE_ATTEMPTS {
            let passphrase = prompter.secret(&format!("Passphrase for {label}:"))?;
            match Self::decrypt(path, &passphrase) {
                Ok(signer) => return Ok(signer),
                Err(e) => {
                    warn!(attempt, error = %e, "keystore did not open");
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or_else(|| PortError::SignerUnavailable(label.to_owned())))
    }
}

impl WalletSigner for KeystoreSigner {
    fn address(&self) -> Address {
        self.inner.address()
    }

    fn sign_tx(&self, tx: UnsignedTx) -> Result<SignedTx, PortError> {
        let mut typed = tx.to_typed();
        let signature = self
            .inner
            .sign_transaction_sync(typed.as_signable())
            .map_err(|e| PortError::SignerUnavailable(format!("keystore signing failed: {e}")))?;
        assemble_signed(tx, typed, signature)
    }
}
