mod common;

use std::sync::{Arc, Mutex};

use alloy::network::TxSignerSync;
use alloy::primitives::{Address, Bytes, PrimitiveSignature, B256, U256};
use alloy::signers::local::PrivateKeySigner;

use common::QueuedPrompter;
use jarvis_adapters::signers::{DeviceState, HardwareDevice, HardwareSigner};
use jarvis_adapters::DeviceSignerFactory;
use jarvis_core::{
    AccountDescriptor, AccountKind, FeeMode, PortError, SignerFactory, TypedUnsigned, UnsignedTx,
    WalletSigner,
};

/// Device that asks for a PIN first and signs with a fixed key.
struct PinDevice {
    key: PrivateKeySigner,
    expected_pin: &'static str,
    unlocked: bool,
    locked_rounds: usize,
    pins: Arc<Mutex<Vec<String>>>,
}

impl PinDevice {
    fn new(seed: u8) -> (Self, Arc<Mutex<Vec<String>>>) {
        let pins = Arc::new(Mutex::new(Vec::new()));
        let device = Self {
            key: PrivateKeySigner::from_bytes(&B256::repeat_byte(seed)).expect("key"),
            expected_pin: "1234",
            unlocked: false,
            locked_rounds: 0,
            pins: Arc::clone(&pins),
        };
        (device, pins)
    }
}

impl HardwareDevice for PinDevice {
    fn name(&self) -> &str {
        "Fake"
    }

    fn status(&mut self, _derpath: &str) -> Result<DeviceState, PortError> {
        if self.locked_rounds > 0 {
            self.locked_rounds -= 1;
            return Ok(DeviceState::Locked);
        }
        Ok(if self.unlocked {
            DeviceState::Ready
        } else {
            DeviceState::NeedsPin
        })
    }

    fn unlock_pin(&mut self, pin: &str) -> Result<(), PortError> {
        self.pins.lock().expect("pins lock").push(pin.to_owned());
        self.unlocked = pin == self.expected_pin;
        Ok(())
    }

    fn derive_address(&mut self, _derpath: &str) -> Result<Address, PortError> {
        Ok(self.key.address())
    }

    fn sign(
        &mut self,
        _derpath: &str,
        tx: &mut TypedUnsigned,
    ) -> Result<PrimitiveSignature, PortError> {
        self.key
            .sign_transaction_sync(tx.as_signable())
            .map_err(|e| PortError::SignerUnavailable(e.to_string()))
    }
}

fn account(address: Address) -> AccountDescriptor {
    AccountDescriptor {
        address,
        kind: AccountKind::Trezor,
        keypath: None,
        derpath: Some("m/44'/60'/0'/0/0".to_owned()),
        desc: "cold storage".to_owned(),
    }
}

fn transfer() -> UnsignedTx {
    UnsignedTx {
        chain_id: 1,
        nonce: 3,
        gas_limit: 21_000,
        to: Some(Address::with_last_byte(0xb0)),
        value: U256::from(10u64).pow(U256::from(17u64)),
        data: Bytes::new(),
        fees: FeeMode::Dynamic {
            max_fee_per_gas: 30_000_000_000,
            max_priority_fee_per_gas: 2_000_000_000,
        },
    }
}

#[test]
fn pin_is_retried_until_device_unlocks() {
    let (device, pins) = PinDevice::new(0x21);
    let address = device.key.address();
    let prompter = QueuedPrompter::with_secrets(&["0000", "1234"]);

    let signer = HardwareSigner::connect(Box::new(device), &account(address), &prompter)
        .expect("connect");
    assert_eq!(signer.address(), address);
    assert_eq!(*pins.lock().expect("pins lock"), vec!["0000", "1234"]);
    assert!(prompter
        .asked
        .lock()
        .expect("asked lock")
        .iter()
        .all(|q| q.contains("PIN")));

    let signed = signer.sign_tx(transfer()).expect("sign");
    assert_eq!(signed.signer, address);
    assert_eq!(signed.tx.nonce, 3);
}

#[test]
fn pin_accepted_on_the_last_allowed_round_connects() {
    let (device, pins) = PinDevice::new(0x25);
    let address = device.key.address();
    let prompter = QueuedPrompter::with_secrets(&["0", "0", "0", "0", "1234"]);

    let signer = HardwareSigner::connect(Box::new(device), &account(address), &prompter)
        .expect("fifth pin unlocks");
    assert_eq!(signer.address(), address);
    assert_eq!(pins.lock().expect("pins lock").len(), 5);
}

#[test]
fn device_that_never_unlocks_is_unavailable() {
    let (device, pins) = PinDevice::new(0x26);
    let address = device.key.address();
    let prompter = QueuedPrompter::with_secrets(&["0", "0", "0", "0", "0", "1234"]);

    let err = HardwareSigner::connect(Box::new(device), &account(address), &prompter)
        .err()
        .expect("still locked");
    assert!(matches!(err, PortError::SignerUnavailable(_)), "{err:?}");
    assert_eq!(pins.lock().expect("pins lock").len(), 5);
}

#[test]
fn locked_device_waits_for_the_operator() {
    let (mut device, _) = PinDevice::new(0x27);
    device.locked_rounds = 1;
    let address = device.key.address();
    let prompter = QueuedPrompter::with_secrets(&["1234"]);

    let signer = HardwareSigner::connect(Box::new(device), &account(address), &prompter)
        .expect("connect after unlock on device");
    assert_eq!(signer.address(), address);
}

struct DeviceEntryOnly {
    key: PrivateKeySigner,
}

impl HardwareDevice for DeviceEntryOnly {
    fn name(&self) -> &str {
        "Keypad"
    }

    fn status(&mut self, _derpath: &str) -> Result<DeviceState, PortError> {
        Ok(DeviceState::NeedsPassphrase)
    }

    fn derive_address(&mut self, _derpath: &str) -> Result<Address, PortError> {
        Ok(self.key.address())
    }

    fn sign(
        &mut self,
        _derpath: &str,
        _tx: &mut TypedUnsigned,
    ) -> Result<PrimitiveSignature, PortError> {
        Err(PortError::SignerUnavailable("unused".into()))
    }
}

#[test]
fn host_secret_is_refused_by_devices_without_host_entry() {
    let key = PrivateKeySigner::from_bytes(&B256::repeat_byte(0x28)).expect("key");
    let address = key.address();
    let prompter = QueuedPrompter::with_secrets(&["hunter2"]);
    let err = HardwareSigner::connect(Box::new(DeviceEntryOnly { key }), &account(address), &prompter)
        .err()
        .expect("no host passphrase");
    assert!(matches!(err, PortError::SignerUnavailable(_)), "{err:?}");
    assert!(err.to_string().contains("passphrase"));
}

#[test]
fn device_deriving_another_address_is_rejected() {
    let (device, _) = PinDevice::new(0x22);
    let prompter = QueuedPrompter::with_secrets(&["1234"]);
    let err = HardwareSigner::connect(
        Box::new(device),
        &account(Address::with_last_byte(0x01)),
        &prompter,
    )
    .err()
    .expect("address mismatch");
    assert!(matches!(err, PortError::Validation(_)), "{err:?}");
}

#[test]
fn cancelled_pin_prompt_aborts() {
    let (device, _) = PinDevice::new(0x23);
    let address = device.key.address();
    let prompter = QueuedPrompter::default();
    let err = HardwareSigner::connect(Box::new(device), &account(address), &prompter)
        .err()
        .expect("no pin");
    assert!(matches!(err, PortError::Aborted(_)));
}

#[test]
fn factory_routes_hardware_kinds_to_the_device_opener() {
    let prompter = Arc::new(QueuedPrompter::with_secrets(&["1234"]));
    let key = PrivateKeySigner::from_bytes(&B256::repeat_byte(0x24)).expect("key");
    let address = key.address();
    let factory = DeviceSignerFactory::new(prompter).with_opener(|kind| {
        assert_eq!(kind, AccountKind::Trezor);
        let (device, _) = PinDevice::new(0x24);
        Ok(Box::new(device) as Box<dyn HardwareDevice>)
    });

    let signer = factory.unlock(&account(address)).expect("unlock");
    assert_eq!(signer.address(), address);
}

#[test]
fn keystore_without_file_is_unavailable() {
    let factory = DeviceSignerFactory::new(Arc::new(QueuedPrompter::default()));
    let missing = AccountDescriptor {
        address: Address::with_last_byte(0x05),
        kind: AccountKind::Keystore,
        keypath: Some("/nonexistent/keystore.json".into()),
        derpath: None,
        desc: String::new(),
    };
    let err = factory.unlock(&missing).err().expect("missing keystore");
    assert!(matches!(err, PortError::SignerUnavailable(_)));
    assert_eq!(err.exit_code(), 126);
}
