#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alloy::dyn_abi::DynSolValue;
use alloy::json_abi::JsonAbi;
use alloy::network::TxSignerSync;
use alloy::primitives::{keccak256, Address, Bytes, B256, U128, U256, U64};
use alloy::signers::local::PrivateKeySigner;

use jarvis_core::abis;
use jarvis_core::tx::assemble_signed;
use jarvis_core::{
    AbiProvider, AccountDescriptor, AccountKind, AddressMatch, AddressResolver, BroadcastOutcome,
    CallRequest, ChainBackend, ChainReader, ClockPort, Context, ExplorerPort, KvCache,
    MetadataService, Network, NodeFailure, NoopObserver, Orchestrator, PortError, Prompter,
    RpcHeader, RpcLog, RpcReceipt, RpcTransaction, SignedTx, SignerFactory, TxBroadcaster,
    UnsignedTx, WalletSigner,
};

pub const STAKING_ABI: &str = r#"[
  {"type":"function","name":"stake","stateMutability":"nonpayable","inputs":[{"name":"amount","type":"uint256"}],"outputs":[]},
  {"type":"function","name":"staked","stateMutability":"view","inputs":[{"name":"who","type":"address"}],"outputs":[{"name":"","type":"uint256"}]}
]"#;

pub const PROXY_ABI: &str = r#"[
  {"type":"function","name":"upgradeTo","stateMutability":"nonpayable","inputs":[{"name":"newImplementation","type":"address"}],"outputs":[]}
]"#;

pub fn addr(last: u8) -> Address {
    Address::with_last_byte(last)
}

pub fn network() -> Network {
    Network {
        name: "testnet".to_owned(),
        alternative_names: vec!["test".to_owned()],
        chain_id: 1337,
        native_token_symbol: "ETH".to_owned(),
        native_token_decimal: 18,
        block_time: 2,
        node_variable_name: "TESTNET_NODE".to_owned(),
        default_nodes: BTreeMap::from([("local".to_owned(), "http://127.0.0.1:8545".to_owned())]),
        block_explorer_api_key_variable_name: "TEST_API_KEY".to_owned(),
        block_explorer_api_url: "http://127.0.0.1:1/api".to_owned(),
        multi_call_contract_address: None,
    }
}

pub fn encode_ret(values: Vec<DynSolValue>) -> Bytes {
    Bytes::from(DynSolValue::Tuple(values).abi_encode_params())
}

// --- node pool ---

#[derive(Debug, Default, Clone)]
pub struct ChainScript {
    pub code: HashMap<Address, Bytes>,
    pub balances: HashMap<Address, U256>,
    /// (mined, pending)
    pub nonces: HashMap<Address, (u64, u64)>,
    pub storage: HashMap<(Address, B256), B256>,
    pub calls: HashMap<(Address, [u8; 4]), Bytes>,
    pub base_fee: u128,
    pub gas_price: u128,
    pub gas_tip: u128,
    pub estimate: u64,
    /// When set, every looked-up hash is mined with this receipt status.
    pub mined_status: Option<u64>,
}

#[derive(Debug, Default)]
pub struct ScriptedReader {
    pub script: Mutex<ChainScript>,
    pub nonce_queries: AtomicUsize,
    pub gas_price_queries: AtomicUsize,
}

impl ScriptedReader {
    pub fn new(script: ChainScript) -> Self {
        Self {
            script: Mutex::new(script),
            ..Default::default()
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut ChainScript) -> R) -> R {
        let mut guard = self.script.lock().expect("script lock");
        f(&mut guard)
    }
}

impl ChainReader for ScriptedReader {
    fn get_code(&self, address: Address) -> Result<Bytes, PortError> {
        Ok(self.with(|s| s.code.get(&address).cloned().unwrap_or_default()))
    }

    fn get_balance(&self, address: Address) -> Result<U256, PortError> {
        Ok(self.with(|s| s.balances.get(&address).copied().unwrap_or_default()))
    }

    fn get_mined_nonce(&self, address: Address) -> Result<u64, PortError> {
        self.nonce_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.with(|s| s.nonces.get(&address).map(|n| n.0).unwrap_or(0)))
    }

    fn get_pending_nonce(&self, address: Address) -> Result<u64, PortError> {
        Ok(self.with(|s| s.nonces.get(&address).map(|n| n.1).unwrap_or(0)))
    }

    fn transaction_by_hash(&self, hash: B256) -> Result<Option<RpcTransaction>, PortError> {
        Ok(self.with(|s| {
            s.mined_status.map(|_| RpcTransaction {
                hash,
                from: addr(0xa1),
                to: Some(addr(0xb0)),
                nonce: U64::from(5u64),
                value: U256::from(1u64),
                input: Bytes::new(),
                gas: U64::from(21_000u64),
                gas_price: Some(U128::from(1u64)),
                max_fee_per_gas: None,
                max_priority_fee_per_gas: None,
                block_number: Some(U64::from(100u64)),
                tx_type: None,
            })
        }))
    }

    fn transaction_receipt(&self, hash: B256) -> Result<Option<RpcReceipt>, PortError> {
        Ok(self.with(|s| {
            s.mined_status.map(|status| RpcReceipt {
                transaction_hash: hash,
                status: Some(U64::from(status)),
                block_number: Some(U64::from(100u64)),
                gas_used: U64::from(21_000u64),
                effective_gas_price: None,
                contract_address: None,
                logs: Vec::new(),
            })
        }))
    }

    fn header_by_number(&self, number: Option<u64>) -> Result<RpcHeader, PortError> {
        let base_fee = self.with(|s| s.base_fee);
        Ok(RpcHeader {
            number: U64::from(number.unwrap_or(100)),
            hash: None,
            base_fee_per_gas: (base_fee > 0).then(|| U128::from(base_fee)),
            timestamp: U64::from(1_700_000_000u64),
        })
    }

    fn estimate_gas(&self, _call: &CallRequest) -> Result<u64, PortError> {
        Ok(self.with(|s| s.estimate))
    }

    fn suggest_gas_price(&self) -> Result<u128, PortError> {
        self.gas_price_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.with(|s| s.gas_price))
    }

    fn suggest_gas_tip(&self) -> Result<u128, PortError> {
        Ok(self.with(|s| s.gas_tip))
    }

    fn call_contract(&self, call: &CallRequest, _block: Option<u64>) -> Result<Bytes, PortError> {
        let (Some(to), Some(data)) = (call.to, call.data.as_ref()) else {
            return Ok(Bytes::new());
        };
        if data.len() < 4 {
            return Ok(Bytes::new());
        }
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&data[..4]);
        Ok(self.with(|s| s.calls.get(&(to, selector)).cloned().unwrap_or_default()))
    }

    fn storage_at(&self, address: Address, slot: B256) -> Result<B256, PortError> {
        Ok(self.with(|s| s.storage.get(&(address, slot)).copied().unwrap_or_default()))
    }

    fn filter_logs(&self, _filter: &jarvis_core::domain::LogFilter) -> Result<Vec<RpcLog>, PortError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Default)]
pub struct FakeBroadcaster {
    pub reject: Mutex<bool>,
    pub sent: Mutex<Vec<Bytes>>,
}

impl TxBroadcaster for FakeBroadcaster {
    fn broadcast(&self, raw: &Bytes) -> BroadcastOutcome {
        self.sent.lock().expect("sent lock").push(raw.clone());
        let reject = *self.reject.lock().expect("reject lock");
        BroadcastOutcome {
            tx_hash: keccak256(raw),
            accepted: !reject,
            errors: if reject {
                vec![NodeFailure {
                    label: "local".to_owned(),
                    message: "nonce too low".to_owned(),
                }]
            } else {
                Vec::new()
            },
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeExplorer {
    pub abis: Mutex<HashMap<Address, String>>,
    pub calls: AtomicUsize,
}

impl FakeExplorer {
    pub fn insert(&self, address: Address, abi: &str) {
        self.abis
            .lock()
            .expect("explorer lock")
            .insert(address, abi.to_owned());
    }
}

impl ExplorerPort for FakeExplorer {
    fn fetch_abi(&self, address: Address) -> Result<String, PortError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.abis
            .lock()
            .expect("explorer lock")
            .get(&address)
            .cloned()
            .ok_or_else(|| PortError::Explorer("Contract source code not verified".to_owned()))
    }
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    data: Mutex<HashMap<String, String>>,
}

impl KvCache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        self.data
            .lock()
            .expect("cache lock")
            .get(&key.to_lowercase())
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.data
            .lock()
            .expect("cache lock")
            .insert(key.to_lowercase(), value.to_owned());
    }
}

#[derive(Debug, Default)]
pub struct StaticResolver {
    entries: Vec<(Address, String)>,
}

impl StaticResolver {
    pub fn new(entries: &[(Address, &str)]) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|(a, d)| (*a, d.to_string()))
                .collect(),
        }
    }
}

impl AddressResolver for StaticResolver {
    fn resolve(&self, input: &str) -> Result<(Address, String), PortError> {
        self.search(input)
            .into_iter()
            .next()
            .map(|m| (m.address, m.description))
            .ok_or_else(|| PortError::UserInput(format!("no address matches '{input}'")))
    }

    fn search(&self, input: &str) -> Vec<AddressMatch> {
        let needle = input.to_lowercase();
        self.entries
            .iter()
            .filter(|(_, d)| d.to_lowercase() == needle)
            .map(|(a, d)| AddressMatch {
                address: *a,
                description: d.clone(),
                score: 1.0,
            })
            .collect()
    }

    fn describe(&self, address: Address) -> Option<String> {
        self.entries
            .iter()
            .find(|(a, _)| *a == address)
            .map(|(_, d)| d.clone())
    }
}

// --- signing ---

pub struct LocalKeySigner(pub PrivateKeySigner);

impl LocalKeySigner {
    pub fn from_seed(seed: u8) -> Self {
        Self(PrivateKeySigner::from_bytes(&B256::repeat_byte(seed)).expect("valid key"))
    }
}

impl WalletSigner for LocalKeySigner {
    fn address(&self) -> Address {
        self.0.address()
    }

    fn sign_tx(&self, tx: UnsignedTx) -> Result<SignedTx, PortError> {
        let mut typed = tx.to_typed();
        let signature = self
            .0
            .sign_transaction_sync(typed.as_signable())
            .map_err(|e| PortError::SignerUnavailable(e.to_string()))?;
        assemble_signed(tx, typed, signature)
    }
}

#[derive(Default)]
pub struct FakeSignerFactory {
    pub signers: Mutex<HashMap<Address, Arc<dyn WalletSigner>>>,
    pub unlocks: AtomicUsize,
}

impl FakeSignerFactory {
    pub fn insert(&self, address: Address, signer: Arc<dyn WalletSigner>) {
        self.signers
            .lock()
            .expect("signers lock")
            .insert(address, signer);
    }
}

impl SignerFactory for FakeSignerFactory {
    fn unlock(&self, account: &AccountDescriptor) -> Result<Arc<dyn WalletSigner>, PortError> {
        self.unlocks.fetch_add(1, Ordering::SeqCst);
        self.signers
            .lock()
            .expect("signers lock")
            .get(&account.address)
            .cloned()
            .ok_or_else(|| PortError::SignerUnavailable(format!("no device for {}", account.address)))
    }
}

// --- operator and time ---

#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    pub confirms: Mutex<VecDeque<bool>>,
    pub inputs: Mutex<VecDeque<String>>,
    pub selects: Mutex<VecDeque<usize>>,
    pub confirm_prompts: AtomicUsize,
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, _message: &str) -> Result<bool, PortError> {
        self.confirm_prompts.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .confirms
            .lock()
            .expect("confirms lock")
            .pop_front()
            .unwrap_or(true))
    }

    fn input(&self, message: &str) -> Result<String, PortError> {
        self.inputs
            .lock()
            .expect("inputs lock")
            .pop_front()
            .ok_or_else(|| PortError::Aborted(format!("no scripted answer for '{message}'")))
    }

    fn secret(&self, message: &str) -> Result<String, PortError> {
        self.input(message)
    }

    fn select(&self, message: &str, _options: &[String]) -> Result<usize, PortError> {
        self.selects
            .lock()
            .expect("selects lock")
            .pop_front()
            .ok_or_else(|| PortError::Aborted(format!("no scripted choice for '{message}'")))
    }
}

#[derive(Debug)]
pub struct ManualClock {
    now: AtomicU64,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: AtomicU64::new(1_739_750_400_000),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl ClockPort for ManualClock {
    fn now_ms(&self) -> Result<u64, PortError> {
        Ok(self.now.load(Ordering::SeqCst))
    }

    fn sleep_ms(&self, ms: u64) {
        self.advance(ms);
    }
}

// --- wiring ---

pub struct FakeBackend {
    pub reader: Arc<ScriptedReader>,
    pub broadcaster: Arc<FakeBroadcaster>,
    pub explorer: Arc<FakeExplorer>,
    pub cache: Arc<MemoryCache>,
}

impl ChainBackend for FakeBackend {
    fn reader(&self, _network: &Network) -> Result<Arc<dyn ChainReader>, PortError> {
        Ok(self.reader.clone())
    }

    fn broadcaster(&self, _network: &Network) -> Result<Arc<dyn TxBroadcaster>, PortError> {
        Ok(self.broadcaster.clone())
    }

    fn abi_provider(
        &self,
        _network: &Network,
        reader: Arc<dyn ChainReader>,
    ) -> Result<Arc<dyn AbiProvider>, PortError> {
        Ok(Arc::new(MetadataService::new(
            reader,
            self.explorer.clone(),
            self.cache.clone(),
        )))
    }
}

pub struct Harness {
    pub reader: Arc<ScriptedReader>,
    pub broadcaster: Arc<FakeBroadcaster>,
    pub explorer: Arc<FakeExplorer>,
    pub cache: Arc<MemoryCache>,
    pub prompter: Arc<ScriptedPrompter>,
    pub clock: Arc<ManualClock>,
    pub signers: Arc<FakeSignerFactory>,
    pub context: Arc<Context>,
    pub resolver: Arc<StaticResolver>,
    pub alice: AccountDescriptor,
    pub bob: Address,
    pub knc: Address,
    pub msig: Address,
    pub staking: Address,
}

impl Harness {
    pub fn new() -> Self {
        let alice_key = LocalKeySigner::from_seed(0x11);
        let alice = AccountDescriptor {
            address: alice_key.address(),
            kind: AccountKind::Keystore,
            keypath: Some("/tmp/alice.json".into()),
            derpath: None,
            desc: "alice".to_owned(),
        };
        let bob = addr(0xb0);
        let knc = addr(0x4e);
        let msig = addr(0x5a);
        let staking = addr(0x57);

        let erc20 = abis::erc20().expect("erc20 abi");
        let msig_abi = abis::gnosis_multisig().expect("multisig abi");
        let selector = |abi: &JsonAbi, name: &str| -> [u8; 4] {
            abis::function_named(abi, name)
                .expect("function")
                .selector()
                .0
        };

        let mut script = ChainScript {
            base_fee: 10_000_000_000,
            gas_price: 30_000_000_000,
            gas_tip: 2_000_000_000,
            estimate: 60_000,
            ..Default::default()
        };
        script.nonces.insert(alice.address, (5, 5));
        script
            .balances
            .insert(alice.address, U256::from(10u64).pow(U256::from(18u64)));
        for contract in [knc, msig, staking] {
            script.code.insert(contract, Bytes::from(vec![0x60, 0x80]));
        }
        script.calls.insert(
            (knc, selector(&erc20, "decimals")),
            encode_ret(vec![DynSolValue::Uint(U256::from(18u64), 256)]),
        );
        script.calls.insert(
            (knc, selector(&erc20, "symbol")),
            encode_ret(vec![DynSolValue::String("KNC".to_owned())]),
        );
        script.calls.insert(
            (msig, selector(&msig_abi, "getOwners")),
            encode_ret(vec![DynSolValue::Array(vec![
                DynSolValue::Address(addr(0x99)),
                DynSolValue::Address(alice.address),
            ])]),
        );

        let reader = Arc::new(ScriptedReader::new(script));
        let broadcaster = Arc::new(FakeBroadcaster::default());
        let explorer = Arc::new(FakeExplorer::default());
        explorer.insert(knc, abis::ERC20_ABI_JSON);
        explorer.insert(msig, abis::GNOSIS_MULTISIG_ABI_JSON);
        explorer.insert(staking, STAKING_ABI);
        let cache = Arc::new(MemoryCache::default());
        let clock = Arc::new(ManualClock::default());
        let signers = Arc::new(FakeSignerFactory::default());
        signers.insert(alice.address, Arc::new(alice_key));

        let backend = Arc::new(FakeBackend {
            reader: reader.clone(),
            broadcaster: broadcaster.clone(),
            explorer: explorer.clone(),
            cache: cache.clone(),
        });
        let context = Arc::new(Context::new(backend, signers.clone(), clock.clone()));
        let resolver = Arc::new(StaticResolver::new(&[
            (alice.address, "alice"),
            (bob, "bob"),
            (knc, "KNC token"),
            (msig, "team multisig"),
            (staking, "staking pool"),
        ]));

        Self {
            reader,
            broadcaster,
            explorer,
            cache,
            prompter: Arc::new(ScriptedPrompter::default()),
            clock,
            signers,
            context,
            resolver,
            alice,
            bob,
            knc,
            msig,
            staking,
        }
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            self.context.clone(),
            network(),
            self.resolver.clone(),
            vec![self.alice.clone()],
            self.prompter.clone(),
            Arc::new(NoopObserver),
        )
    }
}
