//! Per-action pipelines: resolve, prepare, compose, build, confirm, sign,
//! broadcast, monitor and analyze.

use std::sync::Arc;

use alloy::dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt};
use alloy::json_abi::{Function, JsonAbi};
use alloy::primitives::{Address, Bytes, B256, U256};
use serde::Serialize;
use tracing::{info, warn};

use crate::abis::{self, function_named, listed_functions};
use crate::context::Context;
use crate::decoder::{decode_revert, revert_data, Decoder};
use crate::domain::{
    join_failures, AccountDescriptor, CallRequest, DecodedLog, DecodedParam, FunctionCall,
    GasInfo, Network, NodeFailure, RpcReceipt, RpcTransaction, TxInfo, TxStatus,
};
use crate::params::{
    float_to_big_int, is_address, parse_address_hex, value_to_amount_and_currency, ParamEngine,
    Renderer,
};
use crate::ports::{
    AbiProvider, ActionObserver, AddressResolver, ChainReader, PortError, Prompter,
};
use crate::state_machine::{action_transition, ActionEvent, ActionState, StateTransition};
use crate::tx::{FeeMode, UnsignedTx};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TxOptions {
    pub gas_price_gwei: Option<f64>,
    pub extra_gas_price_gwei: f64,
    pub tip_gwei: Option<f64>,
    pub gas_limit: Option<u64>,
    pub extra_gas_limit: u64,
    pub nonce: Option<u64>,
    pub dry_run: bool,
    pub no_wait: bool,
    pub retry_broadcast: bool,
    pub force_legacy: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub poll_ms: u64,
    /// Time without any node seeing the hash before it is declared lost.
    pub lost_after_ms: u64,
    /// Extra broadcast attempts when `retry_broadcast` is set.
    pub broadcast_retries: u32,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_ms: 5_000,
            lost_after_ms: 180_000,
            broadcast_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum AbiSource {
    #[default]
    Fetch,
    Erc20,
    Custom(JsonAbi),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodChoice {
    Prompt,
    Index(usize),
    Name(String),
}

#[derive(Debug, Clone)]
pub struct SendRequest {
    pub from: String,
    pub to: String,
    /// `"1.5"`, `"1.5 KNC"` or `"ALL"`.
    pub amount: String,
}

#[derive(Debug, Clone)]
pub struct ContractCallRequest {
    pub from: Option<String>,
    pub contract: String,
    pub method: MethodChoice,
    /// Pipe separated argument values; `?` prompts for that argument.
    pub prefills: Option<String>,
    pub value: Option<String>,
    pub abi: AbiSource,
}

#[derive(Debug, Clone)]
pub struct MsigInitRequest {
    pub from: Option<String>,
    pub msig: String,
    pub target: ContractCallRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsigVote {
    Approve,
    Revoke,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub action: String,
    pub state: ActionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<B256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TxStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx: Option<UnsignedTx>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call: Option<FunctionCall>,
    pub logs: Vec<DecodedLog>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub broadcast_errors: Vec<NodeFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<DecodedParam>,
    pub transitions: Vec<StateTransition>,
}

impl ActionOutcome {
    fn new(action: &str) -> Self {
        Self {
            action: action.to_owned(),
            state: ActionState::Parsing,
            tx_hash: None,
            status: None,
            nonce: None,
            tx: None,
            call: None,
            logs: Vec::new(),
            broadcast_errors: Vec::new(),
            revert_reason: None,
            outputs: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match (self.state, self.status) {
            (ActionState::Aborted, _) => 1,
            (ActionState::Failed, _) => 2,
            (_, Some(TxStatus::Reverted)) | (_, Some(TxStatus::Lost)) => 2,
            (_, Some(TxStatus::NotFound)) => 1,
            _ => 0,
        }
    }
}

struct Run<'o> {
    outcome: ActionOutcome,
    observer: &'o dyn ActionObserver,
}

impl<'o> Run<'o> {
    fn new(action: &str, observer: &'o dyn ActionObserver) -> Self {
        Self {
            outcome: ActionOutcome::new(action),
            observer,
        }
    }

    fn advance(&mut self, event: ActionEvent) -> Result<(), PortError> {
        let (to, transition) = action_transition(self.outcome.state, event)?;
        info!(
            action = %self.outcome.action,
            from = ?transition.from,
            to = ?transition.to,
            reason = transition.reason,
            "action transition"
        );
        self.observer.transition(&transition);
        self.outcome.state = to;
        self.outcome.transitions.push(transition);
        Ok(())
    }

    fn finish<T>(mut self, result: Result<T, PortError>) -> Result<ActionOutcome, PortError> {
        match result {
            Ok(_) => Ok(self.outcome),
            Err(e) => {
                if !self.outcome.state.is_terminal() {
                    warn!(action = %self.outcome.action, error = %e, "action failed");
                    if let Err(fail) = self.advance(ActionEvent::Fail) {
                        warn!(action = %self.outcome.action, error = %fail, "failure not recorded");
                    }
                }
                Err(e)
            }
        }
    }
}

#[derive(Clone, Copy)]
enum ValueSpec {
    Exact(U256),
    /// Whole native balance minus the gas cost.
    All,
}

struct TxPlan {
    sender: AccountDescriptor,
    to: Address,
    value: ValueSpec,
    data: Bytes,
    /// ABI used for the confirmation preview of the outer call.
    preview_abi: Option<JsonAbi>,
    /// Extra decoded call shown under the preview (multisig votes).
    preview_inner: Option<FunctionCall>,
}

struct ComposedCall {
    contract: Address,
    function: Function,
    abi: JsonAbi,
    data: Bytes,
    value: U256,
}

pub struct Orchestrator {
    context: Arc<Context>,
    network: Network,
    resolver: Arc<dyn AddressResolver>,
    accounts: Vec<AccountDescriptor>,
    prompter: Arc<dyn Prompter>,
    observer: Arc<dyn ActionObserver>,
    settings: MonitorSettings,
}

impl Orchestrator {
    pub fn new(
        context: Arc<Context>,
        network: Network,
        resolver: Arc<dyn AddressResolver>,
        accounts: Vec<AccountDescriptor>,
        prompter: Arc<dyn Prompter>,
        observer: Arc<dyn ActionObserver>,
    ) -> Self {
        Self {
            context,
            network,
            resolver,
            accounts,
            prompter,
            observer,
            settings: MonitorSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: MonitorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    fn reader(&self) -> Result<Arc<dyn ChainReader>, PortError> {
        self.context.reader(&self.network)
    }

    fn abis(&self) -> Result<Arc<dyn AbiProvider>, PortError> {
        self.context.abi_provider(&self.network)
    }

    fn engine<'a>(&'a self, abis: &'a dyn AbiProvider) -> ParamEngine<'a> {
        ParamEngine::new(&self.network, self.resolver.as_ref(), abis)
    }

    fn decoder<'a>(&'a self, abis: &'a dyn AbiProvider) -> Decoder<'a> {
        Decoder::new(&self.network, abis, Some(self.resolver.as_ref()))
    }

    fn resolve(&self, name: &str, input: &str) -> Result<Address, PortError> {
        if is_address(input) {
            return parse_address_hex(input);
        }
        let abis = self.abis()?;
        self.engine(abis.as_ref()).parse_address(name, input)
    }

    fn account(&self, address: Address) -> Option<&AccountDescriptor> {
        self.accounts.iter().find(|a| a.address == address)
    }

    fn wallet(&self, input: &str) -> Result<AccountDescriptor, PortError> {
        let address = self.resolve("from", input)?;
        self.account(address).cloned().ok_or_else(|| {
            PortError::UserInput(format!("{address} ({input}) is not in the wallet book"))
        })
    }

    fn call_view(
        &self,
        contract: Address,
        function: &Function,
        args: &[DynSolValue],
    ) -> Result<Vec<DynSolValue>, PortError> {
        let data = function
            .abi_encode_input(args)
            .map_err(|e| PortError::UserInput(format!("abi encoding failed: {e}")))?;
        let call = CallRequest {
            to: Some(contract),
            data: Some(Bytes::from(data)),
            ..Default::default()
        };
        let out = self.reader()?.call_contract(&call, None)?;
        function.abi_decode_output(&out, true).map_err(|e| {
            PortError::Validation(format!("cannot decode {} output: {e}", function.name))
        })
    }

    /// First wallet-book account listed by the multisig's `getOwners()`.
    pub fn msig_owner(&self, msig: Address) -> Result<AccountDescriptor, PortError> {
        let abi = abis::gnosis_multisig()?;
        let get_owners = function_named(&abi, "getOwners")?;
        let owners = match self.call_view(msig, get_owners, &[])?.into_iter().next() {
            Some(DynSolValue::Array(items)) => items
                .into_iter()
                .filter_map(|v| v.as_address())
                .collect::<Vec<_>>(),
            _ => Vec::new(),
        };
        owners
            .iter()
            .find_map(|owner| self.account(*owner).cloned())
            .ok_or_else(|| {
                PortError::UserInput(format!("no wallet in the book owns multisig {msig}"))
            })
    }

    fn wrap_submit(
        &self,
        destination: Address,
        value: U256,
        data: Bytes,
    ) -> Result<Bytes, PortError> {
        let abi = abis::gnosis_multisig()?;
        let submit = function_named(&abi, "submitTransaction")?;
        submit
            .abi_encode_input(&[
                DynSolValue::Address(destination),
                DynSolValue::Uint(value, 256),
                DynSolValue::Bytes(data.to_vec()),
            ])
            .map(Bytes::from)
            .map_err(|e| PortError::UserInput(format!("abi encoding failed: {e}")))
    }

    // --- actions ---

    pub fn send(&self, req: &SendRequest, opts: &TxOptions) -> Result<ActionOutcome, PortError> {
        let mut run = Run::new("send", self.observer.as_ref());
        let result = self.send_inner(&mut run, req, opts);
        run.finish(result)
    }

    fn send_inner(
        &self,
        run: &mut Run<'_>,
        req: &SendRequest,
        opts: &TxOptions,
    ) -> Result<(), PortError> {
        let from = self.resolve("from", &req.from)?;
        let to = self.resolve("to", &req.to)?;
        let reader = self.reader()?;
        let msig = match self.account(from) {
            Some(_) => None,
            None if !reader.get_code(from)?.is_empty() => Some(from),
            None => {
                return Err(PortError::UserInput(format!(
                    "{from} ({}) is neither a wallet nor a multisig",
                    req.from
                )))
            }
        };
        let sender = match msig {
            Some(msig) => self.msig_owner(msig)?,
            None => self.wallet(&req.from)?,
        };
        run.advance(ActionEvent::TargetsResolved)?;

        let abis = self.abis()?;
        let (dest, value, data, preview_abi) = if req.amount.trim().eq_ignore_ascii_case("ALL") {
            let value = match msig {
                Some(msig) => ValueSpec::Exact(reader.get_balance(msig)?),
                None => ValueSpec::All,
            };
            (to, value, Bytes::new(), None)
        } else {
            let (amount, currency) =
                value_to_amount_and_currency(&req.amount, &self.network.native_token_symbol)?;
            let (decimals, token) = self.engine(abis.as_ref()).currency_decimals(&currency)?;
            let units = float_to_big_int(amount, decimals)?;
            match token {
                None => (to, ValueSpec::Exact(units), Bytes::new(), None),
                Some(token) => {
                    let erc20 = abis::erc20()?;
                    let transfer = function_named(&erc20, "transfer")?;
                    let data = transfer
                        .abi_encode_input(&[
                            DynSolValue::Address(to),
                            DynSolValue::Uint(units, 256),
                        ])
                        .map_err(|e| PortError::UserInput(format!("abi encoding failed: {e}")))?;
                    (token, ValueSpec::Exact(U256::ZERO), Bytes::from(data), Some(erc20))
                }
            }
        };
        run.advance(ActionEvent::MetadataLoaded)?;

        let plan = match msig {
            Some(msig) => {
                let inner_value = match value {
                    ValueSpec::Exact(v) => v,
                    ValueSpec::All => U256::ZERO,
                };
                TxPlan {
                    sender,
                    to: msig,
                    value: ValueSpec::Exact(U256::ZERO),
                    data: self.wrap_submit(dest, inner_value, data)?,
                    preview_abi: Some(abis::gnosis_multisig()?),
                    preview_inner: None,
                }
            }
            None => TxPlan {
                sender,
                to: dest,
                value,
                data,
                preview_abi,
                preview_inner: None,
            },
        };
        run.advance(ActionEvent::ParamsEncoded)?;
        self.execute(run, plan, opts)
    }

    pub fn contract_tx(
        &self,
        req: &ContractCallRequest,
        opts: &TxOptions,
    ) -> Result<ActionOutcome, PortError> {
        let mut run = Run::new("contract_tx", self.observer.as_ref());
        let result = self.contract_tx_inner(&mut run, req, opts);
        run.finish(result)
    }

    fn contract_tx_inner(
        &self,
        run: &mut Run<'_>,
        req: &ContractCallRequest,
        opts: &TxOptions,
    ) -> Result<(), PortError> {
        let from = req
            .from
            .as_deref()
            .ok_or_else(|| PortError::UserInput("a sending wallet is required".to_owned()))?;
        let sender = self.wallet(from)?;
        let composed = self.compose(run, req, false)?;
        let plan = TxPlan {
            sender,
            to: composed.contract,
            value: ValueSpec::Exact(composed.value),
            data: composed.data,
            preview_abi: Some(composed.abi),
            preview_inner: None,
        };
        self.execute(run, plan, opts)
    }

    /// Resolves the contract, loads its ABI, picks the method and encodes the
    /// arguments, advancing `run` up to `Composed`.
    fn compose(
        &self,
        run: &mut Run<'_>,
        req: &ContractCallRequest,
        read_only: bool,
    ) -> Result<ComposedCall, PortError> {
        let contract = self.resolve("contract", &req.contract)?;
        run.advance(ActionEvent::TargetsResolved)?;

        let abis = self.abis()?;
        let abi = match &req.abi {
            AbiSource::Fetch => abis.get_abi(contract)?,
            AbiSource::Erc20 => abis::erc20()?,
            AbiSource::Custom(abi) => abi.clone(),
        };
        let function = self.pick_method(&abi, &req.method, read_only)?;
        run.advance(ActionEvent::MetadataLoaded)?;

        let args = self.collect_args(&function, req.prefills.as_deref())?;
        let data = self.engine(abis.as_ref()).encode_call(&function, &args)?;
        let value = match req.value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            Some(raw) => {
                let (amount, currency) =
                    value_to_amount_and_currency(raw, &self.network.native_token_symbol)?;
                if !currency.eq_ignore_ascii_case(&self.network.native_token_symbol) {
                    return Err(PortError::UserInput(format!(
                        "call value must be in {}, got '{raw}'",
                        self.network.native_token_symbol
                    )));
                }
                float_to_big_int(amount, self.network.native_token_decimal)?
            }
            None => U256::ZERO,
        };
        run.advance(ActionEvent::ParamsEncoded)?;
        Ok(ComposedCall {
            contract,
            function,
            abi,
            data,
            value,
        })
    }

    fn pick_method(
        &self,
        abi: &JsonAbi,
        choice: &MethodChoice,
        read_only: bool,
    ) -> Result<Function, PortError> {
        let methods = listed_functions(abi, read_only);
        if methods.is_empty() {
            return Err(PortError::UserInput(format!(
                "abi has no {} methods",
                if read_only { "read" } else { "write" }
            )));
        }
        let index = match choice {
            MethodChoice::Index(i) => *i,
            MethodChoice::Name(name) => methods
                .iter()
                .position(|f| f.name == *name || f.signature() == *name)
                .ok_or_else(|| PortError::UserInput(format!("no matching method '{name}'")))?,
            MethodChoice::Prompt => {
                let options: Vec<String> = methods
                    .iter()
                    .enumerate()
                    .map(|(i, f)| format!("{i}. {}", f.signature()))
                    .collect();
                self.prompter.select("Method", &options)?
            }
        };
        methods.get(index).map(|f| (*f).clone()).ok_or_else(|| {
            PortError::UserInput(format!(
                "method index {index} out of range (0..{})",
                methods.len()
            ))
        })
    }

    fn collect_args(
        &self,
        function: &Function,
        prefills: Option<&str>,
    ) -> Result<Vec<String>, PortError> {
        let filled: Vec<String> = match prefills {
            Some(raw) if !function.inputs.is_empty() => {
                let parts: Vec<String> = raw.split('|').map(|p| p.trim().to_owned()).collect();
                if parts.len() != function.inputs.len() {
                    return Err(PortError::UserInput(format!(
                        "{} expects {} arguments, prefills carry {}",
                        function.name,
                        function.inputs.len(),
                        parts.len()
                    )));
                }
                parts
            }
            _ => vec!["?".to_owned(); function.inputs.len()],
        };
        function
            .inputs
            .iter()
            .zip(filled)
            .map(|(input, value)| {
                if value == "?" {
                    let name = if input.name.is_empty() { "arg" } else { &input.name };
                    self.prompter.input(&format!("{name} ({})", input.ty))
                } else {
                    Ok(value)
                }
            })
            .collect()
    }

    /// `eth_call` of a view method; outputs are decoded and rendered.
    pub fn contract_read(&self, req: &ContractCallRequest) -> Result<ActionOutcome, PortError> {
        let mut run = Run::new("contract_read", self.observer.as_ref());
        let result = self.contract_read_inner(&mut run, req);
        run.finish(result)
    }

    fn contract_read_inner(
        &self,
        run: &mut Run<'_>,
        req: &ContractCallRequest,
    ) -> Result<(), PortError> {
        let from = match req.from.as_deref() {
            Some(input) => Some(self.resolve("from", input)?),
            None => None,
        };
        let composed = self.compose(run, req, true)?;
        let call = CallRequest {
            from,
            to: Some(composed.contract),
            value: (!composed.value.is_zero()).then_some(composed.value),
            data: Some(composed.data.clone()),
        };
        let out = self.reader()?.call_contract(&call, None)?;
        let values = composed.function.abi_decode_output(&out, true).map_err(|e| {
            PortError::Validation(format!(
                "cannot decode {} output: {e}",
                composed.function.signature()
            ))
        })?;
        let renderer = Renderer::new(Some(self.resolver.as_ref()));
        run.outcome.outputs = composed
            .function
            .outputs
            .iter()
            .zip(values.iter())
            .enumerate()
            .map(|(i, (output, value))| {
                let name = if output.name.is_empty() {
                    format!("out{i}")
                } else {
                    output.name.clone()
                };
                renderer.param(&name, &output.ty, &output.components, value, None)
            })
            .collect();
        let abis = self.abis()?;
        run.outcome.call = Some(self.decoder(abis.as_ref()).decode_call(
            composed.contract,
            composed.value,
            &composed.data,
            Some(&composed.abi),
        ));
        run.advance(ActionEvent::TxBuilt)?;
        run.advance(ActionEvent::DryRun)
    }

    pub fn msig_init(
        &self,
        req: &MsigInitRequest,
        opts: &TxOptions,
    ) -> Result<ActionOutcome, PortError> {
        let mut run = Run::new("msig_init", self.observer.as_ref());
        let result = self.msig_init_inner(&mut run, req, opts);
        run.finish(result)
    }

    fn msig_init_inner(
        &self,
        run: &mut Run<'_>,
        req: &MsigInitRequest,
        opts: &TxOptions,
    ) -> Result<(), PortError> {
        let msig = self.resolve("msig", &req.msig)?;
        let sender = match req.from.as_deref() {
            Some(from) => self.wallet(from)?,
            None => self.msig_owner(msig)?,
        };
        let inner = self.compose(run, &req.target, false)?;
        let plan = TxPlan {
            sender,
            to: msig,
            value: ValueSpec::Exact(U256::ZERO),
            data: self.wrap_submit(inner.contract, inner.value, inner.data)?,
            preview_abi: Some(abis::gnosis_multisig()?),
            preview_inner: None,
        };
        self.execute(run, plan, opts)
    }

    /// `confirmTransaction` or `revokeConfirmation` of a pending multisig tx.
    pub fn msig_vote(
        &self,
        msig: &str,
        tx_id: U256,
        vote: MsigVote,
        from: Option<&str>,
        opts: &TxOptions,
    ) -> Result<ActionOutcome, PortError> {
        let action = match vote {
            MsigVote::Approve => "msig_approve",
            MsigVote::Revoke => "msig_revoke",
        };
        let mut run = Run::new(action, self.observer.as_ref());
        let result = self.msig_vote_inner(&mut run, msig, tx_id, vote, from, opts);
        run.finish(result)
    }

    fn msig_vote_inner(
        &self,
        run: &mut Run<'_>,
        msig: &str,
        tx_id: U256,
        vote: MsigVote,
        from: Option<&str>,
        opts: &TxOptions,
    ) -> Result<(), PortError> {
        let msig = self.resolve("msig", msig)?;
        let sender = match from {
            Some(from) => self.wallet(from)?,
            None => self.msig_owner(msig)?,
        };
        run.advance(ActionEvent::TargetsResolved)?;

        let abi = abis::gnosis_multisig()?;
        let stored = self.call_view(
            msig,
            function_named(&abi, "transactions")?,
            &[DynSolValue::Uint(tx_id, 256)],
        )?;
        let inner = match stored.as_slice() {
            [DynSolValue::Address(dest), DynSolValue::Uint(value, _), DynSolValue::Bytes(data), DynSolValue::Bool(executed)] =>
            {
                if *executed {
                    return Err(PortError::UserInput(format!(
                        "multisig transaction {tx_id} is already executed"
                    )));
                }
                let abis = self.abis()?;
                self.decoder(abis.as_ref()).decode_call(*dest, *value, data, None)
            }
            _ => {
                return Err(PortError::Validation(format!(
                    "unexpected transactions({tx_id}) result from {msig}"
                )))
            }
        };
        run.advance(ActionEvent::MetadataLoaded)?;

        let method = match vote {
            MsigVote::Approve => "confirmTransaction",
            MsigVote::Revoke => "revokeConfirmation",
        };
        let data = function_named(&abi, method)?
            .abi_encode_input(&[DynSolValue::Uint(tx_id, 256)])
            .map_err(|e| PortError::UserInput(format!("abi encoding failed: {e}")))?;
        run.advance(ActionEvent::ParamsEncoded)?;
        let plan = TxPlan {
            sender,
            to: msig,
            value: ValueSpec::Exact(U256::ZERO),
            data: Bytes::from(data),
            preview_abi: Some(abi),
            preview_inner: Some(inner),
        };
        self.execute(run, plan, opts)
    }

    pub fn info(&self, hash: B256) -> Result<ActionOutcome, PortError> {
        let mut run = Run::new("info", self.observer.as_ref());
        let result = self.info_inner(&mut run, hash);
        run.finish(result)
    }

    fn info_inner(&self, run: &mut Run<'_>, hash: B256) -> Result<(), PortError> {
        run.outcome.tx_hash = Some(hash);
        run.advance(ActionEvent::TargetsResolved)?;
        run.advance(ActionEvent::Inspect)?;
        let info = self.tx_info(hash)?;
        run.outcome.status = Some(info.status);
        if let Some(tx) = &info.tx {
            self.analyze(run, tx, info.receipt.as_ref());
        }
        run.advance(ActionEvent::Analyzed)
    }

    pub fn tx_info(&self, hash: B256) -> Result<TxInfo, PortError> {
        let reader = self.reader()?;
        let Some(tx) = reader.transaction_by_hash(hash)? else {
            return Ok(TxInfo {
                status: TxStatus::NotFound,
                tx: None,
                receipt: None,
                header: None,
            });
        };
        let Some(receipt) = reader.transaction_receipt(hash)? else {
            return Ok(TxInfo {
                status: TxStatus::Pending,
                tx: Some(tx),
                receipt: None,
                header: None,
            });
        };
        let header = match receipt.block_number {
            Some(n) => reader.header_by_number(Some(n.to::<u64>())).ok(),
            None => None,
        };
        let status = if receipt.succeeded() {
            TxStatus::Done
        } else {
            TxStatus::Reverted
        };
        Ok(TxInfo {
            status,
            tx: Some(tx),
            receipt: Some(receipt),
            header,
        })
    }

    fn analyze(
        &self,
        run: &mut Run<'_>,
        tx: &RpcTransaction,
        receipt: Option<&RpcReceipt>,
    ) {
        let abis = match self.abis() {
            Ok(abis) => abis,
            Err(e) => {
                warn!(error = %e, "abi provider unavailable, skipping analysis");
                return;
            }
        };
        let decoder = self.decoder(abis.as_ref());
        run.outcome.call = Some(decoder.decode_tx(tx));
        let Some(receipt) = receipt else { return };
        run.outcome.logs = decoder.decode_logs(&receipt.logs);
        if receipt.succeeded() {
            return;
        }
        let Some(to) = tx.to else { return };
        let replay = CallRequest {
            from: Some(tx.from),
            to: Some(to),
            value: Some(tx.value),
            data: Some(tx.input.clone()),
        };
        let block = receipt.block_number.map(|n| n.to::<u64>());
        let reason = match self.reader().and_then(|r| r.call_contract(&replay, block)) {
            Ok(_) => "reverted (replay succeeded, state changed since)".to_owned(),
            Err(e) => match revert_data(&e) {
                Some(data) => {
                    let abi = abis.get_abi(to).ok();
                    decode_revert(&data, abi.as_ref())
                }
                None => e.to_string(),
            },
        };
        run.outcome.revert_reason = Some(reason);
    }

    // --- shared write pipeline ---

    fn execute(&self, run: &mut Run<'_>, plan: TxPlan, opts: &TxOptions) -> Result<(), PortError> {
        let reader = self.reader()?;
        let from = plan.sender.address;
        let nonce = match opts.nonce {
            Some(n) => n,
            None => self.context.nonce(from, &self.network)?,
        };

        let gas_limit = match opts.gas_limit {
            Some(limit) => limit,
            None => {
                let value = match plan.value {
                    ValueSpec::Exact(v) if !v.is_zero() => Some(v),
                    _ => None,
                };
                let estimate = reader.estimate_gas(&CallRequest {
                    from: Some(from),
                    to: Some(plan.to),
                    value,
                    data: (!plan.data.is_empty()).then(|| plan.data.clone()),
                })?;
                if estimate == 0 {
                    return Err(PortError::Validation("estimated gas is zero".to_owned()));
                }
                estimate
            }
        }
        .saturating_add(opts.extra_gas_limit);

        let gas = self.context.gas_setting(&self.network)?;
        let (fees, warnings) = resolve_fees(&gas, opts)?;
        for w in &warnings {
            warn!("{w}");
            self.observer.note(w);
        }

        let value = match plan.value {
            ValueSpec::Exact(v) => v,
            ValueSpec::All => {
                let balance = reader.get_balance(from)?;
                let cost = U256::from(gas_limit) * U256::from(fees.max_price());
                if balance < cost {
                    return Err(PortError::UserInput(format!(
                        "balance {balance} is below the gas cost {cost}"
                    )));
                }
                balance - cost
            }
        };

        let tx = UnsignedTx {
            chain_id: self.network.chain_id,
            nonce,
            gas_limit,
            to: Some(plan.to),
            value,
            data: plan.data,
            fees,
        };
        run.outcome.nonce = Some(nonce);
        run.outcome.tx = Some(tx.clone());

        let abis = self.abis()?;
        let mut preview = self.decoder(abis.as_ref()).decode_call(
            plan.to,
            tx.value,
            &tx.data,
            plan.preview_abi.as_ref(),
        );
        if let Some(inner) = plan.preview_inner {
            preview.inner_calls.push(inner);
        }
        run.advance(ActionEvent::TxBuilt)?;
        self.observer.preview(&tx, &preview);
        run.outcome.call = Some(preview);

        if opts.dry_run {
            return run.advance(ActionEvent::DryRun);
        }
        if !self.prompter.confirm("Broadcast this transaction?")? {
            return run.advance(ActionEvent::Declined);
        }
        run.advance(ActionEvent::Confirmed)?;

        let signer = self.context.signer(&plan.sender)?;
        let signed = signer.sign_tx(tx)?;
        if signed.signer != from {
            return Err(PortError::Validation(format!(
                "signer address mismatch: signature recovers {}, expected {from}",
                signed.signer
            )));
        }
        run.outcome.tx_hash = Some(signed.hash);
        run.advance(ActionEvent::Signed)?;

        let broadcaster = self.context.broadcaster(&self.network)?;
        let attempts = if opts.retry_broadcast {
            1 + self.settings.broadcast_retries
        } else {
            1
        };
        let mut accepted = false;
        for attempt in 1..=attempts {
            let result = broadcaster.broadcast(&signed.raw);
            run.outcome.broadcast_errors = result.errors;
            if result.accepted {
                accepted = true;
                break;
            }
            warn!(
                attempt,
                attempts,
                hash = %signed.hash,
                "no node accepted the transaction"
            );
            if attempt < attempts {
                self.context.clock().sleep_ms(self.settings.poll_ms);
            }
        }
        if !accepted {
            return Err(PortError::Node(format!(
                "no node accepted {}: {}",
                signed.hash,
                join_failures(&run.outcome.broadcast_errors)
            )));
        }
        self.context
            .set_pending_nonce(from, self.network.chain_id, nonce + 1)?;
        info!(hash = %signed.hash, nonce, "transaction broadcast");
        run.advance(ActionEvent::Accepted)?;

        if opts.no_wait {
            run.outcome.status = Some(TxStatus::Pending);
            return run.advance(ActionEvent::NoWait);
        }
        self.monitor(run, signed.hash)
    }

    fn monitor(&self, run: &mut Run<'_>, hash: B256) -> Result<(), PortError> {
        let clock = self.context.clock().clone();
        let mut last_seen = clock.now_ms()?;
        loop {
            let info = match self.tx_info(hash) {
                Ok(info) => info,
                Err(e) => {
                    warn!(%hash, error = %e, "status poll failed");
                    TxInfo {
                        status: TxStatus::NotFound,
                        tx: None,
                        receipt: None,
                        header: None,
                    }
                }
            };
            let now = clock.now_ms()?;
            match info.status {
                TxStatus::Done | TxStatus::Reverted => {
                    run.outcome.status = Some(info.status);
                    run.advance(ActionEvent::Mined)?;
                    if let Some(tx) = &info.tx {
                        self.analyze(run, tx, info.receipt.as_ref());
                    }
                    return run.advance(ActionEvent::Analyzed);
                }
                TxStatus::Pending => last_seen = now,
                _ if now.saturating_sub(last_seen) >= self.settings.lost_after_ms => {
                    run.outcome.status = Some(TxStatus::Lost);
                    return run.advance(ActionEvent::Lost);
                }
                _ => {}
            }
            clock.sleep_ms(self.settings.poll_ms);
        }
    }
}

pub fn gwei_to_wei(gwei: f64) -> Result<u128, PortError> {
    let wei = float_to_big_int(gwei, 9)?;
    u128::try_from(wei)
        .map_err(|_| PortError::UserInput(format!("gas price {gwei} gwei is too large")))
}

/// Fee mode from cached gas settings and the operator's flags. Returns
/// warnings for flags that were ignored.
pub fn resolve_fees(
    gas: &GasInfo,
    opts: &TxOptions,
) -> Result<(FeeMode, Vec<String>), PortError> {
    let mut warnings = Vec::new();
    let extra = gwei_to_wei(opts.extra_gas_price_gwei)?;
    let base_price = match opts.gas_price_gwei {
        Some(gwei) => gwei_to_wei(gwei)?,
        None => gas.max_fee_per_gas,
    };
    let price = base_price.saturating_add(extra);

    if opts.force_legacy {
        if opts.tip_gwei.is_some() {
            warnings.push("tip is ignored for a legacy transaction".to_owned());
        }
        return Ok((FeeMode::Legacy { gas_price: price }, warnings));
    }
    if let Some(tip_gwei) = opts.tip_gwei {
        if !gas.dynamic_fee {
            return Err(PortError::UserInput(
                "tip given but the chain does not support dynamic-fee transactions".to_owned(),
            ));
        }
        let tip = gwei_to_wei(tip_gwei)?;
        if tip > price {
            return Err(PortError::UserInput(format!(
                "tip {tip} wei exceeds max fee {price} wei"
            )));
        }
        return Ok((
            FeeMode::Dynamic {
                max_fee_per_gas: price,
                max_priority_fee_per_gas: tip,
            },
            warnings,
        ));
    }
    if gas.dynamic_fee {
        Ok((
            FeeMode::Dynamic {
                max_fee_per_gas: price,
                max_priority_fee_per_gas: gas.suggested_tip.min(price),
            },
            warnings,
        ))
    } else {
        Ok((FeeMode::Legacy { gas_price: price }, warnings))
    }
}
