//! Recursive calldata and receipt-log decoding.
//!
//! Failures never escape: whatever could not be decoded is reported on the
//! affected call, parameter or log so the operator still sees the rest.

use alloy::dyn_abi::{DynSolType, DynSolValue, EventExt, JsonAbiExt};
use alloy::json_abi::{Event, Function, JsonAbi};
use alloy::primitives::{hex, Address, Bytes, U256};
use tracing::debug;

use crate::abis::{function_by_selector, ERROR_STRING_SELECTOR, PANIC_SELECTOR};
use crate::domain::{
    DecodedLog, DecodedParam, FunctionCall, Network, ParamValue, RpcLog, RpcTransaction,
};
use crate::metadata::decode_single;
use crate::params::{param_type, Renderer, TokenContext};
use crate::ports::{AbiProvider, AddressResolver, PortError};
use crate::tx::create_address;

/// Deepest multisig nesting that is still decoded.
pub const MAX_DECODE_DEPTH: usize = 8;

const AMOUNT_PARAM_NAMES: &[&str] = &["amount", "value", "wad", "_value", "_amount", "rawAmount"];
const TOKEN_METHODS: &[&str] = &["transfer", "transferFrom", "approve"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedCall {
    pub destination: Address,
    pub value: U256,
    pub data: Bytes,
}

/// Recognizes methods that carry another call as arguments.
pub trait WrapperDetector: Send + Sync {
    fn detect(&self, function: &Function, values: &[DynSolValue]) -> Option<WrappedCall>;
}

/// `submitTransaction(address destination, uint256 value, bytes data)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GnosisClassicDetector;

impl WrapperDetector for GnosisClassicDetector {
    fn detect(&self, function: &Function, values: &[DynSolValue]) -> Option<WrappedCall> {
        if function.name != "submitTransaction" {
            return None;
        }
        let names: Vec<&str> = function.inputs.iter().map(|p| p.name.as_str()).collect();
        if names != ["destination", "value", "data"] {
            return None;
        }
        match values {
            [DynSolValue::Address(destination), DynSolValue::Uint(value, _), DynSolValue::Bytes(data)] => {
                Some(WrappedCall {
                    destination: *destination,
                    value: *value,
                    data: Bytes::from(data.clone()),
                })
            }
            _ => None,
        }
    }
}

fn annotates_amount(method: &str, param: &str, is_uint: bool) -> bool {
    is_uint && (AMOUNT_PARAM_NAMES.contains(&param) || TOKEN_METHODS.contains(&method))
}

pub struct Decoder<'a> {
    network: &'a Network,
    abis: &'a dyn AbiProvider,
    renderer: Renderer<'a>,
    detectors: Vec<Box<dyn WrapperDetector>>,
}

impl<'a> Decoder<'a> {
    pub fn new(
        network: &'a Network,
        abis: &'a dyn AbiProvider,
        resolver: Option<&'a dyn AddressResolver>,
    ) -> Self {
        Self {
            network,
            abis,
            renderer: Renderer::new(resolver),
            detectors: vec![Box::new(GnosisClassicDetector)],
        }
    }

    pub fn with_detector(mut self, detector: Box<dyn WrapperDetector>) -> Self {
        self.detectors.push(detector);
        self
    }

    pub fn renderer(&self) -> &Renderer<'a> {
        &self.renderer
    }

    fn native(&self) -> TokenContext {
        TokenContext {
            decimals: self.network.native_token_decimal,
            symbol: self.network.native_token_symbol.clone(),
        }
    }

    pub fn decode_tx(&self, tx: &RpcTransaction) -> FunctionCall {
        match tx.to {
            Some(to) => self.decode_call(to, tx.value, &tx.input, None),
            None => {
                let destination = create_address(tx.from, tx.nonce.to::<u64>());
                FunctionCall {
                    destination,
                    destination_desc: "new contract".to_owned(),
                    value: tx.value,
                    value_display: self.native().annotate(tx.value),
                    method: "contract creation".to_owned(),
                    params: Vec::new(),
                    inner_calls: Vec::new(),
                    error: None,
                }
            }
        }
    }

    /// Decodes `data` sent to `destination`. `abi` overrides the ABI lookup
    /// for the outermost call only.
    pub fn decode_call(
        &self,
        destination: Address,
        value: U256,
        data: &[u8],
        abi: Option<&JsonAbi>,
    ) -> FunctionCall {
        self.decode_at(destination, value, data, abi, 0)
    }

    fn decode_at(
        &self,
        destination: Address,
        value: U256,
        data: &[u8],
        abi_override: Option<&JsonAbi>,
        depth: usize,
    ) -> FunctionCall {
        let mut call = FunctionCall {
            destination,
            destination_desc: self.renderer.describe(destination),
            value,
            value_display: self.native().annotate(value),
            method: String::new(),
            params: Vec::new(),
            inner_calls: Vec::new(),
            error: None,
        };
        if data.is_empty() {
            call.method = "transfer".to_owned();
            return call;
        }
        if data.len() < 4 {
            call.method = "unknown".to_owned();
            call.error = Some(format!(
                "calldata 0x{} is shorter than a selector",
                hex::encode(data)
            ));
            return call;
        }

        let fetched;
        let abi = match abi_override {
            Some(abi) => abi,
            None => match self.abis.get_abi(destination) {
                Ok(abi) => {
                    fetched = abi;
                    &fetched
                }
                Err(e) => {
                    call.method = "unknown".to_owned();
                    call.params = vec![raw_data_param(data)];
                    call.error = Some(format!("abi unavailable: {e}"));
                    return call;
                }
            },
        };

        let Some(function) = function_by_selector(abi, data) else {
            call.method = "unknown".to_owned();
            call.params = vec![raw_data_param(data)];
            call.error = Some(format!("unknown method 0x{}", hex::encode(&data[..4])));
            return call;
        };
        call.method = function.name.clone();

        let values = match function.abi_decode_input(&data[4..], true) {
            Ok(values) => values,
            Err(e) => {
                call.params = vec![raw_data_param(data)];
                call.error = Some(format!(
                    "cannot decode {} arguments: {e}",
                    function.signature()
                ));
                return call;
            }
        };

        let token = self.token_context(destination, function);
        call.params = function
            .inputs
            .iter()
            .zip(values.iter())
            .map(|(input, value)| {
                let is_uint = matches!(value, DynSolValue::Uint(..));
                let ctx = token
                    .as_ref()
                    .filter(|_| annotates_amount(&function.name, &input.name, is_uint));
                self.renderer
                    .param(&input.name, &input.ty, &input.components, value, ctx)
            })
            .collect();

        for detector in &self.detectors {
            let Some(inner) = detector.detect(function, &values) else {
                continue;
            };
            if depth + 1 >= MAX_DECODE_DEPTH {
                call.params.push(DecodedParam {
                    name: "data".to_owned(),
                    ty: "bytes".to_owned(),
                    value: ParamValue::Error(format!(
                        "nested call not decoded: depth limit {MAX_DECODE_DEPTH} reached"
                    )),
                });
                continue;
            }
            debug!(depth, destination = %inner.destination, "decoding wrapped call");
            call.inner_calls.push(self.decode_at(
                inner.destination,
                inner.value,
                &inner.data,
                None,
                depth + 1,
            ));
        }
        call
    }

    fn token_context(&self, destination: Address, function: &Function) -> Option<TokenContext> {
        let wants = function.inputs.iter().any(|p| {
            p.ty.starts_with("uint") && annotates_amount(&function.name, &p.name, true)
        });
        if !wants {
            return None;
        }
        match self.abis.is_erc20(destination) {
            Ok(true) => match self.abis.token_info(destination) {
                Ok((decimals, symbol)) => Some(TokenContext { decimals, symbol }),
                Err(e) => {
                    debug!(%destination, error = %e, "token metadata unavailable");
                    None
                }
            },
            _ => None,
        }
    }

    pub fn decode_logs(&self, logs: &[RpcLog]) -> Vec<DecodedLog> {
        logs.iter().map(|log| self.decode_log(log)).collect()
    }

    pub fn decode_log(&self, log: &RpcLog) -> DecodedLog {
        let mut decoded = DecodedLog {
            address: log.address,
            address_desc: self.renderer.describe(log.address),
            event: "unknown".to_owned(),
            params: Vec::new(),
            error: None,
        };
        let Some(topic0) = log.topics.first() else {
            decoded.error = Some("anonymous log without topics".to_owned());
            return decoded;
        };
        let abi = match self.abis.get_abi(log.address) {
            Ok(abi) => abi,
            Err(e) => {
                decoded.error = Some(format!("abi unavailable: {e}"));
                return decoded;
            }
        };
        let Some(event) = abi.events().find(|e| e.selector() == *topic0) else {
            decoded.error = Some(format!("unknown event {topic0}"));
            return decoded;
        };
        decoded.event = event.name.clone();
        match self.event_params(log, event) {
            Ok(params) => decoded.params = params,
            Err(e) => decoded.error = Some(e),
        }
        decoded
    }

    fn event_params(&self, log: &RpcLog, event: &Event) -> Result<Vec<DecodedParam>, String> {
        let parts = event
            .decode_log_parts(log.topics.iter().copied(), &log.data, true)
            .map_err(|e| format!("cannot decode {}: {e}", event.signature()))?;
        let mut indexed = parts.indexed.into_iter();
        let mut body = parts.body.into_iter();

        let wants_token = event.inputs.iter().any(|p| {
            !p.indexed && p.ty.starts_with("uint") && AMOUNT_PARAM_NAMES.contains(&p.name.as_str())
        });
        let token = if wants_token {
            match self.abis.is_erc20(log.address) {
                Ok(true) => self
                    .abis
                    .token_info(log.address)
                    .ok()
                    .map(|(decimals, symbol)| TokenContext { decimals, symbol }),
                _ => None,
            }
        } else {
            None
        };

        let mut params = Vec::with_capacity(event.inputs.len());
        for input in &event.inputs {
            let next = if input.indexed {
                indexed.next()
            } else {
                body.next()
            };
            let param = match next {
                Some(value) => {
                    let is_uint = matches!(value, DynSolValue::Uint(..));
                    let ctx = token
                        .as_ref()
                        .filter(|_| is_uint && AMOUNT_PARAM_NAMES.contains(&input.name.as_str()));
                    self.renderer
                        .param(&input.name, &input.ty, &input.components, &value, ctx)
                }
                None => DecodedParam {
                    name: input.name.clone(),
                    ty: input.ty.clone(),
                    value: ParamValue::Error("missing value".to_owned()),
                },
            };
            params.push(param);
        }
        Ok(params)
    }

    /// Human form of revert data: `Error(string)`, `Panic(uint256)`, a custom
    /// error from `abi`, or hex.
    pub fn decode_revert(&self, data: &[u8], abi: Option<&JsonAbi>) -> String {
        decode_revert(data, abi)
    }
}

fn raw_data_param(data: &[u8]) -> DecodedParam {
    DecodedParam {
        name: "data".to_owned(),
        ty: "bytes".to_owned(),
        value: ParamValue::Scalar(format!("0x{}", hex::encode(data))),
    }
}

pub fn decode_revert(data: &[u8], abi: Option<&JsonAbi>) -> String {
    if data.is_empty() {
        return "reverted without data".to_owned();
    }
    if data.len() >= 4 {
        let (selector, args) = data.split_at(4);
        if selector == ERROR_STRING_SELECTOR {
            if let Ok(Some(DynSolValue::String(reason))) = decode_single(DynSolType::String, args) {
                return format!("revert: {reason}");
            }
        }
        if selector == PANIC_SELECTOR {
            if let Ok(Some(DynSolValue::Uint(code, _))) = decode_single(DynSolType::Uint(256), args)
            {
                return format!("panic: 0x{code:x}");
            }
        }
        if let Some(abi) = abi {
            for error in abi.errors() {
                if error.selector().as_slice() != selector {
                    continue;
                }
                let types: Result<Vec<DynSolType>, PortError> =
                    error.inputs.iter().map(param_type).collect();
                let Ok(types) = types else { continue };
                if let Ok(DynSolValue::Tuple(values)) =
                    DynSolType::Tuple(types).abi_decode_params(args)
                {
                    let rendered: Vec<String> = values
                        .iter()
                        .map(crate::params::render_canonical)
                        .collect();
                    return format!("{}({})", error.name, rendered.join(", "));
                }
            }
        }
    }
    format!("revert data 0x{}", hex::encode(data))
}

/// Revert payload carried in a node error message as `data=0x…`.
pub fn revert_data(err: &PortError) -> Option<Bytes> {
    let message = err.to_string();
    let start = message.find("data=0x")? + "data=".len();
    let raw: String = message[start..]
        .chars()
        .take_while(|c| c.is_ascii_hexdigit() || *c == 'x')
        .collect();
    hex::decode(raw.trim_start_matches("0x")).ok().map(Bytes::from)
}
