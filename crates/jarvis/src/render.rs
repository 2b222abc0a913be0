//! Human readable output. Progress goes to stderr so stdout can carry JSON.

use std::fmt::Write as _;

use alloy::primitives::U256;

use jarvis_core::params::{format_units, group_digits};
use jarvis_core::{
    ActionObserver, ActionOutcome, DecodedLog, DecodedParam, FeeMode, FunctionCall, Network,
    ParamValue, UnsignedTx,
};

fn gwei(wei: u128) -> String {
    format_units(U256::from(wei), 9)
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

/// Prints the confirmation preview and warnings as an action runs.
pub struct TerminalObserver {
    native_symbol: String,
    native_decimals: u64,
}

impl TerminalObserver {
    pub fn new(network: &Network) -> Self {
        Self {
            native_symbol: network.native_token_symbol.clone(),
            native_decimals: network.native_token_decimal,
        }
    }
}

// Transitions are already reported through `tracing`.
impl ActionObserver for TerminalObserver {
    fn preview(&self, tx: &UnsignedTx, call: &FunctionCall) {
        let mut out = String::new();
        let _ = writeln!(out, "{}", render_tx(tx, &self.native_symbol, self.native_decimals));
        render_call(&mut out, call, 0);
        eprint!("{out}");
    }

    fn note(&self, message: &str) {
        eprintln!("[{}] {message}", timestamp());
    }
}

pub fn render_tx(tx: &UnsignedTx, symbol: &str, decimals: u64) -> String {
    let mut out = String::new();
    let to = tx
        .to
        .map(|a| a.to_checksum(None))
        .unwrap_or_else(|| "contract creation".to_owned());
    let _ = writeln!(out, "chain id:  {}", tx.chain_id);
    let _ = writeln!(out, "nonce:     {}", tx.nonce);
    let _ = writeln!(out, "to:        {to}");
    let _ = writeln!(
        out,
        "value:     {} {symbol}",
        format_units(tx.value, decimals)
    );
    let _ = writeln!(out, "gas limit: {}", group_digits(&tx.gas_limit.to_string()));
    match tx.fees {
        FeeMode::Legacy { gas_price } => {
            let _ = writeln!(out, "gas price: {} gwei (legacy)", gwei(gas_price));
        }
        FeeMode::Dynamic {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => {
            let _ = writeln!(
                out,
                "max fee:   {} gwei, tip {} gwei",
                gwei(max_fee_per_gas),
                gwei(max_priority_fee_per_gas)
            );
        }
    }
    let _ = write!(
        out,
        "max cost:  {} {symbol}",
        format_units(tx.max_gas_cost(), decimals)
    );
    out
}

fn pad(depth: usize) -> String {
    "    ".repeat(depth)
}

fn render_value(out: &mut String, value: &ParamValue, depth: usize) {
    match value {
        ParamValue::Scalar(s) => {
            let _ = writeln!(out, "{s}");
        }
        ParamValue::Error(e) => {
            let _ = writeln!(out, "<error: {e}>");
        }
        ParamValue::Tuple(fields) => {
            let _ = writeln!(out);
            for field in fields {
                render_param(out, field, depth + 1);
            }
        }
        ParamValue::Array(items) => {
            let _ = writeln!(out, "[{} item(s)]", items.len());
            for (i, item) in items.iter().enumerate() {
                let _ = write!(out, "{}[{i}] ", pad(depth + 1));
                render_value(out, item, depth + 1);
            }
        }
    }
}

fn render_param(out: &mut String, param: &DecodedParam, depth: usize) {
    let _ = write!(out, "{}{} ({}): ", pad(depth), param.name, param.ty);
    render_value(out, &param.value, depth);
}

pub fn render_call(out: &mut String, call: &FunctionCall, depth: usize) {
    let _ = writeln!(
        out,
        "{}{} ({})",
        pad(depth),
        call.destination.to_checksum(None),
        call.destination_desc
    );
    let _ = writeln!(out, "{}value:  {}", pad(depth), call.value_display);
    let _ = writeln!(out, "{}method: {}", pad(depth), call.method);
    for param in &call.params {
        render_param(out, param, depth + 1);
    }
    if let Some(error) = &call.error {
        let _ = writeln!(out, "{}<decode error: {error}>", pad(depth));
    }
    for inner in &call.inner_calls {
        let _ = writeln!(out, "{}wrapped call:", pad(depth));
        render_call(out, inner, depth + 1);
    }
}

fn render_log(out: &mut String, log: &DecodedLog) {
    let _ = writeln!(
        out,
        "  {} from {} ({})",
        log.event,
        log.address.to_checksum(None),
        log.address_desc
    );
    for param in &log.params {
        render_param(out, param, 2);
    }
    if let Some(error) = &log.error {
        let _ = writeln!(out, "    <decode error: {error}>");
    }
}

/// Final summary of an action.
pub fn render_outcome(outcome: &ActionOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}: {:?}", outcome.action, outcome.state);
    if let Some(hash) = outcome.tx_hash {
        let _ = writeln!(out, "tx hash: {hash}");
    }
    if let Some(status) = outcome.status {
        let _ = writeln!(out, "status:  {status:?}");
    }
    if let Some(nonce) = outcome.nonce {
        let _ = writeln!(out, "nonce:   {nonce}");
    }
    if let Some(call) = &outcome.call {
        render_call(&mut out, call, 0);
    }
    if !outcome.outputs.is_empty() {
        let _ = writeln!(out, "outputs:");
        for output in &outcome.outputs {
            render_param(&mut out, output, 1);
        }
    }
    if let Some(reason) = &outcome.revert_reason {
        let _ = writeln!(out, "revert reason: {reason}");
    }
    if !outcome.logs.is_empty() {
        let _ = writeln!(out, "logs:");
        for log in &outcome.logs {
            render_log(&mut out, log);
        }
    }
    for failure in &outcome.broadcast_errors {
        let _ = writeln!(out, "node {}: {}", failure.label, failure.message);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, Bytes};

    #[test]
    fn dynamic_fee_preview_shows_gwei() {
        let tx = UnsignedTx {
            chain_id: 1,
            nonce: 7,
            gas_limit: 60_000,
            to: Some(Address::with_last_byte(0xb0)),
            value: U256::from(1_500_000_000_000_000_000u128),
            data: Bytes::new(),
            fees: FeeMode::Dynamic {
                max_fee_per_gas: 30_000_000_000,
                max_priority_fee_per_gas: 2_400_000_000,
            },
        };
        let text = render_tx(&tx, "ETH", 18);
        assert!(text.contains("value:     1.5 ETH"), "{text}");
        assert!(text.contains("max fee:   30 gwei, tip 2.4 gwei"), "{text}");
        assert!(text.contains("max cost:  0.0018 ETH"), "{text}");
    }

    #[test]
    fn nested_calls_are_indented() {
        let inner = FunctionCall {
            destination: Address::with_last_byte(0x4e),
            destination_desc: "KNC token".to_owned(),
            value: U256::ZERO,
            value_display: "0 ETH".to_owned(),
            method: "transfer".to_owned(),
            params: vec![DecodedParam {
                name: "_to".to_owned(),
                ty: "address".to_owned(),
                value: ParamValue::Scalar("0xb0 (bob)".to_owned()),
            }],
            inner_calls: Vec::new(),
            error: None,
        };
        let outer = FunctionCall {
            destination: Address::with_last_byte(0x5a),
            destination_desc: "team multisig".to_owned(),
            value: U256::ZERO,
            value_display: "0 ETH".to_owned(),
            method: "submitTransaction".to_owned(),
            params: Vec::new(),
            inner_calls: vec![inner],
            error: None,
        };
        let mut out = String::new();
        render_call(&mut out, &outer, 0);
        assert!(out.contains("wrapped call:\n    0x"), "{out}");
        assert!(out.contains("        _to (address): 0xb0 (bob)"), "{out}");
    }
}
