//! Conversion between operator-typed strings and ABI values.
//!
//! Parsing accepts the same syntax the canonical renderer produces, so
//! `render_canonical(parse(s))` is stable for every non-float input:
//! integers are grouped with thin spaces, strings are double quoted, byte
//! strings are `0x` hex and composites use `[a, b]`.

use std::str::FromStr;

use alloy::dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier};
use alloy::json_abi::{Function, Param};
use alloy::primitives::{hex, Address, Bytes, FixedBytes, I256, U256};

use crate::domain::{DecodedParam, Network, ParamValue};
use crate::ports::{AbiProvider, AddressResolver, PortError};

pub const THIN_SPACE: char = '\u{2009}';

const TOKEN_PARAM_NAMES: &[&str] = &["token", "tokens", "asset"];

/// `(0x)?[0-9a-fA-F]{40}` over the whole (trimmed) input.
pub fn is_address(input: &str) -> bool {
    let raw = input.trim();
    let raw = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    raw.len() == 40 && raw.bytes().all(|b| b.is_ascii_hexdigit())
}

pub fn parse_address_hex(input: &str) -> Result<Address, PortError> {
    let raw = input.trim();
    let raw = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    Address::from_str(&format!("0x{raw}"))
        .map_err(|e| PortError::UserInput(format!("invalid address '{input}': {e}")))
}

/// Splits `"1.5 KNC"` into `(1.5, "KNC")`; a bare number is in the native token.
pub fn value_to_amount_and_currency(
    input: &str,
    native_symbol: &str,
) -> Result<(f64, String), PortError> {
    let parts: Vec<&str> = input.split_whitespace().collect();
    let (amount, currency) = match parts.as_slice() {
        [amount] => (*amount, native_symbol),
        [amount, currency] => (*amount, *currency),
        _ => {
            return Err(PortError::UserInput(format!(
                "invalid amount '{input}': expected '<amount>' or '<amount> <token>'"
            )))
        }
    };
    let cleaned = strip_separators(amount);
    let value: f64 = cleaned.parse().map_err(|_| {
        PortError::UserInput(format!(
            "invalid amount '{amount}' in '{input}': expected a decimal number"
        ))
    })?;
    Ok((value, currency.to_owned()))
}

// 2^128 as a float; `as u128` saturates at or above it.
const U128_BOUND: f64 = 340_282_366_920_938_463_463_374_607_431_768_211_456.0;

/// Float to base units. Below 9 decimals the float is scaled in one shot;
/// otherwise it is scaled by 10^9 as a float and the rest in integer space.
pub fn float_to_big_int(value: f64, decimals: u64) -> Result<U256, PortError> {
    if !value.is_finite() || value < 0.0 {
        return Err(PortError::UserInput(format!(
            "amount {value} must be a non-negative finite number"
        )));
    }
    let overflow = || {
        PortError::UserInput(format!(
            "amount {value} with {decimals} decimals does not fit in uint256"
        ))
    };
    if decimals < 9 {
        let scaled = (value * 10f64.powi(decimals as i32)).trunc();
        if scaled >= U128_BOUND {
            return Err(overflow());
        }
        return Ok(U256::from(scaled as u128));
    }
    let scaled = (value * 1e9).trunc();
    if scaled >= U128_BOUND {
        return Err(overflow());
    }
    let rest = U256::from(10u64)
        .checked_pow(U256::from(decimals - 9))
        .ok_or_else(overflow)?;
    U256::from(scaled as u128)
        .checked_mul(rest)
        .ok_or_else(overflow)
}

/// Exact decimal rendering of `value / 10^decimals`, trailing zeros trimmed.
/// Decimals too large for a `U256` power of ten render the raw integer.
pub fn format_units(value: U256, decimals: u64) -> String {
    if decimals == 0 {
        return value.to_string();
    }
    let Some(base) = U256::from(10u64).checked_pow(U256::from(decimals)) else {
        return value.to_string();
    };
    let whole = value / base;
    let frac = value % base;
    if frac.is_zero() {
        return whole.to_string();
    }
    let frac = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// Groups digits in threes with thin spaces: `1500000` -> `1 500 000`.
pub fn group_digits(number: &str) -> String {
    let (sign, digits) = match number.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", number),
    };
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 * 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(THIN_SPACE);
        }
        out.push(ch);
    }
    format!("{sign}{out}")
}

fn strip_hex_prefix(input: &str) -> Option<&str> {
    input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
}

fn strip_separators(input: &str) -> String {
    input
        .chars()
        .filter(|c| *c != '_' && *c != THIN_SPACE && *c != ',')
        .collect()
}

/// Splits the inside of a composite literal on commas that are outside
/// nested brackets and quotes.
pub fn split_top_level(inner: &str) -> Result<Vec<String>, PortError> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_quote = false;
    let mut current = String::new();
    for ch in inner.chars() {
        match ch {
            '"' => {
                in_quote = !in_quote;
                current.push(ch);
            }
            '[' | '(' if !in_quote => {
                depth += 1;
                current.push(ch);
            }
            ']' | ')' if !in_quote => {
                depth -= 1;
                if depth < 0 {
                    return Err(PortError::UserInput(format!(
                        "unbalanced brackets in '{inner}'"
                    )));
                }
                current.push(ch);
            }
            ',' if !in_quote && depth == 0 => {
                parts.push(current.trim().to_owned());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if in_quote || depth != 0 {
        return Err(PortError::UserInput(format!(
            "unbalanced quotes or brackets in '{inner}'"
        )));
    }
    let last = current.trim();
    if !last.is_empty() || !parts.is_empty() {
        parts.push(last.to_owned());
    }
    Ok(parts)
}

fn strip_composite(input: &str, ty: &DynSolType) -> Result<String, PortError> {
    let trimmed = input.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .or_else(|| trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')));
    inner.map(str::to_owned).ok_or_else(|| {
        PortError::UserInput(format!(
            "invalid {ty} value '{input}': expected elements enclosed in [...]"
        ))
    })
}

fn parse_byte_source(input: &str, ty: &str) -> Result<Vec<u8>, PortError> {
    let trimmed = input.trim();
    if let Some(text) = trimmed.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return Ok(text.as_bytes().to_vec());
    }
    if let Some(hex_digits) = strip_hex_prefix(trimmed) {
        return hex::decode(hex_digits).map_err(|e| {
            PortError::UserInput(format!("invalid {ty} value '{input}': bad hex ({e})"))
        });
    }
    Err(PortError::UserInput(format!(
        "invalid {ty} value '{input}': expected 0x-prefixed hex or a \"quoted\" literal"
    )))
}

fn parse_small_uint(input: &str, bits: usize) -> Result<U256, PortError> {
    let cleaned = strip_separators(input.trim());
    if cleaned.is_empty() || strip_hex_prefix(&cleaned) == Some("") {
        return Ok(U256::ZERO);
    }
    let parsed = match strip_hex_prefix(&cleaned) {
        Some(hex_digits) => u64::from_str_radix(hex_digits, 16),
        None => cleaned.parse::<u64>(),
    }
    .map_err(|_| {
        PortError::UserInput(format!(
            "invalid uint{bits} value '{input}': expected a decimal or 0x-hex integer"
        ))
    })?;
    let value = U256::from(parsed);
    check_uint_bits(value, bits, input)
}

fn check_uint_bits(value: U256, bits: usize, input: &str) -> Result<U256, PortError> {
    if bits < 256 && value.bit_len() > bits {
        return Err(PortError::UserInput(format!(
            "value '{input}' does not fit in uint{bits}"
        )));
    }
    Ok(value)
}

fn parse_big_uint_literal(input: &str) -> Option<U256> {
    let cleaned = strip_separators(input.trim());
    if let Some(hex_digits) = strip_hex_prefix(&cleaned) {
        return U256::from_str_radix(hex_digits, 16).ok();
    }
    if cleaned.bytes().all(|b| b.is_ascii_digit()) && !cleaned.is_empty() {
        return U256::from_str_radix(&cleaned, 10).ok();
    }
    None
}

fn parse_int(input: &str, bits: usize) -> Result<I256, PortError> {
    let cleaned = strip_separators(input.trim());
    let invalid = || {
        PortError::UserInput(format!(
            "invalid int{bits} value '{input}': expected a signed decimal or 0x-hex integer"
        ))
    };
    if bits <= 64 && (cleaned.is_empty() || strip_hex_prefix(&cleaned) == Some("")) {
        return Ok(I256::ZERO);
    }
    let value = if let Some(hex_digits) = strip_hex_prefix(&cleaned) {
        let unsigned = U256::from_str_radix(hex_digits, 16).map_err(|_| invalid())?;
        I256::try_from(unsigned).map_err(|_| invalid())?
    } else {
        I256::from_dec_str(&cleaned).map_err(|_| invalid())?
    };
    if bits < 256 {
        let limit = U256::from(1u8) << (bits - 1);
        let abs = value.unsigned_abs();
        let fits = if value.is_negative() {
            abs <= limit
        } else {
            abs < limit
        };
        if !fits {
            return Err(PortError::UserInput(format!(
                "value '{input}' does not fit in int{bits}"
            )));
        }
    }
    Ok(value)
}

pub struct ParamEngine<'a> {
    network: &'a Network,
    resolver: &'a dyn AddressResolver,
    abis: &'a dyn AbiProvider,
}

impl<'a> ParamEngine<'a> {
    pub fn new(
        network: &'a Network,
        resolver: &'a dyn AddressResolver,
        abis: &'a dyn AbiProvider,
    ) -> Self {
        Self {
            network,
            resolver,
            abis,
        }
    }

    pub fn parse(&self, name: &str, ty: &DynSolType, input: &str) -> Result<DynSolValue, PortError> {
        match ty {
            DynSolType::Bool => match input {
                "true" => Ok(DynSolValue::Bool(true)),
                "false" => Ok(DynSolValue::Bool(false)),
                other => Err(PortError::UserInput(format!(
                    "invalid bool value '{other}': expected exactly 'true' or 'false'"
                ))),
            },
            DynSolType::Uint(bits) if matches!(bits, 8 | 16 | 32 | 64) => {
                Ok(DynSolValue::Uint(parse_small_uint(input, *bits)?, *bits))
            }
            DynSolType::Uint(bits) => {
                let value = match parse_big_uint_literal(input) {
                    Some(v) => v,
                    None => self.token_amount(input).map_err(|e| {
                        PortError::UserInput(format!(
                            "invalid uint{bits} value '{input}': expected a decimal or 0x-hex integer, or '<amount> <token>' ({e})"
                        ))
                    })?,
                };
                Ok(DynSolValue::Uint(check_uint_bits(value, *bits, input)?, *bits))
            }
            DynSolType::Int(bits) => Ok(DynSolValue::Int(parse_int(input, *bits)?, *bits)),
            DynSolType::Address => Ok(DynSolValue::Address(self.parse_address(name, input)?)),
            DynSolType::Bytes => Ok(DynSolValue::Bytes(parse_byte_source(input, "bytes")?)),
            DynSolType::FixedBytes(size) => {
                let mut raw = parse_byte_source(input, &format!("bytes{size}"))?;
                raw.resize(*size, 0);
                let mut word = [0u8; 32];
                word[..*size].copy_from_slice(&raw);
                Ok(DynSolValue::FixedBytes(FixedBytes::from(word), *size))
            }
            DynSolType::String => {
                let trimmed = input.trim();
                trimmed
                    .strip_prefix('"')
                    .and_then(|s| s.strip_suffix('"'))
                    .filter(|_| trimmed.len() >= 2)
                    .map(|s| DynSolValue::String(s.to_owned()))
                    .ok_or_else(|| {
                        PortError::UserInput(format!(
                            "invalid string value '{input}': expected text enclosed in double quotes"
                        ))
                    })
            }
            DynSolType::Array(inner) => {
                let parts = split_top_level(&strip_composite(input, ty)?)?;
                let values = parts
                    .iter()
                    .map(|p| self.parse(name, inner, p))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(DynSolValue::Array(values))
            }
            DynSolType::FixedArray(inner, size) => {
                let parts = split_top_level(&strip_composite(input, ty)?)?;
                if parts.len() != *size {
                    return Err(PortError::UserInput(format!(
                        "invalid {ty} value '{input}': expected {size} elements, got {}",
                        parts.len()
                    )));
                }
                let values = parts
                    .iter()
                    .map(|p| self.parse(name, inner, p))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(DynSolValue::FixedArray(values))
            }
            DynSolType::Tuple(fields) => {
                let parts = split_top_level(&strip_composite(input, ty)?)?;
                if parts.len() != fields.len() {
                    return Err(PortError::UserInput(format!(
                        "invalid {ty} value '{input}': expected {} fields, got {}",
                        fields.len(),
                        parts.len()
                    )));
                }
                let values = parts
                    .iter()
                    .zip(fields.iter())
                    .map(|(p, field_ty)| self.parse(name, field_ty, p))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(DynSolValue::Tuple(values))
            }
            other => Err(PortError::UserInput(format!(
                "parameter type {other} is not supported"
            ))),
        }
    }

    pub fn parse_address(&self, name: &str, input: &str) -> Result<Address, PortError> {
        if is_address(input) {
            return parse_address_hex(input);
        }
        let query = if TOKEN_PARAM_NAMES.contains(&name.to_lowercase().as_str()) {
            format!("{} token", input.trim())
        } else {
            input.trim().to_owned()
        };
        self.resolver.resolve(&query).map(|(addr, _)| addr)
    }

    /// `"<float> <token>"` in base units of that token.
    pub fn token_amount(&self, input: &str) -> Result<U256, PortError> {
        let (amount, currency) =
            value_to_amount_and_currency(input, &self.network.native_token_symbol)?;
        let decimals = self.currency_decimals(&currency)?.0;
        float_to_big_int(amount, decimals)
    }

    /// Decimals and token address (`None` for the native token) of a currency.
    pub fn currency_decimals(&self, currency: &str) -> Result<(u64, Option<Address>), PortError> {
        if currency.eq_ignore_ascii_case(&self.network.native_token_symbol) {
            return Ok((self.network.native_token_decimal, None));
        }
        let token = if is_address(currency) {
            parse_address_hex(currency)?
        } else {
            self.resolver.resolve(&format!("{currency} token"))?.0
        };
        Ok((self.abis.decimals(token)?, Some(token)))
    }

    pub fn encode_call(&self, function: &Function, args: &[String]) -> Result<Bytes, PortError> {
        if function.inputs.len() != args.len() {
            return Err(PortError::UserInput(format!(
                "argument count mismatch for {}: expected {}, got {}",
                function.name,
                function.inputs.len(),
                args.len()
            )));
        }
        let mut values = Vec::with_capacity(args.len());
        for (input, arg) in function.inputs.iter().zip(args.iter()) {
            let ty = param_type(input)?;
            values.push(self.parse(&input.name, &ty, arg)?);
        }
        function
            .abi_encode_input(&values)
            .map(Bytes::from)
            .map_err(|e| PortError::UserInput(format!("abi encoding failed: {e}")))
    }
}

pub fn param_type(param: &Param) -> Result<DynSolType, PortError> {
    param
        .resolve()
        .map_err(|e| PortError::UserInput(format!("unsupported type '{}': {e}", param.ty)))
}

/// Inverse of [`ParamEngine::parse`] for values that need no lookups.
pub fn render_canonical(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::Uint(u, _) => group_digits(&u.to_string()),
        DynSolValue::Int(i, _) => group_digits(&i.to_string()),
        DynSolValue::Address(a) => a.to_checksum(None),
        DynSolValue::FixedBytes(word, size) => format!("0x{}", hex::encode(&word[..*size])),
        DynSolValue::Bytes(b) => format!("0x{}", hex::encode(b)),
        DynSolValue::String(s) => format!("\"{s}\""),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            let items: Vec<String> = items.iter().map(render_canonical).collect();
            format!("[{}]", items.join(", "))
        }
        DynSolValue::Function(f) => format!("0x{}", hex::encode(f)),
        #[allow(unreachable_patterns)]
        other => format!("{other:?}"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenContext {
    pub decimals: u64,
    pub symbol: String,
}

impl TokenContext {
    pub fn annotate(&self, value: U256) -> String {
        format!(
            "{} ({} {})",
            group_digits(&value.to_string()),
            format_units(value, self.decimals),
            self.symbol
        )
    }
}

/// Display renderer: addresses carry descriptions, integers are grouped and
/// token amounts are annotated.
pub struct Renderer<'a> {
    resolver: Option<&'a dyn AddressResolver>,
}

impl<'a> Renderer<'a> {
    pub fn new(resolver: Option<&'a dyn AddressResolver>) -> Self {
        Self { resolver }
    }

    pub fn describe(&self, address: Address) -> String {
        self.resolver
            .and_then(|r| r.describe(address))
            .unwrap_or_else(|| "unknown".to_owned())
    }

    pub fn address(&self, address: Address) -> String {
        format!("{} ({})", address.to_checksum(None), self.describe(address))
    }

    pub fn param(
        &self,
        name: &str,
        ty: &str,
        components: &[Param],
        value: &DynSolValue,
        token: Option<&TokenContext>,
    ) -> DecodedParam {
        DecodedParam {
            name: name.to_owned(),
            ty: ty.to_owned(),
            value: self.value(ty, components, value, token),
        }
    }

    fn value(
        &self,
        ty: &str,
        components: &[Param],
        value: &DynSolValue,
        token: Option<&TokenContext>,
    ) -> ParamValue {
        match value {
            DynSolValue::Uint(u, _) => ParamValue::Scalar(match token {
                Some(t) => t.annotate(*u),
                None => group_digits(&u.to_string()),
            }),
            DynSolValue::Address(a) => ParamValue::Scalar(self.address(*a)),
            DynSolValue::Tuple(items) => ParamValue::Tuple(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| match components.get(i) {
                        Some(c) => self.param(&c.name, &c.ty, &c.components, item, None),
                        None => self.param(&format!("field{i}"), "", &[], item, None),
                    })
                    .collect(),
            ),
            DynSolValue::Array(items) | DynSolValue::FixedArray(items) => {
                let elem_ty = element_type(ty);
                ParamValue::Array(
                    items
                        .iter()
                        .map(|item| self.value(elem_ty, components, item, token))
                        .collect(),
                )
            }
            other => ParamValue::Scalar(render_canonical(other)),
        }
    }
}

/// `uint256[][3]` -> `uint256[]`.
fn element_type(ty: &str) -> &str {
    match ty.rfind('[') {
        Some(idx) if ty.ends_with(']') => &ty[..idx],
        _ => ty,
    }
}
