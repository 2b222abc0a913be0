//! ABIs shipped with the binary and helpers shared by the ABI consumers.

use alloy::json_abi::{Function, JsonAbi};
use alloy::primitives::Selector;

use crate::ports::PortError;

pub const ERC20_ABI_JSON: &str = include_str!("abis/erc20.json");
pub const GNOSIS_MULTISIG_ABI_JSON: &str = include_str!("abis/gnosis_multisig.json");

pub const DECIMALS_SELECTOR: [u8; 4] = [0x31, 0x3c, 0xe5, 0x67];
pub const SYMBOL_SELECTOR: [u8; 4] = [0x95, 0xd8, 0x9b, 0x41];
/// `implementation()` on an EIP-1967 beacon.
pub const IMPLEMENTATION_SELECTOR: [u8; 4] = [0x5c, 0x60, 0xda, 0x1b];
/// `Error(string)`
pub const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
/// `Panic(uint256)`
pub const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

pub fn parse_abi(raw: &str) -> Result<JsonAbi, PortError> {
    serde_json::from_str(raw).map_err(|e| PortError::Validation(format!("invalid ABI JSON: {e}")))
}

pub fn erc20() -> Result<JsonAbi, PortError> {
    parse_abi(ERC20_ABI_JSON)
}

pub fn gnosis_multisig() -> Result<JsonAbi, PortError> {
    parse_abi(GNOSIS_MULTISIG_ABI_JSON)
}

pub fn function_by_selector<'a>(abi: &'a JsonAbi, selector: &[u8]) -> Option<&'a Function> {
    if selector.len() < 4 {
        return None;
    }
    let selector = Selector::from_slice(&selector[..4]);
    abi.functions().find(|f| f.selector() == selector)
}

/// Functions sorted by name, as offered to the operator by index.
pub fn listed_functions(abi: &JsonAbi, read_only: bool) -> Vec<&Function> {
    use alloy::json_abi::StateMutability;
    abi.functions()
        .filter(|f| {
            let view = matches!(
                f.state_mutability,
                StateMutability::View | StateMutability::Pure
            );
            view == read_only
        })
        .collect()
}

pub fn function_named<'a>(abi: &'a JsonAbi, name: &str) -> Result<&'a Function, PortError> {
    abi.function(name)
        .and_then(|overloads| overloads.first())
        .ok_or_else(|| PortError::UserInput(format!("ABI has no method named '{name}'")))
}
