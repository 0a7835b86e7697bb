//! ERC-20 调用编码

use std::str::FromStr;

use ethers::abi::{encode, Token};
use ethers::types::{Address, U256};
use serde_json::{json, Value};

use crate::error::CodecError;

fn selector(sig: &str) -> [u8; 4] {
    let hash = ethers::utils::keccak256(sig.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn encode_call(sig: &str, args: Vec<Token>) -> String {
    let mut out = Vec::with_capacity(4 + 32 * args.len());
    out.extend_from_slice(&selector(sig));
    out.extend_from_slice(&encode(&args));
    format!("0x{}", hex::encode(out))
}

pub fn parse_address(address: &str) -> Result<Address, CodecError> {
    Address::from_str(address).map_err(|_| CodecError::InvalidRecipient(address.to_string()))
}

/// `balanceOf(address)` = 0x70a08231
pub fn balance_of_data(owner: Address) -> String {
    encode_call("balanceOf(address)", vec![Token::Address(owner)])
}

/// `decimals()` = 0x313ce567
pub fn decimals_data() -> String {
    encode_call("decimals()", vec![])
}

/// `transfer(address,uint256)` = 0xa9059cbb
pub fn transfer_data(recipient: Address, amount: U256) -> String {
    encode_call(
        "transfer(address,uint256)",
        vec![Token::Address(recipient), Token::Uint(amount)],
    )
}

/// `eth_call` 参数
pub fn call_params(contract: &str, data: &str) -> Value {
    json!([{ "to": contract, "data": data }, "latest"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selectors() {
        assert_eq!(decimals_data(), "0x313ce567");

        let owner = parse_address("0x742d35cc6634c0532925a3b844bc9e7595f0beb6").unwrap();
        let data = balance_of_data(owner);
        assert!(data.starts_with("0x70a08231"));
        assert_eq!(data.len(), 2 + 8 + 64);
        assert!(data.ends_with("742d35cc6634c0532925a3b844bc9e7595f0beb6"));
    }

    #[test]
    fn test_transfer_data() {
        let recipient = parse_address("0x742d35cc6634c0532925a3b844bc9e7595f0beb6").unwrap();
        let data = transfer_data(recipient, U256::from(1000u64));
        assert!(data.starts_with("0xa9059cbb"));
        assert_eq!(data.len(), 2 + 8 + 128);
        assert!(data.ends_with("3e8"));
    }

    #[test]
    fn test_parse_address_rejects_garbage() {
        assert!(parse_address("not-an-address").is_err());
    }
}
