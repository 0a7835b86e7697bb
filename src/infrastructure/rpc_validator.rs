// RPC响应校验模块 - 钱包返回的数据在进入领域模型前统一校验

use anyhow::{Context, Result};
use ethers::types::U256;
use serde_json::Value;

/// 代币精度上限（U256 最多容纳 10^77）
const MAX_TOKEN_DECIMALS: u64 = 77;

fn as_hex_str<'a>(value: &'a Value, field: &str) -> Result<&'a str> {
    value
        .as_str()
        .with_context(|| format!("{} is not a hex string: {}", field, value))
}

/// 验证 `eth_call` 返回的 ABI uint256 字（32字节）
pub fn validate_uint256_word(result: &Value) -> Result<U256> {
    let hex_str = as_hex_str(result, "eth_call result")?;
    let hex_part = hex_str.trim().trim_start_matches("0x");

    // 合约不存在或调用被 revert 时部分节点返回 "0x"
    if hex_part.is_empty() {
        anyhow::bail!("Empty eth_call result");
    }

    let bytes = hex::decode(hex_part).context("Invalid eth_call hex result")?;
    if bytes.len() < 32 {
        anyhow::bail!("Invalid eth_call ABI result length: {}", bytes.len());
    }

    Ok(U256::from_big_endian(&bytes[..32]))
}

/// 验证合约返回的精度
pub fn validate_decimals(value: U256) -> Result<u8> {
    if value > U256::from(MAX_TOKEN_DECIMALS) {
        anyhow::bail!("Token decimals out of range: {}", value);
    }
    Ok(value.as_u64() as u8)
}

/// 验证十六进制数量（区块号、gas、状态码）
pub fn validate_quantity(value: &Value, field: &str) -> Result<u64> {
    let hex_str = as_hex_str(value, field)?;
    let digits = hex_str.trim_start_matches("0x");

    // u64最多16个十六进制字符
    if digits.is_empty() || digits.len() > 16 {
        anyhow::bail!("Invalid {} length: {}", field, digits.len());
    }

    u64::from_str_radix(digits, 16).with_context(|| format!("Failed to parse {} from hex", field))
}

/// 验证交易哈希格式
pub fn validate_tx_hash(value: &Value) -> Result<String> {
    let tx_hash = as_hex_str(value, "transaction hash")?;
    let hash = tx_hash.trim_start_matches("0x");

    // 以太坊交易哈希为32字节 = 64个十六进制字符
    if hash.len() != 64 {
        anyhow::bail!(
            "Invalid transaction hash length: expected 64, got {}",
            hash.len()
        );
    }

    if !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        anyhow::bail!("Invalid transaction hash format: contains non-hex characters");
    }

    Ok(format!("0x{}", hash.to_lowercase()))
}
