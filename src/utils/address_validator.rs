//! 地址验证模块
//!
//! EVM 地址格式校验、EIP-55 校验和、小写规范化

use regex::Regex;
use sha3::{Digest, Keccak256};
use std::sync::LazyLock;

// 0x + 40 位十六进制
static EVM_ADDRESS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[a-fA-F0-9]{40}$").unwrap());

/// 地址验证器
pub struct AddressValidator;

impl AddressValidator {
    /// 仅检查格式：0x + 40 位十六进制
    pub fn is_evm_address(address: &str) -> bool {
        EVM_ADDRESS_REGEX.is_match(address)
    }

    /// 验证EVM地址（支持EIP-55 Checksum）
    ///
    /// 全小写或全大写地址视为未带校验和，直接通过；混合大小写必须满足 EIP-55。
    pub fn validate_evm_address(address: &str) -> bool {
        if !Self::is_evm_address(address) {
            return false;
        }

        let hex_part = &address[2..];
        let has_upper = hex_part.chars().any(|c| c.is_ascii_uppercase());
        let has_lower = hex_part.chars().any(|c| c.is_ascii_lowercase());
        if has_upper && has_lower {
            return Self::verify_eip55_checksum(address);
        }

        true
    }

    /// 规范化为小写（会话内部表示）
    pub fn normalize(address: &str) -> Option<String> {
        if Self::is_evm_address(address) {
            Some(format!("0x{}", address[2..].to_lowercase()))
        } else {
            None
        }
    }

    /// 生成 EIP-55 校验和地址
    pub fn to_checksum(address: &str) -> Option<String> {
        if !Self::is_evm_address(address) {
            return None;
        }

        let addr_lower = address[2..].to_lowercase();
        let hash = Keccak256::digest(addr_lower.as_bytes());

        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (i, ch) in addr_lower.chars().enumerate() {
            if ch.is_ascii_alphabetic() && Self::nibble(&hash, i) >= 8 {
                out.push(ch.to_ascii_uppercase());
            } else {
                out.push(ch);
            }
        }
        Some(out)
    }

    /// 验证EIP-55 Checksum
    /// https://eips.ethereum.org/EIPS/eip-55
    fn verify_eip55_checksum(address: &str) -> bool {
        Self::to_checksum(address).as_deref() == Some(address)
    }

    fn nibble(hash: &[u8], i: usize) -> u8 {
        let byte = hash[i / 2];
        if i % 2 == 0 {
            byte >> 4
        } else {
            byte & 0x0f
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        assert!(AddressValidator::is_evm_address(
            "0x742d35cc6634c0532925a3b844bc9e7595f0beb6"
        ));
        assert!(!AddressValidator::is_evm_address("0x123"));
        assert!(!AddressValidator::is_evm_address(
            "742d35cc6634c0532925a3b844bc9e7595f0beb6"
        ));
        assert!(!AddressValidator::is_evm_address(
            "0x742d35cc6634c0532925a3b844bc9e7595f0beg6"
        ));
    }

    #[test]
    fn test_checksum_known_vectors() {
        // EIP-55 示例
        let lower = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
        assert_eq!(
            AddressValidator::to_checksum(lower).unwrap(),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );

        assert_eq!(
            AddressValidator::to_checksum("0x55d398326f99059ff775485246999027b3197955").unwrap(),
            "0x55d398326f99059fF775485246999027B3197955"
        );
    }

    #[test]
    fn test_validate_mixed_case() {
        assert!(AddressValidator::validate_evm_address(
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        ));
        // 校验和错误
        assert!(!AddressValidator::validate_evm_address(
            "0x5AAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        ));
        assert!(AddressValidator::validate_evm_address(
            "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"
        ));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(
            AddressValidator::normalize("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").unwrap(),
            "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"
        );
        assert!(AddressValidator::normalize("bad").is_none());
    }
}
