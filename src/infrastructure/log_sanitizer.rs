// 日志脱敏 - 地址和交易哈希只保留首尾

use regex::Regex;
use std::sync::LazyLock;

// 交易哈希（64个十六进制字符）
static TX_HASH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b0x[a-f0-9]{64}\b").unwrap());

// 地址（40个十六进制字符）
static ADDRESS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b0x[a-f0-9]{40}\b").unwrap());

/// 保留首尾，中间省略；长度不足或切点不在字符边界时整体隐藏
fn mask_ends(value: &str, head: usize, tail: usize) -> String {
    if value.len() < head + tail + 2 {
        return "***".to_string();
    }
    match (value.get(..head), value.get(value.len() - tail..)) {
        (Some(start), Some(end)) => format!("{}...{}", start, end),
        _ => "***".to_string(),
    }
}

/// 脱敏地址（保留 0x + 前4位和后4位）
pub fn mask_address(addr: &str) -> String {
    mask_ends(addr, 6, 4)
}

/// 脱敏交易哈希（保留前8位和后8位）
pub fn mask_tx_hash(hash: &str) -> String {
    mask_ends(hash, 10, 8)
}

/// 脱敏 Provider/后端返回的自由文本
pub fn sanitize_message(msg: &str) -> String {
    // 先处理哈希，避免地址规则截断哈希
    let masked = TX_HASH_REGEX.replace_all(msg, |caps: &regex::Captures| mask_tx_hash(&caps[0]));
    ADDRESS_REGEX
        .replace_all(&masked, |caps: &regex::Captures| mask_address(&caps[0]))
        .into_owned()
}
