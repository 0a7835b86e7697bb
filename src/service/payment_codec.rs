//! 支付意图编解码
//!
//! 编码：`ethereum:<合约地址>@<链ID>/transfer?address=<收款方>&uint256=<最小单位金额>`（EIP-681）。
//! 解码：扫码/上传得到的任意文本 -> `PaymentIntent`，永不失败，无法识别时返回 `RawPayload`。

use std::sync::Arc;

use ethers::types::U256;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::domain::{PaymentIntent, TokenDescriptor, TokenRegistry};
use crate::error::CodecError;
use crate::utils::{units, AddressValidator};

const SCHEME: &str = "ethereum:";
const TRANSFER_FUNCTION: &str = "transfer";

/// 灰度图像帧（由外部摄像头/图片源提供）
#[derive(Debug, Clone)]
pub struct ImageFrame {
    pub width: u32,
    pub height: u32,
    /// 每像素一个字节的亮度值，按行存储
    pub luma: Vec<u8>,
}

/// 二维码像素解码器（外部协作方实现）
pub trait QrDecoder: Send + Sync {
    /// 识别出二维码时返回其中的文本
    fn scan(&self, frame: &ImageFrame) -> Option<String>;
}

pub struct PaymentCodec {
    registry: Arc<TokenRegistry>,
    chain_id: u64,
}

impl PaymentCodec {
    pub fn new(registry: Arc<TokenRegistry>, chain_id: u64) -> Self {
        Self { registry, chain_id }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn token(&self, symbol: &str) -> Result<&TokenDescriptor, CodecError> {
        self.registry
            .get(symbol)
            .ok_or_else(|| CodecError::UnsupportedToken(symbol.to_string()))
    }

    /// 编码收款请求，金额为最小单位
    pub fn encode(
        &self,
        recipient: &str,
        symbol: &str,
        amount_smallest_unit: U256,
    ) -> Result<String, CodecError> {
        let token = self.token(symbol)?;
        let recipient = recipient.trim();
        if !AddressValidator::validate_evm_address(recipient) {
            return Err(CodecError::InvalidRecipient(recipient.to_string()));
        }

        let contract = AddressValidator::to_checksum(&token.contract_address)
            .unwrap_or_else(|| token.contract_address.clone());

        Ok(format!(
            "{}{}@{}/{}?address={}&uint256={}",
            SCHEME, contract, self.chain_id, TRANSFER_FUNCTION, recipient, amount_smallest_unit
        ))
    }

    /// 编码收款请求，金额为代币单位的十进制数（按代币精度四舍五入）
    pub fn encode_decimal(
        &self,
        recipient: &str,
        symbol: &str,
        amount: Decimal,
    ) -> Result<String, CodecError> {
        let token = self.token(symbol)?;
        let raw = units::to_smallest_unit(amount, token.decimals)?;
        self.encode(recipient, symbol, raw)
    }

    /// 解码任意文本
    ///
    /// 顺序：`ethereum:` URI -> JSON 对象 -> 裸地址 -> 原始文本。
    pub fn decode(&self, payload: &str) -> PaymentIntent {
        let trimmed = payload.trim();

        if let Some(rest) = strip_prefix_ignore_case(trimmed, SCHEME) {
            return decode_uri(rest).unwrap_or_else(|| PaymentIntent::RawPayload {
                text: payload.to_string(),
            });
        }

        if trimmed.starts_with('{') {
            if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(trimmed) {
                return PaymentIntent::Structured { fields };
            }
        }

        if AddressValidator::is_evm_address(trimmed) {
            return PaymentIntent::AddressOnly {
                address: trimmed.to_string(),
            };
        }

        PaymentIntent::RawPayload {
            text: payload.to_string(),
        }
    }

    /// 从图像帧解码；未识别出二维码时返回 None
    pub fn decode_image(&self, decoder: &dyn QrDecoder, frame: &ImageFrame) -> Option<PaymentIntent> {
        let text = decoder.scan(frame)?;
        Some(self.decode(&text))
    }

    /// 根据转账意图中的合约地址匹配注册代币（链ID不一致时不匹配）
    pub fn resolve_token(&self, intent: &PaymentIntent) -> Option<&TokenDescriptor> {
        match intent {
            PaymentIntent::Transfer {
                token_contract,
                chain_id,
                ..
            } => {
                if chain_id.is_some_and(|id| id != self.chain_id) {
                    return None;
                }
                self.registry.find_by_contract(token_contract)
            }
            _ => None,
        }
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &s[prefix.len()..])
}

/// 解析 `ethereum:` 之后的部分；格式错误返回 None
fn decode_uri(rest: &str) -> Option<PaymentIntent> {
    let rest = rest.strip_prefix("pay-").unwrap_or(rest);
    let (path, query) = match rest.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (rest, None),
    };

    let (target_and_chain, function) = match path.split_once('/') {
        Some((head, function)) => (head, Some(function)),
        None => (path, None),
    };

    let (target, chain_id) = match target_and_chain.split_once('@') {
        Some((target, chain)) => (target, Some(chain.parse::<u64>().ok()?)),
        None => (target_and_chain, None),
    };

    if !AddressValidator::is_evm_address(target) {
        return None;
    }

    let Some(function) = function else {
        return Some(PaymentIntent::AddressOnly {
            address: target.to_string(),
        });
    };

    if function != TRANSFER_FUNCTION {
        return None;
    }

    let query = query?;
    let recipient = query_param(query, "address")?;
    if !AddressValidator::is_evm_address(recipient) {
        return None;
    }
    let amount = parse_uint(query_param(query, "uint256")?)?;

    Some(PaymentIntent::Transfer {
        token_contract: target.to_string(),
        chain_id,
        recipient: recipient.to_string(),
        amount_smallest_unit: amount,
    })
}

fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

/// 整数金额，支持 EIP-681 的科学计数法（如 `2.5e18`），结果必须是整数
fn parse_uint(value: &str) -> Option<U256> {
    let (mantissa, exponent) = match value.split_once(['e', 'E']) {
        Some((m, e)) => (m, e.parse::<u32>().ok()?),
        None => (value, 0),
    };

    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }

    let frac_trimmed = frac_part.trim_end_matches('0');
    let significant_frac = frac_trimmed.len() as u32;
    if significant_frac > exponent {
        return None;
    }

    let digits = format!("{}{}", int_part, frac_trimmed);
    let digits = if digits.is_empty() { "0" } else { digits.as_str() };
    let base = U256::from_dec_str(digits).ok()?;

    let shift = exponent - significant_frac;
    if shift > 77 {
        return if base.is_zero() { Some(base) } else { None };
    }
    base.checked_mul(U256::exp10(shift as usize))
}
