//! 金额单位换算
//!
//! 链上金额一律使用最小单位整数（U256），这里的换算全部是整数运算，不经过浮点。

use ethers::types::U256;
use ethers::utils::{parse_units, ParseUnits};
use rust_decimal::Decimal;

use crate::error::CodecError;

/// 展示金额保留的小数位
pub const DISPLAY_FRACTION_DIGITS: u32 = 4;

// U256 最多容纳 10^77
const MAX_DECIMALS: u32 = 77;

fn pow10(exp: u32) -> Option<U256> {
    if exp > MAX_DECIMALS {
        return None;
    }
    Some(U256::exp10(exp as usize))
}

/// 整数除法，四舍五入（half-up）
fn div_round_half_up(value: U256, divisor: U256) -> U256 {
    let quotient = value / divisor;
    let remainder = value % divisor;
    // remainder < divisor，减法不会下溢
    if remainder >= divisor - remainder {
        quotient + 1
    } else {
        quotient
    }
}

/// 十进制金额 -> 最小单位：`round(amount * 10^decimals)`
pub fn to_smallest_unit(amount: Decimal, decimals: u8) -> Result<U256, CodecError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(CodecError::NegativeAmount(amount.to_string()));
    }

    let mantissa = U256::from(amount.mantissa().unsigned_abs());
    let scale = amount.scale();
    let decimals = decimals as u32;
    let overflow = || CodecError::AmountOverflow(amount.to_string());

    if decimals >= scale {
        let factor = pow10(decimals - scale).ok_or_else(overflow)?;
        mantissa.checked_mul(factor).ok_or_else(overflow)
    } else {
        let divisor = pow10(scale - decimals).ok_or_else(overflow)?;
        Ok(div_round_half_up(mantissa, divisor))
    }
}

/// 解析用户输入的十进制字符串（不经过浮点）
///
/// 小数位超过代币精度、负数、非数字均返回 `None`。
pub fn parse_amount(amount: &str, decimals: u8) -> Option<U256> {
    let amount = amount.trim();
    if amount.is_empty() || amount.starts_with('-') || amount.starts_with('+') {
        return None;
    }
    if let Some((_, fraction)) = amount.split_once('.') {
        if fraction.len() > decimals as usize {
            return None;
        }
    }

    match parse_units(amount, decimals as u32) {
        Ok(ParseUnits::U256(value)) => Some(value),
        Ok(ParseUnits::I256(_)) | Err(_) => None,
    }
}

/// 最小单位 -> 完整十进制字符串，去掉尾随零（`2500000000000000000` @18 -> `"2.5"`）
pub fn format_amount(raw: U256, decimals: u8) -> String {
    let decimals = decimals as u32;
    let Some(base) = pow10(decimals) else {
        return raw.to_string();
    };

    let integer = raw / base;
    let fraction = raw % base;
    if fraction.is_zero() {
        return integer.to_string();
    }

    let fraction = format!("{:0>width$}", fraction.to_string(), width = decimals as usize);
    format!("{}.{}", integer, fraction.trim_end_matches('0'))
}

/// 最小单位 -> 固定 4 位小数的展示字符串（四舍五入）
pub fn display_amount(raw: U256, decimals: u8) -> String {
    let decimals = decimals as u32;
    let scaled = if decimals >= DISPLAY_FRACTION_DIGITS {
        match pow10(decimals - DISPLAY_FRACTION_DIGITS) {
            Some(divisor) => div_round_half_up(raw, divisor),
            None => U256::zero(),
        }
    } else {
        let factor = U256::exp10((DISPLAY_FRACTION_DIGITS - decimals) as usize);
        raw.saturating_mul(factor)
    };

    let unit = U256::exp10(DISPLAY_FRACTION_DIGITS as usize);
    format!(
        "{}.{:0>4}",
        scaled / unit,
        (scaled % unit).to_string()
    )
}

/// 最小单位 -> f64（仅用于展示和汇率换算，不得回流到链上金额）
pub fn to_f64_lossy(raw: U256, decimals: u8) -> f64 {
    format_amount(raw, decimals).parse().unwrap_or(0.0)
}
