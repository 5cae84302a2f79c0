//! Conversions between decimal prices, wei amounts and contract timestamps

use chrono::{DateTime, TimeZone, Utc};
use ethers::types::U256;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::ChainError;

/// Decimals of the native currency the contract prices in
pub const WEI_DECIMALS: u32 = 18;

/// Truncate a price to what the contract can represent
pub fn to_chain_precision(price: Decimal) -> Decimal {
    price
        .round_dp_with_strategy(WEI_DECIMALS, RoundingStrategy::ToZero)
        .normalize()
}

/// Price in whole units to wei, truncating sub-wei digits
pub fn decimal_to_wei(price: Decimal) -> Result<U256, ChainError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(ChainError::InvalidData(format!("negative price {}", price)));
    }
    let truncated = price.round_dp_with_strategy(WEI_DECIMALS, RoundingStrategy::ToZero);
    let mantissa = truncated.mantissa().unsigned_abs();
    let shift = (WEI_DECIMALS - truncated.scale()) as usize;
    U256::from(mantissa)
        .checked_mul(U256::exp10(shift))
        .ok_or_else(|| ChainError::InvalidData(format!("price {} overflows uint256", price)))
}

/// Wei amount to a price in whole units
pub fn wei_to_decimal(wei: U256) -> Result<Decimal, ChainError> {
    if wei > U256::from(i128::MAX as u128) {
        return Err(ChainError::InvalidData(format!("wei amount {} too large", wei)));
    }
    let value = wei.as_u128() as i128;
    Decimal::try_from_i128_with_scale(value, WEI_DECIMALS)
        .map(|d| d.normalize())
        .map_err(|e| ChainError::InvalidData(format!("wei amount {}: {}", wei, e)))
}

/// Contract `uint256` seconds to a UTC timestamp
pub fn timestamp(secs: U256) -> Result<DateTime<Utc>, ChainError> {
    if secs > U256::from(i64::MAX as u64) {
        return Err(ChainError::InvalidData(format!("timestamp {} out of range", secs)));
    }
    Utc.timestamp_opt(secs.as_u64() as i64, 0)
        .single()
        .ok_or_else(|| ChainError::InvalidData(format!("timestamp {} out of range", secs)))
}
