//! Conversion of raw on-chain token amounts into human-readable USD decimals.
//!
//! `IndexedPayment::value_usd` / `fee_usd` are derived from the raw `U256` amount
//! and the configured token decimals, assuming the configured stable-token is
//! pegged 1:1 to a US dollar.

use alloy_primitives::U256;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

/// Converts a raw token amount (native units, e.g. USDC's 6-decimal base units)
/// into a `Decimal` scaled by `token_decimals`.
///
/// Returns `None` if the amount does not fit a `Decimal` (>~28 significant digits,
/// far beyond any realistic payment amount).
pub fn to_usd(raw: U256, token_decimals: u32) -> Option<Decimal> {
    // U256 values in this domain are payment amounts, never anywhere near
    // Decimal's ~28-digit ceiling, so a lossless round-trip through u128 is safe
    // for any value this service will plausibly see.
    let as_u128: u128 = raw.try_into().ok()?;
    let mut decimal = Decimal::from_u128(as_u128)?;
    decimal.set_scale(token_decimals).ok()?;
    Some(decimal.round_dp(6))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn converts_six_decimal_token() {
        let raw = U256::from(10_000_000u64); // 10 * 10^6
        let usd = to_usd(raw, 6).unwrap();
        assert_eq!(usd, Decimal::from_str("10.000000").unwrap());
    }

    #[test]
    fn rounds_to_six_fractional_digits() {
        let raw = U256::from(1u64);
        let usd = to_usd(raw, 18).unwrap();
        assert_eq!(usd, Decimal::from_str("0.000000").unwrap());
    }
}
