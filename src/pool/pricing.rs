//! `sqrtPriceX96` → human-readable token price conversion, decimal-exact.
//!
//! Adapted from the prior `sqrt_price_x96_str_to_adjusted_price` helper:
//! same normalize-then-square shape, but the whole computation stays in
//! `BigDecimal` instead of collapsing to `f64` partway through.

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use once_cell::sync::Lazy;
use std::str::FromStr;

/// The number of fractional digits a stored price is rounded to. Prices are
/// persisted as decimal strings, not floats, so this only bounds digit
/// growth — it is not a precision loss relative to on-chain values, which
/// themselves are integers scaled by `10^decimals`.
const PRICE_SCALE: i64 = 36;

static Q192: Lazy<BigDecimal> = Lazy::new(|| {
    let q96 = BigInt::from(2u32).pow(96);
    BigDecimal::from(&q96 * &q96)
});

fn pow10(exp: u32) -> BigDecimal {
    BigDecimal::from(BigInt::from(10u32).pow(exp))
}

/// Compute `(token0Price, token1Price)` from a pool's `sqrtPriceX96` and the
/// two currencies' decimals, per:
///
///   numerator = sqrtPriceX96² · 10^decimals0
///   denominator = 2^192 · 10^decimals1
///   price1 = numerator / denominator   (token1 per token0, human units)
///   price0 = 1 / price1
pub fn sqrt_price_x96_to_token_prices(
    sqrt_price_x96: &BigDecimal,
    decimals0: u8,
    decimals1: u8,
) -> (BigDecimal, BigDecimal) {
    let numerator = sqrt_price_x96 * sqrt_price_x96 * pow10(decimals0 as u32);
    let denominator = &*Q192 * pow10(decimals1 as u32);

    if denominator == BigDecimal::from(0) {
        return (BigDecimal::from(0), BigDecimal::from(0));
    }

    let price1 = (numerator / denominator).round(PRICE_SCALE);
    let price0 = if price1 == BigDecimal::from(0) {
        BigDecimal::from(0)
    } else {
        (BigDecimal::from(1) / &price1).round(PRICE_SCALE)
    };

    (price0, price1)
}

/// Parse a `sqrtPriceX96` decimal string into `BigDecimal`, used when a log's
/// `uint160` field arrives already stringified from the chain reader.
pub fn parse_sqrt_price_x96(raw: &str) -> Option<BigDecimal> {
    BigDecimal::from_str(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_sqrt_price_yields_price_one() {
        // 2^96 exactly: price == 1 when both tokens have 18 decimals.
        let sqrt_price = BigDecimal::from_str("79228162514264337593543950336").unwrap();
        let (price0, price1) = sqrt_price_x96_to_token_prices(&sqrt_price, 18, 18);
        assert_eq!(price0.round(6), BigDecimal::from(1));
        assert_eq!(price1.round(6), BigDecimal::from(1));
    }

    #[test]
    fn prices_are_reciprocal() {
        let sqrt_price = BigDecimal::from_str("112045541949572287496682733568").unwrap();
        let (price0, price1) = sqrt_price_x96_to_token_prices(&sqrt_price, 18, 6);
        let product = (&price0 * &price1).round(6);
        assert_eq!(product, BigDecimal::from(1));
    }

    #[test]
    fn decimal_adjustment_shifts_price_by_power_of_ten() {
        let sqrt_price = BigDecimal::from_str("79228162514264337593543950336").unwrap();
        let (_, price1_same_decimals) = sqrt_price_x96_to_token_prices(&sqrt_price, 18, 18);
        let (_, price1_fewer_decimals1) = sqrt_price_x96_to_token_prices(&sqrt_price, 18, 6);
        // token1 has fewer decimals => one human unit of token1 is "worth more"
        // raw units, so price1 (token1 per token0) scales up by 10^12.
        let ratio = (&price1_fewer_decimals1 / &price1_same_decimals).round(0);
        assert_eq!(ratio, BigDecimal::from(1_000_000_000_000u64));
    }
}
