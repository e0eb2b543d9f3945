//! Integer/decimal-precise tick math for the concentrated-liquidity formulas
//! in pool state transitions. Adapted from the prior floating-point
//! `TickMath.sol`-style implementation: same exponentiation-by-squaring
//! shape, but carried through `BigDecimal` end to end so no on-chain value
//! is ever rounded through a 64-bit float.

use bigdecimal::BigDecimal;
use once_cell::sync::Lazy;
use std::str::FromStr;

/// Working precision (digits after the decimal point) for intermediate
/// tick-ratio powers. Final prices are rounded down to a smaller scale by
/// the caller; this only bounds how far exponentiation-by-squaring grows
/// the digit count per step.
const WORKING_SCALE: i64 = 60;

static BASE: Lazy<BigDecimal> = Lazy::new(|| BigDecimal::from_str("1.0001").unwrap());

pub static Q96: Lazy<BigDecimal> =
    Lazy::new(|| BigDecimal::from_str("79228162514264337593543950336").unwrap());

/// Valid tick range, matching Uniswap V3/V4's `TickMath` limits.
pub const MIN_TICK: i32 = -887272;
pub const MAX_TICK: i32 = 887272;

/// `base^exp`, computed by exponentiation-by-squaring with the working
/// scale re-applied after every multiplication so digit growth stays
/// bounded regardless of `exp`'s magnitude.
fn pow_fixed(base: &BigDecimal, exp: i64, scale: i64) -> BigDecimal {
    if exp == 0 {
        return BigDecimal::from(1);
    }
    let negative = exp < 0;
    let mut e = exp.unsigned_abs();
    let mut result = BigDecimal::from(1);
    let mut b = base.with_scale(scale);

    while e > 0 {
        if e & 1 == 1 {
            result = (&result * &b).with_scale(scale);
        }
        b = (&b * &b).with_scale(scale);
        e >>= 1;
    }

    if negative {
        (BigDecimal::from(1) / result).with_scale(scale)
    } else {
        result
    }
}

/// `1.0001^tick`, clamped to the valid tick range.
pub fn ratio_at_tick(tick: i32) -> BigDecimal {
    let clamped = tick.clamp(MIN_TICK, MAX_TICK);
    pow_fixed(&BASE, clamped as i64, WORKING_SCALE)
}

/// `sqrtRatioAtTick(t) = (1.0001^(t/2)) · 2^96`, computed as
/// `sqrt(1.0001^t) · 2^96` to avoid a fractional exponent.
pub fn sqrt_ratio_at_tick_x96(tick: i32) -> BigDecimal {
    let ratio = ratio_at_tick(tick);
    let sqrt_ratio = ratio
        .sqrt()
        .expect("1.0001^tick is always positive for a finite tick");
    (&sqrt_ratio * &*Q96).with_scale(WORKING_SCALE)
}

/// The three-regime concentrated-liquidity delta formulas from the pool
/// manager's `ModifyLiquidity` handling. `current_sqrt_price_x96` is the
/// pool's actual current price (not re-derived from `current_tick`), per
/// the in-range split rule.
///
/// Returns `(delta_amount0, delta_amount1)`, unsigned magnitudes — the
/// caller scales by `liquidityDelta`'s sign.
pub fn modify_liquidity_deltas(
    liquidity: &BigDecimal,
    current_tick: i32,
    current_sqrt_price_x96: &BigDecimal,
    tick_lower: i32,
    tick_upper: i32,
) -> (BigDecimal, BigDecimal) {
    let sqrt_pa = sqrt_ratio_at_tick_x96(tick_lower);
    let sqrt_pb = sqrt_ratio_at_tick_x96(tick_upper);

    if current_tick < tick_lower {
        let amount0 = delta_amount0(liquidity, &sqrt_pa, &sqrt_pb);
        (amount0, BigDecimal::from(0))
    } else if current_tick >= tick_upper {
        let amount1 = delta_amount1(liquidity, &sqrt_pa, &sqrt_pb);
        (BigDecimal::from(0), amount1)
    } else {
        let amount0 = delta_amount0(liquidity, current_sqrt_price_x96, &sqrt_pb);
        let amount1 = delta_amount1(liquidity, &sqrt_pa, current_sqrt_price_x96);
        (amount0, amount1)
    }
}

/// `Δamount0 = (liquidity · 2^96 · (√Pb − √Pa)) / (√Pa · √Pb)`
fn delta_amount0(liquidity: &BigDecimal, sqrt_pa: &BigDecimal, sqrt_pb: &BigDecimal) -> BigDecimal {
    let (lo, hi) = order(sqrt_pa, sqrt_pb);
    let numerator = liquidity * &*Q96 * (&hi - &lo);
    let denominator = &lo * &hi;
    if denominator == BigDecimal::from(0) {
        return BigDecimal::from(0);
    }
    (numerator / denominator).with_scale(WORKING_SCALE)
}

/// `Δamount1 = liquidity · (√Pb − √Pa) / 2^96`
fn delta_amount1(liquidity: &BigDecimal, sqrt_pa: &BigDecimal, sqrt_pb: &BigDecimal) -> BigDecimal {
    let (lo, hi) = order(sqrt_pa, sqrt_pb);
    (liquidity * (&hi - &lo) / &*Q96).with_scale(WORKING_SCALE)
}

fn order(a: &BigDecimal, b: &BigDecimal) -> (BigDecimal, BigDecimal) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_at_tick_zero_is_one() {
        assert_eq!(ratio_at_tick(0).round(10), BigDecimal::from(1));
    }

    #[test]
    fn sqrt_ratio_at_tick_zero_is_q96() {
        let sqrt_ratio = sqrt_ratio_at_tick_x96(0);
        assert_eq!(sqrt_ratio.round(0), Q96.round(0));
    }

    #[test]
    fn sqrt_ratio_is_monotonic_in_tick() {
        let low = sqrt_ratio_at_tick_x96(-60);
        let mid = sqrt_ratio_at_tick_x96(0);
        let high = sqrt_ratio_at_tick_x96(60);
        assert!(low < mid);
        assert!(mid < high);
    }

    #[test]
    fn modify_liquidity_inside_range_moves_both_tokens() {
        let liquidity = BigDecimal::from(1_000_000_000_000_000_000u64);
        let current_sqrt_price = sqrt_ratio_at_tick_x96(0);
        let (amount0, amount1) =
            modify_liquidity_deltas(&liquidity, 0, &current_sqrt_price, -60, 60);
        assert!(amount0 > BigDecimal::from(0));
        assert!(amount1 > BigDecimal::from(0));
    }

    #[test]
    fn modify_liquidity_below_range_moves_only_token0() {
        let liquidity = BigDecimal::from(1_000_000_000_000_000_000u64);
        let current_sqrt_price = sqrt_ratio_at_tick_x96(-120);
        let (amount0, amount1) =
            modify_liquidity_deltas(&liquidity, -120, &current_sqrt_price, -60, 60);
        assert!(amount0 > BigDecimal::from(0));
        assert_eq!(amount1, BigDecimal::from(0));
    }

    #[test]
    fn modify_liquidity_above_range_moves_only_token1() {
        let liquidity = BigDecimal::from(1_000_000_000_000_000_000u64);
        let current_sqrt_price = sqrt_ratio_at_tick_x96(120);
        let (amount0, amount1) =
            modify_liquidity_deltas(&liquidity, 120, &current_sqrt_price, -60, 60);
        assert_eq!(amount0, BigDecimal::from(0));
        assert!(amount1 > BigDecimal::from(0));
    }
}
