//! The `Pool` entity (§3) and the V4 pool-ID computation it is keyed by.

use alloy::primitives::{keccak256, Address};
use alloy::sol_types::SolValue;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};

/// A Uniswap V4 pool, keyed by its 32-byte pool ID.
///
/// `currency0`/`currency1` are kept in the order the pool manager declared
/// them in `Initialize` — V4 does not require `currency0 < currency1`
/// byte-lexicographically the way V2/V3 factories do.
#[derive(Debug, Clone, PartialEq)]
pub struct Pool {
    pub pool_id: String,
    pub currency0: String,
    pub currency1: String,
    pub fee: u32,
    pub tick_spacing: i32,
    pub hooks: String,
    pub sqrt_price_x96: BigDecimal,
    pub tick: i32,
    pub liquidity: BigDecimal,
    pub total_value_locked_token0: BigDecimal,
    pub total_value_locked_token1: BigDecimal,
    pub token0_price: BigDecimal,
    pub token1_price: BigDecimal,
    pub token0_decimals: i16,
    pub token1_decimals: i16,
    pub created_block: i64,
    pub created_timestamp: DateTime<Utc>,
    pub created_tx_hash: String,
}

impl Pool {
    /// Whether `address` is one of this pool's two currencies.
    pub fn has_currency(&self, address: &str) -> bool {
        self.currency0 == address || self.currency1 == address
    }

    /// The counterpart currency to `address`, if `address` is in this pool.
    pub fn other_currency(&self, address: &str) -> Option<&str> {
        if self.currency0 == address {
            Some(&self.currency1)
        } else if self.currency1 == address {
            Some(&self.currency0)
        } else {
            None
        }
    }

    /// The price of `other_currency(address)` in units of `address`.
    pub fn price_of_other(&self, address: &str) -> Option<&BigDecimal> {
        if self.currency0 == address {
            Some(&self.token1_price)
        } else if self.currency1 == address {
            Some(&self.token0_price)
        } else {
            None
        }
    }

    /// The pool's TVL on the side opposite `address`.
    pub fn tvl_of_other(&self, address: &str) -> Option<&BigDecimal> {
        if self.currency0 == address {
            Some(&self.total_value_locked_token1)
        } else if self.currency1 == address {
            Some(&self.total_value_locked_token0)
        } else {
            None
        }
    }
}

/// Compute the Uniswap V4 pool ID from the event's own declared parameters:
/// `keccak256(abi.encode(currency0, currency1, fee, tickSpacing, hooks))`.
///
/// Unlike a V2/V3 pool ID, V4 does not sort the currencies — they are used
/// exactly as declared in `Initialize`. Sorting them here would compute a
/// different hash than the on-chain pool manager and break the anti-spoof
/// cross-check in the Pool State Machine.
pub fn compute_v4_pool_id(
    currency0: Address,
    currency1: Address,
    fee: u32,
    tick_spacing: i32,
    hooks: Address,
) -> String {
    let encoded = (currency0, currency1, fee, tick_spacing, hooks).abi_encode();
    let hash = keccak256(&encoded);
    format!("{hash:#x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn pool_id_is_order_sensitive_for_v4() {
        let a = Address::from_str("0x0000000000000000000000000000000000000000").unwrap();
        let b = Address::from_str("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48").unwrap();
        let hooks = Address::ZERO;

        let id_ab = compute_v4_pool_id(a, b, 3000, 60, hooks);
        let id_ba = compute_v4_pool_id(b, a, 3000, 60, hooks);

        // V4 does not sort currencies; swapping order must change the id.
        assert_ne!(id_ab, id_ba);
    }

    #[test]
    fn different_hooks_produce_different_ids() {
        let a = Address::ZERO;
        let b = Address::from_str("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48").unwrap();
        let hooks = Address::from_str("0x1234567890abcdef1234567890abcdef12345678").unwrap();

        let id_no_hooks = compute_v4_pool_id(a, b, 3000, 60, Address::ZERO);
        let id_with_hooks = compute_v4_pool_id(a, b, 3000, 60, hooks);
        assert_ne!(id_no_hooks, id_with_hooks);
    }
}
