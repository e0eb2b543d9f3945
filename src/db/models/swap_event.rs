//! The `SwapEvent` entity (§3): one row per on-chain `Swap` log, keyed by
//! `(transactionHash, logIndex)`.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct SwapEvent {
    pub transaction_hash: String,
    pub log_index: i64,
    pub pool_id: String,
    pub currency0: String,
    pub currency1: String,
    pub sender: String,
    /// Positive = token flowed into the pool, negative = out.
    pub amount0: BigDecimal,
    pub amount1: BigDecimal,
    pub sqrt_price_x96: BigDecimal,
    pub liquidity: BigDecimal,
    pub tick: i32,
    pub fee: u32,
    pub block_number: i64,
    pub block_timestamp: DateTime<Utc>,
}
