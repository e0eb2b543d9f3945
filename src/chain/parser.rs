//! ABI decoding of raw pool-manager logs into typed event records.
//!
//! Adapted from the prior log-parsing worker: same "match on topic[0], then
//! ABI-decode the matching event" shape, narrowed to the three V4 pool
//! manager events and built against the new ordered-log pipeline.

use alloy::primitives::{Address, FixedBytes, B256};
use alloy::sol_types::SolEvent;
use chrono::{DateTime, Utc};

use crate::abis::v4::{Initialize, ModifyLiquidity, Swap};
use crate::error::IndexError;

/// A log as delivered by the Chain Reader, before ABI decoding.
#[derive(Debug, Clone)]
pub struct RawLog {
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: String,
    pub block_timestamp: DateTime<Utc>,
    pub topics: Vec<B256>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct InitializeEvent {
    pub pool_id: FixedBytes<32>,
    pub currency0: Address,
    pub currency1: Address,
    pub fee: u32,
    pub tick_spacing: i32,
    pub hooks: Address,
    pub sqrt_price_x96: alloy::primitives::U256,
    pub tick: i32,
}

#[derive(Debug, Clone)]
pub struct SwapEventRaw {
    pub pool_id: FixedBytes<32>,
    pub sender: Address,
    pub amount0: alloy::primitives::I256,
    pub amount1: alloy::primitives::I256,
    pub sqrt_price_x96: alloy::primitives::U256,
    pub liquidity: u128,
    pub tick: i32,
    pub fee: u32,
}

#[derive(Debug, Clone)]
pub struct ModifyLiquidityEvent {
    pub pool_id: FixedBytes<32>,
    pub sender: Address,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity_delta: alloy::primitives::I256,
}

#[derive(Debug, Clone)]
pub enum DecodedEvent {
    Initialize(InitializeEvent),
    Swap(SwapEventRaw),
    ModifyLiquidity(ModifyLiquidityEvent),
}

/// Decode `log` into one of the three known pool manager events, matching
/// on `topics[0]` (the event signature hash) first so the caller never
/// pays for a decode attempt against the wrong ABI.
pub fn decode_log(log: &RawLog) -> Result<DecodedEvent, IndexError> {
    let topic0 = log
        .topics
        .first()
        .ok_or_else(|| IndexError::Decode("log has no topics".to_string()))?;

    if *topic0 == Initialize::SIGNATURE_HASH {
        let decoded = Initialize::decode_raw_log(log.topics.iter().copied(), &log.data, true)
            .map_err(|e| IndexError::Decode(format!("Initialize: {e}")))?;
        Ok(DecodedEvent::Initialize(InitializeEvent {
            pool_id: decoded.id,
            currency0: decoded.currency0,
            currency1: decoded.currency1,
            fee: decoded.fee.to::<u32>(),
            tick_spacing: decoded.tickSpacing.as_i32(),
            hooks: decoded.hooks,
            sqrt_price_x96: alloy::primitives::U256::from(decoded.sqrtPriceX96),
            tick: decoded.tick.as_i32(),
        }))
    } else if *topic0 == Swap::SIGNATURE_HASH {
        let decoded = Swap::decode_raw_log(log.topics.iter().copied(), &log.data, true)
            .map_err(|e| IndexError::Decode(format!("Swap: {e}")))?;
        Ok(DecodedEvent::Swap(SwapEventRaw {
            pool_id: decoded.id,
            sender: decoded.sender,
            amount0: decoded.amount0.as_i256(),
            amount1: decoded.amount1.as_i256(),
            sqrt_price_x96: alloy::primitives::U256::from(decoded.sqrtPriceX96),
            liquidity: decoded.liquidity,
            tick: decoded.tick.as_i32(),
            fee: decoded.fee.to::<u32>(),
        }))
    } else if *topic0 == ModifyLiquidity::SIGNATURE_HASH {
        let decoded =
            ModifyLiquidity::decode_raw_log(log.topics.iter().copied(), &log.data, true)
                .map_err(|e| IndexError::Decode(format!("ModifyLiquidity: {e}")))?;
        Ok(DecodedEvent::ModifyLiquidity(ModifyLiquidityEvent {
            pool_id: decoded.id,
            sender: decoded.sender,
            tick_lower: decoded.tickLower.as_i32(),
            tick_upper: decoded.tickUpper.as_i32(),
            liquidity_delta: decoded.liquidityDelta,
        }))
    } else {
        Err(IndexError::Decode(format!(
            "unrecognized topic0 {topic0:#x} in tx {}",
            log.transaction_hash
        )))
    }
}

/// `keccak256` signature hashes of the three recognized events, combined
/// into the single OR-filter the Chain Reader passes to `getLogs`/`subscribeLogs`.
pub fn topic0_filter() -> Vec<B256> {
    vec![
        Initialize::SIGNATURE_HASH,
        Swap::SIGNATURE_HASH,
        ModifyLiquidity::SIGNATURE_HASH,
    ]
}
