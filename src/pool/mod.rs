//! Pool State Machine: applies Initialize/Swap/ModifyLiquidity to per-pool
//! state. The sole writer to the `Pool` collection (§3 ownership rule).

pub mod pricing;
pub mod tick_math;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use log::warn;
use std::str::FromStr;
use std::sync::Arc;

use crate::chain::metadata::MetadataFetcher;
use crate::chain::parser::{InitializeEvent, ModifyLiquidityEvent, SwapEventRaw};
use crate::db::models::{Pool, SwapEvent};
use crate::db::models::pool::compute_v4_pool_id;
use crate::db::postgres::PostgresClient;
use crate::error::IndexError;

/// Outcome of applying an `Initialize` log: the created pool, and whether
/// either currency is whitelisted (so the orchestrator can link the other
/// currency via the Token Aggregator without the state machine calling
/// back into the aggregator itself — see the cyclic-dependency note).
pub struct InitializeOutcome {
    pub pool: Pool,
    pub currency0_is_whitelisted: bool,
    pub currency1_is_whitelisted: bool,
}

/// Outcome of applying a `Swap` log: the updated pool plus the persisted
/// swap event, handed to the Token Aggregator by the orchestrator.
pub struct SwapOutcome {
    pub pool: Pool,
    pub swap_event: SwapEvent,
}

pub struct PoolStateMachine {
    postgres: Arc<PostgresClient>,
    metadata: Arc<MetadataFetcher>,
    whitelist_tokens: Vec<String>,
}

impl PoolStateMachine {
    pub fn new(
        postgres: Arc<PostgresClient>,
        metadata: Arc<MetadataFetcher>,
        whitelist_tokens: Vec<String>,
    ) -> Self {
        Self {
            postgres,
            metadata,
            whitelist_tokens,
        }
    }

    fn is_whitelisted(&self, address: &str) -> bool {
        self.whitelist_tokens
            .iter()
            .any(|t| t.eq_ignore_ascii_case(address))
    }

    /// `Initialize`: creates the Pool record. A pool ID that already exists
    /// is a duplicate and is dropped without error (returns `Ok(None)`).
    pub async fn apply_initialize(
        &self,
        event: &InitializeEvent,
        block_number: u64,
        block_timestamp: DateTime<Utc>,
        tx_hash: &str,
    ) -> Result<Option<InitializeOutcome>, IndexError> {
        let pool_id = compute_v4_pool_id(
            event.currency0,
            event.currency1,
            event.fee,
            event.tick_spacing,
            event.hooks,
        );

        let currency0 = format!("{:#x}", event.currency0);
        let currency1 = format!("{:#x}", event.currency1);

        let sqrt_price_x96 = BigDecimal::from_str(&event.sqrt_price_x96.to_string())
            .map_err(|e| IndexError::Decode(format!("sqrtPriceX96: {e}")))?;

        let fetched = self
            .metadata
            .fetch_batch(&[currency0.clone(), currency1.clone()])
            .await;
        let token0_decimals = fetched[0].decimals;
        let token1_decimals = fetched[1].decimals;

        let (token0_price, token1_price) = pricing::sqrt_price_x96_to_token_prices(
            &sqrt_price_x96,
            token0_decimals as u8,
            token1_decimals as u8,
        );

        let pool = Pool {
            pool_id,
            currency0: currency0.clone(),
            currency1: currency1.clone(),
            fee: event.fee,
            tick_spacing: event.tick_spacing,
            hooks: format!("{:#x}", event.hooks),
            sqrt_price_x96,
            tick: event.tick,
            liquidity: BigDecimal::from(0),
            total_value_locked_token0: BigDecimal::from(0),
            total_value_locked_token1: BigDecimal::from(0),
            token0_price,
            token1_price,
            token0_decimals,
            token1_decimals,
            created_block: block_number as i64,
            created_timestamp: block_timestamp,
            created_tx_hash: tx_hash.to_string(),
        };

        let inserted = self
            .postgres
            .insert_pool_if_absent(&pool)
            .await
            .map_err(IndexError::Database)?;

        if !inserted {
            return Ok(None);
        }

        Ok(Some(InitializeOutcome {
            currency0_is_whitelisted: self.is_whitelisted(&currency0),
            currency1_is_whitelisted: self.is_whitelisted(&currency1),
            pool,
        }))
    }

    /// `Swap`: requires the pool to already exist. A pool with no prior
    /// `Initialize` is skipped with a warning — SyncState still advances,
    /// this is not a fatal error.
    pub async fn apply_swap(
        &self,
        event: &SwapEventRaw,
        block_number: u64,
        block_timestamp: DateTime<Utc>,
        log_index: u64,
        tx_hash: &str,
    ) -> Result<Option<SwapOutcome>, IndexError> {
        let pool_id = format!("{:#x}", event.pool_id);

        let mut pool = match self
            .postgres
            .get_pool(&pool_id)
            .await
            .map_err(IndexError::Database)?
        {
            Some(pool) => pool,
            None => {
                warn!("swap for unknown pool {pool_id} in tx {tx_hash}, skipping");
                return Ok(None);
            },
        };

        let sqrt_price_x96 = BigDecimal::from_str(&event.sqrt_price_x96.to_string())
            .map_err(|e| IndexError::Decode(format!("sqrtPriceX96: {e}")))?;
        let liquidity = BigDecimal::from(event.liquidity);
        let amount0 = BigDecimal::from_str(&event.amount0.to_string())
            .map_err(|e| IndexError::Decode(format!("amount0: {e}")))?;
        let amount1 = BigDecimal::from_str(&event.amount1.to_string())
            .map_err(|e| IndexError::Decode(format!("amount1: {e}")))?;

        let (token0_price, token1_price) = pricing::sqrt_price_x96_to_token_prices(
            &sqrt_price_x96,
            pool.token0_decimals as u8,
            pool.token1_decimals as u8,
        );

        pool.sqrt_price_x96 = sqrt_price_x96.clone();
        pool.tick = event.tick;
        pool.liquidity = liquidity.clone();
        pool.token0_price = token0_price;
        pool.token1_price = token1_price;
        pool.total_value_locked_token0 += &amount0;
        pool.total_value_locked_token1 += &amount1;

        self.postgres
            .update_pool_state(&pool)
            .await
            .map_err(IndexError::Database)?;

        let swap_event = SwapEvent {
            transaction_hash: tx_hash.to_string(),
            log_index: log_index as i64,
            pool_id: pool_id.clone(),
            currency0: pool.currency0.clone(),
            currency1: pool.currency1.clone(),
            sender: format!("{:#x}", event.sender),
            amount0,
            amount1,
            sqrt_price_x96,
            liquidity,
            tick: event.tick,
            fee: event.fee,
            block_number: block_number as i64,
            block_timestamp,
        };

        let inserted = self
            .postgres
            .insert_swap_event_if_absent(&swap_event)
            .await
            .map_err(IndexError::Database)?;

        if !inserted {
            // Duplicate-key: expected dedup path, swallow per §7.
            return Ok(None);
        }

        Ok(Some(SwapOutcome { pool, swap_event }))
    }

    /// `ModifyLiquidity`: updates liquidity and TVL only; never touches
    /// Token/Candle rows (those are swap-triggered, per §4.3).
    pub async fn apply_modify_liquidity(
        &self,
        event: &ModifyLiquidityEvent,
    ) -> Result<(), IndexError> {
        let pool_id = format!("{:#x}", event.pool_id);

        let mut pool = match self
            .postgres
            .get_pool(&pool_id)
            .await
            .map_err(IndexError::Database)?
        {
            Some(pool) => pool,
            None => {
                warn!("modifyLiquidity for unknown pool {pool_id}, skipping");
                return Ok(());
            },
        };

        let liquidity_delta = BigDecimal::from_str(&event.liquidity_delta.to_string())
            .map_err(|e| IndexError::Decode(format!("liquidityDelta: {e}")))?;

        let (delta0, delta1) = tick_math::modify_liquidity_deltas(
            &pool.liquidity.clone().max(BigDecimal::from(0)),
            pool.tick,
            &pool.sqrt_price_x96,
            event.tick_lower,
            event.tick_upper,
        );

        let negative = liquidity_delta < BigDecimal::from(0);
        pool.liquidity = (&pool.liquidity + &liquidity_delta).max(BigDecimal::from(0));

        if negative {
            pool.total_value_locked_token0 -= &delta0;
            pool.total_value_locked_token1 -= &delta1;
        } else {
            pool.total_value_locked_token0 += &delta0;
            pool.total_value_locked_token1 += &delta1;
        }

        self.postgres
            .update_pool_state(&pool)
            .await
            .map_err(IndexError::Database)?;

        Ok(())
    }
}
