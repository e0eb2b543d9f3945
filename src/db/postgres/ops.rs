use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use log::error;
use tokio_postgres::Row;

use crate::db::models::{Candle, CandleStatus, Interval, Pool, SwapEvent, SyncState, Token};
use crate::db::postgres::PostgresClient;

/// Remove null bytes (0x00), which Postgres text columns reject, from a
/// chain-derived string (symbol/name) before it hits a query.
fn sanitize_string(s: &str) -> String {
    s.replace('\0', "")
}

fn row_to_pool(row: &Row) -> Pool {
    Pool {
        pool_id: row.get("pool_id"),
        currency0: row.get("currency0"),
        currency1: row.get("currency1"),
        fee: row.get::<_, i64>("fee") as u32,
        tick_spacing: row.get("tick_spacing"),
        hooks: row.get("hooks"),
        sqrt_price_x96: row.get("sqrt_price_x96"),
        tick: row.get("tick"),
        liquidity: row.get("liquidity"),
        total_value_locked_token0: row.get("total_value_locked_token0"),
        total_value_locked_token1: row.get("total_value_locked_token1"),
        token0_price: row.get("token0_price"),
        token1_price: row.get("token1_price"),
        token0_decimals: row.get("token0_decimals"),
        token1_decimals: row.get("token1_decimals"),
        created_block: row.get("created_block"),
        created_timestamp: row.get("created_timestamp"),
        created_tx_hash: row.get("created_tx_hash"),
    }
}

fn row_to_token(row: &Row) -> Token {
    Token {
        address: row.get("address"),
        decimals: row.get("decimals"),
        symbol: row.get("symbol"),
        name: row.get("name"),
        volume: row.get("volume"),
        volume_usd: row.get("volume_usd"),
        untracked_volume_usd: row.get("untracked_volume_usd"),
        fees_usd: row.get("fees_usd"),
        total_value_locked: row.get("total_value_locked"),
        total_value_locked_usd: row.get("total_value_locked_usd"),
        derived_native: row.get("derived_native"),
        tx_count: row.get("tx_count"),
        whitelist_pools: row.get("whitelist_pools"),
        metadata_is_default: row.get("metadata_is_default"),
    }
}

fn row_to_candle(row: &Row) -> Candle {
    let interval = match row.get::<_, String>("interval").as_str() {
        "minute" => Interval::Minute,
        "hour" => Interval::Hour,
        _ => Interval::Day,
    };
    let status = match row.get::<_, String>("status").as_str() {
        "finalized" => CandleStatus::Finalized,
        _ => CandleStatus::Current,
    };
    Candle {
        token_address: row.get("token_address"),
        interval,
        bucket: row.get("bucket"),
        status,
        open: row.get("open"),
        high: row.get("high"),
        low: row.get("low"),
        close: row.get("close"),
        volume: row.get("volume"),
        volume_usd: row.get("volume_usd"),
        untracked_volume_usd: row.get("untracked_volume_usd"),
        total_value_locked: row.get("total_value_locked"),
        total_value_locked_usd: row.get("total_value_locked_usd"),
        price_usd: row.get("price_usd"),
        fees_usd: row.get("fees_usd"),
        tx_count: row.get("tx_count"),
    }
}

impl PostgresClient {
    // ==================== POOLS ====================

    pub async fn get_pool(&self, pool_id: &str) -> anyhow::Result<Option<Pool>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"SELECT pool_id, currency0, currency1, fee, tick_spacing, hooks,
                          sqrt_price_x96, tick, liquidity,
                          total_value_locked_token0, total_value_locked_token1,
                          token0_price, token1_price, token0_decimals, token1_decimals,
                          created_block, created_timestamp, created_tx_hash
                   FROM indexer.pools WHERE pool_id = $1"#,
                &[&pool_id],
            )
            .await?;
        Ok(row.as_ref().map(row_to_pool))
    }

    /// Insert a freshly-initialized pool. Returns `false` without writing if
    /// a row with this `pool_id` already exists (Initialize is a duplicate —
    /// dropped without error per §4.2).
    pub async fn insert_pool_if_absent(&self, pool: &Pool) -> anyhow::Result<bool> {
        let client = self.pool.get().await?;
        let rows = client
            .execute(
                r#"INSERT INTO indexer.pools (
                    pool_id, currency0, currency1, fee, tick_spacing, hooks,
                    sqrt_price_x96, tick, liquidity,
                    total_value_locked_token0, total_value_locked_token1,
                    token0_price, token1_price, token0_decimals, token1_decimals,
                    created_block, created_timestamp, created_tx_hash
                ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18)
                ON CONFLICT (pool_id) DO NOTHING"#,
                &[
                    &pool.pool_id,
                    &pool.currency0,
                    &pool.currency1,
                    &(pool.fee as i64),
                    &pool.tick_spacing,
                    &pool.hooks,
                    &pool.sqrt_price_x96,
                    &pool.tick,
                    &pool.liquidity,
                    &pool.total_value_locked_token0,
                    &pool.total_value_locked_token1,
                    &pool.token0_price,
                    &pool.token1_price,
                    &pool.token0_decimals,
                    &pool.token1_decimals,
                    &pool.created_block,
                    &pool.created_timestamp,
                    &pool.created_tx_hash,
                ],
            )
            .await
            .map_err(|e| {
                error!("failed to insert pool {}: {e:?}", pool.pool_id);
                e
            })?;
        Ok(rows == 1)
    }

    /// Overwrite the mutable fields of an already-active pool (Swap /
    /// ModifyLiquidity). The immutable identity fields (currencies, fee,
    /// tick spacing, hooks, creation metadata) are never touched here.
    pub async fn update_pool_state(&self, pool: &Pool) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"UPDATE indexer.pools SET
                    sqrt_price_x96 = $2, tick = $3, liquidity = $4,
                    total_value_locked_token0 = $5, total_value_locked_token1 = $6,
                    token0_price = $7, token1_price = $8
                   WHERE pool_id = $1"#,
                &[
                    &pool.pool_id,
                    &pool.sqrt_price_x96,
                    &pool.tick,
                    &pool.liquidity,
                    &pool.total_value_locked_token0,
                    &pool.total_value_locked_token1,
                    &pool.token0_price,
                    &pool.token1_price,
                ],
            )
            .await
            .map_err(|e| {
                error!("failed to update pool {}: {e:?}", pool.pool_id);
                e
            })?;
        Ok(())
    }

    // ==================== SWAP EVENTS ====================

    /// Insert a swap event. Returns `false` without writing if
    /// `(transaction_hash, log_index)` already exists — the duplicate-write
    /// path relied on throughout the orchestrator (§4.5, §7).
    pub async fn insert_swap_event_if_absent(&self, event: &SwapEvent) -> anyhow::Result<bool> {
        let client = self.pool.get().await?;
        let rows = client
            .execute(
                r#"INSERT INTO indexer.swap_events (
                    transaction_hash, log_index, pool_id, currency0, currency1, sender,
                    amount0, amount1, sqrt_price_x96, liquidity, tick, fee,
                    block_number, block_timestamp
                ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)
                ON CONFLICT (transaction_hash, log_index) DO NOTHING"#,
                &[
                    &event.transaction_hash,
                    &event.log_index,
                    &event.pool_id,
                    &event.currency0,
                    &event.currency1,
                    &sanitize_string(&event.sender),
                    &event.amount0,
                    &event.amount1,
                    &event.sqrt_price_x96,
                    &event.liquidity,
                    &event.tick,
                    &(event.fee as i64),
                    &event.block_number,
                    &event.block_timestamp,
                ],
            )
            .await
            .map_err(|e| {
                error!(
                    "failed to insert swap event {}:{}: {e:?}",
                    event.transaction_hash, event.log_index
                );
                e
            })?;
        Ok(rows == 1)
    }

    // ==================== TOKENS ====================

    pub async fn get_token(&self, address: &str) -> anyhow::Result<Option<Token>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"SELECT address, decimals, symbol, name, volume, volume_usd,
                          untracked_volume_usd, fees_usd, total_value_locked,
                          total_value_locked_usd, derived_native, tx_count,
                          whitelist_pools, metadata_is_default
                   FROM indexer.tokens WHERE address = $1"#,
                &[&address],
            )
            .await?;
        Ok(row.as_ref().map(row_to_token))
    }

    /// Insert a token with default metadata if it does not yet exist. A
    /// no-op if the token is already present (idempotent, used by both the
    /// whitelist-link path and the cumulative-stats path — §9's
    /// "two services writing the same Token row" consolidation).
    pub async fn insert_token_if_absent(&self, token: &Token) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"INSERT INTO indexer.tokens (
                    address, decimals, symbol, name, volume, volume_usd,
                    untracked_volume_usd, fees_usd, total_value_locked,
                    total_value_locked_usd, derived_native, tx_count,
                    whitelist_pools, metadata_is_default
                ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)
                ON CONFLICT (address) DO NOTHING"#,
                &[
                    &token.address,
                    &token.decimals,
                    &token.symbol,
                    &token.name,
                    &token.volume,
                    &token.volume_usd,
                    &token.untracked_volume_usd,
                    &token.fees_usd,
                    &token.total_value_locked,
                    &token.total_value_locked_usd,
                    &token.derived_native,
                    &token.tx_count,
                    &token.whitelist_pools,
                    &token.metadata_is_default,
                ],
            )
            .await
            .map_err(|e| {
                error!("failed to insert token {}: {e:?}", token.address);
                e
            })?;
        Ok(())
    }

    /// Patch a token's metadata (decimals/symbol/name) once the lazy
    /// ERC-20 fetch succeeds, clearing `metadata_is_default`.
    pub async fn patch_token_metadata(
        &self,
        address: &str,
        decimals: i16,
        symbol: &str,
        name: &str,
    ) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"UPDATE indexer.tokens SET
                    decimals = $2, symbol = $3, name = $4, metadata_is_default = FALSE
                   WHERE address = $1"#,
                &[&address, &decimals, &sanitize_string(symbol), &sanitize_string(name)],
            )
            .await?;
        Ok(())
    }

    /// Atomically fold one swap's contribution into a token's cumulative
    /// stats (§4.3 token-row update).
    pub async fn accumulate_token_stats(
        &self,
        address: &str,
        volume_delta: &BigDecimal,
        volume_usd_delta: &BigDecimal,
        fees_usd_delta: &BigDecimal,
        derived_native: &BigDecimal,
        total_value_locked: &BigDecimal,
        total_value_locked_usd: &BigDecimal,
    ) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"UPDATE indexer.tokens SET
                    volume = volume + $2,
                    volume_usd = volume_usd + $3,
                    fees_usd = fees_usd + $4,
                    tx_count = tx_count + 1,
                    derived_native = $5,
                    total_value_locked = $6,
                    total_value_locked_usd = $7
                   WHERE address = $1"#,
                &[
                    &address,
                    volume_delta,
                    volume_usd_delta,
                    fees_usd_delta,
                    derived_native,
                    total_value_locked,
                    total_value_locked_usd,
                ],
            )
            .await?;
        Ok(())
    }

    /// Add a pool ID to a token's whitelist-pools set (§4.3 whitelist update).
    /// Idempotent: a pool already present is not duplicated.
    pub async fn add_whitelist_pool(&self, address: &str, pool_id: &str) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"UPDATE indexer.tokens SET
                    whitelist_pools = array_append(whitelist_pools, $2::text)
                   WHERE address = $1 AND NOT ($2::text = ANY(whitelist_pools))"#,
                &[&address, &pool_id],
            )
            .await?;
        Ok(())
    }

    // ==================== CANDLES ====================

    pub async fn get_current_candle(
        &self,
        token_address: &str,
        interval: Interval,
        bucket: DateTime<Utc>,
    ) -> anyhow::Result<Option<Candle>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"SELECT token_address, interval, bucket, status, open, high, low, close,
                          volume, volume_usd, untracked_volume_usd, total_value_locked,
                          total_value_locked_usd, price_usd, fees_usd, tx_count
                   FROM indexer.candles
                   WHERE token_address = $1 AND interval = $2 AND bucket = $3 AND status = 'current'"#,
                &[&token_address, &interval.as_str(), &bucket],
            )
            .await?;
        Ok(row.as_ref().map(row_to_candle))
    }

    /// Insert a newly-opened candle. Returns `false` without writing if a
    /// row for `(token_address, interval, bucket)` already exists — callers
    /// should re-read and fold instead (a race with a concurrent opener is
    /// not expected under the single-writer event ordering, but the unique
    /// constraint makes the operation safe either way).
    pub async fn insert_candle_if_absent(&self, candle: &Candle) -> anyhow::Result<bool> {
        let client = self.pool.get().await?;
        let rows = client
            .execute(
                r#"INSERT INTO indexer.candles (
                    token_address, interval, bucket, status, open, high, low, close,
                    volume, volume_usd, untracked_volume_usd, total_value_locked,
                    total_value_locked_usd, price_usd, fees_usd, tx_count
                ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)
                ON CONFLICT (token_address, interval, bucket) DO NOTHING"#,
                &[
                    &candle.token_address,
                    &candle.interval.as_str(),
                    &candle.bucket,
                    &candle.status.as_str(),
                    &candle.open,
                    &candle.high,
                    &candle.low,
                    &candle.close,
                    &candle.volume,
                    &candle.volume_usd,
                    &candle.untracked_volume_usd,
                    &candle.total_value_locked,
                    &candle.total_value_locked_usd,
                    &candle.price_usd,
                    &candle.fees_usd,
                    &candle.tx_count,
                ],
            )
            .await
            .map_err(|e| {
                error!(
                    "failed to insert candle {}/{}/{}: {e:?}",
                    candle.token_address,
                    candle.interval,
                    candle.bucket
                );
                e
            })?;
        Ok(rows == 1)
    }

    /// Overwrite an already-open candle's fields after a fold. A no-op
    /// (zero rows affected) if the row has since been finalized — the
    /// `status = 'current'` guard is the finalization-race rule in §5.
    pub async fn update_current_candle(&self, candle: &Candle) -> anyhow::Result<bool> {
        let client = self.pool.get().await?;
        let rows = client
            .execute(
                r#"UPDATE indexer.candles SET
                    high = $4, low = $5, close = $6,
                    volume = $7, volume_usd = $8, untracked_volume_usd = $9,
                    total_value_locked = $10, total_value_locked_usd = $11,
                    price_usd = $12, fees_usd = $13, tx_count = $14
                   WHERE token_address = $1 AND interval = $2 AND bucket = $3 AND status = 'current'"#,
                &[
                    &candle.token_address,
                    &candle.interval.as_str(),
                    &candle.bucket,
                    &candle.high,
                    &candle.low,
                    &candle.close,
                    &candle.volume,
                    &candle.volume_usd,
                    &candle.untracked_volume_usd,
                    &candle.total_value_locked,
                    &candle.total_value_locked_usd,
                    &candle.price_usd,
                    &candle.fees_usd,
                    &candle.tx_count,
                ],
            )
            .await?;
        Ok(rows == 1)
    }

    /// Flip every `current` candle for `interval` whose bucket is strictly
    /// before `before_bucket` to `finalized`, returning the rows that were
    /// promoted so the caller can publish one `candle.finalized` event per
    /// row (§4.3 finalization, §8 property 10).
    pub async fn finalize_candles(
        &self,
        interval: Interval,
        before_bucket: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Candle>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"UPDATE indexer.candles SET status = 'finalized'
                   WHERE interval = $1 AND status = 'current' AND bucket < $2
                   RETURNING token_address, interval, bucket, status, open, high, low, close,
                             volume, volume_usd, untracked_volume_usd, total_value_locked,
                             total_value_locked_usd, price_usd, fees_usd, tx_count"#,
                &[&interval.as_str(), &before_bucket],
            )
            .await?;
        Ok(rows.iter().map(row_to_candle).collect())
    }

    // ==================== SYNC STATE ====================

    pub async fn get_sync_state(&self, pool_manager_address: &str) -> anyhow::Result<Option<SyncState>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"SELECT pool_manager_address, last_synced_block, current_block,
                          is_initial_sync_complete, last_synced_at
                   FROM indexer.sync_state WHERE pool_manager_address = $1"#,
                &[&pool_manager_address],
            )
            .await?;
        Ok(row.map(|row| SyncState {
            pool_manager_address: row.get("pool_manager_address"),
            last_synced_block: row.get("last_synced_block"),
            current_block: row.get("current_block"),
            is_initial_sync_complete: row.get("is_initial_sync_complete"),
            last_synced_at: row.get("last_synced_at"),
        }))
    }

    /// Upsert the sync checkpoint. `last_synced_block` is expected to only
    /// ever move forward (§3 invariant) — enforced by the caller, not here.
    pub async fn set_sync_state(&self, state: &SyncState) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"INSERT INTO indexer.sync_state (
                    pool_manager_address, last_synced_block, current_block,
                    is_initial_sync_complete, last_synced_at
                ) VALUES ($1,$2,$3,$4,$5)
                ON CONFLICT (pool_manager_address) DO UPDATE SET
                    last_synced_block = EXCLUDED.last_synced_block,
                    current_block = EXCLUDED.current_block,
                    is_initial_sync_complete = EXCLUDED.is_initial_sync_complete,
                    last_synced_at = EXCLUDED.last_synced_at"#,
                &[
                    &state.pool_manager_address,
                    &state.last_synced_block,
                    &state.current_block,
                    &state.is_initial_sync_complete,
                    &state.last_synced_at,
                ],
            )
            .await?;
        Ok(())
    }
}
