//! Token Aggregator: on each swap, updates cumulative per-token stats and
//! the three current-period candles; finalizes candles on period
//! boundaries. The sole writer to `Token` and `Candle` (§3 ownership rule).

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use log::warn;
use std::sync::Arc;

use crate::chain::metadata::MetadataFetcher;
use crate::db::models::{Candle, Interval, Pool, SwapEvent, Token};
use crate::db::postgres::PostgresClient;
use crate::oracle::PriceOracle;

pub struct TokenAggregator {
    postgres: Arc<PostgresClient>,
    oracle: Arc<PriceOracle>,
    metadata: Arc<MetadataFetcher>,
}

impl TokenAggregator {
    pub fn new(
        postgres: Arc<PostgresClient>,
        oracle: Arc<PriceOracle>,
        metadata: Arc<MetadataFetcher>,
    ) -> Self {
        Self {
            postgres,
            oracle,
            metadata,
        }
    }

    /// Ensure `address` exists as a Token row (defaults if new), then add
    /// `pool_id` to its whitelist set. Called from Pool Initialize handling
    /// when the counterpart currency needs linking (§4.2/§4.3).
    pub async fn link_whitelist_pool(&self, address: &str, pool_id: &str) -> anyhow::Result<()> {
        self.ensure_token_exists(address).await?;
        self.postgres.add_whitelist_pool(address, pool_id).await
    }

    async fn ensure_token_exists(&self, address: &str) -> anyhow::Result<Token> {
        if let Some(token) = self.postgres.get_token(address).await? {
            return Ok(token);
        }
        let token = Token::new_default(address.to_string());
        self.postgres.insert_token_if_absent(&token).await?;
        Ok(token)
    }

    /// Lazily patch a token's metadata if it still holds defaults.
    async fn refresh_metadata_if_default(&self, token: &mut Token) {
        if !token.metadata_is_default {
            return;
        }
        let fetched = self.metadata.fetch_batch(&[token.address.clone()]).await;
        if let Some(meta) = fetched.into_iter().next() {
            if !meta.is_default {
                if let Err(e) = self
                    .postgres
                    .patch_token_metadata(&token.address, meta.decimals, &meta.symbol, &meta.name)
                    .await
                {
                    warn!("failed to patch token metadata for {}: {e:#}", token.address);
                } else {
                    token.decimals = meta.decimals;
                    token.symbol = meta.symbol;
                    token.name = meta.name;
                    token.metadata_is_default = false;
                }
            }
        }
    }

    /// Fold one swap into both tokens' cumulative stats and current
    /// candles. This is the only entry point that mutates Token/Candle.
    pub async fn handle_swap(&self, pool: &Pool, swap: &SwapEvent) -> anyhow::Result<()> {
        let native_price_usd = self.oracle.native_price_usd().await?;

        self.apply_to_token(
            &pool.currency0,
            swap,
            &swap.amount0.abs(),
            &native_price_usd,
            pool,
        )
        .await?;
        self.apply_to_token(
            &pool.currency1,
            swap,
            &swap.amount1.abs(),
            &native_price_usd,
            pool,
        )
        .await?;

        Ok(())
    }

    /// `priceUSD = derivedNativePerToken(token) · nativePriceUSD()`, recomputed
    /// per token so each side of the swap gets its own USD price (§4.3) —
    /// `native_price_usd` itself is token-independent and shared across both
    /// calls from `handle_swap`.
    async fn apply_to_token(
        &self,
        address: &str,
        swap: &SwapEvent,
        amount_raw: &BigDecimal,
        native_price_usd: &BigDecimal,
        pool: &Pool,
    ) -> anyhow::Result<()> {
        let mut token = self.ensure_token_exists(address).await?;
        self.refresh_metadata_if_default(&mut token).await;

        let derived_native = self.oracle.derived_native_per_token(&token).await?;
        let price_usd = &derived_native * native_price_usd;

        let amount_human = to_human(amount_raw, token.decimals);
        let volume_usd_delta = &amount_human * &price_usd;
        let fee_fraction = BigDecimal::from(swap.fee) / BigDecimal::from(1_000_000u32);
        let fees_usd_delta = &volume_usd_delta * &fee_fraction;

        let tvl_raw = if pool.currency0 == address {
            &pool.total_value_locked_token0
        } else {
            &pool.total_value_locked_token1
        };
        let tvl_human = to_human(tvl_raw, token.decimals);
        let tvl_usd = &tvl_human * &derived_native * native_price_usd;

        self.postgres
            .accumulate_token_stats(
                address,
                &amount_human,
                &volume_usd_delta,
                &fees_usd_delta,
                &derived_native,
                &tvl_human,
                &tvl_usd,
            )
            .await?;

        for interval in Interval::ALL {
            self.fold_candle(
                address,
                interval,
                swap.block_timestamp,
                &price_usd,
                &amount_human,
                &volume_usd_delta,
                &fees_usd_delta,
                &tvl_human,
                &tvl_usd,
            )
            .await?;
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn fold_candle(
        &self,
        token_address: &str,
        interval: Interval,
        at: DateTime<Utc>,
        price_usd: &BigDecimal,
        amount: &BigDecimal,
        volume_usd_delta: &BigDecimal,
        fees_usd_delta: &BigDecimal,
        tvl: &BigDecimal,
        tvl_usd: &BigDecimal,
    ) -> anyhow::Result<()> {
        let bucket = interval.bucket_start(at);

        match self
            .postgres
            .get_current_candle(token_address, interval, bucket)
            .await?
        {
            None => {
                let candle = Candle::open_with(
                    token_address.to_string(),
                    interval,
                    bucket,
                    price_usd.clone(),
                    amount.clone(),
                    volume_usd_delta.clone(),
                    tvl.clone(),
                    tvl_usd.clone(),
                );
                if !self.postgres.insert_candle_if_absent(&candle).await? {
                    // Lost the race to open this bucket; fold into the one
                    // that won instead of dropping this swap's contribution.
                    if let Some(mut existing) = self
                        .postgres
                        .get_current_candle(token_address, interval, bucket)
                        .await?
                    {
                        existing.fold(
                            price_usd.clone(),
                            amount.clone(),
                            volume_usd_delta.clone(),
                            fees_usd_delta.clone(),
                            tvl.clone(),
                            tvl_usd.clone(),
                        );
                        self.postgres.update_current_candle(&existing).await?;
                    }
                }
            },
            Some(mut candle) => {
                candle.fold(
                    price_usd.clone(),
                    amount.clone(),
                    volume_usd_delta.clone(),
                    fees_usd_delta.clone(),
                    tvl.clone(),
                    tvl_usd.clone(),
                );
                if !self.postgres.update_current_candle(&candle).await? {
                    // Row was finalized between read and write — the
                    // finalization race rule in §5: no-op, just warn.
                    warn!(
                        "candle {token_address}/{interval}/{bucket} finalized mid-fold, dropping late update"
                    );
                }
            },
        }

        Ok(())
    }
}

fn to_human(raw: &BigDecimal, decimals: i16) -> BigDecimal {
    if decimals <= 0 {
        return raw.clone();
    }
    raw / BigDecimal::from(num_bigint::BigInt::from(10).pow(decimals as u32))
}
