//! Ingest Orchestrator: merges historical backfill and the live log feed
//! into one strictly `(blockNumber, logIndex)`-ordered stream, dispatches
//! each decoded event to the Pool State Machine and Token Aggregator, and
//! checkpoints `SyncState` after every batch (§4.5).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::bus::EventBus;
use crate::chain::parser::{decode_log, DecodedEvent, RawLog};
use crate::chain::ChainReader;
use crate::config::ChainSettings;
use crate::db::models::SyncState;
use crate::db::postgres::PostgresClient;
use crate::error::IndexError;
use crate::pool::PoolStateMachine;
use crate::aggregator::TokenAggregator;

/// Base delay for the backfill RPC retry loop's exponential backoff.
const RPC_RETRY_BASE_MS: u64 = 250;
/// Cap so a long outage doesn't grow the sleep unboundedly.
const RPC_RETRY_MAX_MS: u64 = 30_000;
/// Upper bound of the jitter added on top of the backoff, so many
/// orchestrators retrying the same outage don't all wake up in lockstep.
const RPC_RETRY_JITTER_MS: u64 = 250;

pub struct Orchestrator {
    chain: Arc<ChainReader>,
    postgres: Arc<PostgresClient>,
    pool_state: Arc<PoolStateMachine>,
    aggregator: Arc<TokenAggregator>,
    bus: EventBus,
    settings: ChainSettings,
}

impl Orchestrator {
    pub fn new(
        chain: Arc<ChainReader>,
        postgres: Arc<PostgresClient>,
        pool_state: Arc<PoolStateMachine>,
        aggregator: Arc<TokenAggregator>,
        bus: EventBus,
        settings: ChainSettings,
    ) -> Self {
        Self {
            chain,
            postgres,
            pool_state,
            aggregator,
            bus,
            settings,
        }
    }

    pub async fn run(self: Arc<Self>, cancellation_token: CancellationToken) -> anyhow::Result<()> {
        let mut state = match self.postgres.get_sync_state(&self.settings.pool_manager_address).await? {
            Some(state) => state,
            None => {
                let state = SyncState::initial(
                    self.settings.pool_manager_address.clone(),
                    self.settings.starting_block,
                );
                self.postgres.set_sync_state(&state).await?;
                state
            },
        };

        self.backfill(&mut state, &cancellation_token).await?;
        self.live(&mut state, &cancellation_token).await
    }

    /// Phase A (§4.5): catch up from `lastSyncedBlock + 1` to the chain head
    /// in `sync_batch_size`-block windows, committing the checkpoint once
    /// per batch so a crash mid-backfill resumes without re-scanning
    /// everything already applied. Chain RPC calls are retried with backoff
    /// in place — a transient error never advances past the failing window
    /// (§5, §7).
    async fn backfill(
        &self,
        state: &mut SyncState,
        cancellation_token: &CancellationToken,
    ) -> anyhow::Result<()> {
        loop {
            if cancellation_token.is_cancelled() {
                return Ok(());
            }

            let Some(head) = self
                .retry_chain_call(cancellation_token, || self.chain.get_block_number())
                .await
            else {
                return Ok(());
            };
            let from_block = (state.last_synced_block + 1) as u64;

            if from_block > head {
                info!("backfill caught up at block {head}");
                state.is_initial_sync_complete = true;
                state.last_synced_at = Utc::now();
                self.postgres.set_sync_state(state).await?;
                return Ok(());
            }

            let to_block = (from_block + self.settings.sync_batch_size - 1).min(head);

            let Some(logs) = self
                .retry_chain_call(cancellation_token, || self.chain.get_logs(from_block, to_block))
                .await
            else {
                return Ok(());
            };
            for log in &logs {
                self.dispatch(log).await?;
            }

            state.last_synced_block = to_block as i64;
            state.current_block = head as i64;
            state.last_synced_at = Utc::now();
            self.postgres.set_sync_state(state).await?;

            info!("backfilled {from_block}..={to_block} (head {head}, {} logs)", logs.len());
        }
    }

    /// Retry a chain RPC call with exponential backoff and jitter until it
    /// succeeds or `cancellation_token` fires. Returns `None` on
    /// cancellation so the caller can return without having advanced the
    /// checkpoint — the window is re-enqueued simply by not having
    /// committed it yet.
    async fn retry_chain_call<T, F, Fut>(
        &self,
        cancellation_token: &CancellationToken,
        mut op: F,
    ) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, IndexError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Some(value),
                Err(e) => {
                    warn!("chain rpc call failed during backfill (attempt {attempt}): {e}");
                    let backoff = RPC_RETRY_BASE_MS.saturating_mul(1u64 << attempt.min(10));
                    let backoff = backoff.min(RPC_RETRY_MAX_MS);
                    let jitter = rand::thread_rng().gen_range(0..=RPC_RETRY_JITTER_MS);
                    let delay = Duration::from_millis(backoff + jitter);
                    tokio::select! {
                        _ = cancellation_token.cancelled() => return None,
                        _ = tokio::time::sleep(delay) => {},
                    }
                    attempt = attempt.saturating_add(1);
                },
            }
        }
    }

    /// Phase B (§4.5): drain the live log feed one entry at a time, in
    /// order, checkpointing after each.
    async fn live(
        &self,
        state: &mut SyncState,
        cancellation_token: &CancellationToken,
    ) -> anyhow::Result<()> {
        let poll_interval = Duration::from_millis(self.settings.tip_poll_interval_milliseconds);
        let start_from_block = (state.last_synced_block + 1) as u64;

        let mut rx = self.chain.clone().subscribe_logs(
            poll_interval,
            start_from_block,
            cancellation_token.child_token(),
        );

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("orchestrator shutting down");
                    return Ok(());
                }
                log = rx.recv() => {
                    let Some(log) = log else {
                        warn!("live log feed closed, stopping orchestrator");
                        return Ok(());
                    };
                    self.dispatch(&log).await?;
                    state.last_synced_block = log.block_number as i64;
                    state.current_block = log.block_number as i64;
                    state.last_synced_at = Utc::now();
                    self.postgres.set_sync_state(state).await?;
                }
            }
        }
    }

    /// Apply one log. Non-fatal `IndexError`s (decode failure, unknown
    /// pool) are logged and skipped so the stream keeps flowing; only a
    /// `Database` error (per `IndexError::is_fatal`) propagates and halts
    /// the orchestrator.
    async fn dispatch(&self, log: &RawLog) -> anyhow::Result<()> {
        let decoded = match decode_log(log) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("skipping undecodable log in tx {}: {e}", log.transaction_hash);
                return Ok(());
            },
        };

        match decoded {
            DecodedEvent::Initialize(event) => {
                let outcome = match self
                    .pool_state
                    .apply_initialize(&event, log.block_number, log.block_timestamp, &log.transaction_hash)
                    .await
                {
                    Ok(Some(outcome)) => outcome,
                    Ok(None) => return Ok(()),
                    Err(e) => return self.handle_index_error(e, &log.transaction_hash),
                };

                if outcome.currency0_is_whitelisted {
                    self.aggregator
                        .link_whitelist_pool(&outcome.pool.currency1, &outcome.pool.pool_id)
                        .await?;
                }
                if outcome.currency1_is_whitelisted {
                    self.aggregator
                        .link_whitelist_pool(&outcome.pool.currency0, &outcome.pool.pool_id)
                        .await?;
                }
                Ok(())
            },
            DecodedEvent::Swap(event) => {
                let outcome = match self
                    .pool_state
                    .apply_swap(
                        &event,
                        log.block_number,
                        log.block_timestamp,
                        log.log_index,
                        &log.transaction_hash,
                    )
                    .await
                {
                    Ok(Some(outcome)) => outcome,
                    Ok(None) => return Ok(()),
                    Err(e) => return self.handle_index_error(e, &log.transaction_hash),
                };

                self.aggregator.handle_swap(&outcome.pool, &outcome.swap_event).await?;
                self.bus.publish_swap_created(outcome.swap_event);
                Ok(())
            },
            DecodedEvent::ModifyLiquidity(event) => {
                match self.pool_state.apply_modify_liquidity(&event).await {
                    Ok(()) => Ok(()),
                    Err(e) => self.handle_index_error(e, &log.transaction_hash),
                }
            },
        }
    }

    fn handle_index_error(&self, e: IndexError, tx_hash: &str) -> anyhow::Result<()> {
        if e.is_fatal() {
            Err(anyhow::Error::new(e))
        } else {
            warn!("non-fatal error applying log in tx {tx_hash}: {e}");
            Ok(())
        }
    }
}
