//! Periodic Finalizer: three long-lived tasks, one per candle interval,
//! that wake at each period boundary and flip every `current` candle whose
//! bucket has fully elapsed to `finalized`, publishing one `candle.finalized`
//! event per promoted row (§4.3 finalization, §9 redesign note).
//!
//! Replaces the teacher's `tokio_cron_scheduler` registration style with
//! explicit `sleep_until` loops — there is no cron-expression flexibility
//! needed here, just "wake at the next minute/hour/day boundary".

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::bus::{CandleFinalized, EventBus};
use crate::db::models::Interval;
use crate::db::postgres::PostgresClient;

pub struct Finalizer {
    postgres: Arc<PostgresClient>,
    bus: EventBus,
}

impl Finalizer {
    pub fn new(postgres: Arc<PostgresClient>, bus: EventBus) -> Self {
        Self { postgres, bus }
    }

    /// Spawn one task per interval, all sharing `cancellation_token`.
    pub fn spawn_all(self: Arc<Self>, cancellation_token: CancellationToken) {
        for interval in Interval::ALL {
            let finalizer = self.clone();
            let token = cancellation_token.child_token();
            tokio::spawn(async move { finalizer.run(interval, token).await });
        }
    }

    async fn run(&self, interval: Interval, cancellation_token: CancellationToken) {
        loop {
            let sleep_for = time_until_next_boundary(interval);

            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("{interval} finalizer shutting down");
                    return;
                }
                _ = sleep(sleep_for) => {}
            }

            let before_bucket = interval.bucket_start(Utc::now());
            match self.postgres.finalize_candles(interval, before_bucket).await {
                Ok(promoted) => {
                    let count = promoted.len();
                    for candle in promoted {
                        self.bus.publish_candle_finalized(CandleFinalized {
                            interval,
                            candle,
                            finalized_at: Utc::now(),
                        });
                    }
                    if count > 0 {
                        info!("finalized {count} {interval} candle(s) before {before_bucket}");
                    }
                },
                Err(e) => warn!("failed to finalize {interval} candles: {e:#}"),
            }
        }
    }
}

/// Time remaining until the start of the *next* bucket for `interval`,
/// measured from the current wall-clock time, expressed relative to the
/// async runtime's `Instant` clock (`sleep` cannot take a `DateTime`).
fn time_until_next_boundary(interval: Interval) -> Duration {
    let now = Utc::now();
    let current_bucket = interval.bucket_start(now);
    let next_bucket = current_bucket + interval.duration();
    let remaining = next_bucket - now;
    remaining.to_std().unwrap_or(Duration::from_secs(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_until_next_boundary_is_within_interval_duration() {
        for interval in Interval::ALL {
            let remaining = time_until_next_boundary(interval);
            assert!(remaining <= interval.duration().to_std().unwrap());
        }
    }
}
