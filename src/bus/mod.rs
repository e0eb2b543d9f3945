//! In-process event bus: two typed topics, bounded per-subscriber buffers,
//! drop-oldest on overflow, fire-and-forget publish (§4.6).
//!
//! `tokio::sync::broadcast`'s lagging-receiver semantics already implement
//! the bounded/drop-oldest policy directly; a slow subscriber misses old
//! events instead of stalling the indexer, same stance as the Redpanda
//! publisher this replaces.

use chrono::{DateTime, Utc};
use log::warn;
use tokio::sync::broadcast;

use crate::db::models::{Candle, Interval, SwapEvent};

/// Payload for the `candle.finalized` topic: the promoted row plus the
/// interval it was finalized for (the row also carries `interval`, but
/// callers that only care about one cadence can filter on this directly).
#[derive(Debug, Clone)]
pub struct CandleFinalized {
    pub interval: Interval,
    pub candle: Candle,
    pub finalized_at: DateTime<Utc>,
}

/// Event bus with the two topics named in §4.6. Clone-cheap: internally just
/// two `broadcast::Sender`s.
#[derive(Clone)]
pub struct EventBus {
    swap_created: broadcast::Sender<SwapEvent>,
    candle_finalized: broadcast::Sender<CandleFinalized>,
}

impl EventBus {
    pub fn new(subscriber_buffer_size: usize) -> Self {
        let (swap_created, _) = broadcast::channel(subscriber_buffer_size);
        let (candle_finalized, _) = broadcast::channel(subscriber_buffer_size);

        Self {
            swap_created,
            candle_finalized,
        }
    }

    pub fn subscribe_swap_created(&self) -> broadcast::Receiver<SwapEvent> {
        self.swap_created.subscribe()
    }

    pub fn subscribe_candle_finalized(&self) -> broadcast::Receiver<CandleFinalized> {
        self.candle_finalized.subscribe()
    }

    /// Fire-and-forget: no subscribers is the normal idle state, not an
    /// error.
    pub fn publish_swap_created(&self, event: SwapEvent) {
        if let Err(e) = self.swap_created.send(event) {
            let _ = e; // SendError only fires with zero receivers; ignored.
        }
    }

    pub fn publish_candle_finalized(&self, event: CandleFinalized) {
        if self.candle_finalized.send(event).is_err() {
            // No subscribers — expected when nothing is watching finalized candles yet.
        }
    }
}

/// Drain-and-warn helper for a subscriber that fell behind: `broadcast`
/// surfaces this as `RecvError::Lagged(n)` rather than silently skipping.
pub async fn recv_or_warn<T: Clone>(
    rx: &mut broadcast::Receiver<T>,
    topic: &str,
) -> Option<T> {
    loop {
        match rx.recv().await {
            Ok(value) => return Some(value),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("subscriber to {topic} lagged, dropped {n} events");
                continue;
            },
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::Utc;

    fn sample_swap() -> SwapEvent {
        SwapEvent {
            transaction_hash: "0xabc".to_string(),
            log_index: 0,
            pool_id: "0xpool".to_string(),
            currency0: "0xc0".to_string(),
            currency1: "0xc1".to_string(),
            sender: "0xsender".to_string(),
            amount0: BigDecimal::from(1),
            amount1: BigDecimal::from(-1),
            sqrt_price_x96: BigDecimal::from(0),
            liquidity: BigDecimal::from(0),
            tick: 0,
            fee: 3000,
            block_number: 1,
            block_timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_swap() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe_swap_created();
        bus.publish_swap_created(sample_swap());
        let received = recv_or_warn(&mut rx, "swap.created").await.unwrap();
        assert_eq!(received.transaction_hash, "0xabc");
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        bus.publish_swap_created(sample_swap());
    }

    #[tokio::test]
    async fn lagging_subscriber_drops_oldest_and_recovers() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe_swap_created();
        for _ in 0..5 {
            bus.publish_swap_created(sample_swap());
        }
        // buffer size 2: receiver should observe a Lagged error, then succeed.
        let received = recv_or_warn(&mut rx, "swap.created").await;
        assert!(received.is_some());
    }
}
