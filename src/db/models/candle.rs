//! The `Candle` entity (§3): per-token OHLC/volume/TVL bar over a fixed
//! time bucket, in one of three interval variants.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    Minute,
    Hour,
    Day,
}

impl Interval {
    pub const ALL: [Interval; 3] = [Interval::Minute, Interval::Hour, Interval::Day];

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Minute => "minute",
            Interval::Hour => "hour",
            Interval::Day => "day",
        }
    }

    /// The duration of one bucket in this interval.
    pub fn duration(&self) -> chrono::Duration {
        match self {
            Interval::Minute => chrono::Duration::minutes(1),
            Interval::Hour => chrono::Duration::hours(1),
            Interval::Day => chrono::Duration::days(1),
        }
    }

    /// Truncate a timestamp down to the start of its bucket for this interval,
    /// in UTC (minute zeroes seconds/ms; hour zeroes minutes; day zeroes to
    /// midnight).
    pub fn bucket_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        use chrono::Timelike;
        match self {
            Interval::Minute => at
                .with_second(0)
                .and_then(|t| t.with_nanosecond(0))
                .unwrap_or(at),
            Interval::Hour => at
                .with_minute(0)
                .and_then(|t| t.with_second(0))
                .and_then(|t| t.with_nanosecond(0))
                .unwrap_or(at),
            Interval::Day => at.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc(),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleStatus {
    Current,
    Finalized,
}

impl CandleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandleStatus::Current => "current",
            CandleStatus::Finalized => "finalized",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub token_address: String,
    pub interval: Interval,
    pub bucket: DateTime<Utc>,
    pub status: CandleStatus,
    pub open: BigDecimal,
    pub high: BigDecimal,
    pub low: BigDecimal,
    pub close: BigDecimal,
    pub volume: BigDecimal,
    pub volume_usd: BigDecimal,
    pub untracked_volume_usd: BigDecimal,
    pub total_value_locked: BigDecimal,
    pub total_value_locked_usd: BigDecimal,
    pub price_usd: BigDecimal,
    pub fees_usd: BigDecimal,
    pub tx_count: i64,
}

impl Candle {
    /// A freshly-opened candle seeded entirely from the first swap it folds.
    pub fn open_with(
        token_address: String,
        interval: Interval,
        bucket: DateTime<Utc>,
        price: BigDecimal,
        volume: BigDecimal,
        volume_usd: BigDecimal,
        tvl: BigDecimal,
        tvl_usd: BigDecimal,
    ) -> Self {
        Self {
            token_address,
            interval,
            bucket,
            status: CandleStatus::Current,
            open: price.clone(),
            high: price.clone(),
            low: price.clone(),
            close: price.clone(),
            volume,
            volume_usd,
            untracked_volume_usd: BigDecimal::from(0),
            total_value_locked: tvl,
            total_value_locked_usd: tvl_usd,
            price_usd: price,
            fees_usd: BigDecimal::from(0),
            tx_count: 1,
        }
    }

    /// Fold one more swap into this (already-open) candle. No-op-safe only
    /// when called on a `Current` row; callers must check `status` first
    /// (the finalization race rule in §5).
    pub fn fold(
        &mut self,
        price: BigDecimal,
        volume_delta: BigDecimal,
        volume_usd_delta: BigDecimal,
        fees_usd_delta: BigDecimal,
        tvl: BigDecimal,
        tvl_usd: BigDecimal,
    ) {
        self.volume += volume_delta;
        self.volume_usd += volume_usd_delta;
        self.fees_usd += fees_usd_delta;
        self.tx_count += 1;
        if price > self.high {
            self.high = price.clone();
        }
        if self.low <= BigDecimal::from(0) || price < self.low {
            self.low = price.clone();
        }
        self.close = price.clone();
        self.price_usd = price;
        self.total_value_locked = tvl;
        self.total_value_locked_usd = tvl_usd;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn bucket_start_truncates_per_interval() {
        let t = Utc.with_ymd_and_hms(2026, 7, 26, 14, 37, 52).unwrap();
        assert_eq!(
            Interval::Minute.bucket_start(t),
            Utc.with_ymd_and_hms(2026, 7, 26, 14, 37, 0).unwrap()
        );
        assert_eq!(
            Interval::Hour.bucket_start(t),
            Utc.with_ymd_and_hms(2026, 7, 26, 14, 0, 0).unwrap()
        );
        assert_eq!(
            Interval::Day.bucket_start(t),
            Utc.with_ymd_and_hms(2026, 7, 26, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn fold_tracks_high_low_close_but_not_open() {
        let bucket = Utc.with_ymd_and_hms(2026, 7, 26, 14, 37, 0).unwrap();
        let mut candle = Candle::open_with(
            "0xtoken".to_string(),
            Interval::Minute,
            bucket,
            BigDecimal::from(100),
            BigDecimal::from(1),
            BigDecimal::from(100),
            BigDecimal::from(10),
            BigDecimal::from(1000),
        );

        candle.fold(
            BigDecimal::from(90),
            BigDecimal::from(2),
            BigDecimal::from(180),
            BigDecimal::from(1),
            BigDecimal::from(12),
            BigDecimal::from(1080),
        );
        candle.fold(
            BigDecimal::from(120),
            BigDecimal::from(1),
            BigDecimal::from(120),
            BigDecimal::from(1),
            BigDecimal::from(13),
            BigDecimal::from(1560),
        );

        assert_eq!(candle.open, BigDecimal::from(100));
        assert_eq!(candle.high, BigDecimal::from(120));
        assert_eq!(candle.low, BigDecimal::from(90));
        assert_eq!(candle.close, BigDecimal::from(120));
        assert_eq!(candle.tx_count, 3);
        assert_eq!(candle.volume, BigDecimal::from(4));
    }
}
