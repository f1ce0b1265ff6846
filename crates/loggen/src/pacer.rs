// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use tokio::time::{interval, Interval, MissedTickBehavior};

const NANOS_PER_MINUTE: u128 = 60_000_000_000;

/// Turns a per-minute rate into record budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacer {
    logs_per_min: u64,
    flush_interval: Duration,
}

impl Pacer {
    /// For ticked plans `flush_interval` must evenly divide one minute; config validation
    /// guarantees it for the broker sink. Lump plans take any window.
    #[must_use]
    pub fn new(logs_per_min: u64, flush_interval: Duration) -> Self {
        Pacer {
            logs_per_min,
            flush_interval,
        }
    }

    #[must_use]
    pub fn ticks_per_minute(&self) -> u64 {
        (60 / self.flush_interval.as_secs().max(1)).max(1)
    }

    /// Records per tick, rounded up: `ceil(rate / (60 / interval))`.
    #[must_use]
    pub fn per_tick_quota(&self) -> u64 {
        self.logs_per_min.div_ceil(self.ticks_per_minute())
    }

    /// Records for a window of `window` length, rounded up: `ceil(rate / 60 * window)`.
    /// Computed in nanoseconds so fractional windows round the same way whole ones do.
    #[must_use]
    pub fn lump_quota(&self, window: Duration) -> u64 {
        let records =
            (u128::from(self.logs_per_min) * window.as_nanos()).div_ceil(NANOS_PER_MINUTE);
        u64::try_from(records).unwrap_or(u64::MAX)
    }

    /// One flush interval's worth of records, drained as fast as possible.
    #[must_use]
    pub fn lump_plan(&self) -> PacingPlan {
        PacingPlan::Lump {
            records: self.lump_quota(self.flush_interval),
        }
    }

    /// One minute's worth of records, handed out per tick.
    #[must_use]
    pub fn ticked_plan(&self) -> PacingPlan {
        PacingPlan::Ticked {
            per_tick: self.per_tick_quota(),
            total: self.logs_per_min,
            period: self.flush_interval,
        }
    }
}

/// How a worker spends its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingPlan {
    /// Synthesize `records` back to back.
    Lump { records: u64 },
    /// Synthesize up to `per_tick` records on every tick until `total` is reached.
    Ticked {
        per_tick: u64,
        total: u64,
        period: Duration,
    },
}

impl PacingPlan {
    #[must_use]
    pub fn total(&self) -> u64 {
        match self {
            PacingPlan::Lump { records } => *records,
            PacingPlan::Ticked { total, .. } => *total,
        }
    }
}

/// Remaining record budget. Saturates at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    remaining: u64,
}

impl Quota {
    #[must_use]
    pub fn new(records: u64) -> Self {
        Quota { remaining: records }
    }

    /// Consumes one record of budget, returning `false` once the budget is gone.
    pub fn take_one(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }

    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Splits `total` into `parts` shares differing by at most one, summing to `total`.
#[must_use]
pub fn split_quota(total: u64, parts: usize) -> Vec<u64> {
    if parts == 0 {
        return Vec::new();
    }
    let parts_u64 = parts as u64;
    let base = total / parts_u64;
    let extra = total % parts_u64;
    (0..parts_u64)
        .map(|i| if i < extra { base + 1 } else { base })
        .collect()
}

/// Monotonic ticker firing immediately and then every `period`. Late ticks burst so a slow
/// tick never costs budget.
#[must_use]
pub fn ticker(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
    ticker
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_tick_quota() {
        let pacer = Pacer::new(600, Duration::from_secs(10));
        assert_eq!(pacer.ticks_per_minute(), 6);
        assert_eq!(pacer.per_tick_quota(), 100);

        // rounds up
        assert_eq!(Pacer::new(601, Duration::from_secs(10)).per_tick_quota(), 101);
        assert_eq!(Pacer::new(5, Duration::from_secs(1)).per_tick_quota(), 1);
        assert_eq!(Pacer::new(90, Duration::from_secs(60)).per_tick_quota(), 90);
    }

    #[test]
    fn test_lump_quota() {
        let pacer = Pacer::new(600, Duration::from_secs(10));
        assert_eq!(pacer.lump_quota(Duration::from_secs(10)), 100);
        assert_eq!(pacer.lump_plan(), PacingPlan::Lump { records: 100 });

        let pacer = Pacer::new(100, Duration::from_secs(15));
        assert_eq!(pacer.lump_quota(Duration::from_secs(15)), 25);
        assert_eq!(Pacer::new(7, Duration::from_secs(5)).lump_plan().total(), 1);
    }

    #[test]
    fn test_lump_quota_over_long_and_fractional_windows() {
        let pacer = Pacer::new(600, Duration::from_secs(120));
        assert_eq!(pacer.lump_plan(), PacingPlan::Lump { records: 1200 });
        assert_eq!(pacer.lump_quota(Duration::from_secs(300)), 3000);

        assert_eq!(pacer.lump_quota(Duration::from_millis(500)), 5);
        // 1 record/min over 0.1s still rounds up to one
        let slow = Pacer::new(1, Duration::ZERO);
        assert_eq!(slow.lump_quota(Duration::from_millis(100)), 1);
        let steady = Pacer::new(60, Duration::ZERO);
        assert_eq!(steady.lump_quota(Duration::from_secs_f64(2.5)), 3);
        assert_eq!(pacer.lump_quota(Duration::ZERO), 0);
    }

    #[test]
    fn test_ticked_plan() {
        let plan = Pacer::new(120, Duration::from_secs(30)).ticked_plan();
        assert_eq!(
            plan,
            PacingPlan::Ticked {
                per_tick: 60,
                total: 120,
                period: Duration::from_secs(30)
            }
        );
        assert_eq!(plan.total(), 120);
    }

    #[test]
    fn test_quota_saturates() {
        let mut quota = Quota::new(2);
        assert!(quota.take_one());
        assert!(quota.take_one());
        assert!(quota.is_exhausted());
        assert!(!quota.take_one());
        assert_eq!(quota.remaining(), 0);
    }

    #[test]
    fn test_split_quota() {
        assert_eq!(split_quota(100, 3), vec![34, 33, 33]);
        assert_eq!(split_quota(2, 4), vec![1, 1, 0, 0]);
        assert_eq!(split_quota(10, 1), vec![10]);
        assert!(split_quota(10, 0).is_empty());
        assert_eq!(split_quota(1001, 7).iter().sum::<u64>(), 1001);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_fires_immediately_then_every_period() {
        let start = tokio::time::Instant::now();
        let mut ticker = ticker(Duration::from_secs(10));
        ticker.tick().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        ticker.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }
}
