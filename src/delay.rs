//! Simulated workload latency.
//!
//! Handlers stand in for real I/O (database writes, e-mail gateways, ...) by
//! pausing for bounded intervals. The pause is delegated to a [`DelayProvider`]
//! so the pipeline can run with [`NoDelay`] in tests.

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

/// Inclusive bounds for one simulated pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub const fn fixed(duration: Duration) -> Self {
        Self {
            min: duration,
            max: duration,
        }
    }

    pub const fn fixed_millis(millis: u64) -> Self {
        Self::fixed(Duration::from_millis(millis))
    }

    /// Bounds are swapped if given in the wrong order.
    pub fn between_millis(min: u64, max: u64) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min: Duration::from_millis(min),
            max: Duration::from_millis(max),
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.min == self.max
    }
}

/// Source of simulated latency.
#[async_trait]
pub trait DelayProvider: Send + Sync {
    /// Suspends for a duration within `range` and returns the duration used.
    async fn pause(&self, range: DelayRange) -> Duration;
}

/// Real delays on the tokio timer, uniformly sampled within the range.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDelay;

impl TokioDelay {
    fn sample(range: DelayRange) -> Duration {
        if range.is_fixed() {
            range.min
        } else {
            rand::thread_rng().gen_range(range.min..=range.max)
        }
    }
}

#[async_trait]
impl DelayProvider for TokioDelay {
    async fn pause(&self, range: DelayRange) -> Duration {
        let duration = Self::sample(range);
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
        duration
    }
}

/// Returns immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

#[async_trait]
impl DelayProvider for NoDelay {
    async fn pause(&self, _range: DelayRange) -> Duration {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_between_millis_orders_bounds() {
        let range = DelayRange::between_millis(500, 200);
        assert_eq!(range.min, Duration::from_millis(200));
        assert_eq!(range.max, Duration::from_millis(500));
        assert!(!range.is_fixed());
    }

    #[test]
    fn test_sample_stays_within_bounds() {
        let range = DelayRange::between_millis(50, 150);
        for _ in 0..100 {
            let d = TokioDelay::sample(range);
            assert!(d >= range.min && d <= range.max, "{:?} out of bounds", d);
        }
        assert_eq!(
            TokioDelay::sample(DelayRange::fixed_millis(80)),
            Duration::from_millis(80)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_delay_sleeps_for_sampled_duration() {
        let start = tokio::time::Instant::now();
        let used = TokioDelay.pause(DelayRange::fixed_millis(30)).await;
        assert_eq!(used, Duration::from_millis(30));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_no_delay_returns_zero() {
        assert_eq!(
            NoDelay.pause(DelayRange::between_millis(200, 500)).await,
            Duration::ZERO
        );
    }
}
