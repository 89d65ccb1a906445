//! Inter-chunk timing randomization
//!
//! A DPI box that fails to reassemble fragments can still fingerprint the
//! evasion by its back-to-back segment cadence. Randomized delays between
//! chunk writes break that cadence.

use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Inter-chunk delay policy for the fragmented ClientHello write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingJitter {
    /// No delay between chunks
    Off,
    /// Sleep a uniformly random whole number of milliseconds in
    /// `[min_ms, max_ms]` between consecutive chunks
    Uniform { min_ms: u16, max_ms: u16 },
}

impl TimingJitter {
    /// Sleep once according to the policy. A no-op for [`TimingJitter::Off`].
    ///
    /// `min_ms == max_ms` still sleeps the fixed amount; a degenerate range
    /// is a constant delay, not a disabled one.
    pub async fn delay(&self) {
        if let TimingJitter::Uniform { min_ms, max_ms } = *self {
            let ms = rand::thread_rng().gen_range(min_ms..=max_ms);
            sleep(Duration::from_millis(u64::from(ms))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test]
    async fn off_does_not_sleep() {
        let start = Instant::now();
        TimingJitter::Off.delay().await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn uniform_sleeps_at_least_min() {
        let jitter = TimingJitter::Uniform {
            min_ms: 20,
            max_ms: 40,
        };
        let start = Instant::now();
        jitter.delay().await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn degenerate_range_still_delays() {
        let jitter = TimingJitter::Uniform {
            min_ms: 15,
            max_ms: 15,
        };
        let start = Instant::now();
        jitter.delay().await;
        assert!(start.elapsed() >= Duration::from_millis(15));
    }
}
