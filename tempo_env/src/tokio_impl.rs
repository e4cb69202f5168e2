//! Wall-clock [`TimeContext`] for driving a timeline at real pace.

use crate::TimeContext;
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Reads frame time from the host monotonic clock and waits on tokio timers.
///
/// `now` counts from construction, so the first frame delta a loop takes
/// is measured against the moment the context was built.
pub struct TokioContext {
    origin: Instant,
}

impl TokioContext {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TimeContext for TokioContext {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            tokio::task::yield_now().await;
            return;
        }
        tokio::time::sleep(duration).await;
    }

    fn seed(&self) -> u64 {
        // wall time has no seed
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StepPacer;

    #[tokio::test]
    async fn test_sleep_waits_at_least_one_frame() {
        let ctx = TokioContext::new();
        let before = ctx.now();
        ctx.sleep(Duration::from_millis(16)).await;
        assert!(ctx.now() - before >= Duration::from_millis(16));
    }

    #[tokio::test]
    async fn test_zero_sleep_does_not_move_clock_backwards() {
        let ctx = TokioContext::new();
        let before = ctx.now();
        ctx.sleep(Duration::ZERO).await;
        assert!(ctx.now() >= before);
    }

    #[tokio::test]
    async fn test_measured_frame_releases_fixed_steps() {
        let ctx = TokioContext::new();
        let mut pacer = StepPacer::new(0.01, 8).unwrap();

        let last = ctx.now();
        ctx.sleep(Duration::from_millis(25)).await;
        let frame = pacer.frame(ctx.now() - last, 1.0);

        assert!(frame.steps >= 2);
        assert!(frame.wall_dt_per_step > 0.0);
    }

    #[test]
    fn test_wall_clock_is_unseeded() {
        assert_eq!(TokioContext::default().seed(), 0);
    }
}
