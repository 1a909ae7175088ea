use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Time seam for the engine. All session timers (queue ticks, typing
/// delays, inactivity timeouts, dedup windows) go through this trait so
/// tests can fast-forward with tokio's paused clock instead of sleeping.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

/// Production clock backed by `tokio::time`. Under
/// `#[tokio::test(start_paused = true)]` the sleeps auto-advance, so this
/// same implementation is deterministic in tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
