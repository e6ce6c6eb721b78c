//! Delays and jitter.
//!
//! Every wait in the crate goes through a [`Sleeper`], so tests can observe
//! requested delays without spending wall-clock time.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

/// Delay between attempts of a transient request, in seconds.
pub const RETRY_JITTER_SECS: (f64, f64) = (1.0, 3.0);
/// Pause after the service announces maintenance.
pub const MAINTENANCE_PAUSE_SECS: (f64, f64) = (300.0, 600.0);
/// Sleep after a poll cycle fails unexpectedly.
pub const CYCLE_FAILURE_BACKOFF_SECS: (f64, f64) = (60.0, 120.0);
/// Margin added after a predicted remote event.
pub const WAKE_MARGIN_SECS: (f64, f64) = (60.0, 180.0);

/// Something that can suspend the current task.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested delays and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .map(|d| d.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        match self.delays.lock() {
            Ok(mut delays) => delays.push(duration),
            Err(poisoned) => poisoned.into_inner().push(duration),
        }
        tokio::task::yield_now().await;
    }
}

/// Uniform duration in `[min, max)` seconds using the given generator.
///
/// A degenerate range collapses to `min`.
pub fn uniform_secs<R: Rng + ?Sized>(rng: &mut R, (min, max): (f64, f64)) -> Duration {
    let min = min.max(0.0);
    if max <= min {
        return Duration::from_secs_f64(min);
    }
    Duration::from_secs_f64(rng.gen_range(min..max))
}

/// Uniform duration in `[min, max)` seconds from the thread-local generator.
pub fn jitter((min, max): (f64, f64)) -> Duration {
    uniform_secs(&mut rand::thread_rng(), (min, max))
}

/// Like [`jitter`] for whole-second setting ranges.
pub fn jitter_whole((min, max): (u64, u64)) -> Duration {
    jitter((min as f64, max as f64))
}
