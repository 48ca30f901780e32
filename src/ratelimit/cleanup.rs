//! Background eviction of expired rate limit entries.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::limiter::RateLimiter;

/// How often cleanup runs unless configured otherwise.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Handle to a running cleanup task.
///
/// The task runs until [`CleanupTask::shutdown`] is called. Dropping the
/// handle without shutting down aborts the task.
pub struct CleanupTask {
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl CleanupTask {
    /// Start calling [`RateLimiter::cleanup`] every `interval`.
    ///
    /// The first pass runs one full interval after spawning.
    pub fn spawn(limiter: Arc<RateLimiter>, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        info!(interval_secs = interval.as_secs(), "Starting rate limit cleanup task");

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = limiter.cleanup();
                        if evicted > 0 {
                            debug!(evicted = evicted, "Evicted expired rate limit entries");
                        }
                    }
                    // Fires on the shutdown signal or when the handle is dropped
                    _ = shutdown_rx.changed() => break,
                }
            }
            debug!("Rate limit cleanup task exited");
        });

        Self {
            shutdown_tx,
            handle: Some(handle),
        }
    }

    /// Stop the task and wait for it to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Rate limit cleanup task ended abnormally");
            }
        }
        info!("Rate limit cleanup task stopped");
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }
}

impl Drop for CleanupTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use crate::ratelimit::rules::CategoryConfig;

    fn test_limiter() -> (Arc<RateLimiter>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = Arc::new(RateLimiter::with_clock(clock.clone()));
        limiter.set_config("short", CategoryConfig::new(5, 1000)).unwrap();
        (limiter, clock)
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_runs_on_interval() {
        let (limiter, clock) = test_limiter();
        limiter.check_limit("one-shot", "short");
        clock.advance(5000);

        let task = CleanupTask::spawn(limiter.clone(), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(limiter.entry_count(), 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(limiter.entry_count(), 0);

        task.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_task() {
        let (limiter, clock) = test_limiter();
        let task = CleanupTask::spawn(limiter.clone(), DEFAULT_CLEANUP_INTERVAL);
        assert!(!task.is_finished());

        task.shutdown().await;

        limiter.check_limit("late", "short");
        clock.advance(5000);
        tokio::time::sleep(DEFAULT_CLEANUP_INTERVAL * 2).await;
        assert_eq!(limiter.entry_count(), 1);
    }
}
