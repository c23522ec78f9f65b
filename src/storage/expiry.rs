//! Background Expiry Sweeper
//!
//! Reads only hide expired keys; they never remove them. This module runs the
//! "active expiry" half: a Tokio task that wakes on a fixed interval and
//! removes every expired key from the engine, so keys that are never touched
//! again still release their memory.
//!
//! The sweeper stops when its handle is dropped or [`ExpirySweeper::stop`] is
//! called. It takes each shard's write lock in turn, so it never holds the
//! whole keyspace at once.

use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Default pause between two sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Interval between sweeps (default: 1s)
    pub interval: Duration,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl ExpiryConfig {
    pub fn with_interval(interval: Duration) -> Self {
        Self { interval }
    }
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Starts the expiry sweeper as a background task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Example
    ///
    /// ```
    /// use boltkv::storage::{ExpiryConfig, ExpirySweeper, StorageEngine};
    /// use std::sync::Arc;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let engine = Arc::new(StorageEngine::new());
    /// let sweeper = ExpirySweeper::start(engine, ExpiryConfig::default());
    ///
    /// // Dropping the sweeper stops it
    /// drop(sweeper);
    /// # }
    /// ```
    pub fn start(engine: Arc<StorageEngine>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            interval_ms = config.interval.as_millis() as u64,
            "Background expiry sweeper started"
        );
        tokio::spawn(sweeper_loop(engine, config, shutdown_rx));

        Self { shutdown_tx }
    }

    /// Stops the expiry sweeper. Calling it more than once is harmless.
    pub fn stop(&self) {
        if !*self.shutdown_tx.borrow() {
            let _ = self.shutdown_tx.send(true);
            info!("Background expiry sweeper stopped");
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(
    engine: Arc<StorageEngine>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let expired = engine.cleanup_expired();
        if expired > 0 {
            debug!(
                expired = expired,
                keys_remaining = engine.len(),
                "Expired keys cleaned up"
            );
        }
    }
}

/// Starts the expiry sweeper with the default one second interval.
pub fn start_expiry_sweeper(engine: Arc<StorageEngine>) -> ExpirySweeper {
    ExpirySweeper::start(engine, ExpiryConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn fast() -> ExpiryConfig {
        ExpiryConfig::with_interval(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_sweeper_cleans_expired_keys() {
        let engine = Arc::new(StorageEngine::new());

        for i in 0..10 {
            engine.set_with_ttl(
                Bytes::from(format!("key{}", i)),
                Bytes::from("value"),
                Duration::from_millis(30),
            )
            .unwrap();
        }
        engine
            .sadd(Bytes::from("short-set"), vec![Bytes::from("m")])
            .unwrap();
        engine.expire(b"short-set", Duration::from_millis(30)).unwrap();
        engine.set(Bytes::from("persistent"), Bytes::from("value"));

        assert_eq!(engine.len(), 12);

        let _sweeper = ExpirySweeper::start(Arc::clone(&engine), fast());

        tokio::time::sleep(Duration::from_millis(200)).await;

        // Only the persistent key should remain
        assert_eq!(engine.len(), 1);
        assert!(engine.exists(b"persistent"));
        assert_eq!(engine.stats().expired, 11);
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_drop() {
        let engine = Arc::new(StorageEngine::new());

        {
            let _sweeper = ExpirySweeper::start(Arc::clone(&engine), fast());
            tokio::time::sleep(Duration::from_millis(30)).await;
        }

        engine.set_with_ttl(
            Bytes::from("key"),
            Bytes::from("value"),
            Duration::from_millis(10),
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;

        // Nobody swept it: hidden from reads but still stored.
        assert_eq!(engine.get(b"key").unwrap(), None);
        assert_eq!(engine.len(), 1);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let engine = Arc::new(StorageEngine::new());
        let sweeper = ExpirySweeper::start(engine, fast());
        sweeper.stop();
        sweeper.stop();
    }

    #[test]
    fn test_default_interval_is_one_second() {
        assert_eq!(ExpiryConfig::default().interval, Duration::from_secs(1));
    }
}
