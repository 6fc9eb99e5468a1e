//! Periodic sweeps of the inbound queue and the delivery table.

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use weft_common::{AppResult, Config};
use weft_federation::Federation;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval for re-dispatching idle inbound entries (default: 1 minute).
    pub process_interval: Duration,
    /// Interval for purging stale inbound entries (default: 1 hour).
    pub clear_interval: Duration,
    /// Interval for scheduling pending delivery batches (default: 5 minutes).
    pub delivery_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            process_interval: Duration::from_secs(60),
            clear_interval: Duration::from_secs(3600),
            delivery_interval: Duration::from_secs(300),
        }
    }
}

impl From<&Config> for SchedulerConfig {
    fn from(config: &Config) -> Self {
        Self {
            process_interval: Duration::from_secs(config.inbox.sweep_interval_secs),
            clear_interval: Duration::from_secs(config.inbox.clear_interval_secs),
            delivery_interval: Duration::from_secs(config.delivery.sweep_interval_secs),
        }
    }
}

/// Job executor trait for scheduled jobs.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Dispatch every trusted inbound entry without a live task.
    async fn process_inbox_queue(&self) -> AppResult<usize>;

    /// Purge inbound entries older than the retention period.
    async fn clear_inbox_queue(&self) -> AppResult<u64>;

    /// Schedule a delivery batch for every inbox with pending targets.
    async fn sweep_deliveries(&self) -> AppResult<usize>;
}

#[async_trait]
impl JobExecutor for Federation {
    async fn process_inbox_queue(&self) -> AppResult<usize> {
        self.queue().process_all().await
    }

    async fn clear_inbox_queue(&self) -> AppResult<u64> {
        self.queue().clear().await
    }

    async fn sweep_deliveries(&self) -> AppResult<usize> {
        self.delivery().sweep().await
    }
}

/// Run the scheduler with the given configuration and executor.
///
/// Returns the handles of the spawned loops; aborting them stops the
/// scheduler.
pub fn run_scheduler<E: JobExecutor + 'static>(
    config: &SchedulerConfig,
    executor: Arc<E>,
) -> Vec<JoinHandle<()>> {
    let executor_process = executor.clone();
    let executor_clear = executor.clone();
    let executor_delivery = executor;

    let process = tokio::spawn(every(config.process_interval, move || {
        let executor = executor_process.clone();
        async move {
            match executor.process_inbox_queue().await {
                Ok(count) => {
                    if count > 0 {
                        tracing::info!(count, "Dispatched idle inbox entries");
                    }
                }
                Err(e) => tracing::error!(error = %e, "Failed to process inbox queue"),
            }
        }
    }));

    let clear = tokio::spawn(every(config.clear_interval, move || {
        let executor = executor_clear.clone();
        async move {
            match executor.clear_inbox_queue().await {
                Ok(count) => {
                    if count > 0 {
                        tracing::info!(count, "Cleared stale inbox entries");
                    }
                }
                Err(e) => tracing::error!(error = %e, "Failed to clear inbox queue"),
            }
        }
    }));

    let delivery = tokio::spawn(every(config.delivery_interval, move || {
        let executor = executor_delivery.clone();
        async move {
            match executor.sweep_deliveries().await {
                Ok(count) => {
                    if count > 0 {
                        tracing::debug!(count, "Scheduled delivery batches");
                    }
                }
                Err(e) => tracing::error!(error = %e, "Failed to sweep deliveries"),
            }
        }
    }));

    vec![process, clear, delivery]
}

async fn every<F, Fut>(period: Duration, mut job: F)
where
    F: FnMut() -> Fut + Send,
    Fut: std::future::Future<Output = ()> + Send,
{
    let mut interval = interval(period.max(Duration::from_secs(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        job().await;
    }
}
