//! In-process task runner.
//!
//! Tasks run on spawned tokio tasks, bounded by one semaphore per priority.
//! Deliveries can be handed to an apalis Redis queue instead so that
//! batches survive restarts.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use apalis::prelude::Storage;
use apalis_redis::RedisStorage;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use weft_common::{AppError, AppResult};
use weft_federation::{Priority, Task, TaskExecutor, TaskHandle, TaskRunner};

use crate::jobs::DeliverJob;
use crate::retry::RetryConfig;

/// Concurrency limits per priority.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub retry: RetryConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            high: 32,
            medium: 16,
            low: 8,
            retry: RetryConfig::default(),
        }
    }
}

struct RunnerInner {
    /// Seeded from the clock so handles stored by an earlier process never repeat.
    next: AtomicI64,
    tasks: Mutex<HashMap<TaskHandle, JoinHandle<()>>>,
    limits: HashMap<Priority, Arc<Semaphore>>,
    retry: RetryConfig,
    executor: OnceLock<Arc<dyn TaskExecutor>>,
    deliveries: Option<RedisStorage<DeliverJob>>,
}

/// Runs tasks on the local tokio runtime.
#[derive(Clone)]
pub struct LocalTaskRunner {
    inner: Arc<RunnerInner>,
}

impl LocalTaskRunner {
    #[must_use]
    pub fn new(config: RunnerConfig) -> Self {
        Self::build(config, None)
    }

    /// Push [`Task::Deliver`] to an apalis queue instead of running it here.
    #[must_use]
    pub fn with_delivery_queue(config: RunnerConfig, storage: RedisStorage<DeliverJob>) -> Self {
        Self::build(config, Some(storage))
    }

    fn build(config: RunnerConfig, deliveries: Option<RedisStorage<DeliverJob>>) -> Self {
        let limits = [
            (Priority::High, config.high),
            (Priority::Medium, config.medium),
            (Priority::Low, config.low),
        ]
        .into_iter()
        .map(|(priority, permits)| (priority, Arc::new(Semaphore::new(permits.max(1)))))
        .collect();

        Self {
            inner: Arc::new(RunnerInner {
                next: AtomicI64::new(Utc::now().timestamp_micros()),
                tasks: Mutex::new(HashMap::new()),
                limits,
                retry: config.retry,
                executor: OnceLock::new(),
                deliveries,
            }),
        }
    }

    /// Attach the executor that runs scheduled tasks. Only the first call
    /// has an effect.
    pub fn bind(&self, executor: Arc<dyn TaskExecutor>) {
        if self.inner.executor.set(executor).is_err() {
            warn!("Task runner already has an executor");
        }
    }

    /// Number of spawned tasks not yet finished.
    pub async fn running(&self) -> usize {
        let mut tasks = self.inner.tasks.lock().await;
        tasks.retain(|_, task| !task.is_finished());
        tasks.len()
    }

    async fn enqueue_delivery(
        &self,
        storage: &RedisStorage<DeliverJob>,
        inbox: String,
        handle: TaskHandle,
    ) -> AppResult<TaskHandle> {
        storage
            .clone()
            .push(DeliverJob::new(inbox.clone()))
            .await
            .map_err(|e| AppError::Queue(format!("Failed to queue delivery: {e}")))?;
        debug!(inbox = %inbox, handle, "Queued delivery job");
        Ok(handle)
    }
}

#[async_trait]
impl TaskRunner for LocalTaskRunner {
    async fn schedule(
        &self,
        priority: Priority,
        task: Task,
        delay: Option<Duration>,
    ) -> AppResult<TaskHandle> {
        let handle = self.inner.next.fetch_add(1, Ordering::SeqCst) + 1;

        if let (Some(storage), Task::Deliver { inbox }) = (&self.inner.deliveries, &task) {
            return self.enqueue_delivery(storage, inbox.clone(), handle).await;
        }

        let executor = self
            .inner
            .executor
            .get()
            .cloned()
            .ok_or_else(|| AppError::Internal("task runner has no executor".to_string()))?;
        let semaphore = self
            .inner
            .limits
            .get(&priority)
            .cloned()
            .ok_or_else(|| AppError::Internal(format!("no limit for {priority:?}")))?;
        let retry = self.inner.retry.clone();

        debug!(task = task.name(), handle, ?priority, ?delay, "Scheduling task");
        let join = tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            run(executor, semaphore, retry, task, handle).await;
        });

        let mut tasks = self.inner.tasks.lock().await;
        tasks.retain(|_, task| !task.is_finished());
        tasks.insert(handle, join);
        Ok(handle)
    }

    async fn is_alive(&self, handle: TaskHandle) -> bool {
        self.inner
            .tasks
            .lock()
            .await
            .get(&handle)
            .is_some_and(|task| !task.is_finished())
    }
}

async fn run(
    executor: Arc<dyn TaskExecutor>,
    semaphore: Arc<Semaphore>,
    retry: RetryConfig,
    task: Task,
    handle: TaskHandle,
) {
    let mut attempt = 0;
    loop {
        let result = {
            let Ok(_permit) = semaphore.acquire().await else {
                return;
            };
            executor.execute(task.clone(), handle).await
        };

        let Err(e) = result else {
            return;
        };
        if retry.should_retry(attempt, &e) {
            let delay = retry.delay_for_attempt(attempt);
            warn!(task = task.name(), handle, attempt, error = %e, ?delay, "Task failed; retrying");
            tokio::time::sleep(delay).await;
            attempt += 1;
            continue;
        }

        error!(task = task.name(), handle, attempt, error = %e, "Task failed; abandoning");
        if let Err(e) = executor.abandon(&task, handle).await {
            error!(task = task.name(), handle, error = %e, "Failed to abandon task");
        }
        return;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Recording {
        executed: AtomicUsize,
        abandoned: Mutex<Vec<TaskHandle>>,
        error: Option<fn() -> AppError>,
    }

    #[async_trait]
    impl TaskExecutor for Recording {
        async fn execute(&self, _task: Task, _handle: TaskHandle) -> AppResult<()> {
            self.executed.fetch_add(1, Ordering::SeqCst);
            match self.error {
                Some(error) => Err(error()),
                None => Ok(()),
            }
        }

        async fn abandon(&self, _task: &Task, handle: TaskHandle) -> AppResult<()> {
            self.abandoned.lock().await.push(handle);
            Ok(())
        }
    }

    fn task() -> Task {
        Task::ProcessEntry { entry_id: 1 }
    }

    async fn settle(runner: &LocalTaskRunner) {
        for _ in 0..1000 {
            if runner.running().await == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        panic!("tasks did not finish");
    }

    #[tokio::test]
    async fn test_schedule_without_executor_fails() {
        let runner = LocalTaskRunner::new(RunnerConfig::default());
        let result = runner.schedule(Priority::High, task(), None).await;
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_runs_and_handle_dies() {
        let runner = LocalTaskRunner::new(RunnerConfig::default());
        let executor = Arc::new(Recording::default());
        runner.bind(executor.clone());

        let handle = runner
            .schedule(Priority::Medium, task(), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(runner.is_alive(handle).await);

        settle(&runner).await;
        assert!(!runner.is_alive(handle).await);
        assert_eq!(executor.executed.load(Ordering::SeqCst), 1);
        assert!(executor.abandoned.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_are_retried_then_abandoned() {
        let runner = LocalTaskRunner::new(RunnerConfig::default());
        let executor = Arc::new(Recording {
            error: Some(|| AppError::Database("down".to_string())),
            ..Default::default()
        });
        runner.bind(executor.clone());

        let handle = runner.schedule(Priority::Low, task(), None).await.unwrap();
        settle(&runner).await;

        assert_eq!(executor.executed.load(Ordering::SeqCst), 4);
        assert_eq!(*executor.abandoned.lock().await, vec![handle]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_errors_are_abandoned_at_once() {
        let runner = LocalTaskRunner::new(RunnerConfig::default());
        let executor = Arc::new(Recording {
            error: Some(|| AppError::BadRequest("no actor".to_string())),
            ..Default::default()
        });
        runner.bind(executor.clone());

        runner.schedule(Priority::High, task(), None).await.unwrap();
        settle(&runner).await;

        assert_eq!(executor.executed.load(Ordering::SeqCst), 1);
        assert_eq!(executor.abandoned.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_handles_are_unique() {
        let runner = LocalTaskRunner::new(RunnerConfig::default());
        runner.bind(Arc::new(Recording::default()));
        let a = runner.schedule(Priority::High, task(), None).await.unwrap();
        let b = runner.schedule(Priority::High, task(), None).await.unwrap();
        assert_ne!(a, b);
        assert!(!runner.is_alive(b + 1).await);
    }

    #[tokio::test]
    async fn test_handles_do_not_repeat_across_runners() {
        let executor: Arc<dyn TaskExecutor> = Arc::new(Recording::default());
        let before = LocalTaskRunner::new(RunnerConfig::default());
        before.bind(executor.clone());
        let old = before.schedule(Priority::High, task(), None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(2)).await;
        let after = LocalTaskRunner::new(RunnerConfig::default());
        after.bind(executor);
        let new = after.schedule(Priority::High, task(), None).await.unwrap();

        assert!(new > old);
        assert!(!after.is_alive(old).await);
    }
}
