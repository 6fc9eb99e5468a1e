//! Background work for weft.
//!
//! - **Runner**: [`LocalTaskRunner`] executes federation tasks on tokio with
//!   per-priority concurrency limits and retries
//! - **Jobs/Workers**: per-inbox delivery batches on an apalis Redis queue
//! - **Scheduler**: periodic inbox sweeps, queue purges and delivery sweeps

pub mod jobs;
pub mod retry;
pub mod runner;
pub mod scheduler;
pub mod workers;

pub use jobs::*;
pub use retry::RetryConfig;
pub use runner::{LocalTaskRunner, RunnerConfig};
pub use scheduler::{JobExecutor, SchedulerConfig, run_scheduler};
pub use workers::*;
