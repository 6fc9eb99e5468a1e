//! Entry point tying the pipeline components to a [`FederationContext`].

use async_trait::async_trait;
use tracing::{debug, info, warn};
use weft_common::AppResult;

use crate::context::FederationContext;
use crate::delivery::{DeliveryReport, DeliveryWorker};
use crate::fetch::{FetchQueue, Fetcher};
use crate::queue::InboundQueue;
use crate::receiver::Receiver;
use crate::tasks::{Task, TaskExecutor, TaskHandle};
use crate::transmitter::Transmitter;

/// The federation engine.
#[derive(Clone)]
pub struct Federation {
    ctx: FederationContext,
}

impl Federation {
    #[must_use]
    pub const fn new(ctx: FederationContext) -> Self {
        Self { ctx }
    }

    #[must_use]
    pub const fn context(&self) -> &FederationContext {
        &self.ctx
    }

    #[must_use]
    pub fn receiver(&self) -> Receiver {
        Receiver::new(self.ctx.clone())
    }

    #[must_use]
    pub fn queue(&self) -> InboundQueue {
        InboundQueue::new(self.ctx.clone())
    }

    #[must_use]
    pub fn transmitter(&self) -> Transmitter {
        Transmitter::new(self.ctx.clone())
    }

    #[must_use]
    pub fn delivery(&self) -> DeliveryWorker {
        DeliveryWorker::new(self.ctx.clone())
    }

    pub async fn deliver(&self, inbox: &str) -> AppResult<DeliveryReport> {
        self.delivery().deliver_inbox(inbox).await
    }

    /// Subscribe to every configured relay.
    pub async fn subscribe_relays(&self) -> AppResult<usize> {
        let transmitter = self.transmitter();
        let mut subscribed = 0;
        for relay in &self.ctx.settings.relays {
            if transmitter.send_relay_follow(relay).await? {
                subscribed += 1;
            } else {
                warn!(relay = %relay, "Relay subscription failed");
            }
        }
        Ok(subscribed)
    }
}

#[async_trait]
impl TaskExecutor for Federation {
    async fn execute(&self, task: Task, handle: TaskHandle) -> AppResult<()> {
        debug!(task = task.name(), handle, "Executing task");
        match task {
            Task::ProcessEntry { entry_id } => {
                self.queue().process_and_dispatch(entry_id).await?;
            }
            Task::Fetch(request) => {
                let report = Fetcher::new(self.ctx.clone()).run(request, Some(handle)).await?;
                debug!(handle, ?report, "Fetch task finished");
            }
            Task::Deliver { inbox } => {
                self.deliver(&inbox).await?;
            }
        }
        Ok(())
    }

    async fn abandon(&self, task: &Task, handle: TaskHandle) -> AppResult<()> {
        match task {
            Task::ProcessEntry { entry_id } => {
                self.ctx.queue_store.set_entry_task(*entry_id, None).await?;
            }
            Task::Fetch(request) => {
                let removed = self.queue().delete_by_task(handle).await?;
                FetchQueue::new(&self.ctx).remove(&request.uri).await?;
                info!(uri = %request.uri, removed, "Fetch abandoned; dependents purged");
            }
            Task::Deliver { inbox } => {
                debug!(inbox = %inbox, "Delivery batch abandoned; targets stay pending");
            }
        }
        Ok(())
    }
}
