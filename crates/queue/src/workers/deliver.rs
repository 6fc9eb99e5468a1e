//! Deliver worker.

use std::sync::Arc;

use apalis::prelude::*;
use tracing::{error, info};
use weft_federation::Federation;

use crate::jobs::DeliverJob;

/// Context for the deliver worker.
#[derive(Clone)]
pub struct DeliverContext {
    /// Engine whose delivery worker runs the batch.
    pub federation: Federation,
}

impl DeliverContext {
    #[must_use]
    pub const fn new(federation: Federation) -> Self {
        Self { federation }
    }
}

/// Worker function running one delivery batch.
///
/// Failed targets stay pending for the next sweep, so the job itself only
/// fails when the batch could not run at all.
///
/// # Errors
/// Returns an error if the store or transport failed outside of a delivery
/// attempt.
pub async fn deliver_worker(job: DeliverJob, ctx: Data<DeliverContext>) -> Result<(), Error> {
    match ctx.federation.deliver(&job.inbox).await {
        Ok(report) => {
            info!(inbox = %job.inbox, ?report, "Delivery job finished");
            Ok(())
        }
        Err(e) => {
            error!(inbox = %job.inbox, error = %e, "Delivery job failed");
            Err(Error::Failed(Arc::new(Box::new(e))))
        }
    }
}
