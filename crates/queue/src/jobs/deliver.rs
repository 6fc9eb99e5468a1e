//! Per-inbox delivery job.

use serde::{Deserialize, Serialize};

/// Job to deliver every pending target of one inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverJob {
    /// Target inbox URL.
    pub inbox: String,
}

impl DeliverJob {
    /// Create a new deliver job.
    #[must_use]
    pub fn new(inbox: impl Into<String>) -> Self {
        Self {
            inbox: inbox.into(),
        }
    }
}
