//! Shared handles of the federation pipeline.

use std::sync::Arc;

use weft_db::{DeliveryTargetStore, FetchTaskStore, InboxQueueStore, InboxStatusStore};

use crate::cache::ActorCache;
use crate::client::HttpTransport;
use crate::receiver::ArrivedCache;
use crate::settings::FederationSettings;
use crate::store::{ContactStore, ContentStore};
use crate::tasks::TaskRunner;
use crate::trust::SignatureVerifier;

/// Everything a pipeline component may need, cheap to clone.
#[derive(Clone)]
pub struct FederationContext {
    pub settings: Arc<FederationSettings>,
    pub queue_store: Arc<dyn InboxQueueStore>,
    pub fetch_store: Arc<dyn FetchTaskStore>,
    pub delivery_store: Arc<dyn DeliveryTargetStore>,
    pub status_store: Arc<dyn InboxStatusStore>,
    pub content: Arc<dyn ContentStore>,
    pub contacts: Arc<dyn ContactStore>,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub transport: Arc<dyn HttpTransport>,
    pub runner: Arc<dyn TaskRunner>,
    pub actors: ActorCache,
    pub arrived: Arc<ArrivedCache>,
}
