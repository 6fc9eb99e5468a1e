//! `ActivityPub` federation engine for weft.
//!
//! Inbound activities are verified, queued and routed only once every
//! object they depend on is available locally, fetching missing ancestors
//! through a work-list instead of recursion. Locally authored items are
//! translated into `to`/`cc`/`bcc` audiences, fanned out to inboxes and
//! delivered in per-inbox batches with failure classification.
//!
//! - **Inbound**: [`receiver`], [`trust`], [`queue`], [`fetch`], [`router`], [`processor`]
//! - **Outbound**: [`transmitter`], [`delivery`], [`activities`], [`objects`]
//! - **Plumbing**: [`client`], [`signature`], [`cache`], [`tasks`], [`handler`]

pub mod activities;
pub mod cache;
pub mod client;
pub mod context;
pub mod delivery;
pub mod document;
pub mod federation;
pub mod fetch;
pub mod handler;
pub mod objects;
pub mod processor;
pub mod queue;
pub mod receiver;
pub mod router;
pub mod settings;
pub mod signature;
pub mod store;
pub mod tasks;
pub mod transmitter;
pub mod trust;

pub use cache::{
    ActorCache, CacheBackend, CacheError, CachedRemoteActor, MemoryCacheBackend,
    RedisCacheBackend,
};
pub use client::{ApClient, ApClientError, HttpTransport, PostOutcome, SenderContext};
pub use context::FederationContext;
pub use delivery::{DeliveryReport, DeliveryWorker, FailureClass, FailurePolicy};
pub use document::{IncomingActivity, ObjectKind, PUBLIC_COLLECTION, Verb};
pub use federation::Federation;
pub use fetch::{Completion, FetchQueue, FetchReport, FetchRequest, Fetcher};
pub use handler::{inbox_handler, instance_actor_handler, router, user_inbox_handler};
pub use queue::{InboundQueue, PUBLIC_RECEIVER, Processability, ProcessOutcome};
pub use receiver::{Admission, ArrivedCache, Receiver};
pub use router::Route;
pub use settings::{FederationSettings, RelayScope};
pub use signature::{
    HttpSignatureVerifier, HttpSigner, HttpVerifier, SignatureError, generate_keypair, public_key_pem,
};
pub use store::{
    AccessControl, Attachment, Contact, ContactStore, ContentStore, FollowDecision, IncomingPost,
    LocalAccount, OutgoingItem, OutgoingVerb, Reaction, ReactionKind, Report, StoredAudience,
    StoredContent, Visibility,
};
pub use tasks::{Priority, Task, TaskExecutor, TaskHandle, TaskRunner};
pub use transmitter::{InboxMap, Permissions, Transmitter};
pub use trust::{SignatureVerifier, TrustVerdict, evaluate_trust};
