//! Remote actor metadata cache.
//!
//! Inbox resolution, signature verification and delivery all need the
//! inbox, shared inbox and key of remote actors. [`ActorCache`] fetches
//! actor documents on demand, keeps them for a configurable TTL and
//! remembers failed lookups for a shorter one. Update activities on an actor
//! invalidate its entry.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use fred::clients::Client as RedisClient;
use fred::interfaces::KeysInterface;
use fred::types::Expiration;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;
use weft_common::{AppError, AppResult, CacheConfig};

use crate::client::HttpTransport;
use crate::document::{id_list, id_of};

/// Cached remote actor data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedRemoteActor {
    /// Actor's `ActivityPub` ID (URL)
    pub id: String,
    /// Actor type (Person, Service, etc.)
    pub actor_type: String,
    pub preferred_username: Option<String>,
    pub inbox: String,
    pub shared_inbox: Option<String>,
    pub followers: Option<String>,
    pub public_key_id: Option<String>,
    pub public_key_pem: Option<String>,
    /// Previous addresses the actor claims (`alsoKnownAs`).
    #[serde(default)]
    pub also_known_as: Vec<String>,
    /// Host domain
    pub host: String,
    pub cached_at: chrono::DateTime<chrono::Utc>,
}

impl CachedRemoteActor {
    /// Create a cached actor from a raw actor document.
    #[must_use]
    pub fn from_json(json: &Value) -> Option<Self> {
        let id = json.get("id")?.as_str()?.to_string();
        let host = Url::parse(&id).ok()?.host_str()?.to_string();
        let actor_type = json.get("type")?.as_str()?.to_string();
        let inbox = json.get("inbox")?.as_str()?.to_string();

        let shared_inbox = json
            .get("endpoints")
            .and_then(|e| e.get("sharedInbox"))
            .or_else(|| json.get("sharedInbox"))
            .and_then(Value::as_str)
            .map(String::from);

        let public_key = json.get("publicKey");

        Some(Self {
            id,
            actor_type,
            preferred_username: json
                .get("preferredUsername")
                .and_then(Value::as_str)
                .map(String::from),
            inbox,
            shared_inbox,
            followers: id_of(json.get("followers")),
            public_key_id: public_key.and_then(|k| id_of(k.get("id"))),
            public_key_pem: public_key
                .and_then(|k| k.get("publicKeyPem"))
                .and_then(Value::as_str)
                .map(String::from),
            also_known_as: id_list(json.get("alsoKnownAs")),
            host,
            cached_at: chrono::Utc::now(),
        })
    }

    /// Check if this cache entry is stale.
    #[must_use]
    pub fn is_stale(&self, ttl_secs: i64) -> bool {
        chrono::Utc::now()
            .signed_duration_since(self.cached_at)
            .num_seconds()
            > ttl_secs
    }
}

/// Cache error type.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Redis(msg) => Self::Redis(msg),
            CacheError::Serialization(msg) => Self::Internal(msg),
        }
    }
}

/// Key/value storage behind [`ActorCache`].
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl_secs: i64) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// In-process cache backend.
#[derive(Default)]
pub struct MemoryCacheBackend {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCacheBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((_, expires)) if *expires <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl_secs: i64) -> Result<(), CacheError> {
        let ttl = Duration::from_secs(u64::try_from(ttl_secs).unwrap_or(0));
        self.entries
            .lock()
            .await
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// Redis cache backend.
#[derive(Clone)]
pub struct RedisCacheBackend {
    redis: Arc<RedisClient>,
    prefix: String,
}

impl RedisCacheBackend {
    #[must_use]
    pub const fn new(redis: Arc<RedisClient>, prefix: String) -> Self {
        Self { redis, prefix }
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{key}", self.prefix)
    }
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.redis
            .get(self.key(key))
            .await
            .map_err(|e| CacheError::Redis(e.to_string()))
    }

    async fn set(&self, key: &str, value: String, ttl_secs: i64) -> Result<(), CacheError> {
        self.redis
            .set::<(), _, _>(
                self.key(key),
                value,
                Some(Expiration::EX(ttl_secs)),
                None,
                false,
            )
            .await
            .map_err(|e| CacheError::Redis(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.redis
            .del::<(), _>(self.key(key))
            .await
            .map_err(|e| CacheError::Redis(e.to_string()))
    }
}

/// Remote actor cache with TTL and negative caching.
#[derive(Clone)]
pub struct ActorCache {
    backend: Arc<dyn CacheBackend>,
    transport: Arc<dyn HttpTransport>,
    ttl_secs: i64,
    failed_ttl_secs: i64,
}

impl ActorCache {
    #[must_use]
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        transport: Arc<dyn HttpTransport>,
        config: &CacheConfig,
    ) -> Self {
        Self {
            backend,
            transport,
            ttl_secs: i64::try_from(config.actor_ttl_secs).unwrap_or(i64::MAX),
            failed_ttl_secs: i64::try_from(config.failed_lookup_ttl_secs).unwrap_or(i64::MAX),
        }
    }

    fn cache_key(actor_url: &str) -> String {
        format!("remote_actor:{actor_url}")
    }

    fn failed_key(actor_url: &str) -> String {
        format!("remote_actor_failed:{actor_url}")
    }

    /// Cached entry only; never touches the network.
    pub async fn cached(&self, actor_url: &str) -> AppResult<Option<CachedRemoteActor>> {
        let Some(json_str) = self.backend.get(&Self::cache_key(actor_url)).await? else {
            return Ok(None);
        };
        let actor: CachedRemoteActor = serde_json::from_str(&json_str)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;

        if actor.is_stale(self.ttl_secs) {
            debug!(actor_url = %actor_url, "Cache entry is stale");
            return Ok(None);
        }
        Ok(Some(actor))
    }

    /// Cached entry, fetching the actor document on a miss.
    pub async fn get(&self, actor_url: &str) -> AppResult<Option<CachedRemoteActor>> {
        if let Some(actor) = self.cached(actor_url).await? {
            debug!(actor_url = %actor_url, "Cache hit for remote actor");
            return Ok(Some(actor));
        }
        if self.backend.get(&Self::failed_key(actor_url)).await?.is_some() {
            debug!(actor_url = %actor_url, "Actor lookup recently failed");
            return Ok(None);
        }

        let fetched = match self.transport.fetch(actor_url).await {
            Ok(doc) => doc.as_ref().and_then(CachedRemoteActor::from_json),
            Err(e) => {
                warn!(actor_url = %actor_url, error = %e, "Failed to fetch remote actor");
                None
            }
        };

        match fetched {
            Some(actor) => {
                self.put(&actor).await?;
                Ok(Some(actor))
            }
            None => {
                self.backend
                    .set(&Self::failed_key(actor_url), "1".to_string(), self.failed_ttl_secs)
                    .await?;
                warn!(actor_url = %actor_url, "Marked actor lookup as failed");
                Ok(None)
            }
        }
    }

    /// Store an actor.
    pub async fn put(&self, actor: &CachedRemoteActor) -> AppResult<()> {
        let json_str =
            serde_json::to_string(actor).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.backend
            .set(&Self::cache_key(&actor.id), json_str, self.ttl_secs)
            .await?;
        debug!(actor_url = %actor.id, host = %actor.host, "Cached remote actor");
        Ok(())
    }

    /// Drop the cached entry and any negative entry for an actor.
    pub async fn invalidate(&self, actor_url: &str) -> AppResult<()> {
        self.backend.delete(&Self::cache_key(actor_url)).await?;
        self.backend.delete(&Self::failed_key(actor_url)).await?;
        info!(actor_url = %actor_url, "Invalidated cached remote actor");
        Ok(())
    }

    /// Invalidate and fetch again.
    pub async fn refresh(&self, actor_url: &str) -> AppResult<Option<CachedRemoteActor>> {
        self.invalidate(actor_url).await?;
        self.get(actor_url).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::client::{PostOutcome, SenderContext};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTransport {
        fetches: AtomicUsize,
        document: Option<Value>,
    }

    #[async_trait]
    impl HttpTransport for CountingTransport {
        async fn post(&self, _: &Value, _: &str, _: &SenderContext) -> PostOutcome {
            PostOutcome::with_status(202)
        }

        async fn fetch(&self, _: &str) -> AppResult<Option<Value>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.document.clone())
        }
    }

    fn actor_json() -> Value {
        json!({
            "id": "https://remote.example/users/alice",
            "type": "Person",
            "preferredUsername": "alice",
            "inbox": "https://remote.example/users/alice/inbox",
            "followers": "https://remote.example/users/alice/followers",
            "endpoints": {"sharedInbox": "https://remote.example/inbox"},
            "publicKey": {
                "id": "https://remote.example/users/alice#main-key",
                "publicKeyPem": "-----BEGIN PUBLIC KEY-----\nMIIB...\n-----END PUBLIC KEY-----"
            }
        })
    }

    fn cache(document: Option<Value>) -> (ActorCache, Arc<CountingTransport>) {
        let transport = Arc::new(CountingTransport {
            fetches: AtomicUsize::new(0),
            document,
        });
        let cache = ActorCache::new(
            Arc::new(MemoryCacheBackend::new()),
            transport.clone(),
            &CacheConfig::default(),
        );
        (cache, transport)
    }

    #[test]
    fn test_from_json_reads_endpoints() {
        let actor = CachedRemoteActor::from_json(&actor_json()).unwrap();
        assert_eq!(actor.host, "remote.example");
        assert_eq!(actor.shared_inbox.as_deref(), Some("https://remote.example/inbox"));
        assert_eq!(
            actor.public_key_id.as_deref(),
            Some("https://remote.example/users/alice#main-key")
        );
    }

    #[test]
    fn test_from_json_minimal_relay() {
        let actor = CachedRemoteActor::from_json(&json!({
            "id": "https://relay.example/actor",
            "type": "Application",
            "inbox": "https://relay.example/inbox"
        }))
        .unwrap();
        assert!(actor.shared_inbox.is_none());
        assert!(actor.public_key_pem.is_none());
        assert!(actor.also_known_as.is_empty());
    }

    #[test]
    fn test_from_json_reads_previous_addresses() {
        let mut json = actor_json();
        json["alsoKnownAs"] = json!("https://old.example/users/alice");
        let actor = CachedRemoteActor::from_json(&json).unwrap();
        assert_eq!(actor.also_known_as, vec!["https://old.example/users/alice"]);

        let mut cached = serde_json::to_value(&actor).unwrap();
        cached.as_object_mut().unwrap().remove("also_known_as");
        let restored: CachedRemoteActor = serde_json::from_value(cached).unwrap();
        assert!(restored.also_known_as.is_empty());
    }

    #[tokio::test]
    async fn test_get_fetches_once_then_hits_cache() {
        let (cache, transport) = cache(Some(actor_json()));
        let url = "https://remote.example/users/alice";

        assert!(cache.get(url).await.unwrap().is_some());
        assert!(cache.get(url).await.unwrap().is_some());
        assert_eq!(transport.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_lookup_is_negatively_cached() {
        let (cache, transport) = cache(None);
        let url = "https://gone.example/users/bob";

        assert!(cache.get(url).await.unwrap().is_none());
        assert!(cache.get(url).await.unwrap().is_none());
        assert_eq!(transport.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_refetches() {
        let (cache, transport) = cache(Some(actor_json()));
        let url = "https://remote.example/users/alice";

        cache.get(url).await.unwrap();
        cache.refresh(url).await.unwrap();
        assert_eq!(transport.fetches.load(Ordering::SeqCst), 2);
    }
}
