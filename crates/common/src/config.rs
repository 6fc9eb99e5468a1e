//! Application configuration.

use serde::Deserialize;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Redis configuration.
    pub redis: RedisConfig,
    /// Federation configuration.
    pub federation: FederationConfig,
    /// Inbound queue configuration.
    #[serde(default)]
    pub inbox: InboxConfig,
    /// Outbound delivery configuration.
    #[serde(default)]
    pub delivery: DeliveryConfig,
    /// Actor metadata cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of this instance.
    pub url: String,
    /// `text` or `json` log output.
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    pub url: String,
    /// Key prefix for all Redis keys.
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
}

/// Federation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    /// Whether federation is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Instance name.
    pub instance_name: String,
    /// Relay actors this node subscribes to.
    #[serde(default)]
    pub relays: Vec<String>,
    /// Which relayed posts are accepted: `all`, `tags` or `none`.
    #[serde(default = "default_relay_scope")]
    pub relay_scope: String,
    /// Hashtags accepted from relays when `relay_scope` is `tags`.
    #[serde(default)]
    pub relay_tags: Vec<String>,
    /// Route `View` activities instead of dropping them.
    #[serde(default)]
    pub process_view: bool,
    /// Queue untrusted content activities pending an origin fetch.
    #[serde(default = "default_true")]
    pub store_untrusted: bool,
    /// PEM file holding the instance actor's private key; created on first start.
    #[serde(default = "default_instance_key_path")]
    pub instance_key_path: String,
}

/// Inbound queue configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct InboxConfig {
    /// Days an entry without a task handle is kept before the reaper removes it.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Delay before a pushed activity is processed, so receivers can accumulate.
    #[serde(default = "default_process_delay_secs")]
    pub process_delay_secs: u64,
    /// Interval of the `process_all` sweep.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Interval of the retention reaper.
    #[serde(default = "default_clear_interval_secs")]
    pub clear_interval_secs: u64,
    /// Process pushed activities on a worker instead of inside the request.
    #[serde(default = "default_true")]
    pub decoupled: bool,
    /// Seconds a recently arrived activity id is remembered.
    #[serde(default = "default_arrived_window_secs")]
    pub arrived_window_secs: u64,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            process_delay_secs: default_process_delay_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            clear_interval_secs: default_clear_interval_secs(),
            decoupled: true,
            arrived_window_secs: default_arrived_window_secs(),
        }
    }
}

/// Outbound delivery configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Failed attempts after which a delivery target is dropped.
    #[serde(default = "default_max_failures")]
    pub max_failures: i32,
    /// Network timeout of a delivery request.
    #[serde(default = "default_network_timeout_secs")]
    pub network_timeout_secs: u64,
    /// Timeout budget for signature and discovery lookups.
    #[serde(default = "default_signature_timeout_secs")]
    pub signature_timeout_secs: u64,
    /// Receivers whose metadata is refreshed after a delivery pass.
    #[serde(default = "default_refresh_receivers_limit")]
    pub refresh_receivers_limit: usize,
    /// Days of uninterrupted failure before an inbox is archived.
    #[serde(default = "default_archive_after_days")]
    pub archive_after_days: i64,
    /// Interval of the delivery sweep.
    #[serde(default = "default_delivery_sweep_secs")]
    pub sweep_interval_secs: u64,
    /// Address every non-public recipient by blind copy.
    #[serde(default)]
    pub always_bcc: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_failures: default_max_failures(),
            network_timeout_secs: default_network_timeout_secs(),
            signature_timeout_secs: default_signature_timeout_secs(),
            refresh_receivers_limit: default_refresh_receivers_limit(),
            archive_after_days: default_archive_after_days(),
            sweep_interval_secs: default_delivery_sweep_secs(),
            always_bcc: false,
        }
    }
}

/// Actor metadata cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// `memory` or `redis`.
    #[serde(default = "default_cache_backend")]
    pub backend: String,
    /// Lifetime of a cached actor document.
    #[serde(default = "default_actor_ttl_secs")]
    pub actor_ttl_secs: u64,
    /// Lifetime of a negative lookup entry.
    #[serde(default = "default_failed_lookup_ttl_secs")]
    pub failed_lookup_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            actor_ttl_secs: default_actor_ttl_secs(),
            failed_lookup_ttl_secs: default_failed_lookup_ttl_secs(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

fn default_log_format() -> String {
    "text".to_string()
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

fn default_redis_prefix() -> String {
    "weft".to_string()
}

const fn default_true() -> bool {
    true
}

fn default_instance_key_path() -> String {
    "instance_key.pem".to_string()
}

fn default_relay_scope() -> String {
    "tags".to_string()
}

const fn default_retention_days() -> u32 {
    7
}

const fn default_process_delay_secs() -> u64 {
    5
}

const fn default_sweep_interval_secs() -> u64 {
    300
}

const fn default_clear_interval_secs() -> u64 {
    3600
}

const fn default_arrived_window_secs() -> u64 {
    60
}

const fn default_max_failures() -> i32 {
    15
}

const fn default_network_timeout_secs() -> u64 {
    30
}

const fn default_signature_timeout_secs() -> u64 {
    20
}

const fn default_refresh_receivers_limit() -> usize {
    10
}

const fn default_archive_after_days() -> i64 {
    7
}

const fn default_delivery_sweep_secs() -> u64 {
    600
}

fn default_cache_backend() -> String {
    "memory".to_string()
}

const fn default_actor_ttl_secs() -> u64 {
    24 * 60 * 60
}

const fn default_failed_lookup_ttl_secs() -> u64 {
    5 * 60
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `WEFT_ENV`)
    /// 3. Environment variables with `WEFT_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("WEFT_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("WEFT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("WEFT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(source: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults_fill_pipeline_sections() {
        let config = from_toml(
            r#"
            [server]
            url = "https://weft.example"
            [database]
            url = "postgres://localhost/weft"
            [redis]
            url = "redis://localhost"
            [federation]
            instance_name = "weft"
            "#,
        );

        assert_eq!(config.inbox.retention_days, 7);
        assert_eq!(config.delivery.refresh_receivers_limit, 10);
        assert_eq!(config.delivery.max_failures, 15);
        assert_eq!(config.cache.actor_ttl_secs, 86_400);
        assert!(config.federation.store_untrusted);
        assert_eq!(config.federation.relay_scope, "tags");
        assert_eq!(config.federation.instance_key_path, "instance_key.pem");
    }

    #[test]
    fn test_overrides_are_respected() {
        let config = from_toml(
            r#"
            [server]
            url = "https://weft.example"
            log_format = "json"
            [database]
            url = "postgres://localhost/weft"
            [redis]
            url = "redis://localhost"
            [federation]
            instance_name = "weft"
            relays = ["https://relay.example/actor"]
            [delivery]
            max_failures = 3
            "#,
        );

        assert_eq!(config.server.log_format, "json");
        assert_eq!(config.federation.relays.len(), 1);
        assert_eq!(config.delivery.max_failures, 3);
        assert_eq!(config.delivery.network_timeout_secs, 30);
    }
}
