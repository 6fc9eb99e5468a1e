//! Federation settings derived from the application configuration.

use url::Url;
use weft_common::{AppError, AppResult, Config, DeliveryConfig, InboxConfig};

/// Which posts arriving through a relay are admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayScope {
    All,
    Tags,
    None,
}

impl RelayScope {
    fn parse(value: &str) -> AppResult<Self> {
        match value {
            "all" => Ok(Self::All),
            "tags" => Ok(Self::Tags),
            "none" | "" => Ok(Self::None),
            other => Err(AppError::Config(format!("unknown relay scope: {other}"))),
        }
    }
}

/// Settings shared by every pipeline component.
#[derive(Debug, Clone)]
pub struct FederationSettings {
    pub base_url: Url,
    pub instance_name: String,
    pub relays: Vec<String>,
    pub relay_scope: RelayScope,
    pub relay_tags: Vec<String>,
    pub process_view: bool,
    pub store_untrusted: bool,
    pub inbox: InboxConfig,
    pub delivery: DeliveryConfig,
}

impl FederationSettings {
    /// Build settings from the loaded configuration.
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let base_url = Url::parse(&config.server.url)
            .map_err(|e| AppError::Config(format!("invalid server.url: {e}")))?;

        Ok(Self {
            base_url,
            instance_name: config.federation.instance_name.clone(),
            relays: config.federation.relays.clone(),
            relay_scope: RelayScope::parse(&config.federation.relay_scope)?,
            relay_tags: config
                .federation
                .relay_tags
                .iter()
                .map(|t| t.trim_start_matches('#').to_lowercase())
                .collect(),
            process_view: config.federation.process_view,
            store_untrusted: config.federation.store_untrusted,
            inbox: config.inbox.clone(),
            delivery: config.delivery.clone(),
        })
    }

    /// Settings with default queue and delivery tuning for the given base URL.
    pub fn with_base_url(base_url: &str) -> AppResult<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| AppError::Config(format!("invalid base url: {e}")))?;
        Ok(Self {
            base_url,
            instance_name: "weft".to_string(),
            relays: Vec::new(),
            relay_scope: RelayScope::Tags,
            relay_tags: Vec::new(),
            process_view: false,
            store_untrusted: true,
            inbox: InboxConfig::default(),
            delivery: DeliveryConfig::default(),
        })
    }

    /// Whether a URI belongs to this node.
    #[must_use]
    pub fn is_local(&self, uri: &str) -> bool {
        Url::parse(uri).is_ok_and(|u| {
            u.host_str() == self.base_url.host_str() && u.port() == self.base_url.port()
        })
    }

    /// Whether an actor is one of the configured relays.
    #[must_use]
    pub fn is_relay(&self, actor: &str) -> bool {
        self.relays.iter().any(|r| r == actor)
    }

    /// URL of the instance actor.
    #[must_use]
    pub fn instance_actor(&self) -> String {
        format!("{}/actor", self.base_url.as_str().trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_is_local_compares_host() {
        let settings = FederationSettings::with_base_url("https://weft.example").unwrap();
        assert!(settings.is_local("https://weft.example/users/1"));
        assert!(!settings.is_local("https://remote.example/users/1"));
        assert!(!settings.is_local("not a url"));
    }

    #[test]
    fn test_relay_scope_parse() {
        assert_eq!(RelayScope::parse("all").unwrap(), RelayScope::All);
        assert_eq!(RelayScope::parse("").unwrap(), RelayScope::None);
        assert!(RelayScope::parse("some").is_err());
    }

    #[test]
    fn test_instance_actor() {
        let settings = FederationSettings::with_base_url("https://weft.example/").unwrap();
        assert_eq!(settings.instance_actor(), "https://weft.example/actor");
    }
}
