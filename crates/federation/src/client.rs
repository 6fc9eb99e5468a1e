//! HTTP transport for delivering activities and fetching remote objects.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;
use weft_common::{AppError, AppResult};

use crate::signature::{HttpSigner, SignatureError};

const ACTIVITY_ACCEPT: &str = "application/activity+json, application/ld+json; profile=\"https://www.w3.org/ns/activitystreams\"";

/// Error type for AP client operations.
#[derive(Debug, thiserror::Error)]
pub enum ApClientError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Signing failed: {0}")]
    SigningError(#[from] SignatureError),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Unexpected status: {status}")]
    UnexpectedStatus { status: u16 },
}

impl From<ApClientError> for AppError {
    fn from(err: ApClientError) -> Self {
        Self::ExternalService(err.to_string())
    }
}

/// Key material of the account a request is sent on behalf of.
#[derive(Debug, Clone)]
pub struct SenderContext {
    pub key_id: String,
    pub private_key_pem: String,
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostOutcome {
    pub success: bool,
    /// HTTP status, `0` when no response was received.
    pub status: u16,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl PostOutcome {
    /// Outcome with the given status and no delay.
    #[must_use]
    pub fn with_status(status: u16) -> Self {
        Self {
            success: (200..300).contains(&status),
            status,
            timed_out: false,
            elapsed: Duration::ZERO,
        }
    }
}

/// Outbound HTTP used by the pipeline.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// POST a signed document to an inbox. Never fails; failures are reported
    /// in the outcome.
    async fn post(&self, document: &Value, inbox: &str, sender: &SenderContext) -> PostOutcome;

    /// GET a remote object. `Ok(None)` means the object is gone.
    async fn fetch(&self, url: &str) -> AppResult<Option<Value>>;
}

/// reqwest-backed [`HttpTransport`].
#[derive(Clone)]
pub struct ApClient {
    client: Client,
    user_agent: String,
}

impl ApClient {
    /// Create a new AP client.
    pub fn new(instance_url: &str, timeout: Duration) -> Result<Self, ApClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let user_agent = format!("weft/{} (+{instance_url})", env!("CARGO_PKG_VERSION"));

        Ok(Self { client, user_agent })
    }

    async fn try_post(
        &self,
        document: &Value,
        inbox: &str,
        sender: &SenderContext,
    ) -> Result<u16, ApClientError> {
        let url = Url::parse(inbox).map_err(|e| ApClientError::InvalidUrl(e.to_string()))?;
        let body = serde_json::to_vec(document)
            .map_err(|e| ApClientError::InvalidUrl(format!("unserializable document: {e}")))?;

        let signer = HttpSigner::new(&sender.private_key_pem, sender.key_id.clone())?;
        let mut additional_headers = HashMap::new();
        additional_headers.insert(
            "content-type".to_string(),
            "application/activity+json".to_string(),
        );
        let headers = signer.sign_request("POST", &url, Some(&body), &additional_headers)?;

        debug!(
            inbox = %inbox,
            activity_type = document.get("type").and_then(Value::as_str).unwrap_or("Unknown"),
            "Delivering activity"
        );

        let response = self
            .client
            .post(url)
            .headers(headers)
            .header("User-Agent", &self.user_agent)
            .header("Accept", ACTIVITY_ACCEPT)
            .body(body)
            .send()
            .await?;

        Ok(response.status().as_u16())
    }
}

#[async_trait]
impl HttpTransport for ApClient {
    async fn post(&self, document: &Value, inbox: &str, sender: &SenderContext) -> PostOutcome {
        let started = Instant::now();
        match self.try_post(document, inbox, sender).await {
            Ok(status) => {
                let outcome = PostOutcome {
                    success: (200..300).contains(&status),
                    status,
                    timed_out: false,
                    elapsed: started.elapsed(),
                };
                if outcome.success {
                    info!(inbox = %inbox, status, "Activity delivered");
                } else {
                    warn!(inbox = %inbox, status, "Activity delivery failed");
                }
                outcome
            }
            Err(e) => {
                let timed_out = matches!(&e, ApClientError::HttpError(err) if err.is_timeout());
                warn!(inbox = %inbox, error = %e, timed_out, "Activity delivery failed");
                PostOutcome {
                    success: false,
                    status: 0,
                    timed_out,
                    elapsed: started.elapsed(),
                }
            }
        }
    }

    async fn fetch(&self, url: &str) -> AppResult<Option<Value>> {
        debug!(url = %url, "Fetching remote object");

        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .header("Accept", ACTIVITY_ACCEPT)
            .send()
            .await
            .map_err(ApClientError::from)?;

        let status = response.status();
        if status.as_u16() == 404 || status.as_u16() == 410 {
            info!(url = %url, status = %status, "Remote object is gone");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ApClientError::UnexpectedStatus {
                status: status.as_u16(),
            }
            .into());
        }

        let object: Value = response.json().await.map_err(ApClientError::from)?;
        Ok(Some(object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_with_status() {
        assert!(PostOutcome::with_status(202).success);
        assert!(!PostOutcome::with_status(503).success);
        assert_eq!(PostOutcome::with_status(404).status, 404);
    }

    #[test]
    fn test_client_error_maps_to_external_service() {
        let err: AppError = ApClientError::UnexpectedStatus { status: 500 }.into();
        assert!(matches!(err, AppError::ExternalService(_)));
    }
}
