//! HTTP signatures for federation requests.
//!
//! Signs outgoing deliveries and verifies inbound ones following
//! draft-cavage-http-signatures with RSA-SHA256.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::HeaderMap as RequestHeaders;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::Utc;
use pkcs8::{
    DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use rsa::{
    RsaPrivateKey, RsaPublicKey,
    pkcs1v15::{SigningKey, VerifyingKey},
};
use serde_json::Value;
use sha2::{Digest, Sha256};
use signature::{SignatureEncoding, Signer, Verifier};
use tracing::{debug, warn};
use url::Url;

use crate::cache::ActorCache;
use crate::trust::SignatureVerifier;

/// HTTP Signature error.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("Signing failed: {0}")]
    SigningFailed(String),
    #[error("Verification failed: {0}")]
    VerificationFailed(String),
    #[error("Missing header: {0}")]
    MissingHeader(String),
    #[error("Invalid signature header")]
    InvalidSignatureHeader,
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Generate an RSA keypair as (private PKCS#8 PEM, public SPKI PEM).
pub fn generate_keypair() -> Result<(String, String), SignatureError> {
    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, 2048)
        .map_err(|e| SignatureError::InvalidPrivateKey(e.to_string()))?;
    let private_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| SignatureError::InvalidPrivateKey(e.to_string()))?;
    let public_pem = public_key_of(&private_key)?;
    Ok((private_pem.to_string(), public_pem))
}

/// Public key PEM matching a PKCS#8 private key PEM.
pub fn public_key_pem(private_key_pem: &str) -> Result<String, SignatureError> {
    let private_key = RsaPrivateKey::from_pkcs8_pem(private_key_pem)
        .map_err(|e| SignatureError::InvalidPrivateKey(e.to_string()))?;
    public_key_of(&private_key)
}

fn public_key_of(private_key: &RsaPrivateKey) -> Result<String, SignatureError> {
    RsaPublicKey::from(private_key)
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| SignatureError::InvalidPublicKey(e.to_string()))
}

/// HTTP Signature signer for outgoing requests.
pub struct HttpSigner {
    private_key: RsaPrivateKey,
    key_id: String,
}

impl HttpSigner {
    /// Create a new HTTP signer from a PEM-encoded private key.
    pub fn new(private_key_pem: &str, key_id: String) -> Result<Self, SignatureError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(private_key_pem)
            .map_err(|e| SignatureError::InvalidPrivateKey(e.to_string()))?;

        Ok(Self {
            private_key,
            key_id,
        })
    }

    /// Sign an HTTP request and return the signature headers.
    pub fn sign_request(
        &self,
        method: &str,
        url: &Url,
        body: Option<&[u8]>,
        additional_headers: &HashMap<String, String>,
    ) -> Result<HeaderMap, SignatureError> {
        let host = url
            .host_str()
            .ok_or_else(|| SignatureError::InvalidUrl("No host in URL".to_string()))?;
        let query = url.query().map_or(String::new(), |q| format!("?{q}"));
        let request_target = format!("{} {}{query}", method.to_lowercase(), url.path());
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let digest = body.map(calculate_digest);

        let mut signed_headers = vec!["(request-target)", "host", "date"];
        if digest.is_some() {
            signed_headers.push("digest");
        }
        let mut extra: Vec<&str> = additional_headers.keys().map(String::as_str).collect();
        extra.sort_unstable();
        for key in extra {
            if !signed_headers.contains(&key) {
                signed_headers.push(key);
            }
        }

        let signing_string = signed_headers
            .iter()
            .map(|header| {
                let value = match *header {
                    "(request-target)" => request_target.clone(),
                    "host" => host.to_string(),
                    "date" => date.clone(),
                    "digest" => digest.clone().unwrap_or_default(),
                    h => additional_headers.get(h).cloned().unwrap_or_default(),
                };
                format!("{header}: {value}")
            })
            .collect::<Vec<_>>()
            .join("\n");

        debug!(signing_string = %signing_string, "Signing string");

        let signing_key = SigningKey::<Sha256>::new(self.private_key.clone());
        let signature_bytes = signing_key
            .try_sign(signing_string.as_bytes())
            .map_err(|e| SignatureError::SigningFailed(e.to_string()))?;
        let signature_header = format!(
            "keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"{}\",signature=\"{}\"",
            self.key_id,
            signed_headers.join(" "),
            BASE64.encode(signature_bytes.to_bytes())
        );

        let mut headers = HeaderMap::new();
        headers.insert("Host", header_value(host)?);
        headers.insert("Date", header_value(&date)?);
        if let Some(d) = &digest {
            headers.insert("Digest", header_value(d)?);
        }
        headers.insert("Signature", header_value(&signature_header)?);

        for (key, value) in additional_headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| SignatureError::InvalidHeaderValue(e.to_string()))?;
            headers.insert(name, header_value(value)?);
        }

        Ok(headers)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, SignatureError> {
    HeaderValue::from_str(value).map_err(|e| SignatureError::InvalidHeaderValue(e.to_string()))
}

/// HTTP Signature verifier for incoming requests.
pub struct HttpVerifier;

impl HttpVerifier {
    /// Parse the Signature header into components.
    pub fn parse_signature_header(header: &str) -> Result<SignatureComponents, SignatureError> {
        let mut key_id = None;
        let mut algorithm = None;
        let mut headers_list = None;
        let mut signature = None;

        for part in header.split(',') {
            if let Some((key, value)) = part.trim().split_once('=') {
                let value = value.trim_matches('"');
                match key {
                    "keyId" => key_id = Some(value.to_string()),
                    "algorithm" => algorithm = Some(value.to_string()),
                    "headers" => headers_list = Some(value.to_string()),
                    "signature" => signature = Some(value.to_string()),
                    _ => {}
                }
            }
        }

        Ok(SignatureComponents {
            key_id: key_id.ok_or(SignatureError::InvalidSignatureHeader)?,
            algorithm: algorithm.unwrap_or_else(|| "rsa-sha256".to_string()),
            headers: headers_list
                .unwrap_or_else(|| "date".to_string())
                .split(' ')
                .map(String::from)
                .collect(),
            signature: signature.ok_or(SignatureError::InvalidSignatureHeader)?,
        })
    }

    /// Verify an HTTP signature using the given public key.
    pub fn verify(
        public_key_pem: &str,
        components: &SignatureComponents,
        method: &str,
        path: &str,
        headers: &HashMap<String, String>,
    ) -> Result<bool, SignatureError> {
        let public_key = RsaPublicKey::from_public_key_pem(public_key_pem)
            .map_err(|e| SignatureError::InvalidPublicKey(e.to_string()))?;

        let mut signing_parts = Vec::with_capacity(components.headers.len());
        for header in &components.headers {
            let value = match header.as_str() {
                "(request-target)" => format!("{} {path}", method.to_lowercase()),
                h => headers
                    .get(h)
                    .ok_or_else(|| SignatureError::MissingHeader(h.to_string()))?
                    .clone(),
            };
            signing_parts.push(format!("{header}: {value}"));
        }
        let signing_string = signing_parts.join("\n");

        debug!(signing_string = %signing_string, "Verifying signing string");

        let signature_bytes = BASE64
            .decode(&components.signature)
            .map_err(|e| SignatureError::VerificationFailed(e.to_string()))?;
        let signature = rsa::pkcs1v15::Signature::try_from(signature_bytes.as_slice())
            .map_err(|e| SignatureError::VerificationFailed(e.to_string()))?;

        let verifying_key = VerifyingKey::<Sha256>::new(public_key);
        match verifying_key.verify(signing_string.as_bytes(), &signature) {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(key_id = %components.key_id, error = %e, "Signature verification failed");
                Ok(false)
            }
        }
    }
}

/// Parsed signature header components.
#[derive(Debug, Clone)]
pub struct SignatureComponents {
    pub key_id: String,
    pub algorithm: String,
    pub headers: Vec<String>,
    pub signature: String,
}

/// Calculate SHA-256 digest of a body.
#[must_use]
pub fn calculate_digest(body: &[u8]) -> String {
    format!("SHA-256={}", BASE64.encode(Sha256::digest(body)))
}

/// Verify that a digest header matches the body.
#[must_use]
pub fn verify_digest(body: &[u8], digest_header: &str) -> bool {
    calculate_digest(body) == digest_header
}

/// [`SignatureVerifier`] checking HTTP signatures against cached actor keys.
///
/// Document-level signatures need linked-data canonicalization, which this
/// node does not perform; documents are therefore never credited with a signer.
#[derive(Clone)]
pub struct HttpSignatureVerifier {
    actors: ActorCache,
}

impl HttpSignatureVerifier {
    #[must_use]
    pub const fn new(actors: ActorCache) -> Self {
        Self { actors }
    }
}

#[async_trait]
impl SignatureVerifier for HttpSignatureVerifier {
    async fn signer_of(&self, body: &[u8], headers: &RequestHeaders, path: &str) -> Option<String> {
        let header = headers.get("signature").and_then(|v| v.to_str().ok())?;
        let components = match HttpVerifier::parse_signature_header(header) {
            Ok(c) => c,
            Err(e) => {
                debug!(error = %e, "Unparsable signature header");
                return None;
            }
        };

        if let Some(digest) = headers.get("digest").and_then(|v| v.to_str().ok()) {
            if !verify_digest(body, digest) {
                warn!(key_id = %components.key_id, "Digest mismatch");
                return None;
            }
        }

        let owner = components
            .key_id
            .split('#')
            .next()
            .unwrap_or(&components.key_id);
        let actor = match self.actors.get(owner).await {
            Ok(Some(actor)) => actor,
            Ok(None) => {
                debug!(key_id = %components.key_id, "Signing actor unknown");
                return None;
            }
            Err(e) => {
                warn!(key_id = %components.key_id, error = %e, "Signing actor lookup failed");
                return None;
            }
        };
        let public_key_pem = actor.public_key_pem.as_deref()?;

        let values: HashMap<String, String> = components
            .headers
            .iter()
            .filter(|h| h.as_str() != "(request-target)")
            .filter_map(|h| {
                headers
                    .get(h.as_str())
                    .and_then(|v| v.to_str().ok())
                    .map(|v| (h.clone(), v.to_string()))
            })
            .collect();

        match HttpVerifier::verify(public_key_pem, &components, "POST", path, &values) {
            Ok(true) => Some(actor.id),
            Ok(false) => None,
            Err(e) => {
                debug!(key_id = %components.key_id, error = %e, "Signature not verifiable");
                None
            }
        }
    }

    async fn document_signer_of(&self, document: &Value) -> Option<String> {
        if document.get("signature").is_some() {
            debug!("Ignoring embedded document signature");
        }
        None
    }
}
