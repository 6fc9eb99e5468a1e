//! Trust verdicts for inbound activities.

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde_json::Value;

use crate::document::{IncomingActivity, Verb};

/// Extracts signer identities from a request and its document.
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    /// Actor whose key produced a valid transport signature on the request.
    async fn signer_of(&self, body: &[u8], headers: &HeaderMap, path: &str) -> Option<String>;

    /// Actor whose key produced a valid signature embedded in the document.
    async fn document_signer_of(&self, document: &Value) -> Option<String>;
}

/// Outcome of trust evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustVerdict {
    pub trusted: bool,
    /// Identities the verdict vouches for.
    pub signers: Vec<String>,
}

impl TrustVerdict {
    fn trusted(signers: Vec<String>) -> Self {
        Self {
            trusted: true,
            signers,
        }
    }

    fn untrusted() -> Self {
        Self {
            trusted: false,
            signers: Vec::new(),
        }
    }

    /// Primary signer, used as the queue entry's signer.
    #[must_use]
    pub fn signer(&self) -> Option<&str> {
        self.signers.first().map(String::as_str)
    }

    /// Whether the verdict covers the activity's actor and, for content
    /// it introduces, the content's author.
    #[must_use]
    pub fn covers(&self, activity: &IncomingActivity) -> bool {
        if !self.trusted || !self.signers.contains(&activity.actor) {
            return false;
        }
        if matches!(activity.verb, Verb::Create | Verb::Update | Verb::Invite) {
            if let Some(author) = &activity.attributed_to {
                return self.signers.contains(author);
            }
        }
        true
    }
}

/// Evaluate trust from the transport signer, the document signer and the
/// claimed actor.
///
/// Rules are applied in order:
/// 1. document signer equals transport signer
/// 2. document signer differs, transport signer is the actor
/// 3. document signer present, transport signer absent or foreign: trusted
///    for the document signer only
/// 4. no document signer, transport signer is the actor
/// 5. anything else is untrusted
#[must_use]
pub fn evaluate_trust(
    transport_signer: Option<&str>,
    document_signer: Option<&str>,
    actor: &str,
) -> TrustVerdict {
    match (document_signer, transport_signer) {
        (Some(ld), Some(http)) if ld == http => TrustVerdict::trusted(vec![ld.to_string()]),
        (Some(ld), Some(http)) if http == actor => {
            TrustVerdict::trusted(vec![http.to_string(), ld.to_string()])
        }
        (Some(ld), _) => TrustVerdict::trusted(vec![ld.to_string()]),
        (None, Some(http)) if http == actor => TrustVerdict::trusted(vec![http.to_string()]),
        (None, _) => TrustVerdict::untrusted(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    const ALICE: &str = "https://remote.example/users/alice";
    const RELAY: &str = "https://relay.example/actor";

    #[test]
    fn test_matching_signers_are_trusted() {
        let verdict = evaluate_trust(Some(ALICE), Some(ALICE), ALICE);
        assert!(verdict.trusted);
        assert_eq!(verdict.signers, vec![ALICE]);
    }

    #[test]
    fn test_transport_vouches_for_actor_with_foreign_document_signature() {
        let verdict = evaluate_trust(Some(RELAY), Some(ALICE), RELAY);
        assert!(verdict.trusted);
        assert_eq!(verdict.signers, vec![RELAY, ALICE]);
    }

    #[test]
    fn test_document_signer_alone_is_trusted_for_itself() {
        let verdict = evaluate_trust(None, Some(ALICE), RELAY);
        assert!(verdict.trusted);
        assert_eq!(verdict.signer(), Some(ALICE));
    }

    #[test]
    fn test_transport_only() {
        assert!(evaluate_trust(Some(ALICE), None, ALICE).trusted);
        assert!(!evaluate_trust(Some(RELAY), None, ALICE).trusted);
        assert!(!evaluate_trust(None, None, ALICE).trusted);
    }

    #[test]
    fn test_covers_requires_actor_and_author() {
        let activity = IncomingActivity::parse(json!({
            "id": "https://remote.example/activities/1",
            "type": "Create",
            "actor": ALICE,
            "object": {
                "id": "https://remote.example/notes/1",
                "type": "Note",
                "attributedTo": "https://remote.example/users/mallory"
            }
        }))
        .unwrap();

        assert!(!evaluate_trust(Some(ALICE), None, ALICE).covers(&activity));
        assert!(!evaluate_trust(None, Some(RELAY), ALICE).covers(&activity));
    }
}
