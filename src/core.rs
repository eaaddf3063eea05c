//! Core domain types and service traits for TermWatch
//!
//! This module defines the fundamental data structures and trait contracts
//! that govern component interactions throughout the application.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Timestamp format used for match records and audit log lines.
pub const TIMESTAMP_FORMAT: &str = "%m/%d/%y %H:%M:%S";

/// A single certificate-update observed on the transparency stream.
///
/// The first domain is the leaf certificate's primary name; the remainder
/// are its subject-alternative names. The list may be empty.
#[derive(Debug, Clone, PartialEq)]
pub struct CertificateEvent {
    pub domains: Vec<String>,
    pub observed_at: DateTime<Local>,
}

impl CertificateEvent {
    /// Creates an event observed now. Used by the stream client and tests.
    pub fn new(domains: Vec<String>) -> Self {
        Self {
            domains,
            observed_at: Local::now(),
        }
    }

    /// Formats the observation time the way records and audit lines carry it.
    pub fn timestamp(&self) -> String {
        self.observed_at.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// The outcome of evaluating one event against the term snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermMatch {
    /// Canonical domain to record (primary name, port suffix stripped).
    pub domain: String,
    /// The watchlist term that matched. First match wins; later terms are
    /// not consulted even if they would also match.
    pub matched_term: String,
}

/// The durable record of a domain's first match against the watchlist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchRecord {
    pub id: i64,
    pub timestamp: String,
    pub domain: String,
    pub term: String,
    /// JSON-serialized [`EnrichmentOutcome`], populated once the registrant
    /// lookup for a fresh match completes.
    pub enrichment: Option<String>,
}

/// Result of an atomic record-if-absent against the match store.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    /// The domain had not been seen before; a record was created.
    Inserted(MatchRecord),
    /// The domain already has a record; nothing was written.
    AlreadyPresent,
}

/// Registrant metadata extracted from an RDAP domain response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistrantInfo {
    /// Registry handle for the domain object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    /// Name of the sponsoring registrar, when the response carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registrar: Option<String>,
    /// Registration date, as reported by the registry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    /// Expiration date, as reported by the registry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    /// EPP status strings (e.g. "client transfer prohibited").
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<String>,
}

/// A typed failure from the registrant lookup collaborator.
///
/// Failures are captured as data and stored alongside the match record, so
/// a record is never silently missing its enrichment field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnrichmentFailure {
    #[error("domain has no registration")]
    NoSuchRegistration,
    #[error("lookup timed out")]
    Timeout,
    #[error("malformed response: {detail}")]
    MalformedResponse { detail: String },
    #[error("lookup failed: {detail}")]
    LookupFailed { detail: String },
}

/// What the enrichment collaborator returned for a domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnrichmentOutcome {
    Registered {
        #[serde(flatten)]
        info: RegistrantInfo,
    },
    Failed {
        reason: EnrichmentFailure,
    },
}

impl EnrichmentOutcome {
    /// Serializes the outcome for the store's enrichment column.
    pub fn to_payload(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"status":"failed","reason":{"kind":"lookup_failed","detail":"unserializable outcome"}}"#.to_string())
    }
}

// =============================================================================
// Service Traits
// =============================================================================

/// Looks up registrant metadata for a first-seen domain.
///
/// Implementations must bound the call with a timeout; the pipeline never
/// waits on an unbounded lookup.
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    /// Retrieves registrant data for a domain.
    ///
    /// Never fails in the `Result` sense: lookup problems are part of the
    /// outcome and end up persisted with the record.
    async fn enrich(&self, domain: &str) -> EnrichmentOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_payload_roundtrip() {
        let outcome = EnrichmentOutcome::Registered {
            info: RegistrantInfo {
                handle: Some("EXAMPLE-1".to_string()),
                registrar: Some("Example Registrar".to_string()),
                created: Some("2024-01-01T00:00:00Z".to_string()),
                expires: None,
                statuses: vec!["active".to_string()],
            },
        };

        let payload = outcome.to_payload();
        let parsed: EnrichmentOutcome = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed, outcome);
    }

    #[test]
    fn failure_payload_carries_kind() {
        let outcome = EnrichmentOutcome::Failed {
            reason: EnrichmentFailure::Timeout,
        };
        let payload = outcome.to_payload();
        assert!(payload.contains(r#""status":"failed""#));
        assert!(payload.contains(r#""kind":"timeout""#));
    }
}
