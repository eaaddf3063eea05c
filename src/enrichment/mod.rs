//! Registrant enrichment for first-seen matches.
//!
//! The pipeline consults the enrichment collaborator exactly once per fresh
//! match; its outcome (data or typed failure) is persisted with the record.

pub mod rdap;

pub use rdap::RdapClient;

use crate::core::{EnrichmentFailure, EnrichmentOutcome, EnrichmentProvider};
use async_trait::async_trait;

/// An `EnrichmentProvider` that performs no lookup.
///
/// Used when enrichment is disabled and in tests; records still receive an
/// explicit marker instead of silently missing the field.
#[derive(Debug, Clone, Default)]
pub struct NullEnrichmentProvider;

#[async_trait]
impl EnrichmentProvider for NullEnrichmentProvider {
    async fn enrich(&self, _domain: &str) -> EnrichmentOutcome {
        EnrichmentOutcome::Failed {
            reason: EnrichmentFailure::LookupFailed {
                detail: "enrichment disabled".to_string(),
            },
        }
    }
}
