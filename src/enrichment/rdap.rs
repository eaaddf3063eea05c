//! RDAP-based registrant lookups.
//!
//! One HTTPS query per first-seen domain against an RDAP bootstrap service.
//! The request runs on the blocking pool with a hard timeout; every failure
//! mode maps to a typed outcome rather than an error.

use crate::core::{EnrichmentFailure, EnrichmentOutcome, EnrichmentProvider, RegistrantInfo};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tokio::task;
use tracing::{debug, error};

/// Registrant lookup client speaking RDAP (`GET {base}/domain/{name}`).
pub struct RdapClient {
    base_url: String,
    timeout: Duration,
}

impl RdapClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
        }
    }

    fn lookup_url(&self, domain: &str) -> String {
        format!("{}/domain/{}", self.base_url.trim_end_matches('/'), domain)
    }

    /// Performs the request on the calling (blocking) thread.
    fn send_request(url: &str, timeout: Duration) -> EnrichmentOutcome {
        let client = match reqwest::blocking::Client::builder().timeout(timeout).build() {
            Ok(client) => client,
            Err(e) => {
                return EnrichmentOutcome::Failed {
                    reason: EnrichmentFailure::LookupFailed {
                        detail: format!("failed to build HTTP client: {e}"),
                    },
                }
            }
        };

        let response = match client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/rdap+json")
            .send()
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return EnrichmentOutcome::Failed {
                    reason: EnrichmentFailure::Timeout,
                }
            }
            Err(e) => {
                return EnrichmentOutcome::Failed {
                    reason: EnrichmentFailure::LookupFailed {
                        detail: e.to_string(),
                    },
                }
            }
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return EnrichmentOutcome::Failed {
                reason: EnrichmentFailure::NoSuchRegistration,
            };
        }
        if !status.is_success() {
            return EnrichmentOutcome::Failed {
                reason: EnrichmentFailure::LookupFailed {
                    detail: format!("unexpected status {status}"),
                },
            };
        }

        match response.json::<RdapDomain>() {
            Ok(doc) => EnrichmentOutcome::Registered { info: doc.into() },
            Err(e) if e.is_timeout() => EnrichmentOutcome::Failed {
                reason: EnrichmentFailure::Timeout,
            },
            Err(e) => EnrichmentOutcome::Failed {
                reason: EnrichmentFailure::MalformedResponse {
                    detail: e.to_string(),
                },
            },
        }
    }
}

#[async_trait]
impl EnrichmentProvider for RdapClient {
    async fn enrich(&self, domain: &str) -> EnrichmentOutcome {
        let url = self.lookup_url(domain);
        let timeout = self.timeout;
        debug!(domain, "Looking up registrant data");

        let result = task::spawn_blocking(move || Self::send_request(&url, timeout)).await;

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(domain, "Registrant lookup task failed: {e}");
                EnrichmentOutcome::Failed {
                    reason: EnrichmentFailure::LookupFailed {
                        detail: format!("lookup task failed: {e}"),
                    },
                }
            }
        }
    }
}

/// The slice of an RDAP domain object this pipeline cares about.
#[derive(Debug, Deserialize)]
struct RdapDomain {
    handle: Option<String>,
    #[serde(default)]
    events: Vec<RdapEvent>,
    #[serde(default)]
    status: Vec<String>,
    #[serde(default)]
    entities: Vec<RdapEntity>,
}

#[derive(Debug, Deserialize)]
struct RdapEvent {
    #[serde(rename = "eventAction")]
    action: String,
    #[serde(rename = "eventDate")]
    date: String,
}

#[derive(Debug, Deserialize)]
struct RdapEntity {
    #[serde(default)]
    roles: Vec<String>,
    #[serde(rename = "vcardArray")]
    vcard: Option<serde_json::Value>,
}

impl From<RdapDomain> for RegistrantInfo {
    fn from(doc: RdapDomain) -> Self {
        let event_date = |action: &str| {
            doc.events
                .iter()
                .find(|e| e.action == action)
                .map(|e| e.date.clone())
        };
        let registrar = doc
            .entities
            .iter()
            .find(|e| e.roles.iter().any(|r| r == "registrar"))
            .and_then(|e| e.vcard.as_ref())
            .and_then(vcard_full_name);

        Self {
            handle: doc.handle,
            registrar,
            created: event_date("registration"),
            expires: event_date("expiration"),
            statuses: doc.status,
        }
    }
}

/// Pulls the `fn` property out of a jCard array:
/// `["vcard", [["fn", {}, "text", "Registrar Inc"], ...]]`
fn vcard_full_name(vcard: &serde_json::Value) -> Option<String> {
    vcard.get(1)?.as_array()?.iter().find_map(|prop| {
        let prop = prop.as_array()?;
        if prop.first()?.as_str()? == "fn" {
            prop.get(3)?.as_str().map(str::to_string)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_rdap_body() -> serde_json::Value {
        json!({
            "objectClassName": "domain",
            "handle": "EXAMPLE-1",
            "ldhName": "evil-example.com",
            "status": ["client transfer prohibited"],
            "events": [
                {"eventAction": "registration", "eventDate": "2026-01-01T00:00:00Z"},
                {"eventAction": "expiration", "eventDate": "2027-01-01T00:00:00Z"}
            ],
            "entities": [{
                "objectClassName": "entity",
                "roles": ["registrar"],
                "vcardArray": ["vcard", [
                    ["version", {}, "text", "4.0"],
                    ["fn", {}, "text", "Example Registrar Inc"]
                ]]
            }]
        })
    }

    #[test]
    fn parses_registrant_info_from_rdap_document() {
        let doc: RdapDomain = serde_json::from_value(sample_rdap_body()).unwrap();
        let info = RegistrantInfo::from(doc);

        assert_eq!(info.handle.as_deref(), Some("EXAMPLE-1"));
        assert_eq!(info.registrar.as_deref(), Some("Example Registrar Inc"));
        assert_eq!(info.created.as_deref(), Some("2026-01-01T00:00:00Z"));
        assert_eq!(info.expires.as_deref(), Some("2027-01-01T00:00:00Z"));
        assert_eq!(info.statuses, vec!["client transfer prohibited"]);
    }

    #[tokio::test]
    async fn successful_lookup_returns_registered() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/domain/evil-example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_rdap_body()))
            .mount(&server)
            .await;

        let client = RdapClient::new(server.uri(), Duration::from_secs(5));
        let outcome = client.enrich("evil-example.com").await;

        match outcome {
            EnrichmentOutcome::Registered { info } => {
                assert_eq!(info.registrar.as_deref(), Some("Example Registrar Inc"));
            }
            other => panic!("expected Registered, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn not_found_maps_to_no_such_registration() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = RdapClient::new(server.uri(), Duration::from_secs(5));
        let outcome = client.enrich("unregistered.example").await;

        assert_eq!(
            outcome,
            EnrichmentOutcome::Failed {
                reason: EnrichmentFailure::NoSuchRegistration
            }
        );
    }

    #[tokio::test]
    async fn server_error_maps_to_lookup_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = RdapClient::new(server.uri(), Duration::from_secs(5));
        let outcome = client.enrich("example.com").await;

        assert!(matches!(
            outcome,
            EnrichmentOutcome::Failed {
                reason: EnrichmentFailure::LookupFailed { .. }
            }
        ));
    }

    #[tokio::test]
    async fn undecodable_body_maps_to_malformed_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("this is not rdap"))
            .mount(&server)
            .await;

        let client = RdapClient::new(server.uri(), Duration::from_secs(5));
        let outcome = client.enrich("example.com").await;

        assert!(matches!(
            outcome,
            EnrichmentOutcome::Failed {
                reason: EnrichmentFailure::MalformedResponse { .. }
            }
        ));
    }

    #[tokio::test]
    async fn slow_server_maps_to_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(sample_rdap_body())
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let client = RdapClient::new(server.uri(), Duration::from_millis(200));
        let outcome = client.enrich("example.com").await;

        assert_eq!(
            outcome,
            EnrichmentOutcome::Failed {
                reason: EnrichmentFailure::Timeout
            }
        );
    }
}
