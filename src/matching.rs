//! Term matching engine for certificate events
//!
//! Evaluation is a pure function over an event and a term snapshot: no
//! locks, no I/O. Snapshot lifetime is managed by the registry.

use crate::core::{CertificateEvent, TermMatch};
use crate::terms::TermSet;

/// Sentinel recorded when a certificate update carries no domains at all.
pub const NULL_DOMAIN: &str = "NULL";

/// Builds the text an event is matched against: the primary domain followed
/// by its subject-alternative names, lowercased.
fn match_text(event: &CertificateEvent) -> String {
    let primary = event
        .domains
        .first()
        .map(String::as_str)
        .unwrap_or(NULL_DOMAIN);
    let sans = event
        .domains
        .get(1..)
        .map(|rest| rest.join(", "))
        .unwrap_or_default();
    format!("{} (SAN: {})", primary, sans).to_lowercase()
}

/// Strips a `:port` suffix so the recorded domain is canonical.
fn canonical_domain(raw: &str) -> &str {
    raw.split(':').next().unwrap_or(raw)
}

/// Evaluates one certificate-update event against a term snapshot.
///
/// Returns the first term contained in the event's text, or `None`. Once a
/// term matches, remaining terms are not checked: at most one term is
/// attributed per event.
pub fn evaluate(event: &CertificateEvent, terms: &TermSet) -> Option<TermMatch> {
    let haystack = match_text(event);

    for term in terms.iter() {
        if haystack.contains(term) {
            metrics::counter!("term_matches", "term" => term.to_string()).increment(1);
            let primary = event
                .domains
                .first()
                .map(String::as_str)
                .unwrap_or(NULL_DOMAIN);
            return Some(TermMatch {
                domain: canonical_domain(primary).to_string(),
                matched_term: term.to_string(),
            });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(domains: &[&str]) -> CertificateEvent {
        CertificateEvent::new(domains.iter().map(|d| d.to_string()).collect())
    }

    #[test]
    fn matches_term_in_primary_domain() {
        let terms = TermSet::from_lines(["example"]);
        let ev = event(&["evil-example.com", "mail.evil-example.com"]);

        let m = evaluate(&ev, &terms).expect("should match");
        assert_eq!(m.domain, "evil-example.com");
        assert_eq!(m.matched_term, "example");
    }

    #[test]
    fn matches_term_present_only_in_san() {
        let terms = TermSet::from_lines(["paypal"]);
        let ev = event(&["cdn.host.net", "login-paypal.host.net"]);

        let m = evaluate(&ev, &terms).expect("should match via SAN text");
        // The recorded domain is always the primary name.
        assert_eq!(m.domain, "cdn.host.net");
        assert_eq!(m.matched_term, "paypal");
    }

    #[test]
    fn matching_is_case_insensitive() {
        let terms = TermSet::from_lines(["PayPal"]);
        let ev = event(&["PAYPAL-secure.com"]);

        let m = evaluate(&ev, &terms).expect("case must not matter");
        assert_eq!(m.matched_term, "paypal");
    }

    #[test]
    fn first_match_wins_in_snapshot_order() {
        let terms = TermSet::from_lines(["alpha", "beta"]);
        let ev = event(&["alpha-beta.com"]);

        let m = evaluate(&ev, &terms).unwrap();
        assert_eq!(m.matched_term, "alpha");

        // Reversed snapshot order attributes the other term.
        let terms = TermSet::from_lines(["beta", "alpha"]);
        let m = evaluate(&ev, &terms).unwrap();
        assert_eq!(m.matched_term, "beta");
    }

    #[test]
    fn no_match_returns_none() {
        let terms = TermSet::from_lines(["example"]);
        let ev = event(&["legitimate-site.org"]);
        assert_eq!(evaluate(&ev, &terms), None);
    }

    #[test]
    fn empty_domain_list_uses_null_sentinel() {
        let terms = TermSet::from_lines(["null"]);
        let ev = event(&[]);

        let m = evaluate(&ev, &terms).expect("sentinel text should match");
        assert_eq!(m.domain, "NULL");
    }

    #[test]
    fn empty_domain_list_without_matching_term_is_not_an_error() {
        let terms = TermSet::from_lines(["example"]);
        let ev = event(&[]);
        assert_eq!(evaluate(&ev, &terms), None);
    }

    #[test]
    fn port_suffix_is_stripped_from_recorded_domain() {
        let terms = TermSet::from_lines(["example"]);
        let ev = event(&["evil-example.com:8443"]);

        let m = evaluate(&ev, &terms).unwrap();
        assert_eq!(m.domain, "evil-example.com");
    }

    #[test]
    fn empty_term_set_never_matches() {
        let terms = TermSet::default();
        let ev = event(&["anything.com"]);
        assert_eq!(evaluate(&ev, &terms), None);
    }
}
