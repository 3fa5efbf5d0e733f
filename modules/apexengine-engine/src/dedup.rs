//! Anti-duplicate filtering against the user's historical leads.
//!
//! A lead is never delivered twice to the same user, regardless of which
//! search produced it. The check runs against four independent key sets
//! built once before the retrieval loop starts ("pre-flight") and read-only
//! afterwards.

use std::collections::HashSet;

use tracing::{info, warn};

use apexengine_common::Lead;

use crate::normalize::{normalize_name, normalize_url};
use crate::store::{HistoricalLead, LeadStore};

/// Placeholder company names assigned when a scraper could not identify the
/// business. Two unnamed entities are not the same entity, so these are
/// exempt from name matching on both sides of the comparison.
const PLACEHOLDER_NAMES: [&str; 2] = ["Sin Nombre", "Empresa Desconocida"];

pub fn is_placeholder_name(name: &str) -> bool {
    if PLACEHOLDER_NAMES.contains(&name) {
        return true;
    }
    let normalized = normalize_name(name);
    normalized.contains("sin nombre") || normalized.contains("empresa desconocida")
}

/// Why a candidate was classified as a duplicate, with the matched key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateReason {
    Website(String),
    ProfileUrl(String),
    Email(String),
    CompanyName(String),
}

impl std::fmt::Display for DuplicateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuplicateReason::Website(key) => write!(f, "website: {key}"),
            DuplicateReason::ProfileUrl(key) => write!(f, "linkedin: {key}"),
            DuplicateReason::Email(key) => write!(f, "email: {key}"),
            DuplicateReason::CompanyName(key) => write!(f, "company: {key}"),
        }
    }
}

/// Four normalized key sets scoped to one user's history.
#[derive(Debug, Default)]
pub struct DedupIndex {
    websites: HashSet<String>,
    company_names: HashSet<String>,
    emails: HashSet<String>,
    profile_urls: HashSet<String>,
}

impl DedupIndex {
    /// Pre-flight: load the user's history and build the key sets. A missing
    /// user or a store failure degrades to empty sets; acquisition must not
    /// hard-fail because history could not be loaded.
    pub async fn build(store: Option<&dyn LeadStore>, user_id: Option<&str>) -> Self {
        let Some(user_id) = user_id else {
            warn!("No user id for this run, skipping duplicate history");
            return Self::default();
        };
        let Some(store) = store else {
            warn!("No lead store configured, skipping duplicate history");
            return Self::default();
        };

        match store.history(user_id).await {
            Ok(history) => {
                let index = Self::from_history(&history);
                info!(
                    user_id,
                    websites = index.websites.len(),
                    companies = index.company_names.len(),
                    emails = index.emails.len(),
                    profiles = index.profile_urls.len(),
                    "Pre-flight dedup index built"
                );
                index
            }
            Err(e) => {
                warn!(user_id, error = %e, "Failed to load lead history, continuing without it");
                Self::default()
            }
        }
    }

    pub fn from_history(history: &[HistoricalLead]) -> Self {
        let mut index = Self::default();
        for record in history {
            if let Some(website) = record.website.as_deref().filter(|s| !s.is_empty()) {
                index.websites.insert(normalize_url(website));
            }
            if let Some(name) = record.company_name.as_deref().filter(|s| !s.is_empty()) {
                if !is_placeholder_name(name) {
                    index.company_names.insert(normalize_name(name));
                }
            }
            if let Some(email) = record.email.as_deref().filter(|s| !s.is_empty()) {
                index.emails.insert(email.trim().to_lowercase());
            }
            if let Some(url) = record.profile_url.as_deref().filter(|s| !s.is_empty()) {
                index.profile_urls.insert(url.trim().to_lowercase());
            }
        }
        index
    }

    /// Total number of historical keys across the four sets.
    pub fn len(&self) -> usize {
        self.websites.len() + self.company_names.len() + self.emails.len()
            + self.profile_urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Classify one candidate. Checks run in priority order (website,
    /// profile URL, email, company name), short-circuiting on the first
    /// match. The company-name check is skipped when the candidate itself
    /// carries a placeholder name.
    pub fn is_duplicate(&self, candidate: &Lead) -> Option<DuplicateReason> {
        if let Some(website) = candidate.website.as_deref().filter(|s| !s.is_empty()) {
            let key = normalize_url(website);
            if self.websites.contains(&key) {
                return Some(DuplicateReason::Website(key));
            }
        }

        if let Some(profile) = candidate.profile_url() {
            let key = profile.trim().to_lowercase();
            if self.profile_urls.contains(&key) {
                return Some(DuplicateReason::ProfileUrl(key));
            }
        }

        if let Some(email) = candidate.email() {
            let key = email.trim().to_lowercase();
            if self.emails.contains(&key) {
                return Some(DuplicateReason::Email(key));
            }
        }

        if !candidate.company_name.is_empty() && !is_placeholder_name(&candidate.company_name) {
            let key = normalize_name(&candidate.company_name);
            if self.company_names.contains(&key) {
                return Some(DuplicateReason::CompanyName(key));
            }
        }

        None
    }

    /// Filter a batch of candidates down to the ones not seen before,
    /// preserving input order. Rejects are logged with their reasons.
    pub fn filter_unique(&self, candidates: Vec<Lead>) -> Vec<Lead> {
        let total = candidates.len();
        let mut unique = Vec::with_capacity(total);
        let mut rejected = 0usize;

        for candidate in candidates {
            match self.is_duplicate(&candidate) {
                Some(reason) => {
                    rejected += 1;
                    info!(
                        company = candidate.company_name.as_str(),
                        %reason,
                        "Discarded duplicate candidate"
                    );
                }
                None => unique.push(candidate),
            }
        }

        info!(unique = unique.len(), total, rejected, "History dedup complete");
        unique
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apexengine_common::{DecisionMaker, LeadAnalysis, LeadSource, LeadStatus};

    fn candidate(company: &str, website: Option<&str>) -> Lead {
        Lead {
            id: format!("lead-{company}"),
            source: LeadSource::Gmail,
            company_name: company.to_string(),
            website: website.map(str::to_string),
            location: None,
            decision_maker: None,
            analysis: LeadAnalysis::default(),
            message_a: None,
            high_value: false,
            status: LeadStatus::Scraped,
        }
    }

    fn history_with_website(website: &str) -> DedupIndex {
        DedupIndex::from_history(&[HistoricalLead {
            website: Some(website.to_string()),
            ..Default::default()
        }])
    }

    #[test]
    fn known_website_is_duplicate_regardless_of_other_fields() {
        let index = history_with_website("acme.com");

        let mut lead = candidate("Totally Different Name", Some("https://www.acme.com/"));
        lead.decision_maker = Some(DecisionMaker {
            email: "fresh@acme.com".into(),
            ..Default::default()
        });

        assert_eq!(
            index.is_duplicate(&lead),
            Some(DuplicateReason::Website("acme.com".into()))
        );
    }

    #[test]
    fn fresh_website_passes() {
        let index = history_with_website("acme.com");
        assert_eq!(index.is_duplicate(&candidate("New Co", Some("new.com"))), None);
    }

    #[test]
    fn empty_website_never_matches() {
        let index = DedupIndex::from_history(&[HistoricalLead {
            website: Some(String::new()),
            ..Default::default()
        }]);
        // An empty historical website must not be inserted, or every
        // website-less candidate would collide with it.
        assert_eq!(index.len(), 0);
        assert_eq!(index.is_duplicate(&candidate("Anything", None)), None);
    }

    #[test]
    fn profile_url_and_email_are_checked() {
        let index = DedupIndex::from_history(&[HistoricalLead {
            email: Some("Info@Acme.com ".into()),
            profile_url: Some("https://linkedin.com/in/juan".into()),
            ..Default::default()
        }]);

        let mut by_email = candidate("Fresh SL", None);
        by_email.decision_maker = Some(DecisionMaker {
            email: "info@acme.com".into(),
            ..Default::default()
        });
        assert!(matches!(
            index.is_duplicate(&by_email),
            Some(DuplicateReason::Email(_))
        ));

        let mut by_profile = candidate("Fresh SL", None);
        by_profile.decision_maker = Some(DecisionMaker {
            linkedin: Some("https://linkedin.com/in/juan".into()),
            ..Default::default()
        });
        assert!(matches!(
            index.is_duplicate(&by_profile),
            Some(DuplicateReason::ProfileUrl(_))
        ));
    }

    #[test]
    fn company_name_matches_after_normalization() {
        let index = DedupIndex::from_history(&[HistoricalLead {
            company_name: Some("Inmobiliaria  Del Sur".into()),
            ..Default::default()
        }]);

        assert!(matches!(
            index.is_duplicate(&candidate("inmobiliaria del sur", None)),
            Some(DuplicateReason::CompanyName(_))
        ));
    }

    #[test]
    fn placeholder_names_never_collide() {
        // Both sides placeholder: neither inserted nor checked.
        let index = DedupIndex::from_history(&[HistoricalLead {
            company_name: Some("Empresa Desconocida".into()),
            ..Default::default()
        }]);

        let a = candidate("Empresa Desconocida", Some("uno.com"));
        let b = candidate("Empresa Desconocida", Some("dos.com"));
        let unique = index.filter_unique(vec![a, b]);
        assert_eq!(unique.len(), 2, "distinct unnamed entities must both pass");
    }

    #[test]
    fn website_outranks_company_name_in_reasons() {
        let index = DedupIndex::from_history(&[HistoricalLead {
            company_name: Some("Acme".into()),
            website: Some("acme.com".into()),
            ..Default::default()
        }]);

        let lead = candidate("Acme", Some("acme.com"));
        assert!(matches!(
            index.is_duplicate(&lead),
            Some(DuplicateReason::Website(_))
        ));
    }

    #[test]
    fn filter_unique_preserves_order_of_survivors() {
        let index = history_with_website("acme.com");
        let unique = index.filter_unique(vec![
            candidate("A", Some("a.com")),
            candidate("Dup", Some("www.acme.com")),
            candidate("B", Some("b.com")),
        ]);
        let names: Vec<_> = unique.iter().map(|l| l.company_name.as_str()).collect();
        assert_eq!(names, ["A", "B"]);
    }

    #[tokio::test]
    async fn build_without_user_or_store_degrades_to_empty() {
        let index = DedupIndex::build(None, Some("user-1")).await;
        assert!(index.is_empty());
        let index = DedupIndex::build(None, None).await;
        assert!(index.is_empty());
    }
}
