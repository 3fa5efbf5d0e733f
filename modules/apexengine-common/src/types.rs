use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ApexError;

// --- Acquisition channels ---

/// Where a lead was acquired from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadSource {
    /// Google Maps place listings (businesses with contact details).
    Gmail,
    /// LinkedIn profiles found via Google Search.
    Linkedin,
}

impl std::fmt::Display for LeadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeadSource::Gmail => write!(f, "gmail"),
            LeadSource::Linkedin => write!(f, "linkedin"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Fast,
    Deep,
}

// --- Lead lifecycle ---

/// Lead pipeline status. Moves forward only; `Discarded` is terminal and
/// reachable from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    Scraped,
    Enriched,
    Ready,
    Contacted,
    Replied,
    Discarded,
}

impl LeadStatus {
    fn rank(self) -> u8 {
        match self {
            LeadStatus::Scraped => 0,
            LeadStatus::Enriched => 1,
            LeadStatus::Ready => 2,
            LeadStatus::Contacted => 3,
            LeadStatus::Replied => 4,
            LeadStatus::Discarded => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LeadStatus::Discarded)
    }

    /// The single transition function: forward moves and `Discarded` are
    /// allowed, everything else is rejected. Callers that re-apply a stage
    /// idempotently treat the error as "already there".
    pub fn advance(self, next: LeadStatus) -> Result<LeadStatus, ApexError> {
        if self.is_terminal() {
            return Err(ApexError::InvalidTransition {
                from: self,
                to: next,
            });
        }
        if next == LeadStatus::Discarded || next.rank() > self.rank() {
            return Ok(next);
        }
        Err(ApexError::InvalidTransition {
            from: self,
            to: next,
        })
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeadStatus::Scraped => write!(f, "scraped"),
            LeadStatus::Enriched => write!(f, "enriched"),
            LeadStatus::Ready => write!(f, "ready"),
            LeadStatus::Contacted => write!(f, "contacted"),
            LeadStatus::Replied => write!(f, "replied"),
            LeadStatus::Discarded => write!(f, "discarded"),
        }
    }
}

// --- Lead model ---

/// The person behind a company lead, when one could be identified.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionMaker {
    pub name: String,
    /// e.g. "Founder", "Owner", "CEO"
    pub role: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    /// LinkedIn profile URL.
    #[serde(default)]
    pub linkedin: Option<String>,
    #[serde(default)]
    pub facebook: Option<String>,
    #[serde(default)]
    pub instagram: Option<String>,
}

/// AI-generated analysis attached to a lead by the enrichment pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadAnalysis {
    pub summary: String,
    #[serde(default)]
    pub pain_points: Vec<String>,
    #[serde(default)]
    pub icebreaker: String,
    #[serde(default)]
    pub full_message: String,
    #[serde(default)]
    pub psychological_profile: String,
    #[serde(default)]
    pub business_moment: String,
    #[serde(default)]
    pub sales_angle: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub source: LeadSource,
    pub company_name: String,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub decision_maker: Option<DecisionMaker>,
    pub analysis: LeadAnalysis,
    /// Short outreach message drafted by the enrichment pipeline.
    #[serde(default)]
    pub message_a: Option<String>,
    /// Matched the configured high-value segment keywords.
    #[serde(default)]
    pub high_value: bool,
    pub status: LeadStatus,
}

impl Lead {
    /// External profile URL (LinkedIn), if known.
    pub fn profile_url(&self) -> Option<&str> {
        self.decision_maker
            .as_ref()
            .and_then(|dm| dm.linkedin.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// Contact email, if known and non-empty.
    pub fn email(&self) -> Option<&str> {
        self.decision_maker
            .as_ref()
            .map(|dm| dm.email.as_str())
            .filter(|s| !s.is_empty())
    }
}

// --- Search configuration ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdvancedFilter {
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub job_titles: Vec<String>,
    #[serde(default)]
    pub company_sizes: Vec<String>,
    #[serde(default)]
    pub industries: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// One acquisition run's request, as the caller submits it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub query: String,
    pub source: LeadSource,
    pub mode: SearchMode,
    pub max_results: u32,
    #[serde(default)]
    pub advanced_filters: Option<AdvancedFilter>,
}

/// Structured search intent produced by the query interpreter.
/// Built once per run, immutable afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchIntent {
    pub search_query: String,
    pub industry: String,
    /// Ordered, first entries most salient.
    pub target_roles: Vec<String>,
    pub location: String,
}

// --- Cancellation ---

/// Shared cancellation flag for one acquisition run. Cloned into the run
/// task and checked at every suspension point.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
