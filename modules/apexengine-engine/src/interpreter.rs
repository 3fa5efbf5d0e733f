//! Query interpretation — turns the user's free-text search into a
//! structured intent for the channel-specific actors. Best-effort: any
//! failure falls back to a deterministic intent built from the raw query.

use serde::Deserialize;
use tracing::{info, warn};

use ai_client::extract_json;
use apexengine_common::{LeadSource, SearchIntent};

use crate::traits::TextGenerator;

/// Roles used when interpretation is unavailable, most salient first.
pub const DEFAULT_TARGET_ROLES: [&str; 5] = ["CEO", "Founder", "Owner", "Propietario", "Director"];

const INTERPRETER_SYSTEM_PROMPT: &str = r#"You are a B2B prospecting expert. The user wants to find business leads; your job is to interpret their search and produce the best terms to find OWNERS and DECISION MAKERS of companies.

Respond ONLY with a valid JSON object in exactly this shape:
{
  "searchQuery": "optimized search term for the target platform",
  "industry": "detected sector/industry",
  "targetRoles": ["job titles to look for, in Spanish and English"],
  "location": "geographic scope, or the default region"
}"#;

/// What the generation service returns. Serde validates keys and primitive
/// types before the object is trusted.
#[derive(Debug, Deserialize)]
struct InterpretedQuery {
    #[serde(rename = "searchQuery")]
    search_query: String,
    industry: String,
    #[serde(rename = "targetRoles", default)]
    target_roles: Vec<String>,
    #[serde(default)]
    location: Option<String>,
}

/// The deterministic intent used whenever interpretation fails.
pub fn fallback_intent(user_query: &str, region: &str) -> SearchIntent {
    SearchIntent {
        search_query: user_query.to_string(),
        industry: user_query.to_string(),
        target_roles: DEFAULT_TARGET_ROLES.iter().map(|r| r.to_string()).collect(),
        location: region.to_string(),
    }
}

/// Interpret the user's query for one platform. Never fails: the worst
/// outcome is the fallback intent.
pub async fn interpret(
    generator: Option<&dyn TextGenerator>,
    user_query: &str,
    platform: LeadSource,
    region: &str,
) -> SearchIntent {
    let Some(generator) = generator else {
        info!("No generation service configured, using fallback intent");
        return fallback_intent(user_query, region);
    };

    let platform_hint = match platform {
        LeadSource::Gmail => "Google Maps business listings",
        LeadSource::Linkedin => "LinkedIn profile search",
    };
    let user_prompt = format!(
        "Target platform: {platform_hint}. Default region: {region}.\n\
         Interpret this search to find leads: \"{user_query}\""
    );

    let response = match generator
        .chat(INTERPRETER_SYSTEM_PROMPT, &user_prompt, 0.3, 200)
        .await
    {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Query interpretation call failed, using fallback");
            return fallback_intent(user_query, region);
        }
    };

    match extract_json::<InterpretedQuery>(&response) {
        Ok(parsed) => {
            let mut intent = SearchIntent {
                search_query: parsed.search_query,
                industry: parsed.industry,
                target_roles: parsed
                    .target_roles
                    .into_iter()
                    .filter(|r| !r.trim().is_empty())
                    .collect(),
                location: parsed
                    .location
                    .filter(|l| !l.trim().is_empty())
                    .unwrap_or_else(|| region.to_string()),
            };
            // Field-wise fallback: a present-but-empty value is as useless
            // as a missing one.
            if intent.search_query.trim().is_empty() {
                intent.search_query = user_query.to_string();
            }
            if intent.industry.trim().is_empty() {
                intent.industry = user_query.to_string();
            }
            if intent.target_roles.is_empty() {
                intent.target_roles =
                    DEFAULT_TARGET_ROLES.iter().map(|r| r.to_string()).collect();
            }
            info!(
                query = intent.search_query.as_str(),
                industry = intent.industry.as_str(),
                roles = intent.target_roles.len(),
                "Query interpreted"
            );
            intent
        }
        Err(e) => {
            warn!(error = %e, "Interpreter response was not usable JSON, using fallback");
            fallback_intent(user_query, region)
        }
    }
}
