//! Per-lead enrichment: supplemental web research, a structured sales
//! analysis and a short outreach message. Every sub-step is best-effort
//! with a deterministic fallback; the pipeline itself never fails a run.

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use tracing::warn;

use ai_client::{extract_json, truncate_to_char_boundary};
use apexengine_common::{CancelFlag, Lead, LeadStatus};
use apify_client::{SerpSearchInput, SERP_SCRAPER};

use crate::convert::flatten_serp_pages;
use crate::dedup::is_placeholder_name;
use crate::runner::{JobRunner, SHORT_MAX_POLLS};
use crate::traits::TextGenerator;

/// Attempts per generation call before falling back.
const GENERATION_MAX_ATTEMPTS: u32 = 2;
/// Base backoff between generation attempts. Actual delay adds 0-250ms jitter.
const RETRY_BASE: Duration = Duration::from_millis(500);

/// Queries per lead and snippets kept per query for the research step.
const RESEARCH_MAX_QUERIES: usize = 4;
const RESEARCH_SNIPPETS_PER_QUERY: usize = 3;
/// Research text cap fed into the analysis prompt.
const RESEARCH_MAX_BYTES: usize = 2000;

const ANALYSIS_SYSTEM_PROMPT: &str = r#"You are an expert B2B sales analyst working the Spanish market. Given a lead and research notes, produce a complete sales read of the company and its decision maker.

Respond ONLY with a valid JSON object in exactly this shape:
{
  "psychologicalProfile": "how this decision maker thinks and likes to be approached, 1-2 sentences",
  "businessMoment": "what is happening in this business right now, 1-2 sentences",
  "salesAngle": "the single best angle to open a conversation",
  "bottleneck": "the main obstacle this business is facing",
  "personalizedMessage": "a short outreach message in Spanish addressed to the decision maker"
}"#;

const ICEBREAKER_SYSTEM_PROMPT: &str = "You write cold-outreach openers for the Spanish market. \
Reply with EXACTLY ONE short icebreaker sentence in Spanish, under 25 words, \
personal and specific to the lead. No quotes, no preamble, no emojis.";

/// What the generation service returns for the structured analysis step.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StructuredAnalysis {
    #[serde(rename = "psychologicalProfile")]
    pub psychological_profile: String,
    #[serde(rename = "businessMoment")]
    pub business_moment: String,
    #[serde(rename = "salesAngle")]
    pub sales_angle: String,
    #[serde(default)]
    pub bottleneck: String,
    #[serde(rename = "personalizedMessage", default)]
    pub personalized_message: String,
}

/// Deterministic analysis used when the generation service is unavailable
/// or keeps failing. Built only from the lead's own fields.
pub fn fallback_analysis(lead: &Lead) -> StructuredAnalysis {
    let company = &lead.company_name;
    let role = lead
        .decision_maker
        .as_ref()
        .map(|dm| dm.role.as_str())
        .filter(|r| !r.is_empty())
        .unwrap_or("Propietario");

    StructuredAnalysis {
        psychological_profile: format!(
            "{role} de {company}: decisor pragmático con poco tiempo, responde mejor a mensajes breves y concretos."
        ),
        business_moment: format!(
            "{company} opera en un mercado competitivo; sin señales públicas recientes."
        ),
        sales_angle: "Ahorro de tiempo en captación y seguimiento automático de clientes potenciales."
            .to_string(),
        bottleneck: "Capacidad comercial limitada para atender todas las oportunidades.".to_string(),
        personalized_message: format!(
            "Hola, he visto el trabajo de {company} y creo que podemos ayudaros a captar más clientes sin añadir carga operativa. ¿Os interesa una breve llamada?"
        ),
    }
}

/// Deterministic icebreaker used when the generation service fails.
pub fn fallback_icebreaker(lead: &Lead) -> String {
    let name = lead
        .decision_maker
        .as_ref()
        .map(|dm| dm.name.as_str())
        .filter(|n| !n.is_empty());
    match name {
        Some(name) => format!(
            "Hola {name}, enhorabuena por el trabajo de {}: ¿exploramos cómo conseguir más clientes sin más carga operativa?",
            lead.company_name
        ),
        None => format!(
            "Hola, enhorabuena por el trabajo de {}: ¿exploramos cómo conseguir más clientes sin más carga operativa?",
            lead.company_name
        ),
    }
}

pub struct EnrichmentPipeline<'a> {
    runner: JobRunner,
    generator: Option<&'a dyn TextGenerator>,
    high_value_keywords: &'a [String],
}

impl<'a> EnrichmentPipeline<'a> {
    pub fn new(
        runner: &JobRunner,
        generator: Option<&'a dyn TextGenerator>,
        high_value_keywords: &'a [String],
    ) -> Self {
        Self {
            runner: runner.with_poll_budget(SHORT_MAX_POLLS),
            generator,
            high_value_keywords,
        }
    }

    /// Run all three sub-steps against one lead. The lead's status advances
    /// to `Ready` only once every sub-step has completed (with real output
    /// or its fallback); cancelling mid-pipeline leaves the status where it
    /// was so callers can detect incomplete enrichment.
    pub async fn enrich(&self, lead: &mut Lead, cancel: &CancelFlag) {
        if cancel.is_cancelled() {
            return;
        }

        let research = self.research(lead, cancel).await;
        if cancel.is_cancelled() {
            return;
        }

        let analysis = self.structured_analysis(lead, &research).await;
        apply_analysis(lead, analysis, self.high_value_keywords);
        if cancel.is_cancelled() {
            return;
        }

        let message = self.outreach_message(lead).await;
        lead.analysis.icebreaker = message.clone();
        lead.message_a = Some(message);

        // Idempotent: re-enriching a lead that is already Ready is a no-op.
        if let Ok(next) = lead.status.advance(LeadStatus::Ready) {
            lead.status = next;
        }
    }

    /// Supplemental research queries against the web-search actor. Failures
    /// only shrink the context; enrichment continues either way.
    async fn research(&self, lead: &Lead, cancel: &CancelFlag) -> String {
        let mut queries: Vec<String> = Vec::new();
        let company = lead.company_name.trim();
        if !company.is_empty() && !is_placeholder_name(company) {
            queries.push(company.to_string());
            queries.push(format!("\"{company}\" opiniones"));
        }
        if let Some(dm) = &lead.decision_maker {
            if !dm.name.trim().is_empty() {
                queries.push(format!("{} {}", dm.name.trim(), company));
            }
        }
        if let Some(website) = lead.website.as_deref().filter(|w| !w.is_empty()) {
            queries.push(website.to_string());
        }
        queries.truncate(RESEARCH_MAX_QUERIES);

        let mut snippets: Vec<String> = Vec::new();
        for query in queries {
            if cancel.is_cancelled() {
                break;
            }
            let input = SerpSearchInput {
                queries: query.clone(),
                max_pages_per_query: 1,
                results_per_page: 5,
                language_code: "es".to_string(),
                country_code: "es".to_string(),
                mobile_results: false,
            };
            match self.runner.run::<apify_client::SerpPage, _>(SERP_SCRAPER, &input, cancel).await {
                Ok(pages) => {
                    snippets.extend(
                        flatten_serp_pages(pages)
                            .into_iter()
                            .take(RESEARCH_SNIPPETS_PER_QUERY)
                            .filter_map(|r| r.description)
                            .filter(|d| !d.is_empty()),
                    );
                }
                Err(e) => {
                    warn!(query = query.as_str(), error = %e, "Research query failed, continuing");
                }
            }
        }

        let combined = snippets.join("\n");
        truncate_to_char_boundary(&combined, RESEARCH_MAX_BYTES).to_string()
    }

    async fn structured_analysis(&self, lead: &Lead, research: &str) -> StructuredAnalysis {
        let Some(generator) = self.generator else {
            return fallback_analysis(lead);
        };
        let context = lead_context(lead, research);

        for attempt in 1..=GENERATION_MAX_ATTEMPTS {
            match generator.chat(ANALYSIS_SYSTEM_PROMPT, &context, 0.5, 400).await {
                Ok(text) => match extract_json::<StructuredAnalysis>(&text) {
                    Ok(analysis) => return analysis,
                    Err(e) => {
                        warn!(company = lead.company_name.as_str(), attempt, error = %e, "Analysis response unusable");
                    }
                },
                Err(e) => {
                    warn!(company = lead.company_name.as_str(), attempt, error = %e, "Analysis call failed");
                }
            }
            if attempt < GENERATION_MAX_ATTEMPTS {
                backoff(attempt).await;
            }
        }

        fallback_analysis(lead)
    }

    async fn outreach_message(&self, lead: &Lead) -> String {
        let Some(generator) = self.generator else {
            return fallback_icebreaker(lead);
        };
        let context = lead_context(lead, "");

        for attempt in 1..=GENERATION_MAX_ATTEMPTS {
            match generator.chat(ICEBREAKER_SYSTEM_PROMPT, &context, 0.7, 100).await {
                Ok(text) => {
                    let message = text.trim();
                    if !message.is_empty() {
                        return message.to_string();
                    }
                    warn!(company = lead.company_name.as_str(), attempt, "Empty icebreaker response");
                }
                Err(e) => {
                    warn!(company = lead.company_name.as_str(), attempt, error = %e, "Icebreaker call failed");
                }
            }
            if attempt < GENERATION_MAX_ATTEMPTS {
                backoff(attempt).await;
            }
        }

        fallback_icebreaker(lead)
    }
}

async fn backoff(attempt: u32) {
    let jitter = Duration::from_millis(rand::rng().random_range(0..250));
    tokio::time::sleep(RETRY_BASE * attempt + jitter).await;
}

fn lead_context(lead: &Lead, research: &str) -> String {
    let dm = lead.decision_maker.as_ref();
    let mut context = format!(
        "Empresa: {}\nUbicación: {}\nWeb: {}\nDecisor: {} - {}\nLinkedIn: {}\nEmail: {}\nResumen previo: {}",
        lead.company_name,
        lead.location.as_deref().unwrap_or("No especificada"),
        lead.website.as_deref().unwrap_or("No disponible"),
        dm.map(|d| d.name.as_str()).filter(|n| !n.is_empty()).unwrap_or("No identificado"),
        dm.map(|d| d.role.as_str()).filter(|r| !r.is_empty()).unwrap_or("Cargo desconocido"),
        lead.profile_url().unwrap_or("No disponible"),
        lead.email().unwrap_or("No disponible"),
        lead.analysis.summary,
    );
    if !research.is_empty() {
        context.push_str("\nInvestigación:\n");
        context.push_str(research);
    }
    context
}

/// Fold the structured analysis into the lead and flag the high-value
/// segment by keyword match.
fn apply_analysis(lead: &mut Lead, analysis: StructuredAnalysis, keywords: &[String]) {
    let haystack = format!(
        "{} {} {}",
        analysis.business_moment, analysis.bottleneck, analysis.sales_angle
    )
    .to_lowercase();
    lead.high_value = keywords
        .iter()
        .filter(|k| !k.is_empty())
        .any(|k| haystack.contains(&k.to_lowercase()));

    lead.analysis.psychological_profile = analysis.psychological_profile;
    lead.analysis.business_moment = analysis.business_moment;
    lead.analysis.sales_angle = analysis.sales_angle;
    if !analysis.personalized_message.is_empty() {
        lead.analysis.full_message = analysis.personalized_message;
    }
    if !analysis.bottleneck.is_empty() {
        lead.analysis.pain_points.push(analysis.bottleneck);
    }
}
