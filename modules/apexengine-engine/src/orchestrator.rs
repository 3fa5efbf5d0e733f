//! Acquisition Orchestrator — the quota-driven retrieval loop.
//!
//! One run: build the dedup index, interpret the query once, then keep
//! fetching over-sized batches from the channel's actor, converting,
//! deduplicating and enriching until the target is met, the attempt budget
//! is spent, the source runs dry, or the caller cancels. Partial
//! fulfillment is a normal outcome, not an error.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use ai_client::OpenAi;
use apexengine_common::{
    CancelFlag, Config, Lead, LeadSource, LeadStatus, SearchConfig, SearchIntent,
};
use apify_client::{
    ApifyClient, ContactItem, ContactScraperInput, PlaceItem, PlacesSearchInput, SerpPage,
    SerpSearchInput, StartUrl, CONTACT_SCRAPER, PLACES_SCRAPER, SERP_SCRAPER,
};

use crate::convert::{self, flatten_serp_pages};
use crate::dedup::{is_placeholder_name, DedupIndex};
use crate::enrichment::EnrichmentPipeline;
use crate::interpreter;
use crate::normalize::{normalize_name, normalize_url};
use crate::runner::{JobError, JobRunner, SHORT_MAX_POLLS};
use crate::store::{LeadStore, PgLeadStore, SessionRecord};
use crate::traits::{JobPlatform, TextGenerator};

/// Attempt budget per run. Each loop iteration consumes one attempt, so the
/// retrieval loop is bounded even when every fetch is rejected wholesale.
pub const MAX_ATTEMPTS: u32 = 10;

/// Raw items requested per missing accepted lead, compensating the expected
/// attrition from dedup and enrichment.
pub const DEFAULT_FETCH_MULTIPLIER: u32 = 4;

/// Listing-channel enrichment budget per run; bounds generation-service
/// call volume on large runs.
pub const DEFAULT_ANALYSIS_CAP: usize = 10;

/// Websites per contact-scrape job.
pub const DEFAULT_CONTACT_BATCH_SIZE: usize = 10;

/// Explicit knobs for the retrieval loop.
#[derive(Debug, Clone)]
pub struct Tunables {
    pub max_attempts: u32,
    pub fetch_multiplier: u32,
    pub analysis_cap: usize,
    pub contact_batch_size: usize,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            fetch_multiplier: DEFAULT_FETCH_MULTIPLIER,
            analysis_cap: DEFAULT_ANALYSIS_CAP,
            contact_batch_size: DEFAULT_CONTACT_BATCH_SIZE,
        }
    }
}

/// Receives the human-readable progress lines of one run.
pub type LogSink = Arc<dyn Fn(String) + Send + Sync>;

/// Handle to a running acquisition. Dropping it does not stop the run.
pub struct RunHandle {
    cancel: CancelFlag,
}

impl RunHandle {
    /// Set the cancellation flag. Takes effect at the next checked
    /// suspension point (loop top, between polls, between enrichments).
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Stats from one acquisition run.
#[derive(Debug, Default)]
pub struct RunStats {
    pub attempts: u32,
    pub raw_items: u32,
    pub session_duplicates: u32,
    pub history_duplicates: u32,
    pub contacts_filled: u32,
    pub enriched: u32,
    pub accepted: u32,
    pub with_email: u32,
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Acquisition Run Complete ===")?;
        writeln!(f, "Attempts:           {}", self.attempts)?;
        writeln!(f, "Raw items fetched:  {}", self.raw_items)?;
        writeln!(f, "Session duplicates: {}", self.session_duplicates)?;
        writeln!(f, "History duplicates: {}", self.history_duplicates)?;
        writeln!(f, "Contacts filled:    {}", self.contacts_filled)?;
        writeln!(f, "Leads enriched:     {}", self.enriched)?;
        writeln!(
            f,
            "Accepted:           {} ({} with email)",
            self.accepted, self.with_email
        )?;
        Ok(())
    }
}

pub struct Orchestrator {
    platform: Option<Arc<dyn JobPlatform>>,
    generator: Option<Arc<dyn TextGenerator>>,
    store: Option<Arc<dyn LeadStore>>,
    region: String,
    high_value_keywords: Vec<String>,
    tunables: Tunables,
}

impl Orchestrator {
    pub fn new(
        platform: Option<Arc<dyn JobPlatform>>,
        generator: Option<Arc<dyn TextGenerator>>,
        store: Option<Arc<dyn LeadStore>>,
        region: impl Into<String>,
        high_value_keywords: Vec<String>,
    ) -> Self {
        Self {
            platform,
            generator,
            store,
            region: region.into(),
            high_value_keywords,
            tunables: Tunables::default(),
        }
    }

    pub fn with_tunables(mut self, tunables: Tunables) -> Self {
        self.tunables = tunables;
        self
    }

    /// Wire the concrete clients from environment configuration. A missing
    /// generation key or unreachable store only degrades the run; a missing
    /// platform token is reported when a run starts.
    pub async fn from_config(config: &Config) -> Self {
        let platform = config
            .apify_token
            .as_deref()
            .map(|token| Arc::new(ApifyClient::new(token.to_string())) as Arc<dyn JobPlatform>);
        let generator = config
            .openai_api_key
            .as_deref()
            .map(|key| Arc::new(OpenAi::new(key, &config.openai_model)) as Arc<dyn TextGenerator>);
        let store = match &config.database_url {
            Some(url) => match PgLeadStore::connect(url).await {
                Ok(store) => Some(Arc::new(store) as Arc<dyn LeadStore>),
                Err(e) => {
                    warn!(error = %e, "Lead store unavailable, continuing without history");
                    None
                }
            },
            None => None,
        };

        Self::new(
            platform,
            generator,
            store,
            config.target_region.clone(),
            config.high_value_keywords.clone(),
        )
    }

    /// Spawn one acquisition run. `on_log` receives progress lines as they
    /// happen; `on_complete` fires exactly once with whatever was accepted,
    /// possibly fewer than `max_results`, possibly empty.
    pub fn start(
        self: &Arc<Self>,
        config: SearchConfig,
        user_id: Option<String>,
        on_log: LogSink,
        on_complete: impl FnOnce(Vec<Lead>) + Send + 'static,
    ) -> RunHandle {
        let cancel = CancelFlag::new();
        let handle = RunHandle {
            cancel: cancel.clone(),
        };
        let orchestrator = Arc::clone(self);

        tokio::spawn(async move {
            let accepted = orchestrator
                .run(&config, user_id.as_deref(), &cancel, &on_log)
                .await;
            on_complete(accepted);
        });

        handle
    }

    /// Run one acquisition to completion on the caller's task. All run
    /// state lives in this call frame, so concurrent runs from the same
    /// orchestrator cannot observe each other's cancellation or progress.
    pub async fn run(
        &self,
        config: &SearchConfig,
        user_id: Option<&str>,
        cancel: &CancelFlag,
        on_log: &LogSink,
    ) -> Vec<Lead> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        let Some(platform) = self.platform.clone() else {
            error!("No job-platform token configured, aborting run");
            on_log("[ERROR] Falta la API key de Apify. Configura APIFY_API_TOKEN.".to_string());
            return Vec::new();
        };
        let runner = JobRunner::new(platform);

        // Pre-flight: historical dedup keys, before anything is fetched.
        let index = DedupIndex::build(self.store.as_deref(), user_id).await;
        if index.is_empty() {
            on_log("[DEDUP] Pre-Flight: sin historial previo".to_string());
        } else {
            on_log(format!(
                "[DEDUP] Pre-Flight completado: {} claves históricas cargadas",
                index.len()
            ));
        }

        on_log(format!("[IA] Interpretando búsqueda: \"{}\"...", config.query));
        let intent = interpreter::interpret(
            self.generator.as_deref(),
            &config.query,
            config.source,
            &self.region,
        )
        .await;
        on_log(format!("[IA] Industria: {}", intent.industry));
        on_log(format!("[IA] Roles objetivo: {}", intent.target_roles.join(", ")));

        let pipeline =
            EnrichmentPipeline::new(&runner, self.generator.as_deref(), &self.high_value_keywords);

        let mut stats = RunStats::default();
        let target = config.max_results as usize;
        let mut accepted: Vec<Lead> = Vec::new();
        // Pages already consumed; widens the fetch window on retry attempts.
        let mut cursor: u32 = 0;

        while accepted.len() < target && stats.attempts < self.tunables.max_attempts {
            if cancel.is_cancelled() {
                break;
            }

            stats.attempts += 1;
            let needed = target - accepted.len();
            let fetch_size = (needed as u32).saturating_mul(self.tunables.fetch_multiplier);
            on_log(format!(
                "[LOOP] Intento {}/{}: faltan {}, solicitando {} resultados",
                stats.attempts, self.tunables.max_attempts, needed, fetch_size
            ));

            let fetched = match config.source {
                LeadSource::Gmail => {
                    self.fetch_places(&runner, &intent, fetch_size, cursor, cancel)
                        .await
                }
                LeadSource::Linkedin => {
                    self.fetch_profiles(&runner, &intent, fetch_size, cursor, cancel)
                        .await
                }
            };
            cursor += 1;

            let mut candidates = match fetched {
                Ok(candidates) => candidates,
                Err(e) => {
                    // Fatal to this attempt only; the run keeps its budget.
                    warn!(attempt = stats.attempts, error = %e, "Fetch attempt failed");
                    on_log(format!("[ERROR] Intento fallido: {e}"));
                    continue;
                }
            };

            if cancel.is_cancelled() {
                break;
            }
            if candidates.is_empty() {
                on_log("[LOOP] La fuente no devolvió más resultados, fin de la búsqueda.".to_string());
                break;
            }
            stats.raw_items += candidates.len() as u32;
            on_log(format!(
                "[{}] {} candidatos encontrados",
                channel_tag(config.source),
                candidates.len()
            ));

            // Same-run dedup, against accepted leads and within the batch.
            let before = candidates.len();
            candidates = remove_session_duplicates(candidates, &accepted);
            let dropped = before - candidates.len();
            if dropped > 0 {
                stats.session_duplicates += dropped as u32;
                on_log(format!("[DEDUP] {dropped} repetidos en esta sesión descartados"));
            }

            // Listing channel: fill missing contact data from each
            // candidate's own website before the history check.
            if config.source == LeadSource::Gmail {
                stats.contacts_filled += self
                    .scrape_contacts(&runner, &mut candidates, cancel, on_log)
                    .await;
            }

            let before = candidates.len();
            let mut unique = index.filter_unique(candidates);
            let rejected = before - unique.len();
            if rejected > 0 {
                stats.history_duplicates += rejected as u32;
                on_log(format!("[DEDUP] {rejected} duplicados históricos descartados"));
            }
            if unique.is_empty() {
                // The source may still have fresh items on a deeper page;
                // this attempt is spent either way, so the loop stays bounded.
                on_log("[DEDUP] Todos los candidatos eran duplicados, ampliando búsqueda...".to_string());
                continue;
            }

            // Never overshoot the target. The listing channel prefers
            // candidates that already carry an email.
            if config.source == LeadSource::Gmail {
                unique = prefer_with_email(unique);
            }
            unique.truncate(needed);

            let batch_total = unique.len();
            for (i, mut lead) in unique.into_iter().enumerate() {
                if cancel.is_cancelled() {
                    break;
                }
                let over_cap = config.source == LeadSource::Gmail
                    && (stats.enriched as usize) >= self.tunables.analysis_cap;
                if !over_cap {
                    on_log(format!(
                        "[IA] Analizando {}/{}: {}",
                        i + 1,
                        batch_total,
                        lead.company_name
                    ));
                    pipeline.enrich(&mut lead, cancel).await;
                    if lead.status == LeadStatus::Ready {
                        stats.enriched += 1;
                    }
                }
                accepted.push(lead);
                if accepted.len() >= target {
                    break;
                }
            }
        }

        if cancel.is_cancelled() {
            on_log("[USUARIO] Generación detenida manualmente.".to_string());
        }

        stats.accepted = accepted.len() as u32;
        stats.with_email = accepted.iter().filter(|l| l.email().is_some()).count() as u32;

        self.persist_run(&accepted, user_id, run_id, config, started_at, on_log)
            .await;

        info!(%run_id, "{stats}");
        on_log(format!(
            "[RUN] COMPLETADO: {} leads ({} con email)",
            stats.accepted, stats.with_email
        ));

        accepted
    }

    async fn fetch_places(
        &self,
        runner: &JobRunner,
        intent: &SearchIntent,
        fetch_size: u32,
        cursor: u32,
        cancel: &CancelFlag,
    ) -> Result<Vec<Lead>, JobError> {
        let query = format!("{} {}", intent.search_query, intent.location);
        info!(query = query.as_str(), fetch_size, cursor, "Fetching place listings");

        // The places actor has no page cursor; retries widen the crawl
        // window instead, so later attempts can reach past the items the
        // first attempt already returned.
        let input = PlacesSearchInput {
            search_strings_array: vec![query],
            max_crawled_places_per_search: fetch_size.saturating_mul(cursor + 1),
            language: "es".to_string(),
            include_website_email: true,
            scrape_contacts: true,
            max_images: 0,
            max_reviews: 0,
        };

        let items: Vec<PlaceItem> = runner.run(PLACES_SCRAPER, &input, cancel).await?;
        Ok(items
            .into_iter()
            .map(|item| convert::place_to_lead(item, intent))
            .collect())
    }

    async fn fetch_profiles(
        &self,
        runner: &JobRunner,
        intent: &SearchIntent,
        fetch_size: u32,
        cursor: u32,
        cancel: &CancelFlag,
    ) -> Result<Vec<Lead>, JobError> {
        let role_terms = intent
            .target_roles
            .iter()
            .take(2)
            .cloned()
            .collect::<Vec<_>>()
            .join(" OR ");
        let search_query = format!(
            "site:linkedin.com/in \"{}\" \"{}\" \"{}\"",
            role_terms, intent.industry, intent.location
        );
        info!(query = search_query.as_str(), fetch_size, cursor, "Searching profiles");

        let input = SerpSearchInput {
            queries: search_query,
            max_pages_per_query: (cursor + 1).min(5),
            results_per_page: fetch_size.min(100),
            language_code: "es".to_string(),
            country_code: "es".to_string(),
            mobile_results: false,
        };

        let pages: Vec<SerpPage> = runner.run(SERP_SCRAPER, &input, cancel).await?;
        let organic = flatten_serp_pages(pages);
        let leads: Vec<Lead> = organic
            .iter()
            .filter_map(|result| convert::organic_to_lead(result, intent))
            .collect();
        info!(results = organic.len(), profiles = leads.len(), "Profile search complete");
        Ok(leads)
    }

    /// Secondary enrichment-by-contact-scrape for the listing channel, in
    /// batches. A failed batch only costs its own contacts. Returns how
    /// many candidates gained an email.
    async fn scrape_contacts(
        &self,
        runner: &JobRunner,
        candidates: &mut [Lead],
        cancel: &CancelFlag,
        on_log: &LogSink,
    ) -> u32 {
        let targets: Vec<String> = candidates
            .iter()
            .filter(|lead| lead.email().is_none())
            .filter_map(|lead| lead.website.clone())
            .collect();
        if targets.is_empty() {
            return 0;
        }
        on_log(format!("[GMAIL] Enriqueciendo {} leads sin email...", targets.len()));

        let runner = runner.with_poll_budget(SHORT_MAX_POLLS);
        let mut filled = 0u32;

        for batch in targets.chunks(self.tunables.contact_batch_size.max(1)) {
            if cancel.is_cancelled() {
                break;
            }
            let input = ContactScraperInput {
                start_urls: batch
                    .iter()
                    .map(|website| StartUrl {
                        url: format!("https://{website}"),
                    })
                    .collect(),
                max_requests_per_website: 3,
                same_domain_only: true,
            };

            let contacts: Vec<ContactItem> = match runner.run(CONTACT_SCRAPER, &input, cancel).await
            {
                Ok(contacts) => contacts,
                Err(e) => {
                    warn!(error = %e, "Contact scrape batch failed, continuing");
                    on_log("[GMAIL] Aviso: un lote de contactos falló, continuando...".to_string());
                    continue;
                }
            };

            for contact in contacts {
                let Some(domain) = contact.domain.as_deref().filter(|d| !d.is_empty()) else {
                    continue;
                };
                let Some(lead) = candidates.iter_mut().find(|lead| {
                    lead.website
                        .as_deref()
                        .is_some_and(|website| domain.contains(&website.replace("www.", "")))
                }) else {
                    continue;
                };

                let mut got_email = false;
                if let Some(dm) = lead.decision_maker.as_mut() {
                    if dm.email.is_empty() {
                        if let Some(email) = contact.emails.iter().find(|e| !e.is_empty()) {
                            dm.email = email.clone();
                            got_email = true;
                        }
                    }
                    if dm.phone.is_none() {
                        if let Some(phone) = contact.phones.iter().find(|p| !p.is_empty()) {
                            dm.phone = Some(phone.clone());
                        }
                    }
                    if dm.linkedin.is_none() {
                        if let Some(url) = contact.linked_in.as_ref().filter(|u| !u.is_empty()) {
                            dm.linkedin = Some(url.clone());
                        }
                    }
                }
                if got_email {
                    filled += 1;
                    if let Ok(next) = lead.status.advance(LeadStatus::Enriched) {
                        lead.status = next;
                    }
                }
            }
        }

        filled
    }

    /// Post-run persistence: accepted leads and the session record, both
    /// best-effort.
    async fn persist_run(
        &self,
        accepted: &[Lead],
        user_id: Option<&str>,
        run_id: Uuid,
        config: &SearchConfig,
        started_at: chrono::DateTime<Utc>,
        on_log: &LogSink,
    ) {
        let (Some(store), Some(user_id)) = (self.store.as_deref(), user_id) else {
            on_log("[DB] Resultados no guardados (sin usuario o sin base de datos).".to_string());
            return;
        };

        if !accepted.is_empty() {
            match store.persist(accepted, user_id, run_id).await {
                Ok(()) => on_log(format!("[DB] {} leads guardados en la nube.", accepted.len())),
                Err(e) => {
                    warn!(error = %e, "Failed to persist accepted leads");
                    on_log("[DB] Aviso: no se pudieron guardar los leads.".to_string());
                }
            }
        }

        let record = SessionRecord {
            run_id,
            user_id: user_id.to_string(),
            query: config.query.clone(),
            source: config.source,
            mode: config.mode,
            results: accepted.len() as u32,
            executed_at: started_at,
            completed_at: Utc::now(),
        };
        if let Err(e) = store.record_session(&record).await {
            warn!(error = %e, "Failed to record search session");
        }
    }
}

fn channel_tag(source: LeadSource) -> &'static str {
    match source {
        LeadSource::Gmail => "GMAIL",
        LeadSource::Linkedin => "LINKEDIN",
    }
}

/// Drop candidates that duplicate leads already accepted this run, or each
/// other within the batch: by website, company name (placeholders exempt)
/// or profile URL. Input order is preserved.
fn remove_session_duplicates(candidates: Vec<Lead>, accepted: &[Lead]) -> Vec<Lead> {
    let mut websites: HashSet<String> = HashSet::new();
    let mut names: HashSet<String> = HashSet::new();
    let mut profiles: HashSet<String> = HashSet::new();

    for lead in accepted {
        if let Some(website) = lead.website.as_deref() {
            let key = normalize_url(website);
            if !key.is_empty() {
                websites.insert(key);
            }
        }
        if !lead.company_name.is_empty() && !is_placeholder_name(&lead.company_name) {
            names.insert(normalize_name(&lead.company_name));
        }
        if let Some(profile) = lead.profile_url() {
            profiles.insert(profile.trim().to_lowercase());
        }
    }

    let mut survivors = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let website = candidate
            .website
            .as_deref()
            .map(normalize_url)
            .filter(|key| !key.is_empty());
        let name = (!candidate.company_name.is_empty()
            && !is_placeholder_name(&candidate.company_name))
        .then(|| normalize_name(&candidate.company_name));
        let profile = candidate.profile_url().map(|p| p.trim().to_lowercase());

        let duplicate = website.as_ref().is_some_and(|key| websites.contains(key))
            || name.as_ref().is_some_and(|key| names.contains(key))
            || profile.as_ref().is_some_and(|key| profiles.contains(key));
        if duplicate {
            continue;
        }

        if let Some(key) = website {
            websites.insert(key);
        }
        if let Some(key) = name {
            names.insert(key);
        }
        if let Some(key) = profile {
            profiles.insert(key);
        }
        survivors.push(candidate);
    }
    survivors
}

/// Stable reorder: candidates with a known email first, so the truncation
/// to the remaining need keeps the most actionable leads.
fn prefer_with_email(candidates: Vec<Lead>) -> Vec<Lead> {
    let (with_email, without): (Vec<_>, Vec<_>) = candidates
        .into_iter()
        .partition(|lead| lead.email().is_some());
    with_email.into_iter().chain(without).collect()
}
