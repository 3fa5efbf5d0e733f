//! Historical lead store. The engine only ever reads history (pre-flight)
//! and writes accepted leads plus a session record (post-run); both writes
//! are best-effort from the orchestrator's perspective.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use apexengine_common::{Lead, LeadSource, SearchMode};

/// The identifying fields of one previously delivered lead, as needed to
/// build the deduplication key sets.
#[derive(Debug, Clone, Default)]
pub struct HistoricalLead {
    pub company_name: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
    pub profile_url: Option<String>,
}

/// One acquisition run's summary row.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub run_id: Uuid,
    pub user_id: String,
    pub query: String,
    pub source: LeadSource,
    pub mode: SearchMode,
    pub results: u32,
    pub executed_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

#[async_trait]
pub trait LeadStore: Send + Sync {
    /// All historical leads for a user. Callers degrade to "no history" on
    /// error; implementations do not need to soften failures themselves.
    async fn history(&self, user_id: &str) -> Result<Vec<HistoricalLead>>;

    /// Bulk-insert accepted leads, tagged with the owning user and run.
    async fn persist(&self, leads: &[Lead], user_id: &str, run_id: Uuid) -> Result<()>;

    /// Record one run's summary.
    async fn record_session(&self, record: &SessionRecord) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Postgres implementation
// ---------------------------------------------------------------------------

pub struct PgLeadStore {
    pool: PgPool,
}

impl PgLeadStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(database_url)
            .await
            .context("Failed to connect to lead store")?;
        Ok(Self { pool })
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeadStore for PgLeadStore {
    async fn history(&self, user_id: &str) -> Result<Vec<HistoricalLead>> {
        let rows = sqlx::query(
            "SELECT company_name, company_website, email, linkedin_url \
             FROM leads WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load lead history")?;

        Ok(rows
            .into_iter()
            .map(|row| HistoricalLead {
                company_name: row.get("company_name"),
                website: row.get("company_website"),
                email: row.get("email"),
                profile_url: row.get("linkedin_url"),
            })
            .collect())
    }

    async fn persist(&self, leads: &[Lead], user_id: &str, run_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for lead in leads {
            let dm = lead.decision_maker.as_ref();
            sqlx::query(
                "INSERT INTO leads (user_id, search_id, name, company_name, job_title, \
                 linkedin_url, email, phone, company_website, location, ai_summary, \
                 ai_pain_points, ai_business_moment, ai_is_npl_potential, status) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
            )
            .bind(user_id)
            .bind(run_id)
            .bind(dm.map(|d| d.name.as_str()).filter(|n| !n.is_empty()).unwrap_or(&lead.company_name))
            .bind(&lead.company_name)
            .bind(dm.map(|d| d.role.clone()).unwrap_or_default())
            .bind(lead.profile_url().unwrap_or_default())
            .bind(lead.email().unwrap_or_default())
            .bind(dm.and_then(|d| d.phone.clone()).unwrap_or_default())
            .bind(lead.website.clone().unwrap_or_default())
            .bind(lead.location.clone().unwrap_or_default())
            .bind(&lead.analysis.summary)
            .bind(serde_json::to_value(&lead.analysis.pain_points)?)
            .bind(&lead.analysis.business_moment)
            .bind(lead.high_value)
            .bind(lead.status.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to insert lead")?;
        }

        tx.commit().await?;
        info!(count = leads.len(), user_id, %run_id, "Persisted accepted leads");
        Ok(())
    }

    async fn record_session(&self, record: &SessionRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO search_history (id, user_id, search_query, source, mode, \
             total_results, results_extracted, status, executed_at, completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'completed', $8, $9)",
        )
        .bind(record.run_id)
        .bind(&record.user_id)
        .bind(&record.query)
        .bind(record.source.to_string())
        .bind(match record.mode {
            SearchMode::Fast => "fast",
            SearchMode::Deep => "deep",
        })
        .bind(record.results as i64)
        .bind(record.results as i64)
        .bind(record.executed_at)
        .bind(record.completed_at)
        .execute(&self.pool)
        .await
        .context("Failed to record search session")?;
        Ok(())
    }
}
