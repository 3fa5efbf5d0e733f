use std::env;

/// Application configuration loaded from environment variables.
///
/// Nothing is hard-required at load time: the only credential the engine
/// cannot run without (the Apify token) is checked at run start, where its
/// absence is reported through the run's log stream instead of a panic.
#[derive(Debug, Clone)]
pub struct Config {
    /// Job-platform access token. Absent means acquisition runs abort
    /// immediately with an empty result.
    pub apify_token: Option<String>,

    /// Generation-service key. Absent means every AI step degrades to its
    /// deterministic fallback.
    pub openai_api_key: Option<String>,
    pub openai_model: String,

    /// Historical lead store. Absent means "no history known".
    pub database_url: Option<String>,

    /// Default geographic scope for query interpretation fallbacks.
    pub target_region: String,

    /// Keywords marking a lead as part of the high-value segment.
    pub high_value_keywords: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            apify_token: env::var("APIFY_API_TOKEN")
                .or_else(|_| env::var("APIFY_API_KEY"))
                .ok()
                .filter(|s| !s.is_empty()),
            openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|s| !s.is_empty()),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            target_region: env::var("TARGET_REGION").unwrap_or_else(|_| "España".to_string()),
            high_value_keywords: env::var("HIGH_VALUE_KEYWORDS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_lowercase())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_else(|_| default_high_value_keywords()),
        }
    }

    /// Log the loaded configuration without leaking secrets.
    pub fn log_redacted(&self) {
        tracing::info!(
            apify_token = self.apify_token.is_some(),
            openai_key = self.openai_api_key.is_some(),
            model = self.openai_model.as_str(),
            database = self.database_url.is_some(),
            region = self.target_region.as_str(),
            "Config loaded"
        );
    }
}

fn default_high_value_keywords() -> Vec<String> {
    ["npl", "activos adjudicados", "carteras", "distressed"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
