use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use apexengine_common::{Config, LeadSource, SearchConfig, SearchMode};
use apexengine_engine::{LogSink, Orchestrator};

/// Run one lead acquisition from the command line.
#[derive(Parser, Debug)]
#[command(name = "apexengine", about = "Quota-driven lead acquisition engine")]
struct Cli {
    /// Free-text search, e.g. "inmobiliarias en Madrid".
    query: String,

    /// Acquisition channel: gmail (Google Maps listings) or linkedin.
    #[arg(long, default_value = "gmail")]
    source: String,

    /// Target number of accepted leads.
    #[arg(long, default_value_t = 10)]
    max_results: u32,

    /// Search mode: fast or deep.
    #[arg(long, default_value = "fast")]
    mode: String,

    /// User id for history deduplication and persistence.
    #[arg(long)]
    user: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("apexengine=info".parse()?))
        .init();

    info!("ApexEngine starting...");

    let cli = Cli::parse();
    let config = Config::from_env();
    config.log_redacted();

    let search = SearchConfig {
        query: cli.query,
        source: match cli.source.as_str() {
            "linkedin" => LeadSource::Linkedin,
            _ => LeadSource::Gmail,
        },
        mode: match cli.mode.as_str() {
            "deep" => SearchMode::Deep,
            _ => SearchMode::Fast,
        },
        max_results: cli.max_results,
        advanced_filters: None,
    };

    let orchestrator = Arc::new(Orchestrator::from_config(&config).await);

    let on_log: LogSink = Arc::new(|line| println!("{line}"));
    let cancel = apexengine_common::CancelFlag::new();
    let accepted = orchestrator
        .run(&search, cli.user.as_deref(), &cancel, &on_log)
        .await;

    println!("{}", serde_json::to_string_pretty(&accepted)?);
    Ok(())
}
