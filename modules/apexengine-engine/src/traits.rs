// Trait abstractions for the engine's external collaborators.
//
// JobPlatform — the job-execution platform (start/status/items). The HTTP
//   implementation is apify_client::ApifyClient; tests script a fake.
// TextGenerator — one chat round trip against the generation service.
//
// These enable deterministic testing of the poll loop, the interpreter and
// the enrichment pipeline: no network, no API keys.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use apify_client::{ApifyClient, RunData};

#[async_trait]
pub trait JobPlatform: Send + Sync {
    /// Submit a job run for an actor. Returns run metadata carrying the run
    /// id and the result-set (dataset) id.
    async fn start_run(&self, actor_id: &str, input: Value) -> apify_client::Result<RunData>;

    /// Read the current status of a run.
    async fn run_status(&self, actor_id: &str, run_id: &str) -> apify_client::Result<RunData>;

    /// Fetch the items of a result set as raw JSON.
    async fn dataset_items(&self, dataset_id: &str) -> apify_client::Result<Value>;
}

#[async_trait]
impl JobPlatform for ApifyClient {
    async fn start_run(&self, actor_id: &str, input: Value) -> apify_client::Result<RunData> {
        self.start_actor_run(actor_id, &input).await
    }

    async fn run_status(&self, actor_id: &str, run_id: &str) -> apify_client::Result<RunData> {
        ApifyClient::run_status(self, actor_id, run_id).await
    }

    async fn dataset_items(&self, dataset_id: &str) -> apify_client::Result<Value> {
        ApifyClient::dataset_items(self, dataset_id).await
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// One chat round trip. Any transport, API or deadline failure is an
    /// error; callers always have a deterministic fallback.
    async fn chat(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String>;
}

#[async_trait]
impl TextGenerator for ai_client::OpenAi {
    async fn chat(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        ai_client::OpenAi::chat(self, system, user, temperature, max_tokens).await
    }
}
