//! Job Runner — drives one external extraction job through the
//! start → poll → fetch protocol with a bounded poll budget and
//! cooperative cancellation.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use apexengine_common::CancelFlag;
use apify_client::ApifyError;

use crate::traits::JobPlatform;

/// Fixed wait between status polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default poll budget. At the 5s interval this allows a job five minutes.
pub const DEFAULT_MAX_POLLS: u32 = 60;

/// Poll budget for short job classes (research lookups, contact scrapes).
pub const SHORT_MAX_POLLS: u32 = 24;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job failed to start (status {status}): {body}")]
    Start { status: u16, body: String },

    #[error("Job run ended in terminal state {0}")]
    Failed(String),

    #[error("Job run did not finish within {polls} polls")]
    Timeout { polls: u32 },

    #[error("Job result set is not a list: {0}")]
    Data(String),

    #[error("Job platform error: {0}")]
    Platform(#[from] ApifyError),
}

pub struct JobRunner {
    platform: Arc<dyn JobPlatform>,
    poll_interval: Duration,
    max_polls: u32,
}

impl JobRunner {
    pub fn new(platform: Arc<dyn JobPlatform>) -> Self {
        Self {
            platform,
            poll_interval: POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }

    /// Same platform, smaller poll budget. Used for the short job classes
    /// inside the enrichment pipeline.
    pub fn with_poll_budget(&self, max_polls: u32) -> Self {
        Self {
            platform: Arc::clone(&self.platform),
            poll_interval: self.poll_interval,
            max_polls,
        }
    }

    /// Run a job to completion and deserialize its result items.
    ///
    /// Cancellation is checked between polls only; individual requests are
    /// short relative to the polling interval. A cancelled run yields an
    /// empty result set, not an error. Items that fail to deserialize as
    /// `T` are skipped with a warning rather than failing the whole set.
    pub async fn run<T: DeserializeOwned, I: Serialize>(
        &self,
        actor_id: &str,
        input: &I,
        cancel: &CancelFlag,
    ) -> Result<Vec<T>, JobError> {
        let input = serde_json::to_value(input)
            .map_err(|e| JobError::Platform(ApifyError::Parse(e.to_string())))?;
        let run = self
            .platform
            .start_run(actor_id, input)
            .await
            .map_err(start_error)?;
        let run_id = run.id;
        let dataset_id = run.default_dataset_id;

        info!(actor_id, run_id = run_id.as_str(), "Job run started, polling");

        let mut polls = 0u32;
        loop {
            if cancel.is_cancelled() {
                info!(actor_id, run_id = run_id.as_str(), "Run cancelled during poll wait");
                return Ok(Vec::new());
            }
            if polls >= self.max_polls {
                return Err(JobError::Timeout { polls });
            }

            tokio::time::sleep(self.poll_interval).await;
            polls += 1;

            if cancel.is_cancelled() {
                info!(actor_id, run_id = run_id.as_str(), "Run cancelled during poll wait");
                return Ok(Vec::new());
            }

            let status = self.platform.run_status(actor_id, &run_id).await?;
            match status.status.as_str() {
                "SUCCEEDED" => break,
                "FAILED" | "ABORTED" | "TIMED-OUT" => {
                    return Err(JobError::Failed(status.status));
                }
                other => {
                    if polls % 3 == 0 {
                        info!(actor_id, run_id = run_id.as_str(), status = other, polls, "Run in progress");
                    }
                }
            }
        }

        let items = match self.platform.dataset_items(&dataset_id).await? {
            Value::Array(items) => items,
            other => {
                return Err(JobError::Data(format!(
                    "expected an array of items, got {}",
                    json_kind(&other)
                )));
            }
        };

        let total = items.len();
        let parsed: Vec<T> = items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(actor_id, error = %e, "Skipping malformed result item");
                    None
                }
            })
            .collect();

        info!(actor_id, total, parsed = parsed.len(), "Job run complete");
        Ok(parsed)
    }
}

/// Failures before a run id exists are start failures; the HTTP status and
/// a truncated body travel with the error for the attempt log.
fn start_error(err: ApifyError) -> JobError {
    match err {
        ApifyError::Api { status, message } => JobError::Start {
            status,
            body: message,
        },
        other => JobError::Platform(other),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apify_client::RunData;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fake platform whose runs stay in a fixed status forever.
    struct StuckPlatform {
        status: &'static str,
        polls_seen: AtomicU32,
    }

    impl StuckPlatform {
        fn new(status: &'static str) -> Self {
            Self {
                status,
                polls_seen: AtomicU32::new(0),
            }
        }
    }

    fn run_data(status: &str) -> RunData {
        serde_json::from_value(serde_json::json!({
            "id": "run-1",
            "status": status,
            "defaultDatasetId": "ds-1",
        }))
        .unwrap()
    }

    #[async_trait]
    impl JobPlatform for StuckPlatform {
        async fn start_run(&self, _actor_id: &str, _input: Value) -> apify_client::Result<RunData> {
            Ok(run_data("RUNNING"))
        }

        async fn run_status(
            &self,
            _actor_id: &str,
            _run_id: &str,
        ) -> apify_client::Result<RunData> {
            self.polls_seen.fetch_add(1, Ordering::SeqCst);
            Ok(run_data(self.status))
        }

        async fn dataset_items(&self, _dataset_id: &str) -> apify_client::Result<Value> {
            Ok(serde_json::json!([]))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn never_terminal_status_times_out() {
        let runner = JobRunner::new(Arc::new(StuckPlatform::new("RUNNING"))).with_poll_budget(5);
        let cancel = CancelFlag::new();

        let result: Result<Vec<Value>, JobError> = runner
            .run("actor", &serde_json::json!({}), &cancel)
            .await;

        match result {
            Err(JobError::Timeout { polls }) => assert_eq!(polls, 5),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_failure_raises_failed() {
        let runner = JobRunner::new(Arc::new(StuckPlatform::new("ABORTED")));
        let cancel = CancelFlag::new();

        let result: Result<Vec<Value>, JobError> = runner
            .run("actor", &serde_json::json!({}), &cancel)
            .await;

        match result {
            Err(JobError::Failed(status)) => assert_eq!(status, "ABORTED"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_returns_empty_within_one_interval() {
        let platform = Arc::new(StuckPlatform::new("RUNNING"));
        let runner = JobRunner::new(Arc::clone(&platform) as Arc<dyn JobPlatform>);
        let cancel = CancelFlag::new();
        cancel.cancel();

        let result: Vec<Value> = runner
            .run("actor", &serde_json::json!({}), &cancel)
            .await
            .unwrap();

        assert!(result.is_empty());
        assert_eq!(platform.polls_seen.load(Ordering::SeqCst), 0);
    }

    /// Platform that succeeds immediately but returns a non-list result set.
    struct ScalarDataset;

    #[async_trait]
    impl JobPlatform for ScalarDataset {
        async fn start_run(&self, _actor_id: &str, _input: Value) -> apify_client::Result<RunData> {
            Ok(run_data("RUNNING"))
        }

        async fn run_status(
            &self,
            _actor_id: &str,
            _run_id: &str,
        ) -> apify_client::Result<RunData> {
            Ok(run_data("SUCCEEDED"))
        }

        async fn dataset_items(&self, _dataset_id: &str) -> apify_client::Result<Value> {
            Ok(serde_json::json!({"error": "not a list"}))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn non_list_result_set_is_a_data_error() {
        let runner = JobRunner::new(Arc::new(ScalarDataset));
        let cancel = CancelFlag::new();

        let result: Result<Vec<Value>, JobError> = runner
            .run("actor", &serde_json::json!({}), &cancel)
            .await;

        assert!(matches!(result, Err(JobError::Data(_))));
    }

    /// Start rejections carry the platform's HTTP status and body.
    struct RejectsStart;

    #[async_trait]
    impl JobPlatform for RejectsStart {
        async fn start_run(&self, _actor_id: &str, _input: Value) -> apify_client::Result<RunData> {
            Err(ApifyError::Api {
                status: 402,
                message: "payment required".into(),
            })
        }

        async fn run_status(
            &self,
            _actor_id: &str,
            _run_id: &str,
        ) -> apify_client::Result<RunData> {
            unreachable!()
        }

        async fn dataset_items(&self, _dataset_id: &str) -> apify_client::Result<Value> {
            unreachable!()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_rejection_carries_status_and_body() {
        let runner = JobRunner::new(Arc::new(RejectsStart));
        let cancel = CancelFlag::new();

        let result: Result<Vec<Value>, JobError> = runner
            .run("actor", &serde_json::json!({}), &cancel)
            .await;

        match result {
            Err(JobError::Start { status, body }) => {
                assert_eq!(status, 402);
                assert_eq!(body, "payment required");
            }
            other => panic!("expected start error, got {other:?}"),
        }
    }
}
