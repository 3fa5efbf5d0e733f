//! Deterministic fakes for the engine's external collaborators: a scripted
//! job platform, a hanging platform for cancellation tests, and an
//! in-memory lead store. No network, no database, no API keys.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use apexengine_common::Lead;
use apexengine_engine::store::{HistoricalLead, LeadStore, SessionRecord};
use apexengine_engine::traits::JobPlatform;
use apexengine_engine::LogSink;
use apify_client::RunData;

fn run_data(id: String, status: &str, dataset_id: String) -> RunData {
    RunData {
        id,
        status: status.to_string(),
        default_dataset_id: dataset_id,
        started_at: None,
        finished_at: None,
    }
}

// ---------------------------------------------------------------------------
// ScriptedPlatform
// ---------------------------------------------------------------------------

/// Each `start_run` for an actor consumes the next scripted dataset for that
/// actor (falling back to the actor's repeating default, then to an empty
/// list). Runs succeed on the first status poll.
#[derive(Default)]
pub struct ScriptedPlatform {
    queues: Mutex<HashMap<String, VecDeque<Value>>>,
    defaults: Mutex<HashMap<String, Value>>,
    datasets: Mutex<HashMap<String, Value>>,
    starts: Mutex<Vec<String>>,
    seq: AtomicU32,
}

impl ScriptedPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one dataset for the next run of `actor_id`.
    pub fn enqueue(&self, actor_id: &str, items: Value) {
        self.queues
            .lock()
            .unwrap()
            .entry(actor_id.to_string())
            .or_default()
            .push_back(items);
    }

    /// Dataset served whenever the actor's queue is empty. Without one, an
    /// exhausted queue serves an empty list.
    pub fn set_default(&self, actor_id: &str, items: Value) {
        self.defaults
            .lock()
            .unwrap()
            .insert(actor_id.to_string(), items);
    }

    /// How many runs were started for this actor.
    pub fn starts_for(&self, actor_id: &str) -> usize {
        self.starts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.as_str() == actor_id)
            .count()
    }
}

#[async_trait]
impl JobPlatform for ScriptedPlatform {
    async fn start_run(&self, actor_id: &str, _input: Value) -> apify_client::Result<RunData> {
        self.starts.lock().unwrap().push(actor_id.to_string());

        let items = self
            .queues
            .lock()
            .unwrap()
            .get_mut(actor_id)
            .and_then(|queue| queue.pop_front())
            .or_else(|| self.defaults.lock().unwrap().get(actor_id).cloned())
            .unwrap_or_else(|| json!([]));

        let n = self.seq.fetch_add(1, Ordering::SeqCst);
        let dataset_id = format!("ds-{n}");
        self.datasets
            .lock()
            .unwrap()
            .insert(dataset_id.clone(), items);

        Ok(run_data(format!("run-{n}"), "RUNNING", dataset_id))
    }

    async fn run_status(&self, _actor_id: &str, run_id: &str) -> apify_client::Result<RunData> {
        Ok(run_data(run_id.to_string(), "SUCCEEDED", String::new()))
    }

    async fn dataset_items(&self, dataset_id: &str) -> apify_client::Result<Value> {
        Ok(self
            .datasets
            .lock()
            .unwrap()
            .get(dataset_id)
            .cloned()
            .unwrap_or_else(|| json!([])))
    }
}

// ---------------------------------------------------------------------------
// HangingPlatform
// ---------------------------------------------------------------------------

/// Runs start fine but never leave RUNNING. Announces each start on a
/// channel so tests can cancel once a poll loop is underway.
pub struct HangingPlatform {
    started_tx: UnboundedSender<()>,
}

impl HangingPlatform {
    pub fn new(started_tx: UnboundedSender<()>) -> Self {
        Self { started_tx }
    }
}

#[async_trait]
impl JobPlatform for HangingPlatform {
    async fn start_run(&self, _actor_id: &str, _input: Value) -> apify_client::Result<RunData> {
        let _ = self.started_tx.send(());
        Ok(run_data("run-hang".to_string(), "RUNNING", "ds-hang".to_string()))
    }

    async fn run_status(&self, _actor_id: &str, run_id: &str) -> apify_client::Result<RunData> {
        Ok(run_data(run_id.to_string(), "RUNNING", String::new()))
    }

    async fn dataset_items(&self, _dataset_id: &str) -> apify_client::Result<Value> {
        Ok(json!([]))
    }
}

// ---------------------------------------------------------------------------
// MemoryLeadStore
// ---------------------------------------------------------------------------

/// In-memory store: scripted history per user, with persisted leads and
/// session records captured for assertions.
#[derive(Default)]
pub struct MemoryLeadStore {
    history: Mutex<HashMap<String, Vec<HistoricalLead>>>,
    pub persisted: Mutex<Vec<(String, Uuid, Vec<Lead>)>>,
    pub sessions: Mutex<Vec<SessionRecord>>,
}

impl MemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(self, user_id: &str, history: Vec<HistoricalLead>) -> Self {
        self.history
            .lock()
            .unwrap()
            .insert(user_id.to_string(), history);
        self
    }
}

#[async_trait]
impl LeadStore for MemoryLeadStore {
    async fn history(&self, user_id: &str) -> Result<Vec<HistoricalLead>> {
        Ok(self
            .history
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn persist(&self, leads: &[Lead], user_id: &str, run_id: Uuid) -> Result<()> {
        self.persisted
            .lock()
            .unwrap()
            .push((user_id.to_string(), run_id, leads.to_vec()));
        Ok(())
    }

    async fn record_session(&self, record: &SessionRecord) -> Result<()> {
        self.sessions.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Log capture
// ---------------------------------------------------------------------------

/// A log sink that records every line for later assertions.
pub fn capturing_log() -> (LogSink, Arc<Mutex<Vec<String>>>) {
    let lines: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&lines);
    let sink: LogSink = Arc::new(move |line: String| {
        captured.lock().unwrap().push(line);
    });
    (sink, lines)
}

/// A place listing item in the shape the places actor returns.
pub fn place_item(title: &str, website: &str, email: Option<&str>) -> Value {
    let mut item = json!({
        "placeId": format!("place-{title}"),
        "title": title,
        "website": website,
        "address": "Calle Mayor 1, Madrid",
        "categoryName": "Agencia inmobiliaria",
        "reviewsCount": 12,
        "totalScore": 4.2,
    });
    if let Some(email) = email {
        item["email"] = json!(email);
    }
    item
}

/// A SERP dataset page wrapping organic results.
pub fn serp_page(results: Vec<Value>) -> Value {
    json!([{ "organicResults": results }])
}

pub fn organic_profile(name: &str, role: &str, company: &str, slug: &str) -> Value {
    json!({
        "url": format!("https://es.linkedin.com/in/{slug}"),
        "title": format!("{name} - {role} - {company} | LinkedIn"),
        "description": format!("{name}. {role} en {company}."),
    })
}
