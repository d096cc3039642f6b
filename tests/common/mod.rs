//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use procedex::fetch::EntitySource;
use procedex::{FetchKey, ProcedexError, Result, RetryConfig};

/// Scripted in-memory upstream.
///
/// Keys without a payload answer `NotFound`. Queued failures are returned
/// (one per call) before the payload; a persistent failure wins over both.
#[derive(Default)]
pub struct MockSource {
    payloads: Mutex<HashMap<FetchKey, Value>>,
    queued: Mutex<HashMap<FetchKey, VecDeque<ProcedexError>>>,
    persistent: Mutex<HashMap<FetchKey, ProcedexError>>,
    calls: Mutex<HashMap<FetchKey, u32>>,
    total: AtomicU32,
    delay: Option<Duration>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with(self, key: FetchKey, payload: Value) -> Self {
        self.put(key, payload);
        self
    }

    pub fn with_procedure(self, id: u64, title: &str, keywords: &[&str]) -> Self {
        self.with(FetchKey::procedure(id), procedure_json(id, title, keywords))
    }

    pub fn put(&self, key: FetchKey, payload: Value) {
        self.payloads.lock().unwrap().insert(key, payload);
    }

    pub fn delete(&self, key: FetchKey) {
        self.payloads.lock().unwrap().remove(&key);
    }

    /// Fail the next call for `key` with `error`.
    pub fn fail_next(&self, key: FetchKey, error: ProcedexError) {
        self.queued
            .lock()
            .unwrap()
            .entry(key)
            .or_default()
            .push_back(error);
    }

    /// Fail every call for `key` until [`MockSource::heal`].
    pub fn fail_always(&self, key: FetchKey, error: ProcedexError) {
        self.persistent.lock().unwrap().insert(key, error);
    }

    pub fn heal(&self, key: FetchKey) {
        self.persistent.lock().unwrap().remove(&key);
    }

    pub fn calls(&self, key: FetchKey) -> u32 {
        self.calls.lock().unwrap().get(&key).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntitySource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(&self, key: FetchKey) -> Result<Value> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.calls.lock().unwrap().entry(key).or_default() += 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.persistent.lock().unwrap().get(&key) {
            return Err(error.clone());
        }
        if let Some(error) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        self.payloads
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or(ProcedexError::NotFound(key))
    }
}

/// Retries without meaningful backoff.
pub fn fast_retry() -> RetryConfig {
    RetryConfig::new()
        .max_attempts(3)
        .initial_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(5))
}

pub fn transient() -> ProcedexError {
    ProcedexError::Http("connection reset by peer".to_string())
}

pub fn procedure_json(id: u64, title: &str, keywords: &[&str]) -> Value {
    json!({
        "id": id,
        "title": title,
        "keywords": keywords,
        "url": format!("https://tanzania.eregulations.org/procedure/{id}"),
        "blocks": [
            {
                "id": 1,
                "steps": [
                    {
                        "id": 10,
                        "title": "Submit application",
                        "description": "Fill in the form",
                        "online": { "url": "https://portal.example/apply" },
                        "institution": { "id": 4, "name": "Business Registrations and Licensing Agency" }
                    },
                    {
                        "id": 11,
                        "title": "Collect certificate",
                        "institution": { "id": 5, "name": "Tanzania Revenue Authority" }
                    }
                ]
            }
        ]
    })
}

pub fn costs_json(total: f64, currency: &str) -> Value {
    json!({
        "totalCost": total,
        "currency": currency,
        "items": [{ "name": "Registration fee", "amount": total }]
    })
}

pub fn requirements_json(names: &[&str]) -> Value {
    let items: Vec<Value> = names.iter().map(|name| json!({ "name": name })).collect();
    json!({ "items": items })
}

pub fn institution_json(id: u64, name: &str) -> Value {
    json!({ "id": id, "name": name, "phone": "+255 22 218 0113" })
}
