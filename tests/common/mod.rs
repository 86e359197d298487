//! Shared fixtures: a scripted in-memory API and a recording session sink.

#![allow(dead_code)]

use async_trait::async_trait;
use guepard_lib::api::{ApiError, ResourceApi};
use guepard_lib::models::{ResourceKind, ResourceState};
use guepard_lib::subscriptions::{Notification, NotificationSink};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// `ResourceApi` whose responses are set by the test.
///
/// Ids without a scripted response fail with `NotFound`. A gated id blocks
/// inside `fetch` until the gate is opened.
#[derive(Default)]
pub struct ScriptedApi {
    responses: Mutex<HashMap<String, Result<Value, ApiError>>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, id: &str, body: Value) {
        self.responses
            .lock()
            .unwrap()
            .insert(id.to_string(), Ok(body));
    }

    /// Shorthand for a deployment payload with the given status fields.
    pub fn set_status(&self, id: &str, status: &str, compute_status: Option<&str>) {
        let mut body = json!({ "id": id, "name": format!("{}-name", id), "status": status });
        if let Some(compute) = compute_status {
            body["computeStatus"] = json!(compute);
        }
        self.set(id, body);
    }

    pub fn fail(&self, id: &str, err: ApiError) {
        self.responses
            .lock()
            .unwrap()
            .insert(id.to_string(), Err(err));
    }

    /// Make fetches of `id` wait until the returned gate is notified.
    pub fn gate(&self, id: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(id.to_string(), gate.clone());
        gate
    }

    pub fn calls(&self, id: &str) -> usize {
        self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ResourceApi for ScriptedApi {
    async fn fetch(&self, _kind: ResourceKind, id: &str) -> Result<ResourceState, ApiError> {
        *self.calls.lock().unwrap().entry(id.to_string()).or_default() += 1;

        let gate = self.gates.lock().unwrap().get(id).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let response = self
            .responses
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_else(|| Err(ApiError::NotFound(id.to_string())));
        response.map(|body| ResourceState::from_value(body).unwrap())
    }
}

/// Session sink that keeps everything it is handed.
#[derive(Default)]
pub struct RecordingSink {
    received: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn all(&self) -> Vec<Notification> {
        self.received.lock().unwrap().clone()
    }

    /// Payloads of log notifications emitted under `logger`.
    pub fn logs(&self, logger: &str) -> Vec<Value> {
        self.all()
            .into_iter()
            .filter_map(|notification| match notification {
                Notification::Log {
                    logger: name, data, ..
                } if name == logger => Some(data),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.received.lock().unwrap().clear();
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, notification: Notification) -> Result<(), String> {
        self.received.lock().unwrap().push(notification);
        Ok(())
    }
}

/// Session sink whose deliveries block until the test opens the gate.
///
/// Each `open` lets one pending (or the next) delivery through to the inner
/// recorder.
#[derive(Default)]
pub struct GatedSink {
    inner: RecordingSink,
    gate: Notify,
    entered: AtomicUsize,
}

impl GatedSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of deliveries that have started, finished or not.
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn open(&self) {
        self.gate.notify_one();
    }

    pub fn recorded(&self) -> &RecordingSink {
        &self.inner
    }
}

#[async_trait]
impl NotificationSink for GatedSink {
    async fn deliver(&self, notification: Notification) -> Result<(), String> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        self.inner.deliver(notification).await
    }
}
