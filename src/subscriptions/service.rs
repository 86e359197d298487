//! Subscription Service
//!
//! The operations the tool layer calls. Owns the registry, the policy, the
//! dispatcher and the monitor, and wires them together: subscribing starts
//! the monitor lazily, and tool calls go through the policy before
//! auto-subscribing.

use super::dispatcher::NotificationDispatcher;
use super::error::SubscriptionError;
use super::monitor::{MonitoringLoop, DEFAULT_FETCH_TIMEOUT, DEFAULT_INTERVAL};
use super::policy::{AutoSubscriptionPolicy, PolicyState};
use super::registry::{SubscribeOutcome, SubscriptionRegistry};
use crate::api::{ApiError, ResourceApi};
use crate::models::{ResourceKind, ResourceState};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Subscription source recorded for explicit subscribe calls.
pub const EXPLICIT_SUBSCRIBE_VIA: &str = "subscribe_deployment";

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub monitor_interval: Duration,
    pub fetch_timeout: Duration,
    /// Start the monitor on the first successful subscription
    pub auto_start: bool,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            monitor_interval: DEFAULT_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            auto_start: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionReport {
    pub deployment_id: String,
    pub changed: bool,
    pub message: String,
    pub total_subscriptions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitoringStatus {
    pub running: bool,
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub enabled: bool,
    pub subscription_count: usize,
    pub subscribed_ids: Vec<String>,
    pub per_tool_policy: BTreeMap<String, bool>,
    pub monitoring: MonitoringStatus,
    pub session_attached: bool,
    pub active_sessions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitoringReport {
    pub changed: bool,
    pub running: bool,
    pub interval_secs: Option<u64>,
    pub message: String,
}

/// Result of a successful auto-subscription.
#[derive(Debug, Clone, Serialize)]
pub struct AutoSubscription {
    pub deployment_id: String,
    pub tool: String,
    pub newly_subscribed: bool,
    pub total_subscriptions: usize,
}

impl AutoSubscription {
    /// Lines appended to the tool's response text.
    pub fn message(&self) -> String {
        format!(
            "Automatically subscribed to deployment {} (via {})\nTotal subscriptions: {}",
            self.deployment_id, self.tool, self.total_subscriptions
        )
    }
}

#[derive(Clone)]
pub struct SubscriptionService {
    registry: SubscriptionRegistry,
    policy: Arc<AutoSubscriptionPolicy>,
    dispatcher: NotificationDispatcher,
    monitor: MonitoringLoop,
    api: Arc<dyn ResourceApi>,
    settings: ServiceSettings,
    /// Connected MCP sessions sharing this service
    sessions: Arc<Mutex<usize>>,
}

impl SubscriptionService {
    pub fn new(
        api: Arc<dyn ResourceApi>,
        policy: AutoSubscriptionPolicy,
        settings: ServiceSettings,
    ) -> Self {
        let registry = SubscriptionRegistry::new();
        let dispatcher = NotificationDispatcher::new();
        let monitor = MonitoringLoop::new(
            registry.clone(),
            api.clone(),
            dispatcher.clone(),
            settings.fetch_timeout,
        );
        Self {
            registry,
            policy: Arc::new(policy),
            dispatcher,
            monitor,
            api,
            settings,
            sessions: Arc::new(Mutex::new(0)),
        }
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &AutoSubscriptionPolicy {
        &self.policy
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    pub fn monitor(&self) -> &MonitoringLoop {
        &self.monitor
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Explicitly watch `id`.
    pub async fn subscribe(&self, id: &str) -> Result<SubscriptionReport, SubscriptionError> {
        self.subscribe_via(id, EXPLICIT_SUBSCRIBE_VIA).await
    }

    /// Watch `id`, recording `via` as the subscription source.
    pub async fn subscribe_via(
        &self,
        id: &str,
        via: &str,
    ) -> Result<SubscriptionReport, SubscriptionError> {
        let id = id.trim();
        let outcome = self.registry.subscribe(id, Some(via));
        let message = match outcome {
            SubscribeOutcome::Rejected => {
                return Err(SubscriptionError::InvalidTarget(id.to_string()))
            }
            SubscribeOutcome::Subscribed => {
                log::info!("Subscribed to deployment {} via {}", id, via);
                self.ensure_monitoring().await;
                format!("Subscribed to notifications for deployment: {}", id)
            }
            SubscribeOutcome::AlreadySubscribed => {
                format!("Already subscribed to deployment: {}", id)
            }
        };

        Ok(SubscriptionReport {
            deployment_id: id.to_string(),
            changed: outcome == SubscribeOutcome::Subscribed,
            message,
            total_subscriptions: self.registry.len(),
        })
    }

    /// Stop watching `id`. Unsubscribing a non-member is not an error.
    pub async fn unsubscribe(&self, id: &str) -> Result<SubscriptionReport, SubscriptionError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(SubscriptionError::InvalidTarget(id.to_string()));
        }

        let was_subscribed = self.registry.unsubscribe(id);
        let message = if was_subscribed {
            log::info!("Unsubscribed from deployment {}", id);
            format!("Unsubscribed from notifications for deployment: {}", id)
        } else {
            format!("Deployment {} was not subscribed", id)
        };

        Ok(SubscriptionReport {
            deployment_id: id.to_string(),
            changed: was_subscribed,
            message,
            total_subscriptions: self.registry.len(),
        })
    }

    /// Text report of the watched deployments, optionally with live status.
    pub async fn list_subscriptions(
        &self,
        include_status: bool,
        include_compute_status: bool,
    ) -> String {
        let ids = self.registry.list();
        if ids.is_empty() {
            return "No active subscriptions".to_string();
        }

        if !include_status {
            let lines: Vec<String> = ids.iter().map(|id| format!("• {}", id)).collect();
            return format!("Active subscriptions ({}):\n{}", ids.len(), lines.join("\n"));
        }

        let mut lines = Vec::with_capacity(ids.len());
        for id in &ids {
            lines.push(self.status_line(id, include_compute_status).await);
        }
        format!(
            "Subscribed deployments status ({}):\n{}",
            ids.len(),
            lines.join("\n")
        )
    }

    async fn status_line(&self, id: &str, include_compute_status: bool) -> String {
        let fetched = tokio::time::timeout(
            self.settings.fetch_timeout,
            self.api.fetch(ResourceKind::Deployment, id),
        )
        .await
        .unwrap_or_else(|_| Err(ApiError::Timeout(self.settings.fetch_timeout.as_secs())));

        match fetched {
            Ok(state) => {
                let mut line = format!(
                    "✅ {} ({}): {}",
                    id,
                    state.name().unwrap_or("Unknown"),
                    field_text(state.status())
                );
                if include_compute_status {
                    line.push_str(&format!(" [Compute: {}]", field_text(state.compute_status())));
                }
                line
            }
            Err(e) => {
                let mut line = format!("❌ {}: Error - {}", id, e);
                if let Some(cached) = self.registry.snapshot(id) {
                    line.push_str(&format!(" (last known: {})", field_text(cached.status())));
                }
                line
            }
        }
    }

    /// Update the auto-subscription policy.
    pub fn configure(
        &self,
        enabled: Option<bool>,
        per_tool: Option<HashMap<String, bool>>,
    ) -> Result<PolicyState, SubscriptionError> {
        self.policy.configure(enabled, per_tool)
    }

    pub async fn status(&self) -> StatusReport {
        let policy = self.policy.snapshot();
        StatusReport {
            enabled: policy.global_enabled,
            subscription_count: self.registry.len(),
            subscribed_ids: self.registry.list(),
            per_tool_policy: policy.per_tool,
            monitoring: MonitoringStatus {
                running: self.monitor.is_running().await,
                interval_secs: self.monitor.interval().await.map(|d| d.as_secs()),
            },
            session_attached: self.dispatcher.is_attached(),
            active_sessions: *self.sessions.lock().await,
        }
    }

    /// Drop every subscription; returns how many were removed.
    pub fn clear_all(&self) -> usize {
        let count = self.registry.clear_all();
        log::info!("Cleared {} subscriptions", count);
        count
    }

    /// Start the monitor; `None` uses the configured interval.
    pub async fn start_monitoring(&self, interval: Option<Duration>) -> MonitoringReport {
        let interval = interval.unwrap_or(self.settings.monitor_interval);
        let started = self.monitor.start(interval).await;
        let actual = self.monitor.interval().await;
        let message = match (started, actual) {
            (true, Some(d)) => format!("Monitoring started (every {}s)", d.as_secs()),
            (false, Some(d)) => format!("Monitoring already running (every {}s)", d.as_secs()),
            (_, None) => "Monitoring is not running".to_string(),
        };
        MonitoringReport {
            changed: started,
            running: actual.is_some(),
            interval_secs: actual.map(|d| d.as_secs()),
            message,
        }
    }

    pub async fn stop_monitoring(&self) -> MonitoringReport {
        let stopped = self.monitor.stop().await;
        MonitoringReport {
            changed: stopped,
            running: false,
            interval_secs: None,
            message: if stopped {
                "Monitoring stopped".to_string()
            } else {
                "Monitoring was not running".to_string()
            },
        }
    }

    /// Subscribe `id` on behalf of `tool_name` if the policy allows it.
    ///
    /// `baseline` is a payload the tool already fetched for the deployment;
    /// it becomes the baseline when none exists yet. Returns `None` when the
    /// policy declines or the id is not subscribable.
    pub async fn auto_subscribe(
        &self,
        tool_name: &str,
        id: &str,
        baseline: Option<Value>,
    ) -> Option<AutoSubscription> {
        if !self.policy.is_enabled(tool_name) {
            return None;
        }

        let id = id.trim();
        let outcome = self.registry.subscribe(id, Some(tool_name));
        if outcome.is_rejected() {
            log::debug!("Skipping auto-subscription for invalid id '{}'", id);
            return None;
        }

        if let Some(state) = baseline.and_then(ResourceState::from_value) {
            self.registry.seed_baseline(id, state);
        }

        let newly_subscribed = outcome == SubscribeOutcome::Subscribed;
        if newly_subscribed {
            log::info!("Auto-subscribed to deployment {} via {}", id, tool_name);
            self.ensure_monitoring().await;
        }

        Some(AutoSubscription {
            deployment_id: id.to_string(),
            tool: tool_name.to_string(),
            newly_subscribed,
            total_subscriptions: self.registry.len(),
        })
    }

    /// Record a newly connected session. Returns the live session count.
    pub async fn session_opened(&self) -> usize {
        let mut live = self.sessions.lock().await;
        *live += 1;
        *live
    }

    /// Record that `session_id` disconnected.
    ///
    /// Detaches it from the dispatcher if it was the notification target.
    /// When it was the last live session the monitor is stopped before this
    /// returns, and the result is `true`.
    pub async fn session_closed(&self, session_id: &str) -> bool {
        self.dispatcher.detach(session_id);

        let mut live = self.sessions.lock().await;
        *live = live.saturating_sub(1);
        if *live > 0 {
            return false;
        }
        if self.monitor.stop().await {
            log::info!("Last MCP session closed, monitoring stopped");
        }
        true
    }

    /// Stop background work regardless of connected sessions.
    pub async fn shutdown(&self) {
        self.monitor.stop().await;
    }

    async fn ensure_monitoring(&self) {
        if self.settings.auto_start {
            self.monitor.start(self.settings.monitor_interval).await;
        }
    }
}

fn field_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "unknown".to_string(),
        Some(other) => other.to_string(),
    }
}
