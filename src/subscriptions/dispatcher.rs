//! Notification Dispatcher
//!
//! Delivers change events, operation results and progress updates to the
//! session currently attached, if any. Delivery is fire-and-forget: with no
//! session attached the message is dropped (never queued), and a failed
//! delivery is only logged.

use crate::models::ChangeEvent;
use crate::utils::now_utc;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, PoisonError, RwLock};

/// Logger name attached to change notifications.
pub const CHANGE_LOGGER: &str = "guepard.subscriptions";

/// Logger name attached to operation-result notifications.
pub const OPERATION_LOGGER: &str = "guepard.operations";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// Message handed to a session.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Log-style message with a structured payload
    Log {
        level: Severity,
        logger: String,
        data: Value,
    },
    /// Progress update correlated by `token`
    Progress {
        token: String,
        progress: u32,
        total: u32,
        message: Option<String>,
    },
}

/// A delivery target, typically a connected MCP peer.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: Notification) -> Result<(), String>;

    /// Whether the underlying transport is gone for good.
    fn is_closed(&self) -> bool {
        false
    }
}

struct AttachedSession {
    session_id: String,
    sink: Arc<dyn NotificationSink>,
}

/// Progress token shared by the start and completion updates of one operation.
pub fn progress_token(operation: &str, resource_id: &str) -> String {
    format!("{}_{}", operation, resource_id)
}

/// Holds the single optional delivery target.
#[derive(Clone, Default)]
pub struct NotificationDispatcher {
    target: Arc<RwLock<Option<AttachedSession>>>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `sink` the delivery target, replacing any previous session.
    pub fn attach(&self, session_id: impl Into<String>, sink: Arc<dyn NotificationSink>) {
        let session_id = session_id.into();
        let mut target = self.target.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = target.as_ref() {
            log::info!(
                "Notification target switched from {} to {}",
                previous.session_id,
                session_id
            );
        } else {
            log::info!("Notification target attached: {}", session_id);
        }
        *target = Some(AttachedSession { session_id, sink });
    }

    /// Detach `session_id` if it is still the current target.
    ///
    /// A session that was already replaced cannot detach its successor.
    pub fn detach(&self, session_id: &str) -> bool {
        let mut target = self.target.write().unwrap_or_else(PoisonError::into_inner);
        match target.as_ref() {
            Some(current) if current.session_id == session_id => {
                *target = None;
                log::info!("Notification target detached: {}", session_id);
                true
            }
            _ => false,
        }
    }

    pub fn attached_session(&self) -> Option<String> {
        self.target
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|current| current.session_id.clone())
    }

    pub fn is_attached(&self) -> bool {
        self.attached_session().is_some()
    }

    /// Report a detected transition.
    pub async fn notify_change(&self, event: &ChangeEvent) {
        let data = json!({
            "type": "deployment_change",
            "event": event.kind.as_str(),
            "deployment_id": event.resource_id,
            "old_value": event.old_value,
            "new_value": event.new_value,
            "timestamp": event.timestamp,
            "message": event.summary(),
        });
        self.deliver(Notification::Log {
            level: Severity::Info,
            logger: CHANGE_LOGGER.to_string(),
            data,
        })
        .await;
    }

    /// Report the outcome of a tool-driven operation; failures are raised to
    /// error severity.
    pub async fn notify_operation_result(
        &self,
        operation: &str,
        resource_id: &str,
        success: bool,
        details: Option<Value>,
    ) {
        let (level, event, verb) = if success {
            (Severity::Info, "operation_completed", "succeeded")
        } else {
            (Severity::Error, "operation_failed", "failed")
        };
        let data = json!({
            "type": "operation_result",
            "event": event,
            "operation": operation,
            "deployment_id": resource_id,
            "success": success,
            "details": details,
            "timestamp": now_utc(),
            "message": format!("{} {} for deployment {}", operation, verb, resource_id),
        });
        self.deliver(Notification::Log {
            level,
            logger: OPERATION_LOGGER.to_string(),
            data,
        })
        .await;
    }

    /// Report progress (clamped to 0..=100) for `operation` on `resource_id`.
    pub async fn notify_progress(
        &self,
        operation: &str,
        resource_id: &str,
        progress: u32,
        message: Option<&str>,
    ) {
        let progress = progress.min(100);
        let detail = match message {
            Some(text) => text.to_string(),
            None => format!("{}%", progress),
        };
        let message = format!("{} {}: {} ({})", operation, resource_id, detail, now_utc());
        self.deliver(Notification::Progress {
            token: progress_token(operation, resource_id),
            progress,
            total: 100,
            message: Some(message),
        })
        .await;
    }

    async fn deliver(&self, notification: Notification) {
        let current = {
            let target = self.target.read().unwrap_or_else(PoisonError::into_inner);
            target
                .as_ref()
                .map(|session| (session.session_id.clone(), session.sink.clone()))
        };

        let Some((session_id, sink)) = current else {
            log::debug!("No session attached, dropping notification");
            return;
        };

        if sink.is_closed() {
            log::debug!("Session {} transport closed, detaching", session_id);
            self.detach(&session_id);
            return;
        }

        if let Err(e) = sink.deliver(notification).await {
            log::debug!("Failed to notify session {}: {}", session_id, e);
        }
    }
}
