//! MCP session sink
//!
//! Adapts a connected rmcp peer to the dispatcher's `NotificationSink`.
//! Log notifications become `notifications/message`, progress updates
//! become `notifications/progress`.

use crate::subscriptions::{Notification, NotificationSink, Severity};
use async_trait::async_trait;
use rmcp::model::{
    LoggingLevel, LoggingMessageNotificationParam, NumberOrString, ProgressNotificationParam,
    ProgressToken,
};
use rmcp::service::{Peer, RoleServer};

/// Delivery target backed by an rmcp peer handle.
pub struct PeerSink {
    peer: Peer<RoleServer>,
}

impl PeerSink {
    pub fn new(peer: Peer<RoleServer>) -> Self {
        Self { peer }
    }
}

fn logging_level(severity: Severity) -> LoggingLevel {
    match severity {
        Severity::Info => LoggingLevel::Info,
        Severity::Error => LoggingLevel::Error,
    }
}

#[async_trait]
impl NotificationSink for PeerSink {
    async fn deliver(&self, notification: Notification) -> Result<(), String> {
        match notification {
            Notification::Log {
                level,
                logger,
                data,
            } => self
                .peer
                .notify_logging_message(LoggingMessageNotificationParam {
                    level: logging_level(level),
                    logger: Some(logger),
                    data,
                })
                .await
                .map_err(|e| e.to_string()),
            Notification::Progress {
                token,
                progress,
                total,
                message,
            } => self
                .peer
                .notify_progress(ProgressNotificationParam {
                    progress_token: ProgressToken(NumberOrString::String(token.into())),
                    progress: progress.into(),
                    total: Some(total.into()),
                    message,
                })
                .await
                .map_err(|e| e.to_string()),
        }
    }

    fn is_closed(&self) -> bool {
        self.peer.is_transport_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_level_mapping() {
        assert_eq!(logging_level(Severity::Info), LoggingLevel::Info);
        assert_eq!(logging_level(Severity::Error), LoggingLevel::Error);
    }
}
