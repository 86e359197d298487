//! Validation errors raised at the subscription tool boundary

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubscriptionError {
    /// Empty id or the "Unknown" placeholder
    #[error("Invalid deployment id '{0}': a non-empty deployment id is required")]
    InvalidTarget(String),

    /// Per-tool policy update names a tool the server does not know
    #[error("Unknown tool '{0}'")]
    UnknownTool(String),
}
