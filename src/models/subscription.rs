use super::ResourceState;
use serde::Serialize;

/// A watched deployment and the last state the monitor observed for it.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionEntry {
    pub id: String,
    /// Most recent successfully fetched state, `None` until a baseline exists.
    pub last_state: Option<ResourceState>,
    /// RFC 3339 UTC
    pub subscribed_at: String,
    /// Tool (or protocol method) that created the subscription.
    pub subscribed_via: Option<String>,
}
