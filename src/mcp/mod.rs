//! MCP (Model Context Protocol) Server Module
//!
//! Exposes the Guepard platform and the deployment subscription engine to AI
//! agents over stdio or SSE.
//!
//! ```text
//! guepard-mcp process:
//! +------------------------------------------------+
//! |  client --stdio|SSE:47300-->  mcp/server.rs      |
//! |                                  |               |
//! |                                  v               |
//! |             SubscriptionService (shared)         |
//! |             +-- registry / policy                |
//! |             +-- monitor --> GuepardClient        |
//! |             +-- dispatcher --> mcp/session.rs    |
//! +------------------------------------------------+
//! ```
//!
//! ## Available Tools
//!
//! - `subscribe_deployment` / `unsubscribe_deployment` - Explicit watch list edits
//! - `list_subscriptions` - Watched deployments, optionally with live status
//! - `manage_subscriptions` - Auto-subscription policy and bulk actions
//! - `start_monitoring` / `stop_monitoring` - Background polling control
//! - `test_connection` - Check API credentials
//! - `get_configuration` - Active tool selection and presets
//! - `list_deployments`, `get_deployment`, `create_deployment`
//! - `start_compute`, `stop_compute`, `get_compute_status`
//! - `create_snapshot`, `checkout_branch`
//!
//! Which of these are registered is decided at startup by `ToolsConfig`
//! (config file, `GUEPARD_*` variables or a `GUEPARD_CONFIG` preset).

pub mod server;
pub mod session;
pub mod stdio_transport;
pub mod transport;

pub use server::GuepardMcpServer;
pub use session::PeerSink;
pub use stdio_transport::start_stdio_server;
pub use transport::{start_sse_server, MCP_PORT};

use crate::subscriptions::SubscriptionError;
use rmcp::ErrorData as McpError;

/// MCP error: deployment id missing or unusable
pub fn invalid_deployment_id(id: &str) -> McpError {
    McpError::invalid_params(
        format!(
            "Invalid deployment id '{}'. \
            Provide a non-empty deployment id; use list_deployments to find one.",
            id
        ),
        None,
    )
}

/// MCP error: tool name not in the auto-subscription catalog
pub fn unknown_tool(tool: &str) -> McpError {
    McpError::invalid_params(
        format!(
            "Unknown tool '{}'. \
            Use manage_subscriptions with action 'status' to see configurable tools.",
            tool
        ),
        None,
    )
}

/// MCP error: required argument absent for the requested action
pub fn missing_argument(action: &str, argument: &str) -> McpError {
    McpError::invalid_params(
        format!("Action '{}' requires the '{}' argument.", action, argument),
        None,
    )
}

/// MCP error: invalid payload
pub fn invalid_payload(err: impl std::fmt::Display) -> McpError {
    McpError::invalid_params(
        format!(
            "Invalid payload: {}. Check the tool's parameter schema for required fields.",
            err
        ),
        None,
    )
}

impl From<SubscriptionError> for McpError {
    fn from(err: SubscriptionError) -> Self {
        match err {
            SubscriptionError::InvalidTarget(id) => invalid_deployment_id(&id),
            SubscriptionError::UnknownTool(tool) => unknown_tool(&tool),
        }
    }
}
