//! MCP Server Implementation
//!
//! Uses rmcp's macro system for tool definitions. Subscription tools call the
//! shared `SubscriptionService`; deployment tools call the Guepard API and
//! then hand the deployment to the auto-subscription policy.

use crate::api::{ApiError, GuepardClient};
use crate::config::{ToolsConfig, TOOL_PRESETS};
use crate::mcp;
use crate::mcp::session::PeerSink;
use crate::subscriptions::registry::UNKNOWN_ID;
use crate::subscriptions::{AutoSubscription, SubscriptionService};
use rmcp::{
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::{
        Annotated, CallToolResult, Content, Implementation, ListResourcesResult,
        PaginatedRequestParam, RawResource, ReadResourceRequestParam, ReadResourceResult,
        ResourceContents, ResourcesCapability, ServerCapabilities, ServerInfo,
        SubscribeRequestParam, ToolsCapability, UnsubscribeRequestParam,
    },
    service::{NotificationContext, RequestContext, RoleServer},
    tool, tool_handler, tool_router, ErrorData as McpError,
};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// URI prefix of the per-deployment resources.
pub const DEPLOYMENT_URI_PREFIX: &str = "guepard://deployments/";

/// Subscription source recorded for `resources/subscribe` requests.
pub const RESOURCE_SUBSCRIBE_VIA: &str = "resources/subscribe";

/// Deployment tools registered by this server; the auto-subscription policy
/// accepts overrides for these on top of its defaults.
pub const DEPLOYMENT_TOOLS: &[&str] = &[
    "list_deployments",
    "get_deployment",
    "create_deployment",
    "start_compute",
    "stop_compute",
    "get_compute_status",
    "create_snapshot",
    "checkout_branch",
];

/// Tools whose response is the same `GET /deploy/{id}` payload the monitor
/// fetches, and may therefore seed a new subscription's baseline.
const BASELINE_TOOLS: &[&str] = &["get_deployment"];

/// Module each tool belongs to, for module-level selection. Tools not listed
/// here (`test_connection`, `get_configuration`) belong to no module.
const TOOL_MODULES: &[(&str, &str)] = &[
    ("subscribe_deployment", "subscriptions"),
    ("unsubscribe_deployment", "subscriptions"),
    ("list_subscriptions", "subscriptions"),
    ("manage_subscriptions", "subscriptions"),
    ("start_monitoring", "subscriptions"),
    ("stop_monitoring", "subscriptions"),
    ("list_deployments", "deployments"),
    ("get_deployment", "deployments"),
    ("create_deployment", "deployments"),
    ("start_compute", "compute"),
    ("stop_compute", "compute"),
    ("get_compute_status", "compute"),
    ("create_snapshot", "snapshots"),
    ("checkout_branch", "checkouts"),
];

pub fn tool_module(tool: &str) -> Option<&'static str> {
    TOOL_MODULES
        .iter()
        .find(|(name, _)| *name == tool)
        .map(|(_, module)| *module)
}

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Guepard MCP Server
///
/// One instance per connection. All instances share the same
/// `SubscriptionService`.
#[derive(Clone)]
pub struct GuepardMcpServer {
    service: SubscriptionService,
    client: GuepardClient,
    /// Resolved tool selection
    tools: Arc<ToolsConfig>,
    tool_router: ToolRouter<Self>,
    /// Identifies this connection to the notification dispatcher
    session_id: String,
}

// ============================================================================
// Tool Input Structures
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeploymentInput {
    /// ID of the deployment
    pub deployment_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeploymentToolInput {
    /// ID of the deployment
    pub deployment_id: String,
    /// Set to false to skip auto-subscription for this call only
    pub auto_subscribe: Option<bool>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ListSubscriptionsInput {
    /// Fetch the live status of each subscribed deployment
    pub include_status: bool,
    /// Also show compute status (requires include_status)
    pub include_compute_status: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ManageAction {
    Status,
    Enable,
    Disable,
    Configure,
    ClearAll,
    Unsubscribe,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ManageSubscriptionsInput {
    /// Action: status, enable, disable, configure, clear_all, unsubscribe
    pub action: ManageAction,
    /// Tool whose auto-subscription flag to change (enable/disable/configure)
    pub tool_name: Option<String>,
    /// Deployment to unsubscribe (unsubscribe)
    pub deployment_id: Option<String>,
    /// New flag value (configure); with enable/disable it must match the action
    pub enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(default)]
pub struct StartMonitoringInput {
    /// Seconds between scans; defaults to the configured interval
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ListDeploymentsInput {
    /// Filter by deployment status
    pub status: Option<String>,
    /// Maximum number of deployments to return
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateDeploymentInput {
    /// Deployment name
    pub name: Option<String>,
    /// Repository name
    pub repository_name: String,
    /// Database provider: PostgreSQL, mysql, mongodb
    pub database_provider: Option<String>,
    /// Database version
    pub database_version: Option<String>,
    /// Deployment type: REPOSITORY or F2
    pub deployment_type: Option<String>,
    /// Parent deployment ID
    pub deployment_parent: Option<String>,
    /// Parent snapshot ID
    pub snapshot_parent: Option<String>,
    /// Performance profile ID
    pub performance_profile_id: Option<String>,
    /// Set to false to skip auto-subscription for this call only
    pub auto_subscribe: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateSnapshotInput {
    /// ID of the deployment
    pub deployment_id: String,
    /// Branch to snapshot
    pub branch_id: String,
    /// Comment stored with the snapshot
    pub snapshot_comment: String,
    /// Set to false to skip auto-subscription for this call only
    pub auto_subscribe: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CheckoutBranchInput {
    /// ID of the deployment
    pub deployment_id: String,
    /// Branch to check out
    pub branch_id: String,
    /// Snapshot to check out to
    pub snapshot_id: String,
    /// Set to false to skip auto-subscription for this call only
    pub auto_subscribe: Option<bool>,
}

// ============================================================================
// MCP Server Implementation
// ============================================================================

#[tool_router]
impl GuepardMcpServer {
    /// Create a new MCP server instance.
    ///
    /// # Arguments
    /// * `service` - Shared subscription service
    /// * `client` - Guepard API client used by the deployment tools
    /// * `tools` - Resolved tool selection; disabled tools are not registered
    pub fn new(
        service: SubscriptionService,
        client: GuepardClient,
        tools: Arc<ToolsConfig>,
    ) -> Self {
        let session_id = format!(
            "session-{}",
            NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)
        );
        Self {
            service,
            client,
            tool_router: Self::selected_router(&tools),
            tools,
            session_id,
        }
    }

    /// Router holding only the tools `tools` allows.
    fn selected_router(tools: &ToolsConfig) -> ToolRouter<Self> {
        let mut router = ToolRouter::new();
        for route in Self::tool_router() {
            if tools.is_tool_enabled(route.name(), tool_module(route.name())) {
                router.add_route(route);
            }
        }
        router
    }

    /// Names of the tools `tools` allows, sorted.
    pub fn enabled_tool_names(tools: &ToolsConfig) -> Vec<String> {
        let mut names: Vec<String> = Self::selected_router(tools)
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        names.sort();
        names
    }

    pub fn service(&self) -> &SubscriptionService {
        &self.service
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    // ========================================================================
    // Helper Methods
    // ========================================================================

    /// Auto-subscribe unless the caller opted out for this call.
    async fn auto_subscribe(
        &self,
        tool_name: &str,
        deployment_id: &str,
        requested: Option<bool>,
        baseline: Option<Value>,
    ) -> Option<AutoSubscription> {
        if requested == Some(false) {
            return None;
        }
        self.service
            .auto_subscribe(tool_name, deployment_id, baseline)
            .await
    }

    /// Run a mutating API call wrapped in progress and result notifications.
    async fn run_operation<F>(
        &self,
        operation: &str,
        deployment_id: &str,
        call: F,
    ) -> Result<Value, ApiError>
    where
        F: Future<Output = Result<Value, ApiError>>,
    {
        let dispatcher = self.service.dispatcher();
        dispatcher
            .notify_progress(operation, deployment_id, 0, Some("started"))
            .await;

        let result = call.await;

        dispatcher
            .notify_progress(operation, deployment_id, 100, Some("completed"))
            .await;
        let details = match &result {
            Ok(body) => body.clone(),
            Err(e) => json!({ "error": e.to_string() }),
        };
        dispatcher
            .notify_operation_result(operation, deployment_id, result.is_ok(), Some(details))
            .await;

        result
    }

    /// Baseline candidate for `tool_name`'s response body. `None` unless the
    /// body came from the endpoint the monitor polls.
    fn baseline_for(tool_name: &str, body: &Value) -> Option<Value> {
        BASELINE_TOOLS
            .contains(&tool_name)
            .then(|| body.clone())
    }

    fn success(body: Value, auto: Option<AutoSubscription>) -> CallToolResult {
        let mut text = pretty(&body);
        if let Some(auto) = auto {
            text.push_str("\n\n");
            text.push_str(&auto.message());
        }
        CallToolResult::success(vec![Content::text(text)])
    }

    fn api_failure(context: &str, err: ApiError) -> CallToolResult {
        CallToolResult::error(vec![Content::text(pretty(&json!({
            "error": context,
            "message": err.to_string(),
        })))])
    }

    // ========================================================================
    // Subscription Tools
    // ========================================================================

    #[tool(description = "Subscribe to status change notifications for a deployment")]
    async fn subscribe_deployment(
        &self,
        Parameters(input): Parameters<DeploymentInput>,
    ) -> Result<CallToolResult, McpError> {
        let report = self.service.subscribe(&input.deployment_id).await?;
        Ok(CallToolResult::success(vec![Content::text(format!(
            "{}\nTotal subscriptions: {}",
            report.message, report.total_subscriptions
        ))]))
    }

    #[tool(description = "Stop receiving change notifications for a deployment")]
    async fn unsubscribe_deployment(
        &self,
        Parameters(input): Parameters<DeploymentInput>,
    ) -> Result<CallToolResult, McpError> {
        let report = self.service.unsubscribe(&input.deployment_id).await?;
        Ok(CallToolResult::success(vec![Content::text(format!(
            "{}\nTotal subscriptions: {}",
            report.message, report.total_subscriptions
        ))]))
    }

    #[tool(
        description = "List subscribed deployments. With include_status, fetches each deployment's current status."
    )]
    async fn list_subscriptions(
        &self,
        Parameters(input): Parameters<ListSubscriptionsInput>,
    ) -> Result<CallToolResult, McpError> {
        let text = self
            .service
            .list_subscriptions(input.include_status, input.include_compute_status)
            .await;
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    #[tool(
        description = "Manage auto-subscriptions. Actions: status, enable, disable, configure (tool_name + enabled), clear_all, unsubscribe (deployment_id)."
    )]
    async fn manage_subscriptions(
        &self,
        Parameters(input): Parameters<ManageSubscriptionsInput>,
    ) -> Result<CallToolResult, McpError> {
        let text = match input.action {
            ManageAction::Status => pretty(&json!(self.service.status().await)),
            ManageAction::Enable | ManageAction::Disable => {
                let enabled = toggle_value(input.action, input.enabled)?;
                let verb = if enabled { "enabled" } else { "disabled" };
                match input.tool_name {
                    Some(tool) => {
                        self.service
                            .configure(None, Some(HashMap::from([(tool.clone(), enabled)])))?;
                        format!("Auto-subscription {} for {}", verb, tool)
                    }
                    None => {
                        self.service.configure(Some(enabled), None)?;
                        format!("Auto-subscription {} globally", verb)
                    }
                }
            }
            ManageAction::Configure => {
                let enabled = input
                    .enabled
                    .ok_or_else(|| mcp::missing_argument("configure", "enabled"))?;
                let state = match input.tool_name {
                    Some(tool) => self
                        .service
                        .configure(None, Some(HashMap::from([(tool, enabled)])))?,
                    None => self.service.configure(Some(enabled), None)?,
                };
                format!("Auto-subscription policy updated:\n{}", pretty(&json!(state)))
            }
            ManageAction::ClearAll => {
                let count = self.service.clear_all();
                format!("Cleared {} subscriptions", count)
            }
            ManageAction::Unsubscribe => {
                let id = input
                    .deployment_id
                    .ok_or_else(|| mcp::missing_argument("unsubscribe", "deployment_id"))?;
                self.service.unsubscribe(&id).await?.message
            }
        };
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    #[tool(description = "Start background monitoring of subscribed deployments")]
    async fn start_monitoring(
        &self,
        Parameters(input): Parameters<StartMonitoringInput>,
    ) -> Result<CallToolResult, McpError> {
        let report = self
            .service
            .start_monitoring(input.interval_secs.map(Duration::from_secs))
            .await;
        Ok(CallToolResult::success(vec![Content::text(report.message)]))
    }

    #[tool(description = "Stop background monitoring")]
    async fn stop_monitoring(&self) -> Result<CallToolResult, McpError> {
        let report = self.service.stop_monitoring().await;
        Ok(CallToolResult::success(vec![Content::text(report.message)]))
    }

    #[tool(description = "Check that the Guepard API is reachable with the configured token")]
    async fn test_connection(&self) -> Result<CallToolResult, McpError> {
        if !self.client.has_token() {
            return Ok(CallToolResult::error(vec![Content::text(
                "ACCESS_TOKEN is not set. Export it before starting the server.",
            )]));
        }

        match self
            .client
            .get("/deploy", &[("limit", "1".to_string())])
            .await
        {
            Ok(_) => Ok(CallToolResult::success(vec![Content::text(format!(
                "Connection successful\nAPI: {}\nToken: {}\nTools: {} enabled\nConfiguration: {}",
                self.client.api_url(),
                self.client.masked_token(),
                self.tool_router.list_all().len(),
                self.tools.configuration_mode()
            ))])),
            Err(e) => Ok(Self::api_failure("Connection failed", e)),
        }
    }

    #[tool(description = "Show the active tool configuration and the available presets")]
    async fn get_configuration(&self) -> Result<CallToolResult, McpError> {
        let enabled = Self::enabled_tool_names(&self.tools);
        Ok(CallToolResult::success(vec![Content::text(
            configuration_report(&self.tools, &enabled),
        )]))
    }

    // ========================================================================
    // Deployment Tools
    // ========================================================================

    #[tool(description = "List deployments, optionally filtered by status")]
    async fn list_deployments(
        &self,
        Parameters(input): Parameters<ListDeploymentsInput>,
    ) -> Result<CallToolResult, McpError> {
        let mut query = Vec::new();
        if let Some(status) = input.status {
            query.push(("status", status));
        }
        if let Some(limit) = input.limit {
            query.push(("limit", limit.to_string()));
        }

        match self.client.get("/deploy", &query).await {
            Ok(body) => {
                let count = body.as_array().map(Vec::len);
                Ok(Self::success(
                    json!({ "deployments": body, "count": count }),
                    None,
                ))
            }
            Err(e) => Ok(Self::api_failure("Failed to list deployments", e)),
        }
    }

    #[tool(description = "Get a deployment's details. Auto-subscribes to its changes.")]
    async fn get_deployment(
        &self,
        Parameters(input): Parameters<DeploymentToolInput>,
    ) -> Result<CallToolResult, McpError> {
        let id = require_id(&input.deployment_id)?;
        match self.client.get(&format!("/deploy/{}", id), &[]).await {
            Ok(body) => {
                let baseline = Self::baseline_for("get_deployment", &body);
                let auto = self
                    .auto_subscribe("get_deployment", id, input.auto_subscribe, baseline)
                    .await;
                Ok(Self::success(body, auto))
            }
            Err(e) => Ok(Self::api_failure("Failed to get deployment", e)),
        }
    }

    #[tool(description = "Create a new database deployment. Auto-subscribes to the new deployment.")]
    async fn create_deployment(
        &self,
        Parameters(input): Parameters<CreateDeploymentInput>,
    ) -> Result<CallToolResult, McpError> {
        if input.repository_name.trim().is_empty() {
            return Err(mcp::invalid_payload("repository_name must not be empty"));
        }

        let mut data = json!({
            "name": input.name,
            "repository_name": input.repository_name,
            "database_provider": input.database_provider.as_deref().unwrap_or("PostgreSQL"),
            "database_version": input.database_version.as_deref().unwrap_or("17"),
            "deployment_type": input.deployment_type.as_deref().unwrap_or("REPOSITORY"),
            "performance_profile_id": input.performance_profile_id,
        });
        if let Some(parent) = input.deployment_parent.filter(|p| !p.is_empty()) {
            data["deployment_parent"] = json!(parent);
        }
        if let Some(parent) = input.snapshot_parent.filter(|p| !p.is_empty()) {
            data["snapshot_parent"] = json!(parent);
        }

        let result = self
            .run_operation(
                "create_deployment",
                &input.repository_name,
                self.client.post("/deploy", &data),
            )
            .await;

        match result {
            Ok(body) => {
                let id = body
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or(UNKNOWN_ID)
                    .to_string();
                let baseline = Self::baseline_for("create_deployment", &body);
                let auto = self
                    .auto_subscribe("create_deployment", &id, input.auto_subscribe, baseline)
                    .await;
                Ok(Self::success(
                    json!({ "deployment_id": id, "full_response": body }),
                    auto,
                ))
            }
            Err(e) => Ok(Self::api_failure("Failed to create deployment", e)),
        }
    }

    #[tool(description = "Start the compute instance of a deployment")]
    async fn start_compute(
        &self,
        Parameters(input): Parameters<DeploymentToolInput>,
    ) -> Result<CallToolResult, McpError> {
        self.compute_action("start_compute", "start", input).await
    }

    #[tool(description = "Stop the compute instance of a deployment")]
    async fn stop_compute(
        &self,
        Parameters(input): Parameters<DeploymentToolInput>,
    ) -> Result<CallToolResult, McpError> {
        self.compute_action("stop_compute", "stop", input).await
    }

    #[tool(description = "Get the compute instance details of a deployment")]
    async fn get_compute_status(
        &self,
        Parameters(input): Parameters<DeploymentToolInput>,
    ) -> Result<CallToolResult, McpError> {
        let id = require_id(&input.deployment_id)?;
        match self.client.get(&format!("/deploy/{}/compute", id), &[]).await {
            Ok(body) => {
                let auto = self
                    .auto_subscribe("get_compute_status", id, input.auto_subscribe, None)
                    .await;
                Ok(Self::success(body, auto))
            }
            Err(e) => Ok(Self::api_failure("Failed to get compute status", e)),
        }
    }

    #[tool(description = "Create a snapshot of a deployment branch")]
    async fn create_snapshot(
        &self,
        Parameters(input): Parameters<CreateSnapshotInput>,
    ) -> Result<CallToolResult, McpError> {
        let id = require_id(&input.deployment_id)?;
        let path = format!("/deploy/{}/{}/snap", id, input.branch_id);
        let data = json!({ "snapshot_comment": input.snapshot_comment });

        let result = self
            .run_operation("create_snapshot", id, self.client.post(&path, &data))
            .await;
        match result {
            Ok(body) => {
                let auto = self
                    .auto_subscribe("create_snapshot", id, input.auto_subscribe, None)
                    .await;
                Ok(Self::success(body, auto))
            }
            Err(e) => Ok(Self::api_failure("Failed to create snapshot", e)),
        }
    }

    #[tool(description = "Check out a deployment branch to a snapshot")]
    async fn checkout_branch(
        &self,
        Parameters(input): Parameters<CheckoutBranchInput>,
    ) -> Result<CallToolResult, McpError> {
        let id = require_id(&input.deployment_id)?;
        let path = format!("/deploy/{}/{}/checkout", id, input.branch_id);
        let data = json!({ "snapshot_id": input.snapshot_id });

        let result = self
            .run_operation("checkout_branch", id, self.client.post(&path, &data))
            .await;
        match result {
            Ok(body) => {
                let auto = self
                    .auto_subscribe("checkout_branch", id, input.auto_subscribe, None)
                    .await;
                Ok(Self::success(body, auto))
            }
            Err(e) => Ok(Self::api_failure("Failed to checkout branch", e)),
        }
    }

    async fn compute_action(
        &self,
        tool_name: &str,
        action: &str,
        input: DeploymentToolInput,
    ) -> Result<CallToolResult, McpError> {
        let id = require_id(&input.deployment_id)?;
        let path = format!("/deploy/{}/{}", id, action);

        let result = self
            .run_operation(tool_name, id, self.client.get(&path, &[]))
            .await;
        match result {
            Ok(body) => {
                let auto = self
                    .auto_subscribe(tool_name, id, input.auto_subscribe, None)
                    .await;
                Ok(Self::success(body, auto))
            }
            Err(e) => Ok(Self::api_failure(
                &format!("Failed to {} compute", action),
                e,
            )),
        }
    }
}

/// Text summary of the tool selection, with per-module counts and presets.
fn configuration_report(tools: &ToolsConfig, enabled: &[String]) -> String {
    let mut lines = vec![
        format!("Mode: {}", tools.configuration_mode()),
        format!("Enabled tools ({}): {}", enabled.len(), enabled.join(", ")),
    ];
    if let Some(preset) = &tools.preset {
        lines.push(format!("Preset: {}", preset));
    }
    for (label, list) in [
        ("Enabled modules", &tools.enabled_modules),
        ("Disabled modules", &tools.disabled_modules),
        ("Disabled tools", &tools.disabled_tools),
    ] {
        if !list.is_empty() {
            let items: Vec<&str> = list.iter().map(String::as_str).collect();
            lines.push(format!("{}: {}", label, items.join(", ")));
        }
    }

    lines.push(String::new());
    lines.push("Modules:".to_string());
    let mut modules: Vec<&str> = TOOL_MODULES.iter().map(|(_, module)| *module).collect();
    modules.dedup();
    for module in modules {
        let members: Vec<&str> = TOOL_MODULES
            .iter()
            .filter(|(_, m)| *m == module)
            .map(|(tool, _)| *tool)
            .collect();
        let active = members
            .iter()
            .filter(|tool| enabled.iter().any(|name| name == *tool))
            .count();
        lines.push(format!(
            "• {}: {}/{} tools enabled",
            module,
            active,
            members.len()
        ));
    }

    lines.push(String::new());
    lines.push("Presets (set GUEPARD_CONFIG to use one):".to_string());
    for preset in TOOL_PRESETS {
        lines.push(format!("• {}: {}", preset.name, preset.description));
    }
    lines.join("\n")
}

/// Flag value for `enable`/`disable`. An explicit `enabled` must agree with
/// the action.
fn toggle_value(action: ManageAction, enabled: Option<bool>) -> Result<bool, McpError> {
    let wanted = action == ManageAction::Enable;
    match enabled {
        Some(flag) if flag != wanted => Err(mcp::invalid_payload(format!(
            "action '{}' contradicts enabled={}; use 'configure' to set an explicit value",
            if wanted { "enable" } else { "disable" },
            flag
        ))),
        _ => Ok(wanted),
    }
}

fn require_id(id: &str) -> Result<&str, McpError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(mcp::invalid_deployment_id(id));
    }
    Ok(id)
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Extract the deployment id from a `guepard://deployments/{id}` URI.
pub fn parse_deployment_uri(uri: &str) -> Option<&str> {
    uri.strip_prefix(DEPLOYMENT_URI_PREFIX)
        .map(|id| id.trim_end_matches('/'))
        .filter(|id| !id.is_empty() && !id.contains('/'))
}

pub fn deployment_uri(id: &str) -> String {
    format!("{}{}", DEPLOYMENT_URI_PREFIX, id)
}

// ============================================================================
// ServerHandler Implementation
// ============================================================================

#[tool_handler]
impl rmcp::handler::server::ServerHandler for GuepardMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "guepard".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(
                "Guepard MCP Server for managing database deployments. \
                Deployments touched by tools are watched automatically; status changes arrive \
                as logging notifications. Use manage_subscriptions to tune this."
                    .to_string(),
            ),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
                resources: Some(ResourcesCapability {
                    subscribe: Some(true),
                    list_changed: None,
                }),
                logging: Some(Default::default()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Called when the MCP client has completed initialization.
    /// The newest session becomes the notification target.
    fn on_initialized(
        &self,
        context: NotificationContext<RoleServer>,
    ) -> impl Future<Output = ()> + Send + '_ {
        async move {
            log::info!("MCP client initialized (session_id={})", self.session_id);
            self.service
                .dispatcher()
                .attach(self.session_id.clone(), Arc::new(PeerSink::new(context.peer)));
        }
    }

    /// `resources/subscribe` on a deployment URI adds it to the watch list.
    fn subscribe(
        &self,
        request: SubscribeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<(), McpError>> + Send + '_ {
        async move {
            let id = parse_deployment_uri(&request.uri)
                .ok_or_else(|| mcp::invalid_payload(format!("unsupported URI {}", request.uri)))?;
            log::info!("MCP client {} subscribed to: {}", self.session_id, request.uri);
            self.service.subscribe_via(id, RESOURCE_SUBSCRIBE_VIA).await?;
            Ok(())
        }
    }

    fn unsubscribe(
        &self,
        request: UnsubscribeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<(), McpError>> + Send + '_ {
        async move {
            let id = parse_deployment_uri(&request.uri)
                .ok_or_else(|| mcp::invalid_payload(format!("unsupported URI {}", request.uri)))?;
            log::info!(
                "MCP client {} unsubscribed from: {}",
                self.session_id,
                request.uri
            );
            self.service.unsubscribe(id).await?;
            Ok(())
        }
    }

    fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListResourcesResult, McpError>> + Send + '_ {
        async {
            let registry = self.service.registry();
            let resources = registry
                .list()
                .into_iter()
                .map(|id| {
                    let name = registry
                        .snapshot(&id)
                        .and_then(|state| state.name().map(str::to_string))
                        .unwrap_or_else(|| id.clone());
                    Annotated {
                        raw: RawResource {
                            uri: deployment_uri(&id),
                            name,
                            description: Some(format!("Subscribed deployment {}", id)),
                            mime_type: Some("application/json".to_string()),
                            size: None,
                        },
                        annotations: None,
                    }
                })
                .collect();

            Ok(ListResourcesResult {
                resources,
                next_cursor: None,
            })
        }
    }

    fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ReadResourceResult, McpError>> + Send + '_ {
        async move {
            let uri = &request.uri;
            let entry = parse_deployment_uri(uri)
                .and_then(|id| self.service.registry().entry(id))
                .ok_or_else(|| {
                    McpError::resource_not_found(
                        format!(
                            "No subscribed deployment at {}. \
                            Use list_subscriptions to see watched deployments.",
                            uri
                        ),
                        None,
                    )
                })?;

            Ok(ReadResourceResult {
                contents: vec![ResourceContents::TextResourceContents {
                    uri: uri.clone(),
                    mime_type: Some("application/json".to_string()),
                    text: pretty(&json!(entry)),
                }],
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_deployment_uri() {
        assert_eq!(parse_deployment_uri("guepard://deployments/dep-1"), Some("dep-1"));
        assert_eq!(parse_deployment_uri("guepard://deployments/dep-1/"), Some("dep-1"));
        assert_eq!(parse_deployment_uri("guepard://deployments/"), None);
        assert_eq!(parse_deployment_uri("guepard://deployments/a/b"), None);
        assert_eq!(parse_deployment_uri("elfiee://files"), None);
    }

    #[test]
    fn test_deployment_uri_round_trip() {
        let uri = deployment_uri("dep-42");
        assert_eq!(parse_deployment_uri(&uri), Some("dep-42"));
    }

    #[test]
    fn test_require_id() {
        assert_eq!(require_id("  dep-1 ").unwrap(), "dep-1");
        assert!(require_id("   ").is_err());
    }

    #[test]
    fn test_manage_action_names() {
        let action: ManageAction = serde_json::from_value(json!("clear_all")).unwrap();
        assert_eq!(action, ManageAction::ClearAll);
        assert!(serde_json::from_value::<ManageAction>(json!("explode")).is_err());
    }

    fn tools_config(preset: Option<&str>) -> ToolsConfig {
        ToolsConfig {
            preset: preset.map(str::to_string),
            ..ToolsConfig::default()
        }
        .resolved()
    }

    #[test]
    fn test_every_tool_is_registered_by_default() {
        let names = GuepardMcpServer::enabled_tool_names(&ToolsConfig::default());
        assert_eq!(names.len(), TOOL_MODULES.len() + 2);
        assert!(names.contains(&"test_connection".to_string()));
        assert!(names.contains(&"get_configuration".to_string()));
        for (tool, _) in TOOL_MODULES {
            assert!(names.contains(&tool.to_string()), "{} missing", tool);
        }
        for tool in DEPLOYMENT_TOOLS {
            assert!(tool_module(tool).is_some(), "{} has no module", tool);
        }
    }

    #[test]
    fn test_disabled_tools_are_not_registered() {
        let mut tools = ToolsConfig::default();
        tools.disabled_tools.insert("create_deployment".to_string());
        tools.disabled_modules.insert("subscriptions".to_string());

        let names = GuepardMcpServer::enabled_tool_names(&tools);
        assert!(!names.contains(&"create_deployment".to_string()));
        assert!(!names.contains(&"subscribe_deployment".to_string()));
        assert!(!names.contains(&"stop_monitoring".to_string()));
        assert!(names.contains(&"get_deployment".to_string()));
        assert!(names.contains(&"test_connection".to_string()));
    }

    #[test]
    fn test_preset_selects_tools() {
        let names = GuepardMcpServer::enabled_tool_names(&tools_config(Some("minimal")));
        assert_eq!(
            names,
            vec![
                "get_deployment",
                "list_deployments",
                "start_compute",
                "stop_compute",
                "test_connection"
            ]
        );

        let names = GuepardMcpServer::enabled_tool_names(&tools_config(Some("monitoring")));
        assert_eq!(
            names,
            vec!["get_compute_status", "list_subscriptions", "test_connection"]
        );
    }

    #[test]
    fn test_configuration_report() {
        let tools = tools_config(Some("minimal"));
        let enabled = GuepardMcpServer::enabled_tool_names(&tools);
        let report = configuration_report(&tools, &enabled);
        assert!(report.starts_with("Mode: selective\nEnabled tools (5): "));
        assert!(report.contains("Preset: minimal"));
        assert!(report.contains("Enabled modules: compute, deployments"));
        assert!(report.contains("• compute: 2/3 tools enabled"));
        assert!(report.contains("• subscriptions: 0/6 tools enabled"));
        assert!(report.contains("• read_only: Read-only access to deployments and monitoring"));

        let report = configuration_report(&ToolsConfig::default(), &[]);
        assert!(report.starts_with("Mode: all\n"));
        assert!(!report.contains("Preset:"));
    }

    #[test]
    fn test_only_fetch_payloads_seed_baseline() {
        let body = json!({ "id": "dep-1", "status": "INIT" });
        assert_eq!(
            GuepardMcpServer::baseline_for("get_deployment", &body),
            Some(body.clone())
        );
        assert_eq!(GuepardMcpServer::baseline_for("create_deployment", &body), None);
        assert_eq!(GuepardMcpServer::baseline_for("start_compute", &body), None);
    }

    #[test]
    fn test_toggle_value_honors_matching_flag() {
        assert!(toggle_value(ManageAction::Enable, None).unwrap());
        assert!(toggle_value(ManageAction::Enable, Some(true)).unwrap());
        assert!(!toggle_value(ManageAction::Disable, None).unwrap());
        assert!(!toggle_value(ManageAction::Disable, Some(false)).unwrap());
    }

    #[test]
    fn test_toggle_value_rejects_contradiction() {
        let err = toggle_value(ManageAction::Enable, Some(false)).unwrap_err();
        assert!(err.message.contains("contradicts enabled=false"));
        assert!(toggle_value(ManageAction::Disable, Some(true)).is_err());
    }

    #[test]
    fn test_success_appends_auto_subscription() {
        let auto = AutoSubscription {
            deployment_id: "dep-1".to_string(),
            tool: "get_deployment".to_string(),
            newly_subscribed: true,
            total_subscriptions: 2,
        };
        let result = GuepardMcpServer::success(json!({"id": "dep-1"}), Some(auto));
        let text = serde_json::to_string(&result).unwrap();
        assert!(text.contains("Automatically subscribed to deployment dep-1 (via get_deployment)"));
        assert!(text.contains("Total subscriptions: 2"));
    }
}
