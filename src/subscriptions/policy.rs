//! Auto-Subscription Policy
//!
//! Decides whether a successful tool call should implicitly subscribe its
//! target deployment. The whole policy sits behind one `RwLock`, so a
//! decision always sees a single consistent configuration.

use super::error::SubscriptionError;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

/// Tools that subscribe to their target deployment unless configured otherwise.
pub const DEFAULT_AUTO_SUBSCRIBE_TOOLS: &[&str] = &[
    "create_deployment",
    "get_deployment",
    "start_compute",
    "checkout_branch",
    "checkout_snapshot",
    "create_branch",
    "create_snapshot",
    "create_node",
    "create_f2_deployment",
];

/// Point-in-time copy of the policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyState {
    pub global_enabled: bool,
    pub per_tool: BTreeMap<String, bool>,
}

impl Default for PolicyState {
    fn default() -> Self {
        Self {
            global_enabled: true,
            per_tool: DEFAULT_AUTO_SUBSCRIBE_TOOLS
                .iter()
                .map(|tool| (tool.to_string(), true))
                .collect(),
        }
    }
}

impl PolicyState {
    fn decide(&self, tool_name: &str) -> bool {
        self.global_enabled && self.per_tool.get(tool_name).copied().unwrap_or(false)
    }
}

pub struct AutoSubscriptionPolicy {
    state: RwLock<PolicyState>,
    /// Tool names `configure` accepts in per-tool updates
    known_tools: BTreeSet<String>,
}

impl AutoSubscriptionPolicy {
    /// Policy seeded with the default tool set, accepting only those names.
    pub fn new() -> Self {
        Self::with_known_tools(std::iter::empty::<String>())
    }

    /// Policy seeded with the defaults that also accepts `extra` tool names.
    pub fn with_known_tools<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut known_tools: BTreeSet<String> = DEFAULT_AUTO_SUBSCRIBE_TOOLS
            .iter()
            .map(|tool| tool.to_string())
            .collect();
        known_tools.extend(extra.into_iter().map(Into::into));

        Self {
            state: RwLock::new(PolicyState::default()),
            known_tools,
        }
    }

    /// `false` when globally disabled; otherwise the tool's override, and
    /// `false` for tools without one.
    pub fn is_enabled(&self, tool_name: &str) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .decide(tool_name)
    }

    pub fn snapshot(&self) -> PolicyState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_known_tool(&self, tool_name: &str) -> bool {
        self.known_tools.contains(tool_name)
    }

    /// Apply a partial update and return the resulting policy.
    ///
    /// `global` replaces the global flag when given; `per_tool` entries are
    /// upserted and unspecified tools keep their value. An update naming an
    /// unknown tool is rejected as a whole. An empty update is a no-op.
    pub fn configure(
        &self,
        global: Option<bool>,
        per_tool: Option<HashMap<String, bool>>,
    ) -> Result<PolicyState, SubscriptionError> {
        let per_tool = per_tool.unwrap_or_default();

        let mut unknown: Vec<&String> = per_tool
            .keys()
            .filter(|tool| !self.is_known_tool(tool))
            .collect();
        if !unknown.is_empty() {
            unknown.sort();
            return Err(SubscriptionError::UnknownTool(unknown[0].clone()));
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(enabled) = global {
            state.global_enabled = enabled;
        }
        state.per_tool.extend(per_tool);

        log::info!(
            "Auto-subscription configured: enabled={}, tools={:?}",
            state.global_enabled,
            state.per_tool
        );
        Ok(state.clone())
    }
}

impl Default for AutoSubscriptionPolicy {
    fn default() -> Self {
        Self::new()
    }
}
