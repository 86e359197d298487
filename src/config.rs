/// Configuration management for the Guepard MCP server
///
/// Persistent settings live at `$USER_HOME/.guepard/config.json`. The access
/// token is only ever read from the environment and never written to disk.
use crate::api::client::DEFAULT_API_URL;
use crate::subscriptions::{AutoSubscriptionPolicy, ServiceSettings};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "GUEPARD_CONFIG_PATH";

/// Environment variable carrying the API bearer token
pub const ACCESS_TOKEN_ENV: &str = "ACCESS_TOKEN";

/// Environment variable overriding the API base URL
pub const API_URL_ENV: &str = "GUEPARD_API_URL";

/// Comma-separated tool selection overrides
pub const ENABLED_MODULES_ENV: &str = "GUEPARD_ENABLED_MODULES";
pub const ENABLED_TOOLS_ENV: &str = "GUEPARD_ENABLED_TOOLS";
pub const DISABLED_TOOLS_ENV: &str = "GUEPARD_DISABLED_TOOLS";
pub const DISABLED_MODULES_ENV: &str = "GUEPARD_DISABLED_MODULES";

/// Environment variable naming a tool preset
pub const PRESET_ENV: &str = "GUEPARD_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Seconds between scan cycles
    pub interval_secs: u64,
    /// Upper bound on one deployment fetch
    pub fetch_timeout_secs: u64,
    /// Start monitoring on the first subscription
    pub auto_start: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            fetch_timeout_secs: 10,
            auto_start: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSubscribeConfig {
    pub enabled: bool,
    /// Per-tool overrides merged over the built-in defaults
    pub tools: BTreeMap<String, bool>,
}

impl Default for AutoSubscribeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tools: BTreeMap::new(),
        }
    }
}

/// A named tool selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolPreset {
    pub name: &'static str,
    pub description: &'static str,
    pub enabled_modules: &'static [&'static str],
    pub enabled_tools: &'static [&'static str],
    pub disabled_tools: &'static [&'static str],
}

pub const TOOL_PRESETS: &[ToolPreset] = &[
    ToolPreset {
        name: "v1",
        description: "Basic v1 - Essential deployment management tools only",
        enabled_modules: &["deployments", "compute", "checkouts", "snapshots"],
        enabled_tools: &[
            "test_connection",
            "list_deployments",
            "get_deployment",
            "create_deployment",
            "start_compute",
            "stop_compute",
            "get_compute_status",
            "checkout_branch",
            "create_snapshot",
        ],
        disabled_tools: &[],
    },
    ToolPreset {
        name: "minimal",
        description: "Minimal deployment management only",
        enabled_modules: &["deployments", "compute"],
        enabled_tools: &[
            "test_connection",
            "list_deployments",
            "get_deployment",
            "start_compute",
            "stop_compute",
        ],
        disabled_tools: &[],
    },
    ToolPreset {
        name: "deployment_only",
        description: "Deployment management without advanced features",
        enabled_modules: &["deployments", "compute"],
        enabled_tools: &[],
        disabled_tools: &["create_deployment"],
    },
    ToolPreset {
        name: "read_only",
        description: "Read-only access to deployments and monitoring",
        enabled_modules: &[],
        enabled_tools: &[
            "test_connection",
            "list_deployments",
            "get_deployment",
            "get_compute_status",
        ],
        disabled_tools: &[],
    },
    ToolPreset {
        name: "development",
        description: "Full development environment with all tools",
        enabled_modules: &["deployments", "snapshots", "checkouts", "compute", "subscriptions"],
        enabled_tools: &[],
        disabled_tools: &[],
    },
    ToolPreset {
        name: "production",
        description: "Production environment without dangerous operations",
        enabled_modules: &[],
        enabled_tools: &[],
        disabled_tools: &[],
    },
    ToolPreset {
        name: "monitoring",
        description: "Monitoring and observability only",
        enabled_modules: &[],
        enabled_tools: &[
            "test_connection",
            "get_compute_status",
            "list_subscriptions",
        ],
        disabled_tools: &[],
    },
    ToolPreset {
        name: "ci_cd",
        description: "CI/CD pipeline tools",
        enabled_modules: &[],
        enabled_tools: &[
            "test_connection",
            "list_deployments",
            "get_deployment",
            "create_deployment",
            "start_compute",
            "stop_compute",
        ],
        disabled_tools: &[],
    },
    ToolPreset {
        name: "admin",
        description: "Administrative tools",
        enabled_modules: &["deployments", "compute"],
        enabled_tools: &[],
        disabled_tools: &[],
    },
];

pub fn find_preset(name: &str) -> Option<&'static ToolPreset> {
    TOOL_PRESETS.iter().find(|preset| preset.name == name)
}

/// Which tools the server exposes.
///
/// Empty lists place no restriction. A tool is exposed when it is not
/// disabled, appears in `enabled_tools` (if that is set), and its module is
/// enabled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Preset applied over the lists below
    pub preset: Option<String>,
    pub enabled_modules: BTreeSet<String>,
    pub enabled_tools: BTreeSet<String>,
    pub disabled_tools: BTreeSet<String>,
    pub disabled_modules: BTreeSet<String>,
}

impl ToolsConfig {
    /// Copy with the named preset applied. A preset replaces only the lists
    /// it sets; an unknown preset is logged and ignored.
    pub fn resolved(&self) -> ToolsConfig {
        let mut resolved = self.clone();
        let Some(name) = self.preset.as_deref() else {
            return resolved;
        };

        match find_preset(name) {
            Some(preset) => {
                log::info!("Using tool preset '{}': {}", preset.name, preset.description);
                replace_if_set(&mut resolved.enabled_modules, preset.enabled_modules);
                replace_if_set(&mut resolved.enabled_tools, preset.enabled_tools);
                replace_if_set(&mut resolved.disabled_tools, preset.disabled_tools);
            }
            None => log::warn!("Unknown tool preset '{}', ignoring it", name),
        }
        resolved
    }

    pub fn is_module_enabled(&self, module: &str) -> bool {
        !self.disabled_modules.contains(module)
            && (self.enabled_modules.is_empty() || self.enabled_modules.contains(module))
    }

    /// `module` is `None` for tools that belong to no module.
    pub fn is_tool_enabled(&self, tool: &str, module: Option<&str>) -> bool {
        if self.disabled_tools.contains(tool) {
            return false;
        }
        if !self.enabled_tools.is_empty() && !self.enabled_tools.contains(tool) {
            return false;
        }
        module.map_or(true, |module| self.is_module_enabled(module))
    }

    /// `"selective"` when an allow-list is set, otherwise `"all"`.
    pub fn configuration_mode(&self) -> &'static str {
        if self.enabled_modules.is_empty() && self.enabled_tools.is_empty() {
            "all"
        } else {
            "selective"
        }
    }
}

fn replace_if_set(target: &mut BTreeSet<String>, names: &[&str]) {
    if !names.is_empty() {
        *target = names.iter().map(|name| name.to_string()).collect();
    }
}

/// Split a comma-separated list, dropping blanks.
fn parse_list(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Global configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub api_url: String,
    #[serde(skip)]
    pub access_token: String,
    pub monitoring: MonitoringConfig,
    pub auto_subscribe: AutoSubscribeConfig,
    pub tools: ToolsConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            access_token: String::new(),
            monitoring: MonitoringConfig::default(),
            auto_subscribe: AutoSubscribeConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Apply `ACCESS_TOKEN`, `GUEPARD_API_URL` and the tool selection
    /// variables from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides from an arbitrary lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(ACCESS_TOKEN_ENV).filter(|v| !v.is_empty()) {
            self.access_token = token;
        }
        if let Some(url) = lookup(API_URL_ENV).filter(|v| !v.is_empty()) {
            self.api_url = url;
        }

        let lists = [
            (ENABLED_MODULES_ENV, &mut self.tools.enabled_modules),
            (ENABLED_TOOLS_ENV, &mut self.tools.enabled_tools),
            (DISABLED_TOOLS_ENV, &mut self.tools.disabled_tools),
            (DISABLED_MODULES_ENV, &mut self.tools.disabled_modules),
        ];
        for (key, target) in lists {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *target = parse_list(&value);
            }
        }
        if let Some(preset) = lookup(PRESET_ENV).filter(|v| !v.trim().is_empty()) {
            self.tools.preset = Some(preset.trim().to_string());
        }
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            monitor_interval: Duration::from_secs(self.monitoring.interval_secs),
            fetch_timeout: Duration::from_secs(self.monitoring.fetch_timeout_secs.max(1)),
            auto_start: self.monitoring.auto_start,
        }
    }

    /// Build the auto-subscription policy: built-in defaults, then the
    /// configured global flag and per-tool overrides.
    pub fn build_policy<I, S>(&self, known_tools: I) -> Result<AutoSubscriptionPolicy, String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let policy = AutoSubscriptionPolicy::with_known_tools(known_tools);
        let overrides: HashMap<String, bool> = self
            .auto_subscribe
            .tools
            .iter()
            .map(|(tool, enabled)| (tool.clone(), *enabled))
            .collect();
        policy
            .configure(Some(self.auto_subscribe.enabled), Some(overrides))
            .map_err(|e| format!("Invalid auto_subscribe config: {}", e))?;
        Ok(policy)
    }
}

/// Get the path to the config file
///
/// Returns: `$USER_HOME/.guepard/config.json`
/// Respects the `GUEPARD_CONFIG_PATH` environment variable.
pub fn get_config_path() -> Result<PathBuf, String> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Ok(PathBuf::from(path));
    }

    let home_dir = dirs::home_dir().ok_or("Failed to get user home directory")?;
    Ok(home_dir.join(".guepard").join("config.json"))
}

/// Load configuration from the default location.
pub fn load_config() -> Result<GlobalConfig, String> {
    load_config_from(&get_config_path()?)
}

/// Load configuration from `path`
///
/// If the file doesn't exist, writes one with default values.
pub fn load_config_from(path: &Path) -> Result<GlobalConfig, String> {
    if path.exists() {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        serde_json::from_str(&content).map_err(|e| format!("Failed to parse config file: {}", e))
    } else {
        let config = GlobalConfig::default();
        save_config_to(path, &config)?;
        Ok(config)
    }
}

/// Save configuration to `path`
///
/// Creates the parent directory if it doesn't exist.
pub fn save_config_to(path: &Path, config: &GlobalConfig) -> Result<(), String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    fs::write(path, content).map_err(|e| format!("Failed to write config file: {}", e))?;

    Ok(())
}
