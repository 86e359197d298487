//! Guepard MCP Server - command line entry point
//!
//! Serves the Guepard tools over stdio (default) or SSE. Logs go to stderr;
//! stdout belongs to the JSON-RPC stream in stdio mode.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

use guepard_lib::api::GuepardClient;
use guepard_lib::config::{self, GlobalConfig};
use guepard_lib::mcp::{self, server::DEPLOYMENT_TOOLS, GuepardMcpServer};
use guepard_lib::subscriptions::SubscriptionService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    Stdio,
    Sse,
}

#[derive(Parser, Debug)]
#[command(
    name = "guepard-mcp",
    author,
    version,
    about = "MCP server for the Guepard platform",
    long_about = "Exposes Guepard deployments to MCP clients and pushes deployment status changes as notifications"
)]
struct Cli {
    /// Transport to serve MCP over
    #[arg(long, value_enum, default_value_t = Transport::Stdio)]
    transport: Transport,

    /// Port for the SSE transport
    #[arg(long, default_value_t = mcp::MCP_PORT)]
    port: u16,

    /// Config file path (defaults to ~/.guepard/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Monitoring interval in seconds, overriding the config file
    #[arg(long)]
    interval: Option<u64>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(Cli::parse()).await {
        log::error!("{:#}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    config.apply_env();
    if let Some(interval) = cli.interval {
        config.monitoring.interval_secs = interval;
    }

    let client = GuepardClient::new(config.api_url.clone(), config.access_token.clone());
    if !client.has_token() {
        log::warn!("ACCESS_TOKEN is not set; API calls will be rejected");
    }

    let tools = Arc::new(config.tools.resolved());
    let enabled = GuepardMcpServer::enabled_tool_names(&tools);
    log::info!(
        "Tool configuration: {} ({} tools enabled)",
        tools.configuration_mode(),
        enabled.len()
    );
    log::debug!("Enabled tools: {}", enabled.join(", "));

    let policy = config
        .build_policy(DEPLOYMENT_TOOLS.iter().copied())
        .map_err(anyhow::Error::msg)?;
    let service = SubscriptionService::new(
        Arc::new(client.clone()),
        policy,
        config.service_settings(),
    );

    log::info!(
        "Starting Guepard MCP Server (api={}, transport={:?})",
        client.api_url(),
        cli.transport
    );

    match cli.transport {
        Transport::Stdio => {
            let server = GuepardMcpServer::new(service, client, tools);
            mcp::start_stdio_server(server)
                .await
                .map_err(anyhow::Error::msg)?;
        }
        Transport::Sse => {
            mcp::start_sse_server(service, client, tools, cli.port)
                .await
                .map_err(anyhow::Error::msg)?;
        }
    }

    log::info!("Guepard MCP Server stopped");
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<GlobalConfig> {
    match path {
        Some(path) => config::load_config_from(path)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => config::load_config().map_err(anyhow::Error::msg),
    }
}
