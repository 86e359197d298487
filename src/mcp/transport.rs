//! MCP SSE Transport Layer
//!
//! Serves MCP over HTTP Server-Sent Events for clients that connect to a
//! long-running process instead of spawning one.

use super::GuepardMcpServer;
use crate::api::GuepardClient;
use crate::config::ToolsConfig;
use crate::subscriptions::SubscriptionService;
use rmcp::transport::sse_server::{SseServer, SseServerConfig, SseServerTransport};
use rmcp::ServiceExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// MCP SSE Server default port
pub const MCP_PORT: u16 = 47300;

/// Start the MCP SSE Server on localhost.
///
/// Every connection gets its own `GuepardMcpServer`, all sharing `service`.
/// The most recently initialized connection receives notifications, and
/// monitoring stops once the last connection goes away.
pub async fn start_sse_server(
    service: SubscriptionService,
    client: GuepardClient,
    tools: Arc<ToolsConfig>,
    port: u16,
) -> Result<(), String> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let ct = CancellationToken::new();

    let config = SseServerConfig {
        bind: addr,
        sse_path: "/sse".to_string(),
        post_path: "/message".to_string(),
        ct: ct.clone(),
        sse_keep_alive: Some(Duration::from_secs(30)),
    };

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("MCP: Failed to bind to port {}: {}", port, e))?;

    log::info!("MCP Server listening on http://{}", addr);
    log::info!("  GET  /sse      - SSE connection");
    log::info!("  POST /message  - MCP messages");

    let (mut sse_server, router) = SseServer::new(config);

    let shared = service.clone();
    let accept_ct = ct.clone();
    tokio::spawn(async move {
        while let Some(transport) = sse_server.next_transport().await {
            let server = GuepardMcpServer::new(shared.clone(), client.clone(), tools.clone());
            tokio::spawn(serve_session(server, transport, accept_ct.child_token()));
        }
    });

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => ct.cancel(),
                Err(e) => {
                    log::warn!("Failed to listen for shutdown signal: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        })
        .await
        .map_err(|e| format!("MCP Server error: {}", e));

    service.shutdown().await;
    result
}

/// Run one SSE connection to completion, keeping the live session count.
async fn serve_session(
    server: GuepardMcpServer,
    transport: SseServerTransport,
    ct: CancellationToken,
) {
    let service = server.service().clone();
    let session_id = server.session_id().to_string();
    service.session_opened().await;

    match server.serve_with_ct(transport, ct).await {
        Ok(running) => {
            if let Err(e) = running.waiting().await {
                log::warn!("MCP session {} ended with error: {}", session_id, e);
            }
        }
        Err(e) => log::warn!("MCP session {} failed to initialize: {}", session_id, e),
    }

    log::info!("MCP client disconnected (session_id={})", session_id);
    service.session_closed(&session_id).await;
}
