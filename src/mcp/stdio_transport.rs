//! MCP stdio Transport Layer
//!
//! The standard MCP transport used when a client launches `guepard-mcp` as a
//! subprocess. JSON-RPC messages are read from stdin and responses written to
//! stdout, so all logging goes to stderr.

use super::GuepardMcpServer;
use rmcp::ServiceExt;

/// Start a stdio-based MCP Server.
///
/// Blocks until the MCP client disconnects (EOF on stdin). On the way out the
/// session is closed on the shared service, which detaches it and stops
/// background monitoring.
///
/// # Returns
/// * `Ok(())` on clean shutdown
/// * `Err(String)` on initialization failure
pub async fn start_stdio_server(server: GuepardMcpServer) -> Result<(), String> {
    let service_handle = server.service().clone();
    let session_id = server.session_id().to_string();
    service_handle.session_opened().await;

    let (stdin, stdout) = rmcp::transport::io::stdio();

    let result = match server.serve((stdin, stdout)).await {
        Ok(running) => running
            .waiting()
            .await
            .map(|_| ())
            .map_err(|e| format!("MCP stdio server error: {}", e)),
        Err(e) => Err(format!("Failed to initialize MCP stdio server: {}", e)),
    };

    log::info!("MCP stdio client disconnected (session_id={})", session_id);
    service_handle.session_closed(&session_id).await;

    result
}
