//! MCP server surface: an rmcp [`ServerHandler`] over the Kimai tool set.
//!
//! rmcp owns framing, the initialize handshake and request ids. Each request runs on its own
//! task; tool calls additionally wait for a permit so at most `max_concurrent_calls` upstream
//! requests are in flight. A `notifications/cancelled` for a running call drops its future, which
//! closes the HTTP connection.

use kimai_mcp_tools::KimaiTools;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParams,
    ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::info;

const SERVER_NAME: &str = "kimai-mcp";

#[derive(Clone)]
pub struct KimaiServer {
    tools: KimaiTools,
    permits: Arc<Semaphore>,
}

impl KimaiServer {
    #[must_use]
    pub fn new(tools: KimaiTools, max_concurrent_calls: usize) -> Self {
        Self {
            tools,
            permits: Arc::new(Semaphore::new(max_concurrent_calls.max(1))),
        }
    }
}

impl ServerHandler for KimaiServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                title: Some("Kimai".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "Tools for the Kimai time-tracking API. Ids are Kimai record ids; visibility \
                 filters take true or false."
                    .to_string(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult::with_all_items(self.tools.list_tools())))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move {
            let name = request.name;
            let arguments = request.arguments.map_or(Value::Null, Value::Object);
            let call = async {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|_| McpError::internal_error("server is shutting down", None))?;
                Ok::<_, McpError>(self.tools.call_tool(&name, arguments).await)
            };

            tokio::select! {
                result = call => result,
                () = context.ct.cancelled() => {
                    info!(tool = %name, id = %context.id, "tool call cancelled");
                    Err(McpError::internal_error("request cancelled", None))
                }
            }
        }
    }
}
