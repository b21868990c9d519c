//! MCP server over stdio
//!
//! Design:
//! - Framing, dispatch and the initialize handshake come from `rmcp`; this
//!   module only maps requests onto `ResearchService`
//! - Tool calls never overlap: `ResearchService` serializes them internally
//! - Session changes are announced through the peer before the tool result
//!   that caused them is returned
//! - Tool failures become `isError` results, never protocol errors

pub mod catalog;

use base64::Engine;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, GetPromptRequestParam, GetPromptResult,
    Implementation, JsonObject, ListPromptsResult, ListResourcesResult, ListToolsResult,
    PaginatedRequestParam, ReadResourceRequestParam, ReadResourceResult, ResourceContents,
    ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, Peer, RoleServer, ServerHandler};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, Mutex};

use crate::error::ToolError;
use crate::research::{ResearchService, SCREENSHOT_PLACEHOLDER};
use crate::session::SessionEvent;
use catalog::{SearchArgs, VisitPageArgs, SCREENSHOT_TOOL, SEARCH_TOOL, SUMMARY_URI, VISIT_TOOL};

pub const SERVER_NAME: &str = "webresearch";

pub struct McpServer {
    service: Arc<ResearchService>,
    events: Mutex<broadcast::Receiver<SessionEvent>>,
}

fn parse_args<T: DeserializeOwned>(arguments: Option<JsonObject>) -> Result<T, McpError> {
    serde_json::from_value(Value::Object(arguments.unwrap_or_default()))
        .map_err(|e| McpError::invalid_params(format!("invalid arguments: {e}"), None))
}

fn png_content(bytes: &[u8]) -> Content {
    Content::image(
        base64::engine::general_purpose::STANDARD.encode(bytes),
        "image/png",
    )
}

fn resource_error(err: ToolError) -> McpError {
    match err {
        ToolError::Validation(message) => McpError::invalid_params(message, None),
        other => McpError::internal_error(other.to_string(), None),
    }
}

/// Drain pending session events; true if the resource listing changed
fn resources_changed(events: &mut broadcast::Receiver<SessionEvent>) -> bool {
    let mut changed = false;
    loop {
        match events.try_recv() {
            Ok(SessionEvent::ScreenshotAdded { .. } | SessionEvent::ScreenshotsChanged)
            | Err(TryRecvError::Lagged(_)) => changed = true,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return changed,
        }
    }
}

impl McpServer {
    /// Session events are observed from construction on, so nothing that
    /// happens before the first request is missed.
    pub fn new(service: Arc<ResearchService>) -> Self {
        let events = Mutex::new(service.subscribe());
        Self { service, events }
    }

    async fn announce_changes(&self, peer: &Peer<RoleServer>) {
        let changed = {
            let mut events = self.events.lock().await;
            resources_changed(&mut events)
        };
        if !changed {
            return;
        }
        tracing::debug!("[Server] -> notifications/resources/list_changed");
        if let Err(e) = peer.notify_resource_list_changed().await {
            tracing::warn!("[Server] Could not announce resource change: {}", e);
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<Content>, ToolError> {
        let results = self.service.search(query).await?;
        let text = serde_json::to_string_pretty(&results)
            .map_err(|e| ToolError::Io(std::io::Error::other(e)))?;
        Ok(vec![Content::text(text)])
    }

    async fn visit(&self, url: &str, take_screenshot: bool) -> Result<Vec<Content>, ToolError> {
        let visit = self.service.visit_page(url, take_screenshot).await?;
        let body = json!({
            "url": visit.url,
            "title": visit.title,
            "content": visit.content,
        });
        let mut content = vec![Content::text(body.to_string())];
        if let Some(shot) = &visit.screenshot {
            content.push(png_content(&shot.read().await?));
        }
        Ok(content)
    }

    async fn screenshot(&self) -> Result<Vec<Content>, ToolError> {
        let capture = self.service.take_screenshot().await?;
        let png = capture.screenshot.read().await?;
        Ok(vec![Content::text(SCREENSHOT_PLACEHOLDER), png_content(&png)])
    }
}

impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder()
                .enable_prompts()
                .enable_resources()
                .enable_resources_list_changed()
                .enable_tools()
                .build(),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Implementation::from_build_env()
            },
            ..ServerInfo::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(catalog::tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let name = request.name.as_ref();
        tracing::debug!("[Server] <- tools/call {}", name);
        let outcome = match name {
            SEARCH_TOOL => {
                let args: SearchArgs = parse_args(request.arguments)?;
                self.search(&args.query).await
            }
            VISIT_TOOL => {
                let args: VisitPageArgs = parse_args(request.arguments)?;
                self.visit(&args.url, args.take_screenshot).await
            }
            SCREENSHOT_TOOL => self.screenshot().await,
            other => {
                return Err(McpError::invalid_params(format!("unknown tool: {other}"), None));
            }
        };
        self.announce_changes(&context.peer).await;

        Ok(match outcome {
            Ok(content) => CallToolResult::success(content),
            Err(e) => {
                tracing::error!("[Server] {} failed: {}", name, e);
                CallToolResult::error(vec![Content::text(e.to_string())])
            }
        })
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let indices = self.service.screenshot_indices().await;
        Ok(ListResourcesResult::with_all_items(catalog::resources(&indices)))
    }

    async fn read_resource(
        &self,
        ReadResourceRequestParam { uri }: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        if uri == SUMMARY_URI {
            let summary = self
                .service
                .session_summary()
                .await
                .ok_or_else(|| McpError::invalid_params("no active research session", None))?;
            let text = serde_json::to_string_pretty(&summary)
                .map_err(|e| McpError::internal_error(e.to_string(), None))?;
            return Ok(ReadResourceResult {
                contents: vec![ResourceContents::TextResourceContents {
                    uri,
                    mime_type: Some("application/json".to_string()),
                    text,
                    meta: None,
                }],
            });
        }

        if let Some(index) = catalog::parse_screenshot_uri(&uri) {
            let png = self.service.screenshot(index?).await.map_err(resource_error)?;
            return Ok(ReadResourceResult {
                contents: vec![ResourceContents::BlobResourceContents {
                    uri,
                    mime_type: Some("image/png".to_string()),
                    blob: base64::engine::general_purpose::STANDARD.encode(png),
                    meta: None,
                }],
            });
        }

        Err(McpError::resource_not_found(
            format!("unknown resource: {uri}"),
            Some(json!({ "uri": uri })),
        ))
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, McpError> {
        Ok(ListPromptsResult::with_all_items(catalog::prompts()))
    }

    async fn get_prompt(
        &self,
        GetPromptRequestParam { name, arguments }: GetPromptRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        catalog::get_prompt(&name, arguments.as_ref())
    }
}
