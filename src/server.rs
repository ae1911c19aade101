//! MCP server exposing the `search_and_export_emails` tool over stdio

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, ErrorData, ServerCapabilities, ServerInfo};
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::Deserialize;
use serde_json::{json, Value};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{error, info};

use crate::error::GmailError;
use crate::models::{ExportRequest, ExportResult};
use crate::service::ExportService;

pub const TOOL_NAME: &str = "search_and_export_emails";

/// Raw tool arguments, published with the [`ExportRequest`] schema
///
/// Decoding into `ExportRequest` happens inside the tool so that malformed
/// arguments come back as a tool result rather than an `invalid_params`
/// protocol error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct ToolArguments(pub Value);

impl JsonSchema for ToolArguments {
    fn schema_name() -> Cow<'static, str> {
        ExportRequest::schema_name()
    }

    fn schema_id() -> Cow<'static, str> {
        ExportRequest::schema_id()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        ExportRequest::json_schema(generator)
    }
}

/// Gmail export MCP server
///
/// Every tool failure is reported inside the tool result as
/// `{"success": false, "error": ...}`; the transport never sees an error.
#[derive(Clone)]
pub struct GmailExportServer {
    service: Arc<ExportService>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl GmailExportServer {
    pub fn new(service: Arc<ExportService>) -> Self {
        Self {
            service,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "search_and_export_emails",
        description = "Search Gmail for emails matching criteria (label, date range) and export results to CSV with full Hebrew/Unicode support. Perfect for data extraction and analysis."
    )]
    async fn search_and_export_emails(
        &self,
        Parameters(ToolArguments(arguments)): Parameters<ToolArguments>,
    ) -> Result<CallToolResult, ErrorData> {
        let text = self.call(arguments).await;
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

impl GmailExportServer {
    /// Decode raw tool arguments and run the export
    pub async fn call(&self, arguments: Value) -> String {
        let arguments = if arguments.is_null() {
            json!({})
        } else {
            arguments
        };
        match serde_json::from_value::<ExportRequest>(arguments) {
            Ok(request) => self.run(&request).await,
            Err(e) => render_outcome(Err(GmailError::InvalidInput(format!(
                "invalid {} arguments: {}",
                TOOL_NAME, e
            )))),
        }
    }

    /// Run one export and render the tool's JSON reply
    pub async fn run(&self, request: &ExportRequest) -> String {
        info!("Tool call {}: {:?}", TOOL_NAME, request);
        render_outcome(self.service.search_and_export(request).await)
    }
}

/// Pretty-printed JSON for a finished export, non-ASCII left unescaped
pub fn render_outcome(outcome: crate::error::Result<ExportResult>) -> String {
    let rendered = outcome.and_then(|result| Ok(serde_json::to_value(&result)?));
    let value = match rendered {
        Ok(value) => value,
        Err(e) => {
            error!("Tool execution error: {}", e);
            failure(&e.to_string())
        }
    };
    format!("{:#}", value)
}

fn failure(message: &str) -> Value {
    json!({
        "success": false,
        "error": message,
    })
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for GmailExportServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Gmail email extraction server. Searches the authorized mailbox by label and date range and exports matches to a UTF-8 (BOM) CSV file.".to_owned(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
