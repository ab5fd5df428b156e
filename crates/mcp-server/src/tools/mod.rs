//! MCP tool surface over the [`ErrorManager`].
//!
//! Every handler returns a JSON document as text plus structured content.
//! Failures come back as `CallToolResult::error` with an
//! [`ErrorEnvelope`](error_collector_protocol::ErrorEnvelope) payload; empty
//! results are never errors.

mod error;
mod error_summary;
mod query_errors;
mod report_error;
mod schemas;
mod statistics;

pub use schemas::{
    ErrorStatisticsRequest, ErrorSummaryRequest, QueryErrorsRequest, ReportErrorRequest,
    SummaryAction,
};

use error_collector_manager::ErrorManager;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Implementation, ServerCapabilities, ServerInfo};
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};

/// Error Collector MCP Service
#[derive(Clone)]
pub struct ErrorCollectorService {
    manager: ErrorManager,
    /// Tool router
    tool_router: ToolRouter<Self>,
}

impl ErrorCollectorService {
    pub fn new(manager: ErrorManager) -> Self {
        Self {
            manager,
            tool_router: Self::tool_router(),
        }
    }

    pub fn manager(&self) -> &ErrorManager {
        &self.manager
    }
}

#[tool_router]
impl ErrorCollectorService {
    /// Query stored errors
    #[tool(
        description = "List collected browser and terminal errors, newest first, filtered by time range, source, category and severity. Paged via limit/offset; set group_similar to cluster near-identical messages."
    )]
    pub async fn query_errors(
        &self,
        Parameters(request): Parameters<QueryErrorsRequest>,
    ) -> Result<CallToolResult, McpError> {
        Ok(query_errors::run(&self.manager, request).await)
    }

    /// Read or generate AI summaries
    #[tool(
        description = "AI root-cause summaries of errors. Actions: get_existing (by summary_id), generate_new (summarize error_ids; needs an API key), get_for_error (summaries covering error_ids), list_recent (best recent summaries)."
    )]
    pub async fn get_error_summary(
        &self,
        Parameters(request): Parameters<ErrorSummaryRequest>,
    ) -> Result<CallToolResult, McpError> {
        Ok(error_summary::run(&self.manager, request).await)
    }

    /// Aggregate statistics
    #[tool(
        description = "Error statistics: overview (totals, breakdowns, rate, recommendations), trends (hourly/daily counts and direction), patterns (top groups, recurring messages), health (store and summarizer status), or detailed (all)."
    )]
    pub async fn get_error_statistics(
        &self,
        Parameters(request): Parameters<ErrorStatisticsRequest>,
    ) -> Result<CallToolResult, McpError> {
        Ok(statistics::run(&self.manager, request).await)
    }

    /// Ingest one error
    #[tool(
        description = "Report an error event (collector entry point). Returns the stored id, whether it was a duplicate within the dedup window, and its group."
    )]
    pub async fn report_error(
        &self,
        Parameters(request): Parameters<ReportErrorRequest>,
    ) -> Result<CallToolResult, McpError> {
        Ok(report_error::run(&self.manager, request).await)
    }
}

#[tool_handler]
impl ServerHandler for ErrorCollectorService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some("Error Collector aggregates browser and terminal errors and explains them. Use 'query_errors' to see recent errors, 'get_error_summary' for AI root-cause analysis, 'get_error_statistics' for trends and health, and 'report_error' to ingest an event.".into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            ..Default::default()
        }
    }
}
