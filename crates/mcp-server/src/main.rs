//! Error Collector MCP Server
//!
//! Collects browser and terminal errors, groups similar ones and serves them,
//! with AI summaries, to agents over MCP.
//!
//! ## Tools
//!
//! - `query_errors` - Filtered, paged list of collected errors
//! - `get_error_summary` - Read or generate root-cause summaries
//! - `get_error_statistics` - Overview, trends, patterns and health reports
//! - `report_error` - Ingest one error event
//!
//! ## Usage
//!
//! Add to your MCP client configuration:
//! ```json
//! {
//!   "mcpServers": {
//!     "error-collector": {
//!       "command": "error-collector-mcp",
//!       "env": { "OPENROUTER_API_KEY": "sk-or-..." }
//!     }
//!   }
//! }
//! ```

use anyhow::Result;
use error_collector_mcp::{open_manager, AppConfig, ErrorCollectorService};
use error_collector_protocol::SystemClock;
use rmcp::transport::stdio;
use rmcp::ServiceExt;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Configure logging to stderr only (stdout is for MCP protocol)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    log::info!("Starting Error Collector MCP server");

    let (config, warnings) = AppConfig::load()?;
    for warning in &warnings {
        log::warn!("{warning}");
    }
    if log::log_enabled!(log::Level::Debug) {
        if let Ok(rendered) = config.to_toml() {
            log::debug!("effective configuration:\n{rendered}");
        }
    }

    let manager = open_manager(&config, Arc::new(SystemClock)).await?;
    let background = manager.start();

    let service = ErrorCollectorService::new(manager);
    let server = service.serve(stdio()).await?;

    // Wait for shutdown
    server.waiting().await?;

    background.shutdown().await;
    log::info!("Error Collector MCP server stopped");
    Ok(())
}
