//! # Error Collector MCP
//!
//! Configuration loading, pipeline bootstrap and the MCP tool surface used by
//! the `error-collector-mcp` binary.
//!
//! ```text
//! config.toml + ERROR_COLLECTOR_* ──> AppConfig ──open_manager──> ErrorManager
//!                                                                     │
//!                      stdio <──rmcp── ErrorCollectorService <────────┘
//! ```

pub mod bootstrap;
pub mod config;
pub mod tools;

pub use bootstrap::open_manager;
pub use config::AppConfig;
pub use tools::ErrorCollectorService;
