use super::error::{json_result, manager_error, validation_error};
use super::schemas::ReportErrorRequest;
use chrono::{DateTime, Utc};
use error_collector_manager::ErrorManager;
use error_collector_protocol::RawErrorEvent;
use rmcp::model::CallToolResult;

pub(super) async fn run(manager: &ErrorManager, request: ReportErrorRequest) -> CallToolResult {
    let timestamp = match request.timestamp.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(parsed) => Some(parsed.with_timezone(&Utc)),
            Err(err) => {
                return validation_error(format!("timestamp {raw:?} is not RFC 3339: {err}"));
            }
        },
    };
    let event = RawErrorEvent {
        source: request.source.unwrap_or_default(),
        timestamp,
        message: request.message,
        stack_trace: request.stack_trace,
        context: request.context.unwrap_or_default(),
        severity: request.severity,
        category: request.category,
    };
    match manager.register_error(event).await {
        Ok(outcome) => json_result(&outcome),
        Err(err) => manager_error(&err),
    }
}
