use error_collector_manager::ManagerError;
use error_collector_protocol::ErrorEnvelope;
use rmcp::model::{CallToolResult, Content};
use serde::Serialize;
use serde_json::json;

/// Success result carrying `payload` both as text and as structured content.
pub(super) fn json_result<T: Serialize>(payload: &T) -> CallToolResult {
    match serde_json::to_value(payload) {
        Ok(value) => {
            let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
            let mut result = CallToolResult::success(vec![Content::text(text)]);
            result.structured_content = Some(value);
            result
        }
        Err(err) => tool_error(ErrorEnvelope::new(
            "internal_error",
            format!("failed to serialize response: {err}"),
        )),
    }
}

pub(super) fn tool_error(envelope: ErrorEnvelope) -> CallToolResult {
    let text = serde_json::to_string(&envelope).unwrap_or_else(|_| envelope.message.clone());
    let mut result = CallToolResult::error(vec![Content::text(text)]);
    result.structured_content = Some(json!({ "error": envelope }));
    result
}

pub(super) fn invalid_request(message: impl Into<String>) -> CallToolResult {
    tool_error(ErrorEnvelope::new("invalid_request", message))
}

pub(super) fn validation_error(message: impl Into<String>) -> CallToolResult {
    tool_error(ErrorEnvelope::new("validation_error", message))
}

pub(super) fn manager_error(err: &ManagerError) -> CallToolResult {
    let code = err.code();
    let mut envelope = ErrorEnvelope::new(code, err.to_string())
        .with_details(json!({ "retryable": err.is_retryable() }));
    if let Some(hint) = hint_for(code) {
        envelope = envelope.with_hint(hint);
    }
    log::debug!("tool error {code}: {err}");
    tool_error(envelope)
}

fn hint_for(code: &str) -> Option<&'static str> {
    Some(match code {
        "summarizer_disabled" => {
            "Set ERROR_COLLECTOR_API_KEY (or OPENROUTER_API_KEY) and restart the server to enable summaries."
        }
        "rate_limit_exceeded" => "The summarization API is throttling requests; retry in a minute.",
        "summary_unavailable" => {
            "The request was queued and will be retried on the next periodic pass; check back later."
        }
        "timeout" => "The summarization took too long; retry, or request fewer errors.",
        "rejected" => "The API refused the request; check the API key and model name.",
        "not_found" => "Use query_errors to list valid error ids.",
        "validation_error" => "Provide a non-empty message and valid field values.",
        "storage_unavailable" => "The data directory is not writable right now; retry shortly.",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_errors_become_envelopes_with_hints() {
        let result = manager_error(&ManagerError::SummarizerDisabled);
        assert_eq!(result.is_error, Some(true));
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["error"]["code"], "summarizer_disabled");
        assert!(structured["error"]["hint"]
            .as_str()
            .unwrap()
            .contains("ERROR_COLLECTOR_API_KEY"));
        assert_eq!(structured["error"]["details"]["retryable"], false);
    }
}
