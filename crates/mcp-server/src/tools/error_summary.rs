use super::error::{invalid_request, json_result, manager_error};
use super::schemas::{ErrorSummaryRequest, SummaryAction};
use error_collector_manager::ErrorManager;
use error_collector_protocol::ErrorSummary;
use error_collector_store::SummaryFilter;
use rmcp::model::CallToolResult;
use serde::Serialize;
use std::collections::HashSet;

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 50;

#[derive(Debug, Serialize)]
struct SummaryResult {
    action: &'static str,
    total: usize,
    summaries: Vec<ErrorSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    additional_solutions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
}

impl SummaryResult {
    fn new(action: SummaryAction, summaries: Vec<ErrorSummary>) -> Self {
        Self {
            action: action.as_str(),
            total: summaries.len(),
            summaries,
            additional_solutions: None,
            note: None,
        }
    }
}

pub(super) async fn run(manager: &ErrorManager, request: ErrorSummaryRequest) -> CallToolResult {
    let min_confidence = match request.min_confidence {
        Some(value) if !(0.0..=1.0).contains(&value) => {
            return invalid_request(format!("min_confidence must be within [0, 1], got {value}"));
        }
        other => other,
    };
    let limit = request.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let error_ids: Vec<String> = request
        .error_ids
        .unwrap_or_default()
        .into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();
    let enhance = request.enhance_solutions.unwrap_or(false);
    let action = request.action;

    match action {
        SummaryAction::GetExisting => {
            let Some(summary_id) = request
                .summary_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
            else {
                return invalid_request("get_existing requires summary_id");
            };
            let summary = manager.get_summary(summary_id);
            let mut result = SummaryResult::new(action, summary.iter().cloned().collect());
            match summary {
                Some(summary) if enhance => {
                    result.additional_solutions = Some(manager.enhance_solutions(&summary).await);
                }
                Some(_) => {}
                None => result.note = Some(format!("no summary with id {summary_id}")),
            }
            json_result(&result)
        }
        SummaryAction::GenerateNew => {
            if error_ids.is_empty() {
                return invalid_request("generate_new requires at least one id in error_ids");
            }
            let force = request.force.unwrap_or(false);
            match manager.request_summary(&error_ids, force).await {
                Ok(summary) => {
                    let mut result = SummaryResult::new(action, vec![summary.clone()]);
                    if enhance {
                        result.additional_solutions =
                            Some(manager.enhance_solutions(&summary).await);
                    }
                    if summary.error_ids.len() < error_ids.len() {
                        result.note = Some(format!(
                            "summarized the {} most severe and recent of {} errors",
                            summary.error_ids.len(),
                            error_ids.len()
                        ));
                    }
                    json_result(&result)
                }
                Err(err) => manager_error(&err),
            }
        }
        SummaryAction::GetForError => {
            if error_ids.is_empty() {
                return invalid_request("get_for_error requires at least one id in error_ids");
            }
            let mut seen = HashSet::new();
            let mut summaries: Vec<ErrorSummary> = error_ids
                .iter()
                .flat_map(|id| manager.summaries_for_error(id))
                .filter(|s| min_confidence.map_or(true, |min| s.confidence_score >= min))
                .filter(|s| seen.insert(s.summary_id.clone()))
                .collect();
            summaries.truncate(limit);
            json_result(&SummaryResult::new(action, summaries))
        }
        SummaryAction::ListRecent => {
            let time_range = request.time_range.unwrap_or_default();
            let filter = SummaryFilter {
                since: time_range.start(manager.now()),
                min_confidence,
                limit: Some(limit),
                ..SummaryFilter::default()
            };
            json_result(&SummaryResult::new(action, manager.list_summaries(&filter)))
        }
    }
}
