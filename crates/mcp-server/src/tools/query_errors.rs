use super::error::json_result;
use super::schemas::QueryErrorsRequest;
use error_collector_manager::ErrorManager;
use error_collector_protocol::{Category, ErrorRecord, Severity, TimeRange};
use error_collector_store::ErrorFilter;
use rmcp::model::CallToolResult;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;

#[derive(Debug, Serialize)]
struct QueryErrorsResult {
    time_range: TimeRange,
    total: usize,
    returned: usize,
    offset: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_offset: Option<usize>,
    errors: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    clusters: Option<Vec<Cluster>>,
}

#[derive(Debug, Serialize)]
struct Cluster {
    representative_id: String,
    representative_message: String,
    severity: Severity,
    category: Category,
    size: usize,
    member_ids: Vec<String>,
}

pub(super) async fn run(manager: &ErrorManager, request: QueryErrorsRequest) -> CallToolResult {
    let time_range = request.time_range.unwrap_or_default();
    let limit = request.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = request.offset.unwrap_or(0);
    let filter = ErrorFilter {
        since: time_range.start(manager.now()),
        sources: request.sources.unwrap_or_default(),
        categories: request.categories.unwrap_or_default(),
        severities: request.severities.unwrap_or_default(),
        limit: Some(limit),
        offset,
        ..ErrorFilter::default()
    };
    let page = manager.get_errors(&filter);

    let group_of: HashMap<String, u64> = manager
        .group_states()
        .await
        .into_iter()
        .flat_map(|view| {
            let group_id = view.group.group_id;
            view.group.member_ids.into_iter().map(move |id| (id, group_id))
        })
        .collect();
    let include_context = request.include_context.unwrap_or(false);
    let errors: Vec<Value> = page
        .records
        .iter()
        .map(|record| error_view(record, include_context, group_of.get(&record.id).copied()))
        .collect();

    let clusters = if request.group_similar.unwrap_or(false) {
        let records = &page.records;
        let clusters = manager.cluster(records).await;
        Some(
            clusters
                .into_iter()
                .map(|group| Cluster {
                    representative_id: group.representative_id,
                    representative_message: group.representative_message,
                    severity: group.representative_severity,
                    category: group.category,
                    size: group.member_ids.len(),
                    member_ids: group.member_ids.into_iter().collect(),
                })
                .collect(),
        )
    } else {
        None
    };

    json_result(&QueryErrorsResult {
        time_range,
        total: page.total,
        returned: errors.len(),
        offset,
        next_offset: page.next_offset,
        errors,
        clusters,
    })
}

fn error_view(record: &ErrorRecord, include_context: bool, group_id: Option<u64>) -> Value {
    let mut value = serde_json::to_value(record).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut value {
        if !include_context {
            map.remove("context");
        }
        if let Some(group_id) = group_id {
            map.insert("group_id".to_string(), group_id.into());
        }
    }
    value
}
