use super::error::json_result;
use super::schemas::ErrorStatisticsRequest;
use error_collector_manager::ErrorManager;
use rmcp::model::CallToolResult;

pub(super) async fn run(manager: &ErrorManager, request: ErrorStatisticsRequest) -> CallToolResult {
    let report = manager
        .get_statistics(
            request.report_type.unwrap_or_default(),
            request.time_range.unwrap_or_default(),
            request.grouping.unwrap_or_default(),
        )
        .await;
    json_result(&report)
}
