use error_collector_manager::{ReportType, TrendBucket};
use error_collector_protocol::{Category, ErrorSource, Severity, TimeRange};
use rmcp::schemars;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct QueryErrorsRequest {
    /// Look-back window
    #[schemars(description = "Look-back window: '1h', '6h', '24h' (default), '7d', '30d' or 'all'")]
    pub time_range: Option<TimeRange>,

    #[schemars(description = "Only errors from these sources (browser, terminal, unknown)")]
    pub sources: Option<Vec<ErrorSource>>,

    #[schemars(description = "Only errors in these categories")]
    pub categories: Option<Vec<Category>>,

    #[schemars(description = "Only errors with these severities (low, medium, high, critical)")]
    pub severities: Option<Vec<Severity>>,

    /// Page size (default: 20)
    #[schemars(description = "Page size, 1-100 (default 20)")]
    pub limit: Option<usize>,

    #[schemars(description = "Records to skip; pass next_offset from the previous page")]
    pub offset: Option<usize>,

    #[schemars(description = "Include each error's (redacted) context map. Default: false")]
    pub include_context: Option<bool>,

    #[schemars(description = "Also fold the page into clusters of similar errors. Default: false")]
    pub group_similar: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SummaryAction {
    /// Fetch one summary by id.
    GetExisting,
    /// Summarize the given errors (reuses a stored summary unless forced).
    GenerateNew,
    /// Summaries covering any of the given errors.
    GetForError,
    /// Most relevant recent summaries.
    ListRecent,
}

impl SummaryAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetExisting => "get_existing",
            Self::GenerateNew => "generate_new",
            Self::GetForError => "get_for_error",
            Self::ListRecent => "list_recent",
        }
    }
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ErrorSummaryRequest {
    #[schemars(
        description = "'get_existing' (summary_id), 'generate_new' (error_ids), 'get_for_error' (error_ids) or 'list_recent'"
    )]
    pub action: SummaryAction,

    #[schemars(description = "Summary id for get_existing")]
    pub summary_id: Option<String>,

    #[schemars(description = "Error ids for generate_new and get_for_error")]
    pub error_ids: Option<Vec<String>>,

    #[schemars(description = "Look-back window for list_recent (default '24h')")]
    pub time_range: Option<TimeRange>,

    #[schemars(description = "Drop summaries below this confidence (0.0-1.0)")]
    pub min_confidence: Option<f64>,

    /// Maximum summaries returned (default: 10)
    #[schemars(description = "Maximum summaries returned, 1-50 (default 10)")]
    pub limit: Option<usize>,

    #[schemars(description = "generate_new: ignore stored and cached summaries. Default: false")]
    pub force: Option<bool>,

    #[schemars(
        description = "Ask the model for additional solutions (one extra request). Default: false"
    )]
    pub enhance_solutions: Option<bool>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct ErrorStatisticsRequest {
    #[schemars(
        description = "'overview' (default), 'trends', 'patterns', 'health' or 'detailed' (all sections)"
    )]
    pub report_type: Option<ReportType>,

    #[schemars(description = "Look-back window (default '24h')")]
    pub time_range: Option<TimeRange>,

    #[schemars(description = "Trend bucket: 'hour' (default) or 'day'")]
    pub grouping: Option<TrendBucket>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct ReportErrorRequest {
    #[schemars(description = "Where the error came from: browser, terminal or unknown (default)")]
    pub source: Option<ErrorSource>,

    #[schemars(description = "Error message (required, non-empty)")]
    pub message: String,

    #[schemars(description = "RFC 3339 time the error happened; defaults to now")]
    pub timestamp: Option<String>,

    pub stack_trace: Option<String>,

    #[schemars(
        description = "Extra fields (url, command, exit_code, ...). Nested objects are flattened and secrets redacted"
    )]
    pub context: Option<serde_json::Map<String, serde_json::Value>>,

    #[schemars(description = "Override the inferred severity")]
    pub severity: Option<Severity>,

    #[schemars(description = "Override the inferred category")]
    pub category: Option<Category>,
}
