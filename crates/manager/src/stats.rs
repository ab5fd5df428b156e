//! Report building for `get_error_statistics`. Everything here is a pure
//! function of the records and summaries handed in.

use chrono::{DateTime, Duration, DurationRound, Utc};
use error_collector_protocol::{Category, ErrorRecord, Severity, TimeRange};
use error_collector_store::SummaryStats;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

const MAX_TREND_BUCKETS: usize = 720;
const HEADLINE_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    #[default]
    Overview,
    Trends,
    Patterns,
    Health,
    Detailed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TrendBucket {
    #[default]
    Hour,
    Day,
}

impl TrendBucket {
    fn width(self) -> Duration {
        match self {
            Self::Hour => Duration::hours(1),
            Self::Day => Duration::days(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub total_errors: usize,
    pub total_occurrences: u64,
    pub by_source: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
    pub errors_per_hour: f64,
    pub summaries: SummaryStats,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    pub start: DateTime<Utc>,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trends {
    pub bucket: TrendBucket,
    pub points: Vec<TrendPoint>,
    pub direction: TrendDirection,
    pub peak: Option<TrendPoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecurringMessage {
    pub message: String,
    pub fingerprint: String,
    pub records: usize,
    pub occurrences: u64,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupPattern {
    pub group_id: u64,
    pub size: usize,
    pub representative_message: String,
    pub severity: Severity,
    pub category: Category,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Patterns {
    pub top_groups: Vec<GroupPattern>,
    pub recurring_messages: Vec<RecurringMessage>,
    pub summarization_states: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub stored_errors: usize,
    pub stored_summaries: usize,
    pub active_groups: usize,
    pub pending_groups: usize,
    pub failed_groups: Vec<u64>,
    pub deferred_requests: usize,
    pub summarizer_configured: bool,
    pub auto_summarize: bool,
    pub workers_running: bool,
    /// Groups waiting in the worker queue.
    pub queue_depth: usize,
    pub oldest_error: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsReport {
    pub report_type: ReportType,
    pub time_range: TimeRange,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overview: Option<Overview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trends: Option<Trends>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Patterns>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<Health>,
}

fn count_by<K: ToString>(records: &[ErrorRecord], key: impl Fn(&ErrorRecord) -> K) -> BTreeMap<String, usize> {
    let mut out = BTreeMap::new();
    for record in records {
        *out.entry(key(record).to_string()).or_insert(0) += 1;
    }
    out
}

/// Hours covered by the report window; at least one.
pub fn window_hours(range: TimeRange, records: &[ErrorRecord], now: DateTime<Utc>) -> f64 {
    let span = match range.duration() {
        Some(d) => d,
        None => records
            .iter()
            .map(|r| r.timestamp)
            .min()
            .map_or(Duration::hours(1), |oldest| now - oldest),
    };
    (span.num_seconds() as f64 / 3_600.0).max(1.0)
}

pub fn overview(records: &[ErrorRecord], hours: f64, summaries: SummaryStats) -> Overview {
    let mut overview = Overview {
        total_errors: records.len(),
        total_occurrences: records.iter().map(|r| r.occurrence_count).sum(),
        by_source: count_by(records, |r| r.source),
        by_category: count_by(records, |r| r.category),
        by_severity: count_by(records, |r| r.severity),
        errors_per_hour: records.len() as f64 / hours.max(1.0),
        summaries,
        recommendations: Vec::new(),
    };
    overview.recommendations = recommendations(&overview);
    overview
}

fn recommendations(overview: &Overview) -> Vec<String> {
    let mut out = Vec::new();
    if overview.total_errors == 0 {
        out.push("No errors recorded in this window.".to_string());
        return out;
    }
    let critical = overview.by_severity.get("critical").copied().unwrap_or(0);
    if critical > 0 {
        out.push(format!("Address the {critical} critical error(s) first."));
    }
    let network = overview.by_category.get("network").copied().unwrap_or(0);
    if network * 10 > overview.total_errors * 3 {
        out.push(
            "Network errors dominate; check endpoint availability, CORS and proxy settings."
                .to_string(),
        );
    }
    let permission = overview.by_category.get("permission").copied().unwrap_or(0);
    if permission > 0 {
        out.push("Permission errors present; review file modes and credentials.".to_string());
    }
    if overview.errors_per_hour > 10.0 {
        out.push(format!(
            "Error rate is high ({:.1}/hour); look for a single failing component.",
            overview.errors_per_hour
        ));
    }
    if overview.summaries.total == 0 {
        out.push("No summaries yet; generate one for the most frequent errors.".to_string());
    } else if overview.summaries.average_confidence < 0.5 {
        out.push(
            "Summaries have low confidence; capture stack traces and more context.".to_string(),
        );
    }
    out
}

fn bucket_start(ts: DateTime<Utc>, width: Duration) -> DateTime<Utc> {
    ts.duration_trunc(width).unwrap_or(ts)
}

pub fn trends(records: &[ErrorRecord], bucket: TrendBucket, since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Trends {
    let width = bucket.width();
    let oldest = records.iter().map(|r| r.timestamp).min();
    let from = since.or(oldest).unwrap_or(now);
    let last = bucket_start(now, width);
    let mut first = bucket_start(from, width);
    let max_span = width * (MAX_TREND_BUCKETS as i32 - 1);
    if last - first > max_span {
        first = last - max_span;
    }

    let mut counts: HashMap<DateTime<Utc>, usize> = HashMap::new();
    for record in records {
        let start = bucket_start(record.timestamp, width);
        if start >= first && start <= last {
            *counts.entry(start).or_insert(0) += 1;
        }
    }

    let mut points = Vec::new();
    let mut cursor = first;
    while cursor <= last {
        points.push(TrendPoint {
            start: cursor,
            count: counts.get(&cursor).copied().unwrap_or(0),
        });
        cursor += width;
    }

    let half = points.len() / 2;
    let earlier: usize = points[..half].iter().map(|p| p.count).sum();
    let later: usize = points[points.len() - half..].iter().map(|p| p.count).sum();
    let direction = if later * 5 > earlier * 6 {
        TrendDirection::Increasing
    } else if later * 5 < earlier * 4 {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    };
    let peak = points
        .iter()
        .filter(|p| p.count > 0)
        .max_by_key(|p| (p.count, std::cmp::Reverse(p.start)))
        .cloned();
    Trends {
        bucket,
        points,
        direction,
        peak,
    }
}

/// Fingerprints ranked by total occurrences.
pub fn recurring_messages(records: &[ErrorRecord], top: usize) -> Vec<RecurringMessage> {
    let mut by_fp: HashMap<&str, RecurringMessage> = HashMap::new();
    for record in records {
        let entry = by_fp
            .entry(record.fingerprint.as_str())
            .or_insert_with(|| RecurringMessage {
                message: record.headline(HEADLINE_CHARS),
                fingerprint: record.fingerprint.clone(),
                records: 0,
                occurrences: 0,
                last_seen: record.last_seen,
            });
        entry.records += 1;
        entry.occurrences += record.occurrence_count;
        entry.last_seen = entry.last_seen.max(record.last_seen);
    }
    let mut ranked: Vec<RecurringMessage> = by_fp
        .into_values()
        .filter(|m| m.occurrences > 1)
        .collect();
    ranked.sort_by(|a, b| {
        b.occurrences
            .cmp(&a.occurrences)
            .then_with(|| b.last_seen.cmp(&a.last_seen))
            .then_with(|| a.fingerprint.cmp(&b.fingerprint))
    });
    ranked.truncate(top);
    ranked
}
