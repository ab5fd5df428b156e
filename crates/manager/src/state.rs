//! Per-group summarization lifecycle.
//!
//! ```text
//! collecting ──threshold | periodic──> pending_summary ──started──> summarizing
//!                                          ^   ^                      │
//!                    periodic (failures<max)│   └──── interrupted ────┤
//!                                          │                          ├──succeeded──> summarized
//!                                   summary_failed <──exhausted | rejected┘
//! ```

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SummaryState {
    Collecting,
    PendingSummary { failures: u32 },
    Summarizing { failures: u32 },
    Summarized { summary_id: String },
    SummaryFailed { failures: u32 },
}

impl SummaryState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Collecting => "collecting",
            Self::PendingSummary { .. } => "pending_summary",
            Self::Summarizing { .. } => "summarizing",
            Self::Summarized { .. } => "summarized",
            Self::SummaryFailed { .. } => "summary_failed",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::PendingSummary { .. })
    }

    /// Members should be protected from cap eviction.
    pub fn awaits_summary(&self) -> bool {
        matches!(
            self,
            Self::PendingSummary { .. } | Self::Summarizing { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryEvent {
    ThresholdReached,
    PeriodicPass { max_attempts: u32 },
    Started,
    Succeeded { summary_id: String },
    /// The client gave up after its retries, or the caller's bound (which
    /// covers the whole retry budget) ran out.
    Exhausted,
    /// Cancellation or throttling; nothing was produced.
    Interrupted,
    /// The upstream refused the request outright.
    Rejected { max_attempts: u32 },
}

/// Next state, or `None` when `event` does not apply to `state`.
pub fn transition(state: &SummaryState, event: SummaryEvent) -> Option<SummaryState> {
    use SummaryEvent as E;
    use SummaryState as S;

    match (state, event) {
        (S::Collecting, E::ThresholdReached | E::PeriodicPass { .. }) => {
            Some(S::PendingSummary { failures: 0 })
        }
        (S::SummaryFailed { failures }, E::PeriodicPass { max_attempts }) if *failures < max_attempts => {
            Some(S::PendingSummary { failures: *failures })
        }
        (S::PendingSummary { failures }, E::Started) => Some(S::Summarizing { failures: *failures }),
        (S::Summarizing { .. }, E::Succeeded { summary_id }) => Some(S::Summarized { summary_id }),
        (S::Summarizing { failures }, E::Exhausted) => Some(S::SummaryFailed {
            failures: failures + 1,
        }),
        (S::Summarizing { failures }, E::Interrupted) => {
            Some(S::PendingSummary { failures: *failures })
        }
        (S::Summarizing { .. }, E::Rejected { max_attempts }) => Some(S::SummaryFailed {
            failures: max_attempts,
        }),
        _ => None,
    }
}
