use crate::config::ManagerConfig;
use crate::error::{ManagerError, Result, SummaryFailure};
use crate::single_flight::SingleFlight;
use crate::state::{transition, SummaryEvent, SummaryState};
use crate::stats::{
    self, GroupPattern, Health, Patterns, ReportType, StatisticsReport, TrendBucket,
};
use chrono::{DateTime, Utc};
use error_collector_grouping::{GroupingConfig, GroupingEngine};
use error_collector_normalizer::{IgnoreReason, Normalizer};
use error_collector_protocol::{
    ErrorGroup, ErrorRecord, ErrorSummary, RawErrorEvent, SharedClock, TimeRange,
};
use error_collector_store::{
    ErrorFilter, ErrorPage, PurgeReport, Storage, StoreError, SummaryFilter,
};
use error_collector_summarizer::{SummarizationClient, SummarizeOptions, SummarizerError};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const TOP_PATTERNS: usize = 10;
/// Headroom over the summarizer's retry budget for parsing and persistence.
const TIMEOUT_SLACK: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterOutcome {
    pub id: Option<String>,
    pub is_duplicate: bool,
    pub group_id: Option<u64>,
    pub occurrence_count: u64,
    pub ignored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_reason: Option<String>,
}

impl RegisterOutcome {
    fn ignored(reason: &IgnoreReason) -> Self {
        let reason = match reason {
            IgnoreReason::SourceDisabled(source) => format!("source {source} is disabled"),
            IgnoreReason::PatternMatched(pattern) => format!("matched ignore pattern {pattern}"),
            IgnoreReason::DomainIgnored(domain) => format!("domain {domain} is ignored"),
        };
        Self {
            id: None,
            is_duplicate: false,
            group_id: None,
            occurrence_count: 0,
            ignored: true,
            ignore_reason: Some(reason),
        }
    }
}

/// A live group together with where it stands in summarization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupView {
    #[serde(flatten)]
    pub group: ErrorGroup,
    pub summary_state: SummaryState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// What one periodic pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub closed_groups: Vec<u64>,
    pub queued: Vec<u64>,
    pub summarized: Vec<u64>,
    pub failed: Vec<u64>,
    pub retried_requests: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FlightKey {
    Group(u64),
    Errors(Vec<String>),
}

type FlightResult = std::result::Result<Option<ErrorSummary>, SummaryFailure>;

#[derive(Debug, Clone)]
struct Tracker {
    state: SummaryState,
    last_error: Option<String>,
}

impl Tracker {
    fn new(state: SummaryState) -> Self {
        Self {
            state,
            last_error: None,
        }
    }
}

enum Enqueue {
    Queued,
    Full,
    NotRunning,
}

#[derive(Debug)]
struct Inner {
    config: ManagerConfig,
    normalizer: Normalizer,
    storage: Storage,
    grouping: tokio::sync::Mutex<GroupingEngine>,
    trackers: Mutex<BTreeMap<u64, Tracker>>,
    summarizer: Option<SummarizationClient>,
    flights: SingleFlight<FlightKey, FlightResult>,
    queue: Mutex<Option<mpsc::Sender<u64>>>,
    /// Ad-hoc requests that ran out of retries; the periodic pass tries again.
    deferred: Mutex<BTreeSet<Vec<String>>>,
    summary_timeout: Duration,
    clock: SharedClock,
}

impl Inner {
    fn trackers(&self) -> std::sync::MutexGuard<'_, BTreeMap<u64, Tracker>> {
        self.trackers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Applies `event` to a group's tracker. Returns the new state, or `None`
    /// when the event does not apply.
    fn apply(&self, group_id: u64, event: SummaryEvent) -> Option<SummaryState> {
        let mut trackers = self.trackers();
        let tracker = trackers
            .entry(group_id)
            .or_insert_with(|| Tracker::new(SummaryState::Collecting));
        let label = format!("{event:?}");
        let next = transition(&tracker.state, event)?;
        log::debug!(
            "group {group_id}: {} -> {} ({label})",
            tracker.state.label(),
            next.label()
        );
        tracker.state = next.clone();
        Some(next)
    }

    fn record_failure(&self, group_id: u64, message: String) {
        if let Some(tracker) = self.trackers().get_mut(&group_id) {
            tracker.last_error = Some(message);
        }
    }

    fn deferred(&self) -> std::sync::MutexGuard<'_, BTreeSet<Vec<String>>> {
        self.deferred.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enqueue(&self, group_id: u64) -> Enqueue {
        let queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = queue.as_ref() else {
            return Enqueue::NotRunning;
        };
        match tx.try_send(group_id) {
            Ok(()) => Enqueue::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::debug!("summary queue full; group {group_id} stays pending");
                Enqueue::Full
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Enqueue::NotRunning,
        }
    }
}

/// Puts a group back to pending if its summarization future is dropped
/// midway (cancelled caller, aborted worker).
struct InterruptOnDrop {
    inner: Arc<Inner>,
    group_id: u64,
    armed: bool,
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if self.armed {
            log::debug!("group {}: summarization dropped", self.group_id);
            self.inner.apply(self.group_id, SummaryEvent::Interrupted);
        }
    }
}

/// Orchestrates ingestion, grouping and summarization over one [`Storage`].
///
/// Cheap to clone; all clones share state.
#[derive(Debug, Clone)]
pub struct ErrorManager {
    inner: Arc<Inner>,
}

impl ErrorManager {
    /// Rebuilds grouping and summarization state from `storage`.
    ///
    /// Groups with a stored summary start as summarized; groups already past
    /// the threshold without one start pending.
    pub fn new(
        config: ManagerConfig,
        normalizer: Normalizer,
        storage: Storage,
        grouping: GroupingConfig,
        summarizer: Option<SummarizationClient>,
        clock: SharedClock,
    ) -> Self {
        let mut engine = GroupingEngine::restore(grouping, storage.groups.all());
        let summarized_max = storage
            .summaries
            .list(&SummaryFilter::default())
            .iter()
            .filter_map(|s| s.group_id)
            .max();
        if let Some(max) = summarized_max {
            engine.reserve_group_ids(max + 1);
        }

        let mut trackers = BTreeMap::new();
        for group in engine.groups() {
            let state = match storage.summaries.latest_for_group(group.group_id) {
                Some(summary) => SummaryState::Summarized {
                    summary_id: summary.summary_id,
                },
                None if config.auto_summarize && group.len() >= config.summary_threshold => {
                    SummaryState::PendingSummary { failures: 0 }
                }
                None => SummaryState::Collecting,
            };
            if state.awaits_summary() {
                storage.errors.pin(group.member_ids.iter().cloned());
            }
            trackers.insert(group.group_id, Tracker::new(state));
        }
        let summary_timeout = match summarizer.as_ref() {
            Some(client) => {
                let floor = client.config().retry_budget() + TIMEOUT_SLACK;
                if config.summary_timeout() < floor {
                    log::warn!(
                        "summary_timeout_secs {} is shorter than the summarizer retry budget; using {}s",
                        config.summary_timeout_secs,
                        floor.as_secs()
                    );
                }
                config.summary_timeout().max(floor)
            }
            None => config.summary_timeout(),
        };
        log::info!(
            "error manager ready: {} errors, {} groups, {} summaries, summarizer {}",
            storage.errors.len(),
            engine.len(),
            storage.summaries.len(),
            if summarizer.is_some() { "on" } else { "off" }
        );

        Self {
            inner: Arc::new(Inner {
                config,
                normalizer,
                storage,
                grouping: tokio::sync::Mutex::new(engine),
                trackers: Mutex::new(trackers),
                summarizer,
                flights: SingleFlight::new(),
                queue: Mutex::new(None),
                deferred: Mutex::new(BTreeSet::new()),
                summary_timeout,
                clock,
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn storage(&self) -> &Storage {
        &self.inner.storage
    }

    pub fn summarizer_configured(&self) -> bool {
        self.inner.summarizer.is_some()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Effective caller-side bound on one summarization.
    pub fn summary_timeout(&self) -> Duration {
        self.inner.summary_timeout
    }

    // ---------------------------------------------------------------------
    // Ingestion
    // ---------------------------------------------------------------------

    /// Normalizes, stores and groups one collector event.
    pub async fn register_error(&self, raw: RawErrorEvent) -> Result<RegisterOutcome> {
        let inner = &self.inner;
        if let Some(reason) = inner.normalizer.should_ignore(&raw) {
            log::debug!("ignoring error event: {reason:?}");
            return Ok(RegisterOutcome::ignored(&reason));
        }
        let now = inner.clock.now();
        let normalized = inner.normalizer.normalize(raw, now)?;
        let registration = inner.storage.errors.register(normalized).await?;
        if !registration.evicted.is_empty() {
            let mut engine = inner.grouping.lock().await;
            // The record is durable either way; a later purge reconciles
            // whatever this cascade could not write.
            if let Err(err) = inner.storage.reconcile().await {
                log::warn!("cascade after cap eviction failed: {err}");
            }
            self.reload_groups(&mut engine, &registration.evicted);
        }

        let group_id = if registration.is_duplicate {
            inner
                .grouping
                .lock()
                .await
                .group_of(&registration.id)
                .map(|g| g.group_id)
        } else {
            self.assign_to_group(&registration.id, now).await?
        };

        Ok(RegisterOutcome {
            id: Some(registration.id),
            is_duplicate: registration.is_duplicate,
            group_id,
            occurrence_count: registration.occurrence_count,
            ignored: false,
            ignore_reason: None,
        })
    }

    async fn assign_to_group(&self, error_id: &str, now: DateTime<Utc>) -> Result<Option<u64>> {
        let inner = &self.inner;
        let Some(record) = inner.storage.errors.get(error_id) else {
            return Ok(None);
        };

        let (group_id, members) = {
            let mut engine = inner.grouping.lock().await;
            let assignment = engine.assign(&record, now);
            if let Err(err) = inner.storage.groups.put_many(&assignment.changed).await {
                // Store stays authoritative: drop the in-memory change.
                let config = engine.config().clone();
                let next = engine.next_group_id();
                *engine = GroupingEngine::restore(config, inner.storage.groups.all());
                engine.reserve_group_ids(next);
                return Err(err.into());
            }
            let members: Vec<String> = engine
                .group(assignment.group_id)
                .map(|g| g.member_ids.iter().cloned().collect())
                .unwrap_or_default();
            (assignment.group_id, members)
        };

        let (triggered, awaiting) = {
            let mut trackers = inner.trackers();
            let tracker = trackers
                .entry(group_id)
                .or_insert_with(|| Tracker::new(SummaryState::Collecting));
            let mut triggered = false;
            if inner.config.auto_summarize && members.len() >= inner.config.summary_threshold {
                if let Some(next) = transition(&tracker.state, SummaryEvent::ThresholdReached) {
                    log::info!(
                        "group {group_id} reached {} errors; summary pending",
                        members.len()
                    );
                    tracker.state = next;
                    triggered = true;
                }
            }
            (triggered, tracker.state.awaits_summary())
        };

        if awaiting {
            inner.storage.errors.pin(members);
        }
        if triggered && inner.summarizer.is_some() {
            inner.enqueue(group_id);
        }
        Ok(Some(group_id))
    }

    /// Rebuilds the engine from the store after records were removed.
    /// Caller holds the engine lock.
    fn reload_groups(&self, engine: &mut GroupingEngine, removed: &[String]) {
        let inner = &self.inner;
        let config = engine.config().clone();
        let next = engine.next_group_id();
        *engine = GroupingEngine::restore(config, inner.storage.groups.all());
        engine.reserve_group_ids(next);
        inner.storage.errors.unpin(removed);

        inner
            .trackers()
            .retain(|group_id, _| engine.group(*group_id).is_some());
    }

    // ---------------------------------------------------------------------
    // Summarization
    // ---------------------------------------------------------------------

    /// Summarizes a pending group. Concurrent calls for the same group share
    /// one execution. `Ok(None)` means the group was not pending.
    pub async fn summarize_group(&self, group_id: u64) -> Result<Option<ErrorSummary>> {
        if self.inner.summarizer.is_none() {
            return Err(ManagerError::SummarizerDisabled);
        }
        let this = self.clone();
        let outcome = self
            .inner
            .flights
            .run(FlightKey::Group(group_id), move || async move {
                this.lead_group_summary(group_id).await
            })
            .await;
        match outcome {
            Some(Ok(summary)) => Ok(summary),
            Some(Err(failure)) => Err(failure.into()),
            None => Err(SummaryFailure::Cancelled.into()),
        }
    }

    async fn lead_group_summary(&self, group_id: u64) -> FlightResult {
        let inner = &self.inner;
        let Some(client) = inner.summarizer.as_ref() else {
            return Err(SummarizerError::NotConfigured("no API key".to_string()).into());
        };
        let Some(SummaryState::Summarizing { .. }) = inner.apply(group_id, SummaryEvent::Started)
        else {
            return Ok(None);
        };
        let mut guard = InterruptOnDrop {
            inner: Arc::clone(inner),
            group_id,
            armed: true,
        };

        let members: Vec<String> = inner
            .grouping
            .lock()
            .await
            .group(group_id)
            .map(|g| g.member_ids.iter().cloned().collect())
            .unwrap_or_default();
        let records = inner.storage.errors.get_many(&members);

        let timeout = inner.summary_timeout;
        let options = SummarizeOptions {
            bypass_cache: false,
            group_id: Some(group_id),
        };
        let attempt = tokio::time::timeout(timeout, client.summarize(&records, options)).await;
        let (event, result) = match attempt {
            // The bound covers every retry, so running out of it counts as a
            // spent round.
            Err(_) => (SummaryEvent::Exhausted, Err(SummaryFailure::TimedOut(timeout))),
            Ok(Ok(outcome)) => match self.persist(&outcome.summary).await {
                Ok(()) => (
                    SummaryEvent::Succeeded {
                        summary_id: outcome.summary.summary_id.clone(),
                    },
                    Ok(Some(outcome.summary)),
                ),
                Err(failure) => (SummaryEvent::Interrupted, Err(failure)),
            },
            Ok(Err(err)) => {
                let event = match &err {
                    SummarizerError::RateLimitExceeded { .. } => SummaryEvent::Interrupted,
                    SummarizerError::SummaryUnavailable { .. } => SummaryEvent::Exhausted,
                    SummarizerError::Rejected { .. }
                    | SummarizerError::InvalidInput(_)
                    | SummarizerError::NotConfigured(_)
                    | SummarizerError::Client(_) => SummaryEvent::Rejected {
                        max_attempts: inner.config.max_summary_attempts,
                    },
                };
                (event, Err(err.into()))
            }
        };

        guard.armed = false;
        let succeeded = matches!(event, SummaryEvent::Succeeded { .. });
        inner.apply(group_id, event);
        match &result {
            Ok(_) if succeeded => {
                inner.storage.errors.unpin(&members);
                log::info!("group {group_id} summarized ({} errors)", records.len());
            }
            Ok(_) => {}
            Err(failure) => {
                log::warn!("group {group_id} summarization failed: {failure}");
                inner.record_failure(group_id, failure.to_string());
            }
        }
        result
    }

    async fn persist(&self, summary: &ErrorSummary) -> std::result::Result<(), SummaryFailure> {
        match self.inner.storage.summaries.put(summary.clone()).await {
            Ok(()) | Err(StoreError::AlreadyExists { .. }) => Ok(()),
            Err(err) => Err(SummaryFailure::Persist(err.to_string())),
        }
    }

    /// Summarizes an explicit set of errors.
    ///
    /// Without `force`, a stored summary over exactly this set is returned
    /// as-is. Concurrent requests for the same set share one execution.
    pub async fn request_summary(&self, error_ids: &[String], force: bool) -> Result<ErrorSummary> {
        let ids: Vec<String> = error_ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if ids.is_empty() {
            return Err(ManagerError::InvalidRequest(
                "error_ids must name at least one error".to_string(),
            ));
        }
        let records = self.inner.storage.errors.get_many(&ids);
        if records.len() != ids.len() {
            let missing: Vec<&str> = ids
                .iter()
                .filter(|id| !records.iter().any(|r| &r.id == *id))
                .map(String::as_str)
                .collect();
            return Err(ManagerError::NotFound(format!("errors {}", missing.join(", "))));
        }
        if self.inner.summarizer.is_none() {
            return Err(ManagerError::SummarizerDisabled);
        }
        if !force {
            if let Some(existing) = self.existing_summary(&ids) {
                return Ok(existing);
            }
        }

        let this = self.clone();
        let key = ids.clone();
        let outcome = self
            .inner
            .flights
            .run(FlightKey::Errors(ids), move || async move {
                this.lead_adhoc_summary(key, records, force).await
            })
            .await;
        match outcome {
            Some(Ok(Some(summary))) => Ok(summary),
            Some(Ok(None)) | None => Err(SummaryFailure::Cancelled.into()),
            Some(Err(failure)) => Err(failure.into()),
        }
    }

    async fn lead_adhoc_summary(
        &self,
        ids: Vec<String>,
        records: Vec<ErrorRecord>,
        force: bool,
    ) -> FlightResult {
        let inner = &self.inner;
        let Some(client) = inner.summarizer.as_ref() else {
            return Err(SummarizerError::NotConfigured("no API key".to_string()).into());
        };
        let timeout = inner.summary_timeout;
        let options = SummarizeOptions {
            bypass_cache: force,
            group_id: None,
        };
        match tokio::time::timeout(timeout, client.summarize(&records, options)).await {
            Err(_) => {
                log::warn!("deferring summary of {} errors: timed out", ids.len());
                inner.deferred().insert(ids);
                Err(SummaryFailure::TimedOut(timeout))
            }
            Ok(Err(err)) => {
                if matches!(err, SummarizerError::SummaryUnavailable { .. }) {
                    log::warn!("deferring summary of {} errors: {err}", ids.len());
                    inner.deferred().insert(ids);
                }
                Err(err.into())
            }
            Ok(Ok(outcome)) => {
                self.persist(&outcome.summary).await?;
                inner.deferred().remove(&ids);
                Ok(Some(outcome.summary))
            }
        }
    }

    fn existing_summary(&self, ids: &[String]) -> Option<ErrorSummary> {
        let first = ids.first()?;
        self.inner
            .storage
            .summaries
            .for_error(first)
            .into_iter()
            .find(|s| {
                let mut covered = s.error_ids.clone();
                covered.sort();
                covered == ids
            })
    }

    /// Asks the model for solutions beyond the ones a summary already lists.
    /// Empty when disabled or on any failure.
    pub async fn enhance_solutions(&self, summary: &ErrorSummary) -> Vec<String> {
        match self.inner.summarizer.as_ref() {
            Some(client) => client.suggest_more_solutions(summary).await,
            None => Vec::new(),
        }
    }

    // ---------------------------------------------------------------------
    // Housekeeping
    // ---------------------------------------------------------------------

    /// Closes aged groups, re-queues groups that deserve another attempt and
    /// retries deferred ad-hoc requests.
    ///
    /// Without running workers pending groups are summarized inline.
    pub async fn periodic_pass(&self) -> Result<PassReport> {
        let inner = &self.inner;
        let now = inner.clock.now();
        let mut report = PassReport::default();

        let groups: Vec<ErrorGroup> = {
            let mut engine = inner.grouping.lock().await;
            let closed = engine.close_expired(now);
            if !closed.is_empty() {
                inner.storage.groups.put_many(&closed).await?;
                report.closed_groups = closed.iter().map(|g| g.group_id).collect();
            }
            engine.groups().cloned().collect()
        };

        if inner.summarizer.is_none() {
            return Ok(report);
        }
        if inner.config.auto_summarize {
            self.requeue_groups(&groups, &mut report).await;
        }

        let deferred: Vec<Vec<String>> = inner.deferred().iter().cloned().collect();
        for ids in deferred {
            report.retried_requests += 1;
            match self.request_summary(&ids, false).await {
                Ok(_) | Err(ManagerError::NotFound(_)) => {
                    inner.deferred().remove(&ids);
                }
                Err(err) => log::debug!("deferred summary retry failed: {err}"),
            }
        }

        if !report.queued.is_empty() || !report.summarized.is_empty() {
            log::info!(
                "periodic pass: {} queued, {} summarized, {} failed",
                report.queued.len(),
                report.summarized.len(),
                report.failed.len()
            );
        }
        Ok(report)
    }

    async fn requeue_groups(&self, groups: &[ErrorGroup], report: &mut PassReport) {
        let inner = &self.inner;
        let max_attempts = inner.config.max_summary_attempts;
        let mut pending = Vec::new();
        for group in groups {
            if group.is_empty() {
                continue;
            }
            let state = inner
                .trackers()
                .get(&group.group_id)
                .map(|t| t.state.clone());
            let next = match &state {
                Some(SummaryState::Collecting) | None
                    if inner.storage.summaries.latest_for_group(group.group_id).is_some() =>
                {
                    continue;
                }
                Some(SummaryState::PendingSummary { .. }) => state.clone(),
                _ => inner.apply(group.group_id, SummaryEvent::PeriodicPass { max_attempts }),
            };
            if next.is_some_and(|s| s.is_pending()) {
                inner.storage.errors.pin(group.member_ids.iter().cloned());
                pending.push(group.group_id);
            }
        }

        for group_id in pending {
            match inner.enqueue(group_id) {
                Enqueue::Queued => report.queued.push(group_id),
                Enqueue::Full => {}
                Enqueue::NotRunning => match self.summarize_group(group_id).await {
                    Ok(Some(_)) => report.summarized.push(group_id),
                    Ok(None) => {}
                    Err(err) => {
                        log::debug!("periodic summary of group {group_id} failed: {err}");
                        report.failed.push(group_id);
                    }
                },
            }
        }
    }

    /// Drops records older than the retention period and everything that
    /// only they kept alive.
    pub async fn purge_expired(&self) -> Result<PurgeReport> {
        let inner = &self.inner;
        let retention = inner.storage.errors.config().retention();
        let mut engine = inner.grouping.lock().await;
        let report = inner.storage.purge_older_than(retention).await?;
        if !report.is_empty() {
            self.reload_groups(&mut engine, &report.errors_removed);
        }
        Ok(report)
    }

    /// Regroups every stored error under a new similarity threshold.
    /// Old groups are kept as deprecated; new groups start collecting.
    pub async fn retune_grouping(&self, similarity_threshold: f64) -> Result<Vec<ErrorGroup>> {
        if !(0.0..=1.0).contains(&similarity_threshold) {
            return Err(ManagerError::InvalidRequest(format!(
                "similarity threshold must be within [0, 1], got {similarity_threshold}"
            )));
        }
        let inner = &self.inner;
        let now = inner.clock.now();
        let records = inner.storage.errors.matching(&ErrorFilter::default());
        let mut engine = inner.grouping.lock().await;
        let retune = engine.retune(similarity_threshold, &records, now);
        inner.storage.groups.put_many(&retune.deprecated).await?;
        inner.storage.groups.put_many(&retune.created).await?;

        let mut trackers = inner.trackers();
        trackers.clear();
        for group in &retune.created {
            trackers.insert(group.group_id, Tracker::new(SummaryState::Collecting));
        }
        Ok(retune.created)
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    pub fn get_errors(&self, filter: &ErrorFilter) -> ErrorPage {
        self.inner.storage.errors.query(filter)
    }

    pub fn get_error(&self, error_id: &str) -> Option<ErrorRecord> {
        self.inner.storage.errors.get(error_id)
    }

    pub fn get_summary(&self, summary_id: &str) -> Option<ErrorSummary> {
        self.inner.storage.summaries.get(summary_id)
    }

    pub fn summaries_for_error(&self, error_id: &str) -> Vec<ErrorSummary> {
        self.inner.storage.summaries.for_error(error_id)
    }

    pub fn list_summaries(&self, filter: &SummaryFilter) -> Vec<ErrorSummary> {
        self.inner.storage.summaries.list(filter)
    }

    /// Folds `records` into similarity clusters using the live threshold.
    pub async fn cluster(&self, records: &[ErrorRecord]) -> Vec<ErrorGroup> {
        let threshold = self.inner.grouping.lock().await.config().similarity_threshold;
        GroupingEngine::cluster(records, threshold)
    }

    pub async fn group_states(&self) -> Vec<GroupView> {
        let groups: Vec<ErrorGroup> = self.inner.grouping.lock().await.groups().cloned().collect();
        let trackers = self.inner.trackers();
        groups
            .into_iter()
            .map(|group| {
                let tracker = trackers
                    .get(&group.group_id)
                    .cloned()
                    .unwrap_or_else(|| Tracker::new(SummaryState::Collecting));
                GroupView {
                    group,
                    summary_state: tracker.state,
                    last_error: tracker.last_error,
                }
            })
            .collect()
    }

    pub async fn group_state(&self, group_id: u64) -> Option<GroupView> {
        self.group_states()
            .await
            .into_iter()
            .find(|view| view.group.group_id == group_id)
    }

    pub async fn get_statistics(
        &self,
        report_type: ReportType,
        time_range: TimeRange,
        bucket: TrendBucket,
    ) -> StatisticsReport {
        let inner = &self.inner;
        let now = inner.clock.now();
        let since = time_range.start(now);
        let records = inner.storage.errors.matching(&ErrorFilter {
            since,
            ..ErrorFilter::default()
        });
        let wants = |section: ReportType| report_type == section || report_type == ReportType::Detailed;

        let views = if wants(ReportType::Patterns) || wants(ReportType::Health) {
            self.group_states().await
        } else {
            Vec::new()
        };

        let overview = wants(ReportType::Overview).then(|| {
            let hours = stats::window_hours(time_range, &records, now);
            stats::overview(&records, hours, inner.storage.summaries.stats())
        });
        let trends = wants(ReportType::Trends).then(|| stats::trends(&records, bucket, since, now));
        let patterns = wants(ReportType::Patterns).then(|| {
            let mut ranked: Vec<&GroupView> = views.iter().collect();
            ranked.sort_by_key(|v| (std::cmp::Reverse(v.group.len()), v.group.group_id));
            let mut summarization_states = BTreeMap::new();
            for view in &views {
                *summarization_states
                    .entry(view.summary_state.label().to_string())
                    .or_insert(0) += 1;
            }
            Patterns {
                top_groups: ranked
                    .into_iter()
                    .take(TOP_PATTERNS)
                    .map(|v| GroupPattern {
                        group_id: v.group.group_id,
                        size: v.group.len(),
                        representative_message: v.group.representative_message.clone(),
                        severity: v.group.representative_severity,
                        category: v.group.category,
                        state: v.summary_state.label().to_string(),
                    })
                    .collect(),
                recurring_messages: stats::recurring_messages(&records, TOP_PATTERNS),
                summarization_states,
            }
        });
        let health = wants(ReportType::Health).then(|| self.health(&views));

        StatisticsReport {
            report_type,
            time_range,
            generated_at: now,
            overview,
            trends,
            patterns,
            health,
        }
    }

    fn health(&self, views: &[GroupView]) -> Health {
        let inner = &self.inner;
        let failed_groups: Vec<u64> = views
            .iter()
            .filter(|v| matches!(v.summary_state, SummaryState::SummaryFailed { .. }))
            .map(|v| v.group.group_id)
            .collect();
        let pending_groups = views
            .iter()
            .filter(|v| v.summary_state.awaits_summary())
            .count();
        let deferred_requests = inner.deferred().len();
        let queue_depth = inner
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|tx| tx.max_capacity() - tx.capacity());
        let summarizer_configured = inner.summarizer.is_some();
        let degraded = !failed_groups.is_empty()
            || deferred_requests > 0
            || (inner.config.auto_summarize && !summarizer_configured);
        Health {
            status: if degraded { "degraded" } else { "healthy" },
            stored_errors: inner.storage.errors.len(),
            stored_summaries: inner.storage.summaries.len(),
            active_groups: views.len(),
            pending_groups,
            failed_groups,
            deferred_requests,
            summarizer_configured,
            auto_summarize: inner.config.auto_summarize,
            workers_running: queue_depth.is_some(),
            queue_depth: queue_depth.unwrap_or(0),
            oldest_error: inner.storage.errors.oldest_timestamp(),
        }
    }

    // ---------------------------------------------------------------------
    // Background work
    // ---------------------------------------------------------------------

    /// Spawns the summary workers plus the periodic and cleanup loops.
    pub fn start(&self) -> ManagerHandle {
        let config = &self.inner.config;
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        *self.inner.queue.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut tasks = Vec::new();
        let workers = if self.inner.summarizer.is_some() {
            config.workers.max(1)
        } else {
            0
        };
        for worker in 0..workers {
            tasks.push(tokio::spawn(summary_worker(
                self.clone(),
                Arc::clone(&rx),
                shutdown_rx.clone(),
                worker,
            )));
        }

        let periodic = self.clone();
        tasks.push(tokio::spawn(every(
            config.periodic_interval(),
            shutdown_rx.clone(),
            move || {
                let manager = periodic.clone();
                async move {
                    if let Err(err) = manager.periodic_pass().await {
                        log::warn!("periodic pass failed: {err}");
                    }
                }
            },
        )));
        let cleanup = self.clone();
        tasks.push(tokio::spawn(every(
            config.cleanup_interval(),
            shutdown_rx,
            move || {
                let manager = cleanup.clone();
                async move {
                    if let Err(err) = manager.purge_expired().await {
                        log::warn!("retention cleanup failed: {err}");
                    }
                }
            },
        )));

        // Pick up groups restored as pending.
        let pending: Vec<u64> = self
            .inner
            .trackers()
            .iter()
            .filter(|(_, t)| t.state.is_pending())
            .map(|(id, _)| *id)
            .collect();
        if workers > 0 {
            for group_id in pending {
                self.inner.enqueue(group_id);
            }
        }
        log::info!("error manager started with {workers} summary workers");

        ManagerHandle {
            manager: self.clone(),
            shutdown: shutdown_tx,
            tasks,
        }
    }
}

async fn summary_worker(
    manager: ErrorManager,
    queue: Arc<tokio::sync::Mutex<mpsc::Receiver<u64>>>,
    mut shutdown: watch::Receiver<bool>,
    worker: usize,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        let next = {
            let mut queue = queue.lock().await;
            tokio::select! {
                _ = shutdown.changed() => None,
                group_id = queue.recv() => group_id,
            }
        };
        let Some(group_id) = next else {
            break;
        };
        match manager.summarize_group(group_id).await {
            Ok(Some(summary)) => log::debug!(
                "worker {worker}: group {group_id} -> summary {}",
                summary.summary_id
            ),
            Ok(None) => {}
            Err(err) => log::debug!("worker {worker}: group {group_id}: {err}"),
        }
    }
    log::debug!("summary worker {worker} stopped");
}

async fn every<F, Fut>(period: std::time::Duration, mut shutdown: watch::Receiver<bool>, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => tick().await,
        }
    }
}

/// Owns the background tasks started by [`ErrorManager::start`].
#[derive(Debug)]
pub struct ManagerHandle {
    manager: ErrorManager,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ManagerHandle {
    pub fn manager(&self) -> &ErrorManager {
        &self.manager
    }

    /// Stops accepting queued work and waits for every task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        self.manager
            .inner
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        for task in self.tasks {
            if let Err(err) = task.await {
                log::warn!("manager task ended abnormally: {err}");
            }
        }
        log::info!("error manager stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use error_collector_normalizer::NormalizerConfig;
    use error_collector_protocol::{Category, ErrorSource, ManualClock, Severity};
    use error_collector_store::{MemoryBackend, StoreConfig};
    use error_collector_summarizer::{ScriptedTransport, SummarizerConfig, TransportError};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const GOOD: &str = r#"{"root_cause":"x is read before assignment","impact_assessment":"page fails to render",
"suggested_solutions":["initialize x","guard the read"],"confidence_score":0.9}"#;

    struct Fixture {
        manager: ErrorManager,
        clock: Arc<ManualClock>,
        transport: Arc<ScriptedTransport>,
    }

    async fn fixture(config: ManagerConfig, transport: ScriptedTransport) -> Fixture {
        fixture_with(config, NormalizerConfig::default(), transport).await
    }

    async fn fixture_with(
        config: ManagerConfig,
        normalizer: NormalizerConfig,
        transport: ScriptedTransport,
    ) -> Fixture {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()));
        let transport = Arc::new(transport);
        let storage = Storage::open(
            Arc::new(MemoryBackend::new()),
            StoreConfig::default(),
            clock.clone(),
        )
        .await
        .unwrap();
        let summarizer = SummarizationClient::new(
            SummarizerConfig::default(),
            transport.clone(),
            clock.clone(),
        );
        let manager = ErrorManager::new(
            config,
            Normalizer::new(normalizer).unwrap(),
            storage,
            GroupingConfig::default(),
            Some(summarizer),
            clock.clone(),
        );
        Fixture {
            manager,
            clock,
            transport,
        }
    }

    fn type_error() -> RawErrorEvent {
        RawErrorEvent::new(ErrorSource::Browser, "TypeError: x is undefined")
            .with_category(Category::Runtime)
            .with_severity(Severity::High)
    }

    /// Registers `n` distinct records of the same error, spaced past the
    /// dedup window.
    async fn register_spaced(f: &Fixture, n: usize) -> Vec<RegisterOutcome> {
        let mut out = Vec::new();
        for _ in 0..n {
            out.push(f.manager.register_error(type_error()).await.unwrap());
            f.clock.advance(chrono::Duration::seconds(11));
        }
        out
    }

    async fn state_of(f: &Fixture, group_id: u64) -> SummaryState {
        f.manager.group_state(group_id).await.unwrap().summary_state
    }

    #[tokio::test(start_paused = true)]
    async fn duplicates_inside_the_window_collapse() {
        let f = fixture(ManagerConfig::default(), ScriptedTransport::always(GOOD)).await;
        let first = f.manager.register_error(type_error()).await.unwrap();
        f.clock.advance(chrono::Duration::seconds(3));
        let second = f.manager.register_error(type_error()).await.unwrap();
        assert!(second.is_duplicate);
        assert_eq!(second.id, first.id);
        assert_eq!(second.group_id, first.group_id);
        assert_eq!(second.occurrence_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn threshold_moves_group_to_pending() {
        let f = fixture(ManagerConfig::default(), ScriptedTransport::always(GOOD)).await;
        let outcomes = register_spaced(&f, 4).await;
        let group_id = outcomes[0].group_id.unwrap();
        assert!(outcomes.iter().all(|o| o.group_id == Some(group_id)));
        assert_eq!(state_of(&f, group_id).await, SummaryState::Collecting);

        register_spaced(&f, 1).await;
        assert_eq!(
            state_of(&f, group_id).await,
            SummaryState::PendingSummary { failures: 0 }
        );

        let summary = f.manager.summarize_group(group_id).await.unwrap().unwrap();
        assert_eq!(summary.error_ids.len(), 5);
        assert_eq!(summary.group_id, Some(group_id));
        assert_eq!(
            state_of(&f, group_id).await,
            SummaryState::Summarized {
                summary_id: summary.summary_id.clone()
            }
        );
        assert_eq!(f.manager.get_summary(&summary.summary_id), Some(summary));
        assert_eq!(f.transport.calls(), 1);

        // Already summarized: nothing to do.
        assert_eq!(f.manager.summarize_group(group_id).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn ignored_events_are_not_stored() {
        let normalizer = NormalizerConfig {
            ignored_patterns: vec!["^Script error\\.?$".to_string()],
            ..NormalizerConfig::default()
        };
        let f = fixture_with(
            ManagerConfig::default(),
            normalizer,
            ScriptedTransport::always(GOOD),
        )
        .await;
        let outcome = f
            .manager
            .register_error(RawErrorEvent::new(ErrorSource::Browser, "Script error."))
            .await
            .unwrap();
        assert!(outcome.ignored);
        assert!(outcome.ignore_reason.unwrap().contains("Script error"));
        assert_eq!(outcome.id, None);
        assert!(f.manager.storage().errors.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_summary_returns_group_to_pending() {
        let throttled = || TransportError::RateLimited {
            retry_after: None,
            message: "slow down".into(),
        };
        let f = fixture(
            ManagerConfig::default(),
            ScriptedTransport::new([Err(throttled()), Err(throttled()), Err(throttled())]),
        )
        .await;
        let group_id = register_spaced(&f, 5).await[0].group_id.unwrap();

        let err = f.manager.summarize_group(group_id).await.unwrap_err();
        assert_eq!(err.code(), "rate_limit_exceeded");
        assert_eq!(
            state_of(&f, group_id).await,
            SummaryState::PendingSummary { failures: 0 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_group_is_retried_by_the_periodic_pass() {
        let down = || TransportError::Transient("upstream 503".into());
        let f = fixture(
            ManagerConfig::default(),
            ScriptedTransport::new([Err(down()), Err(down()), Err(down())]).with_fallback(GOOD),
        )
        .await;
        let group_id = register_spaced(&f, 5).await[0].group_id.unwrap();

        let err = f.manager.summarize_group(group_id).await.unwrap_err();
        assert_eq!(err.code(), "summary_unavailable");
        let view = f.manager.group_state(group_id).await.unwrap();
        assert_eq!(view.summary_state, SummaryState::SummaryFailed { failures: 1 });
        assert!(view.last_error.is_some());

        let report = f.manager.periodic_pass().await.unwrap();
        assert_eq!(report.summarized, vec![group_id]);
        assert!(matches!(
            state_of(&f, group_id).await,
            SummaryState::Summarized { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_group_is_not_retried() {
        let f = fixture(
            ManagerConfig::default(),
            ScriptedTransport::new([Err(TransportError::Permanent {
                status: 401,
                message: "bad key".into(),
            })])
            .with_fallback(GOOD),
        )
        .await;
        let group_id = register_spaced(&f, 5).await[0].group_id.unwrap();

        assert_eq!(
            f.manager.summarize_group(group_id).await.unwrap_err().code(),
            "rejected"
        );
        assert_eq!(
            state_of(&f, group_id).await,
            SummaryState::SummaryFailed { failures: 3 }
        );
        let report = f.manager.periodic_pass().await.unwrap();
        assert!(report.summarized.is_empty());
        assert_eq!(f.transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn caller_timeout_never_undercuts_the_retry_budget() {
        let config = ManagerConfig {
            summary_timeout_secs: 5,
            ..ManagerConfig::default()
        };
        let f = fixture(
            config,
            ScriptedTransport::always(GOOD).with_delay(Duration::from_secs(20)),
        )
        .await;
        assert!(f.manager.summary_timeout() > SummarizerConfig::default().retry_budget());
        let group_id = register_spaced(&f, 5).await[0].group_id.unwrap();

        f.manager.summarize_group(group_id).await.unwrap();
        assert!(matches!(
            state_of(&f, group_id).await,
            SummaryState::Summarized { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_upstream_spends_attempts_and_stops_retrying() {
        let f = fixture(
            ManagerConfig::default(),
            ScriptedTransport::always(GOOD).with_delay(Duration::from_secs(3_600)),
        )
        .await;
        let group_id = register_spaced(&f, 5).await[0].group_id.unwrap();

        let err = f.manager.summarize_group(group_id).await.unwrap_err();
        assert_eq!(err.code(), "summary_unavailable");
        assert_eq!(
            state_of(&f, group_id).await,
            SummaryState::SummaryFailed { failures: 1 }
        );
        assert_eq!(f.transport.calls(), 3);

        for _ in 0..5 {
            f.manager.periodic_pass().await.unwrap();
        }
        assert_eq!(
            state_of(&f, group_id).await,
            SummaryState::SummaryFailed { failures: 3 }
        );
        assert_eq!(f.transport.calls(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_adhoc_request_is_deferred() {
        let f = fixture(
            ManagerConfig {
                auto_summarize: false,
                ..ManagerConfig::default()
            },
            ScriptedTransport::always(GOOD).with_delay(Duration::from_secs(3_600)),
        )
        .await;
        let ids: Vec<String> = register_spaced(&f, 1)
            .await
            .into_iter()
            .filter_map(|o| o.id)
            .collect();

        assert_eq!(
            f.manager.request_summary(&ids, false).await.unwrap_err().code(),
            "summary_unavailable"
        );
        let health = f
            .manager
            .get_statistics(ReportType::Health, TimeRange::All, TrendBucket::Hour)
            .await
            .health
            .unwrap();
        assert_eq!(health.deferred_requests, 1);
        assert_eq!(health.status, "degraded");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_group_summaries_share_one_call() {
        let f = fixture(
            ManagerConfig::default(),
            ScriptedTransport::always(GOOD).with_delay(Duration::from_millis(200)),
        )
        .await;
        let group_id = register_spaced(&f, 5).await[0].group_id.unwrap();

        let (a, b, c, d) = tokio::join!(
            f.manager.summarize_group(group_id),
            f.manager.summarize_group(group_id),
            f.manager.summarize_group(group_id),
            f.manager.summarize_group(group_id),
        );
        let a = a.unwrap().expect("leader produced a summary");
        for other in [b, c, d] {
            assert_eq!(other.unwrap(), Some(a.clone()));
        }
        assert_eq!(f.transport.calls(), 1);
        assert_eq!(
            state_of(&f, group_id).await,
            SummaryState::Summarized {
                summary_id: a.summary_id.clone()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_requests_share_one_summary() {
        let f = fixture(
            ManagerConfig::default(),
            ScriptedTransport::always(GOOD).with_delay(Duration::from_millis(200)),
        )
        .await;
        let ids: Vec<String> = register_spaced(&f, 2)
            .await
            .into_iter()
            .filter_map(|o| o.id)
            .collect();

        let (a, b, c) = tokio::join!(
            f.manager.request_summary(&ids, false),
            f.manager.request_summary(&ids, false),
            f.manager.request_summary(&ids, false),
        );
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(f.transport.calls(), 1);

        // Stored: a later call is served without the model.
        let again = f.manager.request_summary(&ids, false).await.unwrap();
        assert_eq!(again.summary_id, a.summary_id);
        assert_eq!(f.transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn request_for_unknown_errors_is_not_found() {
        let f = fixture(ManagerConfig::default(), ScriptedTransport::always(GOOD)).await;
        let err = f
            .manager
            .request_summary(&["missing".to_string()], false)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
        let err = f.manager.request_summary(&[], false).await.unwrap_err();
        assert_eq!(err.code(), "invalid_request");
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_request_is_deferred_and_retried() {
        let down = || TransportError::Transient("connection reset".into());
        let f = fixture(
            ManagerConfig {
                auto_summarize: false,
                ..ManagerConfig::default()
            },
            ScriptedTransport::new([Err(down()), Err(down()), Err(down())]).with_fallback(GOOD),
        )
        .await;
        let ids: Vec<String> = register_spaced(&f, 1)
            .await
            .into_iter()
            .filter_map(|o| o.id)
            .collect();

        assert_eq!(
            f.manager.request_summary(&ids, false).await.unwrap_err().code(),
            "summary_unavailable"
        );
        let report = f.manager.periodic_pass().await.unwrap();
        assert_eq!(report.retried_requests, 1);
        assert_eq!(f.manager.summaries_for_error(&ids[0]).len(), 1);

        let report = f.manager.periodic_pass().await.unwrap();
        assert_eq!(report.retried_requests, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_expired_errors_and_their_groups() {
        let f = fixture(ManagerConfig::default(), ScriptedTransport::always(GOOD)).await;
        let group_id = register_spaced(&f, 5).await[0].group_id.unwrap();
        f.manager.summarize_group(group_id).await.unwrap();

        f.clock.advance(chrono::Duration::days(91));
        let report = f.manager.purge_expired().await.unwrap();
        assert_eq!(report.errors_removed.len(), 5);
        assert_eq!(report.groups_removed, vec![group_id]);
        assert_eq!(report.summaries_removed.len(), 1);
        assert!(f.manager.group_states().await.is_empty());

        // Fresh errors never reuse the purged group's id.
        let outcome = f.manager.register_error(type_error()).await.unwrap();
        assert!(outcome.group_id.unwrap() > group_id);
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_cascade_failure_does_not_fail_registration() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()));
        let backend = Arc::new(MemoryBackend::new());
        let storage = Storage::open(
            backend.clone(),
            StoreConfig {
                max_records: 1,
                ..StoreConfig::default()
            },
            clock.clone(),
        )
        .await
        .unwrap();
        let summarizer = SummarizationClient::new(
            SummarizerConfig::default(),
            Arc::new(ScriptedTransport::always(GOOD)),
            clock.clone(),
        );
        let manager = ErrorManager::new(
            ManagerConfig {
                auto_summarize: false,
                ..ManagerConfig::default()
            },
            Normalizer::new(NormalizerConfig::default()).unwrap(),
            storage,
            GroupingConfig::default(),
            Some(summarizer),
            clock.clone(),
        );

        let first = manager.register_error(type_error()).await.unwrap();
        let first_id = first.id.clone().unwrap();
        manager.request_summary(&[first_id.clone()], false).await.unwrap();
        backend.set_collection_failing("summaries", true);

        let second = manager
            .register_error(
                RawErrorEvent::new(ErrorSource::Browser, "ReferenceError: cart is not defined")
                    .with_category(Category::Runtime),
            )
            .await
            .unwrap();
        assert!(second.group_id.is_some());
        assert!(manager.get_error(&first_id).is_none());

        backend.set_collection_failing("summaries", false);
        let report = manager.purge_expired().await.unwrap();
        assert!(report.errors_removed.is_empty());
        assert_eq!(report.summaries_removed.len(), 1);
        assert!(manager.summaries_for_error(&first_id).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn workers_summarize_groups_that_cross_the_threshold() {
        let f = fixture(ManagerConfig::default(), ScriptedTransport::always(GOOD)).await;
        let handle = f.manager.start();
        let group_id = register_spaced(&f, 5).await[0].group_id.unwrap();

        for _ in 0..100 {
            if matches!(state_of(&f, group_id).await, SummaryState::Summarized { .. }) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(matches!(
            state_of(&f, group_id).await,
            SummaryState::Summarized { .. }
        ));
        handle.shutdown().await;
        let health = f
            .manager
            .get_statistics(ReportType::Health, TimeRange::All, TrendBucket::Hour)
            .await
            .health
            .unwrap();
        assert!(!health.workers_running);
        assert_eq!(health.status, "healthy");
    }

    #[tokio::test(start_paused = true)]
    async fn detailed_statistics_cover_every_section() {
        let f = fixture(ManagerConfig::default(), ScriptedTransport::always(GOOD)).await;
        register_spaced(&f, 3).await;
        let report = f
            .manager
            .get_statistics(ReportType::Detailed, TimeRange::LastHour, TrendBucket::Hour)
            .await;
        let overview = report.overview.unwrap();
        assert_eq!(overview.total_errors, 3);
        assert_eq!(overview.by_source.get("browser"), Some(&3));
        let patterns = report.patterns.unwrap();
        assert_eq!(patterns.top_groups.len(), 1);
        assert_eq!(patterns.top_groups[0].size, 3);
        assert_eq!(patterns.summarization_states.get("collecting"), Some(&1));
        assert!(report.trends.is_some());
        assert_eq!(report.health.unwrap().active_groups, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retune_regroups_everything() {
        let f = fixture(ManagerConfig::default(), ScriptedTransport::always(GOOD)).await;
        register_spaced(&f, 2).await;
        f.manager
            .register_error(
                RawErrorEvent::new(ErrorSource::Browser, "TypeError: y is not a function")
                    .with_category(Category::Runtime),
            )
            .await
            .unwrap();

        let created = f.manager.retune_grouping(0.0).await.unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].len(), 3);
        assert!(f.manager.retune_grouping(1.5).await.is_err());
    }
}
