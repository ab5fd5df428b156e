use crate::cache::{cache_key, SummaryCache};
use crate::config::SummarizerConfig;
use crate::error::{Result, SummarizerError};
use crate::prompt::{build_prompt, solution_prompt, SOLUTION_SYSTEM_PROMPT, SYSTEM_PROMPT};
use crate::rate_limit::TokenBucket;
use crate::response::{parse_solutions, parse_summary};
use crate::retry::RetryPolicy;
use crate::transport::{CompletionRequest, CompletionTransport, HttpTransport, TransportError};
use error_collector_protocol::{ErrorRecord, ErrorSummary, SharedClock};
use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const SOLUTION_MAX_TOKENS: u32 = 500;
const SOLUTION_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SummarizeOptions {
    /// Skip the cache lookup (the result still refreshes the cache).
    pub bypass_cache: bool,
    pub group_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOutcome {
    pub summary: ErrorSummary,
    /// Outbound attempts made; zero for a cache hit.
    pub attempts: u32,
    pub cached: bool,
}

/// Talks to the completions endpoint under a shared rate limit, with
/// retries, caching and response repair.
#[derive(Debug)]
pub struct SummarizationClient {
    config: SummarizerConfig,
    transport: Arc<dyn CompletionTransport>,
    limiter: TokenBucket,
    retry: RetryPolicy,
    cache: SummaryCache,
    clock: SharedClock,
}

impl SummarizationClient {
    pub fn new(
        config: SummarizerConfig,
        transport: Arc<dyn CompletionTransport>,
        clock: SharedClock,
    ) -> Self {
        let limiter = TokenBucket::new(config.requests_per_minute, config.burst);
        let retry = config.retry_policy();
        let cache = SummaryCache::new(config.cache_capacity, config.cache_ttl());
        Self {
            config,
            transport,
            limiter,
            retry,
            cache,
            clock,
        }
    }

    /// Builds the HTTP transport from `config`; fails without an API key.
    pub fn from_config(config: SummarizerConfig, clock: SharedClock) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Ok(Self::new(config, transport, clock))
    }

    pub fn config(&self) -> &SummarizerConfig {
        &self.config
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    /// Highest severity first, then most recent, capped at the per-summary limit.
    fn select<'a>(&self, records: &'a [ErrorRecord]) -> Vec<&'a ErrorRecord> {
        let mut chosen: Vec<&ErrorRecord> = records.iter().collect();
        chosen.sort_by_key(|r| (Reverse(r.severity), Reverse(r.timestamp), r.id.clone()));
        chosen.dedup_by(|a, b| a.id == b.id);
        let limit = self.config.max_errors_per_summary.max(1);
        if chosen.len() > limit {
            log::warn!(
                "summarizing {limit} of {} errors (per-summary limit)",
                chosen.len()
            );
            chosen.truncate(limit);
        }
        chosen
    }

    pub async fn summarize(
        &self,
        records: &[ErrorRecord],
        options: SummarizeOptions,
    ) -> Result<SummaryOutcome> {
        if records.is_empty() {
            return Err(SummarizerError::InvalidInput(
                "no errors to summarize".to_string(),
            ));
        }
        let selected = self.select(records);
        let mut error_ids: Vec<String> = selected.iter().map(|r| r.id.clone()).collect();
        error_ids.sort();
        let key = cache_key(selected.iter().map(|r| r.fingerprint.as_str()));

        if !options.bypass_cache {
            if let Some(mut summary) = self.cache.get(&key, &error_ids, new_summary_id) {
                if summary.group_id.is_none() {
                    summary.group_id = options.group_id;
                }
                log::debug!("summary cache hit for {} errors", error_ids.len());
                return Ok(SummaryOutcome {
                    summary,
                    attempts: 0,
                    cached: true,
                });
            }
        }

        let owned: Vec<ErrorRecord> = selected.into_iter().cloned().collect();
        let request = CompletionRequest {
            model: self.config.model.clone(),
            system: SYSTEM_PROMPT.to_string(),
            prompt: build_prompt(&owned, self.config.max_stack_frames),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let (content, attempts, elapsed) = self.complete_with_retry(&request).await?;
        let Some(parsed) = parse_summary(&content) else {
            // complete_with_retry only returns parseable content.
            return Err(SummarizerError::SummaryUnavailable {
                attempts,
                last_error: "malformed response".to_string(),
            });
        };

        let summary = ErrorSummary {
            summary_id: new_summary_id(),
            error_ids,
            group_id: options.group_id,
            root_cause: parsed.root_cause,
            impact_assessment: parsed.impact_assessment,
            suggested_solutions: parsed.suggested_solutions,
            confidence_score: parsed.confidence_score,
            generated_at: self.clock.now(),
            model_used: self.config.model.clone(),
            processing_time_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        };
        self.cache.insert(key, summary.clone());
        log::info!(
            "summary {} generated for {} errors in {} attempt(s)",
            summary.summary_id,
            summary.error_ids.len(),
            attempts
        );
        Ok(SummaryOutcome {
            summary,
            attempts,
            cached: false,
        })
    }

    /// Runs `request` until it yields parseable content or the policy is spent.
    ///
    /// Returns the content, the attempt count and the duration of the
    /// successful attempt.
    async fn complete_with_retry(
        &self,
        request: &CompletionRequest,
    ) -> Result<(String, u32, Duration)> {
        let mut last_error = String::new();
        let mut last_was_throttle = false;
        let mut retry_hint: Option<Duration> = None;

        for attempt in 1..=self.retry.max_attempts {
            self.limiter
                .acquire(self.config.acquire_deadline())
                .await
                .map_err(|_| SummarizerError::RateLimitExceeded {
                    attempts: attempt - 1,
                    retry_after: None,
                })?;

            let started = Instant::now();
            let outcome = tokio::time::timeout(self.config.timeout(), self.transport.complete(request))
                .await
                .unwrap_or_else(|_| Err(TransportError::Transient("attempt timed out".to_string())));

            match outcome {
                Ok(content) if parse_summary(&content).is_some() => {
                    return Ok((content, attempt, started.elapsed()));
                }
                Ok(_) => {
                    last_was_throttle = false;
                    retry_hint = None;
                    last_error = "malformed response".to_string();
                }
                Err(TransportError::RateLimited {
                    retry_after,
                    message,
                }) => {
                    last_was_throttle = true;
                    retry_hint = retry_after;
                    last_error = message;
                }
                Err(TransportError::Transient(message)) => {
                    last_was_throttle = false;
                    retry_hint = None;
                    last_error = message;
                }
                Err(TransportError::Permanent { status, message }) => {
                    log::warn!("summarization rejected (HTTP {status}): {message}");
                    return Err(SummarizerError::Rejected { status, message });
                }
            }

            if self.retry.has_attempts_left(attempt) {
                let backoff = self.retry.delay(attempt);
                let wait = retry_hint
                    .map(|hint| hint.min(self.retry.max_delay).max(backoff))
                    .unwrap_or(backoff);
                log::warn!(
                    "summarization attempt {attempt}/{} failed ({last_error}); retrying in {wait:?}",
                    self.retry.max_attempts
                );
                tokio::time::sleep(wait).await;
            }
        }

        let attempts = self.retry.max_attempts;
        log::warn!("summarization gave up after {attempts} attempt(s): {last_error}");
        if last_was_throttle {
            Err(SummarizerError::RateLimitExceeded {
                attempts,
                retry_after: retry_hint,
            })
        } else {
            Err(SummarizerError::SummaryUnavailable {
                attempts,
                last_error,
            })
        }
    }

    /// Additional bulleted fixes for `summary`. Any failure yields an empty list.
    pub async fn suggest_more_solutions(&self, summary: &ErrorSummary) -> Vec<String> {
        if let Err(err) = self.limiter.acquire(self.config.acquire_deadline()).await {
            log::warn!("solution enhancement skipped: {err}");
            return Vec::new();
        }
        let request = CompletionRequest {
            model: self.config.model.clone(),
            system: SOLUTION_SYSTEM_PROMPT.to_string(),
            prompt: solution_prompt(summary),
            max_tokens: self.config.max_tokens.min(SOLUTION_MAX_TOKENS),
            temperature: SOLUTION_TEMPERATURE,
        };
        let reply = tokio::time::timeout(self.config.timeout(), self.transport.complete(&request)).await;
        match reply {
            Ok(Ok(content)) => parse_solutions(&content)
                .into_iter()
                .filter(|s| !summary.suggested_solutions.contains(s))
                .collect(),
            Ok(Err(err)) => {
                log::warn!("solution enhancement failed: {err}");
                Vec::new()
            }
            Err(_) => {
                log::warn!("solution enhancement timed out");
                Vec::new()
            }
        }
    }
}

fn new_summary_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedTransport;
    use chrono::{TimeZone, Utc};
    use error_collector_protocol::{Category, ErrorSource, ManualClock, Severity};
    use pretty_assertions::assert_eq;

    const GOOD: &str = r#"{"root_cause":"x is read before assignment","impact_assessment":"render fails",
"suggested_solutions":["initialize x","guard the read","add a test"],"confidence_score":0.85}"#;

    fn record(id: &str, fingerprint: &str, severity: Severity) -> ErrorRecord {
        let ts = Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap();
        ErrorRecord {
            id: id.to_string(),
            timestamp: ts,
            source: ErrorSource::Browser,
            message: "TypeError: x is undefined".to_string(),
            stack_trace: None,
            context: Default::default(),
            severity,
            category: Category::Runtime,
            fingerprint: fingerprint.to_string(),
            occurrence_count: 1,
            last_seen: ts,
        }
    }

    fn throttled() -> std::result::Result<String, TransportError> {
        Err(TransportError::RateLimited {
            retry_after: None,
            message: "slow down".to_string(),
        })
    }

    fn client(config: SummarizerConfig, transport: Arc<ScriptedTransport>) -> SummarizationClient {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 4, 1, 12, 5, 0).unwrap()));
        SummarizationClient::new(config, transport, clock)
    }

    #[tokio::test(start_paused = true)]
    async fn two_transient_failures_then_success() {
        let transport = Arc::new(ScriptedTransport::new([
            Err(TransportError::Transient("connection reset".into())),
            Err(TransportError::Transient("HTTP 503".into())),
            Ok(GOOD.to_string()),
        ]));
        let client = client(SummarizerConfig::default(), transport.clone());
        let outcome = client
            .summarize(&[record("e1", "f1", Severity::High)], SummarizeOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 3);
        assert_eq!(transport.calls(), 3);
        assert_eq!(outcome.summary.error_ids, vec!["e1".to_string()]);
        assert_eq!(outcome.summary.confidence_score, 0.85);
        assert_eq!(
            outcome.summary.generated_at,
            Utc.with_ymd_and_hms(2024, 4, 1, 12, 5, 0).unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn three_throttles_exhaust_three_attempts() {
        let transport = Arc::new(ScriptedTransport::new([throttled(), throttled(), throttled()]));
        let client = client(SummarizerConfig::default(), transport.clone());
        let err = client
            .summarize(&[record("e1", "f1", Severity::High)], SummarizeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizerError::RateLimitExceeded { attempts: 3, .. }), "{err:?}");
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fourth_attempt_succeeds_when_allowed() {
        let transport = Arc::new(ScriptedTransport::new([
            throttled(),
            throttled(),
            throttled(),
            Ok(GOOD.to_string()),
        ]));
        let config = SummarizerConfig {
            max_attempts: 4,
            ..SummarizerConfig::default()
        };
        let outcome = client(config, transport.clone())
            .summarize(&[record("e1", "f1", Severity::High)], SummarizeOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 4);
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_exhaustion_is_unavailable() {
        let transport = Arc::new(ScriptedTransport::new([
            throttled(),
            Ok("   ".to_string()),
            Err(TransportError::Transient("HTTP 502".into())),
        ]));
        let err = client(SummarizerConfig::default(), transport)
            .summarize(&[record("e1", "f1", Severity::High)], SummarizeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizerError::SummaryUnavailable { attempts: 3, .. }), "{err:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_rejection_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new([Err(TransportError::Permanent {
            status: 401,
            message: "invalid key".into(),
        })]));
        let err = client(SummarizerConfig::default(), transport.clone())
            .summarize(&[record("e1", "f1", Severity::High)], SummarizeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizerError::Rejected { status: 401, .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_hits_and_rebinding() {
        let transport = Arc::new(ScriptedTransport::always(GOOD));
        let client = client(SummarizerConfig::default(), transport.clone());

        let first = client
            .summarize(&[record("e1", "f1", Severity::High)], SummarizeOptions::default())
            .await
            .unwrap();
        let again = client
            .summarize(&[record("e1", "f1", Severity::High)], SummarizeOptions::default())
            .await
            .unwrap();
        assert!(again.cached);
        assert_eq!(again.summary, first.summary);

        let rebound = client
            .summarize(&[record("e9", "f1", Severity::High)], SummarizeOptions::default())
            .await
            .unwrap();
        assert!(rebound.cached);
        assert_ne!(rebound.summary.summary_id, first.summary.summary_id);
        assert_eq!(rebound.summary.error_ids, vec!["e9".to_string()]);
        assert_eq!(transport.calls(), 1);

        let forced = client
            .summarize(
                &[record("e1", "f1", Severity::High)],
                SummarizeOptions {
                    bypass_cache: true,
                    group_id: None,
                },
            )
            .await
            .unwrap();
        assert!(!forced.cached);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn large_sets_keep_the_most_severe() {
        let transport = Arc::new(ScriptedTransport::always(GOOD));
        let config = SummarizerConfig {
            max_errors_per_summary: 2,
            ..SummarizerConfig::default()
        };
        let records = vec![
            record("low", "f1", Severity::Low),
            record("crit", "f2", Severity::Critical),
            record("high", "f3", Severity::High),
        ];
        let outcome = client(config, transport)
            .summarize(&records, SummarizeOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.summary.error_ids, vec!["crit".to_string(), "high".to_string()]);
    }

    #[tokio::test]
    async fn empty_input_is_invalid() {
        let transport = Arc::new(ScriptedTransport::always(GOOD));
        let err = client(SummarizerConfig::default(), transport)
            .summarize(&[], SummarizeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizerError::InvalidInput(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn extra_solutions_skip_known_ones() {
        let transport = Arc::new(ScriptedTransport::new([Ok(
            "- initialize x\n- Add a lint rule for use-before-assign\n- Enable strict mode in tsconfig".to_string(),
        )]));
        let client = client(SummarizerConfig::default(), transport);
        let summary = ErrorSummary {
            summary_id: "s".into(),
            error_ids: vec!["e1".into()],
            group_id: None,
            root_cause: "r".into(),
            impact_assessment: "i".into(),
            suggested_solutions: vec!["initialize x".into()],
            confidence_score: 0.8,
            generated_at: Utc::now(),
            model_used: "m".into(),
            processing_time_ms: 0,
        };
        assert_eq!(
            client.suggest_more_solutions(&summary).await,
            vec![
                "Add a lint rule for use-before-assign".to_string(),
                "Enable strict mode in tsconfig".to_string()
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn extra_solutions_degrade_to_empty() {
        let transport = Arc::new(ScriptedTransport::new([Err(TransportError::Transient("down".into()))]));
        let client = client(SummarizerConfig::default(), transport);
        let summary = ErrorSummary {
            summary_id: "s".into(),
            error_ids: vec![],
            group_id: None,
            root_cause: "r".into(),
            impact_assessment: "i".into(),
            suggested_solutions: vec![],
            confidence_score: 0.8,
            generated_at: Utc::now(),
            model_used: "m".into(),
            processing_time_ms: 0,
        };
        assert!(client.suggest_more_solutions(&summary).await.is_empty());
    }
}
