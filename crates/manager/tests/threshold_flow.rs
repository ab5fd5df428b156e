use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};
use error_collector_grouping::GroupingConfig;
use error_collector_manager::{ErrorManager, ManagerConfig, SummaryState};
use error_collector_normalizer::{Normalizer, NormalizerConfig};
use error_collector_protocol::{Category, ErrorSource, ManualClock, RawErrorEvent, Severity};
use error_collector_store::{FileBackend, Storage, StoreConfig};
use error_collector_summarizer::{ScriptedTransport, SummarizationClient, SummarizerConfig};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const REPLY: &str = r#"{"root_cause":"config file missing","impact_assessment":"CLI exits early",
"suggested_solutions":["create the file","ship a default"],"confidence_score":0.8}"#;

async fn open(
    dir: &Path,
    clock: Arc<ManualClock>,
    transport: Option<Arc<ScriptedTransport>>,
) -> Result<ErrorManager> {
    let backend = Arc::new(FileBackend::open(dir).await?);
    let storage = Storage::open(backend, StoreConfig::default(), clock.clone()).await?;
    let summarizer = transport
        .map(|t| SummarizationClient::new(SummarizerConfig::default(), t, clock.clone()));
    Ok(ErrorManager::new(
        ManagerConfig::default(),
        Normalizer::new(NormalizerConfig::default())?,
        storage,
        GroupingConfig::default(),
        summarizer,
        clock,
    ))
}

fn enoent() -> RawErrorEvent {
    RawErrorEvent::new(
        ErrorSource::Terminal,
        "ENOENT: no such file or directory, open '/home/app/config.json'",
    )
    .with_category(Category::Resource)
    .with_severity(Severity::High)
}

#[tokio::test(start_paused = true)]
async fn pending_group_survives_restart_and_gets_summarized() -> Result<()> {
    let temp = TempDir::new()?;
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap(),
    ));

    let group_id = {
        let manager = open(temp.path(), clock.clone(), None).await?;
        let mut group_id = None;
        for _ in 0..5 {
            let outcome = manager.register_error(enoent()).await?;
            group_id = outcome.group_id;
            clock.advance(Duration::seconds(12));
        }
        let group_id = group_id.expect("grouped");
        let view = manager.group_state(group_id).await.expect("group");
        assert_eq!(view.summary_state, SummaryState::PendingSummary { failures: 0 });
        assert_eq!(view.group.len(), 5);
        group_id
    };

    let transport = Arc::new(ScriptedTransport::always(REPLY));
    let manager = open(temp.path(), clock.clone(), Some(transport.clone())).await?;
    assert_eq!(
        manager.group_state(group_id).await.map(|v| v.summary_state),
        Some(SummaryState::PendingSummary { failures: 0 })
    );

    let report = manager.periodic_pass().await?;
    assert_eq!(report.summarized, vec![group_id]);
    assert_eq!(transport.calls(), 1);

    let summary_id = match manager.group_state(group_id).await.map(|v| v.summary_state) {
        Some(SummaryState::Summarized { summary_id }) => summary_id,
        other => panic!("unexpected state {other:?}"),
    };
    drop(manager);

    // The summary, and the state derived from it, come back from disk.
    let manager = open(temp.path(), clock.clone(), Some(transport.clone())).await?;
    let summary = manager.get_summary(&summary_id).expect("persisted summary");
    assert_eq!(summary.group_id, Some(group_id));
    assert_eq!(summary.error_ids.len(), 5);
    assert_eq!(
        manager.group_state(group_id).await.map(|v| v.summary_state),
        Some(SummaryState::Summarized { summary_id })
    );
    assert!(manager.periodic_pass().await?.summarized.is_empty());
    assert_eq!(transport.calls(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unrelated_errors_do_not_share_a_group() -> Result<()> {
    let temp = TempDir::new()?;
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap(),
    ));
    let manager = open(temp.path(), clock.clone(), None).await?;

    let a = manager.register_error(enoent()).await?;
    let b = manager
        .register_error(
            RawErrorEvent::new(ErrorSource::Browser, "NetworkError: Failed to fetch /api/users")
                .with_category(Category::Network),
        )
        .await?;
    assert_ne!(a.group_id, b.group_id);
    assert_eq!(manager.group_states().await.len(), 2);

    // Without a summarizer, ad-hoc requests are refused up front.
    let ids = vec![a.id.clone().expect("stored")];
    let err = manager.request_summary(&ids, false).await.unwrap_err();
    assert_eq!(err.code(), "summarizer_disabled");
    Ok(())
}
