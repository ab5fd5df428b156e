use anyhow::{Context, Result};
use chrono::{Duration, TimeZone, Utc};
use error_collector_grouping::GroupingConfig;
use error_collector_manager::{ErrorManager, ManagerConfig, ReportType};
use error_collector_mcp::tools::{
    ErrorStatisticsRequest, ErrorSummaryRequest, QueryErrorsRequest, ReportErrorRequest,
    SummaryAction,
};
use error_collector_mcp::ErrorCollectorService;
use error_collector_normalizer::{Normalizer, NormalizerConfig};
use error_collector_protocol::{ErrorSource, ManualClock, TimeRange};
use error_collector_store::{MemoryBackend, Storage, StoreConfig};
use error_collector_summarizer::{ScriptedTransport, SummarizationClient, SummarizerConfig};
use pretty_assertions::assert_eq;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::CallToolResult;
use serde_json::{json, Value};
use std::sync::Arc;

const REPLY: &str = r#"{"root_cause":"x is used before it is assigned","impact_assessment":"checkout page is blank",
"suggested_solutions":["initialize x in the constructor","add a null guard"],"confidence_score":0.9}"#;

async fn service(with_summarizer: bool) -> Result<(ErrorCollectorService, Arc<ManualClock>)> {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 7, 1, 14, 0, 0).unwrap(),
    ));
    let storage = Storage::open(
        Arc::new(MemoryBackend::new()),
        StoreConfig::default(),
        clock.clone(),
    )
    .await?;
    let summarizer = with_summarizer.then(|| {
        SummarizationClient::new(
            SummarizerConfig::default(),
            Arc::new(ScriptedTransport::always(REPLY)),
            clock.clone(),
        )
    });
    let manager = ErrorManager::new(
        ManagerConfig::default(),
        Normalizer::new(NormalizerConfig::default())?,
        storage,
        GroupingConfig::default(),
        summarizer,
        clock.clone(),
    );
    Ok((ErrorCollectorService::new(manager), clock))
}

fn structured(result: &CallToolResult) -> Result<&Value> {
    result
        .structured_content
        .as_ref()
        .context("missing structured content")
}

fn text(result: &CallToolResult) -> Option<&str> {
    result
        .content
        .first()
        .and_then(|c| c.as_text())
        .map(|t| t.text.as_str())
}

fn report(message: &str) -> ReportErrorRequest {
    ReportErrorRequest {
        source: Some(ErrorSource::Browser),
        message: message.to_string(),
        context: json!({ "url": "https://shop.example.com/checkout", "auth": { "token": "abc" } })
            .as_object()
            .cloned(),
        ..ReportErrorRequest::default()
    }
}

fn summary_request(action: SummaryAction) -> ErrorSummaryRequest {
    ErrorSummaryRequest {
        action,
        summary_id: None,
        error_ids: None,
        time_range: None,
        min_confidence: None,
        limit: None,
        force: None,
        enhance_solutions: None,
    }
}

#[tokio::test(start_paused = true)]
async fn report_query_summarize_round_trip() -> Result<()> {
    let (service, clock) = service(true).await?;

    let mut ids = Vec::new();
    for _ in 0..3 {
        let result = service
            .report_error(Parameters(report("TypeError: x is undefined")))
            .await?;
        assert_ne!(result.is_error, Some(true), "{:?}", text(&result));
        let outcome = structured(&result)?;
        assert_eq!(outcome["is_duplicate"], false);
        ids.push(outcome["id"].as_str().context("id")?.to_string());
        clock.advance(Duration::seconds(15));
    }

    let page = service
        .query_errors(Parameters(QueryErrorsRequest {
            limit: Some(2),
            group_similar: Some(true),
            ..QueryErrorsRequest::default()
        }))
        .await?;
    let page = structured(&page)?;
    assert_eq!(page["total"], 3);
    assert_eq!(page["returned"], 2);
    assert_eq!(page["next_offset"], 2);
    assert!(page["errors"][0].get("context").is_none());
    assert!(page["errors"][0]["group_id"].is_u64());
    assert_eq!(page["clusters"].as_array().map(Vec::len), Some(1));

    let with_context = service
        .query_errors(Parameters(QueryErrorsRequest {
            include_context: Some(true),
            ..QueryErrorsRequest::default()
        }))
        .await?;
    let context = &structured(&with_context)?["errors"][0]["context"];
    assert_eq!(context["auth.token"], "[REDACTED]");

    let generated = service
        .get_error_summary(Parameters(ErrorSummaryRequest {
            error_ids: Some(ids.clone()),
            ..summary_request(SummaryAction::GenerateNew)
        }))
        .await?;
    assert_ne!(generated.is_error, Some(true), "{:?}", text(&generated));
    let summary = structured(&generated)?["summaries"][0].clone();
    assert_eq!(summary["confidence_score"], 0.9);
    let summary_id = summary["summary_id"].as_str().context("summary id")?.to_string();

    let for_error = service
        .get_error_summary(Parameters(ErrorSummaryRequest {
            error_ids: Some(vec![ids[1].clone()]),
            ..summary_request(SummaryAction::GetForError)
        }))
        .await?;
    assert_eq!(structured(&for_error)?["total"], 1);

    let existing = service
        .get_error_summary(Parameters(ErrorSummaryRequest {
            summary_id: Some(summary_id.clone()),
            ..summary_request(SummaryAction::GetExisting)
        }))
        .await?;
    assert_eq!(structured(&existing)?["summaries"][0]["summary_id"], summary_id.as_str());

    let too_confident = service
        .get_error_summary(Parameters(ErrorSummaryRequest {
            min_confidence: Some(0.95),
            ..summary_request(SummaryAction::ListRecent)
        }))
        .await?;
    assert_eq!(structured(&too_confident)?["total"], 0);

    let stats = service
        .get_error_statistics(Parameters(ErrorStatisticsRequest {
            report_type: Some(ReportType::Detailed),
            time_range: Some(TimeRange::LastHour),
            grouping: None,
        }))
        .await?;
    let stats = structured(&stats)?;
    assert_eq!(stats["overview"]["total_errors"], 3);
    assert_eq!(stats["overview"]["summaries"]["total"], 1);
    assert_eq!(stats["health"]["status"], "healthy");
    Ok(())
}

#[tokio::test]
async fn empty_reads_are_not_errors() -> Result<()> {
    let (service, _) = service(false).await?;

    let page = service
        .query_errors(Parameters(QueryErrorsRequest::default()))
        .await?;
    assert_ne!(page.is_error, Some(true));
    assert_eq!(structured(&page)?["total"], 0);

    let missing = service
        .get_error_summary(Parameters(ErrorSummaryRequest {
            summary_id: Some("nope".into()),
            ..summary_request(SummaryAction::GetExisting)
        }))
        .await?;
    assert_ne!(missing.is_error, Some(true));
    assert_eq!(structured(&missing)?["total"], 0);
    assert!(structured(&missing)?["note"].is_string());
    Ok(())
}

#[tokio::test]
async fn failures_carry_error_envelopes() -> Result<()> {
    let (service, _) = service(false).await?;

    let stored = service
        .report_error(Parameters(report("ReferenceError: cart is not defined")))
        .await?;
    let id = structured(&stored)?["id"].as_str().context("id")?.to_string();

    let disabled = service
        .get_error_summary(Parameters(ErrorSummaryRequest {
            error_ids: Some(vec![id]),
            ..summary_request(SummaryAction::GenerateNew)
        }))
        .await?;
    assert_eq!(disabled.is_error, Some(true));
    assert_eq!(structured(&disabled)?["error"]["code"], "summarizer_disabled");

    let bad_confidence = service
        .get_error_summary(Parameters(ErrorSummaryRequest {
            min_confidence: Some(1.5),
            ..summary_request(SummaryAction::ListRecent)
        }))
        .await?;
    assert_eq!(structured(&bad_confidence)?["error"]["code"], "invalid_request");

    let empty = service
        .report_error(Parameters(report("   ")))
        .await?;
    assert_eq!(structured(&empty)?["error"]["code"], "validation_error");

    let bad_time = service
        .report_error(Parameters(ReportErrorRequest {
            timestamp: Some("yesterday".into()),
            ..report("Error: boom")
        }))
        .await?;
    assert_eq!(structured(&bad_time)?["error"]["code"], "validation_error");
    Ok(())
}
