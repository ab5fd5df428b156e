use crate::config::AppConfig;
use anyhow::{Context, Result};
use error_collector_manager::ErrorManager;
use error_collector_normalizer::Normalizer;
use error_collector_protocol::SharedClock;
use error_collector_store::{FileBackend, Storage};
use error_collector_summarizer::SummarizationClient;
use std::sync::Arc;

/// Opens the on-disk store under the configured data directory and wires the
/// pipeline around it. Summaries are disabled when no API key is configured.
pub async fn open_manager(config: &AppConfig, clock: SharedClock) -> Result<ErrorManager> {
    let data_dir = config.storage.resolved_data_dir();
    let backend = FileBackend::open(&data_dir)
        .await
        .with_context(|| format!("failed to open data directory {}", data_dir.display()))?;
    let storage = Storage::open(Arc::new(backend), config.storage.store_config(), clock.clone())
        .await
        .context("failed to load stored errors")?;
    let normalizer =
        Normalizer::new(config.collection.clone()).context("invalid [collection] settings")?;

    let summarizer = if config.summarizer.has_api_key() {
        match SummarizationClient::from_config(config.summarizer.clone(), clock.clone()) {
            Ok(client) => Some(client),
            Err(err) => {
                log::warn!("summarizer unavailable: {err}");
                None
            }
        }
    } else {
        None
    };

    log::info!(
        "data dir {}, model {}, summarizer {}",
        data_dir.display(),
        config.summarizer.model,
        if summarizer.is_some() { "enabled" } else { "disabled" }
    );

    Ok(ErrorManager::new(
        config.manager.clone(),
        normalizer,
        storage,
        config.grouping.clone(),
        summarizer,
        clock,
    ))
}
