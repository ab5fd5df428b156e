use anyhow::{bail, Context, Result};
use error_collector_grouping::GroupingConfig;
use error_collector_manager::ManagerConfig;
use error_collector_normalizer::NormalizerConfig;
use error_collector_store::StoreConfig;
use error_collector_summarizer::SummarizerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_ENV: &str = "ERROR_COLLECTOR_CONFIG";
pub const API_KEY_ENVS: &[&str] = &["ERROR_COLLECTOR_API_KEY", "OPENROUTER_API_KEY"];
pub const MODEL_ENV: &str = "ERROR_COLLECTOR_MODEL";
pub const DATA_DIR_ENV: &str = "ERROR_COLLECTOR_DATA_DIR";
pub const AUTO_SUMMARIZE_ENV: &str = "ERROR_COLLECTOR_AUTO_SUMMARIZE";
pub const SUMMARY_THRESHOLD_ENV: &str = "ERROR_COLLECTOR_SUMMARY_THRESHOLD";

const MIN_SUMMARY_THRESHOLD: usize = 1;
const MAX_SUMMARY_THRESHOLD: usize = 1_000;

/// Everything the server reads from `config.toml`.
///
/// ```toml
/// [summarizer]
/// model = "meta-llama/llama-3.1-8b-instruct:free"
///
/// [collection]
/// ignored_patterns = ["^Script error\\.?$"]
///
/// [storage]
/// data_dir = "/var/lib/error-collector"
///
/// [manager]
/// summary_threshold = 5
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub summarizer: SummarizerConfig,
    pub collection: NormalizerConfig,
    pub grouping: GroupingConfig,
    pub storage: StorageSection,
    pub manager: ManagerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    pub dedup_window_secs: u64,
    pub max_records: usize,
    pub retention_days: u64,
}

impl Default for StorageSection {
    fn default() -> Self {
        let store = StoreConfig::default();
        Self {
            data_dir: None,
            dedup_window_secs: store.dedup_window_secs,
            max_records: store.max_records,
            retention_days: store.retention_days,
        }
    }
}

impl StorageSection {
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            dedup_window_secs: self.dedup_window_secs,
            max_records: self.max_records,
            retention_days: self.retention_days,
        }
    }

    /// Configured directory, else `~/.error-collector/data`.
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(".error-collector").join("data")))
            .unwrap_or_else(|| PathBuf::from(".error-collector").join("data"))
    }
}

impl AppConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".error-collector").join("config.toml"))
    }

    /// `ERROR_COLLECTOR_CONFIG` if set, else the default location.
    pub fn config_path() -> Option<PathBuf> {
        non_empty(std::env::var(CONFIG_PATH_ENV).ok())
            .map(PathBuf::from)
            .or_else(Self::default_path)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("invalid configuration TOML")
    }

    /// Reads `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("no config at {}; using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("in {}", path.display()))
    }

    /// File, then environment overrides, then validation. Returns the
    /// configuration plus non-fatal warnings.
    pub fn load() -> Result<(Self, Vec<String>)> {
        let mut config = match Self::config_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        let mut warnings = config.apply_env_overrides_with(|key| std::env::var(key).ok());
        warnings.extend(config.validate()?);
        Ok((config, warnings))
    }

    /// Applies the `ERROR_COLLECTOR_*` overrides read through `var`.
    /// Unparseable values are skipped with a warning.
    pub fn apply_env_overrides_with(&mut self, var: impl Fn(&str) -> Option<String>) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Some(key) = API_KEY_ENVS.iter().find_map(|name| non_empty(var(name))) {
            self.summarizer.api_key = Some(key);
        }
        if let Some(model) = non_empty(var(MODEL_ENV)) {
            self.summarizer.model = model;
        }
        if let Some(dir) = non_empty(var(DATA_DIR_ENV)) {
            self.storage.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = non_empty(var(AUTO_SUMMARIZE_ENV)) {
            match parse_bool(&raw) {
                Some(value) => self.manager.auto_summarize = value,
                None => warnings.push(format!("{AUTO_SUMMARIZE_ENV}={raw:?} is not a boolean; ignored")),
            }
        }
        if let Some(raw) = non_empty(var(SUMMARY_THRESHOLD_ENV)) {
            match raw.parse::<usize>() {
                Ok(value) => {
                    let clamped = value.clamp(MIN_SUMMARY_THRESHOLD, MAX_SUMMARY_THRESHOLD);
                    if clamped != value {
                        warnings.push(format!(
                            "{SUMMARY_THRESHOLD_ENV}={value} clamped to {clamped}"
                        ));
                    }
                    self.manager.summary_threshold = clamped;
                }
                Err(_) => warnings.push(format!(
                    "{SUMMARY_THRESHOLD_ENV}={raw:?} is not a number; ignored"
                )),
            }
        }
        warnings
    }

    /// Rejects settings the pipeline cannot run with. A missing API key is
    /// only a warning: the server then serves summaries read-only.
    pub fn validate(&self) -> Result<Vec<String>> {
        let threshold = self.grouping.similarity_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            bail!("grouping.similarity_threshold must be in (0, 1], got {threshold}");
        }
        if self.grouping.max_group_size == 0 {
            bail!("grouping.max_group_size must be positive");
        }
        let s = &self.summarizer;
        if s.requests_per_minute == 0 || s.burst == 0 {
            bail!("summarizer.requests_per_minute and summarizer.burst must be positive");
        }
        if s.max_attempts == 0 {
            bail!("summarizer.max_attempts must be positive");
        }
        if !(0.0..=2.0).contains(&s.temperature) {
            bail!("summarizer.temperature must be in [0, 2], got {}", s.temperature);
        }
        if s.model.trim().is_empty() {
            bail!("summarizer.model must not be empty");
        }
        if self.manager.summary_threshold == 0 {
            bail!("manager.summary_threshold must be positive");
        }
        if self.manager.max_summary_attempts == 0 {
            bail!("manager.max_summary_attempts must be positive");
        }
        if self.storage.max_records == 0 {
            bail!("storage.max_records must be positive");
        }

        let mut warnings = Vec::new();
        if self.manager.auto_summarize && !s.has_api_key() {
            warnings.push(format!(
                "auto_summarize is on but no API key is set ({}); summaries will not be generated",
                API_KEY_ENVS.join(" or ")
            ));
        }
        Ok(warnings)
    }

    /// Copy safe to print or export: the API key keeps only its last four characters.
    pub fn redacted(&self) -> Self {
        let mut out = self.clone();
        out.summarizer.api_key = self.summarizer.api_key.as_deref().map(mask_secret);
        out
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(&self.redacted()).context("failed to render configuration")
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn sections_parse_with_defaults_for_the_rest() {
        let config = AppConfig::from_toml_str(
            r#"
            [summarizer]
            model = "openai/gpt-4o-mini"
            requests_per_minute = 30

            [collection]
            ignored_patterns = ["ResizeObserver loop"]

            [storage]
            data_dir = "/tmp/errors"
            retention_days = 30

            [manager]
            summary_threshold = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.summarizer.model, "openai/gpt-4o-mini");
        assert_eq!(config.summarizer.requests_per_minute, 30);
        assert_eq!(config.summarizer.max_attempts, 3);
        assert_eq!(config.collection.ignored_patterns, vec!["ResizeObserver loop"]);
        assert_eq!(config.storage.resolved_data_dir(), PathBuf::from("/tmp/errors"));
        assert_eq!(config.storage.store_config().retention_days, 30);
        assert_eq!(config.storage.store_config().max_records, 100_000);
        assert_eq!(config.manager.summary_threshold, 8);
        assert!(config.manager.auto_summarize);
    }

    #[test]
    fn env_overrides_win_and_bad_values_warn() {
        let mut config = AppConfig::default();
        let warnings = config.apply_env_overrides_with(env(&[
            ("OPENROUTER_API_KEY", "sk-or-fallback"),
            ("ERROR_COLLECTOR_API_KEY", " sk-primary-1234 "),
            ("ERROR_COLLECTOR_MODEL", "mistral/small"),
            ("ERROR_COLLECTOR_AUTO_SUMMARIZE", "maybe"),
            ("ERROR_COLLECTOR_SUMMARY_THRESHOLD", "0"),
        ]));
        assert_eq!(config.summarizer.api_key.as_deref(), Some("sk-primary-1234"));
        assert_eq!(config.summarizer.model, "mistral/small");
        assert!(config.manager.auto_summarize);
        assert_eq!(config.manager.summary_threshold, 1);
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn openrouter_key_is_the_fallback() {
        let mut config = AppConfig::default();
        config.apply_env_overrides_with(env(&[
            ("OPENROUTER_API_KEY", "sk-or-fallback"),
            ("ERROR_COLLECTOR_AUTO_SUMMARIZE", "off"),
        ]));
        assert_eq!(config.summarizer.api_key.as_deref(), Some("sk-or-fallback"));
        assert!(!config.manager.auto_summarize);
    }

    #[test]
    fn validation_rejects_bad_thresholds_and_warns_without_key() {
        let mut config = AppConfig::default();
        let warnings = config.validate().unwrap();
        assert_eq!(warnings.len(), 1);

        config.summarizer.api_key = Some("sk-test-abcdefgh".into());
        assert!(config.validate().unwrap().is_empty());

        config.grouping.similarity_threshold = 0.0;
        assert!(config.validate().is_err());
        config.grouping.similarity_threshold = 0.85;
        config.summarizer.requests_per_minute = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn exported_config_masks_the_key() {
        let mut config = AppConfig::default();
        config.summarizer.api_key = Some("sk-or-v1-0123456789abcdef".into());
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("****cdef"));
        assert!(!rendered.contains("0123456789"));
        assert_eq!(mask_secret("short"), "****");
    }

    #[test]
    fn missing_file_means_defaults() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = AppConfig::load_from(&temp.path().join("absent.toml")).unwrap();
        assert_eq!(config.manager, ManagerConfig::default());
    }
}
