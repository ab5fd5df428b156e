use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Look-back window accepted by the read API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
pub enum TimeRange {
    #[serde(rename = "1h")]
    LastHour,
    #[serde(rename = "6h")]
    Last6Hours,
    #[default]
    #[serde(rename = "24h")]
    Last24Hours,
    #[serde(rename = "7d")]
    Last7Days,
    #[serde(rename = "30d")]
    Last30Days,
    #[serde(rename = "all")]
    All,
}

impl TimeRange {
    pub fn duration(self) -> Option<Duration> {
        match self {
            Self::LastHour => Some(Duration::hours(1)),
            Self::Last6Hours => Some(Duration::hours(6)),
            Self::Last24Hours => Some(Duration::hours(24)),
            Self::Last7Days => Some(Duration::days(7)),
            Self::Last30Days => Some(Duration::days(30)),
            Self::All => None,
        }
    }

    /// Inclusive lower bound relative to `now`; `None` means unbounded.
    pub fn start(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.duration().map(|d| now - d)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LastHour => "1h",
            Self::Last6Hours => "6h",
            Self::Last24Hours => "24h",
            Self::Last7Days => "7d",
            Self::Last30Days => "30d",
            Self::All => "all",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_labels() {
        let range: TimeRange = serde_json::from_str("\"7d\"").unwrap();
        assert_eq!(range, TimeRange::Last7Days);
        assert_eq!(range.as_str(), "7d");
        assert_eq!(TimeRange::default(), TimeRange::Last24Hours);
        assert!(TimeRange::All.start(Utc::now()).is_none());
    }
}
