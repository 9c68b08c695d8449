//! Per-document agent entries and trigger parsing. The scanner that produces
//! these lives in `warden-core::document_scanner`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Pending,
    NeedsRun,
    Running,
    Completed,
    Error,
}

/// When a document-bound agent should fire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trigger {
    /// `daily@HH:MM`, fires once per day at the given UTC time.
    Daily { hour: u32, minute: u32 },
    /// `weekly@<day>`, fires once a week on the named day (Monday..Sunday).
    Weekly { day: chrono::Weekday },
    /// Fires once per hour, on the hour.
    Hourly,
    /// Never fires from the trigger loop; run via an explicit request only.
    Manual,
    /// Fires the next time the target document is saved.
    OnSave,
}

impl Trigger {
    /// Parse a trigger string from document front matter, e.g.
    /// `"daily@09:30"`, `"weekly@monday"`, `"hourly"`, `"manual"`, `"on_save"`.
    pub fn parse(raw: &str) -> Result<Self, TriggerParseError> {
        let raw = raw.trim();
        if let Some(rest) = raw.strip_prefix("daily@") {
            let (h, m) = rest
                .split_once(':')
                .ok_or_else(|| TriggerParseError::Malformed(raw.to_string()))?;
            let hour: u32 = h
                .parse()
                .map_err(|_| TriggerParseError::Malformed(raw.to_string()))?;
            let minute: u32 = m
                .parse()
                .map_err(|_| TriggerParseError::Malformed(raw.to_string()))?;
            if hour > 23 || minute > 59 {
                return Err(TriggerParseError::Malformed(raw.to_string()));
            }
            return Ok(Trigger::Daily { hour, minute });
        }
        if let Some(rest) = raw.strip_prefix("weekly@") {
            let day = parse_weekday(rest).ok_or_else(|| TriggerParseError::Malformed(raw.to_string()))?;
            return Ok(Trigger::Weekly { day });
        }
        match raw {
            "hourly" => Ok(Trigger::Hourly),
            "manual" => Ok(Trigger::Manual),
            "on_save" => Ok(Trigger::OnSave),
            _ => Err(TriggerParseError::Unknown(raw.to_string())),
        }
    }
}

fn parse_weekday(s: &str) -> Option<chrono::Weekday> {
    use chrono::Weekday::*;
    match s.to_ascii_lowercase().as_str() {
        "monday" => Some(Mon),
        "tuesday" => Some(Tue),
        "wednesday" => Some(Wed),
        "thursday" => Some(Thu),
        "friday" => Some(Fri),
        "saturday" => Some(Sat),
        "sunday" => Some(Sun),
        _ => None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TriggerParseError {
    #[error("malformed trigger: {0}")]
    Malformed(String),
    #[error("unknown trigger: {0}")]
    Unknown(String),
}

/// An agent bound to a specific document, as recorded in that document's
/// front matter (`agent: <path>`, `trigger: <trigger-string>`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAgentEntry {
    pub document_path: String,
    pub agent_path: String,
    pub trigger: String,
    #[serde(default)]
    pub status: Option<AgentStatus>,
    pub last_run: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub last_result: Option<String>,
    #[serde(default)]
    pub last_error: Option<String>,
}

fn default_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_daily() {
        assert_eq!(
            Trigger::parse("daily@09:30").unwrap(),
            Trigger::Daily { hour: 9, minute: 30 }
        );
    }

    #[test]
    fn parses_weekly() {
        assert_eq!(
            Trigger::parse("weekly@monday").unwrap(),
            Trigger::Weekly {
                day: chrono::Weekday::Mon
            }
        );
    }

    #[test]
    fn parses_simple_variants() {
        assert_eq!(Trigger::parse("hourly").unwrap(), Trigger::Hourly);
        assert_eq!(Trigger::parse("manual").unwrap(), Trigger::Manual);
        assert_eq!(Trigger::parse("on_save").unwrap(), Trigger::OnSave);
    }

    #[test]
    fn rejects_bad_hour() {
        assert!(Trigger::parse("daily@25:00").is_err());
    }

    #[test]
    fn rejects_unknown_day() {
        assert!(Trigger::parse("weekly@someday").is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(Trigger::parse("whenever").is_err());
    }
}
