use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::enums::FetchMode;

/// A trigger that runs a query on an interval and starts an execution when
/// the query returns at least one row.
///
/// `fetch`, `store` and `fetch_one` are the legacy switches that predate
/// `fetch_type`. They are still honoured when `fetch_type` is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingTriggerDef {
  pub trigger_id: String,

  /// Query to run on every tick.
  pub sql: String,

  /// Use the legacy SQL dialect.
  #[serde(default)]
  pub legacy_sql: bool,

  /// Time between polls. Must be greater than zero.
  #[serde(default = "default_interval_ms", deserialize_with = "non_zero_interval")]
  pub interval_ms: u64,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub fetch_type: Option<FetchMode>,

  #[serde(default)]
  pub fetch: bool,

  #[serde(default)]
  pub store: bool,

  #[serde(default)]
  pub fetch_one: bool,
}

impl PollingTriggerDef {
  /// Create a definition with default settings.
  pub fn new(trigger_id: impl Into<String>, sql: impl Into<String>) -> Self {
    Self {
      trigger_id: trigger_id.into(),
      sql: sql.into(),
      legacy_sql: false,
      interval_ms: default_interval_ms(),
      fetch_type: None,
      fetch: false,
      store: false,
      fetch_one: false,
    }
  }

  pub fn interval(&self) -> Duration {
    Duration::from_millis(self.interval_ms)
  }
}

fn default_interval_ms() -> u64 {
  60_000
}

fn non_zero_interval<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
  D: Deserializer<'de>,
{
  match u64::deserialize(deserializer)? {
    0 => Err(serde::de::Error::custom("interval_ms must be greater than zero")),
    ms => Ok(ms),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let def: PollingTriggerDef =
      serde_json::from_str(r#"{"trigger_id": "watch", "sql": "SELECT 1"}"#).unwrap();

    assert_eq!(def.interval(), Duration::from_secs(60));
    assert_eq!(def.fetch_type, None);
    assert!(!def.legacy_sql);
    assert!(!def.fetch && !def.store && !def.fetch_one);
  }

  #[test]
  fn test_legacy_flags_and_fetch_type() {
    let def: PollingTriggerDef = serde_json::from_str(
      r#"{"trigger_id": "watch", "sql": "SELECT 1", "fetch": true, "fetch_type": "store", "interval_ms": 300000}"#,
    )
    .unwrap();

    assert!(def.fetch);
    assert_eq!(def.fetch_type, Some(FetchMode::Store));
    assert_eq!(def.interval(), Duration::from_secs(300));
  }

  #[test]
  fn test_zero_interval_rejected() {
    let err = serde_json::from_str::<PollingTriggerDef>(
      r#"{"trigger_id": "watch", "sql": "SELECT 1", "interval_ms": 0}"#,
    )
    .unwrap_err();

    assert!(err.to_string().contains("interval_ms must be greater than zero"));
  }
}
