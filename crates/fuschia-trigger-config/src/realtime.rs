use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::credentials::CredentialsDef;
use crate::enums::DecodeFormat;

/// A trigger that starts one execution per message consumed from a topic.
///
/// # Example
///
/// ```json
/// {
///   "trigger_id": "orders",
///   "topic": "orders",
///   "subscription": "fuschia-orders",
///   "serde_type": "json",
///   "credentials": { "project_id": "my-project" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeTriggerDef {
  pub trigger_id: String,

  /// Topic the subscription is bound to.
  pub topic: String,

  /// Subscription to consume from.
  pub subscription: String,

  /// Create the subscription if it does not exist yet.
  #[serde(default = "default_true")]
  pub auto_create_subscription: bool,

  #[serde(default)]
  pub credentials: CredentialsDef,

  #[serde(default)]
  pub serde_type: DecodeFormat,

  /// Stop the subscription after this many messages.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_records: Option<u64>,

  /// Stop the subscription after this long, in milliseconds.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_duration_ms: Option<u64>,

  /// Capacity of the channel between broker threads and the consumer.
  #[serde(default = "default_buffer_size")]
  pub buffer_size: usize,
}

impl RealtimeTriggerDef {
  /// Create a definition with default settings.
  pub fn new(
    trigger_id: impl Into<String>,
    topic: impl Into<String>,
    subscription: impl Into<String>,
  ) -> Self {
    Self {
      trigger_id: trigger_id.into(),
      topic: topic.into(),
      subscription: subscription.into(),
      auto_create_subscription: true,
      credentials: CredentialsDef::default(),
      serde_type: DecodeFormat::default(),
      max_records: None,
      max_duration_ms: None,
      buffer_size: default_buffer_size(),
    }
  }

  pub fn max_duration(&self) -> Option<Duration> {
    self.max_duration_ms.map(Duration::from_millis)
  }
}

fn default_true() -> bool {
  true
}

fn default_buffer_size() -> usize {
  100
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::CLOUD_PLATFORM_SCOPE;

  #[test]
  fn test_minimal_definition_defaults() {
    let def: RealtimeTriggerDef = serde_json::from_str(
      r#"{"trigger_id": "t1", "topic": "orders", "subscription": "orders-sub"}"#,
    )
    .unwrap();

    assert!(def.auto_create_subscription);
    assert_eq!(def.serde_type, DecodeFormat::PlainText);
    assert_eq!(def.buffer_size, 100);
    assert_eq!(def.max_records, None);
    assert_eq!(def.max_duration(), None);
    assert_eq!(def.credentials.scopes, vec![CLOUD_PLATFORM_SCOPE.to_string()]);
  }

  #[test]
  fn test_full_definition() {
    let def: RealtimeTriggerDef = serde_json::from_str(
      r#"{
        "trigger_id": "t1",
        "topic": "orders",
        "subscription": "orders-sub",
        "auto_create_subscription": false,
        "serde_type": "json",
        "max_records": 10,
        "max_duration_ms": 1500,
        "credentials": {"project_id": "acme", "scopes": []}
      }"#,
    )
    .unwrap();

    assert!(!def.auto_create_subscription);
    assert_eq!(def.serde_type, DecodeFormat::Structured);
    assert_eq!(def.max_records, Some(10));
    assert_eq!(def.max_duration(), Some(Duration::from_millis(1500)));
    assert_eq!(def.credentials.project_id.as_deref(), Some("acme"));
    assert!(def.credentials.scopes.is_empty());
  }

  #[test]
  fn test_new_matches_serde_defaults() {
    let built = RealtimeTriggerDef::new("t1", "orders", "orders-sub");
    let parsed: RealtimeTriggerDef = serde_json::from_str(
      r#"{"trigger_id": "t1", "topic": "orders", "subscription": "orders-sub"}"#,
    )
    .unwrap();
    assert_eq!(built, parsed);
  }
}
