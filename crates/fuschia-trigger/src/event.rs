use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::decode::DecodedMessage;
use crate::polling::PollResult;

/// Event emitted by a trigger to start workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
  /// Unique identifier for this trigger event
  pub event_id: String,

  /// The trigger that emitted this event
  pub trigger_id: String,

  /// Payload data from the trigger
  pub payload: serde_json::Value,

  /// Timestamp when the event was emitted (Unix millis)
  pub timestamp: u64,
}

impl TriggerEvent {
  pub fn new(trigger_id: impl Into<String>, payload: serde_json::Value) -> Self {
    Self {
      event_id: uuid::Uuid::new_v4().to_string(),
      trigger_id: trigger_id.into(),
      payload,
      timestamp: now_millis(),
    }
  }

  /// Event for one message consumed by a realtime trigger.
  pub fn from_message(trigger_id: impl Into<String>, message: &DecodedMessage) -> Self {
    let payload = serde_json::to_value(message).unwrap_or(serde_json::Value::Null);
    Self::new(trigger_id, payload)
  }

  /// Event for a poll that found rows.
  pub fn from_poll(trigger_id: impl Into<String>, result: &PollResult) -> Self {
    Self::new(trigger_id, result.to_payload())
  }
}

fn now_millis() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_millis() as u64)
    .unwrap_or_default()
}
