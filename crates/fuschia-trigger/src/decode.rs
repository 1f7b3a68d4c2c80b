use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use fuschia_pubsub::InboundMessage;
use fuschia_trigger_config::DecodeFormat;
use serde::Serialize;

use crate::error::TriggerError;

/// Message payload after decoding.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageData {
  Text(String),
  Json(serde_json::Value),
  Raw(Bytes),
}

/// A broker message with its payload decoded.
///
/// Serializes to the shape executions receive as trigger data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedMessage {
  pub data: MessageData,
  pub attributes: HashMap<String, String>,
  pub message_id: String,
  pub publish_time: DateTime<Utc>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub ordering_key: Option<String>,
}

/// Decode the payload of `message` according to `format`.
pub fn decode(message: InboundMessage, format: DecodeFormat) -> Result<DecodedMessage, TriggerError> {
  let data = match format {
    DecodeFormat::PlainText => {
      let text = std::str::from_utf8(&message.data)
        .map_err(|e| TriggerError::decode(&message.message_id, format!("invalid UTF-8: {}", e)))?;
      MessageData::Text(text.to_string())
    }
    DecodeFormat::Structured => {
      let value = serde_json::from_slice(&message.data)
        .map_err(|e| TriggerError::decode(&message.message_id, format!("invalid JSON: {}", e)))?;
      MessageData::Json(value)
    }
    DecodeFormat::Raw => MessageData::Raw(message.data),
  };

  Ok(DecodedMessage {
    data,
    attributes: message.attributes,
    message_id: message.message_id,
    publish_time: message.publish_time,
    ordering_key: message.ordering_key,
  })
}
