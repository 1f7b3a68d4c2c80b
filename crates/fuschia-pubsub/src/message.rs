use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// A message as delivered by the broker, before any decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
  pub message_id: String,
  pub data: Bytes,
  pub attributes: HashMap<String, String>,
  pub publish_time: DateTime<Utc>,
  pub ordering_key: Option<String>,
  /// 1 on first delivery, incremented on every redelivery.
  pub delivery_attempt: u32,
}

/// Settles a single delivery.
///
/// Both methods consume the consumer, so a delivery is settled at most once.
/// Dropping it without a reply counts as a nack.
pub trait AckReplyConsumer: Send {
  /// The message was processed and must not be redelivered.
  fn ack(self: Box<Self>);

  /// The message was not processed and should be redelivered.
  fn nack(self: Box<Self>);
}

pub type AckReply = Box<dyn AckReplyConsumer>;

/// Callback invoked by a subscriber for every delivery.
///
/// Called concurrently from broker-owned threads. Implementations must settle
/// `reply` before returning.
pub trait MessageReceiver: Send + Sync {
  fn receive_message(&self, message: InboundMessage, reply: AckReply);
}
