use fuschia_pubsub::PubSubError;
use fuschia_query::QueryError;

/// Errors that can occur while activating or running a trigger.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
  /// Subscription or credential resolution failed. Reported by `start`,
  /// before any message flows.
  #[error("trigger setup failed: {message}")]
  Setup {
    message: String,
    #[source]
    source: Option<PubSubError>,
  },

  /// A message could not be decoded or handed to the consumer.
  #[error("failed to process message '{message_id}': {message}")]
  Decode { message_id: String, message: String },

  /// The broker reported a terminal failure.
  #[error("subscriber failed")]
  Provider {
    #[source]
    source: PubSubError,
  },

  /// The query of a polling tick failed.
  #[error("poll query failed for trigger '{trigger_id}'")]
  Poll {
    trigger_id: String,
    #[source]
    source: QueryError,
  },

  /// The trigger was stopped before it was started.
  #[error("trigger '{trigger_id}' was stopped")]
  Stopped { trigger_id: String },

  #[error("trigger '{trigger_id}' was already started")]
  AlreadyStarted { trigger_id: String },
}

impl TriggerError {
  /// Create a setup error without an underlying cause.
  pub fn setup(message: impl Into<String>) -> Self {
    Self::Setup {
      message: message.into(),
      source: None,
    }
  }

  /// Create a setup error caused by a broker error.
  pub fn setup_with_source(message: impl Into<String>, source: PubSubError) -> Self {
    Self::Setup {
      message: message.into(),
      source: Some(source),
    }
  }

  pub fn decode(message_id: impl Into<String>, message: impl Into<String>) -> Self {
    Self::Decode {
      message_id: message_id.into(),
      message: message.into(),
    }
  }
}
