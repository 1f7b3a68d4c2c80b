use crate::subscriber::ServiceState;

/// Errors reported by a broker or its subscribers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PubSubError {
  #[error("subscription not found: {0}")]
  SubscriptionNotFound(String),

  #[error("topic not found: {0}")]
  TopicNotFound(String),

  /// Creating a subscription that another caller already created.
  #[error("subscription already exists: {0}")]
  AlreadyExists(String),

  #[error("invalid credentials: {message}")]
  Credentials { message: String },

  /// The subscriber cannot perform the operation in its current state.
  #[error("subscriber not running (state: {state:?})")]
  NotRunning { state: ServiceState },

  /// The subscriber service failed and will not deliver any more messages.
  #[error("subscriber failed: {message}")]
  Failed { message: String },
}

impl PubSubError {
  pub fn credentials(message: impl Into<String>) -> Self {
    Self::Credentials {
      message: message.into(),
    }
  }

  pub fn failed(message: impl Into<String>) -> Self {
    Self::Failed {
      message: message.into(),
    }
  }
}
