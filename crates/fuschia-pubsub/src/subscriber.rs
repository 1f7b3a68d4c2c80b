use std::sync::Arc;

use crate::credentials::Credentials;
use crate::error::PubSubError;
use crate::message::MessageReceiver;
use crate::subscription::Subscription;

/// Lifecycle state of a subscriber service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
  New,
  Starting,
  Running,
  Stopping,
  Terminated,
  Failed,
}

impl ServiceState {
  /// Whether the service has reached a final state.
  pub fn is_final(self) -> bool {
    matches!(self, ServiceState::Terminated | ServiceState::Failed)
  }
}

/// Observer of subscriber state transitions.
///
/// Listeners are called on the thread that performs the transition, once per
/// final transition. Exactly one of `failed` or `terminated` is called.
pub trait ServiceListener: Send + Sync {
  fn failed(&self, from: ServiceState, failure: PubSubError);

  fn terminated(&self, from: ServiceState);
}

/// A push subscriber service.
pub trait Subscriber: Send + Sync {
  /// Register a listener. Must be called before [`Subscriber::start`].
  fn add_listener(&self, listener: Arc<dyn ServiceListener>);

  /// Start delivering messages. Blocks until the service is running.
  fn start(&self) -> Result<(), PubSubError>;

  /// Ask the service to stop. Returns immediately; listeners observe the
  /// final transition once in-flight deliveries are done.
  fn stop(&self);

  fn state(&self) -> ServiceState;

  fn is_running(&self) -> bool {
    self.state() == ServiceState::Running
  }
}

/// Builds subscribers bound to a subscription and a receiver.
pub trait SubscriberFactory: Send + Sync {
  fn create_subscriber(
    &self,
    subscription: &Subscription,
    receiver: Arc<dyn MessageReceiver>,
    credentials: Credentials,
  ) -> Result<Arc<dyn Subscriber>, PubSubError>;
}
