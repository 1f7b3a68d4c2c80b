use std::sync::Arc;

use fuschia_pubsub::{PubSubError, Subscription, SubscriptionAdmin, SubscriptionName, TopicName};
use tracing::{debug, info, instrument};

use crate::error::TriggerError;

/// Obtains the subscription a realtime trigger consumes from, creating it on
/// demand.
pub struct SubscriptionResolver {
  admin: Arc<dyn SubscriptionAdmin>,
  project_id: Option<String>,
}

impl SubscriptionResolver {
  /// Create a resolver. Names are qualified with `project_id` when set.
  pub fn new(admin: Arc<dyn SubscriptionAdmin>, project_id: Option<String>) -> Self {
    Self { admin, project_id }
  }

  /// Resolve `subscription`, bound to `topic`.
  ///
  /// An existing subscription is returned as is. A missing one is created
  /// when `auto_create` is set; losing a creation race to another caller
  /// counts as success. A missing subscription without `auto_create` is a
  /// [`TriggerError::Setup`].
  #[instrument(skip(self))]
  pub async fn resolve(
    &self,
    topic: &str,
    subscription: &str,
    auto_create: bool,
  ) -> Result<Subscription, TriggerError> {
    let name = SubscriptionName::new(self.project_id.as_deref(), subscription);

    if let Some(existing) = self.lookup(&name).await? {
      debug!(subscription = %name, "using existing subscription");
      return Ok(existing);
    }

    if !auto_create {
      return Err(TriggerError::setup(format!(
        "subscription '{}' does not exist and auto-create is disabled",
        name
      )));
    }

    let topic = TopicName::new(self.project_id.as_deref(), topic);
    match self.admin.create_subscription(&name, &topic).await {
      Ok(created) => {
        info!(subscription = %name, topic = %topic, "created subscription");
        Ok(created)
      }
      Err(PubSubError::AlreadyExists(_)) => {
        debug!(subscription = %name, "subscription created concurrently");
        self.lookup(&name).await?.ok_or_else(|| {
          TriggerError::setup(format!(
            "subscription '{}' reported as existing but could not be found",
            name
          ))
        })
      }
      Err(e) => Err(TriggerError::setup_with_source(
        format!("failed to create subscription '{}'", name),
        e,
      )),
    }
  }

  async fn lookup(&self, name: &SubscriptionName) -> Result<Option<Subscription>, TriggerError> {
    self.admin.get_subscription(name).await.map_err(|e| {
      TriggerError::setup_with_source(format!("failed to look up subscription '{}'", name), e)
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use fuschia_pubsub::MemoryBroker;
  use parking_lot::Mutex;
  use std::collections::HashMap;
  use tokio::sync::Barrier;

  /// Mock admin whose lookups all wait on a barrier, so concurrent resolves
  /// both observe a missing subscription before either creates it.
  struct RacingAdmin {
    subscriptions: Mutex<HashMap<String, Subscription>>,
    barrier: Barrier,
    creates: Mutex<u32>,
  }

  impl RacingAdmin {
    fn new(callers: usize) -> Self {
      Self {
        subscriptions: Mutex::new(HashMap::new()),
        barrier: Barrier::new(callers),
        creates: Mutex::new(0),
      }
    }
  }

  #[async_trait]
  impl SubscriptionAdmin for RacingAdmin {
    async fn get_subscription(
      &self,
      name: &SubscriptionName,
    ) -> Result<Option<Subscription>, PubSubError> {
      let found = self.subscriptions.lock().get(&name.to_string()).cloned();
      if found.is_none() {
        self.barrier.wait().await;
      }
      Ok(found)
    }

    async fn create_subscription(
      &self,
      name: &SubscriptionName,
      topic: &TopicName,
    ) -> Result<Subscription, PubSubError> {
      let mut subscriptions = self.subscriptions.lock();
      if subscriptions.contains_key(&name.to_string()) {
        return Err(PubSubError::AlreadyExists(name.to_string()));
      }
      let subscription = Subscription {
        name: name.clone(),
        topic: topic.clone(),
      };
      subscriptions.insert(name.to_string(), subscription.clone());
      *self.creates.lock() += 1;
      Ok(subscription)
    }
  }

  /// Mock admin that always fails.
  struct BrokenAdmin;

  #[async_trait]
  impl SubscriptionAdmin for BrokenAdmin {
    async fn get_subscription(
      &self,
      _name: &SubscriptionName,
    ) -> Result<Option<Subscription>, PubSubError> {
      Err(PubSubError::credentials("permission denied"))
    }

    async fn create_subscription(
      &self,
      _name: &SubscriptionName,
      _topic: &TopicName,
    ) -> Result<Subscription, PubSubError> {
      unreachable!("lookup fails first")
    }
  }

  fn broker_with_topic() -> MemoryBroker {
    let broker = MemoryBroker::new();
    broker.create_topic(&TopicName::new(Some("acme"), "orders"));
    broker
  }

  #[tokio::test]
  async fn test_existing_subscription() {
    let broker = broker_with_topic();
    broker
      .create_subscription(
        &SubscriptionName::new(Some("acme"), "orders-sub"),
        &TopicName::new(Some("acme"), "orders"),
      )
      .await
      .unwrap();
    let resolver = SubscriptionResolver::new(Arc::new(broker.clone()), Some("acme".to_string()));

    // auto-create disabled is fine when the subscription exists
    let subscription = resolver.resolve("orders", "orders-sub", false).await.unwrap();

    assert_eq!(
      subscription.name.to_string(),
      "projects/acme/subscriptions/orders-sub"
    );
    assert_eq!(broker.subscription_names().len(), 1);
  }

  #[tokio::test]
  async fn test_missing_without_auto_create() {
    let broker = broker_with_topic();
    let resolver = SubscriptionResolver::new(Arc::new(broker.clone()), Some("acme".to_string()));

    let err = resolver
      .resolve("orders", "orders-sub", false)
      .await
      .unwrap_err();

    assert!(matches!(err, TriggerError::Setup { source: None, .. }));
    assert!(broker.subscription_names().is_empty());
  }

  #[tokio::test]
  async fn test_missing_with_auto_create() {
    let broker = broker_with_topic();
    let resolver = SubscriptionResolver::new(Arc::new(broker.clone()), Some("acme".to_string()));

    let subscription = resolver.resolve("orders", "orders-sub", true).await.unwrap();

    assert_eq!(subscription.topic.to_string(), "projects/acme/topics/orders");
    assert_eq!(broker.subscription_names(), vec![subscription.name]);
  }

  #[tokio::test]
  async fn test_auto_create_on_missing_topic() {
    let broker = MemoryBroker::new();
    let resolver = SubscriptionResolver::new(Arc::new(broker), None);

    let err = resolver
      .resolve("orders", "orders-sub", true)
      .await
      .unwrap_err();

    assert!(matches!(
      err,
      TriggerError::Setup {
        source: Some(PubSubError::TopicNotFound(_)),
        ..
      }
    ));
  }

  #[tokio::test]
  async fn test_concurrent_auto_create_creates_once() {
    let admin = Arc::new(RacingAdmin::new(2));
    let first = SubscriptionResolver::new(admin.clone(), None);
    let second = SubscriptionResolver::new(admin.clone(), None);

    let (a, b) = tokio::join!(
      first.resolve("orders", "orders-sub", true),
      second.resolve("orders", "orders-sub", true),
    );

    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(*admin.creates.lock(), 1);
  }

  #[tokio::test]
  async fn test_lookup_failure_is_setup_error() {
    let resolver = SubscriptionResolver::new(Arc::new(BrokenAdmin), None);

    let err = resolver
      .resolve("orders", "orders-sub", true)
      .await
      .unwrap_err();

    assert!(matches!(
      err,
      TriggerError::Setup {
        source: Some(PubSubError::Credentials { .. }),
        ..
      }
    ));
  }
}
