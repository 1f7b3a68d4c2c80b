use std::fmt;

use async_trait::async_trait;

use crate::error::PubSubError;

/// Fully qualified subscription name.
///
/// Displays as `projects/{project}/subscriptions/{name}` when a project is
/// set, otherwise as the bare name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionName {
  pub project: Option<String>,
  pub name: String,
}

impl SubscriptionName {
  pub fn new(project: Option<&str>, name: impl Into<String>) -> Self {
    Self {
      project: project.map(str::to_string),
      name: name.into(),
    }
  }
}

impl fmt::Display for SubscriptionName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.project {
      Some(project) => write!(f, "projects/{}/subscriptions/{}", project, self.name),
      None => f.write_str(&self.name),
    }
  }
}

/// Fully qualified topic name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicName {
  pub project: Option<String>,
  pub name: String,
}

impl TopicName {
  pub fn new(project: Option<&str>, name: impl Into<String>) -> Self {
    Self {
      project: project.map(str::to_string),
      name: name.into(),
    }
  }
}

impl fmt::Display for TopicName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.project {
      Some(project) => write!(f, "projects/{}/topics/{}", project, self.name),
      None => f.write_str(&self.name),
    }
  }
}

/// A subscription bound to a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
  pub name: SubscriptionName,
  pub topic: TopicName,
}

/// Administrative access to subscriptions.
#[async_trait]
pub trait SubscriptionAdmin: Send + Sync {
  /// Look up a subscription. Returns `Ok(None)` when it does not exist.
  async fn get_subscription(
    &self,
    name: &SubscriptionName,
  ) -> Result<Option<Subscription>, PubSubError>;

  /// Create a subscription bound to `topic`.
  ///
  /// Fails with [`PubSubError::AlreadyExists`] if the subscription exists.
  async fn create_subscription(
    &self,
    name: &SubscriptionName,
    topic: &TopicName,
  ) -> Result<Subscription, PubSubError>;
}
