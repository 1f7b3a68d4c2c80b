//! In-process broker.
//!
//! Topics fan out to subscriptions, each subscription keeps a backlog, and a
//! subscriber pulls from that backlog on its own worker threads. Acks remove a
//! message for good, nacks put it back at the end of the backlog with its
//! delivery attempt incremented.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::credentials::Credentials;
use crate::error::PubSubError;
use crate::message::{AckReplyConsumer, InboundMessage, MessageReceiver};
use crate::subscriber::{ServiceListener, ServiceState, Subscriber, SubscriberFactory};
use crate::subscription::{Subscription, SubscriptionAdmin, SubscriptionName, TopicName};

/// Tuning for [`MemoryBroker`] subscribers.
#[derive(Debug, Clone)]
pub struct MemoryBrokerConfig {
  /// Worker threads started by each subscriber.
  pub parallel_pull_count: usize,
  /// How long an idle worker sleeps before checking for shutdown again.
  pub idle_wait: Duration,
}

impl Default for MemoryBrokerConfig {
  fn default() -> Self {
    Self {
      parallel_pull_count: 2,
      idle_wait: Duration::from_millis(50),
    }
  }
}

/// In-process broker implementing [`SubscriptionAdmin`] and
/// [`SubscriberFactory`].
///
/// Cloning is cheap; clones share the same topics and subscriptions.
#[derive(Clone, Default)]
pub struct MemoryBroker {
  inner: Arc<BrokerInner>,
}

#[derive(Default)]
struct BrokerInner {
  config: MemoryBrokerConfig,
  topics: Mutex<HashMap<String, TopicName>>,
  subscriptions: Mutex<HashMap<String, Arc<SubscriptionQueue>>>,
  next_message_id: AtomicU64,
}

impl MemoryBroker {
  pub fn new() -> Self {
    Self::with_config(MemoryBrokerConfig::default())
  }

  pub fn with_config(config: MemoryBrokerConfig) -> Self {
    Self {
      inner: Arc::new(BrokerInner {
        config,
        ..BrokerInner::default()
      }),
    }
  }

  /// Create a topic. Creating an existing topic is a no-op.
  pub fn create_topic(&self, topic: &TopicName) {
    self
      .inner
      .topics
      .lock()
      .entry(topic.to_string())
      .or_insert_with(|| topic.clone());
  }

  /// Publish a message to every subscription bound to `topic`.
  ///
  /// Returns the id assigned to the message.
  pub fn publish(
    &self,
    topic: &TopicName,
    data: impl Into<Bytes>,
    attributes: HashMap<String, String>,
  ) -> Result<String, PubSubError> {
    let key = topic.to_string();
    if !self.inner.topics.lock().contains_key(&key) {
      return Err(PubSubError::TopicNotFound(key));
    }

    let id = self.inner.next_message_id.fetch_add(1, Ordering::SeqCst) + 1;
    let message = InboundMessage {
      message_id: id.to_string(),
      data: data.into(),
      attributes,
      publish_time: Utc::now(),
      ordering_key: None,
      delivery_attempt: 1,
    };

    let queues: Vec<_> = self
      .inner
      .subscriptions
      .lock()
      .values()
      .filter(|q| q.subscription.topic == *topic)
      .cloned()
      .collect();

    for queue in queues {
      queue.push(message.clone());
    }

    Ok(message.message_id)
  }

  /// Names of all subscriptions, in no particular order.
  pub fn subscription_names(&self) -> Vec<SubscriptionName> {
    self
      .inner
      .subscriptions
      .lock()
      .values()
      .map(|q| q.subscription.name.clone())
      .collect()
  }

  /// Ids of messages acked on a subscription, in ack order.
  pub fn acked(&self, name: &SubscriptionName) -> Vec<String> {
    self
      .queue(name)
      .map(|q| q.acked.lock().clone())
      .unwrap_or_default()
  }

  /// Ids of messages nacked on a subscription, in nack order. A message
  /// nacked twice appears twice.
  pub fn nacked(&self, name: &SubscriptionName) -> Vec<String> {
    self
      .queue(name)
      .map(|q| q.nacked.lock().clone())
      .unwrap_or_default()
  }

  /// Messages waiting for delivery on a subscription.
  pub fn backlog_len(&self, name: &SubscriptionName) -> usize {
    self.queue(name).map(|q| q.backlog.lock().len()).unwrap_or(0)
  }

  /// Number of `stop` calls made on subscribers of a subscription.
  pub fn stop_requests(&self, name: &SubscriptionName) -> usize {
    self
      .queue(name)
      .map(|q| q.stop_requests.load(Ordering::SeqCst))
      .unwrap_or(0)
  }

  /// Fail every running subscriber of a subscription, as a broker outage
  /// would.
  pub fn fail_subscribers(&self, name: &SubscriptionName, message: &str) {
    let Some(queue) = self.queue(name) else {
      return;
    };

    let subscribers: Vec<_> = queue
      .subscribers
      .lock()
      .iter()
      .filter_map(Weak::upgrade)
      .collect();

    for subscriber in subscribers {
      subscriber.fail(PubSubError::failed(message));
    }
  }

  fn queue(&self, name: &SubscriptionName) -> Option<Arc<SubscriptionQueue>> {
    self.inner.subscriptions.lock().get(&name.to_string()).cloned()
  }
}

#[async_trait]
impl SubscriptionAdmin for MemoryBroker {
  async fn get_subscription(
    &self,
    name: &SubscriptionName,
  ) -> Result<Option<Subscription>, PubSubError> {
    Ok(self.queue(name).map(|q| q.subscription.clone()))
  }

  async fn create_subscription(
    &self,
    name: &SubscriptionName,
    topic: &TopicName,
  ) -> Result<Subscription, PubSubError> {
    if !self.inner.topics.lock().contains_key(&topic.to_string()) {
      return Err(PubSubError::TopicNotFound(topic.to_string()));
    }

    let mut subscriptions = self.inner.subscriptions.lock();
    let key = name.to_string();
    if subscriptions.contains_key(&key) {
      return Err(PubSubError::AlreadyExists(key));
    }

    let subscription = Subscription {
      name: name.clone(),
      topic: topic.clone(),
    };
    subscriptions.insert(key, Arc::new(SubscriptionQueue::new(subscription.clone())));
    info!(subscription = %name, topic = %topic, "subscription created");

    Ok(subscription)
  }
}

impl SubscriberFactory for MemoryBroker {
  fn create_subscriber(
    &self,
    subscription: &Subscription,
    receiver: Arc<dyn MessageReceiver>,
    credentials: Credentials,
  ) -> Result<Arc<dyn Subscriber>, PubSubError> {
    let queue = self
      .queue(&subscription.name)
      .ok_or_else(|| PubSubError::SubscriptionNotFound(subscription.name.to_string()))?;

    let shared = Arc::new(SubscriberShared {
      queue: queue.clone(),
      receiver,
      credentials,
      parallel_pull_count: self.inner.config.parallel_pull_count.max(1),
      idle_wait: self.inner.config.idle_wait,
      state: Mutex::new(ServiceState::New),
      stopping: AtomicBool::new(false),
      listeners: Mutex::new(Vec::new()),
      workers: Mutex::new(Vec::new()),
    });
    queue.subscribers.lock().push(Arc::downgrade(&shared));

    Ok(Arc::new(MemorySubscriber { shared }))
  }
}

struct SubscriptionQueue {
  subscription: Subscription,
  backlog: Mutex<VecDeque<InboundMessage>>,
  available: Condvar,
  acked: Mutex<Vec<String>>,
  nacked: Mutex<Vec<String>>,
  stop_requests: AtomicUsize,
  subscribers: Mutex<Vec<Weak<SubscriberShared>>>,
}

impl SubscriptionQueue {
  fn new(subscription: Subscription) -> Self {
    Self {
      subscription,
      backlog: Mutex::new(VecDeque::new()),
      available: Condvar::new(),
      acked: Mutex::new(Vec::new()),
      nacked: Mutex::new(Vec::new()),
      stop_requests: AtomicUsize::new(0),
      subscribers: Mutex::new(Vec::new()),
    }
  }

  fn push(&self, message: InboundMessage) {
    self.backlog.lock().push_back(message);
    self.available.notify_one();
  }

  fn requeue(&self, mut message: InboundMessage) {
    self.nacked.lock().push(message.message_id.clone());
    message.delivery_attempt += 1;
    self.push(message);
  }

  /// Block until a message is available or `stopping` is set.
  ///
  /// `stopping` is checked under the backlog lock, so a message requeued
  /// after a stop was requested is never handed out again.
  fn next_delivery(&self, stopping: &AtomicBool, idle_wait: Duration) -> Option<InboundMessage> {
    let mut backlog = self.backlog.lock();
    loop {
      if stopping.load(Ordering::SeqCst) {
        return None;
      }
      if let Some(message) = backlog.pop_front() {
        return Some(message);
      }
      self.available.wait_for(&mut backlog, idle_wait);
    }
  }

  fn wake_all(&self) {
    let _backlog = self.backlog.lock();
    self.available.notify_all();
  }
}

struct MemoryAckReply {
  queue: Arc<SubscriptionQueue>,
  message: Option<InboundMessage>,
}

impl AckReplyConsumer for MemoryAckReply {
  fn ack(mut self: Box<Self>) {
    if let Some(message) = self.message.take() {
      self.queue.acked.lock().push(message.message_id);
    }
  }

  fn nack(mut self: Box<Self>) {
    if let Some(message) = self.message.take() {
      self.queue.requeue(message);
    }
  }
}

impl Drop for MemoryAckReply {
  fn drop(&mut self) {
    if let Some(message) = self.message.take() {
      warn!(message_id = %message.message_id, "delivery dropped without a reply, redelivering");
      self.queue.requeue(message);
    }
  }
}

struct MemorySubscriber {
  shared: Arc<SubscriberShared>,
}

struct SubscriberShared {
  queue: Arc<SubscriptionQueue>,
  receiver: Arc<dyn MessageReceiver>,
  credentials: Credentials,
  parallel_pull_count: usize,
  idle_wait: Duration,
  state: Mutex<ServiceState>,
  stopping: AtomicBool,
  listeners: Mutex<Vec<Arc<dyn ServiceListener>>>,
  workers: Mutex<Vec<JoinHandle<()>>>,
}

impl SubscriberShared {
  fn pull_loop(&self) {
    while let Some(message) = self.queue.next_delivery(&self.stopping, self.idle_wait) {
      debug!(
        subscription = %self.queue.subscription.name,
        message_id = %message.message_id,
        delivery_attempt = message.delivery_attempt,
        "delivering message"
      );
      let reply = MemoryAckReply {
        queue: self.queue.clone(),
        message: Some(message.clone()),
      };
      self.receiver.receive_message(message, Box::new(reply));
    }
  }

  /// Stop the workers and report the final transition from a dedicated
  /// thread, so a worker may request its own shutdown.
  fn begin_shutdown(self: &Arc<Self>, from: ServiceState, failure: Option<PubSubError>) {
    self.stopping.store(true, Ordering::SeqCst);
    self.queue.wake_all();

    let workers = std::mem::take(&mut *self.workers.lock());
    let shared = self.clone();
    thread::spawn(move || {
      for worker in workers {
        if worker.join().is_err() {
          warn!(subscription = %shared.queue.subscription.name, "subscriber worker panicked");
        }
      }
      shared.finish(from, failure);
    });
  }

  fn finish(&self, from: ServiceState, failure: Option<PubSubError>) {
    *self.state.lock() = match failure {
      Some(_) => ServiceState::Failed,
      None => ServiceState::Terminated,
    };

    let listeners = self.listeners.lock().clone();
    for listener in listeners {
      match &failure {
        Some(error) => listener.failed(from, error.clone()),
        None => listener.terminated(from),
      }
    }
  }

  fn fail(self: &Arc<Self>, error: PubSubError) {
    let mut state = self.state.lock();
    if *state != ServiceState::Running {
      return;
    }
    *state = ServiceState::Stopping;
    drop(state);

    warn!(subscription = %self.queue.subscription.name, error = %error, "subscriber failed");
    self.begin_shutdown(ServiceState::Running, Some(error));
  }
}

impl Subscriber for MemorySubscriber {
  fn add_listener(&self, listener: Arc<dyn ServiceListener>) {
    self.shared.listeners.lock().push(listener);
  }

  fn start(&self) -> Result<(), PubSubError> {
    let mut state = self.shared.state.lock();
    if *state != ServiceState::New {
      return Err(PubSubError::NotRunning { state: *state });
    }
    *state = ServiceState::Starting;

    let mut workers = Vec::with_capacity(self.shared.parallel_pull_count);
    for i in 0..self.shared.parallel_pull_count {
      let shared = self.shared.clone();
      let spawned = thread::Builder::new()
        .name(format!("memory-subscriber-{}", i))
        .spawn(move || shared.pull_loop());

      match spawned {
        Ok(handle) => workers.push(handle),
        Err(e) => {
          *self.shared.workers.lock() = workers;
          *state = ServiceState::Stopping;
          drop(state);
          let error = PubSubError::failed(format!("failed to spawn worker: {}", e));
          self
            .shared
            .begin_shutdown(ServiceState::Starting, Some(error.clone()));
          return Err(error);
        }
      }
    }

    *self.shared.workers.lock() = workers;
    *state = ServiceState::Running;

    info!(
      subscription = %self.shared.queue.subscription.name,
      principal = %self.shared.credentials.principal,
      workers = self.shared.parallel_pull_count,
      "subscriber running"
    );
    Ok(())
  }

  fn stop(&self) {
    self.shared.queue.stop_requests.fetch_add(1, Ordering::SeqCst);

    let mut state = self.shared.state.lock();
    match *state {
      ServiceState::New => {
        *state = ServiceState::Terminated;
        drop(state);
        self.shared.finish(ServiceState::New, None);
      }
      ServiceState::Starting | ServiceState::Running => {
        *state = ServiceState::Stopping;
        drop(state);
        self.shared.begin_shutdown(ServiceState::Stopping, None);
      }
      ServiceState::Stopping | ServiceState::Terminated | ServiceState::Failed => {}
    }
  }

  fn state(&self) -> ServiceState {
    *self.shared.state.lock()
  }
}
