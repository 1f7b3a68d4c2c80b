//! Bridge from push delivery to a pull stream.
//!
//! A subscriber calls [`MessageReceiver::receive_message`] from its own worker
//! threads, concurrently. The bridge decodes each delivery, pushes it into a
//! bounded channel and only then acks it. All sends go through one mutex, so
//! the channel sees a single producer at a time; a full channel blocks the
//! delivering thread until the consumer catches up.
//!
//! The first failure (bad payload, consumer gone, broker failure) closes the
//! channel and is reported as the last item of the stream. A failed delivery
//! also stops the subscriber. Deliveries that arrive after that are nacked
//! without being decoded.

use std::pin::Pin;
use std::sync::{Arc, OnceLock, Weak};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll};

use fuschia_pubsub::{
  AckReply, Credentials, InboundMessage, MessageReceiver, PubSubError, ServiceListener,
  ServiceState, Subscriber, SubscriberFactory, Subscription,
};
use fuschia_trigger_config::DecodeFormat;
use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::decode::{DecodedMessage, decode};
use crate::error::TriggerError;

type Item = Result<DecodedMessage, TriggerError>;

/// Hooks into bridge progress. Called on broker threads.
pub trait BridgeObserver: Send + Sync {
  /// A message was emitted and acked. `total` counts emitted messages.
  fn on_emitted(&self, total: u64);

  /// The stream was aborted by a failed delivery. The subscriber has already
  /// been asked to stop.
  fn on_aborted(&self);
}

/// Starts a subscriber and exposes its deliveries as a [`MessageStream`].
pub struct MessageBridge {
  factory: Arc<dyn SubscriberFactory>,
  format: DecodeFormat,
  buffer_size: usize,
  observer: Option<Arc<dyn BridgeObserver>>,
  listeners: Vec<Arc<dyn ServiceListener>>,
}

impl MessageBridge {
  pub fn new(factory: Arc<dyn SubscriberFactory>, format: DecodeFormat) -> Self {
    Self {
      factory,
      format,
      buffer_size: 100,
      observer: None,
      listeners: Vec::new(),
    }
  }

  /// Capacity of the channel between broker threads and the consumer.
  pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
    self.buffer_size = buffer_size.max(1);
    self
  }

  pub fn with_observer(mut self, observer: Arc<dyn BridgeObserver>) -> Self {
    self.observer = Some(observer);
    self
  }

  /// Register an extra subscriber listener, called after the bridge has
  /// closed the stream.
  pub fn with_listener(mut self, listener: Arc<dyn ServiceListener>) -> Self {
    self.listeners.push(listener);
    self
  }

  /// Create a subscriber for `subscription` and start it.
  ///
  /// Returns the stream of decoded messages and the handle that stops the
  /// subscriber. The stream ends once the subscriber terminates and is not
  /// restartable.
  pub async fn start(
    self,
    subscription: &Subscription,
    credentials: Credentials,
  ) -> Result<(MessageStream, StopHandle), TriggerError> {
    let (sender, receiver) = mpsc::channel(self.buffer_size);
    let shared = Arc::new(BridgeShared {
      format: self.format,
      emitter: Mutex::new(Some(sender)),
      closed: AtomicBool::new(false),
      terminal: Mutex::new(None),
      emitted: AtomicU64::new(0),
      observer: self.observer,
      stopper: OnceLock::new(),
    });

    let subscriber = self
      .factory
      .create_subscriber(
        subscription,
        Arc::new(BridgeReceiver {
          shared: shared.clone(),
        }),
        credentials,
      )
      .map_err(|e| {
        TriggerError::setup_with_source(
          format!("failed to create subscriber for '{}'", subscription.name),
          e,
        )
      })?;

    let handle = StopHandle::new(subscriber.clone());
    let _ = shared.stopper.set(Stopper {
      subscriber: Arc::downgrade(&subscriber),
      requested: handle.requested.clone(),
    });

    subscriber.add_listener(Arc::new(BridgeListener {
      shared: shared.clone(),
    }));
    for listener in self.listeners {
      subscriber.add_listener(listener);
    }

    let starting = subscriber.clone();
    let started = tokio::task::spawn_blocking(move || starting.start())
      .await
      .map_err(|e| TriggerError::Provider {
        source: PubSubError::failed(format!("subscriber start panicked: {}", e)),
      })?;

    if let Err(e) = started {
      if subscriber.is_running() {
        subscriber.stop();
      }
      shared.close(None);
      return Err(TriggerError::Provider { source: e });
    }

    info!(subscription = %subscription.name, format = ?self.format, "message bridge started");

    let stream = MessageStream {
      inner: ReceiverStream::new(receiver),
      shared,
    };
    Ok((stream, handle))
  }
}

/// Stream of decoded messages produced by a [`MessageBridge`].
///
/// Yields messages until the subscriber terminates. A failure is yielded as
/// the final `Err` item.
pub struct MessageStream {
  inner: ReceiverStream<Item>,
  shared: Arc<BridgeShared>,
}

impl MessageStream {
  /// Number of messages emitted into this stream so far.
  pub fn emitted(&self) -> u64 {
    self.shared.emitted.load(Ordering::SeqCst)
  }
}

impl std::fmt::Debug for MessageStream {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("MessageStream").finish_non_exhaustive()
  }
}

impl Stream for MessageStream {
  type Item = Item;

  fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    match Pin::new(&mut self.inner).poll_next(cx) {
      Poll::Ready(None) => Poll::Ready(self.shared.terminal.lock().take().map(Err)),
      other => other,
    }
  }
}

/// Stops the subscriber behind a bridge. Only the first call reaches the
/// subscriber.
pub struct StopHandle {
  subscriber: Arc<dyn Subscriber>,
  /// Shared with the bridge, which stops the subscriber on abort.
  requested: Arc<AtomicBool>,
}

impl StopHandle {
  fn new(subscriber: Arc<dyn Subscriber>) -> Self {
    Self {
      subscriber,
      requested: Arc::new(AtomicBool::new(false)),
    }
  }

  /// Ask the subscriber to stop without waiting for it. Returns whether this
  /// call issued the request.
  pub fn stop(&self) -> bool {
    request_stop(&self.requested, self.subscriber.as_ref())
  }

  pub fn state(&self) -> ServiceState {
    self.subscriber.state()
  }
}

fn request_stop(requested: &AtomicBool, subscriber: &dyn Subscriber) -> bool {
  if requested
    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
    .is_err()
  {
    return false;
  }
  subscriber.stop();
  true
}

/// The bridge's side of a [`StopHandle`]. Weak, since the subscriber owns the
/// receiver that owns this.
struct Stopper {
  subscriber: Weak<dyn Subscriber>,
  requested: Arc<AtomicBool>,
}

struct BridgeShared {
  format: DecodeFormat,
  /// Single emission point. `None` once the stream is closed.
  emitter: Mutex<Option<mpsc::Sender<Item>>>,
  closed: AtomicBool,
  /// Failure reported after the channel drains.
  terminal: Mutex<Option<TriggerError>>,
  emitted: AtomicU64,
  observer: Option<Arc<dyn BridgeObserver>>,
  stopper: OnceLock<Stopper>,
}

enum Emission {
  Sent(u64),
  Closed,
}

impl BridgeShared {
  fn emit(&self, message: DecodedMessage) -> Result<Emission, TriggerError> {
    let emitter = self.emitter.lock();
    let Some(sender) = emitter.as_ref() else {
      return Ok(Emission::Closed);
    };

    let message_id = message.message_id.clone();
    sender
      .blocking_send(Ok(message))
      .map_err(|_| TriggerError::decode(message_id, "message stream was dropped"))?;

    Ok(Emission::Sent(self.emitted.fetch_add(1, Ordering::SeqCst) + 1))
  }

  /// Close the stream, recording `failure` as its last item. The first close
  /// wins; later ones are ignored. Returns whether this call closed it.
  fn close(&self, failure: Option<TriggerError>) -> bool {
    let mut emitter = self.emitter.lock();
    if emitter.is_none() {
      return false;
    }
    if let Some(failure) = failure {
      *self.terminal.lock() = Some(failure);
    }
    self.closed.store(true, Ordering::SeqCst);
    emitter.take();
    true
  }

  fn stop_subscriber(&self) {
    if let Some(stopper) = self.stopper.get()
      && let Some(subscriber) = stopper.subscriber.upgrade()
    {
      request_stop(&stopper.requested, subscriber.as_ref());
    }
  }

  fn is_closed(&self) -> bool {
    self.closed.load(Ordering::SeqCst)
  }
}

struct BridgeReceiver {
  shared: Arc<BridgeShared>,
}

impl MessageReceiver for BridgeReceiver {
  fn receive_message(&self, message: InboundMessage, reply: AckReply) {
    let message_id = message.message_id.clone();

    if self.shared.is_closed() {
      debug!(message_id = %message_id, "stream closed, rejecting delivery");
      reply.nack();
      return;
    }

    let outcome = decode(message, self.shared.format).and_then(|decoded| self.shared.emit(decoded));

    match outcome {
      Ok(Emission::Sent(total)) => {
        reply.ack();
        debug!(message_id = %message_id, "message acknowledged");
        if let Some(observer) = &self.shared.observer {
          observer.on_emitted(total);
        }
      }
      Ok(Emission::Closed) => {
        debug!(message_id = %message_id, "stream closed, rejecting delivery");
        reply.nack();
      }
      Err(error) => {
        warn!(message_id = %message_id, error = %error, "delivery failed, aborting stream");
        if self.shared.close(Some(error)) {
          // Stop before nacking so the broker does not hand the message out again.
          self.shared.stop_subscriber();
          if let Some(observer) = &self.shared.observer {
            observer.on_aborted();
          }
        }
        reply.nack();
      }
    }
  }
}

struct BridgeListener {
  shared: Arc<BridgeShared>,
}

impl ServiceListener for BridgeListener {
  fn failed(&self, from: ServiceState, failure: PubSubError) {
    warn!(from = ?from, error = %failure, "subscriber failed, closing stream");
    self
      .shared
      .close(Some(TriggerError::Provider { source: failure }));
  }

  fn terminated(&self, from: ServiceState) {
    debug!(from = ?from, "subscriber terminated, completing stream");
    self.shared.close(None);
  }
}
