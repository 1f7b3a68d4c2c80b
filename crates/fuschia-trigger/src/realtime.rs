use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use fuschia_pubsub::{
  CredentialsProvider, PubSubError, ServiceListener, ServiceState, SubscriberFactory,
  SubscriptionAdmin,
};
use fuschia_trigger_config::RealtimeTriggerDef;
use tracing::{error, info, instrument, warn};

use crate::bridge::{BridgeObserver, MessageBridge, MessageStream, StopHandle};
use crate::error::TriggerError;
use crate::resolver::SubscriptionResolver;
use crate::signal::TerminationSignal;
use crate::state::{StateCell, TriggerState};

/// A trigger that emits one message per delivery from a broker subscription.
///
/// `start` may be called once. `stop`, `kill` and `request_stop` may be
/// called any number of times from any task; the subscriber is asked to stop
/// exactly once.
pub struct RealtimeTrigger {
  inner: Arc<Inner>,
}

struct Inner {
  def: RealtimeTriggerDef,
  admin: Arc<dyn SubscriptionAdmin>,
  factory: Arc<dyn SubscriberFactory>,
  credentials: Arc<dyn CredentialsProvider>,
  state: StateCell,
  /// Cleared by whichever stop request wins.
  active: AtomicBool,
  started: AtomicBool,
  stop_handle: OnceLock<StopHandle>,
  termination: TerminationSignal,
}

impl RealtimeTrigger {
  pub fn new(
    def: RealtimeTriggerDef,
    admin: Arc<dyn SubscriptionAdmin>,
    factory: Arc<dyn SubscriberFactory>,
    credentials: Arc<dyn CredentialsProvider>,
  ) -> Self {
    Self {
      inner: Arc::new(Inner {
        def,
        admin,
        factory,
        credentials,
        state: StateCell::new(),
        active: AtomicBool::new(true),
        started: AtomicBool::new(false),
        stop_handle: OnceLock::new(),
        termination: TerminationSignal::new(),
      }),
    }
  }

  /// Resolve the subscription, start the subscriber and return its stream.
  ///
  /// Setup failures are returned here, before any message flows. Once the
  /// subscriber is running, failures surface as the last item of the stream.
  #[instrument(
    name = "realtime_trigger_start",
    skip(self),
    fields(trigger_id = %self.inner.def.trigger_id, subscription = %self.inner.def.subscription)
  )]
  pub async fn start(&self) -> Result<MessageStream, TriggerError> {
    let trigger_id = self.inner.def.trigger_id.clone();

    if self.inner.started.swap(true, Ordering::SeqCst) {
      return Err(TriggerError::AlreadyStarted { trigger_id });
    }
    if !self.inner.active.load(Ordering::SeqCst) {
      self.inner.settle();
      return Err(TriggerError::Stopped { trigger_id });
    }

    match self.activate().await {
      Ok(stream) => Ok(stream),
      Err(e) => {
        error!(error = %e, "failed to start trigger");
        self.inner.settle();
        Err(e)
      }
    }
  }

  async fn activate(&self) -> Result<MessageStream, TriggerError> {
    let def = &self.inner.def;

    let resolver = SubscriptionResolver::new(self.inner.admin.clone(), def.credentials.project_id.clone());
    let subscription = resolver
      .resolve(&def.topic, &def.subscription, def.auto_create_subscription)
      .await?;

    let credentials = self
      .inner
      .credentials
      .credentials(&def.credentials)
      .await
      .map_err(|e| TriggerError::setup_with_source("failed to obtain credentials", e))?;

    let weak = Arc::downgrade(&self.inner);
    let (stream, handle) = MessageBridge::new(self.inner.factory.clone(), def.serde_type)
      .with_buffer_size(def.buffer_size)
      .with_observer(Arc::new(LifecycleObserver {
        inner: weak.clone(),
        max_records: def.max_records,
      }))
      .with_listener(Arc::new(LifecycleListener { inner: weak }))
      .start(&subscription, credentials)
      .await?;

    let handle = self.inner.stop_handle.get_or_init(|| handle);

    if self.inner.state.advance(TriggerState::Created, TriggerState::Active) {
      info!(subscription = %subscription.name, "trigger active");
      self.spawn_duration_limit();
    } else {
      // Stopped while starting.
      handle.stop();
    }

    Ok(stream)
  }

  fn spawn_duration_limit(&self) {
    let Some(limit) = self.inner.def.max_duration() else {
      return;
    };

    let inner = Arc::downgrade(&self.inner);
    let termination = self.inner.termination.clone();
    tokio::spawn(async move {
      tokio::select! {
        _ = termination.wait() => {}
        _ = tokio::time::sleep(limit) => {
          if let Some(inner) = inner.upgrade() {
            info!(trigger_id = %inner.def.trigger_id, ?limit, "max duration reached, stopping");
            inner.begin_stop();
          }
        }
      }
    });
  }

  /// Request a stop and return immediately.
  pub fn stop(&self) {
    self.inner.begin_stop();
  }

  /// Request a stop and wait until the subscriber has terminated.
  pub async fn kill(&self) {
    self.request_stop(true).await;
  }

  /// Request a stop. When `blocking`, wait for the termination signal, even
  /// if another caller issued the stop.
  #[instrument(
    name = "realtime_trigger_stop",
    skip(self),
    fields(trigger_id = %self.inner.def.trigger_id)
  )]
  pub async fn request_stop(&self, blocking: bool) {
    self.inner.begin_stop();
    if blocking {
      self.inner.termination.wait().await;
    }
  }

  pub fn state(&self) -> TriggerState {
    self.inner.state.get()
  }

  /// Signal fired once the trigger has fully stopped.
  pub fn termination(&self) -> TerminationSignal {
    self.inner.termination.clone()
  }

  pub fn trigger_id(&self) -> &str {
    &self.inner.def.trigger_id
  }

  pub fn definition(&self) -> &RealtimeTriggerDef {
    &self.inner.def
  }
}

impl Inner {
  /// Returns whether this call won the stop.
  fn begin_stop(&self) -> bool {
    if self
      .active
      .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
      .is_err()
    {
      return false;
    }

    // start() may move Created → Active concurrently; retry on the fresh state.
    loop {
      match self.state.get() {
        TriggerState::Active => {
          if self.state.advance(TriggerState::Active, TriggerState::Stopping) {
            info!(trigger_id = %self.def.trigger_id, "stopping trigger");
            // Installed before the state became Active.
            if let Some(handle) = self.stop_handle.get() {
              handle.stop();
            }
            break;
          }
        }
        TriggerState::Created if self.started.load(Ordering::SeqCst) => {
          // start() stops the subscriber as soon as it is installed.
          if self.state.advance(TriggerState::Created, TriggerState::Stopping) {
            break;
          }
        }
        TriggerState::Created => {
          info!(trigger_id = %self.def.trigger_id, "trigger stopped before start");
          self.settle();
          break;
        }
        TriggerState::Stopping | TriggerState::Terminated => break,
      }
    }
    true
  }

  fn settle(&self) {
    self.active.store(false, Ordering::SeqCst);
    let previous = self.state.advance_to(TriggerState::Terminated);
    if previous != TriggerState::Terminated {
      info!(trigger_id = %self.def.trigger_id, from = ?previous, "trigger terminated");
    }
    self.termination.fire();
  }
}

struct LifecycleObserver {
  inner: Weak<Inner>,
  max_records: Option<u64>,
}

impl BridgeObserver for LifecycleObserver {
  fn on_emitted(&self, total: u64) {
    if let Some(max) = self.max_records
      && total >= max
      && let Some(inner) = self.inner.upgrade()
      && inner.begin_stop()
    {
      info!(trigger_id = %inner.def.trigger_id, max_records = max, "max records reached, stopping");
    }
  }

  fn on_aborted(&self) {
    if let Some(inner) = self.inner.upgrade() {
      inner.begin_stop();
    }
  }
}

struct LifecycleListener {
  inner: Weak<Inner>,
}

impl ServiceListener for LifecycleListener {
  fn failed(&self, from: ServiceState, failure: PubSubError) {
    if let Some(inner) = self.inner.upgrade() {
      warn!(trigger_id = %inner.def.trigger_id, from = ?from, error = %failure, "subscriber failed");
      inner.settle();
    }
  }

  fn terminated(&self, _from: ServiceState) {
    if let Some(inner) = self.inner.upgrade() {
      inner.settle();
    }
  }
}
