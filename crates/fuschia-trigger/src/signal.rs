use tokio_util::sync::CancellationToken;

/// One-shot signal marking that a trigger has fully stopped.
///
/// Firing is idempotent and any number of tasks may wait on it. Clones share
/// the same signal.
#[derive(Debug, Clone, Default)]
pub struct TerminationSignal {
  token: CancellationToken,
}

impl TerminationSignal {
  pub fn new() -> Self {
    Self::default()
  }

  /// Set the signal. Calls after the first have no effect.
  pub fn fire(&self) {
    self.token.cancel();
  }

  pub fn is_set(&self) -> bool {
    self.token.is_cancelled()
  }

  /// Wait until the signal is set. Returns immediately if it already is.
  pub async fn wait(&self) {
    self.token.cancelled().await;
  }
}
