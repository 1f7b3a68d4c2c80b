use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a realtime trigger.
///
/// States only move forward: `Created → Active → Stopping → Terminated`,
/// possibly skipping steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum TriggerState {
  Created = 0,
  Active = 1,
  Stopping = 2,
  Terminated = 3,
}

impl TriggerState {
  fn from_u8(value: u8) -> Self {
    match value {
      0 => TriggerState::Created,
      1 => TriggerState::Active,
      2 => TriggerState::Stopping,
      _ => TriggerState::Terminated,
    }
  }
}

/// Atomic, forward-only holder of a [`TriggerState`].
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
  pub(crate) fn new() -> Self {
    Self(AtomicU8::new(TriggerState::Created as u8))
  }

  pub(crate) fn get(&self) -> TriggerState {
    TriggerState::from_u8(self.0.load(Ordering::SeqCst))
  }

  /// Move from `from` to `to`. Fails if the current state is not `from`.
  pub(crate) fn advance(&self, from: TriggerState, to: TriggerState) -> bool {
    debug_assert!(to > from);
    self
      .0
      .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
      .is_ok()
  }

  /// Move to `to` unless the state is already at or past it. Returns the
  /// previous state.
  pub(crate) fn advance_to(&self, to: TriggerState) -> TriggerState {
    TriggerState::from_u8(self.0.fetch_max(to as u8, Ordering::SeqCst))
  }
}
