//! Fuschia Trigger
//!
//! Triggers watch an external source and emit a [`TriggerEvent`] whenever a
//! workflow execution should start.
//!
//! # Realtime triggers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     RealtimeTrigger                         │
//! │  - start() → MessageStream                                  │
//! │  - stop() / kill(), exactly one provider shutdown           │
//! │  - TerminationSignal fired once the subscriber is done      │
//! └─────────────────────────────────────────────────────────────┘
//!               │                               │
//!               ▼                               ▼
//! ┌───────────────────────────┐   ┌─────────────────────────────┐
//! │   SubscriptionResolver    │   │        MessageBridge        │
//! │  - get or create the      │   │  - broker threads → one     │
//! │    subscription           │   │    bounded stream           │
//! └───────────────────────────┘   │  - ack on emit, nack + abort│
//!                                 │    on failure               │
//!                                 └─────────────────────────────┘
//! ```
//!
//! # Polling triggers
//!
//! [`PollingTrigger::evaluate`] runs a query once per tick and returns a
//! [`PollResult`] only when the query returned rows. The caller owns the
//! schedule.
//!
//! # Usage
//!
//! ```ignore
//! let trigger = RealtimeTrigger::new(def, admin, factory, credentials);
//! let mut stream = trigger.start().await?;
//!
//! while let Some(message) = stream.next().await {
//!   let event = TriggerEvent::from_message(trigger.trigger_id(), &message?);
//!   sender.send(event.payload).await?;
//! }
//! ```

mod bridge;
mod decode;
mod error;
mod event;
mod polling;
mod realtime;
mod resolver;
mod signal;
mod state;

pub use bridge::{BridgeObserver, MessageBridge, MessageStream, StopHandle};
pub use decode::{DecodedMessage, MessageData, decode};
pub use error::TriggerError;
pub use event::TriggerEvent;
pub use polling::{PollResult, PollingTrigger, resolve_fetch_mode};
pub use realtime::RealtimeTrigger;
pub use resolver::SubscriptionResolver;
pub use signal::TerminationSignal;
pub use state::TriggerState;
