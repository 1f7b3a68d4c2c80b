//! Fuschia Trigger Config
//!
//! This crate contains the serializable trigger definitions for Fuschia.
//! These types represent trigger configuration before a trigger is built and
//! activated by the trigger runtime.
//!
//! Two trigger styles are supported:
//! - [`RealtimeTriggerDef`] - subscribes to a Pub/Sub topic and fires once per message
//! - [`PollingTriggerDef`] - runs a query on an interval and fires on a non-empty result
//!
//! Definitions are loaded from JSON files (via the CLI) or from any other
//! serde source.

mod credentials;
mod enums;
mod polling;
mod realtime;

pub use credentials::{CLOUD_PLATFORM_SCOPE, CredentialsDef};
pub use enums::{DecodeFormat, FetchMode};
pub use polling::PollingTriggerDef;
pub use realtime::RealtimeTriggerDef;
