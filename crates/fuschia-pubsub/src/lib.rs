//! Fuschia Pub/Sub
//!
//! Broker-side collaborators for realtime triggers. The trigger runtime only
//! talks to a broker through these traits:
//!
//! - [`SubscriptionAdmin`] - look up and create subscriptions
//! - [`SubscriberFactory`] / [`Subscriber`] - a push subscriber service that
//!   delivers messages to a [`MessageReceiver`] on its own worker threads
//! - [`CredentialsProvider`] - turns credential settings into [`Credentials`]
//!
//! [`MemoryBroker`] implements all of them in-process. It is used by tests and
//! by the CLI, and behaves like a hosted broker: deliveries happen on
//! broker-owned threads, every delivery expects exactly one ack or nack, and
//! nacked messages are redelivered.

mod credentials;
mod error;
mod memory;
mod message;
mod subscriber;
mod subscription;

pub use credentials::{Credentials, CredentialsProvider, StaticCredentials};
pub use error::PubSubError;
pub use memory::{MemoryBroker, MemoryBrokerConfig};
pub use message::{AckReply, AckReplyConsumer, InboundMessage, MessageReceiver};
pub use subscriber::{ServiceListener, ServiceState, Subscriber, SubscriberFactory};
pub use subscription::{Subscription, SubscriptionAdmin, SubscriptionName, TopicName};
