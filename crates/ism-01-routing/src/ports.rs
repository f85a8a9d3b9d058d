//! Broker port.
//!
//! The transport is written against this seam. The in-process adapter
//! lives in [`crate::adapters`]; a networked broker client implements the
//! same trait without changing routes, handlers or the demultiplexer.

use crate::envelope::MessageEnvelope;
use crate::errors::TransportError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Durable-consumer parameters of a subscription.
#[derive(Debug, Clone)]
pub struct DurableSpec {
    /// Stream the consumer is attached to.
    pub stream: String,
    /// Durable consumer name (the route's queue group).
    pub consumer: String,
    /// Maximum unacknowledged messages; `None` leaves the broker default.
    pub max_ack_pending: Option<usize>,
    /// Redelivery window for unacknowledged messages.
    pub ack_wait: Option<Duration>,
}

/// What to subscribe to and how.
#[derive(Debug, Clone)]
pub struct SubscriptionSpec {
    /// Subject to receive. A trailing `.>` segment matches any deeper
    /// subject, which suffixed publishes rely on.
    pub subject: String,
    /// Queue group for load-balanced ephemeral delivery.
    pub queue: Option<String>,
    /// Present for durable (acked) consumers.
    pub durable: Option<DurableSpec>,
}

/// A push subscription: the broker feeds envelopes into the channel.
pub struct PushSubscription {
    /// Broker-side identity, used to unsubscribe.
    pub id: Uuid,
    /// Delivery channel. Dropping the receiver ends delivery.
    pub receiver: mpsc::Receiver<MessageEnvelope>,
}

/// A pull subscription: the consumer drives delivery in batches.
#[async_trait]
pub trait PullSubscription: Send + Sync {
    /// Broker-side identity.
    fn id(&self) -> Uuid;

    /// Fetches up to `batch` messages, waiting at most `max_wait`.
    ///
    /// An empty result after `max_wait` means "no messages yet" and is
    /// not an error; callers loop.
    async fn fetch(
        &self,
        batch: usize,
        max_wait: Duration,
    ) -> Result<Vec<MessageEnvelope>, TransportError>;
}

/// Uniform pub/sub broker interface.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Establishes the connection. Idempotent: success when already
    /// connected.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Whether the broker is currently connected.
    fn is_connected(&self) -> bool;

    /// Ensures a stream named `name` exists covering `subjects`,
    /// creating it when absent.
    async fn ensure_stream(&self, name: &str, subjects: &[String]) -> Result<(), TransportError>;

    /// Publishes `data` to `subject`.
    async fn publish(&self, subject: &str, data: Vec<u8>) -> Result<(), TransportError>;

    /// Publishes `data` to `subject` and waits for one reply. The caller
    /// bounds the wait (deadline/cancellation); this call itself blocks
    /// until a reply arrives.
    async fn request(&self, subject: &str, data: Vec<u8>)
        -> Result<MessageEnvelope, TransportError>;

    /// Starts server-pushed delivery.
    async fn subscribe_push(
        &self,
        spec: SubscriptionSpec,
    ) -> Result<PushSubscription, TransportError>;

    /// Creates a pull consumer; delivery is driven by `fetch` calls.
    async fn subscribe_pull(
        &self,
        spec: SubscriptionSpec,
    ) -> Result<Box<dyn PullSubscription>, TransportError>;

    /// Stops a push subscription. Unknown ids are ignored.
    async fn unsubscribe(&self, id: Uuid) -> Result<(), TransportError>;

    /// Blocks until locally buffered publishes are acknowledged.
    async fn flush(&self) -> Result<(), TransportError>;

    /// Soft shutdown: like disconnect but silent when already closed.
    async fn drain(&self) -> Result<(), TransportError>;

    /// Drains in-flight messages and closes. Fails when not connected.
    async fn disconnect(&self) -> Result<(), TransportError>;
}
