//! Broker session capability consumed by the gateway.
//!
//! The gateway does not implement a broker client; it consumes one through
//! the object-safe [`Broker`] and [`BrokerSession`] traits defined here.
//! A session models the unit of isolation the bridge relies on: one
//! connection + channel, exclusively owned by one in-flight request from
//! open to close, never shared or reused.
//!
//! The broker's callback-style consume API is deliberately reshaped into a
//! suspending receive: [`BrokerSession::consume_reply`] registers a
//! consumer on a session-private reply destination and hands back a
//! [`ReplySubscription`] whose `recv` suspends the request's task until a
//! delivery arrives or the consumer goes away. "First message wins, then
//! stop listening" without nested callbacks.
//!
//! # Dyn Compatibility
//!
//! Methods return explicit `Pin<Box<dyn Future>>` instead of `async fn` so
//! the traits stay object-safe: the gateway holds an `Arc<dyn Broker>` and
//! each call receives a `Box<dyn BrokerSession>`.

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::mpsc;

/// Boxed future returned by broker capability methods.
pub type BrokerFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, BrokerError>> + Send + 'a>>;

/// Errors surfaced by a broker implementation.
///
/// Every variant maps to a bad-upstream outcome at the gateway edge; the
/// distinctions exist for logs, not for caller-visible status codes.
#[derive(Error, Debug, Clone)]
pub enum BrokerError {
    /// Could not connect to the broker or open a channel.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Could not declare an exchange or queue.
    #[error("declare failed for '{name}': {reason}")]
    DeclareFailed {
        /// The exchange or queue that failed to declare.
        name: String,
        /// The reason for failure.
        reason: String,
    },

    /// Could not publish the outbound message.
    #[error("publish failed to '{routing_key}': {reason}")]
    PublishFailed {
        /// The routing key the publish targeted.
        routing_key: String,
        /// The reason for failure.
        reason: String,
    },

    /// Could not register the reply consumer.
    #[error("consume failed on '{queue}': {reason}")]
    ConsumeFailed {
        /// The reply queue the consume targeted.
        queue: String,
        /// The reason for failure.
        reason: String,
    },

    /// The session's channel closed while a reply was still awaited.
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// The reply payload was not a well-formed envelope.
    #[error("reply decode failed: {0}")]
    Decode(String),
}

/// One message delivered on a reply subscription.
#[derive(Clone, Debug)]
pub struct Delivery {
    /// Raw message body.
    pub body: Vec<u8>,
    /// Correlation id carried in the broker message properties, if any.
    pub correlation_id: Option<String>,
}

/// Receiving half of a reply consumer.
///
/// Holds the consumer tag (needed to cancel the consumer during cleanup)
/// and a bounded channel the broker implementation forwards deliveries
/// into.
#[derive(Debug)]
pub struct ReplySubscription {
    consumer_tag: String,
    reply_to: String,
    receiver: mpsc::Receiver<Delivery>,
}

impl ReplySubscription {
    /// Wrap a consumer tag, the reply address it listens on, and the
    /// delivery channel.
    #[must_use]
    pub const fn new(
        consumer_tag: String,
        reply_to: String,
        receiver: mpsc::Receiver<Delivery>,
    ) -> Self {
        Self {
            consumer_tag,
            reply_to,
            receiver,
        }
    }

    /// The broker-assigned (or caller-chosen) consumer tag.
    #[must_use]
    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    /// The reply address to attach to the outbound publish.
    #[must_use]
    pub fn reply_to(&self) -> &str {
        &self.reply_to
    }

    /// Suspend until the next delivery arrives.
    ///
    /// Returns `None` when the consumer was cancelled or its channel
    /// closed without a delivery.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.receiver.recv().await
    }
}

/// Where an outbound message is published.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishAddress {
    /// Exchange name; empty for the default exchange.
    pub exchange: String,
    /// Routing key (the destination queue).
    pub routing_key: String,
}

/// Message properties attached to an outbound publish.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishProperties {
    /// MIME type of the body.
    pub content_type: String,
    /// Correlation id linking the reply back to this request.
    pub correlation_id: String,
    /// Reply destination the consumer should answer to.
    pub reply_to: String,
}

/// Factory for per-request broker sessions.
///
/// Implementations connect and open a channel on every call; the returned
/// session belongs to exactly one request for its entire lifetime.
pub trait Broker: Send + Sync {
    /// Connect and open a fresh session (connection + channel).
    fn open_session(&self) -> BrokerFuture<'_, Box<dyn BrokerSession>>;
}

/// One connection + channel, exclusively owned by one in-flight request.
///
/// All methods are broker round trips and may suspend. `cancel` and
/// `close` are cleanup operations: callers treat their failures as
/// best-effort (logged, not propagated).
pub trait BrokerSession: Send {
    /// Declare an exchange, creating it if it does not exist.
    fn declare_exchange<'a>(&'a mut self, exchange: &'a str) -> BrokerFuture<'a, ()>;

    /// Declare a queue, creating it if it does not exist.
    fn declare_queue<'a>(&'a mut self, queue: &'a str, durable: bool) -> BrokerFuture<'a, ()>;

    /// Register a consumer on this session's private reply destination.
    ///
    /// Must be called before [`publish`](Self::publish) so the reply
    /// cannot race the consumer registration.
    fn consume_reply(&mut self) -> BrokerFuture<'_, ReplySubscription>;

    /// Publish an outbound message.
    fn publish<'a>(
        &'a mut self,
        address: &'a PublishAddress,
        properties: &'a PublishProperties,
        body: &'a [u8],
    ) -> BrokerFuture<'a, ()>;

    /// Cancel a consumer by tag.
    fn cancel<'a>(&'a mut self, consumer_tag: &'a str) -> BrokerFuture<'a, ()>;

    /// Close the session (channel and connection).
    fn close(&mut self) -> BrokerFuture<'_, ()>;
}
