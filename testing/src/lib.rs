//! # restmq Testing
//!
//! Test doubles for exercising the gateway without a real broker.
//!
//! The centerpiece is [`ScriptedBroker`], an in-memory implementation of
//! the core broker capability whose behavior is chosen up front with a
//! [`BrokerScript`]: echo the request back, deliver canned reply bytes,
//! stay silent forever, or fail at a specific protocol step. Every session
//! records what happened into a shared [`SessionLog`] so tests can assert
//! resource-cleanup properties (consumer cancelled, session closed) and
//! inspect published messages.
//!
//! ## Example
//!
//! ```
//! use restmq_testing::{BrokerScript, ScriptedBroker};
//! use restmq_core::broker::Broker;
//!
//! # async fn example() -> Result<(), restmq_core::broker::BrokerError> {
//! let broker = ScriptedBroker::new(BrokerScript::Echo);
//! let log = broker.log();
//!
//! let mut session = broker.open_session().await?;
//! session.close().await?;
//!
//! assert_eq!(log.opened(), 1);
//! assert_eq!(log.closed(), 1);
//! # Ok(())
//! # }
//! ```

use restmq_core::broker::{
    Broker, BrokerError, BrokerFuture, BrokerSession, Delivery, PublishAddress,
    PublishProperties, ReplySubscription,
};
use restmq_core::envelope::{ReplyEnvelope, RequestEnvelope};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Consumer tag every scripted session hands out.
pub const TEST_CONSUMER_TAG: &str = "scripted-consumer-0";

/// Reply address every scripted session listens on.
pub const TEST_REPLY_QUEUE: &str = "scripted-reply";

/// What a scripted session does when the gateway publishes.
#[derive(Clone, Debug)]
pub enum BrokerScript {
    /// Decode the outbound envelope and reply with the same request id and
    /// the request payload echoed back.
    Echo,
    /// Deliver these raw bytes as the reply.
    Reply(Vec<u8>),
    /// Deliver several raw replies, in order.
    ReplyMany(Vec<Vec<u8>>),
    /// Accept the publish and never reply.
    Silent,
    /// Fail when a session is opened.
    FailOpen,
    /// Fail on the first declare (exchange or queue).
    FailDeclare,
    /// Fail when the reply consumer is registered.
    FailConsume,
    /// Fail on publish.
    FailPublish,
}

/// One message a scripted session accepted for publishing.
#[derive(Clone, Debug)]
pub struct PublishedMessage {
    /// Exchange + routing key the publish targeted.
    pub address: PublishAddress,
    /// Properties attached to the publish.
    pub properties: PublishProperties,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

/// Shared record of everything scripted sessions did.
#[derive(Debug, Default)]
pub struct SessionLog {
    opened: AtomicUsize,
    closed: AtomicUsize,
    cancelled: AtomicUsize,
    events: Mutex<Vec<String>>,
    published: Mutex<Vec<PublishedMessage>>,
}

impl SessionLog {
    fn record(&self, event: impl Into<String>) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.into());
    }

    /// Number of sessions opened.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of sessions closed.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of consumer cancellations.
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Ordered list of session events, e.g. `"open"`, `"declare_queue:echo"`,
    /// `"publish"`, `"cancel"`, `"close"`.
    pub fn events(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Messages accepted for publishing.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// In-memory broker whose sessions follow a [`BrokerScript`].
#[derive(Clone)]
pub struct ScriptedBroker {
    script: BrokerScript,
    log: Arc<SessionLog>,
}

impl ScriptedBroker {
    /// Create a broker that runs `script` in every session.
    #[must_use]
    pub fn new(script: BrokerScript) -> Self {
        Self {
            script,
            log: Arc::new(SessionLog::default()),
        }
    }

    /// Handle to the shared session log.
    #[must_use]
    pub fn log(&self) -> Arc<SessionLog> {
        Arc::clone(&self.log)
    }
}

impl Broker for ScriptedBroker {
    fn open_session(&self) -> BrokerFuture<'_, Box<dyn BrokerSession>> {
        Box::pin(async move {
            if matches!(self.script, BrokerScript::FailOpen) {
                return Err(BrokerError::ConnectionFailed(
                    "scripted connect failure".to_string(),
                ));
            }
            self.log.opened.fetch_add(1, Ordering::SeqCst);
            self.log.record("open");
            Ok(Box::new(ScriptedSession {
                script: self.script.clone(),
                log: Arc::clone(&self.log),
                reply_tx: None,
            }) as Box<dyn BrokerSession>)
        })
    }
}

struct ScriptedSession {
    script: BrokerScript,
    log: Arc<SessionLog>,
    reply_tx: Option<mpsc::Sender<Delivery>>,
}

impl ScriptedSession {
    async fn deliver(&self, body: Vec<u8>, correlation_id: Option<String>) {
        if let Some(tx) = &self.reply_tx {
            // Receiver may already be gone (late reply); that is fine.
            let _ = tx
                .send(Delivery {
                    body,
                    correlation_id,
                })
                .await;
        }
    }
}

impl BrokerSession for ScriptedSession {
    fn declare_exchange<'a>(&'a mut self, exchange: &'a str) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            if matches!(self.script, BrokerScript::FailDeclare) {
                return Err(BrokerError::DeclareFailed {
                    name: exchange.to_string(),
                    reason: "scripted declare failure".to_string(),
                });
            }
            self.log.record(format!("declare_exchange:{exchange}"));
            Ok(())
        })
    }

    fn declare_queue<'a>(&'a mut self, queue: &'a str, durable: bool) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            if matches!(self.script, BrokerScript::FailDeclare) {
                return Err(BrokerError::DeclareFailed {
                    name: queue.to_string(),
                    reason: "scripted declare failure".to_string(),
                });
            }
            self.log.record(format!("declare_queue:{queue}:{durable}"));
            Ok(())
        })
    }

    fn consume_reply(&mut self) -> BrokerFuture<'_, ReplySubscription> {
        Box::pin(async move {
            if matches!(self.script, BrokerScript::FailConsume) {
                return Err(BrokerError::ConsumeFailed {
                    queue: "scripted-reply".to_string(),
                    reason: "scripted consume failure".to_string(),
                });
            }
            let (tx, rx) = mpsc::channel(8);
            self.reply_tx = Some(tx);
            self.log.record("consume");
            Ok(ReplySubscription::new(
                TEST_CONSUMER_TAG.to_string(),
                TEST_REPLY_QUEUE.to_string(),
                rx,
            ))
        })
    }

    fn publish<'a>(
        &'a mut self,
        address: &'a PublishAddress,
        properties: &'a PublishProperties,
        body: &'a [u8],
    ) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            if matches!(self.script, BrokerScript::FailPublish) {
                return Err(BrokerError::PublishFailed {
                    routing_key: address.routing_key.clone(),
                    reason: "scripted publish failure".to_string(),
                });
            }
            self.log.record("publish");
            self.log
                .published
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(PublishedMessage {
                    address: address.clone(),
                    properties: properties.clone(),
                    body: body.to_vec(),
                });

            match &self.script {
                BrokerScript::Echo => {
                    if let Ok(request) = serde_json::from_slice::<RequestEnvelope>(body) {
                        let reply = ReplyEnvelope::success(
                            request.request_id.clone(),
                            serde_json::Value::Object(request.payload),
                        );
                        if let Ok(bytes) = reply.encode() {
                            self.deliver(bytes, Some(request.request_id)).await;
                        }
                    }
                }
                BrokerScript::Reply(bytes) => {
                    let bytes = bytes.clone();
                    self.deliver(bytes, Some(properties.correlation_id.clone()))
                        .await;
                }
                BrokerScript::ReplyMany(replies) => {
                    for bytes in replies.clone() {
                        self.deliver(bytes, Some(properties.correlation_id.clone()))
                            .await;
                    }
                }
                _ => {}
            }
            Ok(())
        })
    }

    fn cancel<'a>(&'a mut self, consumer_tag: &'a str) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            self.log.cancelled.fetch_add(1, Ordering::SeqCst);
            self.log.record(format!("cancel:{consumer_tag}"));
            self.reply_tx = None;
            Ok(())
        })
    }

    fn close(&mut self) -> BrokerFuture<'_, ()> {
        Box::pin(async move {
            self.log.closed.fetch_add(1, Ordering::SeqCst);
            self.log.record("close");
            self.reply_tx = None;
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use restmq_core::route::RouteMethod;

    #[tokio::test]
    async fn test_echo_script_replies_with_request_payload() {
        let broker = ScriptedBroker::new(BrokerScript::Echo);
        let mut session = broker.open_session().await.unwrap();
        let mut subscription = session.consume_reply().await.unwrap();

        let mut request = RequestEnvelope::new(RouteMethod::Get, "/echo");
        request.request_id = "R1".to_string();
        request
            .payload
            .insert("message".to_string(), serde_json::json!("hi"));

        let address = PublishAddress {
            exchange: String::new(),
            routing_key: "echo".to_string(),
        };
        let properties = PublishProperties {
            content_type: "application/json".to_string(),
            correlation_id: "R1".to_string(),
            reply_to: "scripted-reply".to_string(),
        };
        session
            .publish(&address, &properties, &request.encode().unwrap())
            .await
            .unwrap();

        let delivery = subscription.recv().await.unwrap();
        let reply = ReplyEnvelope::decode(&delivery.body).unwrap();
        assert_eq!(reply.request_id, "R1");
        assert_eq!(reply.payload, Some(serde_json::json!({"message": "hi"})));
    }

    #[tokio::test]
    async fn test_fail_publish_records_no_message() {
        let broker = ScriptedBroker::new(BrokerScript::FailPublish);
        let log = broker.log();
        let mut session = broker.open_session().await.unwrap();

        let address = PublishAddress {
            exchange: String::new(),
            routing_key: "echo".to_string(),
        };
        let properties = PublishProperties {
            content_type: "application/json".to_string(),
            correlation_id: "R1".to_string(),
            reply_to: "scripted-reply".to_string(),
        };
        let result = session.publish(&address, &properties, b"{}").await;
        assert!(result.is_err());
        assert!(log.published().is_empty());
    }
}
