//! # restmq Bridge
//!
//! The correlation bridge: for one inbound call, perform exactly one broker
//! round trip and produce exactly one terminal outcome.
//!
//! ## Protocol
//!
//! ```text
//! open session ──► declare exchange? ──► declare queue ──► consume reply
//!                                                              │
//!                                            publish ◄─────────┘
//!                                               │
//!                     ┌─────────────────────────┼──────────────────────┐
//!                     ▼                         ▼                      ▼
//!               reply arrives             deadline fires        broker error
//!                (Success)                  (TimedOut)        (UpstreamFailed)
//!                     └─────────── first one commits ──────────────────┘
//!                                               │
//!                          cancel consumer, close session (always)
//! ```
//!
//! The reply consumer is registered **before** the publish so the reply
//! cannot race the registration. The session is private to the call, which
//! is what makes the session-scoped reply destination safe; on top of that
//! the bridge verifies the reply's `requestId` and keeps waiting when a
//! foreign reply shows up, so the protocol stays correct even against an
//! explicitly configured shared reply queue.
//!
//! Whatever happens, the session opened for a call is closed (or was never
//! opened) by the time [`Bridge::relay`] returns; cancel/close failures
//! are logged and swallowed because the outward outcome is already
//! committed by then.

use restmq_core::broker::{
    Broker, BrokerError, BrokerSession, PublishAddress, PublishProperties, ReplySubscription,
};
use restmq_core::deadline::{DeadlineError, DeadlineGuard};
use restmq_core::envelope::{ReplyEnvelope, RequestEnvelope};
use restmq_core::outcome::{Outcome, OutcomeSlot};
use restmq_core::route::ServiceRoute;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Internal failure classification for one round trip. Folded into an
/// [`Outcome`] at the `relay` boundary; never escapes the bridge.
#[derive(Error, Debug)]
enum RelayError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Deadline(DeadlineError),

    #[error("failed to encode request envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Relays one request envelope to a broker destination and awaits the
/// correlated reply.
///
/// Cheap to clone; holds the broker capability and the reply deadline.
/// Each call to [`relay`](Self::relay) opens its own session, so a single
/// `Bridge` serves unbounded concurrent calls without interference.
#[derive(Clone)]
pub struct Bridge {
    broker: Arc<dyn Broker>,
    timeout: Option<Duration>,
}

impl Bridge {
    /// Create a bridge with no reply deadline.
    #[must_use]
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            timeout: None,
        }
    }

    /// Set the deadline a reply must beat.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Perform the round trip for one call.
    ///
    /// Always returns a terminal outcome: reply-driven success, deadline
    /// timeout, or upstream failure. Never panics, never propagates broker
    /// errors past this boundary.
    pub async fn relay(&self, route: &ServiceRoute, request: RequestEnvelope) -> Outcome {
        let request_id = request.request_id.clone();
        let mut slot = OutcomeSlot::new();
        let mut deadline = DeadlineGuard::new();

        if let Err(err) = self
            .round_trip(route, &request, &mut deadline, &mut slot)
            .await
        {
            if deadline.has_elapsed() {
                // The timeout path already committed and logged.
                tracing::debug!(
                    request_id = %request_id,
                    error = %err,
                    "error after deadline fired; outcome already committed"
                );
            } else {
                if slot.mark_error_logged() {
                    tracing::error!(
                        request_id = %request_id,
                        method = %request.method,
                        endpoint = %request.endpoint,
                        error = %err,
                        "relay failed"
                    );
                }
                slot.try_commit(Outcome::upstream_failed(&request_id, err.to_string()));
            }
        }

        slot.into_outcome().unwrap_or_else(|| {
            // Unreachable by construction: every exit path above commits.
            Outcome::upstream_failed(&request_id, "relay produced no outcome")
        })
    }

    /// Open a session, run the exchange, and release broker resources on
    /// every exit path.
    async fn round_trip(
        &self,
        route: &ServiceRoute,
        request: &RequestEnvelope,
        deadline: &mut DeadlineGuard,
        slot: &mut OutcomeSlot,
    ) -> Result<(), RelayError> {
        let mut session = self.broker.open_session().await?;
        let mut consumer_tag = None;

        let result = self
            .exchange(session.as_mut(), route, request, deadline, slot, &mut consumer_tag)
            .await;

        if let Some(tag) = consumer_tag {
            if let Err(err) = session.cancel(&tag).await {
                tracing::warn!(
                    request_id = %request.request_id,
                    consumer_tag = %tag,
                    error = %err,
                    "failed to cancel reply consumer"
                );
            }
        }
        if let Err(err) = session.close().await {
            tracing::warn!(
                request_id = %request.request_id,
                error = %err,
                "failed to close broker session"
            );
        }

        result
    }

    /// Declare, consume, publish, and await the correlated reply.
    async fn exchange(
        &self,
        session: &mut dyn BrokerSession,
        route: &ServiceRoute,
        request: &RequestEnvelope,
        deadline: &mut DeadlineGuard,
        slot: &mut OutcomeSlot,
        consumer_tag: &mut Option<String>,
    ) -> Result<(), RelayError> {
        if !route.exchange.is_empty() {
            session.declare_exchange(&route.exchange).await?;
        }
        session.declare_queue(&route.queue, route.durable).await?;

        let mut subscription = session.consume_reply().await?;
        *consumer_tag = Some(subscription.consumer_tag().to_string());

        let address = PublishAddress {
            exchange: route.exchange.clone(),
            routing_key: route.queue.clone(),
        };
        let properties = PublishProperties {
            content_type: "application/json".to_string(),
            correlation_id: request.request_id.clone(),
            reply_to: subscription.reply_to().to_string(),
        };
        let body = request.encode()?;
        session.publish(&address, &properties, &body).await?;

        tracing::info!(
            request_id = %request.request_id,
            exchange = %route.exchange,
            queue = %route.queue,
            "request published, awaiting reply"
        );

        let request_id = request.request_id.as_str();
        let reply = match self.timeout {
            Some(timeout) => {
                let wait = Self::await_reply(&mut subscription, request_id);
                let on_timeout = || {
                    if slot.mark_error_logged() {
                        tracing::warn!(
                            request_id = %request_id,
                            timeout = ?timeout,
                            "request timed out awaiting reply"
                        );
                    }
                    slot.try_commit(Outcome::timed_out(
                        request_id,
                        format!("request timed out after {}ms", timeout.as_millis()),
                    ));
                };
                match deadline.run(timeout, on_timeout, wait).await {
                    Ok(inner) => inner?,
                    Err(err) => return Err(RelayError::Deadline(err)),
                }
            }
            None => Self::await_reply(&mut subscription, request_id).await?,
        };

        if slot.is_terminal() {
            // A concurrent timeout beat the reply; drop it without touching
            // the committed outcome. Not a failure of this path, so no
            // error-level noise.
            tracing::debug!(
                request_id = %request_id,
                "reply arrived after the request terminated; discarding"
            );
            return Ok(());
        }
        slot.try_commit(Outcome::success(reply));
        Ok(())
    }

    /// Receive until a reply correlates with this request.
    async fn await_reply(
        subscription: &mut ReplySubscription,
        request_id: &str,
    ) -> Result<ReplyEnvelope, RelayError> {
        loop {
            let Some(delivery) = subscription.recv().await else {
                return Err(RelayError::Broker(BrokerError::ChannelClosed(
                    "reply consumer ended without a delivery".to_string(),
                )));
            };

            let reply = ReplyEnvelope::decode(&delivery.body)
                .map_err(|err| RelayError::Broker(BrokerError::Decode(err.to_string())))?;

            if reply.request_id != request_id {
                tracing::warn!(
                    expected = %request_id,
                    received = %reply.request_id,
                    "reply correlation mismatch; discarding and continuing to wait"
                );
                continue;
            }
            return Ok(reply);
        }
    }
}
