//! # restmq Core
//!
//! Core types and traits for the restmq gateway: a synchronous HTTP front
//! backed by an asynchronous message broker.
//!
//! This crate provides the pieces that are independent of both the HTTP
//! framework and the concrete broker client:
//!
//! - **Envelopes**: the wire shapes of outbound requests and inbound replies
//!   ([`envelope::RequestEnvelope`], [`envelope::ReplyEnvelope`])
//! - **Routes**: the destination a call is relayed to ([`route::ServiceRoute`])
//! - **Broker capability**: object-safe traits the gateway consumes
//!   ([`broker::Broker`], [`broker::BrokerSession`])
//! - **Guards**: the per-request terminal-state and deadline guards
//!   ([`outcome::OutcomeSlot`], [`deadline::DeadlineGuard`])
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   RequestEnvelope    ┌─────────┐
//! │ HTTP edge  │ ───────────────────► │ Broker  │
//! │  (axum)    │ ◄─────────────────── │ (AMQP)  │
//! └────────────┘    ReplyEnvelope     └─────────┘
//! ```
//!
//! Each inbound call owns its envelopes, its broker session, and its guards
//! exclusively; nothing here is shared across in-flight requests.

pub mod broker;
pub mod deadline;
pub mod envelope;
pub mod outcome;
pub mod route;

pub use broker::{Broker, BrokerError, BrokerSession, ReplySubscription};
pub use deadline::{DeadlineError, DeadlineGuard};
pub use envelope::{generate_request_id, ReplyEnvelope, RequestEnvelope};
pub use outcome::{Outcome, OutcomeKind, OutcomeSlot};
pub use route::{RouteMethod, ServiceRoute};
