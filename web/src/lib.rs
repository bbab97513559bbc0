//! # restmq Web
//!
//! Axum integration for the restmq gateway.
//!
//! This crate is the thin HTTP shell around the correlation bridge:
//!
//! - [`routes::build_router`] turns the configured service list into a
//!   static, validated axum [`Router`](axum::Router) — an unsupported verb
//!   fails construction at startup instead of surfacing per-request.
//! - [`params`] merges body, path, and query parameters into the outbound
//!   payload and applies each route's header allow-list.
//! - Outcomes map to HTTP statuses: success → 200, timeout → 504, any
//!   broker/connect/decode failure → 502; the reply envelope is always the
//!   response body and reply headers are echoed onto the response.

pub mod error;
pub mod params;
pub mod routes;

pub use error::RouteTableError;
pub use routes::build_router;
