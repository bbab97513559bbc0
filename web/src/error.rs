//! Route-table construction errors.
//!
//! These are configuration errors in the taxonomy: fatal at startup, never
//! seen by a caller. Everything that can go wrong per-request is already a
//! terminal outcome produced by the bridge.

use restmq_core::route::RouteMethod;
use thiserror::Error;

/// Why the service route table could not be built.
#[derive(Error, Debug)]
pub enum RouteTableError {
    /// A route was declared with a verb the gateway cannot serve.
    #[error("unsupported HTTP method {method} for route '{path}'")]
    UnsupportedMethod {
        /// The offending verb.
        method: RouteMethod,
        /// The route pattern it was declared on.
        path: String,
    },

    /// A route was declared with an empty path.
    #[error("route for queue '{queue}' has an empty path")]
    EmptyPath {
        /// The queue the route targets.
        queue: String,
    },

    /// A route has no queue and no broker-level default filled it in.
    #[error("route '{path}' has no queue and no broker-level default applies")]
    MissingQueue {
        /// The route pattern it was declared on.
        path: String,
    },
}
