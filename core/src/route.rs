//! Service routes: the destination a gateway call is relayed to.
//!
//! A [`ServiceRoute`] binds one HTTP method + path pair to a broker
//! destination (exchange, queue, durability) plus the header names allowed
//! to cross into the outbound envelope. Routes are loaded from
//! configuration at startup and validated once when the router is built;
//! an unsupported verb fails construction rather than being discovered
//! per-request.

use serde::{Deserialize, Serialize};
use std::fmt;

/// HTTP verb of a service route.
///
/// Deserializes any well-known verb so a typo'd or unsupported method in
/// configuration is caught by the routing layer with a precise error
/// instead of a serde failure naming the whole document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RouteMethod {
    /// HTTP GET.
    Get,
    /// HTTP POST.
    Post,
    /// HTTP PUT.
    Put,
    /// HTTP DELETE.
    Delete,
    /// HTTP PATCH. Parsed, but not routable by the gateway.
    Patch,
    /// HTTP HEAD. Parsed, but not routable by the gateway.
    Head,
    /// HTTP OPTIONS. Parsed, but not routable by the gateway.
    Options,
}

impl RouteMethod {
    /// The canonical wire spelling of the verb.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const fn default_durable() -> bool {
    true
}

/// One entry of the service route table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRoute {
    /// HTTP verb this route answers.
    pub method: RouteMethod,
    /// Route pattern, e.g. `/orders/:id`.
    pub path: String,
    /// Broker exchange; empty means the default exchange, unless a
    /// broker-level default exchange is configured at startup.
    #[serde(default)]
    pub exchange: String,
    /// Queue the outbound message is routed to. Empty defers to the
    /// broker-level default queue configured at startup; a route still
    /// empty after that resolution fails router construction.
    #[serde(default)]
    pub queue: String,
    /// Whether the destination queue survives broker restarts.
    #[serde(default = "default_durable")]
    pub durable: bool,
    /// Header names permitted to cross into the outbound envelope,
    /// matched case-insensitively.
    #[serde(default)]
    pub allowed_headers: Vec<String>,
}
