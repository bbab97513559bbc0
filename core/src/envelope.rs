//! Wire envelopes exchanged with backend services over the broker.
//!
//! Both envelopes are serialized as UTF-8 JSON with camelCase field names,
//! which is the contract backend workers consume and produce. A reply that
//! fails to decode is treated as a broker failure by the bridge, not as a
//! distinct error class.
//!
//! # Example
//!
//! ```
//! use restmq_core::envelope::{ReplyEnvelope, RequestEnvelope};
//! use restmq_core::route::RouteMethod;
//!
//! let request = RequestEnvelope::new(RouteMethod::Get, "/echo");
//! let bytes = request.encode().unwrap();
//!
//! let reply = ReplyEnvelope::decode(
//!     br#"{"requestId":"1700000000000_42","payload":{"message":"hi"}}"#,
//! ).unwrap();
//! assert!(reply.error.is_none());
//! ```

use crate::route::RouteMethod;
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Generate a per-request correlation token.
///
/// Millisecond timestamp prefix plus a random suffix. Uniqueness is the
/// requirement here, not unpredictability: the token only has to correlate
/// one reply with one outstanding request.
#[must_use]
pub fn generate_request_id() -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{millis}_{suffix}")
}

/// Outbound request envelope published to a service queue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    /// Correlation token, unique per request.
    pub request_id: String,
    /// The originating HTTP verb.
    pub method: RouteMethod,
    /// The originating request path.
    pub endpoint: String,
    /// Headers that passed the route's allow-list, name → value.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request parameters merged from body, path, and query.
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl RequestEnvelope {
    /// Create an envelope with a freshly generated request id and no
    /// headers or payload.
    #[must_use]
    pub fn new(method: RouteMethod, endpoint: impl Into<String>) -> Self {
        Self {
            request_id: generate_request_id(),
            method,
            endpoint: endpoint.into(),
            headers: HashMap::new(),
            payload: Map::new(),
        }
    }

    /// Serialize to the JSON wire representation.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Inbound reply envelope consumed from the reply destination.
///
/// `payload` and `error` are mutually exclusive in intent: a well-behaved
/// worker sets exactly one of them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyEnvelope {
    /// Correlation token of the request this envelope answers. Empty for
    /// failures raised before a request id existed.
    #[serde(default)]
    pub request_id: String,
    /// Headers to echo onto the outward HTTP response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    /// Success payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReplyEnvelope {
    /// Build a success reply.
    #[must_use]
    pub fn success(request_id: impl Into<String>, payload: Value) -> Self {
        Self {
            request_id: request_id.into(),
            headers: None,
            payload: Some(payload),
            error: None,
        }
    }

    /// Build a failure reply.
    #[must_use]
    pub fn failure(request_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            headers: None,
            payload: None,
            error: Some(error.into()),
        }
    }

    /// Deserialize from the JSON wire representation.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if the bytes are not a well-formed
    /// reply envelope.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Serialize to the JSON wire representation.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_ids_are_unique() {
        let a = generate_request_id();
        let b = generate_request_id();
        assert_ne!(a, b);
        assert!(a.contains('_'));
    }

    #[test]
    fn test_request_envelope_wire_shape() {
        let mut request = RequestEnvelope::new(RouteMethod::Post, "/orders");
        request.request_id = "R1".to_string();
        request
            .headers
            .insert("authorization".to_string(), "Bearer t".to_string());
        request
            .payload
            .insert("amount".to_string(), json!(3));

        let value: Value = serde_json::from_slice(&request.encode().unwrap()).unwrap();
        assert_eq!(value["requestId"], "R1");
        assert_eq!(value["method"], "POST");
        assert_eq!(value["endpoint"], "/orders");
        assert_eq!(value["headers"]["authorization"], "Bearer t");
        assert_eq!(value["payload"]["amount"], 3);
    }

    #[test]
    fn test_reply_envelope_decodes_success() {
        let reply =
            ReplyEnvelope::decode(br#"{"requestId":"R1","payload":{"message":"hi"}}"#).unwrap();
        assert_eq!(reply.request_id, "R1");
        assert_eq!(reply.payload, Some(json!({"message": "hi"})));
        assert_eq!(reply.error, None);
    }

    #[test]
    fn test_reply_envelope_omits_absent_fields() {
        let reply = ReplyEnvelope::failure("R1", "boom");
        let text = String::from_utf8(reply.encode().unwrap()).unwrap();
        assert!(text.contains("\"error\":\"boom\""));
        assert!(!text.contains("payload"));
        assert!(!text.contains("headers"));
    }

    #[test]
    fn test_reply_envelope_rejects_malformed_json() {
        assert!(ReplyEnvelope::decode(b"{not json").is_err());
    }
}
