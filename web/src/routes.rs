//! Static route table construction and the per-route relay handler.
//!
//! The service list is validated once, up front: any entry with a verb the
//! gateway cannot serve fails [`build_router`] before a single call is
//! accepted. Duplicate (method, path) pairs are resolved last-registered
//! wins, matching how the source configuration format layers
//! supplementary service files over the primary one.

use crate::error::RouteTableError;
use crate::params;
use axum::extract::{Path, Query};
use axum::response::{IntoResponse, Response};
use axum::routing::{on, MethodFilter};
use axum::{Json, Router};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri};
use restmq_bridge::Bridge;
use restmq_core::envelope::RequestEnvelope;
use restmq_core::outcome::{Outcome, OutcomeKind};
use restmq_core::route::{RouteMethod, ServiceRoute};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Build the gateway router from the configured service list.
///
/// # Errors
///
/// Returns [`RouteTableError`] when a route declares an unsupported verb,
/// an empty path, or has no queue after broker-level defaults were
/// applied. All are configuration errors and fatal at startup.
pub fn build_router(routes: &[ServiceRoute], bridge: &Bridge) -> Result<Router, RouteTableError> {
    // Validate everything before registering anything, so a bad entry can
    // never leave a half-built router serving traffic.
    let mut table: Vec<ServiceRoute> = Vec::new();
    for route in routes {
        if route.path.is_empty() {
            return Err(RouteTableError::EmptyPath {
                queue: route.queue.clone(),
            });
        }
        if route.queue.is_empty() {
            return Err(RouteTableError::MissingQueue {
                path: route.path.clone(),
            });
        }
        if method_filter(route.method).is_none() {
            return Err(RouteTableError::UnsupportedMethod {
                method: route.method,
                path: route.path.clone(),
            });
        }
        // Last-registered wins on duplicate (method, path).
        table.retain(|existing| {
            !(existing.method == route.method && existing.path == route.path)
        });
        table.push(route.clone());
    }

    let mut router = Router::new();
    for route in table {
        let Some(filter) = method_filter(route.method) else {
            // Validated above.
            continue;
        };
        let path = route.path.clone();
        let route = Arc::new(route);
        let bridge = bridge.clone();

        tracing::info!(
            method = %route.method,
            path = %route.path,
            queue = %route.queue,
            "attaching relay route"
        );

        let handler = move |uri: Uri,
                            Path(path_params): Path<HashMap<String, String>>,
                            Query(query_params): Query<HashMap<String, String>>,
                            headers: HeaderMap,
                            body: Option<Json<Value>>| async move {
            relay_request(
                &bridge,
                &route,
                &uri,
                &path_params,
                &query_params,
                &headers,
                body.map(|Json(value)| value),
            )
            .await
        };
        router = router.route(&path, on(filter, handler));
    }

    Ok(router)
}

/// Verbs the gateway serves. Everything else is a configuration error.
const fn method_filter(method: RouteMethod) -> Option<MethodFilter> {
    match method {
        RouteMethod::Get => Some(MethodFilter::GET),
        RouteMethod::Post => Some(MethodFilter::POST),
        RouteMethod::Put => Some(MethodFilter::PUT),
        RouteMethod::Delete => Some(MethodFilter::DELETE),
        RouteMethod::Patch | RouteMethod::Head | RouteMethod::Options => None,
    }
}

/// Assemble the outbound envelope, run the bridge, and map the outcome.
async fn relay_request(
    bridge: &Bridge,
    route: &ServiceRoute,
    uri: &Uri,
    path_params: &HashMap<String, String>,
    query_params: &HashMap<String, String>,
    headers: &HeaderMap,
    body: Option<Value>,
) -> Response {
    let mut request = RequestEnvelope::new(route.method, uri.path());
    request.headers = params::filter_headers(headers, &route.allowed_headers);
    request.payload = params::merge_payload(body.as_ref(), path_params, query_params);

    let outcome = bridge.relay(route, request).await;
    outcome_response(outcome)
}

/// Map a terminal outcome to the outward HTTP response.
///
/// The reply envelope is always the body; reply headers are echoed onto
/// the response, skipping names or values HTTP cannot carry.
fn outcome_response(outcome: Outcome) -> Response {
    let status = match outcome.kind {
        OutcomeKind::Success => StatusCode::OK,
        OutcomeKind::TimedOut => StatusCode::GATEWAY_TIMEOUT,
        OutcomeKind::UpstreamFailed => StatusCode::BAD_GATEWAY,
    };

    let echoed = outcome.reply.headers.clone();
    let mut response = (status, Json(outcome.reply)).into_response();
    if let Some(echoed) = echoed {
        for (name, value) in &echoed {
            match (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                (Ok(name), Ok(value)) => {
                    response.headers_mut().insert(name, value);
                }
                _ => {
                    tracing::debug!(header = %name, "skipping unechoable reply header");
                }
            }
        }
    }
    response
}
