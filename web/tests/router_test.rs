//! End-to-end tests for the HTTP edge: router construction, parameter
//! merging on the wire, allow-list enforcement, and outcome → status
//! mapping, all against the scripted in-memory broker.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use axum::body::{to_bytes, Body};
use http::{Request, StatusCode};
use restmq_bridge::Bridge;
use restmq_core::envelope::RequestEnvelope;
use restmq_core::route::{RouteMethod, ServiceRoute};
use restmq_testing::{BrokerScript, ScriptedBroker, SessionLog};
use restmq_web::{build_router, RouteTableError};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn route(method: RouteMethod, path: &str, queue: &str) -> ServiceRoute {
    ServiceRoute {
        method,
        path: path.to_string(),
        exchange: String::new(),
        queue: queue.to_string(),
        durable: true,
        allowed_headers: vec![],
    }
}

fn gateway(script: BrokerScript, routes: &[ServiceRoute]) -> (axum::Router, Arc<SessionLog>) {
    let broker = ScriptedBroker::new(script);
    let log = broker.log();
    let bridge = Bridge::new(Arc::new(broker)).with_timeout(Duration::from_secs(5));
    let router = build_router(routes, &bridge).unwrap();
    (router, log)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn published_request(log: &SessionLog) -> RequestEnvelope {
    let published = log.published();
    assert_eq!(published.len(), 1);
    serde_json::from_slice(&published[0].body).unwrap()
}

#[tokio::test]
async fn echo_round_trip_returns_200_with_payload() {
    let (router, _log) = gateway(
        BrokerScript::Echo,
        &[route(RouteMethod::Get, "/echo", "echo")],
    );

    let response = router
        .oneshot(
            Request::builder()
                .uri("/echo?message=hi")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["payload"]["message"], "hi");
    assert!(body["requestId"].as_str().unwrap().contains('_'));
}

#[tokio::test]
async fn query_overrides_path_overrides_body_on_the_wire() {
    let (router, log) = gateway(
        BrokerScript::Echo,
        &[route(RouteMethod::Post, "/items/:key", "items")],
    );

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/items/from-path?key=from-query")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({"key": "from-body", "extra": 7})).unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = published_request(&log);
    assert_eq!(request.payload["key"], json!("from-query"));
    assert_eq!(request.payload["extra"], json!(7));
    assert_eq!(request.endpoint, "/items/from-path");
    assert_eq!(request.method, RouteMethod::Post);
}

#[tokio::test]
async fn only_allow_listed_headers_cross_the_bridge() {
    let mut svc = route(RouteMethod::Get, "/secure", "secure");
    svc.allowed_headers = vec!["X-Api-Key".to_string()];
    let (router, log) = gateway(BrokerScript::Echo, &[svc]);

    router
        .oneshot(
            Request::builder()
                .uri("/secure")
                .header("x-api-key", "secret")
                .header("x-forwarded-for", "10.0.0.1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let request = published_request(&log);
    assert_eq!(request.headers.get("x-api-key"), Some(&"secret".to_string()));
    assert!(!request.headers.contains_key("x-forwarded-for"));
    assert_eq!(request.headers.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn silent_backend_maps_to_504_and_closes_the_session() {
    let broker = ScriptedBroker::new(BrokerScript::Silent);
    let log = broker.log();
    let bridge = Bridge::new(Arc::new(broker)).with_timeout(Duration::from_millis(50));
    let router =
        build_router(&[route(RouteMethod::Get, "/slow", "slow")], &bridge).unwrap();

    let response = router
        .oneshot(Request::builder().uri("/slow").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("timed out"));
    assert_eq!(log.closed(), 1);
}

#[tokio::test]
async fn unreachable_broker_maps_to_502() {
    let (router, _log) = gateway(
        BrokerScript::FailOpen,
        &[route(RouteMethod::Get, "/down", "down")],
    );

    let response = router
        .oneshot(Request::builder().uri("/down").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn duplicate_routes_resolve_last_registered_wins() {
    let first = route(RouteMethod::Get, "/dup", "first-queue");
    let second = route(RouteMethod::Get, "/dup", "second-queue");
    let (router, log) = gateway(BrokerScript::Echo, &[first, second]);

    router
        .oneshot(Request::builder().uri("/dup").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let published = log.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].address.routing_key, "second-queue");
}

#[test]
fn unsupported_verb_fails_router_construction() {
    let broker = ScriptedBroker::new(BrokerScript::Echo);
    let bridge = Bridge::new(Arc::new(broker));
    let result = build_router(&[route(RouteMethod::Patch, "/nope", "nope")], &bridge);

    assert!(matches!(
        result,
        Err(RouteTableError::UnsupportedMethod { .. })
    ));
}

#[test]
fn unresolved_queue_fails_router_construction() {
    // A queue-less route is valid configuration only while a broker-level
    // default can still fill it in; by router-construction time it must be
    // resolved.
    let broker = ScriptedBroker::new(BrokerScript::Echo);
    let bridge = Bridge::new(Arc::new(broker));
    let result = build_router(&[route(RouteMethod::Get, "/echo", "")], &bridge);

    assert!(matches!(result, Err(RouteTableError::MissingQueue { .. })));
}

#[test]
fn empty_path_fails_router_construction() {
    let broker = ScriptedBroker::new(BrokerScript::Echo);
    let bridge = Bridge::new(Arc::new(broker));
    let result = build_router(&[route(RouteMethod::Get, "", "orphan")], &bridge);

    assert!(matches!(result, Err(RouteTableError::EmptyPath { .. })));
}
