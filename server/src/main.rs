//! restmq gateway binary.
//!
//! Wires the pieces together: environment configuration, the AMQP broker,
//! the correlation bridge, and the axum route table, then serves until
//! interrupted. Any configuration problem (bad variable, unreadable route
//! file, unsupported verb) aborts startup with a non-zero exit.

use anyhow::Context;
use axum::routing::any;
use http::HeaderValue;
use restmq_amqp::AmqpBroker;
use restmq_bridge::Bridge;
use restmq_server::AppConfig;
use restmq_web::build_router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = AppConfig::from_env()?;
    info!(
        app = %config.app_name,
        version = %config.app_version,
        "starting gateway"
    );

    let services = config.load_services()?;
    info!(
        routes = services.len(),
        file = %config.services_file.display(),
        "loaded service routes"
    );

    let broker = AmqpBroker::builder()
        .uri(config.mq.amqp_uri())
        .reply_queue(config.mq.reply_to.clone())
        .build()?;
    let mut bridge = Bridge::new(Arc::new(broker));
    if !config.mq.timeout.is_zero() {
        bridge = bridge.with_timeout(config.mq.timeout);
    }

    let router = build_router(&services, &bridge)?
        .route("/ping", any(ping))
        .layer(cors_layer(&config.front_origin)?)
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    warn!("server stopped");
    Ok(())
}

async fn ping() -> &'static str {
    "Ok"
}

fn cors_layer(origin: &str) -> anyhow::Result<CorsLayer> {
    if origin == "*" {
        return Ok(CorsLayer::new().allow_origin(Any));
    }
    let origin = HeaderValue::try_from(origin)
        .with_context(|| format!("invalid front origin '{origin}'"))?;
    Ok(CorsLayer::new().allow_origin(AllowOrigin::exact(origin)))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "restmq=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
