//! Example backend worker: echoes `payload.message` back to the caller.
//!
//! Consumes the `echo` queue, acknowledges each delivery, and publishes a
//! reply envelope to the request's `replyTo` address with the same request
//! id. Pair it with a route like
//! `{"method": "GET", "path": "/echo", "queue": "echo"}`.

use anyhow::Context;
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use restmq_core::envelope::{ReplyEnvelope, RequestEnvelope};
use restmq_server::MqConfig;
use serde_json::{json, Value};
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const QUEUE_NAME: &str = "echo";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "echo_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = MqConfig::from_env()?;
    let uri = config.amqp_uri();
    info!(queue = QUEUE_NAME, "starting echo worker");

    let connection = Connection::connect(&uri, ConnectionProperties::default())
        .await
        .context("failed to connect to broker")?;
    let channel = connection.create_channel().await?;
    channel
        .queue_declare(
            QUEUE_NAME,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await?;

    let mut consumer = channel
        .basic_consume(
            QUEUE_NAME,
            "echo-worker",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;
    info!("awaiting requests");

    while let Some(delivery) = consumer.next().await {
        match delivery {
            Ok(delivery) => {
                if let Err(err) = handle(&channel, &delivery).await {
                    error!(error = %err, "failed to handle request");
                }
            }
            Err(err) => {
                error!(error = %err, "consumer stream error");
                break;
            }
        }
    }

    warn!("echo worker stopped");
    Ok(())
}

async fn handle(channel: &Channel, delivery: &Delivery) -> anyhow::Result<()> {
    delivery.ack(BasicAckOptions::default()).await?;

    let request: RequestEnvelope = serde_json::from_slice(&delivery.data)?;
    let Some(reply_to) = delivery
        .properties
        .reply_to()
        .as_ref()
        .map(|address| address.as_str().to_string())
    else {
        warn!(
            request_id = %request.request_id,
            "request has no replyTo address; cannot respond"
        );
        return Ok(());
    };

    let message = request
        .payload
        .get("message")
        .cloned()
        .unwrap_or(Value::Null);
    let reply = ReplyEnvelope::success(request.request_id.clone(), json!({ "message": message }));

    channel
        .basic_publish(
            "",
            &reply_to,
            BasicPublishOptions::default(),
            &reply.encode()?,
            BasicProperties::default()
                .with_content_type("application/json".into())
                .with_correlation_id(request.request_id.as_str().into()),
        )
        .await?
        .await?;

    info!(request_id = %request.request_id, reply_to = %reply_to, "echoed");
    Ok(())
}
