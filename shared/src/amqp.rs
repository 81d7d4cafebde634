use std::time::Duration;

use lapin::{
    options::{BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    publisher_confirm::Confirmation,
    types::FieldTable,
    Channel, Connection, ConnectionProperties, ExchangeKind,
};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::errors::PublishError;
use crate::tracer::create_amqp_headers_with_span_ctx;

/// Initial reconnect backoff.
const INITIAL_BACKOFF: Duration = Duration::from_secs(2);

/// Reconnect backoff ceiling.
const MAX_BACKOFF: Duration = Duration::from_secs(600);

/// Connects to the broker, retrying with exponential backoff (capped at
/// `MAX_BACKOFF`) until it succeeds. Never gives up: a broker that is down
/// at startup is expected to come back, and the service has nothing useful
/// to do until it does.
pub async fn connect_with_retry(uri: &str, connection_name: &str) -> Connection {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        let options = ConnectionProperties::default()
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio);

        match Connection::connect(uri, options).await {
            Ok(connection) => {
                info!(connection_name, "connected to rabbitmq");
                return connection;
            }
            Err(error) => {
                warn!(
                    connection_name,
                    ?error,
                    backoff_secs = backoff.as_secs(),
                    "failed to connect to rabbitmq, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, MAX_BACKOFF);
            }
        }
    }
}

/// Declares a durable topic exchange, idempotent if it already exists with
/// matching arguments.
pub async fn declare_topic_exchange(channel: &Channel, name: &str) -> Result<(), lapin::Error> {
    channel
        .exchange_declare(
            name,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
}

/// Declares a durable queue and binds it to an exchange under a routing key,
/// returning it so callers can read back the server-assigned message count.
pub async fn declare_and_bind_queue(
    channel: &Channel,
    queue: &str,
    exchange: &str,
    routing_key: &str,
) -> Result<(), lapin::Error> {
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    channel
        .queue_bind(
            queue,
            exchange,
            routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
}

/// Serializes `payload` as JSON and publishes it to `exchange` under
/// `routing_key`, injecting the current tracing span context into the AMQP
/// headers so a downstream consumer can correlate its own spans.
pub async fn publish_json<T: Serialize>(
    channel: &Channel,
    exchange: &str,
    routing_key: &str,
    payload: &T,
) -> anyhow::Result<Confirmation> {
    let body = serde_json::to_vec(payload)?;

    let headers = create_amqp_headers_with_span_ctx(&tracing::Span::current().context());

    let properties = lapin::BasicProperties::default()
        .with_content_type("application/json".into())
        .with_headers(lapin::types::FieldTable::from(headers));

    let confirm = channel
        .basic_publish(
            exchange,
            routing_key,
            BasicPublishOptions::default(),
            &body,
            properties,
        )
        .await?
        .await?;

    if let Confirmation::Nack(_) = confirm {
        error!(exchange, routing_key, "broker nacked publish");
    }

    Ok(confirm)
}

/// Publish-only wrapper around a lapin [`Channel`], held by both the toll
/// processor and the billing worker alongside their own consume-side
/// connection. The channel is set once after the owning service connects
/// (and re-set after every reconnect); until then, `publish_json` reports
/// [`PublishError::NotConnected`] so callers treat a not-yet-connected
/// publisher the same as any other transient failure.
pub struct RabbitMqPublisher {
    channel: RwLock<Option<Channel>>,
}

impl Default for RabbitMqPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl RabbitMqPublisher {
    pub fn new() -> Self {
        Self {
            channel: RwLock::new(None),
        }
    }

    /// Installs the channel to publish on, replacing whatever was there.
    /// Called once after (re)connecting.
    pub async fn set_channel(&self, channel: Channel) {
        *self.channel.write().await = Some(channel);
    }

    /// Drops the current channel, e.g. because the owning connection died.
    pub async fn clear(&self) {
        *self.channel.write().await = None;
    }

    pub async fn is_connected(&self) -> bool {
        self.channel.read().await.is_some()
    }

    /// Serializes and publishes `payload`, waiting for the broker's
    /// publisher-confirm (the `acks=all` equivalent). A `Nack` from the
    /// broker is surfaced as an error rather than swallowed: callers must
    /// never treat an unconfirmed publish as delivered.
    pub async fn publish_json<T: Serialize>(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &T,
    ) -> Result<(), PublishError> {
        let guard = self.channel.read().await;
        let channel = guard.as_ref().ok_or(PublishError::NotConnected)?;

        match publish_json(channel, exchange, routing_key, payload).await {
            Ok(Confirmation::Nack(_)) => Err(PublishError::Nacked),
            Ok(_) => Ok(()),
            Err(error) => match error.downcast::<lapin::Error>() {
                Ok(lapin_error) => Err(PublishError::Broker(lapin_error)),
                Err(other) => Err(PublishError::Serialize(
                    other
                        .downcast::<serde_json::Error>()
                        .expect("publish_json only returns lapin or serde_json errors"),
                )),
            },
        }
    }
}
