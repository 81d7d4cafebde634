use std::{thread, time};

use chrono::Utc;
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, ConfirmSelectOptions},
    types::{FieldTable, ShortString},
    Channel, Connection, Consumer,
};
use sea_orm::DatabaseConnection;
use tokio::sync::RwLock;
use tokio_stream::StreamExt;
use tracing::{error, info, instrument, warn, Instrument};
use validator::Validate;

use shared::amqp::{connect_with_retry, declare_and_bind_queue, declare_topic_exchange, RabbitMqPublisher};
use shared::dto::{ErrorEnvelope, TollEvent};

use crate::billing::{self, BillingOutcome};
use crate::config::AppConfig;
use crate::payment::PaymentGateway;

fn get_delivery_type(delivery: &Delivery) -> String {
    delivery
        .properties
        .kind()
        .clone()
        .unwrap_or(ShortString::from("unknown"))
        .to_string()
}

async fn ack_delivery(delivery: &Delivery) {
    if let Err(err) = delivery.ack(BasicAckOptions::default()).await {
        error!(
            delivery_tag = delivery.delivery_tag,
            kind = get_delivery_type(delivery),
            %err,
            "failed to ack delivery"
        );
    }
}

async fn nack_delivery(delivery: &Delivery) {
    if let Err(err) = delivery
        .nack(BasicNackOptions {
            requeue: true,
            ..Default::default()
        })
        .await
    {
        error!(
            delivery_tag = delivery.delivery_tag,
            kind = get_delivery_type(delivery),
            %err,
            "failed to nack delivery"
        );
    }
}

/// What came of trying to process a single toll event delivery.
enum Outcome {
    /// Fully handled (charged, declined, or an already-seen duplicate).
    /// Either way the delivery is acked so the partition keeps moving.
    Done,
    /// A dependency failed in a way that might succeed on redelivery.
    Transient,
}

/// Consumes TollEvents from a single queue, runs each one through the
/// billing workflow, and publishes the resulting PaymentResult. Mirrors
/// the toll processor's `GpsIngestRabbitmq`: no per-delivery task
/// spawning, since a vehicle's payment results must be published in the
/// same order its toll events were charged.
pub struct BillingRabbitmq {
    rmq_uri: String,
    toll_event_exchange: String,
    toll_event_queue: String,
    toll_event_routing_key: String,
    consumer_tag: String,
    consumer_prefetch: u16,
    payment_result_exchange: String,
    error_exchange: String,

    connection: RwLock<Option<Connection>>,
    consume_channel: RwLock<Option<Channel>>,
    publisher: RabbitMqPublisher,

    db: DatabaseConnection,
    gateway: Box<dyn PaymentGateway>,
}

impl BillingRabbitmq {
    pub fn new(cfg: &AppConfig, db: DatabaseConnection, gateway: Box<dyn PaymentGateway>) -> Self {
        Self {
            rmq_uri: cfg.rmq_uri.clone(),
            toll_event_exchange: cfg.toll_event_exchange.clone(),
            toll_event_queue: cfg.toll_event_queue.clone(),
            toll_event_routing_key: cfg.toll_event_routing_key.clone(),
            consumer_tag: cfg.toll_event_consumer_tag.clone(),
            consumer_prefetch: cfg.toll_event_consumer_prefetch,
            payment_result_exchange: cfg.payment_result_exchange.clone(),
            error_exchange: cfg.error_exchange.clone(),

            connection: RwLock::new(None),
            consume_channel: RwLock::new(None),
            publisher: RabbitMqPublisher::new(),

            db,
            gateway,
        }
    }

    /// Runs an infinite reconnect loop around [`Self::connect_and_consume`].
    pub async fn start(&self) {
        let mut reconnect_delay = 2;
        let max_reconnect_delay = 60 * 10;

        loop {
            if let Err(err) = self.connect_and_consume().await {
                error!(%err, "rabbitmq connection error");
            }

            self.publisher.clear().await;
            *self.connection.write().await = None;
            *self.consume_channel.write().await = None;

            warn!(reconnect_delay, "reconnecting to rabbitmq");
            thread::sleep(time::Duration::from_secs(reconnect_delay));

            if reconnect_delay < max_reconnect_delay {
                reconnect_delay *= 2;
            }
        }
    }

    async fn connect_and_consume(&self) -> Result<(), lapin::Error> {
        let connection = connect_with_retry(&self.rmq_uri, "billing-worker").await;

        let publish_channel = connection.create_channel().await?;
        publish_channel.confirm_select(ConfirmSelectOptions::default()).await?;
        let consume_channel = connection.create_channel().await?;

        consume_channel
            .basic_qos(self.consumer_prefetch, BasicQosOptions::default())
            .await?;

        declare_topic_exchange(&consume_channel, &self.toll_event_exchange).await?;
        declare_topic_exchange(&consume_channel, &self.payment_result_exchange).await?;
        declare_topic_exchange(&consume_channel, &self.error_exchange).await?;
        declare_and_bind_queue(
            &consume_channel,
            &self.toll_event_queue,
            &self.toll_event_exchange,
            &self.toll_event_routing_key,
        )
        .await?;

        let mut consumer = consume_channel
            .basic_consume(
                &self.toll_event_queue,
                &self.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!("toll event consumer started");

        self.publisher.set_channel(publish_channel).await;
        *self.connection.write().await = Some(connection);
        *self.consume_channel.write().await = Some(consume_channel);

        self.consume_until_error(&mut consumer).await
    }

    async fn consume_until_error(&self, consumer: &mut Consumer) -> Result<(), lapin::Error> {
        while let Some(delivery) = consumer.next().await {
            let delivery = delivery?;
            let (span, delivery) = shared::tracer::correlate_trace_from_delivery(delivery);

            async {
                match self.process(&delivery).await {
                    Outcome::Done => ack_delivery(&delivery).await,
                    Outcome::Transient => nack_delivery(&delivery).await,
                }
            }
            .instrument(span)
            .await;
        }

        info!("toll event consumer stopped, stream ended");
        Ok(())
    }

    #[instrument(skip(self, delivery))]
    async fn process(&self, delivery: &Delivery) -> Outcome {
        let raw = String::from_utf8_lossy(&delivery.data).into_owned();

        let event: TollEvent = match serde_json::from_slice(&delivery.data) {
            Ok(event) => event,
            Err(err) => {
                self.publish_poison_pill("DecodeError", err.to_string(), Some(raw))
                    .await;
                return Outcome::Done;
            }
        };

        if let Err(err) = event.validate() {
            self.publish_poison_pill("ValidationError", err.to_string(), Some(raw))
                .await;
            return Outcome::Done;
        }

        match billing::process_toll_event(&self.db, self.gateway.as_ref(), &event).await {
            BillingOutcome::AlreadyHandled => Outcome::Done,
            BillingOutcome::Transient => Outcome::Transient,
            BillingOutcome::Processed { result, persisted } => {
                let published = self
                    .publisher
                    .publish_json(&self.payment_result_exchange, &event.vehicle_id, &result)
                    .await;

                match published {
                    Ok(()) if persisted => Outcome::Done,
                    Ok(()) => {
                        warn!(
                            event_id = event.event_id,
                            "payment result published but final status failed to persist, will retry"
                        );
                        Outcome::Transient
                    }
                    Err(err) => {
                        warn!(%err, event_id = event.event_id, "failed to publish payment result, will retry");
                        Outcome::Transient
                    }
                }
            }
        }
    }

    pub async fn publisher_connected(&self) -> bool {
        self.publisher.is_connected().await
    }

    async fn publish_poison_pill(&self, error_type: &str, message: String, payload: Option<String>) {
        let envelope = ErrorEnvelope::new(error_type, message, payload, None, None, Utc::now().timestamp_millis());

        if let Err(err) = self
            .publisher
            .publish_json(&self.error_exchange, error_type, &envelope)
            .await
        {
            error!(%err, error_type, "failed to publish error envelope, skipping anyway");
        }
    }

    /// Closes the publish/consume channels and connection, e.g. on shutdown.
    pub async fn shutdown(&self) {
        self.publisher.clear().await;

        if let Some(chan) = self.consume_channel.read().await.as_ref() {
            if let Err(err) = chan.close(200, "user shutdown").await {
                warn!(%err, "failed to close consume channel");
            }
        }

        if let Some(conn) = self.connection.read().await.as_ref() {
            if let Err(err) = conn.close(200, "user shutdown").await {
                warn!(%err, "failed to close connection");
            }
        }

        *self.consume_channel.write().await = None;
        *self.connection.write().await = None;
    }
}
