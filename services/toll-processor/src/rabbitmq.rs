use std::sync::Arc;
use std::{thread, time};

use chrono::Utc;
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, ConfirmSelectOptions},
    types::{FieldTable, ShortString},
    Channel, Connection, Consumer,
};
use tokio::sync::RwLock;
use tokio_stream::StreamExt;
use tracing::{error, info, instrument, warn, Instrument};
use validator::Validate;

use shared::amqp::{connect_with_retry, declare_and_bind_queue, declare_topic_exchange, RabbitMqPublisher};
use shared::dto::{ErrorEnvelope, GpsFix};

use crate::config::AppConfig;
use crate::geofence::GeofenceIndex;
use crate::state::KeyedStateStore;
use crate::tracker;

/// Gets the value from the `type` property, defaulting to `unknown`.
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

/// What came of trying to process a single GPS fix delivery.
enum Outcome {
    /// Processed to completion, or skipped as an unrecoverable poison
    /// pill whose error envelope has already been published. Either way
    /// the delivery is acked so the partition keeps moving.
    Done,
    /// A dependency (state store, broker) failed in a way that might
    /// succeed on redelivery. The delivery is nacked and requeued.
    Transient,
}

/// Consumes GPS fixes from a single queue, folds each one through the
/// zone tracker, and publishes the resulting TollEvents. Holds both a
/// consume channel and a publish channel on the same connection, but
/// deliberately does not spawn a task per delivery: GPS fixes for one
/// vehicle must be folded through the tracker in arrival order, and
/// concurrent handling would let a later fix race and corrupt a
/// still-in-flight earlier one.
pub struct GpsIngestRabbitmq {
    rmq_uri: String,
    gps_exchange: String,
    gps_queue: String,
    gps_routing_key: String,
    consumer_tag: String,
    consumer_prefetch: u16,
    toll_event_exchange: String,
    error_exchange: String,

    connection: RwLock<Option<Connection>>,
    consume_channel: RwLock<Option<Channel>>,
    publisher: RabbitMqPublisher,

    state_store: Arc<dyn KeyedStateStore>,
    geofence: Arc<dyn GeofenceIndex>,
}

impl GpsIngestRabbitmq {
    pub fn new(
        cfg: &AppConfig,
        state_store: Arc<dyn KeyedStateStore>,
        geofence: Arc<dyn GeofenceIndex>,
    ) -> Self {
        Self {
            rmq_uri: cfg.rmq_uri.clone(),
            gps_exchange: cfg.gps_exchange.clone(),
            gps_queue: cfg.gps_queue.clone(),
            gps_routing_key: cfg.gps_routing_key.clone(),
            consumer_tag: cfg.gps_consumer_tag.clone(),
            consumer_prefetch: cfg.gps_consumer_prefetch,
            toll_event_exchange: cfg.toll_event_exchange.clone(),
            error_exchange: cfg.error_exchange.clone(),

            connection: RwLock::new(None),
            consume_channel: RwLock::new(None),
            publisher: RabbitMqPublisher::new(),

            state_store,
            geofence,
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
        let connection = connect_with_retry(&self.rmq_uri, "toll-processor").await;

        let publish_channel = connection.create_channel().await?;
        publish_channel.confirm_select(ConfirmSelectOptions::default()).await?;
        let consume_channel = connection.create_channel().await?;

        consume_channel
            .basic_qos(self.consumer_prefetch, BasicQosOptions::default())
            .await?;

        declare_topic_exchange(&consume_channel, &self.gps_exchange).await?;
        declare_topic_exchange(&consume_channel, &self.toll_event_exchange).await?;
        declare_topic_exchange(&consume_channel, &self.error_exchange).await?;
        declare_and_bind_queue(
            &consume_channel,
            &self.gps_queue,
            &self.gps_exchange,
            &self.gps_routing_key,
        )
        .await?;

        let mut consumer = consume_channel
            .basic_consume(
                &self.gps_queue,
                &self.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!("gps consumer started");

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

        info!("gps consumer stopped, stream ended");
        Ok(())
    }

    #[instrument(skip(self, delivery))]
    async fn process(&self, delivery: &Delivery) -> Outcome {
        let raw = String::from_utf8_lossy(&delivery.data).into_owned();

        let fix: GpsFix = match serde_json::from_slice(&delivery.data) {
            Ok(fix) => fix,
            Err(err) => {
                self.publish_poison_pill("DecodeError", err.to_string(), Some(raw))
                    .await;
                return Outcome::Done;
            }
        };

        if let Err(err) = fix.validate() {
            self.publish_poison_pill("ValidationError", err.to_string(), Some(raw))
                .await;
            return Outcome::Done;
        }

        if let Err(err) = tracker::validate_freshness(&fix, Utc::now()) {
            self.publish_poison_pill("StaleGpsFix", err.to_string(), Some(raw))
                .await;
            return Outcome::Done;
        }

        let prior_state = match self.state_store.get(&fix.vehicle_id).await {
            Ok(state) => state,
            Err(err) => {
                warn!(%err, vehicle_id = fix.vehicle_id, "state store unavailable, will retry");
                return Outcome::Transient;
            }
        };

        let zone = self.geofence.lookup(fix.latitude, fix.longitude).await;

        let outcome = tracker::process_gps_fix(&fix, prior_state.as_ref(), zone.as_ref(), Utc::now());

        // Publish before persisting: if the publish fails we nack and
        // retry, and a redelivery recomputes the identical outcome from
        // the still-intact prior state, so no toll event is ever lost
        // to a crash between publish and state write.
        if let Some(event) = &outcome.toll_event {
            if let Err(err) = self
                .publisher
                .publish_json(&self.toll_event_exchange, &fix.vehicle_id, event)
                .await
            {
                warn!(%err, vehicle_id = fix.vehicle_id, "failed to publish toll event, will retry");
                return Outcome::Transient;
            }
        }

        match outcome.next_state {
            Some(state) => {
                if let Err(err) = self.state_store.put(&fix.vehicle_id, &state).await {
                    warn!(%err, vehicle_id = fix.vehicle_id, "failed to persist vehicle state, will retry");
                    return Outcome::Transient;
                }
            }
            None if prior_state.is_some() => {
                if let Err(err) = self.state_store.delete(&fix.vehicle_id).await {
                    warn!(%err, vehicle_id = fix.vehicle_id, "failed to clear vehicle state, will retry");
                    return Outcome::Transient;
                }
            }
            None => {}
        }

        Outcome::Done
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
