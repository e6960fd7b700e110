//! The typed event consumer and its configuration.

use crate::ack::{AckDecision, Acknowledge, PendingDelivery};
use crate::envelope::{decode, UNKNOWN_TYPE};
use crate::error::WorkerError;
use crate::outcome::ProcessingOutcome;
use crate::registry::HandlerRegistry;
use crate::stats::{format_uptime, ConsumerStats, DEFAULT_SUMMARY_INTERVAL};
use futures_util::{Stream, StreamExt};
use lapin::{
    acker::Acker,
    message::Delivery,
    options::{BasicCancelOptions, BasicConsumeOptions, BasicQosOptions, QueueDeclareOptions},
    types::FieldTable,
    Channel, Connection, ConnectionProperties, Consumer,
};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use url::Url;

/// At most one unacknowledged delivery per consumer; processing is strictly serial.
pub const PREFETCH_COUNT: u16 = 1;

pub const DEFAULT_QUEUE: &str = "javascript_queue";

const DEFAULT_BROKER_URL: &str = "amqp://localhost/%2f";

/// Configuration for an `EventConsumer`.
///
/// Use `WorkerConfig::builder()` or `WorkerConfig::from_env()` to construct it.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// The durable queue this consumer owns.
    pub queue_name: String,
    /// The AMQP URL for connecting to the RabbitMQ broker.
    pub rabbitmq_url: Url,
    /// A unique identifier for the consumer on this queue.
    pub consumer_tag: String,
    /// Deliveries between periodic summaries; 0 disables them.
    pub summary_interval: u64,
    /// Upper bound on a single handler run. `None` lets handlers run indefinitely.
    pub handler_timeout: Option<Duration>,
}

impl WorkerConfig {
    /// Creates a new `WorkerConfigBuilder` to start building the worker configuration.
    ///
    /// # Arguments
    /// * `queue_name` - The name of the queue to consume from.
    /// * `rabbitmq_url` - The connection URL for the RabbitMQ broker.
    pub fn builder(queue_name: String, rabbitmq_url: Url) -> WorkerConfigBuilder {
        WorkerConfigBuilder::new(queue_name, rabbitmq_url)
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, WorkerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// `RABBITMQ_URL` wins over the individual `RABBITMQ_HOST`, `RABBITMQ_PORT`,
    /// `RABBITMQ_USER` and `RABBITMQ_PASSWORD` settings.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, WorkerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let rabbitmq_url = match lookup("RABBITMQ_URL") {
            Some(url) => parse_broker_url(&url)?,
            None => {
                let port = get("RABBITMQ_PORT", "5672");
                let port: u16 = port
                    .parse()
                    .map_err(|_| WorkerError::config(format!("RABBITMQ_PORT must be a port number, got '{}'", port)))?;
                broker_url(
                    &get("RABBITMQ_HOST", "localhost"),
                    port,
                    &get("RABBITMQ_USER", "guest"),
                    &get("RABBITMQ_PASSWORD", "guest"),
                )?
            }
        };

        let mut builder = Self::builder(get("CONSUMER_QUEUE", DEFAULT_QUEUE), rabbitmq_url);

        if let Some(tag) = lookup("CONSUMER_TAG") {
            builder = builder.consumer_tag(tag);
        }
        if let Some(interval) = lookup("SUMMARY_INTERVAL") {
            let interval: u64 = interval.parse().map_err(|_| {
                WorkerError::config(format!("SUMMARY_INTERVAL must be a non-negative integer, got '{}'", interval))
            })?;
            builder = builder.summary_interval(interval);
        }
        if let Some(timeout) = lookup("HANDLER_TIMEOUT_MS") {
            let millis: u64 = timeout.parse().map_err(|_| {
                WorkerError::config(format!("HANDLER_TIMEOUT_MS must be a number of milliseconds, got '{}'", timeout))
            })?;
            builder = builder.handler_timeout(Duration::from_millis(millis));
        }

        Ok(builder.build())
    }

    /// The broker URL with any password masked, for logging.
    pub fn redacted_url(&self) -> String {
        let mut url = self.rabbitmq_url.clone();
        if url.password().is_some() {
            // Only fails for URLs without a host, which cannot carry a password.
            let _ = url.set_password(Some("***"));
        }
        url.to_string()
    }
}

fn parse_broker_url(raw: &str) -> Result<Url, WorkerError> {
    let url = Url::parse(raw).map_err(|e| WorkerError::config(format!("RABBITMQ_URL is not a valid URL: {}", e)))?;
    match url.scheme() {
        "amqp" | "amqps" => Ok(url),
        other => Err(WorkerError::config(format!(
            "RABBITMQ_URL must use the amqp or amqps scheme, got '{}'",
            other
        ))),
    }
}

/// Assembles the broker URL on the default vhost.
///
/// Credentials are percent-encoded in full so reserved characters in a
/// password cannot change how the URL splits.
fn broker_url(host: &str, port: u16, user: &str, password: &str) -> Result<Url, WorkerError> {
    let invalid = |what: &str| WorkerError::config(format!("{} cannot be used in a broker URL", what));

    let mut url = Url::parse(DEFAULT_BROKER_URL).map_err(|e| WorkerError::config(e.to_string()))?;
    url.set_host(Some(host))
        .map_err(|e| WorkerError::config(format!("RABBITMQ_HOST '{}' is invalid: {}", host, e)))?;
    url.set_port(Some(port)).map_err(|_| invalid("RABBITMQ_PORT"))?;
    url.set_username(&urlencoding::encode(user))
        .map_err(|_| invalid("RABBITMQ_USER"))?;
    let password = urlencoding::encode(password);
    url.set_password(Some(&*password))
        .map_err(|_| invalid("RABBITMQ_PASSWORD"))?;
    Ok(url)
}

/// A builder for creating `WorkerConfig` instances.
pub struct WorkerConfigBuilder {
    queue_name: String,
    rabbitmq_url: Url,
    consumer_tag: Option<String>,
    summary_interval: Option<u64>,
    handler_timeout: Option<Duration>,
}

impl WorkerConfigBuilder {
    /// Creates a new builder with the required fields.
    fn new(queue_name: String, rabbitmq_url: Url) -> Self {
        Self {
            queue_name,
            rabbitmq_url,
            consumer_tag: None,
            summary_interval: None,
            handler_timeout: None,
        }
    }

    /// Sets a custom consumer tag.
    /// Defaults to `{queue_name}_consumer` if not set.
    pub fn consumer_tag(mut self, consumer_tag: String) -> Self {
        self.consumer_tag = Some(consumer_tag);
        self
    }

    /// Sets how many deliveries pass between periodic summaries.
    /// Defaults to 10.
    pub fn summary_interval(mut self, interval: u64) -> Self {
        self.summary_interval = Some(interval);
        self
    }

    /// Fails (and requeues) deliveries whose handler runs longer than `timeout`.
    pub fn handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }

    /// Builds the final `WorkerConfig`, applying defaults for any unset options.
    pub fn build(self) -> WorkerConfig {
        let queue_name = self.queue_name;
        WorkerConfig {
            consumer_tag: self.consumer_tag.unwrap_or_else(|| format!("{}_consumer", queue_name)),
            summary_interval: self.summary_interval.unwrap_or(DEFAULT_SUMMARY_INTERVAL),
            handler_timeout: self.handler_timeout,
            queue_name,
            rabbitmq_url: self.rabbitmq_url,
        }
    }
}

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReport {
    pub sequence: u64,
    pub event_type: String,
    pub outcome: ProcessingOutcome,
    pub decision: AckDecision,
    /// Wall time from receipt until the outcome was known, failures included.
    pub elapsed: Duration,
}

/// One delivery as taken off the queue, before it is decoded.
pub struct IncomingDelivery<A> {
    pub data: Vec<u8>,
    pub delivery: PendingDelivery<A>,
    pub redelivered: bool,
}

impl From<Delivery> for IncomingDelivery<Acker> {
    fn from(delivery: Delivery) -> Self {
        let Delivery {
            delivery_tag,
            redelivered,
            data,
            acker,
            ..
        } = delivery;
        IncomingDelivery {
            data,
            delivery: PendingDelivery::new(delivery_tag, acker),
            redelivered,
        }
    }
}

/// Consumes one queue, dispatching each delivery by its type tag.
pub struct EventConsumer {
    registry: HandlerRegistry,
    config: WorkerConfig,
    stats: ConsumerStats,
    sequence: u64,
}

impl EventConsumer {
    /// Creates a new consumer. The configured handler timeout is applied to the registry.
    pub fn new(registry: HandlerRegistry, config: WorkerConfig) -> Self {
        let registry = registry.with_timeout(config.handler_timeout);
        let stats = ConsumerStats::new(config.summary_interval);
        Self {
            registry,
            config,
            stats,
            sequence: 0,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn stats(&self) -> &ConsumerStats {
        &self.stats
    }

    /// Decodes, dispatches and settles a single delivery, then records it.
    ///
    /// Decode and handler failures are absorbed here. Only a failure to
    /// settle the delivery with the broker is returned as an error, after the
    /// delivery has been counted.
    pub async fn process_delivery<A: Acknowledge>(
        &mut self,
        data: &[u8],
        delivery: PendingDelivery<A>,
        redelivered: bool,
    ) -> Result<DeliveryReport, WorkerError> {
        let start = Instant::now();
        self.sequence += 1;
        let sequence = self.sequence;

        let (event_type, correlation_id, outcome) = match decode(data) {
            Ok(envelope) => {
                log::info!(
                    "MSG #{:03} | {:<20} | from {} | Processing...{}",
                    sequence,
                    envelope.event_type(),
                    envelope.meta().producer,
                    if redelivered { " (redelivered)" } else { "" }
                );
                let outcome = self.registry.dispatch(&envelope).await;
                (
                    envelope.event_type().to_string(),
                    envelope.meta().correlation_id.clone(),
                    outcome,
                )
            }
            Err(err) => (
                UNKNOWN_TYPE.to_string(),
                "unknown".to_string(),
                ProcessingOutcome::from(&err),
            ),
        };

        let elapsed = start.elapsed();
        let decision = AckDecision::for_outcome(&outcome);
        let settled = delivery.settle(decision).await;
        let summary_due = self.stats.record(&outcome, &event_type);

        match &outcome {
            ProcessingOutcome::Success { elapsed } => log::info!(
                "MSG #{:03} | {:<20} | {:.2}s | ID: {} | Uptime: {} | {}",
                sequence,
                event_type,
                elapsed.as_secs_f64(),
                correlation_id,
                format_uptime(self.stats.uptime()),
                decision
            ),
            ProcessingOutcome::DecodeFailure { reason } | ProcessingOutcome::HandlerFailure { reason } => {
                log::error!(
                    "MSG #{:03} | {:<20} | {:.2}s | failed: {} | {}",
                    sequence,
                    event_type,
                    elapsed.as_secs_f64(),
                    reason,
                    decision
                )
            }
        }

        if summary_due {
            log::info!("{}", self.stats.summary().periodic_report());
        }

        settled?;
        Ok(DeliveryReport {
            sequence,
            event_type,
            outcome,
            decision,
            elapsed,
        })
    }

    /// Connects to RabbitMQ and processes deliveries until `shutdown` flips to
    /// `true` (or its sender is dropped) or the transport fails.
    ///
    /// The in-flight delivery is always settled before the loop exits. The
    /// final summary is logged on every exit path.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), WorkerError> {
        log::info!(
            "Connecting to {} for queue '{}' (prefetch {})...",
            self.config.redacted_url(),
            self.config.queue_name,
            PREFETCH_COUNT
        );

        let connection = match Connection::connect(self.config.rabbitmq_url.as_str(), ConnectionProperties::default()).await {
            Ok(connection) => connection,
            Err(e) => {
                self.log_final_summary();
                return Err(e.into());
            }
        };

        let result = match self.open_consumer(&connection).await {
            Ok((channel, consumer)) => {
                let tag = consumer.tag().as_str().to_string();
                let mut deliveries = consumer
                    .map(|delivery| delivery.map(IncomingDelivery::from).map_err(WorkerError::from));
                let result = self.consume(&mut deliveries, &mut shutdown).await;
                if result.is_ok() {
                    if let Err(e) = channel.basic_cancel(&tag, BasicCancelOptions::default()).await {
                        log::warn!("Failed to cancel consumer '{}': {}", tag, e);
                    }
                }
                self.log_final_summary();
                if let Err(e) = channel.close(200, "consumer shutting down").await {
                    log::debug!("Channel close failed: {}", e);
                }
                result
            }
            Err(e) => {
                self.log_final_summary();
                Err(e)
            }
        };

        if let Err(e) = connection.close(200, "consumer shutting down").await {
            log::debug!("Connection close failed: {}", e);
        }
        log::info!("Consumer for queue '{}' stopped.", self.config.queue_name);
        result
    }

    /// Declares the queue, limits prefetch and subscribes.
    async fn open_consumer(&self, connection: &Connection) -> Result<(Channel, Consumer), WorkerError> {
        let channel = connection.create_channel().await?;

        channel
            .queue_declare(
                &self.config.queue_name,
                QueueDeclareOptions { durable: true, ..Default::default() },
                FieldTable::default(),
            )
            .await?;
        log::info!("Queue '{}' declared.", self.config.queue_name);

        channel.basic_qos(PREFETCH_COUNT, BasicQosOptions::default()).await?;

        let consumer = channel
            .basic_consume(
                &self.config.queue_name,
                &self.config.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        log::info!(
            "Consumer started with tag '{}'. Handling: {}. Waiting for messages...",
            consumer.tag().as_str(),
            self.registry.event_types().join(", ")
        );
        Ok((channel, consumer))
    }

    /// Processes deliveries one at a time until shutdown or the stream ends.
    ///
    /// Shutdown is only observed between deliveries, so a delivery already
    /// taken is always settled. An exhausted stream is a
    /// [`WorkerError::StreamClosed`].
    pub async fn consume<S, A>(
        &mut self,
        deliveries: &mut S,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), WorkerError>
    where
        S: Stream<Item = Result<IncomingDelivery<A>, WorkerError>> + Unpin,
        A: Acknowledge,
    {
        loop {
            if *shutdown.borrow() {
                log::info!("Shutdown requested, no further deliveries will be taken");
                return Ok(());
            }

            let delivery = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        log::info!("Shutdown handle dropped, stopping consumer");
                        return Ok(());
                    }
                    continue;
                }
                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => delivery,
                    Some(Err(e)) => return Err(e),
                    None => {
                        return Err(WorkerError::StreamClosed {
                            queue: self.config.queue_name.clone(),
                        })
                    }
                },
            };

            // Processed outside the select so shutdown cannot interrupt it.
            let IncomingDelivery {
                data,
                delivery,
                redelivered,
            } = delivery;
            self.process_delivery(&data, delivery, redelivered).await?;
        }
    }

    fn log_final_summary(&self) {
        log::info!("{}", self.stats.summary().final_report());
    }
}

/// Flips `shutdown` to `true` once `signal` resolves.
///
/// When the signal cannot be listened for, the sender is held forever:
/// dropping it would stop the consumer.
pub async fn forward_shutdown<F>(signal: F, shutdown: watch::Sender<bool>)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            log::info!("Shutdown signal received. Finishing the current delivery and shutting down.");
            let _ = shutdown.send(true);
        }
        Err(e) => {
            log::error!("Failed to listen for the shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
