//! # Riverwatch Kafka
//!
//! The publishing fabric: multiplexes normalized events onto one or more
//! Kafka-family brokers by topic class.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐              ┌──────────────────────────┐
//! │  poller  │─┐            │ Publisher                │
//! └──────────┘ │  events    │  kind → topic → broker   │──▶ broker A
//! ┌──────────┐ ├──────────▶ │  (first broker that      │
//! │ ingress  │─┘            │   advertises the topic)  │──▶ broker B
//! └──────────┘              └──────────────────────────┘
//! ```
//!
//! # Delivery semantics
//!
//! Writes are asynchronous and batched by the underlying producer.
//! [`Publisher::publish`] never blocks: a full local queue surfaces as a
//! backpressure error and the caller drops the event. On shutdown,
//! [`Publisher::flush`] drains each broker within a deadline and reports
//! whatever could not be delivered as abandoned.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use rdkafka::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use riverwatch_core::{CollectorError, MessageKind, NormalizedEvent};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// The static message-kind → topic map.
#[must_use]
pub const fn topic_for(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Power => "cray-telemetry-power",
        MessageKind::Voltage => "cray-telemetry-voltage",
        MessageKind::Temperature => "cray-telemetry-temperature",
        MessageKind::ResourceEvent => "cray-dmtf-resource-event",
    }
}

/// One broker entry from the broker-list JSON file.
///
/// ```json
/// [{"BrokerAddress": "kafka-1:9092", "Topics": ["cray-telemetry-power"]}]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Bootstrap address of the broker.
    #[serde(rename = "BrokerAddress")]
    pub address: String,
    /// Topics this broker advertises.
    #[serde(rename = "Topics")]
    pub topics: Vec<String>,
}

/// Parse the broker-list JSON document.
///
/// # Errors
///
/// Returns [`CollectorError::Config`] when the document does not parse or
/// names no brokers.
pub fn parse_broker_list(body: &[u8]) -> Result<Vec<BrokerConfig>, CollectorError> {
    let brokers: Vec<BrokerConfig> = serde_json::from_slice(body)
        .map_err(|e| CollectorError::Config(format!("broker list: {e}")))?;
    if brokers.is_empty() {
        return Err(CollectorError::Config(
            "broker list names no brokers".to_string(),
        ));
    }
    Ok(brokers)
}

struct Broker {
    address: String,
    topics: HashSet<String>,
    producer: FutureProducer,
}

/// What happened during a flush pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    /// Messages still unacknowledged when the deadline expired.
    pub abandoned: usize,
}

/// Multiplexes normalized events to broker connections by topic.
pub struct Publisher {
    brokers: Vec<Broker>,
    closed: AtomicBool,
}

impl Publisher {
    /// Build one producer per configured broker.
    ///
    /// Producer construction is lazy about connectivity: an unreachable
    /// broker shows up as delivery failures later, not here.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Config`] when a producer cannot be built
    /// from a broker entry.
    pub fn new(configs: &[BrokerConfig], message_timeout: Duration) -> Result<Self, CollectorError> {
        let mut brokers = Vec::with_capacity(configs.len());
        for config in configs {
            let producer: FutureProducer = ClientConfig::new()
                .set("bootstrap.servers", &config.address)
                .set("message.timeout.ms", message_timeout.as_millis().to_string())
                .set("acks", "1")
                .create()
                .map_err(|e| {
                    CollectorError::Config(format!("producer for {}: {e}", config.address))
                })?;

            tracing::info!(
                broker = %config.address,
                topics = ?config.topics,
                "broker producer created"
            );

            brokers.push(Broker {
                address: config.address.clone(),
                topics: config.topics.iter().cloned().collect(),
                producer,
            });
        }

        Ok(Self {
            brokers,
            closed: AtomicBool::new(false),
        })
    }

    /// Number of broker connections held.
    #[must_use]
    pub fn broker_count(&self) -> usize {
        self.brokers.len()
    }

    /// Publish a normalized event to its topic.
    ///
    /// Routing consults the static kind → topic map and picks the first
    /// broker advertising that topic; an event no broker wants is logged,
    /// counted, and dropped without error.
    ///
    /// # Errors
    ///
    /// [`CollectorError::Backpressure`] when the producer's local queue is
    /// full — the caller drops the event; [`CollectorError::Transport`] for
    /// other enqueue failures.
    pub fn publish(&self, event: &NormalizedEvent) -> Result<(), CollectorError> {
        let topic = topic_for(event.message_kind);
        let payload = serde_json::to_vec(event)
            .map_err(|e| CollectorError::Parse(format!("event serialization: {e}")))?;
        self.publish_bytes(topic, &payload)
    }

    /// Publish a pre-serialized body to the topic for a message kind.
    ///
    /// Used by the ingress path to forward Redfish resource events verbatim.
    ///
    /// # Errors
    ///
    /// As [`publish`](Self::publish).
    pub fn publish_raw(&self, kind: MessageKind, payload: &[u8]) -> Result<(), CollectorError> {
        self.publish_bytes(topic_for(kind), payload)
    }

    fn publish_bytes(&self, topic: &str, payload: &[u8]) -> Result<(), CollectorError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CollectorError::Shutdown);
        }
        let Some(broker) = self.brokers.iter().find(|b| b.topics.contains(topic)) else {
            tracing::warn!(topic, "no broker advertises topic, dropping event");
            metrics::counter!("riverwatch_events_unrouted_total").increment(1);
            return Ok(());
        };

        // No key: partitioning stays round-robin.
        let record = FutureRecord::<(), _>::to(topic).payload(payload);
        match broker.producer.send_result(record) {
            Ok(_delivery) => {
                // Delivery completes in the background; stragglers are
                // accounted for at flush time.
                metrics::counter!("riverwatch_events_published_total", "topic" => topic.to_string())
                    .increment(1);
                Ok(())
            }
            Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), _)) => {
                Err(CollectorError::Backpressure {
                    topic: topic.to_string(),
                })
            }
            Err((err, _)) => {
                tracing::error!(topic, broker = %broker.address, error = %err, "enqueue failed");
                Err(CollectorError::Transport(err.to_string()))
            }
        }
    }

    /// Flush every broker, bounded by a deadline. Part of the shutdown
    /// contract: the publisher stops accepting new events first, then drains.
    ///
    /// Records still unacknowledged after the deadline are counted as
    /// abandoned and reported, never waited on.
    pub async fn flush(&self, deadline: Duration) -> FlushReport {
        self.closed.store(true, Ordering::Release);
        let mut report = FlushReport::default();

        for broker in &self.brokers {
            let producer = broker.producer.clone();
            let address = broker.address.clone();
            let flushed = tokio::task::spawn_blocking(move || {
                let outcome = producer.flush(Timeout::After(deadline));
                #[allow(clippy::cast_sign_loss)]
                let remaining = producer.in_flight_count().max(0) as usize;
                (outcome, remaining)
            })
            .await;

            match flushed {
                Ok((Ok(()), remaining)) | Ok((Err(_), remaining)) => {
                    if remaining > 0 {
                        tracing::warn!(
                            broker = %address,
                            abandoned = remaining,
                            "flush deadline expired with messages still in flight"
                        );
                        metrics::counter!("riverwatch_events_abandoned_total")
                            .increment(remaining as u64);
                        report.abandoned += remaining;
                    } else {
                        tracing::info!(broker = %address, "broker flushed clean");
                    }
                }
                Err(join_err) => {
                    tracing::error!(broker = %address, error = %join_err, "flush task failed");
                }
            }
        }

        report
    }
}
