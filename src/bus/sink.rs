//! Kafka producer wrapper
//!
//! Payloads are enqueued for asynchronous delivery; after the whole batch
//! is enqueued the sink blocks until every delivery is acknowledged.
//! Delivery failures are logged, never raised, and never retried here.

use crate::config::BusProducerConfig;
use crate::error::Result;
use futures::future::join_all;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use tracing::{debug, error};

/// Producer end of the bus, bound to one topic
pub struct KafkaSink {
    topic: String,
    producer: FutureProducer,
}

impl KafkaSink {
    /// Create the producer
    pub fn new(config: &BusProducerConfig) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", config.bootstrap_servers.join(","))
            .create()?;
        Ok(Self {
            topic: config.topic.clone(),
            producer,
        })
    }

    /// Topic this sink produces to
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Enqueue every payload, then wait for all acknowledgments
    pub async fn send_batch(&self, payloads: &[String]) -> Result<()> {
        let mut deliveries = Vec::with_capacity(payloads.len());
        for payload in payloads {
            debug!(topic = self.topic, "producing message");
            match self
                .producer
                .send_result(FutureRecord::<(), String>::to(&self.topic).payload(payload))
            {
                Ok(delivery) => deliveries.push(delivery),
                Err((enqueue_error, _record)) => {
                    error!(
                        topic = self.topic,
                        error = %enqueue_error,
                        "failed to enqueue the message"
                    );
                }
            }
        }

        // Flush: block until every enqueued send is acknowledged
        for acknowledgment in join_all(deliveries).await {
            match acknowledgment {
                Ok(Ok((partition, offset))) => {
                    debug!(
                        topic = self.topic,
                        partition, offset, "delivered the message"
                    );
                }
                Ok(Err((delivery_error, _message))) => {
                    error!(
                        topic = self.topic,
                        error = %delivery_error,
                        "failed to produce the message"
                    );
                }
                Err(_cancelled) => {
                    error!(
                        topic = self.topic,
                        "delivery acknowledgment was cancelled before completion"
                    );
                }
            }
        }
        Ok(())
    }
}
