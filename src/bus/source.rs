//! Kafka consumer with a dedicated poll-loop task
//!
//! Offsets are auto-committed by the client on a timer, independent of
//! handler success: a crash after commit but before full handling loses the
//! message, and a handler error does not redeliver. Per-message failures
//! (bad JSON, handler errors) are logged and skipped; transport-level
//! errors are not caught and end the loop.

use super::MessageHandler;
use crate::config::BusConsumerConfig;
use crate::error::{Error, Result};
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::ClientConfig;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// How long one poll blocks before looping again
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Consumer end of the bus, bound to one topic and one handler
pub struct KafkaSource<H: MessageHandler> {
    topic: String,
    consumer: Option<StreamConsumer>,
    handler: Option<H>,
    worker: Option<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
}

impl<H: MessageHandler> KafkaSource<H> {
    /// Create the consumer and subscribe it to the configured topic
    pub fn new(config: &BusConsumerConfig, handler: H) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("auto.offset.reset", "earliest")
            .set("bootstrap.servers", config.bootstrap_servers.join(","))
            .set("enable.auto.commit", "true")
            .set("group.id", &config.group)
            .create()?;
        consumer.subscribe(&[&config.topic])?;

        Ok(Self {
            topic: config.topic.clone(),
            consumer: Some(consumer),
            handler: Some(handler),
            worker: None,
            shutdown: None,
        })
    }

    /// Start the poll loop on a dedicated task
    pub fn start(&mut self) -> Result<()> {
        let consumer = self
            .consumer
            .take()
            .ok_or_else(|| Error::config("bus source already started"))?;
        let handler = self
            .handler
            .take()
            .ok_or_else(|| Error::config("bus source already started"))?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let topic = self.topic.clone();

        self.worker = Some(tokio::spawn(poll_loop(
            consumer,
            handler,
            topic,
            shutdown_rx,
        )));
        self.shutdown = Some(shutdown_tx);
        Ok(())
    }

    /// Signal the poll loop to stop and wait for it to exit
    ///
    /// Cancellation is cooperative: an in-flight handler invocation runs to
    /// completion before the loop observes the signal.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(worker) = self.worker.take() {
            worker
                .await
                .map_err(|e| Error::Other(format!("bus poll loop panicked: {e}")))?;
        }
        Ok(())
    }
}

async fn poll_loop<H: MessageHandler>(
    consumer: StreamConsumer,
    mut handler: H,
    topic: String,
    shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            debug!(topic, "bus poll loop stopping");
            break;
        }
        match tokio::time::timeout(POLL_TIMEOUT, consumer.recv()).await {
            // No message within the poll window, loop again
            Err(_) => continue,
            // Transport-level errors end the loop
            Ok(Err(bus_error)) => {
                error!(topic, error = %bus_error, "fatal bus error, terminating the poll loop");
                break;
            }
            Ok(Ok(message)) => {
                let payload = message.payload().unwrap_or_default();
                process_payload(&mut handler, &topic, payload).await;
            }
        }
    }
}

/// Deserialize one payload and dispatch it, isolating failures
///
/// A deserialization failure or handler error never escapes to the poll
/// loop; the message is dropped with a log line.
pub(crate) async fn process_payload<H: MessageHandler>(
    handler: &mut H,
    topic: &str,
    payload: &[u8],
) {
    let message: H::Message = match serde_json::from_slice(payload) {
        Ok(message) => message,
        Err(deserialize_error) => {
            error!(
                topic,
                error = %deserialize_error,
                "failed to deserialize the message"
            );
            return;
        }
    };
    if let Err(handler_error) = handler.handle(message).await {
        error!(topic, error = %handler_error, "failed to handle the message");
    }
}
