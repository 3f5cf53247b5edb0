//! Message bus source and sink
//!
//! Consumer and producer abstraction over a durable, partitioned,
//! at-least-once Kafka log. The source runs an unbounded poll loop on a
//! dedicated task and dispatches each deserialized message to a
//! [`MessageHandler`]; the sink enqueues a batch of payloads and blocks
//! until every delivery is acknowledged.

mod sink;
mod source;

pub use sink::KafkaSink;
pub use source::KafkaSource;

use crate::error::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// Callback invoked for every successfully deserialized inbound message
///
/// Invocations are strictly sequential and in bus-delivery order; a handler
/// error is logged and the next message is processed.
#[async_trait]
pub trait MessageHandler: Send + 'static {
    /// Wire shape this handler consumes
    type Message: DeserializeOwned + Send;

    /// Handle one message to completion
    async fn handle(&mut self, message: Self::Message) -> Result<()>;
}
