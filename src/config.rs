//! Worker configuration
//!
//! The process is configured entirely through environment variables, one
//! running mode per process: an extractor consumes jobs and produces
//! batches, a loader consumes batches.

use crate::error::{Error, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default port for the health endpoint
const DEFAULT_HEALTH_PORT: u16 = 8080;

/// Wait applied before connecting to the bus, giving the broker time to
/// come up when the whole stack starts together
pub const BROKER_STARTUP_DELAY: Duration = Duration::from_secs(15);

// ============================================================================
// Running Mode
// ============================================================================

/// Which half of the pipeline this process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningMode {
    /// Consume jobs, extract pages, produce batch envelopes
    Extractor,
    /// Consume batch envelopes, bulk-insert into the warehouse
    Loader,
}

impl FromStr for RunningMode {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "extractor" => Ok(Self::Extractor),
            "loader" => Ok(Self::Loader),
            other => Err(Error::invalid_value(
                "RUNNING_MODE",
                format!("expected 'extractor' or 'loader', got '{other}'"),
            )),
        }
    }
}

// ============================================================================
// Bus Configuration
// ============================================================================

/// Consumer end of the bus
#[derive(Debug, Clone)]
pub struct BusConsumerConfig {
    /// Broker bootstrap endpoints
    pub bootstrap_servers: Vec<String>,
    /// Consumer group id
    pub group: String,
    /// Topic to subscribe to
    pub topic: String,
}

/// Producer end of the bus
#[derive(Debug, Clone)]
pub struct BusProducerConfig {
    /// Broker bootstrap endpoints
    pub bootstrap_servers: Vec<String>,
    /// Topic to produce to
    pub topic: String,
}

// ============================================================================
// Worker Configuration
// ============================================================================

/// Full configuration of one worker process
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Extractor or loader
    pub mode: RunningMode,
    /// Inbound message bus
    pub consumer: BusConsumerConfig,
    /// Outbound message bus; present only in extractor mode
    pub producer: Option<BusProducerConfig>,
    /// Port the health endpoint listens on
    pub health_port: u16,
}

impl WorkerConfig {
    /// Load the configuration from the process environment
    pub fn from_env() -> Result<Self> {
        let mode: RunningMode = required_var("RUNNING_MODE")?.parse()?;

        let consumer = BusConsumerConfig {
            bootstrap_servers: split_servers(&required_var("SOURCE_BOOTSTRAP_SERVERS")?),
            group: required_var("SOURCE_GROUP")?,
            topic: required_var("SOURCE_TOPIC")?,
        };

        let producer = if mode == RunningMode::Extractor {
            Some(BusProducerConfig {
                bootstrap_servers: split_servers(&required_var("SINK_BOOTSTRAP_SERVERS")?),
                topic: required_var("SINK_TOPIC")?,
            })
        } else {
            None
        };

        let health_port = match env::var("HEALTH_PORT") {
            Ok(value) => value
                .parse()
                .map_err(|_| Error::invalid_value("HEALTH_PORT", "expected a port number"))?,
            Err(_) => DEFAULT_HEALTH_PORT,
        };

        Ok(Self {
            mode,
            consumer,
            producer,
            health_port,
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::missing_field(name))
}

fn split_servers(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}
