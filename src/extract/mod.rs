//! Extraction side of the pipeline
//!
//! A [`SourceConnector`] is constructed per job from the [`SourceRegistry`]
//! and driven to completion by the [`ExtractorManager`]'s message handler.
//! Each extracted page is remapped and emitted as one [`DataBatch`] to a
//! [`BatchHandler`]; the manager's handler wraps batches in a
//! [`BatchEnvelope`] and forwards them to the bus sink.

pub mod billing;
pub mod catalog;
pub mod warehouse;

pub use billing::BillingSource;
pub use catalog::CatalogSource;
pub use warehouse::WarehouseSource;

use crate::bus::{KafkaSink, KafkaSource, MessageHandler};
use crate::config::{BusConsumerConfig, BusProducerConfig, BROKER_STARTUP_DELAY};
use crate::error::{Error, Result};
use crate::model::{BatchEnvelope, DataBatch, DestinationSpec, Job, SourceSpec};
use crate::service::ServiceManager;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

// ============================================================================
// Connector Traits
// ============================================================================

/// Receives the batches a source connector emits, one per page
#[async_trait]
pub trait BatchHandler: Send {
    /// Called once per extracted page, in extraction order
    async fn on_batch(&mut self, batch: DataBatch) -> Result<()>;
}

/// Pluggable extraction capability for one external system type
#[async_trait]
pub trait SourceConnector: Send {
    /// Drive the pagination loop to completion, emitting one batch per page
    ///
    /// Any extraction or transform failure propagates to the caller; no
    /// partial progress is checkpointed.
    async fn extract_and_transform(&mut self, handler: &mut dyn BatchHandler) -> Result<()>;
}

// ============================================================================
// Source Registry
// ============================================================================

/// Constructor for one source connector type
pub type SourceFactory = fn(&str, &SourceSpec) -> Result<Box<dyn SourceConnector>>;

/// Maps a source type tag to a connector factory
pub struct SourceRegistry {
    factories: HashMap<String, SourceFactory>,
}

impl SourceRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with all built-in source connectors
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("billing", |job_id, spec| {
            Ok(Box::new(BillingSource::new(job_id, spec)?))
        });
        registry.register("warehouse", |job_id, spec| {
            Ok(Box::new(WarehouseSource::new(job_id, spec)?))
        });
        registry.register("catalog", |job_id, spec| {
            Ok(Box::new(CatalogSource::new(job_id, spec)?))
        });
        registry
    }

    /// Register a factory under a type tag (stored case-insensitively)
    pub fn register(&mut self, kind: &str, factory: SourceFactory) {
        self.factories.insert(kind.to_lowercase(), factory);
    }

    /// Construct the connector for a job's source type
    pub fn create(
        &self,
        kind: &str,
        job_id: &str,
        spec: &SourceSpec,
    ) -> Result<Box<dyn SourceConnector>> {
        let factory = self
            .factories
            .get(&kind.to_lowercase())
            .ok_or_else(|| Error::unknown_connector("source", kind))?;
        factory(job_id, spec)
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

// ============================================================================
// Extractor Manager
// ============================================================================

/// Owns the inbound job consumer and the outbound batch sink
pub struct ExtractorManager {
    consumer_config: BusConsumerConfig,
    producer_config: BusProducerConfig,
    source: Option<KafkaSource<ExtractorHandler>>,
}

impl ExtractorManager {
    /// Create an unprepared manager from the bus configuration
    pub fn new(consumer_config: BusConsumerConfig, producer_config: BusProducerConfig) -> Self {
        Self {
            consumer_config,
            producer_config,
            source: None,
        }
    }
}

#[async_trait]
impl ServiceManager for ExtractorManager {
    fn name(&self) -> &str {
        "extractor"
    }

    async fn prepare(&mut self) -> Result<()> {
        // Give the bus broker time to become reachable
        tokio::time::sleep(BROKER_STARTUP_DELAY).await;
        let sink = Arc::new(KafkaSink::new(&self.producer_config)?);
        let handler = ExtractorHandler {
            registry: SourceRegistry::builtin(),
            sink,
        };
        self.source = Some(KafkaSource::new(&self.consumer_config, handler)?);
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        self.source
            .as_mut()
            .ok_or_else(|| Error::config("extractor manager is not prepared"))?
            .start()
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(source) = &mut self.source {
            source.stop().await?;
        }
        Ok(())
    }
}

// ============================================================================
// Message Handler
// ============================================================================

/// Handles one inbound job: connector lookup, extraction, batch forwarding
struct ExtractorHandler {
    registry: SourceRegistry,
    sink: Arc<KafkaSink>,
}

#[async_trait]
impl MessageHandler for ExtractorHandler {
    type Message = Job;

    async fn handle(&mut self, job: Job) -> Result<()> {
        info!(
            job_id = %job.job_id,
            source_type = %job.source.kind,
            "extracting data for the source"
        );
        let mut connector = self.registry.create(&job.source.kind, &job.job_id, &job.source)?;
        let mut emitter = SinkEmitter {
            job_id: job.job_id,
            destination: job.destination,
            sink: Arc::clone(&self.sink),
        };
        connector.extract_and_transform(&mut emitter).await
    }
}

/// Wraps emitted batches in envelopes and sends them to the sink
struct SinkEmitter {
    job_id: String,
    destination: DestinationSpec,
    sink: Arc<KafkaSink>,
}

#[async_trait]
impl BatchHandler for SinkEmitter {
    async fn on_batch(&mut self, batch: DataBatch) -> Result<()> {
        // A page with no rows carries no load work and is not sent
        if batch.is_empty() {
            debug!(job_id = %self.job_id, "dropping an empty batch");
            return Ok(());
        }
        let envelope = BatchEnvelope {
            job_id: self.job_id.clone(),
            destination: self.destination.clone(),
            data: batch,
        };
        let payload = serde_json::to_string(&envelope)?;
        self.sink.send_batch(&[payload]).await
    }
}
