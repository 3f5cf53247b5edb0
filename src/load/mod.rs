//! Loading side of the pipeline
//!
//! A [`DestinationConnector`] is constructed per inbound batch envelope
//! from the [`DestinationRegistry`], asked to load the batch, and disposed
//! whether or not the load succeeded.

pub mod warehouse;

pub use warehouse::WarehouseDestination;

use crate::bus::{KafkaSource, MessageHandler};
use crate::config::{BusConsumerConfig, BROKER_STARTUP_DELAY};
use crate::error::{Error, Result};
use crate::model::{BatchEnvelope, DataBatch, DestinationSpec};
use crate::service::ServiceManager;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::info;

// ============================================================================
// Connector Trait
// ============================================================================

/// Pluggable loading capability for one destination system type
#[async_trait]
pub trait DestinationConnector: Send {
    /// Load one batch into the destination
    async fn load(&mut self, batch: &DataBatch) -> Result<()>;

    /// Release held resources; must be safe to call more than once
    fn dispose(&mut self);
}

// ============================================================================
// Destination Registry
// ============================================================================

/// Constructor for one destination connector type
pub type DestinationFactory = fn(&str, &DestinationSpec) -> Result<Box<dyn DestinationConnector>>;

/// Maps a destination type tag to a connector factory
pub struct DestinationRegistry {
    factories: HashMap<String, DestinationFactory>,
}

impl DestinationRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with all built-in destination connectors
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("warehouse", |job_id, spec| {
            Ok(Box::new(WarehouseDestination::connect(job_id, spec)?))
        });
        registry
    }

    /// Register a factory under a type tag (stored case-insensitively)
    pub fn register(&mut self, kind: &str, factory: DestinationFactory) {
        self.factories.insert(kind.to_lowercase(), factory);
    }

    /// Construct the connector for an envelope's destination type
    pub fn create(
        &self,
        kind: &str,
        job_id: &str,
        spec: &DestinationSpec,
    ) -> Result<Box<dyn DestinationConnector>> {
        let factory = self
            .factories
            .get(&kind.to_lowercase())
            .ok_or_else(|| Error::unknown_connector("destination", kind))?;
        factory(job_id, spec)
    }
}

impl Default for DestinationRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

// ============================================================================
// Loader Manager
// ============================================================================

/// Owns the inbound batch-envelope consumer
pub struct LoaderManager {
    consumer_config: BusConsumerConfig,
    source: Option<KafkaSource<LoaderHandler>>,
}

impl LoaderManager {
    /// Create an unprepared manager from the bus configuration
    pub fn new(consumer_config: BusConsumerConfig) -> Self {
        Self {
            consumer_config,
            source: None,
        }
    }
}

#[async_trait]
impl ServiceManager for LoaderManager {
    fn name(&self) -> &str {
        "loader"
    }

    async fn prepare(&mut self) -> Result<()> {
        // Give the bus broker time to become reachable
        tokio::time::sleep(BROKER_STARTUP_DELAY).await;
        let handler = LoaderHandler {
            registry: DestinationRegistry::builtin(),
        };
        self.source = Some(KafkaSource::new(&self.consumer_config, handler)?);
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        self.source
            .as_mut()
            .ok_or_else(|| Error::config("loader manager is not prepared"))?
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

/// Handles one inbound envelope: connector lookup, load, teardown
struct LoaderHandler {
    registry: DestinationRegistry,
}

#[async_trait]
impl MessageHandler for LoaderHandler {
    type Message = BatchEnvelope;

    async fn handle(&mut self, envelope: BatchEnvelope) -> Result<()> {
        info!(
            job_id = %envelope.job_id,
            destination_type = %envelope.destination.kind,
            rows = envelope.data.len(),
            "loading data to the destination"
        );
        let mut connector = self.registry.create(
            &envelope.destination.kind,
            &envelope.job_id,
            &envelope.destination,
        )?;
        let result = connector.load(&envelope.data).await;
        // Teardown runs on the failure path too
        connector.dispose();
        result
    }
}
