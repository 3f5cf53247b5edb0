// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # Tabrelay
//!
//! A message-driven extract/load pipeline for tabular data.
//!
//! Two worker roles share one binary. An **extractor** consumes job
//! requests from the bus, drives a pluggable source connector through its
//! pagination loop, remaps each page's columns to canonical descriptors,
//! and produces one batch envelope per page. A **loader** consumes batch
//! envelopes, maps descriptors to destination columns, and bulk-inserts
//! each batch into the warehouse in a single statement.
//!
//! ```text
//! jobs topic ──▶ extractor ──▶ batches topic ──▶ loader ──▶ warehouse
//!                   │
//!         billing / warehouse / catalog sources
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(missing_docs)] // TODO: document the error variants

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the pipeline
pub mod error;

/// Wire-format job and batch types
pub mod model;

/// Column remapping between source and canonical names
pub mod schema;

/// Service lifecycle management
pub mod service;

/// Environment-driven worker configuration
pub mod config;

/// Message bus source and sink
pub mod bus;

/// Warehouse connection pooling and value conversion
pub mod db;

/// JSON REST client shared by the REST sources
pub mod http;

/// Source connectors and the extractor worker
pub mod extract;

/// Destination connectors and the loader worker
pub mod load;

/// Liveness endpoint
pub mod health;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use model::{BatchEnvelope, ColumnMapping, DataBatch, DestinationSpec, Job, SourceSpec};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
