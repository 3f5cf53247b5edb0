//! Typed wire and value objects for the pipeline
//!
//! Every message crossing the bus is one of the JSON documents defined here.
//! The extractor consumes [`Job`] messages and produces [`BatchEnvelope`]
//! messages; the loader consumes [`BatchEnvelope`] messages. All field names
//! follow the camelCase wire convention.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// ============================================================================
// Job
// ============================================================================

/// One unit of extraction work arriving on the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Opaque identifier correlating logs across extraction and loading
    pub job_id: String,

    /// Where to extract from
    pub source: SourceSpec,

    /// Where the extracted batches should eventually be loaded
    pub destination: DestinationSpec,
}

// ============================================================================
// Schema Mapping
// ============================================================================

/// One input-name to output-name column rename
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// Column name as produced by the source (or canonical descriptor name)
    pub input: String,
    /// Column name expected downstream
    pub output: String,
}

// ============================================================================
// Source Spec
// ============================================================================

/// Source half of a job
///
/// The `type` discriminator selects the connector; the matching per-type
/// section carries the opaque connection details for that connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpec {
    /// Connector type tag (matched case-insensitively against the registry)
    #[serde(rename = "type")]
    pub kind: String,

    /// Ordered input -> output column renames applied to every extracted page
    pub schema_mapping: Vec<ColumnMapping>,

    /// Page size for paginated extraction
    pub batch_size: u32,

    /// Inclusive range start; semantics are connector-specific
    #[serde(default)]
    pub from_timestamp: String,

    /// Inclusive range end; semantics are connector-specific
    #[serde(default)]
    pub to_timestamp: String,

    /// Cloud-billing REST source details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing: Option<BillingSourceSpec>,

    /// Warehouse SQL source details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<WarehouseSourceSpec>,

    /// Catalog REST source details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<CatalogSourceSpec>,
}

/// Cloud-billing REST source section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingSourceSpec {
    /// Endpoint and credentials for the billing API
    pub connection: BillingConnection,
    /// Dimensions the cost query groups by
    #[serde(default)]
    pub dimensions: Vec<String>,
}

/// Connection details for the billing API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingConnection {
    /// Base URL of the cost query endpoint
    pub endpoint: String,
    /// Bearer token sent with every request
    pub auth_token: String,
}

/// Warehouse SQL source section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseSourceSpec {
    /// Warehouse connection details
    pub connection: WarehouseConnection,
}

/// Connection details for the embedded warehouse engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseConnection {
    /// Database location (file path, or `:memory:`)
    pub database: String,
}

/// Catalog REST source section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSourceSpec {
    /// Base store URLs, paginated sequentially in order
    pub urls: Vec<String>,
}

// ============================================================================
// Destination Spec
// ============================================================================

/// Destination half of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationSpec {
    /// Connector type tag (matched case-insensitively against the registry)
    #[serde(rename = "type")]
    pub kind: String,

    /// Dot-separated `catalog.schema.table`; only the table segment is
    /// mandatory, the rest is inferred positionally from the right
    pub fully_qualified_table_name: String,

    /// Canonical descriptor name -> destination column name renames
    pub schema_mapping: Vec<ColumnMapping>,

    /// Warehouse destination details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<WarehouseDestinationSpec>,
}

/// Warehouse destination section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseDestinationSpec {
    /// Warehouse connection details
    pub connection: WarehouseConnection,
}

// ============================================================================
// Data Batch
// ============================================================================

/// A page of rows with positional column descriptors
///
/// Invariant: every row in `values` has exactly `descriptors.len()` entries,
/// and `descriptors` is never empty while `values` is non-empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataBatch {
    /// Ordered canonical column names; length equals the row width
    pub descriptors: Vec<String>,
    /// Row values aligned positionally with `descriptors`
    pub values: Vec<Vec<Value>>,
}

impl DataBatch {
    /// Create a batch from descriptors and rows
    pub fn new(descriptors: Vec<String>, values: Vec<Vec<Value>>) -> Self {
        Self {
            descriptors,
            values,
        }
    }

    /// A batch with no rows carries no load work
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of rows in the batch
    pub fn len(&self) -> usize {
        self.values.len()
    }
}

// ============================================================================
// Batch Envelope
// ============================================================================

/// The extractor -> loader wire shape: one batch plus its routing context
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEnvelope {
    /// Job the batch belongs to
    pub job_id: String,
    /// Destination the loader should write to
    pub destination: DestinationSpec,
    /// The extracted and remapped page
    pub data: DataBatch,
}

// ============================================================================
// Qualified Table Name
// ============================================================================

/// A `catalog.schema.table` name split from the right
///
/// The rightmost segment is the table, the next one the schema, and
/// everything remaining (dots included) the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedTableName {
    /// Catalog segment, absent for `schema.table` or bare names
    pub catalog: Option<String>,
    /// Schema segment, absent for bare table names
    pub schema: Option<String>,
    /// Table segment; always present
    pub table: String,
}

impl QualifiedTableName {
    /// Parse a dot-separated fully qualified table name
    pub fn parse(fully_qualified: &str) -> Result<Self> {
        if fully_qualified.is_empty() {
            return Err(Error::invalid_value(
                "destination.fullyQualifiedTableName",
                "table name must not be empty",
            ));
        }
        let parts: Vec<&str> = fully_qualified.split('.').collect();
        let length = parts.len();
        let table = parts[length - 1].to_string();
        if table.is_empty() {
            return Err(Error::invalid_value(
                "destination.fullyQualifiedTableName",
                "table segment must not be empty",
            ));
        }
        let schema = if length > 1 {
            Some(parts[length - 2].to_string())
        } else {
            None
        };
        let catalog = if length > 2 {
            Some(parts[..length - 2].join("."))
        } else {
            None
        };
        Ok(Self {
            catalog,
            schema,
            table,
        })
    }
}

impl fmt::Display for QualifiedTableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(catalog) = &self.catalog {
            write!(f, "{catalog}.")?;
        }
        if let Some(schema) = &self.schema {
            write!(f, "{schema}.")?;
        }
        write!(f, "{}", self.table)
    }
}
