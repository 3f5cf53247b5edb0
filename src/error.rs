//! Error types for tabrelay
//!
//! This module defines the error hierarchy for the whole pipeline.
//! All public APIs return `Result<T, Error>` where Error is defined here.

use thiserror::Error;

/// The main error type for tabrelay
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Connector Errors
    // ============================================================================
    #[error("No {role} connector registered for type '{kind}'")]
    UnknownConnector { role: &'static str, kind: String },

    #[error("No schema mapping entry for column '{column}'")]
    MissingSchemaMapping { column: String },

    #[error("Failed to decode response: {message}")]
    Decode { message: String },

    // ============================================================================
    // HTTP Errors
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ============================================================================
    // Bus Errors
    // ============================================================================
    #[error("Bus error: {0}")]
    Bus(#[from] rdkafka::error::KafkaError),

    // ============================================================================
    // Warehouse Errors
    // ============================================================================
    #[error("Warehouse error: {0}")]
    Warehouse(#[from] duckdb::Error),

    #[error("Connection pool error: {message}")]
    Pool { message: String },

    // ============================================================================
    // Lifecycle Errors
    // ============================================================================
    #[error("{message}, details: one or more errors were raised while executing the requested tasks:\n{}", details.join("\n"))]
    Suppressed {
        message: String,
        details: Vec<String>,
    },

    #[error("Validation failed: {}", failures.join("; "))]
    Validation { failures: Vec<String> },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an unknown connector error
    pub fn unknown_connector(role: &'static str, kind: impl Into<String>) -> Self {
        Self::UnknownConnector {
            role,
            kind: kind.into(),
        }
    }

    /// Create a missing schema mapping error
    pub fn missing_mapping(column: impl Into<String>) -> Self {
        Self::MissingSchemaMapping {
            column: column.into(),
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create an HTTP status error
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Create a connection pool error
    pub fn pool(message: impl Into<String>) -> Self {
        Self::Pool {
            message: message.into(),
        }
    }

    /// Combine one or more underlying failures into a single reported error
    pub fn suppressed(message: impl Into<String>, details: Vec<String>) -> Self {
        Self::Suppressed {
            message: message.into(),
            details,
        }
    }
}

/// Result type alias for tabrelay
pub type Result<T> = std::result::Result<T, Error>;
