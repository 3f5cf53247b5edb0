//! Schema remapping
//!
//! A [`SchemaMapper`] turns an ordered list of (input, output) column pairs
//! into a renaming operation over a batch's descriptors. An extracted column
//! with no mapping entry is a configuration error and fails loudly rather
//! than being dropped.

use crate::error::{Error, Result};
use crate::model::ColumnMapping;
use std::collections::HashMap;

/// Pure rename operation built from a job's schema mapping
#[derive(Debug, Clone)]
pub struct SchemaMapper {
    input_to_output: HashMap<String, String>,
}

impl SchemaMapper {
    /// Build a mapper from the ordered mapping pairs of a spec
    pub fn new(mappings: &[ColumnMapping]) -> Self {
        let input_to_output = mappings
            .iter()
            .map(|m| (m.input.clone(), m.output.clone()))
            .collect();
        Self { input_to_output }
    }

    /// Resolve the output name for one input column
    pub fn output(&self, input: &str) -> Result<&str> {
        self.input_to_output
            .get(input)
            .map(String::as_str)
            .ok_or_else(|| Error::missing_mapping(input))
    }

    /// Rename a full descriptor list, preserving order
    pub fn remap<S: AsRef<str>>(&self, descriptors: &[S]) -> Result<Vec<String>> {
        descriptors
            .iter()
            .map(|d| self.output(d.as_ref()).map(ToString::to_string))
            .collect()
    }

    /// Number of mapping entries
    pub fn len(&self) -> usize {
        self.input_to_output.len()
    }

    /// Whether the mapping has no entries
    pub fn is_empty(&self) -> bool {
        self.input_to_output.is_empty()
    }
}
