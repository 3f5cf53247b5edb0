//! Warehouse destination
//!
//! Bulk-inserts every batch into the configured table in one statement.
//! The table's column set is introspected once at connector construction;
//! a batch naming a column the table does not have fails before any row is
//! written.

use super::DestinationConnector;
use crate::db::{json_to_db_value, ConnectionPool};
use crate::error::{Error, Result};
use crate::model::{DataBatch, DestinationSpec, QualifiedTableName};
use crate::schema::SchemaMapper;
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::debug;

/// Batch loader for one warehouse table
pub struct WarehouseDestination {
    job_id: String,
    mapper: SchemaMapper,
    table: QualifiedTableName,
    table_columns: HashSet<String>,
    pool: Option<ConnectionPool>,
}

impl WarehouseDestination {
    /// Open the pool and introspect the destination table's columns
    pub fn connect(job_id: &str, spec: &DestinationSpec) -> Result<Self> {
        let warehouse = spec
            .warehouse
            .as_ref()
            .ok_or_else(|| Error::missing_field("destination.warehouse"))?;
        let table = QualifiedTableName::parse(&spec.fully_qualified_table_name)?;
        let pool = ConnectionPool::open_default(&warehouse.connection.database)?;
        let table_columns = load_table_columns(&pool, &table)?;

        Ok(Self {
            job_id: job_id.to_string(),
            mapper: SchemaMapper::new(&spec.schema_mapping),
            table,
            table_columns,
            pool: Some(pool),
        })
    }

    /// Map batch descriptors to destination column names and check they exist
    fn destination_columns(&self, batch: &DataBatch) -> Result<Vec<String>> {
        let mut columns = Vec::with_capacity(batch.descriptors.len());
        for descriptor in &batch.descriptors {
            let column = self.mapper.output(descriptor)?.to_lowercase();
            if !self.table_columns.contains(&column) {
                return Err(Error::config(format!(
                    "column '{column}' is not present in table '{}'",
                    self.table
                )));
            }
            columns.push(column);
        }
        Ok(columns)
    }
}

#[async_trait]
impl DestinationConnector for WarehouseDestination {
    async fn load(&mut self, batch: &DataBatch) -> Result<()> {
        if batch.is_empty() {
            debug!(job_id = %self.job_id, "empty batch, nothing to load");
            return Ok(());
        }
        let columns = self.destination_columns(batch)?;

        let row_placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
        let placeholders = vec![row_placeholders; batch.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.table,
            columns.join(", "),
            placeholders
        );

        let mut bound = Vec::with_capacity(batch.len() * columns.len());
        for row in &batch.values {
            if row.len() != columns.len() {
                return Err(Error::decode("batch row is narrower than the descriptors"));
            }
            for value in row {
                bound.push(json_to_db_value(value));
            }
        }

        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| Error::pool("destination connector is disposed"))?;
        let connection = pool.checkout()?;
        connection.execute(&sql, duckdb::params_from_iter(bound))?;
        debug!(
            job_id = %self.job_id,
            rows = batch.len(),
            table = %self.table,
            "loaded the batch"
        );
        Ok(())
    }

    fn dispose(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.dispose();
        }
    }
}

impl Drop for WarehouseDestination {
    fn drop(&mut self) {
        DestinationConnector::dispose(self);
    }
}

/// Fetch the table's column names, lowercased; an unknown table is an error
fn load_table_columns(pool: &ConnectionPool, table: &QualifiedTableName) -> Result<HashSet<String>> {
    let connection = pool.checkout()?;
    let mut sql = String::from(
        "select column_name from information_schema.columns \
         where lower(table_name) = lower(?)",
    );
    let mut binds = vec![table.table.clone()];
    if let Some(schema) = &table.schema {
        sql.push_str(" and lower(table_schema) = lower(?)");
        binds.push(schema.clone());
    }
    sql.push_str(" order by ordinal_position");

    let mut statement = connection.prepare(&sql)?;
    let columns = statement
        .query_map(duckdb::params_from_iter(binds), |row| {
            row.get::<_, String>(0)
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    if columns.is_empty() {
        return Err(Error::config(format!(
            "table '{table}' does not exist in the destination database"
        )));
    }
    Ok(columns.into_iter().map(|name| name.to_lowercase()).collect())
}
