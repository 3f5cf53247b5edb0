//! Warehouse SQL source
//!
//! Builds a usage-and-cost union over the metering and storage history
//! tables, counts the result set once, then pages through it with
//! LIMIT/OFFSET until the offset passes the total. Every page is emitted,
//! including an empty first page when the range matches no rows.

use super::{BatchHandler, SourceConnector};
use crate::db::{db_value_to_json, ConnectionPool};
use crate::error::{Error, Result};
use crate::model::{DataBatch, SourceSpec};
use crate::schema::SchemaMapper;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

/// Result column carrying the usage date, normalized to ISO before emission
const USAGE_DATE_COLUMN: &str = "usage_date";

/// Cost of one compute or cloud-services credit
const CREDIT_COST: f64 = 3.7;

/// Monthly cost of one terabyte of storage
const STORAGE_TB_COST: f64 = 46.0;

fn build_usage_query(from: &str, to: &str) -> String {
    format!(
        "select cast(start_time as date) as usage_date, \
             warehouse_name, \
             case when warehouse_name = 'CLOUD_SERVICES_ONLY' \
                  then 'CLOUD SERVICES' else 'COMPUTE' end as service_type, \
             sum(credits_used_compute) as total_credits_used_compute, \
             sum(credits_used_cloud_services) as total_credits_used_cloud_services, \
             sum(credits_used_compute) * {CREDIT_COST} as total_compute_cost, \
             sum(credits_used_cloud_services) * {CREDIT_COST} as total_cloud_services_cost, \
             0 as total_credits_used_storage, \
             0 as total_storage_cost \
         from warehouse_metering_history \
         where cast(start_time as date) between '{from}' and '{to}' \
         group by 1, 2, 3 \
         union all \
         select usage_date, \
             null as warehouse_name, \
             'STORAGE' as service_type, \
             0 as total_credits_used_compute, \
             0 as total_credits_used_cloud_services, \
             0 as total_compute_cost, \
             0 as total_cloud_services_cost, \
             avg(storage_bytes + stage_bytes + failsafe_bytes) / power(1024, 4) \
                 as total_credits_used_storage, \
             avg(storage_bytes + stage_bytes + failsafe_bytes) / power(1024, 4) * {STORAGE_TB_COST} \
                 as total_storage_cost \
         from storage_usage \
         where usage_date between '{from}' and '{to}' \
         group by 1, 2, 3"
    )
}

/// Offset-paginated usage extraction from the embedded warehouse
pub struct WarehouseSource {
    job_id: String,
    mapper: SchemaMapper,
    pool: ConnectionPool,
    inner_query: String,
    batch_size: usize,
}

impl WarehouseSource {
    /// Open the connection pool and build the usage query for the job's range
    pub fn new(job_id: &str, spec: &SourceSpec) -> Result<Self> {
        let warehouse = spec
            .warehouse
            .as_ref()
            .ok_or_else(|| Error::missing_field("source.warehouse"))?;
        if spec.batch_size == 0 {
            return Err(Error::invalid_value(
                "source.batchSize",
                "page size must be positive",
            ));
        }
        Ok(Self {
            job_id: job_id.to_string(),
            mapper: SchemaMapper::new(&spec.schema_mapping),
            pool: ConnectionPool::open_default(&warehouse.connection.database)?,
            inner_query: build_usage_query(&spec.from_timestamp, &spec.to_timestamp),
            batch_size: spec.batch_size as usize,
        })
    }

    fn count_total(&self) -> Result<usize> {
        let connection = self.pool.checkout()?;
        let total: i64 = connection.query_row(
            &format!(
                "select count(*) as total_records from ({})",
                self.inner_query
            ),
            [],
            |row| row.get(0),
        )?;
        Ok(total.max(0) as usize)
    }

    fn result_columns(&self) -> Result<Vec<String>> {
        let connection = self.pool.checkout()?;
        let mut statement =
            connection.prepare(&format!("describe select * from ({})", self.inner_query))?;
        let names = statement
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn extract_page(&self, offset: usize, width: usize) -> Result<Vec<Vec<Value>>> {
        debug!(job_id = %self.job_id, offset, "extracting a warehouse page");
        let connection = self.pool.checkout()?;
        let mut statement = connection.prepare(&format!(
            "select * from ({}) order by 1, 2, 3 limit {} offset {}",
            self.inner_query, self.batch_size, offset
        ))?;
        let mut rows = statement.query([])?;
        let mut values = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Vec::with_capacity(width);
            for index in 0..width {
                let value: duckdb::types::Value = row.get(index)?;
                record.push(db_value_to_json(value));
            }
            values.push(record);
        }
        Ok(values)
    }
}

#[async_trait]
impl SourceConnector for WarehouseSource {
    async fn extract_and_transform(&mut self, handler: &mut dyn BatchHandler) -> Result<()> {
        let total = self.count_total()?;
        let columns = self.result_columns()?;
        let descriptors = self.mapper.remap(&columns)?;
        let date_index = columns
            .iter()
            .position(|column| column.eq_ignore_ascii_case(USAGE_DATE_COLUMN))
            .ok_or_else(|| {
                Error::decode(format!(
                    "column '{USAGE_DATE_COLUMN}' is missing from the usage query"
                ))
            })?;

        let mut offset = 0;
        loop {
            let mut rows = self.extract_page(offset, columns.len())?;
            for row in &mut rows {
                let cell = &mut row[date_index];
                *cell = normalize_date(cell)?;
            }
            handler
                .on_batch(DataBatch::new(descriptors.clone(), rows))
                .await?;
            offset += self.batch_size;
            if offset >= total {
                break;
            }
        }
        Ok(())
    }
}

/// Truncate a date or timestamp string to its 10-character ISO date prefix
fn normalize_date(value: &Value) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::String(s) if s.len() >= 10 => Ok(Value::String(s[..10].to_string())),
        other => Err(Error::decode(format!(
            "unexpected usage date value: {other}"
        ))),
    }
}

impl Drop for WarehouseSource {
    fn drop(&mut self) {
        self.pool.dispose();
    }
}
