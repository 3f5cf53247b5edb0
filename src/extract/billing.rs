//! Billing REST source
//!
//! Posts a daily cost query to the billing endpoint and follows the
//! server-driven `nextLink` cursor until it is absent or empty. The packed
//! usage date column is rewritten to an ISO date before emission.

use super::{BatchHandler, SourceConnector};
use crate::error::{Error, Result};
use crate::http::RestClient;
use crate::model::{DataBatch, SourceSpec};
use crate::schema::SchemaMapper;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

/// Response column carrying the packed `YYYYMMDD` usage date
const USAGE_DATE_COLUMN: &str = "UsageDate";

const PACKED_DATE_FORMAT: &str = "%Y%m%d";
const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct QueryResponse {
    properties: QueryPage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryPage {
    /// Cursor to the next page; absent or empty on the last page
    #[serde(default)]
    next_link: Option<String>,
    columns: Vec<ColumnDescriptor>,
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct ColumnDescriptor {
    name: String,
}

// ============================================================================
// Connector
// ============================================================================

/// Cursor-paginated cost extraction from the billing REST API
pub struct BillingSource {
    job_id: String,
    mapper: SchemaMapper,
    client: RestClient,
    query_payload: Value,
    next_url: Option<String>,
}

impl BillingSource {
    /// Build the connector and its cost query from the source section
    pub fn new(job_id: &str, spec: &SourceSpec) -> Result<Self> {
        let billing = spec
            .billing
            .as_ref()
            .ok_or_else(|| Error::missing_field("source.billing"))?;

        let groupings: Vec<Value> = billing
            .dimensions
            .iter()
            .map(|dimension| json!({"type": "Dimension", "name": dimension}))
            .collect();
        let query_payload = json!({
            "type": "ActualCost",
            "dataSet": {
                "granularity": "Daily",
                "aggregation": {
                    "totalCost": {"name": "Cost", "function": "Sum"},
                    "totalCostUSD": {"name": "CostUSD", "function": "Sum"}
                },
                "grouping": groupings
            },
            "timeframe": "Custom",
            "timePeriod": {
                "from": spec.from_timestamp,
                "to": spec.to_timestamp
            }
        });

        Ok(Self {
            job_id: job_id.to_string(),
            mapper: SchemaMapper::new(&spec.schema_mapping),
            client: RestClient::with_bearer_token(Some(&billing.connection.auth_token))?,
            query_payload,
            next_url: Some(format!(
                "{}?pageSize={}",
                billing.connection.endpoint, spec.batch_size
            )),
        })
    }

    async fn extract_page(&mut self, url: &str) -> Result<QueryPage> {
        debug!(job_id = %self.job_id, url, "extracting a billing page");
        let response: QueryResponse = self.client.post_json(url, &self.query_payload).await?;
        let page = response.properties;
        self.next_url = page.next_link.clone().filter(|link| !link.is_empty());
        Ok(page)
    }

    /// Rewrite the packed usage date column to ISO dates, in place
    fn transform(page: &mut QueryPage) -> Result<()> {
        let date_index = page
            .columns
            .iter()
            .position(|column| column.name == USAGE_DATE_COLUMN)
            .ok_or_else(|| {
                Error::decode(format!(
                    "column '{USAGE_DATE_COLUMN}' is missing from the billing response"
                ))
            })?;
        for row in &mut page.rows {
            let cell = row
                .get_mut(date_index)
                .ok_or_else(|| Error::decode("billing row is narrower than the column list"))?;
            *cell = convert_packed_date(cell)?;
        }
        Ok(())
    }

    fn to_batch(&self, page: QueryPage) -> Result<DataBatch> {
        let inputs: Vec<&str> = page.columns.iter().map(|c| c.name.as_str()).collect();
        let descriptors = self.mapper.remap(&inputs)?;
        Ok(DataBatch::new(descriptors, page.rows))
    }
}

#[async_trait]
impl SourceConnector for BillingSource {
    async fn extract_and_transform(&mut self, handler: &mut dyn BatchHandler) -> Result<()> {
        while let Some(url) = self.next_url.take() {
            let mut page = self.extract_page(&url).await?;
            Self::transform(&mut page)?;
            let batch = self.to_batch(page)?;
            handler.on_batch(batch).await?;
        }
        Ok(())
    }
}

/// Parse a packed `YYYYMMDD` number or string into an ISO date string
fn convert_packed_date(value: &Value) -> Result<Value> {
    let packed = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(Error::decode(format!(
                "unexpected usage date value: {other}"
            )))
        }
    };
    let date = NaiveDate::parse_from_str(&packed, PACKED_DATE_FORMAT)
        .map_err(|e| Error::decode(format!("invalid packed date '{packed}': {e}")))?;
    Ok(Value::String(date.format(ISO_DATE_FORMAT).to_string()))
}
