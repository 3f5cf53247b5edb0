//! Integration tests using a mock HTTP server and an on-disk warehouse
//!
//! Drives each connector through its full pagination loop: REST sources
//! against wiremock, the warehouse source and destination against a
//! temporary DuckDB database.

use async_trait::async_trait;
use serde_json::{json, Value};
use tabrelay::error::Result;
use tabrelay::extract::{BatchHandler, SourceConnector, SourceRegistry};
use tabrelay::load::{DestinationConnector, DestinationRegistry};
use tabrelay::model::{
    BillingConnection, BillingSourceSpec, CatalogSourceSpec, ColumnMapping, DataBatch,
    DestinationSpec, SourceSpec, WarehouseConnection, WarehouseDestinationSpec,
    WarehouseSourceSpec,
};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Helpers
// ============================================================================

/// Collects every emitted batch, including empty ones
#[derive(Default)]
struct RecordingHandler {
    batches: Vec<DataBatch>,
}

#[async_trait]
impl BatchHandler for RecordingHandler {
    async fn on_batch(&mut self, batch: DataBatch) -> Result<()> {
        self.batches.push(batch);
        Ok(())
    }
}

fn mapping(pairs: &[(&str, &str)]) -> Vec<ColumnMapping> {
    pairs
        .iter()
        .map(|(input, output)| ColumnMapping {
            input: (*input).to_string(),
            output: (*output).to_string(),
        })
        .collect()
}

// ============================================================================
// Billing Source
// ============================================================================

fn billing_spec(endpoint: &str, batch_size: u32) -> SourceSpec {
    SourceSpec {
        kind: "billing".to_string(),
        schema_mapping: mapping(&[("UsageDate", "usage_date"), ("Cost", "total_cost")]),
        batch_size,
        from_timestamp: "2024-01-01T00:00:00Z".to_string(),
        to_timestamp: "2024-01-31T23:59:59Z".to_string(),
        billing: Some(BillingSourceSpec {
            connection: BillingConnection {
                endpoint: endpoint.to_string(),
                auth_token: "secret-token".to_string(),
            },
            dimensions: vec!["ServiceName".to_string()],
        }),
        warehouse: None,
        catalog: None,
    }
}

#[tokio::test]
async fn test_billing_source_follows_the_next_link() {
    let mock_server = MockServer::start().await;

    let second_page_url = format!("{}/costs/page-2", mock_server.uri());
    Mock::given(method("POST"))
        .and(path("/costs"))
        .and(query_param("pageSize", "100"))
        .and(header("Authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "properties": {
                "nextLink": second_page_url,
                "columns": [{"name": "UsageDate"}, {"name": "Cost"}],
                "rows": [[20240101, 10.5], [20240102, 4.0]]
            }
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/costs/page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "properties": {
                "columns": [{"name": "UsageDate"}, {"name": "Cost"}],
                "rows": [["20240103", 7.25]]
            }
        })))
        .mount(&mock_server)
        .await;

    let spec = billing_spec(&format!("{}/costs", mock_server.uri()), 100);
    let mut connector = SourceRegistry::builtin()
        .create("billing", "job-42", &spec)
        .unwrap();
    let mut handler = RecordingHandler::default();

    connector.extract_and_transform(&mut handler).await.unwrap();

    assert_eq!(handler.batches.len(), 2);
    assert_eq!(
        handler.batches[0].descriptors,
        vec!["usage_date".to_string(), "total_cost".to_string()]
    );
    assert_eq!(
        handler.batches[0].values,
        vec![
            vec![json!("2024-01-01"), json!(10.5)],
            vec![json!("2024-01-02"), json!(4.0)],
        ]
    );
    assert_eq!(
        handler.batches[1].values,
        vec![vec![json!("2024-01-03"), json!(7.25)]]
    );
}

#[tokio::test]
async fn test_billing_source_fails_on_unmapped_column() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/costs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "properties": {
                "columns": [{"name": "UsageDate"}, {"name": "Currency"}],
                "rows": [[20240101, "EUR"]]
            }
        })))
        .mount(&mock_server)
        .await;

    let spec = billing_spec(&format!("{}/costs", mock_server.uri()), 50);
    let mut connector = SourceRegistry::builtin()
        .create("billing", "job-42", &spec)
        .unwrap();
    let mut handler = RecordingHandler::default();

    let err = connector
        .extract_and_transform(&mut handler)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Currency"));
    assert!(handler.batches.is_empty());
}

// ============================================================================
// Catalog Source
// ============================================================================

fn catalog_spec(urls: Vec<String>) -> SourceSpec {
    SourceSpec {
        kind: "catalog".to_string(),
        schema_mapping: mapping(&[
            ("available", "AVAILABLE"),
            ("category", "CATEGORY"),
            ("code", "CODE"),
            ("collection", "COLLECTION"),
            ("grams", "GRAMS"),
            ("imageUrl", "IMAGE_URL"),
            ("name", "NAME"),
            ("price", "PRICE"),
            ("requiresShipping", "REQUIRES_SHIPPING"),
            ("url", "URL"),
            ("variantName", "VARIANT_NAME"),
        ]),
        batch_size: 250,
        from_timestamp: String::new(),
        to_timestamp: String::new(),
        billing: None,
        warehouse: None,
        catalog: Some(CatalogSourceSpec { urls }),
    }
}

fn product(title: &str, handle: &str, variants: Value) -> Value {
    json!({
        "title": title,
        "handle": handle,
        "product_type": "Apparel",
        "variants": variants,
        "images": [{"src": "https://cdn.example.com/main.jpg", "variant_ids": []}]
    })
}

#[tokio::test]
async fn test_catalog_source_stops_on_an_empty_page() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/products.json"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "products": [product(
                "Tee",
                "tee",
                json!([
                    {"id": 1, "available": true, "sku": "TEE-S", "grams": 150,
                     "price": "19.00", "requires_shipping": true, "option1": "Small"},
                    {"id": 2, "available": true, "sku": "TEE-M", "grams": 160,
                     "price": "19.00", "requires_shipping": true, "option1": "Medium"}
                ]),
            )]
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/products.json"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"products": [product(
                "Cap", "cap",
                json!([{"id": 3, "available": false, "sku": "CAP", "grams": 80,
                        "price": "12.00", "requires_shipping": true, "option1": "One Size"}]),
            )]})),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/products.json"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"products": []})))
        .mount(&mock_server)
        .await;

    // A second store whose first page is already empty; pagination must
    // still move on from the first URL and terminate on this one
    let second_store = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"products": []})))
        .mount(&second_store)
        .await;

    let spec = catalog_spec(vec![mock_server.uri(), second_store.uri()]);
    let mut connector = SourceRegistry::builtin()
        .create("catalog", "job-7", &spec)
        .unwrap();
    let mut handler = RecordingHandler::default();

    connector.extract_and_transform(&mut handler).await.unwrap();

    // Two non-empty pages from the first store; the empty third page ends
    // that URL and the second store contributes nothing
    assert_eq!(handler.batches.len(), 2);
    assert_eq!(handler.batches[0].values.len(), 2);
    assert_eq!(handler.batches[1].values.len(), 1);
    assert_eq!(handler.batches[0].descriptors[0], "AVAILABLE");

    let first_row = &handler.batches[0].values[0];
    assert_eq!(first_row[6], json!("Tee"));
    assert_eq!(
        first_row[9],
        json!(format!("{}/products/tee", mock_server.uri()))
    );
    assert_eq!(first_row[10], json!("Small"));
}

// ============================================================================
// Warehouse Source
// ============================================================================

fn warehouse_spec(database: &str, batch_size: u32) -> SourceSpec {
    SourceSpec {
        kind: "warehouse".to_string(),
        schema_mapping: mapping(&[
            ("usage_date", "usage_date"),
            ("warehouse_name", "warehouse_name"),
            ("service_type", "service_type"),
            ("total_credits_used_compute", "total_credits_used_compute"),
            (
                "total_credits_used_cloud_services",
                "total_credits_used_cloud_services",
            ),
            ("total_compute_cost", "total_compute_cost"),
            ("total_cloud_services_cost", "total_cloud_services_cost"),
            ("total_credits_used_storage", "total_credits_used_storage"),
            ("total_storage_cost", "total_storage_cost"),
        ]),
        batch_size,
        from_timestamp: "2024-01-01".to_string(),
        to_timestamp: "2024-01-31".to_string(),
        billing: None,
        warehouse: Some(WarehouseSourceSpec {
            connection: WarehouseConnection {
                database: database.to_string(),
            },
        }),
        catalog: None,
    }
}

fn seed_usage_database(database: &str) {
    let connection = duckdb::Connection::open(database).unwrap();
    connection
        .execute_batch(
            "CREATE TABLE warehouse_metering_history (
                 start_time TIMESTAMP,
                 warehouse_name VARCHAR,
                 credits_used_compute DOUBLE,
                 credits_used_cloud_services DOUBLE
             );
             CREATE TABLE storage_usage (
                 usage_date DATE,
                 storage_bytes DOUBLE,
                 stage_bytes DOUBLE,
                 failsafe_bytes DOUBLE
             );
             INSERT INTO warehouse_metering_history VALUES
                 ('2024-01-01 01:00:00', 'ETL_WH', 1.5, 0.1),
                 ('2024-01-02 01:00:00', 'ETL_WH', 2.0, 0.2),
                 ('2024-01-03 01:00:00', 'ETL_WH', 0.5, 0.0),
                 ('2024-01-04 01:00:00', 'ETL_WH', 1.0, 0.1),
                 ('2024-01-05 01:00:00', 'CLOUD_SERVICES_ONLY', 0.0, 0.3);
             INSERT INTO storage_usage VALUES
                 ('2024-01-01', 1099511627776, 0, 0),
                 ('2024-01-02', 2199023255552, 0, 0);",
        )
        .unwrap();
}

#[tokio::test]
async fn test_warehouse_source_pages_through_the_result_set() {
    let dir = tempfile::tempdir().unwrap();
    let database = dir.path().join("usage.duckdb");
    let database = database.to_str().unwrap();
    seed_usage_database(database);

    // 7 result rows with a page size of 3: pages of 3, 3, and 1
    let spec = warehouse_spec(database, 3);
    let mut connector = SourceRegistry::builtin()
        .create("warehouse", "job-9", &spec)
        .unwrap();
    let mut handler = RecordingHandler::default();

    connector.extract_and_transform(&mut handler).await.unwrap();

    assert_eq!(handler.batches.len(), 3);
    assert_eq!(handler.batches[0].values.len(), 3);
    assert_eq!(handler.batches[1].values.len(), 3);
    assert_eq!(handler.batches[2].values.len(), 1);

    for batch in &handler.batches {
        assert_eq!(batch.descriptors.len(), 9);
        for row in &batch.values {
            let usage_date = row[0].as_str().unwrap();
            assert_eq!(usage_date.len(), 10);
            assert!(usage_date.starts_with("2024-01-"));
        }
    }

    let storage_rows: Vec<_> = handler
        .batches
        .iter()
        .flat_map(|batch| &batch.values)
        .filter(|row| row[2] == json!("STORAGE"))
        .collect();
    assert_eq!(storage_rows.len(), 2);
}

#[tokio::test]
async fn test_warehouse_source_emits_one_empty_batch_without_rows() {
    let dir = tempfile::tempdir().unwrap();
    let database = dir.path().join("usage.duckdb");
    let database = database.to_str().unwrap();
    seed_usage_database(database);

    let mut spec = warehouse_spec(database, 100);
    spec.from_timestamp = "2030-01-01".to_string();
    spec.to_timestamp = "2030-01-31".to_string();

    let mut connector = SourceRegistry::builtin()
        .create("warehouse", "job-9", &spec)
        .unwrap();
    let mut handler = RecordingHandler::default();

    connector.extract_and_transform(&mut handler).await.unwrap();

    assert_eq!(handler.batches.len(), 1);
    assert!(handler.batches[0].is_empty());
}

// ============================================================================
// Warehouse Destination
// ============================================================================

fn destination_spec(database: &str, table: &str) -> DestinationSpec {
    DestinationSpec {
        kind: "warehouse".to_string(),
        fully_qualified_table_name: table.to_string(),
        schema_mapping: mapping(&[
            ("UsageDate", "usage_date"),
            ("Warehouse", "WAREHOUSE"),
            ("TotalCost", "total_cost"),
        ]),
        warehouse: Some(WarehouseDestinationSpec {
            connection: WarehouseConnection {
                database: database.to_string(),
            },
        }),
    }
}

#[tokio::test]
async fn test_warehouse_destination_bulk_inserts_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let database = dir.path().join("target.duckdb");
    let database = database.to_str().unwrap();
    {
        let connection = duckdb::Connection::open(database).unwrap();
        connection
            .execute_batch(
                "CREATE TABLE daily_cost (
                     usage_date DATE,
                     warehouse VARCHAR,
                     total_cost DOUBLE
                 );",
            )
            .unwrap();
    }

    let spec = destination_spec(database, "main.daily_cost");
    let mut connector = DestinationRegistry::builtin()
        .create("warehouse", "job-3", &spec)
        .unwrap();

    let batch = DataBatch::new(
        vec![
            "TotalCost".to_string(),
            "UsageDate".to_string(),
            "Warehouse".to_string(),
        ],
        vec![
            vec![json!(12.5), json!("2024-01-01"), json!("ETL_WH")],
            vec![json!(3.75), json!("2024-01-02"), json!("ETL_WH")],
        ],
    );

    connector.load(&batch).await.unwrap();
    // Release the destination's pool before reopening the file
    connector.dispose();

    let connection = duckdb::Connection::open(database).unwrap();
    let count: i64 = connection
        .query_row("SELECT count(*) FROM daily_cost", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 2);
    let cost: f64 = connection
        .query_row(
            "SELECT total_cost FROM daily_cost WHERE usage_date = DATE '2024-01-02'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert!((cost - 3.75).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_warehouse_destination_rejects_unknown_columns() {
    let dir = tempfile::tempdir().unwrap();
    let database = dir.path().join("target.duckdb");
    let database = database.to_str().unwrap();
    {
        let connection = duckdb::Connection::open(database).unwrap();
        connection
            .execute_batch("CREATE TABLE daily_cost (usage_date DATE);")
            .unwrap();
    }

    let spec = destination_spec(database, "main.daily_cost");
    let mut connector = DestinationRegistry::builtin()
        .create("warehouse", "job-3", &spec)
        .unwrap();

    let batch = DataBatch::new(
        vec!["Warehouse".to_string()],
        vec![vec![json!("ETL_WH")]],
    );

    let err = connector.load(&batch).await.unwrap_err();
    assert!(err.to_string().contains("warehouse"));
}

#[tokio::test]
async fn test_warehouse_destination_requires_an_existing_table() {
    let dir = tempfile::tempdir().unwrap();
    let database = dir.path().join("target.duckdb");
    let database = database.to_str().unwrap();
    // Touch the database file without creating any table
    drop(duckdb::Connection::open(database).unwrap());

    let spec = destination_spec(database, "main.daily_cost");
    let err = DestinationRegistry::builtin()
        .create("warehouse", "job-3", &spec)
        .map(|_| ())
        .unwrap_err();
    assert!(err.to_string().contains("daily_cost"));
}
