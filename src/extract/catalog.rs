//! Catalog REST source
//!
//! Walks each configured store URL with a page-number cursor against the
//! public `products.json` listing, flattening every product variant into
//! one row. A page that flattens to zero rows ends that URL; the cursor
//! restarts at one for the next URL.

use super::{BatchHandler, SourceConnector};
use crate::error::{Error, Result};
use crate::http::RestClient;
use crate::model::{DataBatch, SourceSpec};
use crate::schema::SchemaMapper;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

/// Canonical column order of a flattened variant row
const ROW_COLUMNS: [&str; 11] = [
    "available",
    "category",
    "code",
    "collection",
    "grams",
    "imageUrl",
    "name",
    "price",
    "requiresShipping",
    "url",
    "variantName",
];

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ProductPage {
    #[serde(default)]
    products: Vec<Product>,
}

#[derive(Debug, Default, Deserialize)]
struct Product {
    #[serde(default)]
    title: String,
    #[serde(default)]
    handle: String,
    #[serde(default)]
    product_type: String,
    #[serde(default)]
    variants: Vec<ProductVariant>,
    #[serde(default)]
    images: Vec<ProductImage>,
}

#[derive(Debug, Default, Deserialize)]
struct ProductVariant {
    #[serde(default)]
    id: u64,
    #[serde(default)]
    available: bool,
    #[serde(default)]
    sku: String,
    #[serde(default)]
    grams: i64,
    #[serde(default)]
    price: String,
    #[serde(default)]
    requires_shipping: bool,
    #[serde(default)]
    option1: Option<String>,
    #[serde(default)]
    option2: Option<String>,
    #[serde(default)]
    option3: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProductImage {
    #[serde(default)]
    src: String,
    #[serde(default)]
    variant_ids: Vec<u64>,
}

// ============================================================================
// Connector
// ============================================================================

/// Page-number paginated extraction of store product listings
pub struct CatalogSource {
    job_id: String,
    mapper: SchemaMapper,
    client: RestClient,
    urls: Vec<String>,
}

impl CatalogSource {
    /// Build the connector from the catalog source section
    pub fn new(job_id: &str, spec: &SourceSpec) -> Result<Self> {
        let catalog = spec
            .catalog
            .as_ref()
            .ok_or_else(|| Error::missing_field("source.catalog"))?;
        Ok(Self {
            job_id: job_id.to_string(),
            mapper: SchemaMapper::new(&spec.schema_mapping),
            client: RestClient::new()?,
            urls: catalog.urls.clone(),
        })
    }
}

#[async_trait]
impl SourceConnector for CatalogSource {
    async fn extract_and_transform(&mut self, handler: &mut dyn BatchHandler) -> Result<()> {
        let descriptors = self.mapper.remap(&ROW_COLUMNS)?;
        for url in self.urls.clone() {
            let mut page_number = 1u32;
            loop {
                debug!(job_id = %self.job_id, url, page_number, "extracting a catalog page");
                let page: ProductPage = self
                    .client
                    .get_json(&format!("{url}/products.json?page={page_number}"))
                    .await?;
                let rows = flatten_page(&url, &page);
                // Zero flattened rows ends pagination for this URL
                if rows.is_empty() {
                    break;
                }
                handler
                    .on_batch(DataBatch::new(descriptors.clone(), rows))
                    .await?;
                page_number += 1;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Flattening
// ============================================================================

/// Flatten every variant of every product into rows in [`ROW_COLUMNS`] order
fn flatten_page(base_url: &str, page: &ProductPage) -> Vec<Vec<Value>> {
    let mut rows = Vec::new();
    for product in &page.products {
        let product_url = format!("{base_url}/products/{}", product.handle);
        for variant in &product.variants {
            rows.push(vec![
                json!(variant.available),
                json!(product.product_type),
                json!(variant.sku),
                json!(""),
                json!(variant.grams),
                json!(variant_image(product, variant.id)),
                json!(product.title),
                json!(variant.price),
                json!(variant.requires_shipping),
                json!(product_url),
                json!(variant_name(variant)),
            ]);
        }
    }
    rows
}

/// Image tied to the variant, else the product's first image, else empty
fn variant_image(product: &Product, variant_id: u64) -> String {
    for image in &product.images {
        if image.variant_ids.contains(&variant_id) {
            return image.src.clone();
        }
    }
    product
        .images
        .first()
        .map(|image| image.src.clone())
        .unwrap_or_default()
}

/// Join the variant's non-empty option values
fn variant_name(variant: &ProductVariant) -> String {
    [&variant.option1, &variant.option2, &variant.option3]
        .iter()
        .filter_map(|option| option.as_deref())
        .filter(|option| !option.is_empty())
        .collect::<Vec<_>>()
        .join(" / ")
}
