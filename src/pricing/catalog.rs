//! Catalog updates.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::http::ApiRequest;
use crate::pricing::client::{BatchBody, PriceOptimizationClient};
use crate::pricing::types::{PriceOutcome, SpressoError, MAX_REQUEST_SIZE};
use crate::resilience::Resolved;

/// Catalog variants endpoint.
pub const CATALOG_PATH: &str = "/pim/v1/variants";

/// One product variant pushed to the service's catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogUpdate {
    pub sku: String,
    pub name: String,
    pub cost: f64,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msrp_price: Option<f64>,
}

impl CatalogUpdate {
    pub fn new(sku: impl Into<String>, name: impl Into<String>, cost: f64, price: f64) -> Self {
        Self {
            sku: sku.into(),
            name: name.into(),
            cost,
            price,
            product_id: None,
            category: None,
            upc: None,
            brand: None,
            map_price: None,
            msrp_price: None,
        }
    }
}

impl PriceOptimizationClient {
    /// Push catalog changes.
    pub async fn update_catalog(&self, updates: &[CatalogUpdate], cancel: &CancellationToken) -> PriceOutcome<()> {
        let executor = &self.inner.executors.catalog;

        if updates.len() > MAX_REQUEST_SIZE {
            tracing::error!(size = updates.len(), max = MAX_REQUEST_SIZE, "Catalog batch too large");
            return executor.recover(Err(SpressoError::BadRequest), |_| ());
        }
        if updates.is_empty() {
            return Ok(Resolved::ok(()));
        }

        let outcome = executor
            .execute(cancel, || async move {
                let token = self.token(cancel).await?;
                let request = ApiRequest::put("update_catalog", CATALOG_PATH, &BatchBody { requests: updates })?
                    .bearer(token.value);
                self.inner.api.send_raw(request).await?;
                Ok::<(), SpressoError>(())
            })
            .await;

        if outcome.is_ok() {
            tracing::debug!(variants = updates.len(), "Catalog updated");
        }
        executor.recover(outcome, |_| ())
    }
}
