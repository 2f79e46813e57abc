//! Optimized-SKU gate.
//!
//! The service publishes which SKUs it optimizes. When it also asks clients to skip
//! inactive SKUs, a request where no item is optimized can be answered with default
//! prices locally. Partial matches still go to the service.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pricing::types::PriceRequest;

/// Optimized SKU list endpoint.
pub const OPTIMIZED_SKUS_PATH: &str = "/pim/v1/variants/optimizedSKUs";

/// Cache key of the optimized SKU list.
pub const OPTIMIZED_SKUS_CACHE_KEY: &str = "spresso.pricing.optimized_skus";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizedSkus {
    /// Unix seconds after which the list must be refetched.
    #[serde(default)]
    pub expires_at: i64,
    #[serde(default)]
    pub skus: HashSet<String>,
    #[serde(default)]
    pub skip_inactive: bool,
}

impl OptimizedSkus {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.expires_at, 0)
    }

    /// True when the service allows skipping and none of the items is optimized.
    pub fn should_skip(&self, requests: &[PriceRequest]) -> bool {
        self.skip_inactive && !requests.iter().any(|r| self.skus.contains(&r.item_id))
    }
}
