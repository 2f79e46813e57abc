//! Price verification.
//!
//! Checks whether prices shown to users are still honoured by the service.

use serde::{Deserialize, Deserializer, Serialize};
use tokio_util::sync::CancellationToken;

use crate::http::ApiRequest;
use crate::pricing::client::{BatchBody, PriceOptimizationClient};
use crate::pricing::types::{code_or_name, PriceOutcome, SpressoError, MAX_REQUEST_SIZE};
use crate::resilience::Resolved;

/// Price verification endpoint.
pub const PRICE_VERIFICATION_PATH: &str = "/pim/v1/prices/verify";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceVerificationRequest {
    pub item_id: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl PriceVerificationRequest {
    pub fn new(item_id: impl Into<String>, price: f64) -> Self {
        Self {
            item_id: item_id.into(),
            price,
            device_id: None,
        }
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PriceStatus {
    Invalid,
    SpressoPrice,
    DevicePrice,
}

impl<'de> Deserialize<'de> for PriceStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        code_or_name(
            deserializer,
            &[
                (0, "Invalid", PriceStatus::Invalid),
                (1, "SpressoPrice", PriceStatus::SpressoPrice),
                (2, "DevicePrice", PriceStatus::DevicePrice),
            ],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceVerification {
    pub item_id: String,
    #[serde(default)]
    pub device_id: String,
    pub price: f64,
    pub price_status: PriceStatus,
    #[serde(default)]
    pub current_valid_price: Option<f64>,
}

impl PriceVerification {
    pub fn is_valid(&self) -> bool {
        self.price_status != PriceStatus::Invalid
    }
}

impl PriceOptimizationClient {
    /// Verify a batch of prices. Failures degrade to an empty list.
    pub async fn verify_prices(
        &self,
        requests: &[PriceVerificationRequest],
        cancel: &CancellationToken,
    ) -> PriceOutcome<Vec<PriceVerification>> {
        let executor = &self.inner.executors.verify;

        if requests.len() > MAX_REQUEST_SIZE {
            tracing::error!(size = requests.len(), max = MAX_REQUEST_SIZE, "Verification batch too large");
            return executor.recover(Err(SpressoError::BadRequest), |_| Vec::new());
        }
        if requests.is_empty() {
            return Ok(Resolved::ok(Vec::new()));
        }

        let outcome = executor
            .execute(cancel, || async move {
                let token = self.token(cancel).await?;
                let request = ApiRequest::post("verify_prices", PRICE_VERIFICATION_PATH, &BatchBody { requests })?
                    .bearer(token.value);
                Ok::<Vec<PriceVerification>, SpressoError>(self.inner.api.send(request).await?)
            })
            .await;

        executor.recover(outcome, |_| Vec::new())
    }
}
