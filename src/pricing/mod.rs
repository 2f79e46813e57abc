//! Pricing subsystem.
//!
//! # Data Flow
//! ```text
//! PriceOptimizationClient::get_prices(requests, user_agent)
//!     → batch size check              (> 500 → BadRequest, no I/O)
//!     → skus.rs                       (optional: no optimized item → default prices)
//!     → overrides.rs                  (user agent matches active rule → default prices)
//!     → ResponseCache["{namespace}.{deviceId}.{itemId}"]  (hits kept at their index)
//!     → ResilientExecutor("get_prices")
//!         → TokenProvider::get_token  (failure → AuthError)
//!         → POST /pim/v1/prices {requests: misses}
//!     → zip response[i] to miss index i, cache each
//!     → fallback: default, unoptimized prices for every request + typed error
//! ```
//!
//! # Design Decisions
//! - Results always come back in request order
//! - A fallback result is never marked optimized
//! - verification.rs and catalog.rs share the token and HTTP plumbing but not the fallback data

pub mod catalog;
pub mod client;
pub mod overrides;
pub mod skus;
pub mod types;
pub mod verification;

pub use catalog::CatalogUpdate;
pub use client::{CircuitSnapshot, PriceOptimizationClient, PRICES_PATH};
pub use overrides::{UserAgentOverrides, UserAgentRule, UserAgentStatus};
pub use skus::OptimizedSkus;
pub use types::{
    fallback_batch, PriceOptimizationResult, PriceOutcome, PriceRequest, SpressoError, MAX_REQUEST_SIZE,
};
pub use verification::{PriceStatus, PriceVerification, PriceVerificationRequest};
