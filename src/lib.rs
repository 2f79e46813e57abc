//! Resilient client for the Spresso price optimization API.

pub mod auth;
pub mod cache;
pub mod config;
pub mod http;
pub mod observability;
pub mod pricing;
pub mod resilience;

pub use auth::{AccessToken, AuthError, TokenProvider};
pub use cache::{MemoryCache, ResponseCache};
pub use config::schema::ClientConfig;
pub use http::RequestMetadata;
pub use pricing::{PriceOptimizationClient, PriceOptimizationResult, PriceRequest, SpressoError};
pub use resilience::Resolved;
