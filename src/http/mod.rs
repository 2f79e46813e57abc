//! Outbound HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! TokenProvider / PriceOptimizationClient
//!     → request.rs  (ApiRequest: method, path, query, JSON body, bearer, caller metadata)
//!     → client.rs   (base URL + debug parameters, x-request-id, per-attempt timeout)
//!     → reqwest
//!     → response.rs (status / transport error → ApiFailure)
//!     → caller maps ApiFailure into AuthError or SpressoError
//! ```
//!
//! # Design Decisions
//! - One `reqwest::Client` per remote service; connection pooling belongs to reqwest
//! - The per-attempt HTTP timeout lives here, the overall deadline in the executor
//! - Timeouts and refused connections are distinguished from other transport errors

pub mod client;
pub mod request;
pub mod response;

pub use client::{ApiClient, ClientBuildError};
pub use request::{ApiRequest, RequestMetadata, X_REAL_COOKIE, X_REAL_IP, X_REQUEST_ID};
pub use response::ApiFailure;
