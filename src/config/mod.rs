//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → handed to TokenProvider / PriceOptimizationClient constructors
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Programmatic construction skips the loader; executors clamp out-of-range values instead

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::AuthConfig;
pub use schema::ClientConfig;
pub use schema::LogFormat;
pub use schema::ObservabilityConfig;
pub use schema::OverrideFetchPolicy;
pub use schema::PricingConfig;
pub use schema::ResiliencyConfig;
