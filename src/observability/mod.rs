//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured fields: operation, item, error kind)
//!     → metrics.rs (counters, histograms via the `metrics` facade)
//!
//! Consumers (installed by the embedding application):
//!     → logging.rs subscriber (stdout, pretty or JSON)
//!     → any `metrics` recorder/exporter
//! ```
//!
//! # Design Decisions
//! - The library never installs a subscriber or recorder on its own
//! - Request ID flows into every outbound call and its log lines

pub mod logging;
pub mod metrics;
