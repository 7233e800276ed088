//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! dispatcher, static index, server:
//!     → tracing events (logging.rs installs the subscriber)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the configured level
//! - Recording metrics without an installed exporter is a no-op

pub mod logging;
pub mod metrics;
