//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! pacing loops, relay, config watcher
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape)
//! ```

pub mod logging;
pub mod metrics;
