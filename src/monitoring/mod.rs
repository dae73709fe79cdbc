//! Monitoring Module
//!
//! Provides observability for fedcoord:
//! - Coordinator metrics
//! - Structured logging setup

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
pub use metrics::{CoordinatorMetrics, Counter, Gauge, MetricsSnapshot};
