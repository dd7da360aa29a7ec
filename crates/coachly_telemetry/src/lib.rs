#![forbid(unsafe_code)]

pub mod chat_metrics;
pub mod error;
pub mod export;
pub mod logger;
pub mod monitor;
pub mod registry;

#[cfg(test)]
mod chat_metrics_tests;


pub use chat_metrics::{ChatMetrics, ChatMetricsSummary};
pub use error::{ChatErrorKind, Retryability, UserImpact};
pub use export::render_prometheus;
pub use logger::ChatLogger;
pub use monitor::{ChatHealthStatus, ChatSystemMonitor, HealthCheckHandle, HealthState};
pub use registry::{Labels, MetricsRegistry};
