//! # sprechfunk-observability
//!
//! Observability-Crate fuer Sprechfunk:
//! - Prometheus-kompatible Floor-Metriken
//! - Structured Logging (Text oder JSON) via tracing-subscriber

pub mod logging;
pub mod metrics;

pub use logging::logging_initialisieren;
pub use metrics::FloorMetrics;
