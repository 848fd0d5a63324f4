//! # securechat-observability
//!
//! Observability-Crate fuer SecureChat:
//! - Prometheus-kompatible Kanal-Metriken (Textformat via `exportieren`)
//! - Structured Logging (text/json) via tracing-subscriber

pub mod logging;
pub mod metrics;

pub use logging::logging_initialisieren;
pub use metrics::{KanalMetriken, VerwerfGrund};
