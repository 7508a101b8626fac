//! Telemetry: durable invocation log with live observer fan-out.
//!
//! The [`store`] persists every tool invocation in SQLite; the [`sink`]
//! fronts it with a bounded queue, a single writer task, observer broadcast,
//! and retention sweeping. Tool handlers talk only to the sink.

pub mod sink;
pub mod store;

pub use sink::{SinkStatistics, TelemetrySink};
pub use store::{InvocationLogEntry, LogStatus, TelemetrySession, TelemetryStore};
