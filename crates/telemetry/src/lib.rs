//! Telemetry emitter: buffered, batched delivery of pipeline events to an
//! external analytics sink.
//!
//! The emitter is a side channel by design — [`TelemetryEmitter::record`]
//! never performs I/O, never blocks, and never fails the caller. A dead or
//! slow sink costs telemetry, not message throughput.

pub mod emitter;
pub mod sink;

pub use {
    emitter::TelemetryEmitter,
    sink::{AnalyticsSink, HttpSink, NoopSink, SinkError},
};
