//! Telemetry sinks.
//!
//! Two independent pipelines fed by the request path:
//! - OTLP: `MeterProvider` counters -> `PeriodicReader` -> `RetryingExporter`
//!   -> `OtlpGrpcTransport`
//! - StatsD: `StatsdClient` buffer -> flush timer -> UDP
//!
//! Recording on either side is in-memory and never waits on the network.

pub mod exporter;
pub mod metrics;
pub mod otlp;
pub mod reader;
pub mod statsd;

pub use exporter::{MetricsTransport, RetryingExporter};
pub use metrics::{Counter, CounterPoint, ExportBatch, MeterProvider, MetricProducer, HELLO_COUNTER};
pub use otlp::OtlpGrpcTransport;
pub use reader::PeriodicReader;
pub use statsd::{StatsdClient, StatsdTransport, UdpTransport, HELLO_REQUESTS_KEY};
