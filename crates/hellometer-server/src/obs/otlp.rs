//! OTLP/gRPC metrics transport.
//!
//! Batches become one `ResourceMetrics` holding one `ScopeMetrics`, with a
//! cumulative monotonic `Sum` per counter. The channel is built lazily so a
//! collector that is down at startup does not block serving.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use opentelemetry_proto::tonic::collector::metrics::v1::{
    metrics_service_client::MetricsServiceClient, ExportMetricsServiceRequest,
};
use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, InstrumentationScope, KeyValue};
use opentelemetry_proto::tonic::metrics::v1::{
    metric, number_data_point, AggregationTemporality, Metric, NumberDataPoint, ResourceMetrics,
    ScopeMetrics, Sum,
};
use opentelemetry_proto::tonic::resource::v1::Resource;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Status};

use hellometer_core::error::{HellometerError, Result};

use super::exporter::MetricsTransport;
use super::metrics::ExportBatch;
use crate::config::OtlpSection;

pub struct OtlpGrpcTransport {
    client: MetricsServiceClient<Channel>,
    endpoint: String,
}

impl OtlpGrpcTransport {
    /// Build the channel. Fails only on a malformed endpoint; the collector
    /// itself is contacted on first export.
    pub fn connect(cfg: &OtlpSection) -> Result<Self> {
        let uri = cfg.endpoint_uri();
        let endpoint = Endpoint::from_shared(uri.clone())
            .map_err(|e| HellometerError::Config(format!("invalid otlp endpoint {uri:?}: {e}")))?
            .timeout(cfg.timeout())
            .connect_timeout(cfg.timeout());

        tracing::info!(endpoint = %uri, "otlp metrics transport configured");
        Ok(Self {
            client: MetricsServiceClient::new(endpoint.connect_lazy()),
            endpoint: uri,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl MetricsTransport for OtlpGrpcTransport {
    async fn export(&self, batch: &ExportBatch) -> Result<()> {
        let mut client = self.client.clone();
        let resp = client
            .export(to_request(batch))
            .await
            .map_err(status_to_error)?
            .into_inner();

        if let Some(partial) = resp.partial_success {
            if partial.rejected_data_points > 0 {
                tracing::warn!(
                    rejected = partial.rejected_data_points,
                    message = %partial.error_message,
                    "collector rejected part of metrics batch"
                );
            }
        }
        Ok(())
    }
}

/// gRPC codes worth another attempt; everything else is permanent.
fn status_to_error(status: Status) -> HellometerError {
    let msg = format!("{:?}: {}", status.code(), status.message());
    match status.code() {
        Code::Cancelled
        | Code::DeadlineExceeded
        | Code::ResourceExhausted
        | Code::Aborted
        | Code::OutOfRange
        | Code::Unavailable
        | Code::DataLoss => HellometerError::Transport(msg),
        _ => HellometerError::Rejected(msg),
    }
}

fn unix_nanos(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn string_attr(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue {
            value: Some(any_value::Value::StringValue(value.to_string())),
        }),
    }
}

pub fn to_request(batch: &ExportBatch) -> ExportMetricsServiceRequest {
    let start = unix_nanos(batch.start_time);
    let now = unix_nanos(batch.time);

    let metrics = batch
        .points
        .iter()
        .map(|p| Metric {
            name: p.name.clone(),
            description: p.description.clone(),
            data: Some(metric::Data::Sum(Sum {
                data_points: vec![NumberDataPoint {
                    start_time_unix_nano: start,
                    time_unix_nano: now,
                    value: Some(number_data_point::Value::AsInt(
                        i64::try_from(p.value).unwrap_or(i64::MAX),
                    )),
                    ..Default::default()
                }],
                aggregation_temporality: AggregationTemporality::Cumulative as i32,
                is_monotonic: true,
            })),
            ..Default::default()
        })
        .collect();

    ExportMetricsServiceRequest {
        resource_metrics: vec![ResourceMetrics {
            resource: Some(Resource {
                attributes: vec![string_attr("service.name", &batch.service_name)],
                ..Default::default()
            }),
            scope_metrics: vec![ScopeMetrics {
                scope: Some(InstrumentationScope {
                    name: batch.scope.clone(),
                    ..Default::default()
                }),
                metrics,
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obs::metrics::CounterPoint;

    #[test]
    fn batch_maps_to_cumulative_sums() {
        let start = UNIX_EPOCH + std::time::Duration::from_secs(10);
        let batch = ExportBatch {
            scope: "gin-server".into(),
            service_name: "gin-server".into(),
            start_time: start,
            time: start + std::time::Duration::from_secs(5),
            points: vec![CounterPoint {
                name: "hello_requests_total".into(),
                description: "Total number of hello requests".into(),
                value: 42,
            }],
        };

        let req = to_request(&batch);
        let rm = &req.resource_metrics[0];
        let attrs = &rm.resource.as_ref().unwrap().attributes;
        assert_eq!(attrs[0].key, "service.name");

        let sm = &rm.scope_metrics[0];
        assert_eq!(sm.scope.as_ref().unwrap().name, "gin-server");
        let m = &sm.metrics[0];
        assert_eq!(m.name, "hello_requests_total");

        let Some(metric::Data::Sum(sum)) = &m.data else {
            panic!("expected sum");
        };
        assert!(sum.is_monotonic);
        assert_eq!(
            sum.aggregation_temporality,
            AggregationTemporality::Cumulative as i32
        );
        let dp = &sum.data_points[0];
        assert_eq!(dp.start_time_unix_nano, 10_000_000_000);
        assert_eq!(dp.time_unix_nano, 15_000_000_000);
        assert_eq!(dp.value, Some(number_data_point::Value::AsInt(42)));
    }

    #[test]
    fn retryable_grpc_codes() {
        assert!(status_to_error(Status::unavailable("down")).is_retryable());
        assert!(status_to_error(Status::deadline_exceeded("slow")).is_retryable());
        assert!(!status_to_error(Status::invalid_argument("bad")).is_retryable());
        assert!(!status_to_error(Status::unauthenticated("who")).is_retryable());
    }

    #[tokio::test]
    async fn malformed_endpoint_is_config_error() {
        let cfg = OtlpSection {
            endpoint: "http://bad host:4317".into(),
            ..OtlpSection::default()
        };
        assert!(matches!(
            OtlpGrpcTransport::connect(&cfg),
            Err(HellometerError::Config(_))
        ));
    }

    #[tokio::test]
    async fn bare_host_port_gets_http_scheme() {
        let t = OtlpGrpcTransport::connect(&OtlpSection::default()).unwrap();
        assert_eq!(t.endpoint(), "http://localhost:4317");
    }
}
