use std::time::Duration;

use hellometer_core::error::{HellometerError, Result};
use hellometer_core::protocol::statsd::{validate_name, DEFAULT_MAX_PACKET_BYTES};
use hellometer_core::RetryPolicy;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub otlp: OtlpSection,

    #[serde(default)]
    pub statsd: StatsdSection,

    #[serde(default)]
    pub shutdown: ShutdownSection,
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<()> {
        self.otlp.validate()?;
        self.statsd.validate()?;
        self.shutdown.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

fn default_port() -> u16 {
    8888
}

/// Channel security for the OTLP exporter. Only plaintext gRPC is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportSecurity {
    #[default]
    Insecure,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OtlpSection {
    #[serde(default = "default_otlp_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub security: TransportSecurity,

    #[serde(default = "default_export_interval_ms")]
    pub export_interval_ms: u64,

    /// Per-request timeout applied by the gRPC channel.
    #[serde(default = "default_export_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[serde(default = "default_meter_name")]
    pub meter_name: String,

    #[serde(default)]
    pub retry: RetrySection,
}

impl Default for OtlpSection {
    fn default() -> Self {
        Self {
            endpoint: default_otlp_endpoint(),
            security: TransportSecurity::default(),
            export_interval_ms: default_export_interval_ms(),
            timeout_ms: default_export_timeout_ms(),
            service_name: default_service_name(),
            meter_name: default_meter_name(),
            retry: RetrySection::default(),
        }
    }
}

impl OtlpSection {
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(HellometerError::Config("otlp.endpoint must not be empty".into()));
        }
        if self.export_interval_ms == 0 {
            return Err(HellometerError::Config(
                "otlp.export_interval_ms must be greater than 0".into(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(HellometerError::Config("otlp.timeout_ms must be greater than 0".into()));
        }
        if self.meter_name.is_empty() {
            return Err(HellometerError::Config("otlp.meter_name must not be empty".into()));
        }
        self.retry.validate()
    }

    pub fn export_interval(&self) -> Duration {
        Duration::from_millis(self.export_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Endpoint as a URI. Bare `host:port` values get the scheme implied by
    /// the security mode.
    pub fn endpoint_uri(&self) -> String {
        let ep = self.endpoint.trim();
        if ep.contains("://") {
            return ep.to_string();
        }
        match self.security {
            TransportSecurity::Insecure => format!("http://{ep}"),
        }
    }
}

fn default_otlp_endpoint() -> String {
    "localhost:4317".into()
}
fn default_export_interval_ms() -> u64 {
    5000
}
fn default_export_timeout_ms() -> u64 {
    3000
}
fn default_service_name() -> String {
    "gin-server".into()
}
fn default_meter_name() -> String {
    "gin-server".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,

    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,

    #[serde(default = "default_max_elapsed_ms")]
    pub max_elapsed_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_interval_ms: default_initial_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            max_elapsed_ms: default_max_elapsed_ms(),
        }
    }
}

impl RetrySection {
    pub fn validate(&self) -> Result<()> {
        if self.initial_interval_ms == 0 {
            return Err(HellometerError::Config(
                "otlp.retry.initial_interval_ms must be greater than 0".into(),
            ));
        }
        if self.max_interval_ms < self.initial_interval_ms {
            return Err(HellometerError::Config(
                "otlp.retry.max_interval_ms must be >= initial_interval_ms".into(),
            ));
        }
        if self.enabled && self.max_elapsed_ms < self.initial_interval_ms {
            return Err(HellometerError::Config(
                "otlp.retry.max_elapsed_ms must be >= initial_interval_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            enabled: self.enabled,
            initial_interval: Duration::from_millis(self.initial_interval_ms),
            max_interval: Duration::from_millis(self.max_interval_ms),
            max_elapsed_time: Duration::from_millis(self.max_elapsed_ms),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_initial_interval_ms() -> u64 {
    1000
}
fn default_max_interval_ms() -> u64 {
    10_000
}
fn default_max_elapsed_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatsdSection {
    #[serde(default = "default_statsd_addr")]
    pub addr: String,

    #[serde(default = "default_statsd_prefix")]
    pub prefix: String,

    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    #[serde(default = "default_max_packet_bytes")]
    pub max_packet_bytes: usize,
}

impl Default for StatsdSection {
    fn default() -> Self {
        Self {
            addr: default_statsd_addr(),
            prefix: default_statsd_prefix(),
            flush_interval_ms: default_flush_interval_ms(),
            max_packet_bytes: default_max_packet_bytes(),
        }
    }
}

impl StatsdSection {
    pub fn validate(&self) -> Result<()> {
        if self.addr.rsplit_once(':').map_or(true, |(host, port)| {
            host.is_empty() || port.parse::<u16>().is_err()
        }) {
            return Err(HellometerError::Config(format!(
                "statsd.addr must be host:port, got {:?}",
                self.addr
            )));
        }
        if !self.prefix.is_empty() {
            validate_name(&self.prefix)?;
        }
        if self.flush_interval_ms == 0 {
            return Err(HellometerError::Config(
                "statsd.flush_interval_ms must be greater than 0".into(),
            ));
        }
        if !(512..=65_507).contains(&self.max_packet_bytes) {
            return Err(HellometerError::Config(
                "statsd.max_packet_bytes must be between 512 and 65507".into(),
            ));
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

fn default_statsd_addr() -> String {
    "localhost:8125".into()
}
fn default_statsd_prefix() -> String {
    "gin-app".into()
}
fn default_flush_interval_ms() -> u64 {
    1000
}
fn default_max_packet_bytes() -> usize {
    DEFAULT_MAX_PACKET_BYTES
}

/// Per-sink drain deadlines.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShutdownSection {
    #[serde(default = "default_otlp_deadline_ms")]
    pub otlp_deadline_ms: u64,

    #[serde(default = "default_statsd_deadline_ms")]
    pub statsd_deadline_ms: u64,
}

impl Default for ShutdownSection {
    fn default() -> Self {
        Self {
            otlp_deadline_ms: default_otlp_deadline_ms(),
            statsd_deadline_ms: default_statsd_deadline_ms(),
        }
    }
}

impl ShutdownSection {
    pub fn validate(&self) -> Result<()> {
        if self.otlp_deadline_ms == 0 || self.statsd_deadline_ms == 0 {
            return Err(HellometerError::Config(
                "shutdown deadlines must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn otlp_deadline(&self) -> Duration {
        Duration::from_millis(self.otlp_deadline_ms)
    }

    pub fn statsd_deadline(&self) -> Duration {
        Duration::from_millis(self.statsd_deadline_ms)
    }
}

fn default_otlp_deadline_ms() -> u64 {
    10_000
}
fn default_statsd_deadline_ms() -> u64 {
    2000
}
