//! Service config loader (strict YAML + environment overrides).
//!
//! Resolution order: built-in defaults, then the optional YAML file named by
//! `HELLOMETER_CONFIG`, then the well-known environment variables below.
//! The result is validated once and never changes afterwards.

pub mod schema;

use std::fs;

use hellometer_core::error::{HellometerError, Result};

pub use schema::{
    OtlpSection, RetrySection, ServerSection, ServiceConfig, ShutdownSection, StatsdSection,
    TransportSecurity,
};

pub const ENV_CONFIG_FILE: &str = "HELLOMETER_CONFIG";
pub const ENV_OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
pub const ENV_STATSD_ADDR: &str = "STATSD_ADDR";
pub const ENV_PORT: &str = "PORT";

pub fn load_from_file(path: &str) -> Result<ServiceConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| HellometerError::Config(format!("read config {path} failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<ServiceConfig> {
    let cfg: ServiceConfig = serde_yaml::from_str(s)
        .map_err(|e| HellometerError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Resolve config from the process environment.
pub fn load() -> Result<ServiceConfig> {
    resolve(|k| std::env::var(k).ok())
}

/// Resolve config from an arbitrary variable lookup.
pub fn resolve<F>(lookup: F) -> Result<ServiceConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut cfg = match non_empty(&lookup, ENV_CONFIG_FILE) {
        Some(path) => load_from_file(&path)?,
        None => ServiceConfig::default(),
    };

    if let Some(ep) = non_empty(&lookup, ENV_OTLP_ENDPOINT) {
        cfg.otlp.endpoint = ep;
    }
    if let Some(addr) = non_empty(&lookup, ENV_STATSD_ADDR) {
        cfg.statsd.addr = addr;
    }
    if let Some(port) = non_empty(&lookup, ENV_PORT) {
        cfg.server.port = port
            .parse()
            .map_err(|e| HellometerError::Config(format!("{ENV_PORT}={port:?}: {e}")))?;
    }

    cfg.validate()?;
    Ok(cfg)
}

// Empty values fall back to defaults, same as unset.
fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty())
}
