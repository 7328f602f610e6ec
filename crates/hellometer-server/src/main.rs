//! hellometer server
//!
//! `GET /hello`, counted twice: an OTLP counter exported over gRPC every few
//! seconds, and a StatsD counter flushed over UDP every second.

use std::process::ExitCode;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hellometer_server::{config, lifecycle};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, disposition = e.disposition().as_str(), "config resolution failed");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        port = cfg.server.port,
        otlp_endpoint = %cfg.otlp.endpoint,
        statsd_addr = %cfg.statsd.addr,
        "hellometer starting"
    );

    match lifecycle::run(cfg).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, disposition = e.disposition().as_str(), "hellometer exiting");
            ExitCode::FAILURE
        }
    }
}
