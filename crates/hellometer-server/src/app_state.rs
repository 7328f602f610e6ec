//! Shared application state for the hellometer server.
//!
//! Handlers reach the telemetry sinks through this state (axum `State`)
//! rather than process globals. Everything inside is cheap to clone.

use std::sync::Arc;

use hellometer_core::error::Result;

use crate::config::ServiceConfig;
use crate::obs::{Counter, MeterProvider, StatsdClient, HELLO_COUNTER};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: ServiceConfig,
    meter: MeterProvider,
    hello_counter: Counter,
    statsd: StatsdClient,
}

impl AppState {
    /// Build application state and register the request counter.
    ///
    /// Must run before `meter.start`, which freezes registration.
    pub fn new(cfg: ServiceConfig, meter: MeterProvider, statsd: StatsdClient) -> Result<Self> {
        let hello_counter = meter.counter(HELLO_COUNTER, "Total number of hello requests")?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                meter,
                hello_counter,
                statsd,
            }),
        })
    }

    pub fn cfg(&self) -> &ServiceConfig {
        &self.inner.cfg
    }

    pub fn meter(&self) -> &MeterProvider {
        &self.inner.meter
    }

    pub fn hello_counter(&self) -> &Counter {
        &self.inner.hello_counter
    }

    pub fn statsd(&self) -> &StatsdClient {
        &self.inner.statsd
    }
}
