//! Test doubles shared by the server integration tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use hellometer_core::error::{HellometerError, Result};
use hellometer_core::RetryPolicy;
use hellometer_server::app_state::AppState;
use hellometer_server::config::ServiceConfig;
use hellometer_server::obs::{
    ExportBatch, MeterProvider, MetricsTransport, RetryingExporter, StatsdClient, StatsdTransport,
};

/// Keeps every exported batch in memory.
#[derive(Default)]
pub struct MemoryExporter {
    pub batches: Mutex<Vec<ExportBatch>>,
}

impl MemoryExporter {
    pub fn last_value(&self, name: &str) -> Option<u64> {
        let b = self.batches.lock().unwrap();
        b.last().and_then(|b| b.point(name)).map(|p| p.value)
    }
}

#[async_trait]
impl MetricsTransport for MemoryExporter {
    async fn export(&self, batch: &ExportBatch) -> Result<()> {
        self.batches.lock().unwrap().push(batch.clone());
        Ok(())
    }
}

/// Collector that is never reachable.
#[derive(Default)]
pub struct DownExporter {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl MetricsTransport for DownExporter {
    async fn export(&self, _batch: &ExportBatch) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(HellometerError::Transport("connection refused".into()))
    }
}

/// Captures StatsD datagrams as text.
#[derive(Default)]
pub struct MemoryStatsd {
    pub packets: Mutex<Vec<String>>,
}

impl MemoryStatsd {
    pub fn total(&self, line_prefix: &str) -> i64 {
        self.packets
            .lock()
            .unwrap()
            .iter()
            .flat_map(|p| p.split('\n').map(str::to_string).collect::<Vec<_>>())
            .filter_map(|l| {
                l.strip_prefix(line_prefix)
                    .and_then(|rest| rest.strip_suffix("|c"))
                    .map(|v| v.parse::<i64>().unwrap())
            })
            .sum()
    }
}

#[async_trait]
impl StatsdTransport for MemoryStatsd {
    async fn send(&self, packet: Bytes) -> Result<()> {
        self.packets
            .lock()
            .unwrap()
            .push(String::from_utf8(packet.to_vec()).unwrap());
        Ok(())
    }
}

/// App state over in-memory sinks, with the reader already started.
pub fn state_with(
    exporter: Arc<dyn MetricsTransport>,
    policy: RetryPolicy,
    statsd: Arc<MemoryStatsd>,
) -> AppState {
    let cfg = ServiceConfig::default();
    let meter = MeterProvider::new("gin-server", "gin-server");
    let client = StatsdClient::with_transport(statsd, "gin-app", Duration::from_secs(1), 1432);
    let state = AppState::new(cfg, meter.clone(), client).unwrap();
    meter
        .start(RetryingExporter::new(exporter, policy), Duration::from_secs(5))
        .unwrap();
    state
}
