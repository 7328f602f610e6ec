//! Meter provider and counter instruments.
//!
//! Counters are `AtomicU64` cells in a `DashMap` registry keyed by name, the
//! same shape as a labelled counter vec without labels. `Counter::add` is a
//! single relaxed atomic add, so request handlers never block or fail on
//! instrumentation. Values are cumulative; the periodic reader snapshots them
//! into an [`ExportBatch`] on every tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use dashmap::DashMap;

use hellometer_core::error::{HellometerError, Result};

use super::exporter::RetryingExporter;
use super::reader::PeriodicReader;

/// Counter incremented once per `/hello` request.
pub const HELLO_COUNTER: &str = "hello_requests_total";

struct CounterCell {
    description: String,
    value: AtomicU64,
}

/// Handle to a registered counter. Cheap to clone.
#[derive(Clone)]
pub struct Counter {
    cell: Arc<CounterCell>,
}

impl Counter {
    /// Add `n` to the running total.
    pub fn add(&self, n: u64) {
        self.cell.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Current cumulative value.
    pub fn value(&self) -> u64 {
        self.cell.value.load(Ordering::Relaxed)
    }
}

/// One counter's value inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterPoint {
    pub name: String,
    pub description: String,
    pub value: u64,
}

/// Snapshot of every instrument at one instant. Exported once, then dropped.
#[derive(Debug, Clone)]
pub struct ExportBatch {
    pub scope: String,
    pub service_name: String,
    pub start_time: SystemTime,
    pub time: SystemTime,
    pub points: Vec<CounterPoint>,
}

impl ExportBatch {
    pub fn point(&self, name: &str) -> Option<&CounterPoint> {
        self.points.iter().find(|p| p.name == name)
    }
}

/// Source of export batches for a periodic reader.
pub trait MetricProducer: Send + Sync + 'static {
    fn produce(&self) -> ExportBatch;
}

struct Registry {
    scope: String,
    service_name: String,
    start_time: SystemTime,
    instruments: DashMap<String, Arc<CounterCell>>,
}

impl MetricProducer for Registry {
    fn produce(&self) -> ExportBatch {
        let mut points: Vec<CounterPoint> = self
            .instruments
            .iter()
            .map(|r| CounterPoint {
                name: r.key().clone(),
                description: r.value().description.clone(),
                value: r.value().value.load(Ordering::Relaxed),
            })
            .collect();
        points.sort_by(|a, b| a.name.cmp(&b.name));

        ExportBatch {
            scope: self.scope.clone(),
            service_name: self.service_name.clone(),
            start_time: self.start_time,
            time: SystemTime::now(),
            points,
        }
    }
}

enum ProviderState {
    Building,
    Running(PeriodicReader),
    Stopped,
}

/// Process-wide instrument registry. Owns the periodic reader once started.
#[derive(Clone)]
pub struct MeterProvider {
    registry: Arc<Registry>,
    state: Arc<Mutex<ProviderState>>,
}

impl MeterProvider {
    pub fn new(scope: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            registry: Arc::new(Registry {
                scope: scope.into(),
                service_name: service_name.into(),
                start_time: SystemTime::now(),
                instruments: DashMap::new(),
            }),
            state: Arc::new(Mutex::new(ProviderState::Building)),
        }
    }

    /// Register a counter. Only allowed before [`MeterProvider::start`].
    ///
    /// Registering an existing name returns the same instrument.
    pub fn counter(&self, name: &str, description: &str) -> Result<Counter> {
        if name.is_empty() {
            return Err(HellometerError::Config("instrument name must not be empty".into()));
        }

        // Held across the insert so registration cannot race with start().
        let state = self.lock_state()?;
        if !matches!(*state, ProviderState::Building) {
            return Err(HellometerError::Config(format!(
                "cannot register {name:?}: meter provider already exporting"
            )));
        }

        let cell = self
            .registry
            .instruments
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(CounterCell {
                    description: description.to_string(),
                    value: AtomicU64::new(0),
                })
            })
            .clone();
        drop(state);

        if cell.description != description {
            tracing::warn!(
                instrument = %name,
                registered = %cell.description,
                requested = %description,
                "counter re-registered with a different description"
            );
        }
        Ok(Counter { cell })
    }

    /// Start periodic export. Freezes the instrument set.
    pub fn start(&self, exporter: RetryingExporter, interval: Duration) -> Result<()> {
        let mut state = self.lock_state()?;
        if !matches!(*state, ProviderState::Building) {
            return Err(HellometerError::Config("meter provider already started".into()));
        }

        let producer: Arc<dyn MetricProducer> = self.registry.clone();
        *state = ProviderState::Running(PeriodicReader::spawn(producer, exporter, interval));

        tracing::info!(
            scope = %self.registry.scope,
            instruments = self.registry.instruments.len(),
            interval_ms = interval.as_millis() as u64,
            "meter provider exporting"
        );
        Ok(())
    }

    /// Snapshot all instruments now.
    pub fn collect(&self) -> ExportBatch {
        self.registry.produce()
    }

    pub fn is_running(&self) -> bool {
        self.state
            .lock()
            .map(|s| matches!(*s, ProviderState::Running(_)))
            .unwrap_or(false)
    }

    /// Stop the reader, flush once more, release the transport.
    ///
    /// Returns `Timeout` when the deadline cut the final flush short. Calling
    /// it again, or on a provider that never started, is a no-op.
    pub async fn shutdown(&self, deadline: Duration) -> Result<()> {
        let previous = {
            let mut state = self.lock_state()?;
            std::mem::replace(&mut *state, ProviderState::Stopped)
        };

        match previous {
            ProviderState::Running(reader) => reader.shutdown(deadline).await,
            ProviderState::Building | ProviderState::Stopped => Ok(()),
        }
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, ProviderState>> {
        self.state
            .lock()
            .map_err(|_| HellometerError::Internal("meter provider state poisoned".into()))
    }
}
