//! Startup and shutdown sequencing.
//!
//! Phases move strictly forward:
//! `Uninitialized -> ClientsStarting -> Serving -> Draining -> Closed`.
//!
//! Startup order (to avoid serving uninstrumented traffic):
//! 1. Connect the StatsD client
//! 2. Build the OTLP transport, register counters, start the periodic reader
//! 3. Bind the listener and start accepting
//!
//! Shutdown order (to avoid losing counts):
//! 1. Stop accepting; let in-flight requests finish
//! 2. Shut down the meter provider and close StatsD in parallel, each bounded
//!    by its own deadline

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use hellometer_core::error::{HellometerError, Result};

use crate::app_state::AppState;
use crate::config::ServiceConfig;
use crate::obs::{MeterProvider, OtlpGrpcTransport, RetryingExporter, StatsdClient};
use crate::router;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Uninitialized,
    ClientsStarting,
    Serving,
    Draining,
    Closed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Uninitialized => "uninitialized",
            Phase::ClientsStarting => "clients_starting",
            Phase::Serving => "serving",
            Phase::Draining => "draining",
            Phase::Closed => "closed",
        }
    }

    fn successor(self) -> Option<Phase> {
        match self {
            Phase::Uninitialized => Some(Phase::ClientsStarting),
            Phase::ClientsStarting => Some(Phase::Serving),
            Phase::Serving => Some(Phase::Draining),
            Phase::Draining => Some(Phase::Closed),
            Phase::Closed => None,
        }
    }
}

/// Linear phase tracker. No back-edges, no skipping.
#[derive(Debug)]
pub struct Lifecycle {
    phase: Phase,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            phase: Phase::Uninitialized,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn advance(&mut self, to: Phase) -> Result<()> {
        if self.phase.successor() != Some(to) {
            return Err(HellometerError::Internal(format!(
                "illegal lifecycle transition {} -> {}",
                self.phase.as_str(),
                to.as_str()
            )));
        }
        tracing::debug!(from = self.phase.as_str(), to = to.as_str(), "lifecycle transition");
        self.phase = to;
        Ok(())
    }
}

/// Cloneable trigger that moves a running service into `Draining`.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// Trigger on Ctrl+C or SIGTERM.
    ///
    /// Handlers are registered before this returns; a signal that arrives
    /// before the waiting task first runs still triggers a drain.
    pub fn install_signal_handlers(&self) {
        let handle = self.clone();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let interrupt = signal(SignalKind::interrupt());
            let terminate = signal(SignalKind::terminate());
            tokio::spawn(async move {
                tokio::select! {
                    _ = wait_signal(interrupt, "SIGINT") => tracing::info!("received Ctrl+C, draining"),
                    _ = wait_signal(terminate, "SIGTERM") => tracing::info!("received SIGTERM, draining"),
                }
                handle.trigger();
            });
        }

        #[cfg(not(unix))]
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("received Ctrl+C, draining"),
                Err(e) => {
                    tracing::error!(error = %e, "failed to install Ctrl+C handler");
                    std::future::pending::<()>().await;
                }
            }
            handle.trigger();
        });
    }
}

#[cfg(unix)]
async fn wait_signal(sig: std::io::Result<tokio::signal::unix::Signal>, name: &'static str) {
    match sig {
        Ok(mut s) => {
            s.recv().await;
        }
        Err(e) => {
            tracing::error!(error = %e, signal = name, "failed to install signal handler");
            std::future::pending::<()>().await;
        }
    }
}

/// A service that has passed startup and is accepting traffic.
pub struct RunningService {
    lifecycle: Lifecycle,
    state: AppState,
    local_addr: SocketAddr,
    shutdown: ShutdownHandle,
    server: JoinHandle<std::io::Result<()>>,
}

/// Bring both sinks up, then start accepting on `cfg.server.port`.
///
/// Any error here is fatal: nothing has been served yet. Sinks that were
/// already started are closed before the error is returned.
pub async fn start(cfg: ServiceConfig) -> Result<RunningService> {
    launch(cfg, false).await
}

async fn launch(cfg: ServiceConfig, signals: bool) -> Result<RunningService> {
    let mut lifecycle = Lifecycle::new();
    lifecycle.advance(Phase::ClientsStarting)?;

    let statsd = StatsdClient::connect(&cfg.statsd).await?;
    let meter = MeterProvider::new(cfg.otlp.meter_name.clone(), cfg.otlp.service_name.clone());

    let (state, listener, local_addr) = match bring_up(&cfg, &meter, &statsd).await {
        Ok(up) => up,
        Err(e) => {
            close_sinks(&cfg, &meter, &statsd).await;
            return Err(e);
        }
    };

    let (tx, mut rx) = watch::channel(false);
    let shutdown = ShutdownHandle { tx: Arc::new(tx) };
    if signals {
        shutdown.install_signal_handlers();
    }

    let app = router::build_router(state.clone());
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.wait_for(|&v| v).await;
            })
            .await
    });

    lifecycle.advance(Phase::Serving)?;
    tracing::info!(%local_addr, "hellometer serving");

    Ok(RunningService {
        lifecycle,
        state,
        local_addr,
        shutdown,
        server,
    })
}

async fn bring_up(
    cfg: &ServiceConfig,
    meter: &MeterProvider,
    statsd: &StatsdClient,
) -> Result<(AppState, TcpListener, SocketAddr)> {
    let transport = OtlpGrpcTransport::connect(&cfg.otlp)?;
    let state = AppState::new(cfg.clone(), meter.clone(), statsd.clone())?;
    meter.start(
        RetryingExporter::new(Arc::new(transport), cfg.otlp.retry.policy()),
        cfg.otlp.export_interval(),
    )?;

    let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, cfg.server.port));
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| HellometerError::Config(format!("bind {bind_addr}: {e}")))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| HellometerError::Internal(format!("listener address: {e}")))?;

    Ok((state, listener, local_addr))
}

impl RunningService {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Serve until triggered (or the listener fails), then drain both sinks.
    pub async fn wait(mut self) -> Result<()> {
        let served = match (&mut self.server).await {
            Ok(r) => r.map_err(|e| HellometerError::Transport(format!("listener failed: {e}"))),
            Err(e) => Err(HellometerError::Internal(format!("server task failed: {e}"))),
        };
        self.lifecycle.advance(Phase::Draining)?;
        if let Err(e) = &served {
            tracing::error!(error = %e, "listener stopped unexpectedly, draining");
        } else {
            tracing::info!("listener closed, draining telemetry");
        }

        close_sinks(self.state.cfg(), self.state.meter(), self.state.statsd()).await;

        self.lifecycle.advance(Phase::Closed)?;
        tracing::info!("shutdown complete");
        served
    }

    /// Trigger draining and wait for it to finish.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown.trigger();
        self.wait().await
    }
}

async fn close_sinks(cfg: &ServiceConfig, meter: &MeterProvider, statsd: &StatsdClient) {
    let deadlines = &cfg.shutdown;
    let (otlp, statsd) = futures_util::future::join(
        meter.shutdown(deadlines.otlp_deadline()),
        statsd.close(deadlines.statsd_deadline()),
    )
    .await;

    if let Err(e) = otlp {
        tracing::warn!(error = %e, sink = "otlp", "telemetry sink did not drain cleanly");
    }
    if let Err(e) = statsd {
        tracing::warn!(error = %e, sink = "statsd", "telemetry sink did not drain cleanly");
    }
}

/// Full process lifecycle: start, serve until a signal, drain.
pub async fn run(cfg: ServiceConfig) -> Result<()> {
    let service = launch(cfg, true).await?;
    service.wait().await
}
