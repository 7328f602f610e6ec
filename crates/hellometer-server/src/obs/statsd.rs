//! Buffered, sampled StatsD counter client.
//!
//! Increments land in a mutex-guarded map of running totals. A background
//! timer swaps the map out under the lock, releases it, then encodes and sends
//! the drained totals. Increments that arrive mid-flush go to the next cycle.
//! Delivery is at-most-once: the drained map is discarded whether or not the
//! send succeeds, and send errors are ignored.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};

use hellometer_core::error::{HellometerError, Result};
use hellometer_core::protocol::statsd::{encode_counter, validate_name, PacketBuilder};

use crate::config::StatsdSection;

/// StatsD key bumped once per `/hello` request.
pub const HELLO_REQUESTS_KEY: &str = "endpoint.hello.requests";

/// Datagram sink.
#[async_trait]
pub trait StatsdTransport: Send + Sync {
    async fn send(&self, packet: Bytes) -> Result<()>;

    async fn close(&self) {}
}

/// Connected UDP socket.
pub struct UdpTransport {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl UdpTransport {
    pub async fn connect(addr: &str) -> Result<Self> {
        let peer = tokio::net::lookup_host(addr)
            .await
            .map_err(|e| HellometerError::Config(format!("resolve statsd addr {addr:?}: {e}")))?
            .next()
            .ok_or_else(|| {
                HellometerError::Config(format!("statsd addr {addr:?} resolved to nothing"))
            })?;

        let local: SocketAddr = if peer.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| HellometerError::Transport(format!("bind statsd socket: {e}")))?;
        socket
            .connect(peer)
            .await
            .map_err(|e| HellometerError::Transport(format!("connect statsd socket: {e}")))?;

        Ok(Self { socket, peer })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

#[async_trait]
impl StatsdTransport for UdpTransport {
    async fn send(&self, packet: Bytes) -> Result<()> {
        self.socket
            .send(&packet)
            .await
            .map(|_| ())
            .map_err(|e| HellometerError::Transport(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SampleKey {
    name: String,
    // f32 bits; rates are compared exactly
    rate: u32,
}

struct Flusher {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct ClientInner {
    prefix: String,
    max_packet_bytes: usize,
    buffer: Mutex<HashMap<SampleKey, i64>>,
    transport: Arc<dyn StatsdTransport>,
    closed: AtomicBool,
    flusher: Mutex<Option<Flusher>>,
}

/// Handle to the buffered client. Cheap to clone.
#[derive(Clone)]
pub struct StatsdClient {
    inner: Arc<ClientInner>,
}

impl StatsdClient {
    /// Resolve the configured address, bind a socket, start the flush timer.
    pub async fn connect(cfg: &StatsdSection) -> Result<Self> {
        let transport = UdpTransport::connect(&cfg.addr).await?;
        tracing::info!(
            addr = %cfg.addr,
            peer = %transport.peer(),
            prefix = %cfg.prefix,
            flush_interval_ms = cfg.flush_interval_ms,
            "statsd client connected"
        );
        Ok(Self::with_transport(
            Arc::new(transport),
            &cfg.prefix,
            cfg.flush_interval(),
            cfg.max_packet_bytes,
        ))
    }

    /// Build a client over any transport. Must be called inside a runtime.
    pub fn with_transport(
        transport: Arc<dyn StatsdTransport>,
        prefix: &str,
        flush_interval: Duration,
        max_packet_bytes: usize,
    ) -> Self {
        let inner = Arc::new(ClientInner {
            prefix: prefix.to_string(),
            max_packet_bytes,
            buffer: Mutex::new(HashMap::new()),
            transport,
            closed: AtomicBool::new(false),
            flusher: Mutex::new(None),
        });

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_flusher(Arc::downgrade(&inner), flush_interval, stop_rx));
        if let Ok(mut slot) = inner.flusher.lock() {
            *slot = Some(Flusher { stop_tx, handle });
        }

        Self { inner }
    }

    /// Record `delta` for `key` with probability `sample_rate`.
    ///
    /// Never blocks on I/O and never fails; invalid keys are dropped.
    pub fn increment(&self, key: &str, delta: i64, sample_rate: f32) {
        if self.inner.closed.load(Ordering::Acquire) {
            return;
        }
        if !sampled(sample_rate) {
            return;
        }
        if let Err(e) = validate_name(key) {
            tracing::debug!(error = %e, "dropping statsd sample");
            return;
        }

        let k = SampleKey {
            name: key.to_string(),
            rate: sample_rate.min(1.0).to_bits(),
        };
        let mut buf = self.inner.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        let total = buf.entry(k).or_insert(0);
        *total = total.saturating_add(delta);
    }

    /// Flush now instead of waiting for the timer.
    pub async fn flush(&self) {
        flush_once(&self.inner).await;
    }

    /// Number of distinct keys waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.inner
            .buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Stop the timer, flush one last time, release the transport.
    ///
    /// Best effort: returns `Timeout` if the deadline passed first, in which
    /// case the remaining work is abandoned. Later calls are no-ops.
    pub async fn close(&self, deadline: Duration) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let flusher = self.inner.flusher.lock().ok().and_then(|mut f| f.take());
        let abort = flusher.as_ref().map(|f| f.handle.abort_handle());

        let inner = Arc::clone(&self.inner);
        let drain = async move {
            if let Some(f) = flusher {
                let _ = f.stop_tx.send(true);
                let _ = f.handle.await;
            }
            flush_once(&inner).await;
            inner.transport.close().await;
        };

        match timeout(deadline, drain).await {
            Ok(()) => Ok(()),
            Err(_) => {
                if let Some(a) = abort {
                    a.abort();
                }
                tracing::warn!(
                    deadline_ms = deadline.as_millis() as u64,
                    "statsd final flush did not finish before deadline"
                );
                Err(HellometerError::Timeout)
            }
        }
    }
}

fn sampled(rate: f32) -> bool {
    if rate >= 1.0 {
        return true;
    }
    if rate <= 0.0 || rate.is_nan() {
        return false;
    }
    rand::random::<f32>() < rate
}

async fn flush_once(inner: &ClientInner) {
    let drained = {
        let mut buf = inner.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *buf)
    };
    if drained.is_empty() {
        return;
    }

    let mut entries: Vec<(SampleKey, i64)> = drained.into_iter().filter(|(_, v)| *v != 0).collect();
    entries.sort_by(|a, b| a.0.name.cmp(&b.0.name).then(a.0.rate.cmp(&b.0.rate)));

    let mut packets = PacketBuilder::new(inner.max_packet_bytes);
    for (k, total) in &entries {
        packets.push_line(&encode_counter(&inner.prefix, &k.name, *total, f32::from_bits(k.rate)));
    }

    for p in packets.finish() {
        // fire-and-forget
        let _ = inner.transport.send(p).await;
    }
}

async fn run_flusher(inner: Weak<ClientInner>, every: Duration, mut stop_rx: watch::Receiver<bool>) {
    let mut tick = interval_at(Instant::now() + every, every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let Some(inner) = inner.upgrade() else { break; };
                flush_once(&inner).await;
            }
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }
}
