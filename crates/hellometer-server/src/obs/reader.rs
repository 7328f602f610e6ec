//! Periodic reader: ticks on a fixed interval, snapshots, exports.
//!
//! Each tick's export runs in its own task inside a `JoinSet`, so a slow or
//! retrying export never delays the next tick and is never cancelled by it.
//! Batches share nothing mutable; overlapping exports are independent.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};

use hellometer_core::error::{HellometerError, Result};

use super::exporter::RetryingExporter;
use super::metrics::MetricProducer;

pub struct PeriodicReader {
    stop_tx: watch::Sender<bool>,
    ticker: JoinHandle<JoinSet<()>>,
    producer: Arc<dyn MetricProducer>,
    exporter: Arc<RetryingExporter>,
}

impl PeriodicReader {
    /// Spawn the ticker. The first export happens one `interval` from now.
    pub fn spawn(
        producer: Arc<dyn MetricProducer>,
        exporter: RetryingExporter,
        interval: Duration,
    ) -> Self {
        let exporter = Arc::new(exporter);
        let (stop_tx, stop_rx) = watch::channel(false);
        let ticker = tokio::spawn(run_ticker(
            Arc::clone(&producer),
            Arc::clone(&exporter),
            interval,
            stop_rx,
        ));

        Self {
            stop_tx,
            ticker,
            producer,
            exporter,
        }
    }

    /// Stop ticking, wait for in-flight exports plus one final export, then
    /// release the transport. Anything still running at `deadline` is aborted.
    pub async fn shutdown(self, deadline: Duration) -> Result<()> {
        let _ = self.stop_tx.send(true);
        let mut inflight = self.ticker.await.unwrap_or_default();

        let batch = self.producer.produce();
        let exporter = Arc::clone(&self.exporter);
        inflight.spawn(async move {
            let _ = exporter.export(batch).await;
        });

        let pending = inflight.len();
        let drained = timeout(deadline, async {
            while inflight.join_next().await.is_some() {}
        })
        .await;

        let res = match drained {
            Ok(()) => {
                tracing::debug!(exports = pending, "periodic reader drained");
                Ok(())
            }
            Err(_) => {
                inflight.abort_all();
                while inflight.join_next().await.is_some() {}
                tracing::warn!(
                    deadline_ms = deadline.as_millis() as u64,
                    "final metrics flush did not finish before deadline"
                );
                Err(HellometerError::Timeout)
            }
        };

        self.exporter.shutdown().await;
        res
    }
}

async fn run_ticker(
    producer: Arc<dyn MetricProducer>,
    exporter: Arc<RetryingExporter>,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) -> JoinSet<()> {
    let mut inflight = JoinSet::new();
    let mut tick = interval_at(Instant::now() + interval, interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                // reap finished exports
                while inflight.try_join_next().is_some() {}

                let batch = producer.produce();
                let exporter = Arc::clone(&exporter);
                inflight.spawn(async move {
                    let _ = exporter.export(batch).await;
                });
            }
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }

    inflight
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::obs::exporter::testing::RecordingTransport;
    use crate::obs::metrics::{MeterProvider, HELLO_COUNTER};
    use hellometer_core::RetryPolicy;

    fn provider() -> (MeterProvider, crate::obs::metrics::Counter) {
        let mp = MeterProvider::new("test", "svc");
        let c = mp.counter(HELLO_COUNTER, "Total number of hello requests").unwrap();
        (mp, c)
    }

    #[tokio::test(start_paused = true)]
    async fn exports_on_each_tick_independent_of_adds() {
        let (mp, counter) = provider();
        let t = Arc::new(RecordingTransport::default());
        mp.start(
            RetryingExporter::new(t.clone(), RetryPolicy::disabled()),
            Duration::from_secs(5),
        )
        .unwrap();

        counter.add(1);
        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(t.batches.lock().unwrap().len(), 1);

        // no adds in between, still exported
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(t.batches.lock().unwrap().len(), 2);
        assert_eq!(t.last_value(HELLO_COUNTER), Some(1));

        mp.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_pending_values() {
        let (mp, counter) = provider();
        let t = Arc::new(RecordingTransport::default());
        mp.start(
            RetryingExporter::new(t.clone(), RetryPolicy::disabled()),
            Duration::from_secs(60),
        )
        .unwrap();

        counter.add(7);
        mp.shutdown(Duration::from_secs(1)).await.unwrap();

        assert_eq!(t.last_value(HELLO_COUNTER), Some(7));
        assert!(t.shut_down.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_export_does_not_block_next_tick() {
        let (mp, counter) = provider();
        // first two attempts fail; the retrying export spans several ticks
        let t = Arc::new(RecordingTransport::failing(2));
        let policy = RetryPolicy {
            enabled: true,
            initial_interval: Duration::from_secs(3),
            max_interval: Duration::from_secs(3),
            max_elapsed_time: Duration::from_secs(30),
        };
        mp.start(RetryingExporter::new(t.clone(), policy), Duration::from_secs(1))
            .unwrap();
        counter.add(1);

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        // ticks at 1s and 2s both attempted even though the first is retrying
        assert!(t.attempt_count() >= 2);

        mp.shutdown(Duration::from_secs(10)).await.unwrap();
        assert_eq!(t.last_value(HELLO_COUNTER), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_deadline_aborts_stuck_exports() {
        let (mp, _counter) = provider();
        let t = Arc::new(RecordingTransport::failing(usize::MAX));
        mp.start(RetryingExporter::new(t.clone(), RetryPolicy::default()), Duration::from_secs(1))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        let err = mp.shutdown(Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, HellometerError::Timeout));
        assert!(t.shut_down.load(Ordering::SeqCst));

        // nothing left running: the attempt count stays put
        let seen = t.attempt_count();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(t.attempt_count(), seen);
    }
}
