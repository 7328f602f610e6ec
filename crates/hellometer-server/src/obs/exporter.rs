//! Retrying metrics exporter.
//!
//! Wraps a [`MetricsTransport`] with the exponential schedule from
//! [`RetryPolicy`]. Every attempt after a failure is also bounded by what is
//! left of `max_elapsed_time`, so one batch never occupies the exporter for
//! longer than its budget. Exhausted or rejected batches are logged and
//! dropped; callers never see a panic or a hang.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::{sleep, timeout, Instant};

use hellometer_core::error::{HellometerError, Result};
use hellometer_core::RetryPolicy;

use super::metrics::ExportBatch;

/// Network sink for export batches.
#[async_trait]
pub trait MetricsTransport: Send + Sync {
    async fn export(&self, batch: &ExportBatch) -> Result<()>;

    /// Release connections. Called once, after the last export.
    async fn shutdown(&self) {}
}

pub struct RetryingExporter {
    transport: Arc<dyn MetricsTransport>,
    policy: RetryPolicy,
}

impl RetryingExporter {
    pub fn new(transport: Arc<dyn MetricsTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Deliver one batch, retrying transient failures.
    pub async fn export(&self, batch: ExportBatch) -> Result<()> {
        let started = Instant::now();
        let mut backoff = self.policy.backoff();
        let mut attempt: u32 = 1;

        loop {
            // the first attempt is bounded by the transport's own timeout
            let res = if self.policy.enabled && attempt > 1 {
                let remaining = backoff.remaining(started.elapsed());
                match timeout(remaining, self.transport.export(&batch)).await {
                    Ok(r) => r,
                    Err(_) => Err(HellometerError::Timeout),
                }
            } else {
                self.transport.export(&batch).await
            };

            let err = match res {
                Ok(()) => {
                    if attempt > 1 {
                        tracing::debug!(attempt, "metrics export succeeded after retry");
                    }
                    return Ok(());
                }
                Err(e) => e,
            };

            if !err.is_retryable() {
                tracing::warn!(
                    error = %err,
                    disposition = err.disposition().as_str(),
                    points = batch.points.len(),
                    "metrics export rejected, dropping batch"
                );
                return Err(err);
            }

            match backoff.next_delay(started.elapsed()) {
                Some(delay) => {
                    tracing::debug!(
                        error = %err,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying metrics export after transient error"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    tracing::warn!(
                        error = %err,
                        attempts = attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        points = batch.points.len(),
                        "metrics export failed after retries, dropping batch"
                    );
                    return Err(err);
                }
            }
        }
    }

    pub async fn shutdown(&self) {
        self.transport.shutdown().await;
    }
}
