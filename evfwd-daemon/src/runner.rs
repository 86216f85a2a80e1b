//! Forwarder lifecycle and the main input loop.
//!
//! The [`Runner`] owns the [`Forwarder`], feeds it records from a
//! [`LineSource`], reports statistics on a fixed interval, and performs
//! the final flush when input ends or a shutdown signal arrives.
//!
//! # Shutdown Triggers
//!
//! - End of input
//! - `SIGTERM` (from systemd, Docker, or `kill`)
//! - `SIGINT` (Ctrl+C)

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::io::AsyncRead;
use tokio::time::{Instant, MissedTickBehavior};

use evfwd_core::config::ForwarderConfig;
use evfwd_core::pipeline::{HealthStatus, Pipeline};
use evfwd_output::{EventRecord, Forwarder, ForwarderBuilder};

use crate::source::LineSource;

/// Why the main loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Input reached end of file.
    EndOfInput,
    /// A shutdown signal was received.
    Signal(&'static str),
}

/// Counters for one daemon run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub records_forwarded: u64,
    pub records_rejected: u64,
    pub stop_reason: StopReason,
}

/// Drives a [`Forwarder`] from line input.
pub struct Runner {
    forwarder: Forwarder,
    status_interval: Duration,
}

impl Runner {
    /// Build the forwarder from an already-loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the
    /// destination cannot be initialized.
    pub async fn build_from_config(
        config: ForwarderConfig,
        status_interval: Duration,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        let forwarder = ForwarderBuilder::new()
            .config(Arc::new(config))
            .build()
            .await
            .map_err(|e| anyhow::anyhow!("failed to build forwarder: {}", e))?;

        for key in forwarder.keys() {
            tracing::info!(
                destination = forwarder.describe(key).unwrap_or(key.as_str()),
                "destination initialized"
            );
        }

        Ok(Self {
            forwarder,
            // interval() panics on a zero period
            status_interval: status_interval.max(Duration::from_secs(1)),
        })
    }

    /// The underlying forwarder.
    pub fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    /// Start the forwarder and pump `source` until it ends or `shutdown` resolves.
    ///
    /// The forwarder is always stopped before returning, so buffered
    /// records are flushed and queued bundles delivered.
    pub async fn run<R, S>(&mut self, mut source: LineSource<R>, shutdown: S) -> Result<RunSummary>
    where
        R: AsyncRead + Unpin,
        S: Future<Output = Result<&'static str>>,
    {
        self.forwarder
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start forwarder: {}", e))?;
        tracing::info!("forwarder started");

        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.status_interval, self.status_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut forwarded = 0u64;
        let mut rejected = 0u64;

        let outcome: Result<StopReason> = loop {
            tokio::select! {
                signal = &mut shutdown => {
                    match signal {
                        Ok(name) => {
                            tracing::info!(signal = name, "shutdown signal received");
                            break Ok(StopReason::Signal(name));
                        }
                        Err(e) => break Err(e),
                    }
                }
                _ = ticker.tick() => self.log_status().await,
                next = source.next_record() => {
                    match next {
                        Ok(Some(record)) => {
                            if self.forward(record).await {
                                forwarded += 1;
                            } else {
                                rejected += 1;
                            }
                        }
                        Ok(None) => {
                            tracing::info!(lines = source.lines_read(), "end of input");
                            break Ok(StopReason::EndOfInput);
                        }
                        Err(e) => break Err(e),
                    }
                }
            }
        };

        // Stop even when the loop failed so buffered records are not lost.
        let stopped = self.forwarder.stop().await;
        self.log_final();
        stopped.map_err(|e| anyhow::anyhow!("failed to stop forwarder: {}", e))?;

        let stop_reason = outcome?;
        tracing::info!(
            records_forwarded = forwarded,
            records_rejected = rejected,
            skipped_lines = source.skipped(),
            "forwarder stopped"
        );
        Ok(RunSummary {
            records_forwarded: forwarded,
            records_rejected: rejected,
            stop_reason,
        })
    }

    /// Append `record` to every destination; `false` if any append failed.
    async fn forward(&self, record: EventRecord) -> bool {
        let mut accepted = true;
        for key in self.forwarder.keys() {
            if let Err(e) = self.forwarder.append(key, record.clone()).await {
                tracing::warn!(destination = %key, error = %e, "failed to append record");
                accepted = false;
            }
        }
        accepted
    }

    async fn log_status(&self) {
        match self.forwarder.health_check().await {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                tracing::warn!(reason = %reason, "forwarder degraded")
            }
            HealthStatus::Unhealthy(reason) => {
                tracing::error!(reason = %reason, "forwarder unhealthy")
            }
        }
        self.log_statistics("forwarder status");
    }

    fn log_final(&self) {
        self.log_statistics("final statistics");
    }

    fn log_statistics(&self, message: &'static str) {
        for key in self.forwarder.keys() {
            let Some(stats) = self.forwarder.statistics(key) else {
                continue;
            };
            let statistics = serde_json::to_string(&stats)
                .unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"));
            tracing::info!(
                destination = self.forwarder.describe(key).unwrap_or(key.as_str()),
                statistics = %statistics,
                "{}",
                message
            );
        }
    }
}

/// Wait for SIGTERM or SIGINT and return the signal name.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for Ctrl+C and return the signal name.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("failed to install Ctrl+C handler: {}", e))?;
    Ok("ctrl-c")
}
