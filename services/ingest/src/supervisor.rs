//! Source lifecycle supervision
//!
//! Each source runs in its own task under a supervisor loop: failures
//! trip the per-source circuit breaker and trigger restart with
//! exponential backoff, permanent failures latch the circuit open while
//! the other sources keep running, and shutdown drains everything within
//! a bounded budget.

use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::fanin::{FanIn, SourceMetrics};
use crate::source::{ShutdownSignal, Source, SourceHealth};
use rand::Rng;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Supervisor tuning.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// A run lasting at least this long counts as a healthy session and
    /// resets the backoff.
    pub healthy_run: Duration,
    pub drain_timeout: Duration,
    /// A source with no emit for this long reports unhealthy.
    pub health_stale: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        use config::service::ingest;
        Self {
            backoff_base: Duration::from_secs(ingest::RESTART_BACKOFF_BASE_SECS),
            backoff_cap: Duration::from_secs(ingest::RESTART_BACKOFF_CAP_SECS),
            healthy_run: Duration::from_secs(ingest::CIRCUIT_BREAKER_WINDOW_SECS),
            drain_timeout: Duration::from_secs(ingest::SHUTDOWN_DRAIN_SECS),
            health_stale: Duration::from_secs(ingest::HEALTH_PROBE_STALE_SECS),
        }
    }
}

struct Entry {
    source_id: String,
    metrics: Arc<SourceMetrics>,
    circuit: Arc<CircuitBreaker>,
    handle: JoinHandle<()>,
}

/// Owns every running source task.
pub struct Supervisor {
    fanin: FanIn,
    config: SupervisorConfig,
    shutdown_tx: watch::Sender<bool>,
    shutdown: ShutdownSignal,
    entries: Vec<Entry>,
}

impl Supervisor {
    pub fn new(fanin: FanIn, config: SupervisorConfig) -> Self {
        let (shutdown_tx, shutdown) = ShutdownSignal::new();
        Self {
            fanin,
            config,
            shutdown_tx,
            shutdown,
            entries: Vec::new(),
        }
    }

    /// The shutdown token shared with downstream pipeline stages.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Start supervising a source.
    pub fn spawn(&mut self, source: Box<dyn Source>, drop_budget: Option<usize>) {
        let source_id = source.source_id().to_string();
        let metrics = Arc::new(SourceMetrics::default());
        let circuit = Arc::new(CircuitBreaker::default());
        let out = self
            .fanin
            .register(&source_id, drop_budget, metrics.clone());

        let handle = tokio::spawn(run_supervised(
            source,
            out,
            self.shutdown.clone(),
            circuit.clone(),
            metrics.clone(),
            self.config.clone(),
        ));

        info!(%source_id, "source supervised");
        self.entries.push(Entry {
            source_id,
            metrics,
            circuit,
            handle,
        });
    }

    /// Health snapshot across all supervised sources.
    pub fn health(&self) -> Vec<SourceHealth> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        self.entries
            .iter()
            .map(|entry| {
                let last_ms = entry.metrics.last_emit_unix_ms.load(Ordering::Relaxed);
                let last_emit_age_secs = if last_ms > 0 {
                    Some(((now_ms - last_ms).max(0) / 1000) as u64)
                } else {
                    None
                };
                let circuit = entry.circuit.state();
                let fresh = last_emit_age_secs
                    .map(|age| age < self.config.health_stale.as_secs())
                    .unwrap_or(entry.metrics.emitted.load(Ordering::Relaxed) == 0);
                SourceHealth {
                    source_id: entry.source_id.clone(),
                    circuit,
                    healthy: circuit == CircuitState::Closed && fresh,
                    emitted: entry.metrics.emitted.load(Ordering::Relaxed),
                    dropped: entry.metrics.dropped.load(Ordering::Relaxed),
                    errors: entry.metrics.errors.load(Ordering::Relaxed),
                    restarts: entry.metrics.restarts.load(Ordering::Relaxed),
                    last_emit_age_secs,
                }
            })
            .collect()
    }

    /// Signal shutdown and wait for every source to drain.
    pub async fn shutdown(&mut self) {
        info!("supervisor shutting down, draining sources");
        let _ = self.shutdown_tx.send(true);
        let deadline = Instant::now() + self.config.drain_timeout;
        for entry in std::mem::take(&mut self.entries) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if tokio::time::timeout(remaining, entry.handle).await.is_err() {
                warn!(source_id = %entry.source_id, "source did not drain in time, aborting");
            }
        }
    }
}

/// Exponential backoff with a cap and ±12.5% jitter.
fn backoff_delay(config: &SupervisorConfig, attempt: u32) -> Duration {
    let exp = config
        .backoff_base
        .saturating_mul(1u32 << attempt.min(16) as u32)
        .min(config.backoff_cap);
    let jitter = rand::thread_rng().gen_range(0.875..=1.125);
    exp.mul_f64(jitter)
}

async fn run_supervised(
    mut source: Box<dyn Source>,
    mut out: crate::fanin::SourceOutput,
    shutdown: ShutdownSignal,
    circuit: Arc<CircuitBreaker>,
    metrics: Arc<SourceMetrics>,
    config: SupervisorConfig,
) {
    let source_id = source.source_id().to_string();
    let mut attempt = 0u32;

    while !shutdown.triggered() {
        if !circuit.should_attempt() {
            let mut shutdown_wait = shutdown.clone();
            tokio::select! {
                _ = shutdown_wait.wait() => break,
                _ = tokio::time::sleep(Duration::from_secs(1)) => continue,
            }
        }

        let started = Instant::now();
        match source.run(&mut out, shutdown.clone()).await {
            Ok(()) => {
                // Clean return happens only on shutdown
                break;
            }
            Err(err) => {
                metrics.errors.fetch_add(1, Ordering::Relaxed);

                if err.is_permanent() {
                    circuit.trip_permanent();
                    error!(%source_id, error = %err, "permanent source failure, circuit latched open");
                    // Keep the task alive so health keeps reporting it,
                    // but only wait for shutdown from here.
                    shutdown.clone().wait().await;
                    break;
                }

                circuit.record_failure();
                if started.elapsed() >= config.healthy_run {
                    // A long run before this failure counts as recovery
                    circuit.record_success();
                    circuit.record_failure();
                    attempt = 0;
                }
                attempt = attempt.saturating_add(1);
                metrics.restarts.fetch_add(1, Ordering::Relaxed);

                let delay = backoff_delay(&config, attempt - 1);
                warn!(%source_id, error = %err, ?delay, attempt, "source failed, restarting after backoff");
                let mut shutdown_wait = shutdown.clone();
                tokio::select! {
                    _ = shutdown_wait.wait() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    // Best-effort drain of anything still staged locally
    let _ = out.flush_staged();
    info!(%source_id, "source task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{IngestError, Result};
    use crate::fanin::SourceOutput;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use types::{Chain, RawTransfer};

    fn transfer() -> RawTransfer {
        RawTransfer {
            source_id: "flaky".into(),
            chain: Chain::Ethereum,
            tx_hash: "0xabc".into(),
            log_index: None,
            block_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            from_addr: "0xa".into(),
            to_addr: "0xb".into(),
            token_addr: None,
            symbol: Some("ETH".into()),
            amount: dec!(1),
            decimals: None,
            native_value: None,
            gas_price_gwei: None,
        }
    }

    /// Emits once, then fails `failures` times, then runs until shutdown.
    struct FlakySource {
        failures: u32,
    }

    #[async_trait]
    impl Source for FlakySource {
        fn source_id(&self) -> &str {
            "flaky"
        }

        async fn run(&mut self, out: &mut SourceOutput, mut shutdown: ShutdownSignal) -> Result<()> {
            out.send(transfer()).await?;
            if self.failures > 0 {
                self.failures -= 1;
                return Err(IngestError::ConnectionFailed {
                    source_id: "flaky".into(),
                    reason: "boom".into(),
                });
            }
            shutdown.wait().await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_with_backoff_then_drain() {
        let (fanin, mut rx) = FanIn::bounded(16);
        let mut supervisor = Supervisor::new(
            fanin,
            SupervisorConfig {
                backoff_base: Duration::from_millis(10),
                backoff_cap: Duration::from_millis(100),
                healthy_run: Duration::from_secs(60),
                drain_timeout: Duration::from_secs(5),
                health_stale: Duration::from_secs(120),
            },
        );
        supervisor.spawn(Box::new(FlakySource { failures: 2 }), None);

        // Three emits: initial run plus two restarts
        for _ in 0..3 {
            assert!(rx.recv().await.is_some());
        }

        let health = supervisor.health();
        assert_eq!(health.len(), 1);
        assert_eq!(health[0].emitted, 3);
        assert_eq!(health[0].errors, 2);
        assert_eq!(health[0].restarts, 2);

        supervisor.shutdown().await;
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = SupervisorConfig {
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(60),
            healthy_run: Duration::from_secs(60),
            drain_timeout: Duration::from_secs(30),
            health_stale: Duration::from_secs(120),
        };
        let delay = backoff_delay(&config, 30);
        assert!(delay <= Duration::from_secs(68)); // cap plus jitter
        assert!(delay >= Duration::from_secs(52));
    }
}
