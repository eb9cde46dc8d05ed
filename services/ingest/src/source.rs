//! The source trait and shared lifecycle types

use crate::circuit_breaker::CircuitState;
use crate::error::Result;
use crate::fanin::SourceOutput;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Cooperative shutdown token handed to every source and worker.
///
/// Cloned freely; `triggered` is cheap enough for per-event checks.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Create a token pair. The sender side flips the flag exactly once.
    pub fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    pub fn triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve when shutdown is requested.
    pub async fn wait(&mut self) {
        // An Err means the sender is gone, which also means shutdown
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Core trait every ingestion source implements.
///
/// A source owns its upstream connection and emits canonical transfers
/// through its [`SourceOutput`]. It returns `Ok(())` only on clean
/// shutdown; any error hands control back to the supervisor, which
/// applies backoff and restarts it while the circuit allows.
#[async_trait]
pub trait Source: Send {
    /// Stable stream identifier, also stamped on every emitted transfer.
    fn source_id(&self) -> &str;

    /// Run until shutdown or failure.
    async fn run(&mut self, out: &mut SourceOutput, shutdown: ShutdownSignal) -> Result<()>;
}

/// Health snapshot for one supervised source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceHealth {
    pub source_id: String,
    pub circuit: CircuitState,
    pub healthy: bool,
    pub emitted: u64,
    pub dropped: u64,
    pub errors: u64,
    pub restarts: u64,
    /// Seconds since the last successful emit, when any.
    pub last_emit_age_secs: Option<u64>,
}
