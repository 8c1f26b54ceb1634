//! Graceful Shutdown Handler
//!
//! Sequences shutdown of the registry host: stop the API, let the poller
//! finish its in-flight tick, then take the final rollback point. The final
//! snapshot runs even when draining times out.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Shutdown signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGTERM or SIGINT
    Graceful,
    /// Requested programmatically (tests, `check` runs)
    Requested,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Graceful => write!(f, "graceful"),
            ShutdownSignal::Requested => write!(f, "requested"),
        }
    }
}

/// Configuration for graceful shutdown
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for the poller to finish its current tick (default: 30s)
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(30),
        }
    }
}

/// Shutdown phase tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Running,
    /// HTTP server no longer accepting requests
    StoppingApi,
    /// Waiting for the in-flight tick
    DrainingPoller,
    /// Taking the pre-shutdown rollback point
    Checkpointing,
    Complete,
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownPhase::Running => write!(f, "running"),
            ShutdownPhase::StoppingApi => write!(f, "stopping_api"),
            ShutdownPhase::DrainingPoller => write!(f, "draining_poller"),
            ShutdownPhase::Checkpointing => write!(f, "checkpointing"),
            ShutdownPhase::Complete => write!(f, "complete"),
        }
    }
}

/// Result of a completed shutdown sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub drained: bool,
    pub checkpoint: Option<String>,
    pub elapsed: Duration,
}

/// Broadcasts shutdown to background tasks and runs the shutdown sequence
pub struct ShutdownController {
    config: ShutdownConfig,
    shutdown_requested: AtomicBool,
    phase_tx: watch::Sender<ShutdownPhase>,
    signal_tx: broadcast::Sender<ShutdownSignal>,
}

impl ShutdownController {
    pub fn new(config: ShutdownConfig) -> Self {
        let (phase_tx, _) = watch::channel(ShutdownPhase::Running);
        let (signal_tx, _) = broadcast::channel(8);

        Self {
            config,
            shutdown_requested: AtomicBool::new(false),
            phase_tx,
            signal_tx,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ShutdownConfig::default())
    }

    /// Subscribe to shutdown signals
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownSignal> {
        self.signal_tx.subscribe()
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub fn current_phase(&self) -> ShutdownPhase {
        *self.phase_tx.borrow()
    }

    /// Request shutdown; duplicate requests are ignored
    pub fn request_shutdown(&self, signal: ShutdownSignal) {
        if self.shutdown_requested.swap(true, Ordering::SeqCst) {
            debug!("Shutdown already requested, ignoring {}", signal);
            return;
        }

        info!("Shutdown requested: {}", signal);
        let _ = self.signal_tx.send(signal);
    }

    /// Resolves once shutdown has been requested
    pub async fn requested(&self) {
        let mut rx = self.signal_tx.subscribe();
        if self.is_shutdown_requested() {
            return;
        }
        let _ = rx.recv().await;
    }

    fn set_phase(&self, phase: ShutdownPhase) {
        self.phase_tx.send_replace(phase);
        info!("Shutdown phase: {}", phase);
    }

    /// Run the shutdown sequence
    ///
    /// `stop_api` and `drain_poller` are bounded by the drain timeout;
    /// `checkpoint` always runs and returns the final rollback point id.
    pub async fn execute<A, D, C>(&self, stop_api: A, drain_poller: D, checkpoint: C) -> ShutdownReport
    where
        A: Future<Output = ()>,
        D: Future<Output = ()>,
        C: Future<Output = Option<String>>,
    {
        let start = Instant::now();
        self.request_shutdown(ShutdownSignal::Requested);

        self.set_phase(ShutdownPhase::StoppingApi);
        if tokio::time::timeout(self.config.drain_timeout, stop_api)
            .await
            .is_err()
        {
            warn!(
                "API shutdown timeout after {}s",
                self.config.drain_timeout.as_secs()
            );
        }

        self.set_phase(ShutdownPhase::DrainingPoller);
        let drained = match tokio::time::timeout(self.config.drain_timeout, drain_poller).await {
            Ok(()) => {
                debug!("Poller drained");
                true
            }
            Err(_) => {
                warn!(
                    "Poller drain timeout after {}s, proceeding anyway",
                    self.config.drain_timeout.as_secs()
                );
                false
            }
        };

        self.set_phase(ShutdownPhase::Checkpointing);
        let checkpoint = checkpoint.await;

        self.set_phase(ShutdownPhase::Complete);
        let elapsed = start.elapsed();
        info!("Graceful shutdown completed in {:?}", elapsed);

        ShutdownReport {
            drained,
            checkpoint,
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_broadcasts_once() {
        let controller = ShutdownController::with_defaults();
        let mut rx = controller.subscribe();

        controller.request_shutdown(ShutdownSignal::Graceful);
        controller.request_shutdown(ShutdownSignal::Requested);

        assert_eq!(rx.recv().await.unwrap(), ShutdownSignal::Graceful);
        assert!(rx.try_recv().is_err());
        assert!(controller.is_shutdown_requested());
    }

    #[tokio::test]
    async fn test_requested_returns_after_request() {
        let controller = ShutdownController::with_defaults();
        controller.request_shutdown(ShutdownSignal::Graceful);
        tokio::time::timeout(Duration::from_secs(1), controller.requested())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_execute_runs_all_phases() {
        let controller = ShutdownController::with_defaults();
        let report = controller
            .execute(async {}, async {}, async { Some("rp-1".to_string()) })
            .await;

        assert!(report.drained);
        assert_eq!(report.checkpoint.as_deref(), Some("rp-1"));
        assert_eq!(controller.current_phase(), ShutdownPhase::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkpoint_runs_after_drain_timeout() {
        let controller = ShutdownController::new(ShutdownConfig {
            drain_timeout: Duration::from_secs(1),
        });
        let report = controller
            .execute(
                async {},
                std::future::pending::<()>(),
                async { Some("final".to_string()) },
            )
            .await;

        assert!(!report.drained);
        assert_eq!(report.checkpoint.as_deref(), Some("final"));
    }
}
