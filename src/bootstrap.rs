//! Registry Bootstrap: wires Registry, RollbackStore, evaluator and Poller from config
//!
//! Used by `nexus-registry serve` and `nexus-registry check`.

use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::coordination::{ShutdownController, ShutdownReport};
use crate::domain::labels;
use crate::error::Result;
use crate::health::{HealthEvaluator, NetworkProber, Prober};
use crate::persistence::RollbackStore;
use crate::registry::Registry;
use crate::supervisor::Poller;

/// Fully wired registry host components
pub struct Nexus {
    pub registry: Arc<Registry>,
    pub rollback: Arc<RollbackStore>,
    pub poller: Arc<Poller>,
}

impl Nexus {
    /// Build components with the network prober
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let prober = NetworkProber::new(config.evaluator_config().probe_timeout)?;
        Self::with_prober(config, Arc::new(prober)).await
    }

    /// Build components around any prober implementation
    pub async fn with_prober(config: &AppConfig, prober: Arc<dyn Prober>) -> Result<Self> {
        let registry = Arc::new(Registry::new(config.registry_config()));
        let rollback = Arc::new(RollbackStore::open(config.rollback_config()).await?);
        let evaluator = HealthEvaluator::new(prober, config.evaluator_config());
        let poller = Arc::new(Poller::new(
            config.poller_config(),
            Arc::clone(&registry),
            Arc::clone(&rollback),
            evaluator,
            config.repair_policy(),
        ));

        Ok(Self {
            registry,
            rollback,
            poller,
        })
    }

    /// Register configured modules and seed their observed fingerprints
    pub async fn register_modules(&self, config: &AppConfig) -> Result<usize> {
        for descriptor in &config.modules {
            self.registry.register(descriptor.clone()).await?;
        }
        self.registry.detect_drift().await;
        Ok(config.modules.len())
    }

    /// Register configured modules and take the boot rollback point
    ///
    /// Returns the id of the boot point.
    pub async fn bootstrap(&self, config: &AppConfig) -> Result<String> {
        self.register_modules(config).await?;

        let point = self.poller.snapshot(labels::INITIAL_BOOT).await?;
        info!(
            "Registry bootstrapped with {} modules (boot point {})",
            self.registry.len().await,
            point.id
        );
        Ok(point.id)
    }

    /// Stop the API, drain the poller, then take the `pre_shutdown` point
    ///
    /// The checkpoint waits on the tick lock, so a tick still running after
    /// the drain timeout is applied before the snapshot is taken.
    pub async fn shutdown<A, D>(
        &self,
        controller: &ShutdownController,
        stop_api: A,
        drain_poller: D,
    ) -> ShutdownReport
    where
        A: Future<Output = ()>,
        D: Future<Output = ()>,
    {
        let checkpoint = async {
            match self.poller.snapshot(labels::PRE_SHUTDOWN).await {
                Ok(point) => Some(point.id),
                Err(e) => {
                    error!("Failed to take pre-shutdown rollback point: {}", e);
                    None
                }
            }
        };

        let report = controller.execute(stop_api, drain_poller, checkpoint).await;
        if !report.drained {
            warn!("Poller did not drain before shutdown timeout");
        }
        report
    }
}
