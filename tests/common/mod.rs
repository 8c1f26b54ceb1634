#![allow(dead_code)]

use async_trait::async_trait;
use nexus_registry::{
    AppConfig, ModuleCategory, ModuleDescriptor, ModuleRecord, Nexus, NexusError, ProbeReport,
    Prober, Result,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Prober whose verdicts are flipped by the test
#[derive(Default)]
pub struct ScriptedProber {
    down: Mutex<HashSet<String>>,
    heal_on_restart: Mutex<HashSet<String>>,
    restarts: Mutex<Vec<String>>,
    latency: Mutex<Duration>,
}

impl ScriptedProber {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, id: &str) {
        self.down.lock().unwrap().insert(id.to_string());
    }

    pub fn recover(&self, id: &str) {
        self.down.lock().unwrap().remove(id);
    }

    /// Every check sleeps this long before answering
    pub fn slow(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    /// Next restart of `id` brings it back up
    pub fn heal_on_restart(&self, id: &str) {
        self.heal_on_restart.lock().unwrap().insert(id.to_string());
    }

    pub fn restarts(&self, id: &str) -> usize {
        self.restarts
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.as_str() == id)
            .count()
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn check(&self, module: &ModuleRecord) -> Result<ProbeReport> {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.down.lock().unwrap().contains(&module.id) {
            return Err(NexusError::Probe {
                module_id: module.id.clone(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(ProbeReport::with_latency(0))
    }

    async fn restart(&self, module: &ModuleRecord) -> Result<()> {
        self.restarts.lock().unwrap().push(module.id.clone());
        if self.heal_on_restart.lock().unwrap().remove(&module.id) {
            self.recover(&module.id);
        }
        Ok(())
    }
}

/// Config with fast repair timings and the given modules
pub fn config_with(modules: Vec<ModuleDescriptor>) -> AppConfig {
    let mut config = AppConfig::default();
    config.poller.probe_timeout_ms = 500;
    config.repair.max_attempts = 0;
    config.repair.delay_ms = 5;
    config.modules = modules;
    config
}

pub fn module(id: &str, category: ModuleCategory) -> ModuleDescriptor {
    ModuleDescriptor::new(id, id.to_uppercase(), category)
}

pub async fn build(config: &AppConfig, prober: Arc<ScriptedProber>) -> Nexus {
    let nexus = Nexus::with_prober(config, prober).await.unwrap();
    nexus.register_modules(config).await.unwrap();
    nexus
}
