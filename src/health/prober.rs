//! Module probes
//!
//! A `Prober` is the capability interface a module exposes to the poller:
//! a liveness check plus an optional restart hook.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::debug;

use crate::domain::{ModuleRecord, ProbeTarget};
use crate::error::{NexusError, Result};

/// Successful probe outcome
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    /// Round-trip latency as measured by the probe; the evaluator's own
    /// measurement is used when unset
    pub latency_ms: Option<u64>,
    pub detail: Option<String>,
}

impl ProbeReport {
    pub fn with_latency(latency_ms: u64) -> Self {
        Self {
            latency_ms: Some(latency_ms),
            detail: None,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Prober: Send + Sync {
    /// Liveness/readiness check for one module
    async fn check(&self, module: &ModuleRecord) -> Result<ProbeReport>;

    /// Ask the module to restart itself; the caller re-probes afterwards
    async fn restart(&self, _module: &ModuleRecord) -> Result<()> {
        Ok(())
    }
}

/// Probes modules over the network according to their `ProbeTarget`
///
/// Modules without a target are passive and always report healthy.
pub struct NetworkProber {
    client: reqwest::Client,
}

impl NetworkProber {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("nexus-registry/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    async fn check_http(
        &self,
        module: &ModuleRecord,
        url: &str,
        expect_status: Option<u16>,
    ) -> Result<ProbeReport> {
        let start = Instant::now();
        let response = self.client.get(url).send().await.map_err(|e| NexusError::Probe {
            module_id: module.id.clone(),
            reason: format!("GET {} failed: {}", url, e),
        })?;
        let latency_ms = start.elapsed().as_millis() as u64;
        let status = response.status();

        let healthy = match expect_status {
            Some(expected) => status.as_u16() == expected,
            None => status.is_success(),
        };
        if !healthy {
            return Err(NexusError::Probe {
                module_id: module.id.clone(),
                reason: format!("GET {} returned {}", url, status),
            });
        }

        debug!("HTTP probe {} -> {} in {}ms", url, status, latency_ms);
        Ok(ProbeReport {
            latency_ms: Some(latency_ms),
            detail: Some(format!("http {}", status.as_u16())),
        })
    }

    async fn check_tcp(&self, module: &ModuleRecord, address: &str) -> Result<ProbeReport> {
        let start = Instant::now();
        TcpStream::connect(address)
            .await
            .map_err(|e| NexusError::Probe {
                module_id: module.id.clone(),
                reason: format!("connect {} failed: {}", address, e),
            })?;
        let latency_ms = start.elapsed().as_millis() as u64;

        debug!("TCP probe {} connected in {}ms", address, latency_ms);
        Ok(ProbeReport {
            latency_ms: Some(latency_ms),
            detail: Some("tcp connected".to_string()),
        })
    }
}

#[async_trait]
impl Prober for NetworkProber {
    async fn check(&self, module: &ModuleRecord) -> Result<ProbeReport> {
        match &module.probe {
            None => Ok(ProbeReport {
                latency_ms: Some(0),
                detail: Some("passive".to_string()),
            }),
            Some(ProbeTarget::Http {
                url, expect_status, ..
            }) => self.check_http(module, url, *expect_status).await,
            Some(ProbeTarget::Tcp { address }) => self.check_tcp(module, address).await,
        }
    }

    async fn restart(&self, module: &ModuleRecord) -> Result<()> {
        let Some(ProbeTarget::Http {
            restart_url: Some(restart_url),
            ..
        }) = &module.probe
        else {
            debug!("Module {} has no restart hook; re-probing only", module.id);
            return Ok(());
        };

        let response = self
            .client
            .post(restart_url)
            .send()
            .await
            .map_err(|e| NexusError::Probe {
                module_id: module.id.clone(),
                reason: format!("POST {} failed: {}", restart_url, e),
            })?;
        if !response.status().is_success() {
            return Err(NexusError::Probe {
                module_id: module.id.clone(),
                reason: format!("POST {} returned {}", restart_url, response.status()),
            });
        }
        Ok(())
    }
}
