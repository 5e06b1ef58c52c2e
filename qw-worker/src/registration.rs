//! Registration lifecycle (spec.md §4.C/§4.D): announces the worker to
//! the registry and the discovery map on startup, and deregisters it on
//! shutdown. Registry connectivity is optional; a worker runs fine
//! without one, just undiscoverable by the registry-backed client.

use std::sync::Arc;

use qw_discovery::DiscoveryHandle;
use qw_messages::WorkerIdentity;
use qw_registry::RegistryClient;
use tracing::info;
use tracing::warn;

use crate::metrics::Metrics;

pub struct Registration {
    registry: Option<RegistryClient>,
    discovery: DiscoveryHandle,
    identity: WorkerIdentity,
    metrics: Arc<Metrics>,
}

impl Registration {
    pub fn new(
        registry: Option<RegistryClient>,
        discovery: DiscoveryHandle,
        identity: WorkerIdentity,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            registry,
            discovery,
            identity,
            metrics,
        }
    }

    pub async fn announce(&self) {
        if let Err(err) = self.discovery.announce(&self.identity).await {
            warn!(worker = %self.identity.name, error = %err, "discovery announcement failed");
        }
        if let Some(registry) = &self.registry {
            if let Err(err) = registry.push(&self.identity).await {
                self.metrics.increment_registry_errors();
                warn!(worker = %self.identity.name, error = %err, "registry push failed");
            }
        }
        info!(worker = %self.identity.name, "worker announced");
    }

    pub async fn deregister(&self) {
        self.discovery.deregister(&self.identity.name).await;
        if let Some(registry) = &self.registry {
            if let Err(err) = registry.remove(&self.identity).await {
                self.metrics.increment_registry_errors();
                warn!(worker = %self.identity.name, error = %err, "registry removal failed");
            }
        }
        info!(worker = %self.identity.name, "worker deregistered");
    }
}
