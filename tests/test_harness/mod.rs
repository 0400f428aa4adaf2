//! Shared setup for end-to-end tests

#![allow(dead_code)]

use async_trait::async_trait;
use idtrace::logging::init_tracing;
use idtrace::{CleanupCoordinator, IdGenerator, ResourceRegistry, TrackerConfig};
use resource_tracker::{ClientConnector, ServiceType};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One isolated tracker stack per test
pub struct TestEnvironment {
    pub generator: Arc<IdGenerator>,
    pub registry: ResourceRegistry,
    pub coordinator: CleanupCoordinator,
}

impl TestEnvironment {
    pub fn new(component: &str) -> Self {
        init_tracing(false);
        let registry = ResourceRegistry::new();
        let coordinator =
            CleanupCoordinator::new(registry.clone(), &TrackerConfig::for_component(component));
        Self {
            generator: Arc::new(IdGenerator::new()),
            registry,
            coordinator,
        }
    }
}

/// Connector that records every connect/disconnect by client id
pub struct RecordingConnector {
    service: ServiceType,
    pub connected: AtomicUsize,
    pub disconnected: AtomicUsize,
}

impl RecordingConnector {
    pub fn new(service: ServiceType) -> Self {
        Self {
            service,
            connected: AtomicUsize::new(0),
            disconnected: AtomicUsize::new(0),
        }
    }

    pub fn disconnects(&self) -> usize {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientConnector for RecordingConnector {
    type Client = Arc<String>;

    fn service_type(&self) -> ServiceType {
        self.service.clone()
    }

    async fn connect(&self, client_id: &str) -> anyhow::Result<Arc<String>> {
        self.connected.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(client_id.to_string()))
    }

    async fn disconnect(&self, client_id: &str, client: Arc<String>) -> anyhow::Result<()> {
        anyhow::ensure!(client.as_str() == client_id, "handle belongs to {}", client);
        self.disconnected.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
