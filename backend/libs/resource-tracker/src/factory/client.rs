use crate::cleanup::{CleanupCoordinator, CleanupOutcome, CleanupRequest};
use crate::error::{TrackerError, TrackerResult};
use crate::record::{ResourceKind, ResourceRecord, ServiceType};
use async_trait::async_trait;
use id_correlation::IdGenerator;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Opens and closes connections to one downstream service
///
/// The client id is passed to both calls so the connector can tag the
/// connection on the server side.
#[async_trait]
pub trait ClientConnector: Send + Sync + 'static {
    type Client: Clone + Send + Sync + 'static;

    fn service_type(&self) -> ServiceType;

    async fn connect(&self, client_id: &str) -> anyhow::Result<Self::Client>;

    async fn disconnect(&self, client_id: &str, client: Self::Client) -> anyhow::Result<()>;
}

/// A connected client and the ids it was minted under
#[derive(Debug, Clone)]
pub struct ClientLease<T> {
    pub client_id: String,
    pub request_id: String,
    pub user_id: String,
    pub client: T,
}

/// Database client factory keyed by correlated client ids
pub struct ClientFactory<C: ClientConnector> {
    connector: Arc<C>,
    generator: Arc<IdGenerator>,
    coordinator: CleanupCoordinator,
    // client_id -> live handle
    clients: Arc<Mutex<HashMap<String, C::Client>>>,
}

impl<C: ClientConnector> Clone for ClientFactory<C> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            generator: Arc::clone(&self.generator),
            coordinator: self.coordinator.clone(),
            clients: Arc::clone(&self.clients),
        }
    }
}

impl<C: ClientConnector> ClientFactory<C> {
    pub fn new(connector: C, generator: Arc<IdGenerator>, coordinator: CleanupCoordinator) -> Self {
        Self {
            connector: Arc::new(connector),
            generator,
            coordinator,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn coordinator(&self) -> &CleanupCoordinator {
        &self.coordinator
    }

    /// Mint a client id for (service, user, request), connect, and register it
    ///
    /// A failed connect leaves nothing in the registry.
    pub async fn acquire(
        &self,
        user_id: &str,
        request_id: &str,
    ) -> TrackerResult<ClientLease<C::Client>> {
        let service = self.connector.service_type();
        let client_id = self
            .generator
            .generate_client_id(&service.to_string(), user_id, request_id)?;

        let registry = self.coordinator.registry();
        registry.register(
            ResourceRecord::new(&client_id, request_id, ResourceKind::DatabaseClient(service))
                .with_user(user_id),
        )?;

        let client = match self.connector.connect(&client_id).await {
            Ok(client) => client,
            Err(source) => {
                registry.remove(&client_id);
                return Err(TrackerError::Connect { client_id, source });
            }
        };

        self.clients
            .lock()
            .await
            .insert(client_id.clone(), client.clone());
        registry.activate(&client_id)?;

        debug!(
            client_id = %client_id,
            request_id = %request_id,
            user_id = %user_id,
            "acquired client"
        );

        Ok(ClientLease {
            client_id,
            request_id: request_id.to_string(),
            user_id: user_id.to_string(),
            client,
        })
    }

    /// Verify the id pair and service tag, disconnect, and settle the record
    pub async fn release(&self, request_id: &str, client_id: &str) -> CleanupOutcome {
        let request = CleanupRequest::new(request_id, client_id)
            .with_service(self.connector.service_type().to_string());

        if let Err(event) = self.coordinator.begin(&request) {
            return CleanupOutcome::Leaked(event);
        }

        let client = self.clients.lock().await.remove(client_id);
        let Some(client) = client else {
            return CleanupOutcome::Leaked(self.coordinator.fail(client_id, "no live client handle"));
        };

        match self.connector.disconnect(client_id, client).await {
            Ok(()) => match self.coordinator.complete(client_id) {
                Ok(record) => CleanupOutcome::Reclaimed(record),
                Err(err) => CleanupOutcome::Leaked(self.coordinator.fail(client_id, err.to_string())),
            },
            Err(err) => {
                error!(
                    client_id = %client_id,
                    service = %self.connector.service_type(),
                    error = %err,
                    "client teardown failed"
                );
                CleanupOutcome::Leaked(self.coordinator.fail(client_id, err.to_string()))
            }
        }
    }

    pub async fn live_clients(&self) -> usize {
        self.clients.lock().await.len()
    }
}
