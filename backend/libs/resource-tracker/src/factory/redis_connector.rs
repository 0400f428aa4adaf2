use super::client::ClientConnector;
use crate::record::ServiceType;
use anyhow::Context;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Client;

/// Redis connector that names each connection after its client id
///
/// `CLIENT LIST` on the server then shows which user and request own a
/// connection.
pub struct RedisConnector {
    client: Client,
}

impl RedisConnector {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let client = Client::open(url).context("invalid redis url")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ClientConnector for RedisConnector {
    type Client = ConnectionManager;

    fn service_type(&self) -> ServiceType {
        ServiceType::Redis
    }

    async fn connect(&self, client_id: &str) -> anyhow::Result<ConnectionManager> {
        let mut conn = ConnectionManager::new(self.client.clone())
            .await
            .context("failed to connect to redis")?;

        redis::cmd("CLIENT")
            .arg("SETNAME")
            .arg(client_id)
            .query_async::<_, ()>(&mut conn)
            .await
            .context("CLIENT SETNAME failed")?;

        Ok(conn)
    }

    async fn disconnect(&self, client_id: &str, client: ConnectionManager) -> anyhow::Result<()> {
        // the connection closes once the last manager clone is dropped
        drop(client);
        tracing::debug!(client_id = %client_id, "dropped redis connection");
        Ok(())
    }
}
