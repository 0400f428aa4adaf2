use super::client::ClientConnector;
use crate::record::ServiceType;
use anyhow::Context;
use async_trait::async_trait;
use clickhouse::Client;

/// ClickHouse connector that tags every query with its client id
///
/// The id lands in `system.query_log.log_comment`.
pub struct ClickHouseConnector {
    url: String,
    database: String,
}

impl ClickHouseConnector {
    pub fn new(url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            database: database.into(),
        }
    }
}

#[async_trait]
impl ClientConnector for ClickHouseConnector {
    type Client = Client;

    fn service_type(&self) -> ServiceType {
        ServiceType::ClickHouse
    }

    async fn connect(&self, client_id: &str) -> anyhow::Result<Client> {
        let client = Client::default()
            .with_url(&self.url)
            .with_database(&self.database)
            .with_option("log_comment", client_id);

        client
            .query("SELECT 1")
            .execute()
            .await
            .context("clickhouse health check failed")?;

        Ok(client)
    }

    async fn disconnect(&self, _client_id: &str, _client: Client) -> anyhow::Result<()> {
        // HTTP transport; nothing held open between queries
        Ok(())
    }
}
