use async_trait::async_trait;
use mockall::automock;

use idp_slo::Result;

use crate::{keys::Kind, kv::KvStorage, Updater};

/// Upstream identity connector configuration.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Connector {
    pub id: String,
    pub connector_type: String,
    pub name: String,
    pub resource_version: String,
    /// Type specific configuration, opaque to the store.
    pub config: Vec<u8>,
}

#[automock]
#[async_trait]
pub trait ConnectorStore: Send + Sync {
    async fn create_connector(&self, connector: &Connector) -> Result<()>;
    async fn get_connector(&self, id: &str) -> Result<Connector>;
    async fn update_connector(
        &self,
        id: &str,
        updater: Updater<Connector>,
    ) -> Result<Connector>;
    async fn delete_connector(&self, id: &str) -> Result<()>;
    async fn list_connectors(&self) -> Result<Vec<Connector>>;
}

#[async_trait]
impl ConnectorStore for KvStorage {
    #[tracing::instrument(skip_all)]
    async fn create_connector(&self, connector: &Connector) -> Result<()> {
        self.create_record(connector).await
    }

    #[tracing::instrument(skip(self))]
    async fn get_connector(&self, id: &str) -> Result<Connector> {
        self.get_record(&Kind::Connector.key(id)?).await
    }

    #[tracing::instrument(skip(self, updater))]
    async fn update_connector(
        &self,
        id: &str,
        updater: Updater<Connector>,
    ) -> Result<Connector> {
        self.update_record(&Kind::Connector.key(id)?, updater).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_connector(&self, id: &str) -> Result<()> {
        self.delete_record(&Kind::Connector.key(id)?).await
    }

    #[tracing::instrument(skip(self))]
    async fn list_connectors(&self) -> Result<Vec<Connector>> {
        self.list_records().await
    }
}
