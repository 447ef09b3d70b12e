use async_trait::async_trait;
use mockall::automock;
use validator::{Validate, ValidationError};

use idp_slo::Result;

use crate::{keys::Kind, kv::KvStorage, Updater};

/// A registered OAuth2 client.
///
/// Confidential clients must carry at least one redirect URI. Public
/// clients authenticate without a secret and are identified to the user
/// by their display name, so they must have one and must not register
/// redirect URIs.
#[derive(Debug, Default, Clone, PartialEq, Eq, Validate)]
#[validate(schema(function = "validate_client"))]
pub struct Client {
    #[validate(length(min = 1))]
    pub id: String,
    pub secret: String,
    pub redirect_uris: Vec<String>,
    pub trusted_peers: Vec<String>,
    pub public: bool,
    pub name: String,
    pub logo_url: String,
    pub admin: bool,
}

fn validate_client(client: &Client) -> Result<(), ValidationError> {
    if client.public {
        if client.name.is_empty() {
            return Err(ValidationError::new("public_client_name"));
        }
        if !client.redirect_uris.is_empty() {
            return Err(ValidationError::new("public_client_redirect_uris"));
        }
    } else if client.redirect_uris.is_empty() {
        return Err(ValidationError::new("confidential_client_redirect_uris"));
    }
    Ok(())
}

#[automock]
#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn create_client(&self, client: &Client) -> Result<()>;
    async fn get_client(&self, id: &str) -> Result<Client>;
    async fn update_client(
        &self,
        id: &str,
        updater: Updater<Client>,
    ) -> Result<Client>;
    async fn delete_client(&self, id: &str) -> Result<()>;
    async fn list_clients(&self) -> Result<Vec<Client>>;
}

#[async_trait]
impl ClientStore for KvStorage {
    #[tracing::instrument(skip_all)]
    async fn create_client(&self, client: &Client) -> Result<()> {
        self.create_record(client).await
    }

    #[tracing::instrument(skip(self))]
    async fn get_client(&self, id: &str) -> Result<Client> {
        self.get_record(&Kind::Client.key(id)?).await
    }

    #[tracing::instrument(skip(self, updater))]
    async fn update_client(
        &self,
        id: &str,
        updater: Updater<Client>,
    ) -> Result<Client> {
        self.update_record(&Kind::Client.key(id)?, updater).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_client(&self, id: &str) -> Result<()> {
        self.delete_record(&Kind::Client.key(id)?).await
    }

    #[tracing::instrument(skip(self))]
    async fn list_clients(&self) -> Result<Vec<Client>> {
        self.list_records().await
    }
}
