use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;

use idp_slo::Result;

use crate::{keys::Kind, kv::KvStorage, Claims, Pkce, Updater};

/// Server side state of one in-progress authorization flow.
///
/// Lives only for the duration of a single round-trip through the
/// upstream connector; swept by the garbage collector once `expiry` has
/// passed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub id: String,
    pub client_id: String,
    pub response_types: Vec<String>,
    pub scopes: Vec<String>,
    pub redirect_uri: String,
    pub nonce: String,
    pub state: String,
    pub force_approval_prompt: bool,
    pub expiry: DateTime<Utc>,

    /// Set once the user has authenticated with the connector.
    pub logged_in: bool,
    pub claims: Claims,

    pub connector_id: String,
    pub connector_data: Vec<u8>,

    pub pkce: Pkce,
    pub hmac_key: Vec<u8>,
}

#[automock]
#[async_trait]
pub trait AuthRequestStore: Send + Sync {
    async fn create_auth_request(&self, auth_request: &AuthRequest) -> Result<()>;
    async fn get_auth_request(&self, id: &str) -> Result<AuthRequest>;
    async fn update_auth_request(
        &self,
        id: &str,
        updater: Updater<AuthRequest>,
    ) -> Result<AuthRequest>;
    async fn delete_auth_request(&self, id: &str) -> Result<()>;
}

#[async_trait]
impl AuthRequestStore for KvStorage {
    #[tracing::instrument(skip_all)]
    async fn create_auth_request(&self, auth_request: &AuthRequest) -> Result<()> {
        self.create_record(auth_request).await
    }

    #[tracing::instrument(skip(self))]
    async fn get_auth_request(&self, id: &str) -> Result<AuthRequest> {
        self.get_record(&Kind::AuthRequest.key(id)?).await
    }

    #[tracing::instrument(skip(self, updater))]
    async fn update_auth_request(
        &self,
        id: &str,
        updater: Updater<AuthRequest>,
    ) -> Result<AuthRequest> {
        self.update_record(&Kind::AuthRequest.key(id)?, updater).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_auth_request(&self, id: &str) -> Result<()> {
        self.delete_record(&Kind::AuthRequest.key(id)?).await
    }
}
