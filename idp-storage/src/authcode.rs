use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;

use idp_slo::Result;

use crate::{keys::Kind, kv::KvStorage, Claims, Pkce, Updater};

/// Short lived code handed to the client after a successful login.
///
/// The protocol layer deletes it on redemption.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AuthCode {
    pub id: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub nonce: String,
    pub scopes: Vec<String>,

    pub connector_id: String,
    pub connector_data: Vec<u8>,
    pub claims: Claims,

    pub expiry: DateTime<Utc>,
    pub pkce: Pkce,
}

#[automock]
#[async_trait]
pub trait AuthCodeStore: Send + Sync {
    async fn create_auth_code(&self, auth_code: &AuthCode) -> Result<()>;
    async fn get_auth_code(&self, id: &str) -> Result<AuthCode>;
    async fn update_auth_code(
        &self,
        id: &str,
        updater: Updater<AuthCode>,
    ) -> Result<AuthCode>;
    async fn delete_auth_code(&self, id: &str) -> Result<()>;
}

#[async_trait]
impl AuthCodeStore for KvStorage {
    #[tracing::instrument(skip_all)]
    async fn create_auth_code(&self, auth_code: &AuthCode) -> Result<()> {
        self.create_record(auth_code).await
    }

    #[tracing::instrument(skip(self))]
    async fn get_auth_code(&self, id: &str) -> Result<AuthCode> {
        self.get_record(&Kind::AuthCode.key(id)?).await
    }

    #[tracing::instrument(skip(self, updater))]
    async fn update_auth_code(
        &self,
        id: &str,
        updater: Updater<AuthCode>,
    ) -> Result<AuthCode> {
        self.update_record(&Kind::AuthCode.key(id)?, updater).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_auth_code(&self, id: &str) -> Result<()> {
        self.delete_record(&Kind::AuthCode.key(id)?).await
    }
}
