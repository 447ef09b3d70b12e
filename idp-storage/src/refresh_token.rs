use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;

use idp_slo::Result;

use crate::{keys::Kind, kv::KvStorage, Claims, Updater};

/// A refresh token and the identity it was issued for.
///
/// On rotation the previous value moves to `obsolete_token`, which stays
/// acceptable for one reuse window so that client retries succeed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub id: String,
    pub token: String,
    pub obsolete_token: String,

    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,

    pub client_id: String,
    pub connector_id: String,
    pub connector_data: Vec<u8>,
    pub claims: Claims,

    pub scopes: Vec<String>,
    pub nonce: String,
}

#[automock]
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn create_refresh_token(&self, refresh_token: &RefreshToken) -> Result<()>;
    async fn get_refresh_token(&self, id: &str) -> Result<RefreshToken>;
    async fn update_refresh_token(
        &self,
        id: &str,
        updater: Updater<RefreshToken>,
    ) -> Result<RefreshToken>;
    async fn delete_refresh_token(&self, id: &str) -> Result<()>;
    async fn list_refresh_tokens(&self) -> Result<Vec<RefreshToken>>;
}

#[async_trait]
impl RefreshTokenStore for KvStorage {
    #[tracing::instrument(skip_all)]
    async fn create_refresh_token(&self, refresh_token: &RefreshToken) -> Result<()> {
        self.create_record(refresh_token).await
    }

    #[tracing::instrument(skip(self))]
    async fn get_refresh_token(&self, id: &str) -> Result<RefreshToken> {
        self.get_record(&Kind::RefreshToken.key(id)?).await
    }

    #[tracing::instrument(skip(self, updater))]
    async fn update_refresh_token(
        &self,
        id: &str,
        updater: Updater<RefreshToken>,
    ) -> Result<RefreshToken> {
        self.update_record(&Kind::RefreshToken.key(id)?, updater).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_refresh_token(&self, id: &str) -> Result<()> {
        self.delete_record(&Kind::RefreshToken.key(id)?).await
    }

    #[tracing::instrument(skip(self))]
    async fn list_refresh_tokens(&self) -> Result<Vec<RefreshToken>> {
        self.list_records().await
    }
}
