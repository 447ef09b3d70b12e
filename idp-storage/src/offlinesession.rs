use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;

use idp_slo::Result;

use crate::{keys::offline_session_key, kv::KvStorage, Updater};

/// All refresh tokens a user holds through one connector.
///
/// `refresh` is keyed by client ID. It is never absent: a session created
/// without tokens reads back as an empty map.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OfflineSessions {
    pub user_id: String,
    pub conn_id: String,
    pub refresh: HashMap<String, RefreshTokenRef>,
    pub connector_data: Vec<u8>,
}

/// Reference from an offline session to a stored refresh token.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshTokenRef {
    pub id: String,
    pub client_id: String,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

#[automock]
#[async_trait]
pub trait OfflineSessionStore: Send + Sync {
    async fn create_offline_sessions(
        &self,
        sessions: &OfflineSessions,
    ) -> Result<()>;
    async fn get_offline_sessions(
        &self,
        user_id: &str,
        conn_id: &str,
    ) -> Result<OfflineSessions>;
    async fn update_offline_sessions(
        &self,
        user_id: &str,
        conn_id: &str,
        updater: Updater<OfflineSessions>,
    ) -> Result<OfflineSessions>;
    async fn delete_offline_sessions(
        &self,
        user_id: &str,
        conn_id: &str,
    ) -> Result<()>;
    async fn list_offline_sessions(&self) -> Result<Vec<OfflineSessions>>;
}

#[async_trait]
impl OfflineSessionStore for KvStorage {
    #[tracing::instrument(skip_all)]
    async fn create_offline_sessions(
        &self,
        sessions: &OfflineSessions,
    ) -> Result<()> {
        self.create_record(sessions).await
    }

    #[tracing::instrument(skip(self))]
    async fn get_offline_sessions(
        &self,
        user_id: &str,
        conn_id: &str,
    ) -> Result<OfflineSessions> {
        self.get_record(&offline_session_key(user_id, conn_id)?).await
    }

    #[tracing::instrument(skip(self, updater))]
    async fn update_offline_sessions(
        &self,
        user_id: &str,
        conn_id: &str,
        updater: Updater<OfflineSessions>,
    ) -> Result<OfflineSessions> {
        self.update_record(&offline_session_key(user_id, conn_id)?, updater)
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_offline_sessions(
        &self,
        user_id: &str,
        conn_id: &str,
    ) -> Result<()> {
        self.delete_record(&offline_session_key(user_id, conn_id)?).await
    }

    #[tracing::instrument(skip(self))]
    async fn list_offline_sessions(&self) -> Result<Vec<OfflineSessions>> {
        self.list_records().await
    }
}
