use async_trait::async_trait;
use mockall::automock;
use validator::Validate;

use idp_slo::Result;

use crate::{keys::password_key, kv::KvStorage, Updater};

/// Local email/password identity.
///
/// The store keys passwords by the lower-cased email; `email` itself is
/// kept as supplied.
#[derive(Debug, Default, Clone, PartialEq, Eq, Validate)]
pub struct Password {
    #[validate(email)]
    pub email: String,
    /// Bcrypt or argon2 hash, produced by the caller.
    pub hash: Vec<u8>,
    pub username: String,
    pub user_id: String,
}

#[automock]
#[async_trait]
pub trait PasswordStore: Send + Sync {
    async fn create_password(&self, password: &Password) -> Result<()>;
    async fn get_password(&self, email: &str) -> Result<Password>;
    async fn update_password(
        &self,
        email: &str,
        updater: Updater<Password>,
    ) -> Result<Password>;
    async fn delete_password(&self, email: &str) -> Result<()>;
    async fn list_passwords(&self) -> Result<Vec<Password>>;
}

#[async_trait]
impl PasswordStore for KvStorage {
    #[tracing::instrument(skip_all)]
    async fn create_password(&self, password: &Password) -> Result<()> {
        self.create_record(password).await
    }

    #[tracing::instrument(skip(self))]
    async fn get_password(&self, email: &str) -> Result<Password> {
        self.get_record(&password_key(email)?).await
    }

    #[tracing::instrument(skip(self, updater))]
    async fn update_password(
        &self,
        email: &str,
        updater: Updater<Password>,
    ) -> Result<Password> {
        self.update_record(&password_key(email)?, updater).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_password(&self, email: &str) -> Result<()> {
        self.delete_record(&password_key(email)?).await
    }

    #[tracing::instrument(skip(self))]
    async fn list_passwords(&self) -> Result<Vec<Password>> {
        self.list_records().await
    }
}
