use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebkey as jwk;
use mockall::automock;

use idp_slo::Result;

use crate::{keys::keys_key, kv::KvStorage, Updater};

/// The provider's signing material. Exactly one record exists per
/// provider instance.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Keys {
    /// Private key used to sign new tokens.
    pub signing_key: Option<jwk::JsonWebKey>,
    /// Public half of `signing_key`.
    pub signing_key_pub: Option<jwk::JsonWebKey>,
    /// Previously used public keys still published for verification.
    pub verification_keys: Vec<VerificationKey>,
    pub next_rotation: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerificationKey {
    pub public_key: jwk::JsonWebKey,
    pub expiry: DateTime<Utc>,
}

#[automock]
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn get_keys(&self) -> Result<Keys>;
    /// Applies `updater` to the stored keys, or to `Keys::default()` on
    /// first use.
    async fn update_keys(&self, updater: Updater<Keys>) -> Result<Keys>;
}

#[async_trait]
impl KeyStore for KvStorage {
    #[tracing::instrument(skip(self))]
    async fn get_keys(&self) -> Result<Keys> {
        self.get_record(&keys_key()).await
    }

    #[tracing::instrument(skip(self, updater))]
    async fn update_keys(&self, updater: Updater<Keys>) -> Result<Keys> {
        self.upsert_record(&keys_key(), updater).await
    }
}
