//! Persistence for the identity provider's protocol state.
//!
//! Every entity kind has its own store trait; [`Storage`] bundles them
//! with garbage collection and shutdown. [`KvStorage`] implements all of
//! them on top of any [`kv::Backend`], which is where storage
//! technologies plug in.

pub mod authcode;
pub mod authrequest;
pub mod client;
pub mod codec;
mod config;
pub mod connector;
pub mod device;
pub mod gc;
pub mod ids;
pub mod key;
pub mod keys;
pub mod kv;
mod mariadb;
mod memory;
mod model;
pub mod offlinesession;
pub mod password;
pub mod refresh_token;

pub use config::{BackendConfig, MariaDbConfig, StorageConfig};
pub use gc::{GcError, GcFailure, GcResult};
pub use kv::KvStorage;
pub use mariadb::MariaDbBackend;
pub use memory::MemoryBackend;
pub use model::{Claims, Pkce};

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use idp_slo::Result;

use authcode::AuthCodeStore;
use authrequest::AuthRequestStore;
use client::ClientStore;
use connector::ConnectorStore;
use device::{DeviceRequestStore, DeviceTokenStore};
use key::KeyStore;
use offlinesession::OfflineSessionStore;
use password::PasswordStore;
use refresh_token::RefreshTokenStore;

/// Read-modify-write callback. An error aborts the update and is returned
/// to the caller unchanged.
pub type Updater<T> = Box<dyn FnOnce(T) -> Result<T> + Send>;

#[async_trait]
pub trait Storage:
    ClientStore
    + AuthRequestStore
    + AuthCodeStore
    + RefreshTokenStore
    + PasswordStore
    + OfflineSessionStore
    + ConnectorStore
    + KeyStore
    + DeviceRequestStore
    + DeviceTokenStore
    + fmt::Debug
{
    /// Deletes every short-lived record that expired before `now`.
    async fn garbage_collect(
        &self,
        now: DateTime<Utc>,
    ) -> Result<GcResult, GcError>;

    /// Releases backend resources. Later calls on this store fail.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
impl Storage for KvStorage {
    #[tracing::instrument(skip(self))]
    async fn garbage_collect(
        &self,
        now: DateTime<Utc>,
    ) -> Result<GcResult, GcError> {
        gc::collect(self, now).await
    }

    async fn close(&self) -> Result<()> {
        self.close_backend().await
    }
}
