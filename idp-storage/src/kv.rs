//! Record level create/get/update/delete on top of a revisioned
//! key-value backend.
//!
//! A backend only has to provide create-if-absent, compare-and-swap on a
//! revision, delete and prefix listing. [`KvStorage`] builds the full
//! storage contract from those: it keys and encodes records, runs the
//! caller's updater between read and conditional write, and bounds every
//! backend round trip with a timeout.

use std::{fmt, future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::{debug, warn};

use idp_slo::{errors, Result};

use crate::{
    codec::{self, Expiring, Record},
    gc::Scanned,
    Updater,
};

/// Stored value together with the revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub key: String,
    pub value: Vec<u8>,
    /// Never 0 for a stored key; 0 stands for "absent".
    pub revision: u64,
}

/// Primitive operations a storage technology must support atomically.
#[async_trait]
pub trait Backend: fmt::Debug + Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Versioned>>;

    /// Fails with `AlreadyExists` if the key is present.
    async fn create(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Replaces the value only if the key is still at `revision`, fails
    /// with `Conflict` otherwise (including when the key is gone).
    async fn compare_and_swap(
        &self,
        key: &str,
        revision: u64,
        value: Vec<u8>,
    ) -> Result<()>;

    /// Fails with `NotFound` if the key is absent.
    async fn delete(&self, key: &str) -> Result<()>;

    async fn list(&self, prefix: &str) -> Result<Vec<Versioned>>;

    /// Releases the underlying connection. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct KvStorage {
    backend: Arc<dyn Backend>,
    timeout: Duration,
}

impl KvStorage {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn bounded<T, F>(&self, op: &str, key: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(v) => v,
            Err(_) => Err(errors::anyhow(anyhow::anyhow!(
                "{} {} timed out after {:?}",
                op,
                key,
                self.timeout
            ))),
        }
    }

    /// A row stored under a different key is absent, whatever the
    /// backend's collation considers equal.
    async fn fetch(&self, key: &str) -> Result<Option<Versioned>> {
        let current = self.bounded("get", key, self.backend.get(key)).await?;
        Ok(current.filter(|v| v.key == key))
    }

    pub(crate) async fn create_record<R: Record>(&self, record: &R) -> Result<()> {
        record.check()?;
        let key = record.storage_key()?;
        let value = codec::encode(record)?;
        self.bounded("create", &key, self.backend.create(&key, value))
            .await?;
        debug!("created {}", key);
        Ok(())
    }

    pub(crate) async fn get_record<R: Record>(&self, key: &str) -> Result<R> {
        match self.fetch(key).await? {
            Some(current) => codec::decode(&current.value),
            None => Err(errors::not_found(key)),
        }
    }

    /// Read-modify-write of an existing record.
    pub(crate) async fn update_record<R: Record>(
        &self,
        key: &str,
        updater: Updater<R>,
    ) -> Result<R> {
        let current = self.fetch(key).await?.ok_or_else(|| errors::not_found(key))?;
        let previous: R = codec::decode(&current.value)?;
        let next = updater(previous.clone())?;
        self.commit(key, Some((current.revision, &previous)), &next)
            .await?;
        Ok(next)
    }

    /// Read-modify-write that starts from `R::default()` when the key is
    /// absent. Losing the race to create it is reported as a conflict.
    pub(crate) async fn upsert_record<R: Record + Default>(
        &self,
        key: &str,
        updater: Updater<R>,
    ) -> Result<R> {
        match self.fetch(key).await? {
            Some(current) => {
                let previous: R = codec::decode(&current.value)?;
                let next = updater(previous.clone())?;
                self.commit(key, Some((current.revision, &previous)), &next)
                    .await?;
                Ok(next)
            }
            None => {
                let next = updater(R::default())?;
                self.commit(key, None, &next).await?;
                Ok(next)
            }
        }
    }

    async fn commit<R: Record>(
        &self,
        key: &str,
        previous: Option<(u64, &R)>,
        next: &R,
    ) -> Result<()> {
        next.check()?;
        if next.storage_key()? != key {
            return Err(errors::bad_request(&format!(
                "update must not change the identity of {}",
                key
            )));
        }
        let value = codec::encode(next)?;
        let result = match previous {
            Some((revision, previous)) => {
                next.check_update(previous)?;
                self.bounded(
                    "update",
                    key,
                    self.backend.compare_and_swap(key, revision, value),
                )
                .await
            }
            None => self
                .bounded("update", key, self.backend.create(key, value))
                .await
                .map_err(|err| {
                    if err.is_already_exists() {
                        errors::conflict(key)
                    } else {
                        err
                    }
                }),
        };
        if let Err(err) = &result {
            if err.is_conflict() {
                warn!("concurrent modification of {}", key);
            }
        }
        result
    }

    pub(crate) async fn delete_record(&self, key: &str) -> Result<()> {
        self.bounded("delete", key, self.backend.delete(key)).await?;
        debug!("deleted {}", key);
        Ok(())
    }

    pub(crate) async fn list_records<R: Record>(&self) -> Result<Vec<R>> {
        let prefix = R::KIND.prefix();
        let rows = self
            .bounded("list", prefix, self.backend.list(prefix))
            .await?;
        rows.iter().map(|row| codec::decode(&row.value)).collect()
    }

    /// Expiry of every record of `R`. A record that fails to decode is
    /// reported in place instead of failing the whole scan.
    pub(crate) async fn scan_expiring<R: Expiring>(&self) -> Result<Vec<Scanned>> {
        let prefix = R::KIND.prefix();
        let rows = self
            .bounded("list", prefix, self.backend.list(prefix))
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let expiry = codec::decode::<R>(&row.value).map(|r| r.expiry());
                (row.key, expiry)
            })
            .collect())
    }

    pub(crate) async fn close_backend(&self) -> Result<()> {
        self.bounded("close", "backend", self.backend.close()).await
    }
}
