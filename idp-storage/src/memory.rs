//! In-process backend modelled on a revisioned coordination store.
//!
//! A single counter is bumped by every mutation and each key remembers
//! the counter value of its last write. Compare-and-swap checks that
//! value inside one write-lock critical section with no await point, so a
//! cancelled call either committed completely or did nothing.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use tokio::sync::RwLock;

use idp_slo::{errors, Result};

use crate::kv::{Backend, Versioned};

#[derive(Debug, Default)]
struct State {
    revision: u64,
    entries: BTreeMap<String, Entry>,
}

#[derive(Debug)]
struct Entry {
    value: Vec<u8>,
    create_revision: u64,
    mod_revision: u64,
}

#[derive(Debug, Default)]
struct Inner {
    state: RwLock<State>,
    closed: AtomicBool,
}

/// Data lives as long as the last clone of the backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current store revision, i.e. the number of committed mutations.
    pub async fn revision(&self) -> u64 {
        self.inner.state.read().await.revision
    }

    /// Revision at which `key` was first created, if present.
    pub async fn create_revision(&self, key: &str) -> Option<u64> {
        self.inner
            .state
            .read()
            .await
            .entries
            .get(key)
            .map(|entry| entry.create_revision)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(errors::anyhow(anyhow::anyhow!(
                "memory storage is closed"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Versioned>> {
        self.ensure_open()?;
        let state = self.inner.state.read().await;
        Ok(state.entries.get(key).map(|entry| Versioned {
            key: key.to_owned(),
            value: entry.value.clone(),
            revision: entry.mod_revision,
        }))
    }

    async fn create(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.inner.state.write().await;
        if state.entries.contains_key(key) {
            return Err(errors::already_exists(key));
        }
        state.revision += 1;
        let revision = state.revision;
        state.entries.insert(
            key.to_owned(),
            Entry {
                value,
                create_revision: revision,
                mod_revision: revision,
            },
        );
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        revision: u64,
        value: Vec<u8>,
    ) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.inner.state.write().await;
        let next = state.revision + 1;
        match state.entries.get_mut(key) {
            Some(entry) if entry.mod_revision == revision => {
                entry.value = value;
                entry.mod_revision = next;
            }
            _ => return Err(errors::conflict(key)),
        }
        state.revision = next;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.inner.state.write().await;
        if state.entries.remove(key).is_none() {
            return Err(errors::not_found(key));
        }
        state.revision += 1;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<Versioned>> {
        self.ensure_open()?;
        let state = self.inner.state.read().await;
        Ok(state
            .entries
            .range(prefix.to_owned()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, entry)| Versioned {
                key: key.clone(),
                value: entry.value.clone(),
                revision: entry.mod_revision,
            })
            .collect())
    }

    async fn close(&self) -> Result<()> {
        self.inner.closed.store(true, Ordering::Release);
        Ok(())
    }
}
