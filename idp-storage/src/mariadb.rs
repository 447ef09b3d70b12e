//! MariaDB/MySQL backend.
//!
//! SQL has no compare-and-swap on a key, so every row carries a
//! `revision` counter. Conditional writes check and bump it inside a
//! single `UPDATE` statement; the affected row count tells whether the
//! swap happened.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{
    mysql::{MySqlPoolOptions, MySqlRow},
    MySqlPool, Row,
};
use tracing::info;

use idp_slo::{errors, errors::WithBacktrace, Result};

use crate::{
    kv::{Backend, Versioned},
    MariaDbConfig,
};

#[derive(Clone, Debug)]
pub struct MariaDbBackend {
    pool: MySqlPool,
}

impl MariaDbBackend {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Opens a pool for `config` and brings the `kv` table up to date when
    /// migrations are enabled.
    pub async fn connect(
        config: &MariaDbConfig,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_size)
            .min_connections(config.min_idle)
            .acquire_timeout(acquire_timeout)
            .connect(&config.url)
            .await
            .context("could not connect to mariadb")
            .map_err(errors::anyhow)?;

        if config.run_migrations {
            info!("running kv migrations");
            sqlx::migrate!()
                .run(&pool)
                .await
                .context("could not migrate the kv table")
                .map_err(errors::anyhow)?;
        }
        Ok(Self::new(pool))
    }
}

/// Classifies driver failures. Only the kinds callers act on are
/// distinguished; everything else, timeouts included, is internal.
fn translate(err: sqlx::Error) -> WithBacktrace {
    match &err {
        sqlx::Error::RowNotFound => errors::not_found("no rows"),
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            errors::already_exists(db.message())
        }
        _ => errors::any(err),
    }
}

fn versioned(row: &MySqlRow) -> Result<Versioned> {
    Ok(Versioned {
        key: row.try_get("key").map_err(errors::any)?,
        value: row.try_get("value").map_err(errors::any)?,
        revision: row.try_get::<u64, _>("revision").map_err(errors::any)?,
    })
}

/// Smallest string greater than every string starting with `prefix`.
fn prefix_end(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        if let Some(next) = char::from_u32(last as u32 + 1) {
            chars.push(next);
            return Some(chars.into_iter().collect());
        }
    }
    None
}

#[async_trait]
impl Backend for MariaDbBackend {
    #[tracing::instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Versioned>> {
        let row = sqlx::query(
            r#"SELECT `key`,`value`,`revision`
            FROM `kv`
            WHERE `key` = ?;"#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(translate)?;

        row.as_ref().map(versioned).transpose()
    }

    #[tracing::instrument(skip(self, value))]
    async fn create(&self, key: &str, value: Vec<u8>) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO `kv`
            (`key`,`value`,`revision`)
            VALUES(?,?,1);"#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|err| match translate(err) {
            err if err.is_already_exists() => errors::already_exists(key),
            err => err,
        })?;
        Ok(())
    }

    #[tracing::instrument(skip(self, value))]
    async fn compare_and_swap(
        &self,
        key: &str,
        revision: u64,
        value: Vec<u8>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"UPDATE `kv` SET `value` = ?, `revision` = `revision` + 1
            WHERE `key` = ? AND `revision` = ?;"#,
        )
        .bind(value)
        .bind(key)
        .bind(revision)
        .execute(&self.pool)
        .await
        .map_err(translate)?;

        if result.rows_affected() == 0 {
            return Err(errors::conflict(key));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<()> {
        let result = sqlx::query(r#"DELETE FROM `kv` WHERE `key` = ?;"#)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(translate)?;

        if result.rows_affected() == 0 {
            return Err(errors::not_found(key));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn list(&self, prefix: &str) -> Result<Vec<Versioned>> {
        // a key range instead of LIKE: prefixes contain `_`
        let rows = match prefix_end(prefix) {
            Some(end) => {
                sqlx::query(
                    r#"SELECT `key`,`value`,`revision`
                    FROM `kv`
                    WHERE `key` >= ? AND `key` < ?
                    ORDER BY `key`;"#,
                )
                .bind(prefix)
                .bind(end)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"SELECT `key`,`value`,`revision`
                    FROM `kv`
                    WHERE `key` >= ?
                    ORDER BY `key`;"#,
                )
                .bind(prefix)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(translate)?;

        rows.iter().map(versioned).collect()
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
