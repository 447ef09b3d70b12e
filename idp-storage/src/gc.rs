//! Removal of expired short-lived records.
//!
//! The store never schedules itself; callers pass the instant records are
//! compared against. A failure on one record or one kind is recorded and
//! the sweep moves on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use tracing::{debug, error, info};

use idp_slo::{errors::WithBacktrace, Result};

use crate::{
    authcode::AuthCode,
    authrequest::AuthRequest,
    device::{DeviceRequest, DeviceToken},
    keys::Kind,
    kv::KvStorage,
};

/// A scanned storage key with its expiry, or the reason the record could
/// not be decoded.
pub type Scanned = (String, Result<DateTime<Utc>>);

/// Number of records removed per kind.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GcResult {
    pub auth_requests: u64,
    pub auth_codes: u64,
    pub device_requests: u64,
    pub device_tokens: u64,
}

impl GcResult {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn total(&self) -> u64 {
        self.auth_requests
            + self.auth_codes
            + self.device_requests
            + self.device_tokens
    }

    fn count(&mut self, kind: Kind) {
        match kind {
            Kind::AuthRequest => self.auth_requests += 1,
            Kind::AuthCode => self.auth_codes += 1,
            Kind::DeviceRequest => self.device_requests += 1,
            Kind::DeviceToken => self.device_tokens += 1,
            _ => {}
        }
    }
}

/// One step of a sweep that did not complete.
#[derive(Debug)]
pub struct GcFailure {
    pub kind: Kind,
    /// `None` when listing the whole kind failed.
    pub key: Option<String>,
    pub error: WithBacktrace,
}

#[derive(Debug, thiserror::Error)]
#[error("garbage collection finished with {} failure(s)", .failures.len())]
pub struct GcError {
    /// What was removed before and after the failures.
    pub partial: GcResult,
    pub failures: Vec<GcFailure>,
}

#[automock]
#[async_trait]
pub trait Sweep: Send + Sync {
    /// Every stored record of an expiring kind.
    async fn scan(&self, kind: Kind) -> Result<Vec<Scanned>>;
    async fn remove(&self, kind: Kind, key: &str) -> Result<()>;
}

/// Deletes every record of an expiring kind whose expiry is strictly
/// before `now`.
pub async fn collect<S>(sweep: &S, now: DateTime<Utc>) -> Result<GcResult, GcError>
where
    S: Sweep + ?Sized,
{
    let mut result = GcResult::default();
    let mut failures = Vec::new();

    for kind in Kind::EXPIRING {
        let scanned = match sweep.scan(kind).await {
            Ok(v) => v,
            Err(err) => {
                error!("scan of {} records failed: {}", kind, err);
                failures.push(GcFailure {
                    kind,
                    key: None,
                    error: err,
                });
                continue;
            }
        };
        for (key, expiry) in scanned {
            let expiry = match expiry {
                Ok(v) => v,
                Err(err) => {
                    error!("decoding {} failed: {}", key, err);
                    failures.push(GcFailure {
                        kind,
                        key: Some(key),
                        error: err,
                    });
                    continue;
                }
            };
            if expiry >= now {
                continue;
            }
            match sweep.remove(kind, &key).await {
                Ok(()) => result.count(kind),
                Err(err) if err.is_not_found() => {
                    debug!("{} already gone", key);
                }
                Err(err) => {
                    error!("removing {} failed: {}", key, err);
                    failures.push(GcFailure {
                        kind,
                        key: Some(key),
                        error: err,
                    });
                }
            }
        }
    }

    if !result.is_empty() {
        info!(
            auth_requests = result.auth_requests,
            auth_codes = result.auth_codes,
            device_requests = result.device_requests,
            device_tokens = result.device_tokens,
            "garbage collection removed {} records",
            result.total()
        );
    }
    if failures.is_empty() {
        Ok(result)
    } else {
        Err(GcError {
            partial: result,
            failures,
        })
    }
}

#[async_trait]
impl Sweep for KvStorage {
    async fn scan(&self, kind: Kind) -> Result<Vec<Scanned>> {
        match kind {
            Kind::AuthRequest => self.scan_expiring::<AuthRequest>().await,
            Kind::AuthCode => self.scan_expiring::<AuthCode>().await,
            Kind::DeviceRequest => self.scan_expiring::<DeviceRequest>().await,
            Kind::DeviceToken => self.scan_expiring::<DeviceToken>().await,
            _ => Ok(Vec::new()),
        }
    }

    async fn remove(&self, _kind: Kind, key: &str) -> Result<()> {
        self.delete_record(key).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use idp_slo::errors;
    use mockall::predicate::eq;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn removes_only_strictly_expired() {
        let now = at(1_700_000_000);
        let mut sweep = MockSweep::new();
        sweep.expect_scan().returning(move |kind| match kind {
            Kind::AuthCode => Ok(vec![
                ("auth_code/old".to_owned(), Ok(now - Duration::seconds(1))),
                ("auth_code/edge".to_owned(), Ok(now)),
                ("auth_code/new".to_owned(), Ok(now + Duration::seconds(1))),
            ]),
            _ => Ok(Vec::new()),
        });
        sweep
            .expect_remove()
            .with(eq(Kind::AuthCode), eq("auth_code/old"))
            .times(1)
            .returning(|_, _| Ok(()));

        let result = collect(&sweep, now).await.unwrap();
        assert_eq!(result.auth_codes, 1);
        assert_eq!(result.total(), 1);
    }

    #[tokio::test]
    async fn failing_kind_does_not_stop_others() {
        let now = at(1_700_000_000);
        let mut sweep = MockSweep::new();
        sweep.expect_scan().returning(move |kind| match kind {
            Kind::AuthRequest => Err(errors::anyhow(anyhow::anyhow!("down"))),
            Kind::DeviceToken => Ok(vec![
                ("device_token/a".to_owned(), Ok(at(0))),
                ("device_token/b".to_owned(), Ok(at(0))),
            ]),
            _ => Ok(Vec::new()),
        });
        sweep
            .expect_remove()
            .with(eq(Kind::DeviceToken), eq("device_token/a"))
            .returning(|_, _| Err(errors::anyhow(anyhow::anyhow!("timeout"))));
        sweep
            .expect_remove()
            .with(eq(Kind::DeviceToken), eq("device_token/b"))
            .returning(|_, _| Ok(()));

        let err = collect(&sweep, now).await.unwrap_err();
        assert_eq!(err.partial.device_tokens, 1);
        assert_eq!(err.failures.len(), 2);
        assert_eq!(err.failures[0].kind, Kind::AuthRequest);
        assert_eq!(err.failures[0].key, None);
        assert_eq!(err.failures[1].key.as_deref(), Some("device_token/a"));
    }

    #[tokio::test]
    async fn vanished_record_is_neither_counted_nor_failed() {
        let now = at(1_700_000_000);
        let mut sweep = MockSweep::new();
        sweep.expect_scan().returning(|kind| match kind {
            Kind::DeviceRequest => {
                Ok(vec![("device_req/ABCD-EFGH".to_owned(), Ok(at(0)))])
            }
            _ => Ok(Vec::new()),
        });
        sweep
            .expect_remove()
            .returning(|_, key| Err(errors::not_found(key)));

        let result = collect(&sweep, now).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn undecodable_record_is_a_failure() {
        let now = at(1_700_000_000);
        let mut sweep = MockSweep::new();
        sweep.expect_scan().returning(|kind| match kind {
            Kind::AuthRequest => Ok(vec![(
                "auth_req/x".to_owned(),
                Err(errors::anyhow(anyhow::anyhow!("bad json"))),
            )]),
            _ => Ok(Vec::new()),
        });
        sweep.expect_remove().never();

        let err = collect(&sweep, now).await.unwrap_err();
        assert!(err.partial.is_empty());
        assert_eq!(err.failures[0].key.as_deref(), Some("auth_req/x"));
        assert_eq!(err.to_string(), "garbage collection finished with 1 failure(s)");
    }
}
