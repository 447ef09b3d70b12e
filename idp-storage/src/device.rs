use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;

use idp_slo::{errors, Result};

use crate::{keys::Kind, kv::KvStorage, Pkce, Updater};

/// Pending device authorization, looked up by the code the user types.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeviceRequest {
    pub user_code: String,
    pub device_code: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    pub expiry: DateTime<Utc>,
}

/// Polling state of a device, looked up by the device code.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeviceToken {
    pub device_code: String,
    pub status: DeviceTokenStatus,
    /// Token response handed out once `status` is complete.
    pub token: String,
    pub expiry: DateTime<Utc>,
    pub last_request_time: DateTime<Utc>,
    pub poll_interval_seconds: i32,
    pub pkce: Pkce,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DeviceTokenStatus {
    #[default]
    Pending,
    Complete,
    Denied,
    Expired,
}

impl DeviceTokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Denied => "denied",
            Self::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Pending may move anywhere, terminal states are final.
    pub fn check_transition(&self, next: Self) -> Result<()> {
        if self.is_terminal() && *self != next {
            return Err(errors::bad_request(&format!(
                "device token status cannot change from {} to {}",
                self, next
            )));
        }
        Ok(())
    }
}

impl fmt::Display for DeviceTokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeviceTokenStatus {
    type Err = errors::WithBacktrace;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "complete" => Ok(Self::Complete),
            "denied" => Ok(Self::Denied),
            "expired" => Ok(Self::Expired),
            _ => Err(errors::anyhow(anyhow::anyhow!(
                "unknown device token status {s:?}"
            ))),
        }
    }
}

#[automock]
#[async_trait]
pub trait DeviceRequestStore: Send + Sync {
    async fn create_device_request(&self, request: &DeviceRequest) -> Result<()>;
    async fn get_device_request(&self, user_code: &str) -> Result<DeviceRequest>;
    async fn update_device_request(
        &self,
        user_code: &str,
        updater: Updater<DeviceRequest>,
    ) -> Result<DeviceRequest>;
    async fn delete_device_request(&self, user_code: &str) -> Result<()>;
}

#[automock]
#[async_trait]
pub trait DeviceTokenStore: Send + Sync {
    async fn create_device_token(&self, token: &DeviceToken) -> Result<()>;
    async fn get_device_token(&self, device_code: &str) -> Result<DeviceToken>;
    /// Fails with `BadRequest` if the token already reached a terminal
    /// status and the update would change it.
    async fn update_device_token(
        &self,
        device_code: &str,
        updater: Updater<DeviceToken>,
    ) -> Result<DeviceToken>;
    async fn delete_device_token(&self, device_code: &str) -> Result<()>;
}

#[async_trait]
impl DeviceRequestStore for KvStorage {
    #[tracing::instrument(skip_all)]
    async fn create_device_request(&self, request: &DeviceRequest) -> Result<()> {
        self.create_record(request).await
    }

    #[tracing::instrument(skip(self))]
    async fn get_device_request(&self, user_code: &str) -> Result<DeviceRequest> {
        self.get_record(&Kind::DeviceRequest.key(user_code)?).await
    }

    #[tracing::instrument(skip(self, updater))]
    async fn update_device_request(
        &self,
        user_code: &str,
        updater: Updater<DeviceRequest>,
    ) -> Result<DeviceRequest> {
        self.update_record(&Kind::DeviceRequest.key(user_code)?, updater)
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_device_request(&self, user_code: &str) -> Result<()> {
        self.delete_record(&Kind::DeviceRequest.key(user_code)?).await
    }
}

#[async_trait]
impl DeviceTokenStore for KvStorage {
    #[tracing::instrument(skip_all)]
    async fn create_device_token(&self, token: &DeviceToken) -> Result<()> {
        self.create_record(token).await
    }

    #[tracing::instrument(skip(self))]
    async fn get_device_token(&self, device_code: &str) -> Result<DeviceToken> {
        self.get_record(&Kind::DeviceToken.key(device_code)?).await
    }

    #[tracing::instrument(skip(self, updater))]
    async fn update_device_token(
        &self,
        device_code: &str,
        updater: Updater<DeviceToken>,
    ) -> Result<DeviceToken> {
        self.update_record(&Kind::DeviceToken.key(device_code)?, updater)
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_device_token(&self, device_code: &str) -> Result<()> {
        self.delete_record(&Kind::DeviceToken.key(device_code)?).await
    }
}
