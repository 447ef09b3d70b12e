//! Mapping from record kind and natural key to a storage key.
//!
//! Every backend stores records under `prefix + normalized natural key`,
//! so a prefix scan enumerates exactly one kind and raw keys look the
//! same whichever backend is in use.

use std::fmt;

use idp_slo::{errors, Result};

/// Separator of the composite offline session key.
pub const SESSION_SEPARATOR: char = '|';

/// Name of the singleton key material record.
pub const KEYS_NAME: &str = "openid-connect";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Client,
    AuthRequest,
    AuthCode,
    RefreshToken,
    Password,
    OfflineSessions,
    Connector,
    Keys,
    DeviceRequest,
    DeviceToken,
}

impl Kind {
    /// Kinds carrying an absolute expiry, in sweep order.
    pub const EXPIRING: [Kind; 4] = [
        Kind::AuthRequest,
        Kind::AuthCode,
        Kind::DeviceRequest,
        Kind::DeviceToken,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Client => "client/",
            Self::AuthRequest => "auth_req/",
            Self::AuthCode => "auth_code/",
            Self::RefreshToken => "refresh_token/",
            Self::Password => "password/",
            Self::OfflineSessions => "offline_session/",
            Self::Connector => "connector/",
            Self::Keys => "keys/",
            Self::DeviceRequest => "device_req/",
            Self::DeviceToken => "device_token/",
        }
    }

    /// Discriminator written into every encoded record.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::AuthRequest => "auth_request",
            Self::AuthCode => "auth_code",
            Self::RefreshToken => "refresh_token",
            Self::Password => "password",
            Self::OfflineSessions => "offline_sessions",
            Self::Connector => "connector",
            Self::Keys => "keys",
            Self::DeviceRequest => "device_request",
            Self::DeviceToken => "device_token",
        }
    }

    /// Storage key for a kind keyed by an opaque ID, used verbatim.
    pub fn key(&self, id: &str) -> Result<String> {
        if id.is_empty() {
            return Err(errors::bad_request(&format!(
                "empty {} id",
                self.as_str()
            )));
        }
        let mut buf = String::with_capacity(self.prefix().len() + id.len());
        buf.push_str(self.prefix());
        buf.push_str(id);
        Ok(buf)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Passwords are keyed by the case-folded email.
pub fn password_key(email: &str) -> Result<String> {
    Kind::Password.key(&email.to_lowercase())
}

/// Offline sessions are keyed by the case-folded `(user, connector)` pair.
pub fn offline_session_key(user_id: &str, conn_id: &str) -> Result<String> {
    for part in [user_id, conn_id] {
        if part.is_empty() {
            return Err(errors::bad_request(
                "offline session needs both user id and connector id",
            ));
        }
        if part.contains(SESSION_SEPARATOR) {
            return Err(errors::bad_request(&format!(
                "offline session key component {:?} contains {:?}",
                part, SESSION_SEPARATOR
            )));
        }
    }
    let mut buf = user_id.to_lowercase();
    buf.push(SESSION_SEPARATOR);
    buf.push_str(&conn_id.to_lowercase());
    Kind::OfflineSessions.key(&buf)
}

pub fn keys_key() -> String {
    let mut buf = String::from(Kind::Keys.prefix());
    buf.push_str(KEYS_NAME);
    buf
}
