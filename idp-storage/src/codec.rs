//! Translation between domain records and their stored representation.
//!
//! Each kind has a wire struct. Instants are flattened to unix
//! nanoseconds, opaque byte blobs to base64 strings, and every record is
//! wrapped in an envelope tagged with its kind because all kinds share a
//! single physical table in the SQL backend. Absent or `null` lists and
//! maps decode to empty ones.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use jsonwebkey as jwk;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use validator::Validate;

use idp_slo::{errors, Result};

use crate::{
    authcode::AuthCode,
    authrequest::AuthRequest,
    client::Client,
    connector::Connector,
    device::{DeviceRequest, DeviceToken},
    key::{Keys, VerificationKey},
    keys::{self, Kind},
    offlinesession::{OfflineSessions, RefreshTokenRef},
    password::Password,
    refresh_token::RefreshToken,
    Claims, Pkce,
};

/// A record kind the store knows how to key, encode and validate.
pub trait Record: Sized + Clone + Send + Sync + 'static {
    const KIND: Kind;
    type Wire: Serialize + DeserializeOwned;

    fn storage_key(&self) -> Result<String>;
    fn to_wire(&self) -> Result<Self::Wire>;
    fn from_wire(wire: Self::Wire) -> Result<Self>;

    /// Invariants checked before any write.
    fn check(&self) -> Result<()> {
        Ok(())
    }

    /// Invariants between the stored record and its replacement.
    fn check_update(&self, _previous: &Self) -> Result<()> {
        Ok(())
    }
}

/// Records carrying an absolute expiry, swept by the garbage collector.
pub trait Expiring: Record {
    fn expiry(&self) -> DateTime<Utc>;
}

#[derive(Serialize)]
struct EnvelopeRef<'a, W> {
    kind: &'a str,
    #[serde(flatten)]
    record: W,
}

#[derive(Deserialize)]
struct Envelope<W> {
    kind: String,
    #[serde(flatten)]
    record: W,
}

pub fn encode<R: Record>(record: &R) -> Result<Vec<u8>> {
    serde_json::to_vec(&EnvelopeRef {
        kind: R::KIND.as_str(),
        record: record.to_wire()?,
    })
    .map_err(errors::any)
}

pub fn decode<R: Record>(value: &[u8]) -> Result<R> {
    let envelope: Envelope<R::Wire> =
        serde_json::from_slice(value).map_err(errors::any)?;
    if envelope.kind != R::KIND.as_str() {
        return Err(errors::anyhow(anyhow::anyhow!(
            "stored record is a {}, expected {}",
            envelope.kind,
            R::KIND
        )));
    }
    R::from_wire(envelope.record)
}

fn nanos(t: &DateTime<Utc>) -> Result<i64> {
    t.timestamp_nanos_opt().ok_or_else(|| {
        errors::bad_request(&format!("instant {} is out of range", t))
    })
}

fn instant(nanos: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_nanos(nanos)
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S>(
        value: &[u8],
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(value))
    }

    pub(super) fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(v) => STANDARD.decode(v).map_err(de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}

fn check_expiry<R: Expiring>(record: &R) -> Result<()> {
    if record.expiry() == DateTime::<Utc>::default() {
        return Err(errors::bad_request(&format!(
            "{} requires an expiry",
            R::KIND
        )));
    }
    Ok(())
}

fn check_expiry_unchanged<R: Expiring>(record: &R, previous: &R) -> Result<()> {
    if record.expiry() != previous.expiry() {
        return Err(errors::bad_request(&format!(
            "{} expiry cannot be changed",
            R::KIND
        )));
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClientWire {
    id: String,
    secret: String,
    #[serde(default, deserialize_with = "nullable")]
    redirect_uris: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    trusted_peers: Vec<String>,
    #[serde(default)]
    public: bool,
    name: String,
    #[serde(default)]
    logo_url: String,
    #[serde(default)]
    admin: bool,
}

impl Record for Client {
    const KIND: Kind = Kind::Client;
    type Wire = ClientWire;

    fn storage_key(&self) -> Result<String> {
        Kind::Client.key(&self.id)
    }

    fn to_wire(&self) -> Result<ClientWire> {
        Ok(ClientWire {
            id: self.id.clone(),
            secret: self.secret.clone(),
            redirect_uris: self.redirect_uris.clone(),
            trusted_peers: self.trusted_peers.clone(),
            public: self.public,
            name: self.name.clone(),
            logo_url: self.logo_url.clone(),
            admin: self.admin,
        })
    }

    fn from_wire(wire: ClientWire) -> Result<Self> {
        Ok(Self {
            id: wire.id,
            secret: wire.secret,
            redirect_uris: wire.redirect_uris,
            trusted_peers: wire.trusted_peers,
            public: wire.public,
            name: wire.name,
            logo_url: wire.logo_url,
            admin: wire.admin,
        })
    }

    fn check(&self) -> Result<()> {
        self.validate().map_err(errors::validates)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthRequestWire {
    id: String,
    client_id: String,
    #[serde(default, deserialize_with = "nullable")]
    response_types: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    scopes: Vec<String>,
    redirect_uri: String,
    nonce: String,
    state: String,
    #[serde(rename = "force_approval")]
    force_approval_prompt: bool,
    expiry: i64,
    logged_in: bool,
    claims: Claims,
    connector_id: String,
    #[serde(default, with = "b64")]
    connector_data: Vec<u8>,
    #[serde(flatten)]
    pkce: Pkce,
    #[serde(default, with = "b64")]
    hmac_key: Vec<u8>,
}

impl Record for AuthRequest {
    const KIND: Kind = Kind::AuthRequest;
    type Wire = AuthRequestWire;

    fn storage_key(&self) -> Result<String> {
        Kind::AuthRequest.key(&self.id)
    }

    fn to_wire(&self) -> Result<AuthRequestWire> {
        Ok(AuthRequestWire {
            id: self.id.clone(),
            client_id: self.client_id.clone(),
            response_types: self.response_types.clone(),
            scopes: self.scopes.clone(),
            redirect_uri: self.redirect_uri.clone(),
            nonce: self.nonce.clone(),
            state: self.state.clone(),
            force_approval_prompt: self.force_approval_prompt,
            expiry: nanos(&self.expiry)?,
            logged_in: self.logged_in,
            claims: self.claims.clone(),
            connector_id: self.connector_id.clone(),
            connector_data: self.connector_data.clone(),
            pkce: self.pkce.clone(),
            hmac_key: self.hmac_key.clone(),
        })
    }

    fn from_wire(wire: AuthRequestWire) -> Result<Self> {
        Ok(Self {
            id: wire.id,
            client_id: wire.client_id,
            response_types: wire.response_types,
            scopes: wire.scopes,
            redirect_uri: wire.redirect_uri,
            nonce: wire.nonce,
            state: wire.state,
            force_approval_prompt: wire.force_approval_prompt,
            expiry: instant(wire.expiry),
            logged_in: wire.logged_in,
            claims: wire.claims,
            connector_id: wire.connector_id,
            connector_data: wire.connector_data,
            pkce: wire.pkce,
            hmac_key: wire.hmac_key,
        })
    }

    fn check(&self) -> Result<()> {
        check_expiry(self)
    }

    fn check_update(&self, previous: &Self) -> Result<()> {
        check_expiry_unchanged(self, previous)
    }
}

impl Expiring for AuthRequest {
    fn expiry(&self) -> DateTime<Utc> {
        self.expiry
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthCodeWire {
    id: String,
    client_id: String,
    redirect_uri: String,
    nonce: String,
    #[serde(default, deserialize_with = "nullable")]
    scopes: Vec<String>,
    connector_id: String,
    #[serde(default, with = "b64")]
    connector_data: Vec<u8>,
    claims: Claims,
    expiry: i64,
    #[serde(flatten)]
    pkce: Pkce,
}

impl Record for AuthCode {
    const KIND: Kind = Kind::AuthCode;
    type Wire = AuthCodeWire;

    fn storage_key(&self) -> Result<String> {
        Kind::AuthCode.key(&self.id)
    }

    fn to_wire(&self) -> Result<AuthCodeWire> {
        Ok(AuthCodeWire {
            id: self.id.clone(),
            client_id: self.client_id.clone(),
            redirect_uri: self.redirect_uri.clone(),
            nonce: self.nonce.clone(),
            scopes: self.scopes.clone(),
            connector_id: self.connector_id.clone(),
            connector_data: self.connector_data.clone(),
            claims: self.claims.clone(),
            expiry: nanos(&self.expiry)?,
            pkce: self.pkce.clone(),
        })
    }

    fn from_wire(wire: AuthCodeWire) -> Result<Self> {
        Ok(Self {
            id: wire.id,
            client_id: wire.client_id,
            redirect_uri: wire.redirect_uri,
            nonce: wire.nonce,
            scopes: wire.scopes,
            connector_id: wire.connector_id,
            connector_data: wire.connector_data,
            claims: wire.claims,
            expiry: instant(wire.expiry),
            pkce: wire.pkce,
        })
    }

    fn check(&self) -> Result<()> {
        check_expiry(self)
    }

    fn check_update(&self, previous: &Self) -> Result<()> {
        check_expiry_unchanged(self, previous)
    }
}

impl Expiring for AuthCode {
    fn expiry(&self) -> DateTime<Utc> {
        self.expiry
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshTokenWire {
    id: String,
    token: String,
    #[serde(default)]
    obsolete_token: String,
    created_at: i64,
    last_used: i64,
    client_id: String,
    connector_id: String,
    #[serde(default, with = "b64")]
    connector_data: Vec<u8>,
    claims: Claims,
    #[serde(default, deserialize_with = "nullable")]
    scopes: Vec<String>,
    nonce: String,
}

impl Record for RefreshToken {
    const KIND: Kind = Kind::RefreshToken;
    type Wire = RefreshTokenWire;

    fn storage_key(&self) -> Result<String> {
        Kind::RefreshToken.key(&self.id)
    }

    fn to_wire(&self) -> Result<RefreshTokenWire> {
        Ok(RefreshTokenWire {
            id: self.id.clone(),
            token: self.token.clone(),
            obsolete_token: self.obsolete_token.clone(),
            created_at: nanos(&self.created_at)?,
            last_used: nanos(&self.last_used)?,
            client_id: self.client_id.clone(),
            connector_id: self.connector_id.clone(),
            connector_data: self.connector_data.clone(),
            claims: self.claims.clone(),
            scopes: self.scopes.clone(),
            nonce: self.nonce.clone(),
        })
    }

    fn from_wire(wire: RefreshTokenWire) -> Result<Self> {
        Ok(Self {
            id: wire.id,
            token: wire.token,
            obsolete_token: wire.obsolete_token,
            created_at: instant(wire.created_at),
            last_used: instant(wire.last_used),
            client_id: wire.client_id,
            connector_id: wire.connector_id,
            connector_data: wire.connector_data,
            claims: wire.claims,
            scopes: wire.scopes,
            nonce: wire.nonce,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PasswordWire {
    email: String,
    #[serde(with = "b64")]
    hash: Vec<u8>,
    username: String,
    user_id: String,
}

impl Record for Password {
    const KIND: Kind = Kind::Password;
    type Wire = PasswordWire;

    fn storage_key(&self) -> Result<String> {
        keys::password_key(&self.email)
    }

    fn to_wire(&self) -> Result<PasswordWire> {
        Ok(PasswordWire {
            email: self.email.clone(),
            hash: self.hash.clone(),
            username: self.username.clone(),
            user_id: self.user_id.clone(),
        })
    }

    fn from_wire(wire: PasswordWire) -> Result<Self> {
        Ok(Self {
            email: wire.email,
            hash: wire.hash,
            username: wire.username,
            user_id: wire.user_id,
        })
    }

    fn check(&self) -> Result<()> {
        self.validate().map_err(errors::validates)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshTokenRefWire {
    id: String,
    client_id: String,
    created_at: i64,
    last_used: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OfflineSessionsWire {
    user_id: String,
    conn_id: String,
    #[serde(default, deserialize_with = "nullable")]
    refresh: HashMap<String, RefreshTokenRefWire>,
    #[serde(default, with = "b64")]
    connector_data: Vec<u8>,
}

impl Record for OfflineSessions {
    const KIND: Kind = Kind::OfflineSessions;
    type Wire = OfflineSessionsWire;

    fn storage_key(&self) -> Result<String> {
        keys::offline_session_key(&self.user_id, &self.conn_id)
    }

    fn to_wire(&self) -> Result<OfflineSessionsWire> {
        let mut refresh = HashMap::with_capacity(self.refresh.len());
        for (client_id, token) in self.refresh.iter() {
            refresh.insert(
                client_id.clone(),
                RefreshTokenRefWire {
                    id: token.id.clone(),
                    client_id: token.client_id.clone(),
                    created_at: nanos(&token.created_at)?,
                    last_used: nanos(&token.last_used)?,
                },
            );
        }
        Ok(OfflineSessionsWire {
            user_id: self.user_id.clone(),
            conn_id: self.conn_id.clone(),
            refresh,
            connector_data: self.connector_data.clone(),
        })
    }

    fn from_wire(wire: OfflineSessionsWire) -> Result<Self> {
        Ok(Self {
            user_id: wire.user_id,
            conn_id: wire.conn_id,
            refresh: wire
                .refresh
                .into_iter()
                .map(|(client_id, token)| {
                    (
                        client_id,
                        RefreshTokenRef {
                            id: token.id,
                            client_id: token.client_id,
                            created_at: instant(token.created_at),
                            last_used: instant(token.last_used),
                        },
                    )
                })
                .collect(),
            connector_data: wire.connector_data,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectorWire {
    id: String,
    #[serde(rename = "type")]
    connector_type: String,
    name: String,
    #[serde(default)]
    resource_version: String,
    #[serde(default, with = "b64")]
    config: Vec<u8>,
}

impl Record for Connector {
    const KIND: Kind = Kind::Connector;
    type Wire = ConnectorWire;

    fn storage_key(&self) -> Result<String> {
        Kind::Connector.key(&self.id)
    }

    fn to_wire(&self) -> Result<ConnectorWire> {
        Ok(ConnectorWire {
            id: self.id.clone(),
            connector_type: self.connector_type.clone(),
            name: self.name.clone(),
            resource_version: self.resource_version.clone(),
            config: self.config.clone(),
        })
    }

    fn from_wire(wire: ConnectorWire) -> Result<Self> {
        Ok(Self {
            id: wire.id,
            connector_type: wire.connector_type,
            name: wire.name,
            resource_version: wire.resource_version,
            config: wire.config,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerificationKeyWire {
    public_key: jwk::JsonWebKey,
    expiry: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KeysWire {
    #[serde(default)]
    signing_key: Option<jwk::JsonWebKey>,
    #[serde(default)]
    signing_key_pub: Option<jwk::JsonWebKey>,
    #[serde(default, deserialize_with = "nullable")]
    verification_keys: Vec<VerificationKeyWire>,
    next_rotation: i64,
}

impl Record for Keys {
    const KIND: Kind = Kind::Keys;
    type Wire = KeysWire;

    fn storage_key(&self) -> Result<String> {
        Ok(keys::keys_key())
    }

    fn to_wire(&self) -> Result<KeysWire> {
        let mut verification_keys =
            Vec::with_capacity(self.verification_keys.len());
        for vk in self.verification_keys.iter() {
            verification_keys.push(VerificationKeyWire {
                public_key: vk.public_key.clone(),
                expiry: nanos(&vk.expiry)?,
            });
        }
        Ok(KeysWire {
            signing_key: self.signing_key.clone(),
            signing_key_pub: self.signing_key_pub.clone(),
            verification_keys,
            next_rotation: nanos(&self.next_rotation)?,
        })
    }

    fn from_wire(wire: KeysWire) -> Result<Self> {
        Ok(Self {
            signing_key: wire.signing_key,
            signing_key_pub: wire.signing_key_pub,
            verification_keys: wire
                .verification_keys
                .into_iter()
                .map(|vk| VerificationKey {
                    public_key: vk.public_key,
                    expiry: instant(vk.expiry),
                })
                .collect(),
            next_rotation: instant(wire.next_rotation),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceRequestWire {
    user_code: String,
    device_code: String,
    client_id: String,
    #[serde(default)]
    client_secret: String,
    #[serde(default, deserialize_with = "nullable")]
    scopes: Vec<String>,
    expiry: i64,
}

impl Record for DeviceRequest {
    const KIND: Kind = Kind::DeviceRequest;
    type Wire = DeviceRequestWire;

    fn storage_key(&self) -> Result<String> {
        Kind::DeviceRequest.key(&self.user_code)
    }

    fn to_wire(&self) -> Result<DeviceRequestWire> {
        Ok(DeviceRequestWire {
            user_code: self.user_code.clone(),
            device_code: self.device_code.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            scopes: self.scopes.clone(),
            expiry: nanos(&self.expiry)?,
        })
    }

    fn from_wire(wire: DeviceRequestWire) -> Result<Self> {
        Ok(Self {
            user_code: wire.user_code,
            device_code: wire.device_code,
            client_id: wire.client_id,
            client_secret: wire.client_secret,
            scopes: wire.scopes,
            expiry: instant(wire.expiry),
        })
    }

    fn check(&self) -> Result<()> {
        check_expiry(self)
    }

    fn check_update(&self, previous: &Self) -> Result<()> {
        check_expiry_unchanged(self, previous)
    }
}

impl Expiring for DeviceRequest {
    fn expiry(&self) -> DateTime<Utc> {
        self.expiry
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceTokenWire {
    device_code: String,
    status: String,
    #[serde(default)]
    token: String,
    expiry: i64,
    last_request_time: i64,
    #[serde(rename = "poll_interval")]
    poll_interval_seconds: i32,
    #[serde(flatten)]
    pkce: Pkce,
}

impl Record for DeviceToken {
    const KIND: Kind = Kind::DeviceToken;
    type Wire = DeviceTokenWire;

    fn storage_key(&self) -> Result<String> {
        Kind::DeviceToken.key(&self.device_code)
    }

    fn to_wire(&self) -> Result<DeviceTokenWire> {
        Ok(DeviceTokenWire {
            device_code: self.device_code.clone(),
            status: self.status.as_str().to_owned(),
            token: self.token.clone(),
            expiry: nanos(&self.expiry)?,
            last_request_time: nanos(&self.last_request_time)?,
            poll_interval_seconds: self.poll_interval_seconds,
            pkce: self.pkce.clone(),
        })
    }

    fn from_wire(wire: DeviceTokenWire) -> Result<Self> {
        Ok(Self {
            device_code: wire.device_code,
            status: wire.status.parse()?,
            token: wire.token,
            expiry: instant(wire.expiry),
            last_request_time: instant(wire.last_request_time),
            poll_interval_seconds: wire.poll_interval_seconds,
            pkce: wire.pkce,
        })
    }

    fn check(&self) -> Result<()> {
        check_expiry(self)
    }

    fn check_update(&self, previous: &Self) -> Result<()> {
        check_expiry_unchanged(self, previous)?;
        previous.status.check_transition(self.status)
    }
}

impl Expiring for DeviceToken {
    fn expiry(&self) -> DateTime<Utc> {
        self.expiry
    }
}
