#![allow(dead_code, unreachable_pub)]

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use jsonwebkey as jwk;
use tokio::runtime::Handle;

use idp_slo::errors;
use idp_storage::{
    authcode::{AuthCode, AuthCodeStore},
    authrequest::{AuthRequest, AuthRequestStore},
    client::{Client, ClientStore},
    connector::{Connector, ConnectorStore},
    device::{
        DeviceRequest, DeviceRequestStore, DeviceToken, DeviceTokenStatus,
        DeviceTokenStore,
    },
    ids,
    key::{KeyStore, Keys, VerificationKey},
    offlinesession::{OfflineSessionStore, OfflineSessions, RefreshTokenRef},
    password::{Password, PasswordStore},
    refresh_token::{RefreshToken, RefreshTokenStore},
    Claims, Pkce, Storage,
};

pub fn claims() -> Claims {
    Claims {
        user_id: "1234".to_owned(),
        username: "jane".to_owned(),
        preferred_username: "jane.doe".to_owned(),
        email: "jane.doe@example.com".to_owned(),
        email_verified: true,
        groups: vec!["admins".to_owned(), "developers".to_owned()],
    }
}

pub fn client(id: &str) -> Client {
    Client {
        id: id.to_owned(),
        secret: "s3cr3t".to_owned(),
        redirect_uris: vec!["https://app.example.com/callback".to_owned()],
        trusted_peers: vec!["peer".to_owned()],
        name: "Example".to_owned(),
        logo_url: "https://app.example.com/logo.png".to_owned(),
        ..Default::default()
    }
}

pub fn auth_request(id: &str, expiry: DateTime<Utc>) -> AuthRequest {
    AuthRequest {
        id: id.to_owned(),
        client_id: "web".to_owned(),
        response_types: vec!["code".to_owned()],
        scopes: vec!["openid".to_owned(), "email".to_owned()],
        redirect_uri: "https://app.example.com/callback".to_owned(),
        nonce: "n-0S6_WzA2Mj".to_owned(),
        state: "af0ifjsldkj".to_owned(),
        expiry,
        connector_data: b"{\"upstream\":true}".to_vec(),
        pkce: Pkce {
            code_challenge: "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
                .to_owned(),
            code_challenge_method: "S256".to_owned(),
        },
        hmac_key: ids::new_hmac_key(),
        ..Default::default()
    }
}

pub fn auth_code(id: &str, expiry: DateTime<Utc>) -> AuthCode {
    AuthCode {
        id: id.to_owned(),
        client_id: "web".to_owned(),
        redirect_uri: "https://app.example.com/callback".to_owned(),
        nonce: "nonce".to_owned(),
        scopes: vec!["openid".to_owned()],
        connector_id: "github".to_owned(),
        claims: claims(),
        expiry,
        ..Default::default()
    }
}

pub fn device_request(user_code: &str, expiry: DateTime<Utc>) -> DeviceRequest {
    DeviceRequest {
        user_code: user_code.to_owned(),
        device_code: ids::new_device_code(),
        client_id: "tv".to_owned(),
        scopes: vec!["openid".to_owned()],
        expiry,
        ..Default::default()
    }
}

pub fn device_token(device_code: &str, expiry: DateTime<Utc>) -> DeviceToken {
    DeviceToken {
        device_code: device_code.to_owned(),
        expiry,
        last_request_time: Utc::now(),
        poll_interval_seconds: 5,
        ..Default::default()
    }
}

pub async fn client_crud(storage: &dyn Storage) {
    let id = ids::new_id();
    let created = client(&id);
    storage.create_client(&created).await.unwrap();
    assert_eq!(storage.get_client(&id).await.unwrap(), created);

    let updated = storage
        .update_client(
            &id,
            Box::new(|mut c| {
                c.secret = "rotated".to_owned();
                Ok(c)
            }),
        )
        .await
        .unwrap();
    assert_eq!(updated.secret, "rotated");
    assert_eq!(storage.get_client(&id).await.unwrap(), updated);

    storage.delete_client(&id).await.unwrap();
    assert!(storage.get_client(&id).await.unwrap_err().is_not_found());
    assert!(storage.delete_client(&id).await.unwrap_err().is_not_found());
    assert!(storage
        .update_client(&id, Box::new(|c| Ok(c)))
        .await
        .unwrap_err()
        .is_not_found());
}

pub async fn duplicate_create_keeps_first(storage: &dyn Storage) {
    let id = ids::new_id();
    let first = client(&id);
    storage.create_client(&first).await.unwrap();

    let mut second = client(&id);
    second.secret = "other".to_owned();
    let err = storage.create_client(&second).await.unwrap_err();
    assert!(err.is_already_exists());
    assert_eq!(storage.get_client(&id).await.unwrap(), first);
}

pub async fn trailing_space_is_a_distinct_key(storage: &dyn Storage) {
    let id = ids::new_id();
    let padded = format!("{id} ");
    storage.create_client(&client(&id)).await.unwrap();
    assert!(storage.get_client(&padded).await.unwrap_err().is_not_found());

    let mut other = client(&padded);
    other.secret = "padded".to_owned();
    storage.create_client(&other).await.unwrap();
    assert_eq!(storage.get_client(&padded).await.unwrap(), other);
    assert_eq!(storage.get_client(&id).await.unwrap(), client(&id));

    storage.delete_client(&padded).await.unwrap();
    assert_eq!(storage.get_client(&id).await.unwrap(), client(&id));
}

pub async fn invalid_client_is_rejected(storage: &dyn Storage) {
    let id = ids::new_id();
    let public = Client {
        id: id.clone(),
        public: true,
        redirect_uris: vec!["https://app.example.com/callback".to_owned()],
        name: "CLI".to_owned(),
        ..Default::default()
    };
    let err = storage.create_client(&public).await.unwrap_err();
    assert!(matches!(err.code(), errors::Code::Validates(_)));
    assert!(storage.get_client(&id).await.unwrap_err().is_not_found());
}

pub async fn updater_error_is_returned(storage: &dyn Storage) {
    let id = ids::new_id();
    storage.create_client(&client(&id)).await.unwrap();

    let err = storage
        .update_client(
            &id,
            Box::new(|_| Err(errors::conflict("refresh token was reused"))),
        )
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(storage.get_client(&id).await.unwrap(), client(&id));
}

/// A second writer commits between the first writer's read and its
/// conditional write. Needs a multi-threaded runtime.
pub async fn concurrent_updates_conflict(storage: Arc<dyn Storage>) {
    let id = ids::new_id();
    storage.create_client(&client(&id)).await.unwrap();

    let racer = Arc::clone(&storage);
    let racer_id = id.clone();
    let handle = Handle::current();
    let err = storage
        .update_client(
            &id,
            Box::new(move |mut c| {
                std::thread::spawn(move || {
                    handle.block_on(racer.update_client(
                        &racer_id,
                        Box::new(|mut c| {
                            c.secret = "winner".to_owned();
                            Ok(c)
                        }),
                    ))
                })
                .join()
                .unwrap()
                .unwrap();
                c.secret = "loser".to_owned();
                Ok(c)
            }),
        )
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(storage.get_client(&id).await.unwrap().secret, "winner");
}

/// Many writers race on one record; every attempt either commits or
/// reports a conflict, and the winners' edits are all visible.
pub async fn racing_writers(storage: Arc<dyn Storage>) {
    let id = ids::new_id();
    storage.create_client(&client(&id)).await.unwrap();

    let mut tasks = Vec::new();
    for n in 0..8 {
        let storage = Arc::clone(&storage);
        let id = id.clone();
        tasks.push(tokio::spawn(async move {
            storage
                .update_client(
                    &id,
                    Box::new(move |mut c| {
                        c.trusted_peers.push(format!("peer-{n}"));
                        Ok(c)
                    }),
                )
                .await
        }));
    }

    let mut committed = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => committed += 1,
            Err(err) => assert!(err.is_conflict(), "unexpected {err}"),
        }
    }
    assert!(committed >= 1);
    let got = storage.get_client(&id).await.unwrap();
    assert_eq!(got.trusted_peers.len(), 1 + committed);
}

pub async fn password_email_is_case_insensitive(storage: &dyn Storage) {
    let local = ids::new_id();
    let email = format!("{local}@Example.COM");
    let password = Password {
        email: email.clone(),
        hash: b"$2a$10$33EMT0cVYVlPy6WAMCLsceLYjWhuHpbz5yuZxu/GAFj03J9Lytjuy"
            .to_vec(),
        username: "admin".to_owned(),
        user_id: ids::new_id(),
    };
    storage.create_password(&password).await.unwrap();

    let lower = email.to_lowercase();
    assert_eq!(storage.get_password(&lower).await.unwrap(), password);
    let upper = email.to_uppercase();
    assert_eq!(storage.get_password(&upper).await.unwrap(), password);

    let mut again = password.clone();
    again.email = lower.clone();
    assert!(storage
        .create_password(&again)
        .await
        .unwrap_err()
        .is_already_exists());

    assert!(storage
        .list_passwords()
        .await
        .unwrap()
        .iter()
        .any(|p| p.email == email));
    storage.delete_password(&upper).await.unwrap();
    assert!(storage.get_password(&lower).await.unwrap_err().is_not_found());
}

pub async fn offline_sessions_never_nil(storage: &dyn Storage) {
    let user = ids::new_id();
    let session = OfflineSessions {
        user_id: user.clone(),
        conn_id: "GitHub".to_owned(),
        ..Default::default()
    };
    storage.create_offline_sessions(&session).await.unwrap();

    let got = storage
        .get_offline_sessions(&user.to_uppercase(), "github")
        .await
        .unwrap();
    assert!(got.refresh.is_empty());
    assert_eq!(got, session);

    let now = Utc::now();
    let updated = storage
        .update_offline_sessions(
            &user,
            "GitHub",
            Box::new(move |mut s| {
                s.refresh.insert(
                    "web".to_owned(),
                    RefreshTokenRef {
                        id: "rt-1".to_owned(),
                        client_id: "web".to_owned(),
                        created_at: now,
                        last_used: now,
                    },
                );
                Ok(s)
            }),
        )
        .await
        .unwrap();
    let mut expected = HashMap::new();
    expected.insert("web".to_owned(), updated.refresh["web"].clone());
    assert_eq!(
        storage
            .get_offline_sessions(&user, "GitHub")
            .await
            .unwrap()
            .refresh,
        expected
    );

    let err = storage
        .get_offline_sessions("a|b", "github")
        .await
        .unwrap_err();
    assert!(matches!(err.code(), errors::Code::BadRequest(_)));
    storage
        .delete_offline_sessions(&user, "github")
        .await
        .unwrap();
}

pub async fn refresh_token_lifecycle(storage: &dyn Storage) {
    let id = ids::new_id();
    let created_at = Utc::now();
    let token = RefreshToken {
        id: id.clone(),
        token: "bar".to_owned(),
        created_at,
        last_used: created_at,
        client_id: "web".to_owned(),
        connector_id: "github".to_owned(),
        connector_data: b"opaque".to_vec(),
        claims: claims(),
        scopes: vec!["openid".to_owned(), "offline_access".to_owned()],
        nonce: "nonce".to_owned(),
        ..Default::default()
    };
    storage.create_refresh_token(&token).await.unwrap();
    assert_eq!(storage.get_refresh_token(&id).await.unwrap(), token);

    let used = created_at + Duration::seconds(30);
    let rotated = storage
        .update_refresh_token(
            &id,
            Box::new(move |mut t| {
                t.obsolete_token = std::mem::replace(&mut t.token, "baz".to_owned());
                t.last_used = used;
                Ok(t)
            }),
        )
        .await
        .unwrap();
    assert_eq!(rotated.obsolete_token, "bar");
    assert_eq!(rotated.token, "baz");
    assert!(storage
        .list_refresh_tokens()
        .await
        .unwrap()
        .contains(&rotated));
    storage.delete_refresh_token(&id).await.unwrap();
}

pub async fn connector_lifecycle(storage: &dyn Storage) {
    let id = ids::new_id();
    let connector = Connector {
        id: id.clone(),
        connector_type: "github".to_owned(),
        name: "GitHub".to_owned(),
        resource_version: "1".to_owned(),
        config: br#"{"clientID":"abc"}"#.to_vec(),
    };
    storage.create_connector(&connector).await.unwrap();
    assert_eq!(storage.get_connector(&id).await.unwrap(), connector);
    let updated = storage
        .update_connector(
            &id,
            Box::new(|mut c| {
                c.resource_version = "2".to_owned();
                Ok(c)
            }),
        )
        .await
        .unwrap();
    assert_eq!(updated.resource_version, "2");
    assert_eq!(storage.get_connector(&id).await.unwrap(), updated);
    let listed = storage.list_connectors().await.unwrap();
    assert_eq!(listed.iter().find(|c| c.id == id), Some(&updated));
    storage.delete_connector(&id).await.unwrap();
}

pub async fn expiry_is_immutable(storage: &dyn Storage) {
    let id = ids::new_id();
    let expiry = Utc::now() + Duration::minutes(10);
    let request = auth_request(&id, expiry);
    storage.create_auth_request(&request).await.unwrap();
    assert_eq!(storage.get_auth_request(&id).await.unwrap(), request);

    let err = storage
        .update_auth_request(
            &id,
            Box::new(|mut r| {
                r.expiry = r.expiry + Duration::hours(1);
                Ok(r)
            }),
        )
        .await
        .unwrap_err();
    assert!(matches!(err.code(), errors::Code::BadRequest(_)));

    let logged_in = storage
        .update_auth_request(
            &id,
            Box::new(|mut r| {
                r.logged_in = true;
                r.claims = claims();
                r.connector_id = "github".to_owned();
                Ok(r)
            }),
        )
        .await
        .unwrap();
    assert!(logged_in.logged_in);
    assert_eq!(logged_in.expiry, expiry);

    let unset = auth_request(&ids::new_id(), DateTime::<Utc>::default());
    assert!(storage.create_auth_request(&unset).await.is_err());
}

pub async fn device_token_status_is_final(storage: &dyn Storage) {
    let code = ids::new_device_code();
    let expiry = Utc::now() + Duration::minutes(5);
    storage
        .create_device_token(&device_token(&code, expiry))
        .await
        .unwrap();

    let done = storage
        .update_device_token(
            &code,
            Box::new(|mut t| {
                t.status = DeviceTokenStatus::Complete;
                t.token = "{\"access_token\":\"x\"}".to_owned();
                Ok(t)
            }),
        )
        .await
        .unwrap();
    assert_eq!(done.status, DeviceTokenStatus::Complete);

    let err = storage
        .update_device_token(
            &code,
            Box::new(|mut t| {
                t.status = DeviceTokenStatus::Pending;
                Ok(t)
            }),
        )
        .await
        .unwrap_err();
    assert!(matches!(err.code(), errors::Code::BadRequest(_)));
    assert_eq!(storage.get_device_token(&code).await.unwrap(), done);
}

pub async fn keys_singleton(storage: &dyn Storage) {
    let rotation = Utc::now() + Duration::hours(6);
    let keys = storage
        .update_keys(Box::new(move |mut k| {
            k.next_rotation = rotation;
            Ok(k)
        }))
        .await
        .unwrap();
    assert_eq!(storage.get_keys().await.unwrap(), keys);

    let later = rotation + Duration::hours(6);
    let keys = storage
        .update_keys(Box::new(move |mut k| {
            k.next_rotation = later;
            Ok(k)
        }))
        .await
        .unwrap();
    assert_eq!(keys.next_rotation, later);
}

pub async fn auth_code_round_trip(storage: &dyn Storage) {
    let id = ids::new_id();
    let mut code = auth_code(&id, Utc::now() + Duration::minutes(1));
    code.connector_data = b"{\"groups\":[]}".to_vec();
    code.pkce = Pkce {
        code_challenge: "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".to_owned(),
        code_challenge_method: "S256".to_owned(),
    };
    storage.create_auth_code(&code).await.unwrap();
    assert_eq!(storage.get_auth_code(&id).await.unwrap(), code);

    storage.delete_auth_code(&id).await.unwrap();
    assert!(storage.get_auth_code(&id).await.unwrap_err().is_not_found());
}

pub async fn device_request_round_trip(storage: &dyn Storage) {
    let user_code = ids::new_user_code();
    let mut request = device_request(&user_code, Utc::now() + Duration::minutes(5));
    request.client_secret = "tv-secret".to_owned();
    request.scopes.push("offline_access".to_owned());
    storage.create_device_request(&request).await.unwrap();
    assert_eq!(storage.get_device_request(&user_code).await.unwrap(), request);

    assert!(storage
        .create_device_request(&request)
        .await
        .unwrap_err()
        .is_already_exists());
}

/// A P-256 signing key with its public half, as a rotation would
/// produce.
pub fn signing_key() -> (jwk::JsonWebKey, jwk::JsonWebKey) {
    let mut private = jwk::JsonWebKey::new(jwk::Key::generate_p256());
    private.set_algorithm(jwk::Algorithm::ES256).unwrap();
    private.key_use = Some(jwk::KeyUse::Signing);
    private.key_id = Some(ids::new_id());

    let mut public = private.clone();
    public.key = Box::new(private.key.to_public().unwrap().into_owned());
    (private, public)
}

pub async fn keys_with_signing_key(storage: &dyn Storage) {
    let (private, public) = signing_key();
    let (_, retired) = signing_key();
    let now = Utc::now();
    let keys = Keys {
        signing_key: Some(private),
        signing_key_pub: Some(public),
        verification_keys: vec![VerificationKey {
            public_key: retired,
            expiry: now + Duration::hours(1),
        }],
        next_rotation: now + Duration::hours(6),
    };

    let stored = keys.clone();
    let updated = storage
        .update_keys(Box::new(move |_| Ok(stored)))
        .await
        .unwrap();
    assert_eq!(updated, keys);
    let got = storage.get_keys().await.unwrap();
    assert_eq!(got, keys);
    assert!(got.signing_key.unwrap().key.is_private());
    assert!(!got.signing_key_pub.unwrap().key.is_private());
}

/// Stores `expired` records of every expiring kind that expire before
/// `now` plus one live record per kind, then sweeps twice.
pub async fn garbage_collect_removes_expired(storage: &dyn Storage) {
    let now = Utc::now();
    let past = now - Duration::hours(1);
    let future = now + Duration::hours(1);

    let expired = 2;
    let mut live = Vec::new();
    for i in 0..=expired {
        let expiry = if i < expired { past } else { future };
        let suffix = ids::new_id();
        storage
            .create_auth_request(&auth_request(&suffix, expiry))
            .await
            .unwrap();
        storage
            .create_auth_code(&auth_code(&suffix, expiry))
            .await
            .unwrap();
        let user_code = ids::new_user_code();
        storage
            .create_device_request(&device_request(&user_code, expiry))
            .await
            .unwrap();
        storage
            .create_device_token(&device_token(&suffix, expiry))
            .await
            .unwrap();
        if i == expired {
            live.push((suffix, user_code));
        }
    }

    let result = storage.garbage_collect(now).await.unwrap();
    assert_eq!(result.auth_requests, expired);
    assert_eq!(result.auth_codes, expired);
    assert_eq!(result.device_requests, expired);
    assert_eq!(result.device_tokens, expired);

    let again = storage.garbage_collect(now).await.unwrap();
    assert!(again.is_empty());

    let (suffix, user_code) = &live[0];
    storage.get_auth_request(suffix).await.unwrap();
    storage.get_auth_code(suffix).await.unwrap();
    storage.get_device_request(user_code).await.unwrap();
    storage.get_device_token(suffix).await.unwrap();
}
