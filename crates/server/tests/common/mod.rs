//! Shared fixtures: an in-memory provider with a few registered clients.

#![allow(dead_code)]

use identity_provider::config::OAuth2Config;
use identity_provider::entity::{oauth2_client, oauth2_user};
use identity_provider::oauth2::password::hash_secret;
use identity_provider::oauth2::pkce::PkceMethod;
use identity_provider::oauth2::{KeySet, NewAuthorizationCode, OAuth2State, ScopeSet};
use identity_provider::storage;
use sea_orm::{ActiveModelTrait, ActiveValue::Set};
use std::sync::Arc;
use time::OffsetDateTime;

pub const ISSUER: &str = "https://idp.example.org";
pub const REDIRECT_URI: &str = "https://app/cb";

pub const PUBLIC_CLIENT: &str = "spa";
pub const CONFIDENTIAL_CLIENT: &str = "backend";
pub const CONFIDENTIAL_SECRET: &str = "s3cret-value";
pub const OTHER_CLIENT: &str = "other";
pub const OTHER_SECRET: &str = "other-secret";
pub const DISABLED_CLIENT: &str = "disabled";

pub const USER_ID: &str = "user-1";

async fn insert_client(
    state: &OAuth2State,
    id: &str,
    secret: Option<&str>,
    grant_types: &str,
    scopes: &str,
    is_enabled: bool,
) {
    let now = OffsetDateTime::now_utc();
    oauth2_client::ActiveModel {
        id: Set(id.to_string()),
        secret_hash: Set(secret.map(|s| hash_secret(s).expect("hash"))),
        name: Set(format!("{id} client")),
        grant_types: Set(grant_types.to_string()),
        scopes: Set(scopes.to_string()),
        is_public: Set(secret.is_none()),
        is_enabled: Set(is_enabled),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(state.db.as_ref())
    .await
    .expect("insert client");
}

/// Build a provider over a fresh in-memory database with seeded clients and a user.
pub async fn test_state() -> OAuth2State {
    let db = storage::connect("sqlite::memory:").await.expect("connect");
    storage::ensure_schema(&db).await.expect("schema");

    let keys = KeySet::generate().expect("signing key");
    let state = OAuth2State::new(Arc::new(db), OAuth2Config::new(ISSUER), keys);

    insert_client(
        &state,
        PUBLIC_CLIENT,
        None,
        "authorization_code refresh_token",
        "openid profile email",
        true,
    )
    .await;
    insert_client(
        &state,
        CONFIDENTIAL_CLIENT,
        Some(CONFIDENTIAL_SECRET),
        "authorization_code refresh_token client_credentials",
        "openid profile email api:read",
        true,
    )
    .await;
    insert_client(
        &state,
        OTHER_CLIENT,
        Some(OTHER_SECRET),
        "authorization_code refresh_token client_credentials",
        "openid profile api:read",
        true,
    )
    .await;
    insert_client(
        &state,
        DISABLED_CLIENT,
        Some("whatever"),
        "authorization_code client_credentials",
        "openid",
        false,
    )
    .await;

    oauth2_user::ActiveModel {
        id: Set(USER_ID.to_string()),
        username: Set("alice".to_string()),
        display_name: Set(Some("Alice Example".to_string())),
        email: Set(Some("alice@example.org".to_string())),
        email_verified: Set(true),
        user_image: Set(Some("alice.png".to_string())),
        is_service_account: Set(false),
        created_at: Set(OffsetDateTime::now_utc()),
    }
    .insert(state.db.as_ref())
    .await
    .expect("insert user");

    state
}

/// Issue a code for `client_id` as the authorize step would.
pub async fn issue_code(
    state: &OAuth2State,
    client_id: &str,
    scope: &str,
    challenge: Option<(String, PkceMethod)>,
    nonce: Option<&str>,
) -> String {
    state
        .codes
        .issue(NewAuthorizationCode {
            client_id: client_id.to_string(),
            user_id: USER_ID.to_string(),
            redirect_uri: REDIRECT_URI.to_string(),
            scopes: ScopeSet::parse(scope),
            nonce: nonce.map(str::to_string),
            code_challenge: challenge,
            auth_time: OffsetDateTime::now_utc(),
        })
        .await
        .expect("issue code")
        .code
}
