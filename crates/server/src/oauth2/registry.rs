//! Database-backed client registry.
//!
//! Authenticates clients presenting credentials at the token, introspection
//! and revocation endpoints.

use crate::entity::oauth2_client;
use crate::error::OAuth2Error;
use crate::oauth2::password::verify_secret;
use axum::http::{HeaderMap, header};
use base64::Engine;
use sea_orm::{DatabaseConnection, DbErr, EntityTrait};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientAuthError {
    #[error("unknown client")]
    NotFound,
    #[error("client is disabled")]
    Disabled,
    #[error("client secret missing or wrong")]
    BadSecret,
    #[error("public clients must not present a secret")]
    UnexpectedSecret,
    #[error("malformed Basic authorization header")]
    MalformedBasic,
    #[error(transparent)]
    Storage(#[from] DbErr),
}

impl From<ClientAuthError> for OAuth2Error {
    fn from(e: ClientAuthError) -> Self {
        match e {
            ClientAuthError::Storage(db) => db.into(),
            other => {
                tracing::debug!(reason = %other, "Client authentication failed");
                OAuth2Error::ClientAuthenticationFailed
            }
        }
    }
}

/// Client credentials as presented on the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: Option<String>,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ClientCredentials {
    /// Extract credentials from HTTP Basic auth, falling back to the form body.
    ///
    /// Basic credentials are form-url-decoded (RFC 6749 2.3.1). A Basic header
    /// that cannot be decoded is an authentication failure, not a fallback.
    pub fn from_request(
        headers: &HeaderMap,
        body_client_id: Option<&str>,
        body_client_secret: Option<&str>,
    ) -> Result<Option<Self>, ClientAuthError> {
        if let Some(encoded) = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Basic "))
        {
            return Self::from_basic(encoded.trim()).map(Some);
        }

        Ok(body_client_id.filter(|id| !id.is_empty()).map(|id| Self {
            client_id: id.to_string(),
            client_secret: body_client_secret
                .filter(|s| !s.is_empty())
                .map(String::from),
        }))
    }

    fn from_basic(encoded: &str) -> Result<Self, ClientAuthError> {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| ClientAuthError::MalformedBasic)?;
        let creds = String::from_utf8(decoded).map_err(|_| ClientAuthError::MalformedBasic)?;
        let (id, secret) = creds
            .split_once(':')
            .ok_or(ClientAuthError::MalformedBasic)?;

        let client_id = form_decode(id)?;
        if client_id.is_empty() {
            return Err(ClientAuthError::MalformedBasic);
        }
        Ok(Self {
            client_id,
            client_secret: Some(form_decode(secret)?),
        })
    }
}

fn form_decode(value: &str) -> Result<String, ClientAuthError> {
    urlencoding::decode(&value.replace('+', " "))
        .map(|v| v.into_owned())
        .map_err(|_| ClientAuthError::MalformedBasic)
}

/// Read-mostly view over registered clients.
#[derive(Clone)]
pub struct ClientRegistry {
    db: Arc<DatabaseConnection>,
}

impl ClientRegistry {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[tracing::instrument(skip(self))]
    pub async fn lookup(&self, client_id: &str) -> Result<oauth2_client::Model, ClientAuthError> {
        oauth2_client::Entity::find_by_id(client_id)
            .one(self.db.as_ref())
            .await?
            .ok_or(ClientAuthError::NotFound)
    }

    /// Authenticate a client.
    ///
    /// The client must be enabled. Confidential clients must present the exact
    /// secret; public clients must not present one and rely on PKCE instead.
    #[tracing::instrument(skip(self, client_secret))]
    pub async fn authenticate(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> Result<oauth2_client::Model, ClientAuthError> {
        let client = self.lookup(client_id).await?;

        if !client.is_enabled {
            return Err(ClientAuthError::Disabled);
        }

        if client.is_public {
            return match client_secret {
                None => Ok(client),
                Some(_) => Err(ClientAuthError::UnexpectedSecret),
            };
        }

        match (&client.secret_hash, client_secret) {
            (Some(stored_hash), Some(provided)) if verify_secret(provided, stored_hash) => {
                Ok(client)
            }
            _ => Err(ClientAuthError::BadSecret),
        }
    }

    pub async fn authenticate_credentials(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<oauth2_client::Model, ClientAuthError> {
        self.authenticate(&credentials.client_id, credentials.client_secret.as_deref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn basic(raw: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Basic {encoded}")).unwrap(),
        );
        headers
    }

    #[test]
    fn basic_auth_wins_over_body() {
        let creds = ClientCredentials::from_request(&basic("svc:s3cret"), Some("other"), None)
            .unwrap()
            .unwrap();
        assert_eq!(creds.client_id, "svc");
        assert_eq!(creds.client_secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn basic_credentials_are_form_decoded() {
        let creds = ClientCredentials::from_request(&basic("my%3Aapp:p%40ss+word%2B1"), None, None)
            .unwrap()
            .unwrap();
        assert_eq!(creds.client_id, "my:app");
        assert_eq!(creds.client_secret.as_deref(), Some("p@ss word+1"));
    }

    #[test]
    fn malformed_basic_does_not_fall_back_to_body() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic !!!notbase64"));
        assert!(matches!(
            ClientCredentials::from_request(&headers, Some("app"), None),
            Err(ClientAuthError::MalformedBasic)
        ));
        assert!(matches!(
            ClientCredentials::from_request(&basic("no-colon"), Some("app"), None),
            Err(ClientAuthError::MalformedBasic)
        ));
        assert!(matches!(
            ClientCredentials::from_request(&basic("app:%FF"), None, None),
            Err(ClientAuthError::MalformedBasic)
        ));
    }

    #[test]
    fn body_credentials() {
        let headers = HeaderMap::new();
        let creds = ClientCredentials::from_request(&headers, Some("app"), Some(""))
            .unwrap()
            .unwrap();
        assert_eq!(creds.client_id, "app");
        assert_eq!(creds.client_secret, None);
        assert!(
            ClientCredentials::from_request(&headers, None, Some("x"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn debug_redacts_secret() {
        let creds = ClientCredentials {
            client_id: "svc".into(),
            client_secret: Some("hunter2".into()),
        };
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}
