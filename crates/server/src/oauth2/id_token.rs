//! ID token assembly and signing.
//!
//! ID tokens are EdDSA (Ed25519) JWTs. The key set is built once at startup and
//! shared read-only; its public halves are published as a JWKS so relying
//! parties can verify signatures out-of-band.

use crate::entity::oauth2_user;
use crate::error::SigningError;
use crate::oauth2::scope::{SCOPE_EMAIL, SCOPE_PROFILE, ScopeSet};
use base64::Engine;
use ed25519_dalek::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Claims gated by granted scopes. Shared by ID tokens and the userinfo response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScopedClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
}

impl ScopedClaims {
    /// `profile` grants name, preferred_username and picture;
    /// `email` grants email and email_verified.
    pub fn for_user(user: &oauth2_user::Model, scopes: &ScopeSet, image_base_url: &str) -> Self {
        let mut claims = ScopedClaims::default();

        if scopes.contains(SCOPE_PROFILE) {
            claims.name = Some(
                user.display_name
                    .clone()
                    .unwrap_or_else(|| user.username.clone()),
            );
            claims.preferred_username = Some(user.username.clone());
            claims.picture = user
                .user_image
                .as_deref()
                .map(|image| format!("{image_base_url}/{image}"));
        }

        if scopes.contains(SCOPE_EMAIL)
            && let Some(email) = &user.email
        {
            claims.email = Some(email.clone());
            claims.email_verified = Some(user.email_verified);
        }

        claims
    }
}

/// OpenID Connect ID token claim set (OIDC Core 2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub auth_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    pub azp: String,
    #[serde(flatten)]
    pub scoped: ScopedClaims,
}

/// Inputs for one ID token, gathered by the grant handler.
#[derive(Debug)]
pub struct IdTokenRequest<'a> {
    pub issuer: &'a str,
    pub client_id: &'a str,
    pub user: &'a oauth2_user::Model,
    pub scopes: &'a ScopeSet,
    pub nonce: Option<&'a str>,
    pub expires_at: OffsetDateTime,
    pub auth_time: OffsetDateTime,
    pub image_base_url: &'a str,
}

impl IdTokenClaims {
    pub fn build(request: &IdTokenRequest<'_>, now: OffsetDateTime) -> Self {
        Self {
            iss: request.issuer.to_string(),
            sub: request.user.id.clone(),
            aud: request.client_id.to_string(),
            exp: request.expires_at.unix_timestamp(),
            iat: now.unix_timestamp(),
            auth_time: request.auth_time.unix_timestamp(),
            nonce: request.nonce.map(String::from),
            azp: request.client_id.to_string(),
            scoped: ScopedClaims::for_user(request.user, request.scopes, request.image_base_url),
        }
    }
}

/// A single public key in JWK form (RFC 8037 OKP key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Jwk {
    pub kty: String,
    pub crv: String,
    /// Base64url-encoded public key
    pub x: String,
    pub kid: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub key_use: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

struct SigningKey {
    kid: String,
    encoding: EncodingKey,
    public: Jwk,
}

impl SigningKey {
    fn from_dalek(key: &ed25519_dalek::SigningKey) -> Result<Self, SigningError> {
        let der = key
            .to_pkcs8_der()
            .map_err(|e| SigningError::InvalidKey(e.to_string()))?;
        let public_bytes = key.verifying_key().to_bytes();
        let kid = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(&Sha256::digest(public_bytes)[..12]);

        Ok(Self {
            public: Jwk {
                kty: "OKP".to_string(),
                crv: "Ed25519".to_string(),
                x: base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(public_bytes),
                kid: kid.clone(),
                alg: "EdDSA".to_string(),
                key_use: "sig".to_string(),
            },
            kid,
            encoding: EncodingKey::from_ed_der(der.as_bytes()),
        })
    }
}

/// Immutable signing key material.
///
/// Exactly one key signs; additional verification-only keys may be published
/// alongside it (e.g. the previous key during a rotation).
pub struct KeySet {
    active: SigningKey,
    retired: Vec<Jwk>,
}

impl std::fmt::Debug for KeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySet")
            .field("active_kid", &self.active.kid)
            .field("retired", &self.retired.len())
            .finish()
    }
}

impl KeySet {
    pub fn from_signing_key(key: &ed25519_dalek::SigningKey) -> Result<Self, SigningError> {
        Ok(Self {
            active: SigningKey::from_dalek(key)?,
            retired: Vec::new(),
        })
    }

    /// Generate an ephemeral key. ID tokens signed with it stop verifying
    /// after a restart.
    pub fn generate() -> Result<Self, SigningError> {
        let mut seed = [0u8; 32];
        getrandom::fill(&mut seed).map_err(|e| SigningError::InvalidKey(e.to_string()))?;
        Self::from_signing_key(&ed25519_dalek::SigningKey::from_bytes(&seed))
    }

    pub fn from_pem(pem: &str) -> Result<Self, SigningError> {
        let key = ed25519_dalek::SigningKey::from_pkcs8_pem(pem)
            .map_err(|e| SigningError::InvalidKey(e.to_string()))?;
        Self::from_signing_key(&key)
    }

    pub fn from_pem_file(path: &Path) -> Result<Self, SigningError> {
        let pem = std::fs::read_to_string(path).map_err(|source| SigningError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_pem(&pem)
    }

    /// Publish an additional verification key.
    pub fn with_verification_key(mut self, jwk: Jwk) -> Self {
        if jwk.kid != self.active.kid && !self.retired.iter().any(|k| k.kid == jwk.kid) {
            self.retired.push(jwk);
        }
        self
    }

    pub fn active_kid(&self) -> &str {
        &self.active.kid
    }

    pub fn jwks(&self) -> Jwks {
        let mut keys = Vec::with_capacity(1 + self.retired.len());
        keys.push(self.active.public.clone());
        keys.extend(self.retired.iter().cloned());
        Jwks { keys }
    }

    pub fn sign(&self, claims: &IdTokenClaims) -> Result<String, SigningError> {
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(self.active.kid.clone());
        Ok(jsonwebtoken::encode(&header, claims, &self.active.encoding)?)
    }
}
