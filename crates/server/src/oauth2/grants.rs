//! Token endpoint grant dispatch.
//!
//! A token request is authenticated against the client registry, parsed into
//! one of the closed set of supported grants and handed to that grant's
//! handler. Every successful path ends in a ledger mutation.

use crate::entity::{oauth2_client, oauth2_token};
use crate::error::OAuth2Error;
use crate::oauth2::id_token::{IdTokenClaims, IdTokenRequest};
use crate::oauth2::pkce::{self, PkceMethod};
use crate::oauth2::registry::ClientCredentials;
use crate::oauth2::scope::{SCOPE_OPENID, ScopeSet};
use crate::oauth2::state::OAuth2State;
use crate::oauth2::tokens::NewToken;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Token endpoint form body.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TokenRequest {
    #[serde(default)]
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub code_verifier: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    pub scope: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
    ClientCredentials,
}

impl GrantType {
    pub const ALL: [GrantType; 3] = [
        GrantType::AuthorizationCode,
        GrantType::RefreshToken,
        GrantType::ClientCredentials,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::RefreshToken => "refresh_token",
            GrantType::ClientCredentials => "client_credentials",
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantType {
    type Err = OAuth2Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GrantType::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or(OAuth2Error::UnsupportedGrantType)
    }
}

/// A token request with its grant-specific parameters validated for presence.
#[derive(Debug)]
pub enum Grant {
    AuthorizationCode {
        code: String,
        redirect_uri: String,
        code_verifier: Option<String>,
    },
    RefreshToken {
        refresh_token: String,
        scope: Option<ScopeSet>,
    },
    ClientCredentials {
        scope: Option<ScopeSet>,
    },
}

fn required(value: Option<String>, name: &'static str) -> Result<String, OAuth2Error> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(OAuth2Error::MissingRequiredParameter(name))
}

impl Grant {
    pub fn grant_type(&self) -> GrantType {
        match self {
            Grant::AuthorizationCode { .. } => GrantType::AuthorizationCode,
            Grant::RefreshToken { .. } => GrantType::RefreshToken,
            Grant::ClientCredentials { .. } => GrantType::ClientCredentials,
        }
    }

    pub fn from_request(request: TokenRequest) -> Result<Self, OAuth2Error> {
        let scope = request
            .scope
            .as_deref()
            .map(ScopeSet::parse)
            .filter(|s| !s.is_empty());

        if request.grant_type.is_empty() {
            return Err(OAuth2Error::MissingRequiredParameter("grant_type"));
        }

        match request.grant_type.parse::<GrantType>()? {
            GrantType::AuthorizationCode => Ok(Grant::AuthorizationCode {
                code: required(request.code, "code")?,
                redirect_uri: required(request.redirect_uri, "redirect_uri")?,
                code_verifier: request.code_verifier.filter(|v| !v.is_empty()),
            }),
            GrantType::RefreshToken => Ok(Grant::RefreshToken {
                refresh_token: required(request.refresh_token, "refresh_token")?,
                scope,
            }),
            GrantType::ClientCredentials => Ok(Grant::ClientCredentials { scope }),
        }
    }
}

/// Checks the PKCE binding of a claimed code.
///
/// A challenged code needs a matching verifier; an unchallenged code is only
/// acceptable from a confidential client and must not see a verifier.
fn check_pkce(
    challenge: Option<(&str, &str)>,
    verifier: Option<&str>,
    client: &oauth2_client::Model,
) -> Result<(), OAuth2Error> {
    match (challenge, verifier) {
        (Some(_), None) => Err(OAuth2Error::MissingRequiredParameter("code_verifier")),
        (Some((challenge, method)), Some(verifier)) => {
            let method: PkceMethod = method
                .parse()
                .map_err(|_| OAuth2Error::PkceVerificationFailed)?;
            if pkce::verify(verifier, challenge, method) {
                Ok(())
            } else {
                Err(OAuth2Error::PkceVerificationFailed)
            }
        }
        (None, _) if client.is_public => Err(OAuth2Error::PkceRequired),
        (None, Some(_)) => Err(OAuth2Error::PkceVerificationFailed),
        (None, None) => Ok(()),
    }
}

impl OAuth2State {
    /// Run a token request end to end.
    #[tracing::instrument(skip_all, fields(client_id = %credentials.client_id, grant_type = %request.grant_type))]
    pub async fn exchange(
        &self,
        credentials: &ClientCredentials,
        request: TokenRequest,
    ) -> Result<TokenResponse, OAuth2Error> {
        let client = self.clients.authenticate_credentials(credentials).await?;
        let grant = Grant::from_request(request)?;

        if !client.is_grant_type_allowed(grant.grant_type().as_str()) {
            tracing::debug!("Grant type not registered for client");
            return Err(OAuth2Error::UnauthorizedClient);
        }

        let response = match grant {
            Grant::AuthorizationCode {
                code,
                redirect_uri,
                code_verifier,
            } => {
                self.authorization_code_grant(&client, &code, &redirect_uri, code_verifier.as_deref())
                    .await
            }
            Grant::RefreshToken {
                refresh_token,
                scope,
            } => self.refresh_token_grant(&client, &refresh_token, scope).await,
            Grant::ClientCredentials { scope } => {
                self.client_credentials_grant(&client, scope).await
            }
        };

        match &response {
            Ok(_) => tracing::info!("Token issued"),
            Err(e) => tracing::info!(error = e.error_code(), reason = %e, "Token request rejected"),
        }
        response
    }

    async fn authorization_code_grant(
        &self,
        client: &oauth2_client::Model,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenResponse, OAuth2Error> {
        let claimed = self.codes.claim(code).await?;

        if claimed.client_id != client.id {
            return Err(OAuth2Error::CodeClientMismatch);
        }
        if claimed.redirect_uri.as_bytes() != redirect_uri.as_bytes() {
            return Err(OAuth2Error::RedirectUriMismatch);
        }
        check_pkce(claimed.pkce_challenge(), code_verifier, client)?;

        let scopes = claimed.scopes();
        if !scopes.is_subset(&client.allowed_scopes()) {
            return Err(OAuth2Error::ScopeNotAllowed);
        }

        let token = self
            .tokens
            .issue(NewToken {
                client_id: &client.id,
                user_id: &claimed.user_id,
                scopes: &scopes,
                auth_time: Some(claimed.auth_time),
                with_refresh: true,
            })
            .await?;

        let id_token = if scopes.contains(SCOPE_OPENID) {
            Some(
                self.sign_id_token(&token, &scopes, claimed.nonce.as_deref(), claimed.auth_time)
                    .await?,
            )
        } else {
            None
        };

        Ok(self.token_response(token, id_token))
    }

    async fn refresh_token_grant(
        &self,
        client: &oauth2_client::Model,
        refresh_token: &str,
        requested: Option<ScopeSet>,
    ) -> Result<TokenResponse, OAuth2Error> {
        let existing = self
            .tokens
            .lookup_by_refresh_token(refresh_token)
            .await?
            .ok_or(OAuth2Error::TokenNotFoundOrExpiredOrRevoked)?;

        if existing.client_id != client.id
            || !existing.is_refreshable_at(OffsetDateTime::now_utc())
        {
            return Err(OAuth2Error::TokenNotFoundOrExpiredOrRevoked);
        }

        let original = existing.scopes();
        let scopes = match requested {
            Some(narrowed) if narrowed.is_subset(&original) => narrowed,
            Some(_) => return Err(OAuth2Error::ScopeNotAllowed),
            None => original.clone(),
        };
        if !scopes.is_subset(&client.allowed_scopes()) {
            return Err(OAuth2Error::ScopeNotAllowed);
        }

        let rotated = self.tokens.rotate(&existing, &scopes).await?;

        let id_token = if original.contains(SCOPE_OPENID) {
            let auth_time = rotated.auth_time.unwrap_or(rotated.created_at);
            Some(self.sign_id_token(&rotated, &scopes, None, auth_time).await?)
        } else {
            None
        };

        Ok(self.token_response(rotated, id_token))
    }

    async fn client_credentials_grant(
        &self,
        client: &oauth2_client::Model,
        requested: Option<ScopeSet>,
    ) -> Result<TokenResponse, OAuth2Error> {
        if !client.is_confidential() {
            return Err(OAuth2Error::UnauthorizedClient);
        }

        let allowed = client.allowed_scopes();
        let scopes = requested.unwrap_or_else(|| allowed.clone());
        // All or nothing: one unauthorized scope rejects the whole request.
        if !scopes.is_subset(&allowed) {
            return Err(OAuth2Error::ScopeNotAllowed);
        }

        let principal = self.service_principal(&client.id).await?;
        let token = self
            .tokens
            .issue(NewToken {
                client_id: &client.id,
                user_id: &principal.id,
                scopes: &scopes,
                auth_time: None,
                with_refresh: false,
            })
            .await?;

        Ok(self.token_response(token, None))
    }

    async fn sign_id_token(
        &self,
        token: &oauth2_token::Model,
        scopes: &ScopeSet,
        nonce: Option<&str>,
        auth_time: OffsetDateTime,
    ) -> Result<String, OAuth2Error> {
        let user = self.find_user(&token.user_id).await?.ok_or_else(|| {
            tracing::error!(user_id = %token.user_id, "Token subject has no user record");
            OAuth2Error::ServerError
        })?;

        let image_base_url = self.config.image_base_url();
        let claims = IdTokenClaims::build(
            &IdTokenRequest {
                issuer: self.config.issuer(),
                client_id: &token.client_id,
                user: &user,
                scopes,
                nonce,
                expires_at: token.access_token_expires_at,
                auth_time,
                image_base_url: &image_base_url,
            },
            OffsetDateTime::now_utc(),
        );

        Ok(self.keys.sign(&claims)?)
    }

    fn token_response(&self, token: oauth2_token::Model, id_token: Option<String>) -> TokenResponse {
        let expires_in = (token.access_token_expires_at - OffsetDateTime::now_utc())
            .whole_seconds()
            .clamp(0, self.tokens.access_token_lifetime());
        TokenResponse {
            access_token: token.access_token,
            token_type: token.token_type,
            expires_in,
            refresh_token: token.refresh_token,
            id_token,
            scope: token.scope,
        }
    }
}
