//! Token introspection (RFC 7662) and revocation (RFC 7009).
//!
//! Neither operation reveals whether a token string ever existed: unknown,
//! expired and revoked tokens all introspect as `{"active": false}`, and
//! revocation succeeds for all of them.

use crate::entity::{oauth2_client, oauth2_token};
use crate::oauth2::state::OAuth2State;
use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct IntrospectionRequest {
    #[serde(default)]
    pub token: String,
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl IntrospectionResponse {
    pub fn inactive() -> Self {
        Self::default()
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RevokeRequest {
    #[serde(default)]
    pub token: String,
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Access,
    Refresh,
}

impl OAuth2State {
    /// Resolve `token` as an access or refresh token, trying the hinted kind first.
    ///
    /// Unknown hints are ignored (RFC 7662 2.1).
    async fn find_token(
        &self,
        token: &str,
        hint: Option<&str>,
    ) -> Result<Option<(oauth2_token::Model, TokenKind)>, DbErr> {
        let order = match hint {
            Some("refresh_token") => [TokenKind::Refresh, TokenKind::Access],
            _ => [TokenKind::Access, TokenKind::Refresh],
        };

        for kind in order {
            let found = match kind {
                TokenKind::Access => self.tokens.lookup_by_access_token(token).await?,
                TokenKind::Refresh => self.tokens.lookup_by_refresh_token(token).await?,
            };
            if let Some(t) = found {
                return Ok(Some((t, kind)));
            }
        }
        Ok(None)
    }

    #[tracing::instrument(skip(self, token))]
    pub async fn introspect(&self, token: &str, hint: Option<&str>) -> IntrospectionResponse {
        let found = match self.find_token(token, hint).await {
            Ok(found) => found,
            Err(e) => {
                tracing::error!(error = %e, "Database error during introspection");
                return IntrospectionResponse::inactive();
            }
        };

        let now = OffsetDateTime::now_utc();
        let (record, kind) = match found {
            Some((t, TokenKind::Access)) if t.is_active_at(now) => (t, TokenKind::Access),
            Some((t, TokenKind::Refresh)) if t.is_refreshable_at(now) => (t, TokenKind::Refresh),
            _ => return IntrospectionResponse::inactive(),
        };

        let username = match self.find_user(&record.user_id).await {
            Ok(user) => user.map(|u| u.username),
            Err(e) => {
                tracing::warn!(error = %e, "Could not load token subject for introspection");
                None
            }
        };

        let exp = match kind {
            TokenKind::Access => Some(record.access_token_expires_at.unix_timestamp()),
            TokenKind::Refresh => record
                .refresh_token_expires_at
                .map(|t| t.unix_timestamp()),
        };

        IntrospectionResponse {
            active: true,
            client_id: Some(record.client_id),
            username,
            scope: Some(record.scope),
            sub: Some(record.user_id),
            exp,
            iat: Some(record.issued_at.unix_timestamp()),
            token_type: Some(match kind {
                TokenKind::Access => record.token_type,
                TokenKind::Refresh => "refresh_token".to_string(),
            }),
        }
    }

    /// Revoke a token issued to `client`. Never fails observably.
    #[tracing::instrument(skip(self, token, client), fields(client_id = %client.id))]
    pub async fn revoke_token(&self, token: &str, client: &oauth2_client::Model) {
        match self.tokens.revoke(token, Some(&client.id)).await {
            Ok(0) => tracing::debug!("Revocation matched no active token"),
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Database error during token revocation"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_response_has_only_active_field() {
        let json = serde_json::to_value(IntrospectionResponse::inactive()).unwrap();
        assert_eq!(json, serde_json::json!({ "active": false }));
    }
}
