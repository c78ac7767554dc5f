use axum::{
    Json,
    extract::rejection::FormRejection,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Failures of the token, introspection, revocation and userinfo endpoints.
///
/// Each variant maps onto an RFC 6749 / RFC 6750 error code. Descriptions are
/// fixed strings so internal identifiers never reach the client.
#[derive(Debug, Error)]
pub enum OAuth2Error {
    #[error("client authentication failed")]
    ClientAuthenticationFailed,
    #[error("authorization code is invalid or expired")]
    InvalidOrExpiredCode,
    #[error("authorization code has already been used")]
    CodeAlreadyUsed,
    #[error("authorization code was issued to another client")]
    CodeClientMismatch,
    #[error("redirect_uri does not match the authorization request")]
    RedirectUriMismatch,
    #[error("PKCE verification failed")]
    PkceVerificationFailed,
    #[error("public clients must use PKCE")]
    PkceRequired,
    #[error("requested scope is not allowed for this client")]
    ScopeNotAllowed,
    #[error("unsupported grant_type")]
    UnsupportedGrantType,
    #[error("client is not allowed to use this grant type")]
    UnauthorizedClient,
    #[error("token is invalid, expired or revoked")]
    TokenNotFoundOrExpiredOrRevoked,
    #[error("missing required parameter: {0}")]
    MissingRequiredParameter(&'static str),
    #[error("request body must be form-encoded parameters")]
    MalformedRequest,
    #[error("invalid access token")]
    InvalidToken,
    #[error("token lacks required scope: {0}")]
    InsufficientScope(&'static str),
    #[error("internal server error")]
    ServerError,
}

impl OAuth2Error {
    /// The `error` value of the OAuth2 error response.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ClientAuthenticationFailed => "invalid_client",
            Self::InvalidOrExpiredCode
            | Self::CodeAlreadyUsed
            | Self::CodeClientMismatch
            | Self::RedirectUriMismatch
            | Self::PkceVerificationFailed
            | Self::TokenNotFoundOrExpiredOrRevoked => "invalid_grant",
            Self::PkceRequired | Self::MissingRequiredParameter(_) | Self::MalformedRequest => {
                "invalid_request"
            }
            Self::ScopeNotAllowed => "invalid_scope",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::InvalidToken => "invalid_token",
            Self::InsufficientScope(_) => "insufficient_scope",
            Self::ServerError => "server_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ClientAuthenticationFailed | Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::InsufficientScope(_) => StatusCode::FORBIDDEN,
            Self::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn description(&self) -> Option<String> {
        match self {
            Self::ServerError => None,
            other => Some(other.to_string()),
        }
    }
}

impl From<sea_orm::DbErr> for OAuth2Error {
    fn from(e: sea_orm::DbErr) -> Self {
        tracing::error!(error = %e, "Database error while handling OAuth2 request");
        Self::ServerError
    }
}

impl From<FormRejection> for OAuth2Error {
    fn from(rejection: FormRejection) -> Self {
        tracing::debug!(reason = %rejection.body_text(), "Rejected OAuth2 form body");
        Self::MalformedRequest
    }
}

/// OAuth2 error body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl From<&OAuth2Error> for ErrorResponse {
    fn from(e: &OAuth2Error) -> Self {
        Self {
            error: e.error_code().to_string(),
            error_description: e.description(),
        }
    }
}

impl IntoResponse for OAuth2Error {
    fn into_response(self) -> Response {
        let mut response = (self.status_code(), Json(ErrorResponse::from(&self))).into_response();
        if matches!(self, Self::ClientAuthenticationFailed) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Basic"));
        } else if matches!(self, Self::InvalidToken | Self::InsufficientScope(_)) {
            let challenge = format!("Bearer error=\"{}\"", self.error_code());
            if let Ok(value) = HeaderValue::from_str(&challenge) {
                response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
            }
        }
        response
    }
}

/// Outcome of an atomic authorization code claim that did not yield a code.
#[derive(Debug, Error)]
pub enum CodeClaimError {
    #[error("authorization code not found")]
    NotFound,
    #[error("authorization code already used")]
    AlreadyUsed,
    #[error("authorization code expired")]
    Expired,
    #[error(transparent)]
    Storage(#[from] sea_orm::DbErr),
}

impl From<CodeClaimError> for OAuth2Error {
    fn from(e: CodeClaimError) -> Self {
        match e {
            CodeClaimError::NotFound | CodeClaimError::Expired => Self::InvalidOrExpiredCode,
            CodeClaimError::AlreadyUsed => Self::CodeAlreadyUsed,
            CodeClaimError::Storage(db) => db.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenLedgerError {
    /// The token was revoked or rotated concurrently, or never existed.
    #[error("token not found or no longer active")]
    NotFound,
    #[error(transparent)]
    Storage(#[from] sea_orm::DbErr),
}

impl From<TokenLedgerError> for OAuth2Error {
    fn from(e: TokenLedgerError) -> Self {
        match e {
            TokenLedgerError::NotFound => Self::TokenNotFoundOrExpiredOrRevoked,
            TokenLedgerError::Storage(db) => db.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("failed to read signing key {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid signing key: {0}")]
    InvalidKey(String),
    #[error("failed to sign ID token: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

impl From<SigningError> for OAuth2Error {
    fn from(e: SigningError) -> Self {
        tracing::error!(error = %e, "ID token signing failed");
        Self::ServerError
    }
}
