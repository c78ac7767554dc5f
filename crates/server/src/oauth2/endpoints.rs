//! OAuth2 HTTP endpoints.
//!
//! Implements the provider's HTTP surface:
//! - Token endpoint
//! - Token introspection
//! - Token revocation
//! - UserInfo (OpenID Connect)
//! - Discovery document and key set

use crate::entity::oauth2_client;
use crate::error::{ErrorResponse, OAuth2Error};
use crate::oauth2::grants::{GrantType, TokenRequest, TokenResponse};
use crate::oauth2::id_token::{Jwks, ScopedClaims};
use crate::oauth2::introspection::{IntrospectionRequest, IntrospectionResponse, RevokeRequest};
use crate::oauth2::pkce::PkceMethod;
use crate::oauth2::registry::ClientCredentials;
use crate::oauth2::scope::SCOPE_OPENID;
use crate::oauth2::{OAUTH2_TAG, state::OAuth2State};
use axum::{
    Form, Json,
    extract::{State, rejection::FormRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

pub const TOKEN_PATH: &str = "/oauth2/token";
pub const INTROSPECTION_PATH: &str = "/oauth2/introspect";
pub const REVOCATION_PATH: &str = "/oauth2/revoke";
pub const USERINFO_PATH: &str = "/oauth2/userinfo";
pub const JWKS_PATH: &str = "/oauth2/jwks";
pub const AUTHORIZATION_PATH: &str = "/oauth2/authorize";

/// Creates the OAuth2 router.
pub fn router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(token))
        .routes(routes!(introspect))
        .routes(routes!(revoke))
        .routes(routes!(userinfo))
        .routes(routes!(jwks))
        .routes(routes!(openid_configuration))
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserInfoResponse {
    pub sub: String,
    #[serde(flatten)]
    pub claims: ScopedClaims,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OpenIdConfiguration {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    pub introspection_endpoint: String,
    pub revocation_endpoint: String,
    pub scopes_supported: Vec<String>,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    pub claims_supported: Vec<String>,
}

fn no_store(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

/// OAuth2 Token endpoint.
#[tracing::instrument(skip(state, headers, params))]
#[utoipa::path(
    post,
    path = "/oauth2/token",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Token",
    summary = "Exchange a grant for tokens",
    description = "Issues tokens for one of the supported grants.\n\n\
                   **Supported grant types:**\n\
                   - `authorization_code`: exchange a single-use code (with `redirect_uri` and, if the \
                   code was issued with a challenge, `code_verifier`) for access, refresh and ID tokens\n\
                   - `refresh_token`: rotate a refresh token; the old access and refresh tokens stop working\n\
                   - `client_credentials`: confidential clients only; no refresh or ID token\n\n\
                   **Client authentication:** HTTP Basic, or `client_id`/`client_secret` in the body. \
                   Public clients send only `client_id`.",
    request_body(
        content = TokenRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token request parameters"
    ),
    responses(
        (status = 200, description = "Tokens issued successfully", body = TokenResponse),
        (status = 400, description = "Invalid request, grant or scope", body = ErrorResponse),
        (status = 401, description = "Client authentication failed", body = ErrorResponse),
    )
)]
pub async fn token(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    params: Result<Form<TokenRequest>, FormRejection>,
) -> Response {
    let response = match token_for(&state, &headers, params).await {
        Ok(tokens) => (StatusCode::OK, Json(tokens)).into_response(),
        Err(e) => e.into_response(),
    };
    no_store(response)
}

async fn token_for(
    state: &OAuth2State,
    headers: &HeaderMap,
    params: Result<Form<TokenRequest>, FormRejection>,
) -> Result<TokenResponse, OAuth2Error> {
    let Form(params) = params?;
    let credentials = ClientCredentials::from_request(
        headers,
        params.client_id.as_deref(),
        params.client_secret.as_deref(),
    )?
    .ok_or(OAuth2Error::MissingRequiredParameter("client_id"))?;

    state.exchange(&credentials, params).await
}

/// Token introspection endpoint (RFC 7662).
#[tracing::instrument(skip(state, headers, params))]
#[utoipa::path(
    post,
    path = "/oauth2/introspect",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Introspect Token",
    summary = "Report whether a token is active",
    description = "Returns `active: true` with the token's metadata when the token exists, is not revoked \
                   and has not expired. Every other case returns exactly `{\"active\": false}`.\n\n\
                   Requires confidential client authentication.",
    request_body(
        content = IntrospectionRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token introspection request"
    ),
    responses(
        (status = 200, description = "Introspection result", body = IntrospectionResponse),
        (status = 400, description = "Missing `token` or malformed body", body = ErrorResponse),
        (status = 401, description = "Client authentication failed", body = ErrorResponse),
    )
)]
pub async fn introspect(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    params: Result<Form<IntrospectionRequest>, FormRejection>,
) -> Response {
    let response = match introspect_for(&state, &headers, params).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => e.into_response(),
    };
    no_store(response)
}

async fn introspect_for(
    state: &OAuth2State,
    headers: &HeaderMap,
    params: Result<Form<IntrospectionRequest>, FormRejection>,
) -> Result<IntrospectionResponse, OAuth2Error> {
    let Form(params) = params?;
    let client = authenticate(
        state,
        headers,
        params.client_id.as_deref(),
        params.client_secret.as_deref(),
    )
    .await?;
    if !client.is_confidential() {
        return Err(OAuth2Error::UnauthorizedClient);
    }
    if params.token.is_empty() {
        return Err(OAuth2Error::MissingRequiredParameter("token"));
    }

    Ok(state
        .introspect(&params.token, params.token_type_hint.as_deref())
        .await)
}

/// Token revocation endpoint (RFC 7009).
#[tracing::instrument(skip(state, headers, params))]
#[utoipa::path(
    post,
    path = "/oauth2/revoke",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Revoke Token",
    summary = "Revoke an access or refresh token",
    description = "Revokes the token (access or refresh) issued to the authenticated client.\n\n\
                   Returns 200 OK whether or not the token existed or was already revoked. \
                   `token_type_hint` is accepted and ignored.",
    request_body(
        content = RevokeRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token revocation request"
    ),
    responses(
        (status = 200, description = "Token revoked (or was already invalid)"),
        (status = 400, description = "Missing `token` or malformed body", body = ErrorResponse),
        (status = 401, description = "Client authentication failed", body = ErrorResponse),
    )
)]
pub async fn revoke(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    params: Result<Form<RevokeRequest>, FormRejection>,
) -> Response {
    match revoke_for(&state, &headers, params).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn revoke_for(
    state: &OAuth2State,
    headers: &HeaderMap,
    params: Result<Form<RevokeRequest>, FormRejection>,
) -> Result<(), OAuth2Error> {
    let Form(params) = params?;
    let client = authenticate(
        state,
        headers,
        params.client_id.as_deref(),
        params.client_secret.as_deref(),
    )
    .await?;
    if params.token.is_empty() {
        return Err(OAuth2Error::MissingRequiredParameter("token"));
    }

    state.revoke_token(&params.token, &client).await;
    Ok(())
}

/// OpenID Connect UserInfo endpoint.
#[tracing::instrument(skip(state, headers))]
#[utoipa::path(
    method(get, post),
    path = "/oauth2/userinfo",
    tag = OAUTH2_TAG,
    operation_id = "OpenID Connect UserInfo",
    summary = "Get authenticated user's profile information",
    description = "Returns claims about the token's subject. Requires an active access token with the `openid` scope.\n\n\
                   **Returned claims depend on granted scopes:**\n\
                   - `openid`: `sub`\n\
                   - `profile`: `name`, `preferred_username`, `picture`\n\
                   - `email`: `email`, `email_verified`",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "User profile information", body = UserInfoResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse),
        (status = 403, description = "Token does not have required `openid` scope", body = ErrorResponse),
    )
)]
pub async fn userinfo(State(state): State<OAuth2State>, headers: HeaderMap) -> Response {
    match userinfo_for(&state, &headers).await {
        Ok(info) => (StatusCode::OK, Json(info)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn userinfo_for(
    state: &OAuth2State,
    headers: &HeaderMap,
) -> Result<UserInfoResponse, OAuth2Error> {
    let access_token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(OAuth2Error::InvalidToken)?;

    let token = state
        .tokens
        .lookup_by_access_token(access_token)
        .await?
        .filter(|t| t.is_active())
        .ok_or(OAuth2Error::InvalidToken)?;

    if !token.has_scope(SCOPE_OPENID) {
        return Err(OAuth2Error::InsufficientScope(SCOPE_OPENID));
    }

    let user = state.find_user(&token.user_id).await?.ok_or_else(|| {
        tracing::error!(user_id = %token.user_id, "Token subject has no user record");
        OAuth2Error::ServerError
    })?;

    let claims = ScopedClaims::for_user(&user, &token.scopes(), &state.config.image_base_url());
    Ok(UserInfoResponse {
        sub: user.id,
        claims,
    })
}

/// Published ID token verification keys.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/oauth2/jwks",
    tag = OAUTH2_TAG,
    operation_id = "OpenID Connect JWKS",
    summary = "JSON Web Key Set",
    description = "Public keys for verifying ID token signatures (EdDSA / Ed25519, RFC 8037).",
    responses(
        (status = 200, description = "Key set", body = Jwks),
    )
)]
pub async fn jwks(State(state): State<OAuth2State>) -> Json<Jwks> {
    Json(state.keys.jwks())
}

/// OpenID Connect Discovery document.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/.well-known/openid-configuration",
    tag = OAUTH2_TAG,
    operation_id = "OpenID Connect Discovery",
    summary = "OpenID Connect Discovery document",
    description = "Returns the OpenID Connect Discovery document: endpoint URLs, supported scopes, \
                   response types, grant types, client authentication methods and PKCE methods.",
    responses(
        (status = 200, description = "OpenID Connect configuration document", body = OpenIdConfiguration),
    )
)]
pub async fn openid_configuration(State(state): State<OAuth2State>) -> Json<OpenIdConfiguration> {
    let config = &state.config;
    Json(OpenIdConfiguration {
        issuer: config.issuer().to_string(),
        authorization_endpoint: config.endpoint(AUTHORIZATION_PATH),
        token_endpoint: config.endpoint(TOKEN_PATH),
        userinfo_endpoint: config.endpoint(USERINFO_PATH),
        jwks_uri: config.endpoint(JWKS_PATH),
        introspection_endpoint: config.endpoint(INTROSPECTION_PATH),
        revocation_endpoint: config.endpoint(REVOCATION_PATH),
        scopes_supported: config.scopes_supported.clone(),
        response_types_supported: vec!["code".to_string()],
        grant_types_supported: GrantType::ALL.iter().map(|g| g.to_string()).collect(),
        subject_types_supported: vec!["public".to_string()],
        id_token_signing_alg_values_supported: vec!["EdDSA".to_string()],
        token_endpoint_auth_methods_supported: vec![
            "client_secret_basic".to_string(),
            "client_secret_post".to_string(),
            "none".to_string(),
        ],
        code_challenge_methods_supported: [PkceMethod::S256, PkceMethod::Plain]
            .iter()
            .map(|m| m.to_string())
            .collect(),
        claims_supported: [
            "iss",
            "sub",
            "aud",
            "exp",
            "iat",
            "auth_time",
            "nonce",
            "azp",
            "name",
            "preferred_username",
            "picture",
            "email",
            "email_verified",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect(),
    })
}

// =============================================================================
// Helper Functions
// =============================================================================

async fn authenticate(
    state: &OAuth2State,
    headers: &HeaderMap,
    client_id: Option<&str>,
    client_secret: Option<&str>,
) -> Result<oauth2_client::Model, OAuth2Error> {
    let credentials = ClientCredentials::from_request(headers, client_id, client_secret)?
        .ok_or(OAuth2Error::ClientAuthenticationFailed)?;
    Ok(state.clients.authenticate_credentials(&credentials).await?)
}
