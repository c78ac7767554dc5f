//! OAuth2 error response tests.

use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use identity_provider::error::{CodeClaimError, ErrorResponse, OAuth2Error, TokenLedgerError};

#[test]
fn test_error_codes_and_statuses() {
    let cases = [
        (OAuth2Error::ClientAuthenticationFailed, "invalid_client", StatusCode::UNAUTHORIZED),
        (OAuth2Error::CodeAlreadyUsed, "invalid_grant", StatusCode::BAD_REQUEST),
        (OAuth2Error::RedirectUriMismatch, "invalid_grant", StatusCode::BAD_REQUEST),
        (OAuth2Error::PkceVerificationFailed, "invalid_grant", StatusCode::BAD_REQUEST),
        (OAuth2Error::PkceRequired, "invalid_request", StatusCode::BAD_REQUEST),
        (OAuth2Error::ScopeNotAllowed, "invalid_scope", StatusCode::BAD_REQUEST),
        (OAuth2Error::UnsupportedGrantType, "unsupported_grant_type", StatusCode::BAD_REQUEST),
        (OAuth2Error::UnauthorizedClient, "unauthorized_client", StatusCode::BAD_REQUEST),
        (OAuth2Error::InvalidToken, "invalid_token", StatusCode::UNAUTHORIZED),
        (OAuth2Error::InsufficientScope("openid"), "insufficient_scope", StatusCode::FORBIDDEN),
        (OAuth2Error::ServerError, "server_error", StatusCode::INTERNAL_SERVER_ERROR),
    ];

    for (error, code, status) in cases {
        assert_eq!(error.error_code(), code, "{error:?}");
        assert_eq!(error.status_code(), status, "{error:?}");
    }
}

#[test]
fn test_error_response_body() {
    let body = ErrorResponse::from(&OAuth2Error::MissingRequiredParameter("code"));
    assert_eq!(body.error, "invalid_request");
    assert_eq!(
        body.error_description.as_deref(),
        Some("missing required parameter: code")
    );

    let body = serde_json::to_value(ErrorResponse::from(&OAuth2Error::ServerError)).unwrap();
    assert_eq!(body, serde_json::json!({ "error": "server_error" }));
}

#[test]
fn test_www_authenticate_headers() {
    let response = OAuth2Error::ClientAuthenticationFailed.into_response();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers().get(header::WWW_AUTHENTICATE).unwrap(), "Basic");

    let response = OAuth2Error::InsufficientScope("openid").into_response();
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        "Bearer error=\"insufficient_scope\""
    );

    let response = OAuth2Error::ScopeNotAllowed.into_response();
    assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());
}

#[test]
fn test_ledger_errors_map_to_invalid_grant() {
    for claim in [
        CodeClaimError::NotFound,
        CodeClaimError::AlreadyUsed,
        CodeClaimError::Expired,
    ] {
        assert_eq!(OAuth2Error::from(claim).error_code(), "invalid_grant");
    }
    assert_eq!(
        OAuth2Error::from(TokenLedgerError::NotFound).error_code(),
        "invalid_grant"
    );
    assert_eq!(
        OAuth2Error::from(sea_orm::DbErr::Custom("boom".into())).error_code(),
        "server_error"
    );
}
