//! Liveness and readiness of the provider.

use crate::oauth2::OAuth2State;
use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Tag for OpenAPI documentation.
pub const MISC_TAG: &str = "Miscellaneous";

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthStatus {
    /// `ok` when every dependency answered, `degraded` otherwise
    pub status: String,
    pub database: bool,
    /// Number of keys published at the JWKS endpoint
    pub signing_keys: usize,
}

pub fn router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(health))
        .with_state(state)
}

/// Health check endpoint.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    method(get, head),
    path = "/healthz",
    tag = MISC_TAG,
    operation_id = "Health Check",
    summary = "Provider health check",
    description = "Pings the token store and reports how many ID token verification keys are published.\n\n\
                   Returns 503 when the store does not answer, so the check can gate load balancer \
                   traffic. Supports GET and HEAD.",
    responses(
        (status = 200, description = "Provider is ready", body = HealthStatus),
        (status = 503, description = "Token store unreachable", body = HealthStatus)
    )
)]
pub async fn health(State(state): State<OAuth2State>) -> (StatusCode, Json<HealthStatus>) {
    let database = match state.db.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Database ping failed");
            false
        }
    };
    let signing_keys = state.keys.jwks().keys.len();

    let (code, status) = if database {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    (
        code,
        Json(HealthStatus {
            status: status.to_string(),
            database,
            signing_keys,
        }),
    )
}
