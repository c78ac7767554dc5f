//! OpenAPI/Utoipa configuration.

use crate::api::health::MISC_TAG;
use crate::oauth2::OAUTH2_TAG;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, OAuth2, Scopes, SecurityScheme},
};

/// Security addon for OpenAPI documentation.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    #[tracing::instrument(skip(self, openapi))]
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            // Opaque access token from the token endpoint
            let bearer = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .description(Some(
                    "Use an access token obtained from the `/oauth2/token` endpoint.",
                ))
                .build();
            components.add_security_scheme("bearer_auth", SecurityScheme::Http(bearer));

            let client_basic = HttpBuilder::new()
                .scheme(HttpAuthScheme::Basic)
                .description(Some("Client ID and secret (`client_secret_basic`)."))
                .build();
            components.add_security_scheme("client_basic", SecurityScheme::Http(client_basic));

            let oauth2 = OAuth2::new([
                utoipa::openapi::security::Flow::AuthorizationCode(
                    utoipa::openapi::security::AuthorizationCode::new(
                        "/oauth2/authorize",
                        "/oauth2/token",
                        Scopes::from_iter([
                            ("openid", "OpenID Connect scope"),
                            ("email", "Access to user email"),
                            ("profile", "Access to user profile"),
                        ]),
                    ),
                ),
                utoipa::openapi::security::Flow::ClientCredentials(
                    utoipa::openapi::security::ClientCredentials::new(
                        "/oauth2/token",
                        Scopes::new(),
                    ),
                ),
            ]);
            components.add_security_scheme("OAuth2", SecurityScheme::OAuth2(oauth2));
        }
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Identity Provider API",
        version = "1.0.0",
        description = "OAuth 2.0 and OpenID Connect token, introspection, revocation and discovery endpoints."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = OAUTH2_TAG, description = "OAuth2 and OpenID Connect endpoints")
    )
)]
pub struct ApiDoc;
