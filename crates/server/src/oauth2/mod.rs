//! OAuth2 / OpenID Connect provider core.
//!
//! ## Supported Flows
//!
//! - Authorization Code with PKCE (required for public clients)
//! - Refresh Token with rotation
//! - Client Credentials (confidential clients only)
//!
//! ## Endpoints
//!
//! - `POST /oauth2/token` - Token endpoint
//! - `POST /oauth2/introspect` - Token introspection
//! - `POST /oauth2/revoke` - Token revocation
//! - `GET|POST /oauth2/userinfo` - OpenID Connect UserInfo
//! - `GET /oauth2/jwks` - ID token verification keys
//! - `GET /.well-known/openid-configuration` - OpenID Connect Discovery

pub mod codes;
pub mod endpoints;
pub mod grants;
pub mod id_token;
pub mod introspection;
pub mod password;
pub mod pkce;
pub mod registry;
pub mod scope;
pub mod state;
pub mod tokens;

pub use codes::{AuthorizationCodeLedger, NewAuthorizationCode};
pub use endpoints::router;
pub use grants::{GrantType, TokenRequest, TokenResponse};
pub use id_token::{Jwk, Jwks, KeySet};
pub use registry::{ClientCredentials, ClientRegistry};
pub use scope::ScopeSet;
pub use state::OAuth2State;
pub use tokens::{NewToken, TokenLedger};

/// OpenAPI tag for OAuth2 endpoints
pub const OAUTH2_TAG: &str = "OAuth2";
