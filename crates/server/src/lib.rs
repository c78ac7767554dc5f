//! An OAuth 2.0 / OpenID Connect identity provider core.
//!
//! Issues, rotates, revokes and introspects tokens for registered clients,
//! and signs ID tokens whose verification keys are published as a JWKS.

pub mod api;
pub mod config;
pub mod entity;
pub mod error;
pub mod oauth2;
pub mod storage;
