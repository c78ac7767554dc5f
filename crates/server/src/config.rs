use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Settings for the OAuth2 / OpenID Connect provider.
#[derive(Clone, Debug, Deserialize)]
pub struct OAuth2Config {
    /// Base URL of the provider, used as `iss` and to build endpoint URLs.
    pub issuer_url: String,
    /// Access token lifetime in seconds
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime: i64,
    /// Refresh token lifetime in seconds. Not extended on rotation.
    #[serde(default = "default_refresh_token_lifetime")]
    pub refresh_token_lifetime: i64,
    /// Authorization code lifetime in seconds
    #[serde(default = "default_authorization_code_lifetime")]
    pub authorization_code_lifetime: i64,
    /// PKCS#8 PEM file holding the Ed25519 ID token signing key.
    /// An ephemeral key is generated when unset.
    #[serde(default)]
    pub signing_key_path: Option<PathBuf>,
    /// Prefix for `picture` claims. Defaults to `{issuer_url}/api/v3/image/user/thumb`.
    #[serde(default)]
    pub user_image_base_url: Option<String>,
    #[serde(default = "default_scopes_supported")]
    pub scopes_supported: Vec<String>,
}

impl OAuth2Config {
    /// Minimal configuration with default lifetimes, mostly useful for tests.
    pub fn new(issuer_url: impl Into<String>) -> Self {
        Self {
            issuer_url: issuer_url.into(),
            access_token_lifetime: default_access_token_lifetime(),
            refresh_token_lifetime: default_refresh_token_lifetime(),
            authorization_code_lifetime: default_authorization_code_lifetime(),
            signing_key_path: None,
            user_image_base_url: None,
            scopes_supported: default_scopes_supported(),
        }
    }

    pub fn issuer(&self) -> &str {
        self.issuer_url.trim_end_matches('/')
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.issuer(), path)
    }

    pub fn image_base_url(&self) -> String {
        match &self.user_image_base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => self.endpoint("/api/v3/image/user/thumb"),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.issuer_url.starts_with("https://") || self.issuer_url.starts_with("http://")) {
            return Err(ConfigError::Validation(
                "oauth2.issuer_url must be an http(s) URL".into(),
            ));
        }
        if self.access_token_lifetime <= 0 {
            return Err(ConfigError::Validation(
                "oauth2.access_token_lifetime must be > 0".into(),
            ));
        }
        if self.refresh_token_lifetime < self.access_token_lifetime {
            return Err(ConfigError::Validation(
                "oauth2.refresh_token_lifetime must not be shorter than the access token lifetime"
                    .into(),
            ));
        }
        if !(60..=600).contains(&self.authorization_code_lifetime) {
            return Err(ConfigError::Validation(
                "oauth2.authorization_code_lifetime must be between 60 and 600 seconds".into(),
            ));
        }
        if !self.scopes_supported.iter().any(|s| s == "openid") {
            return Err(ConfigError::Validation(
                "oauth2.scopes_supported must include openid".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    pub oauth2: OAuth2Config,
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_access_token_lifetime() -> i64 {
    3600
}

fn default_refresh_token_lifetime() -> i64 {
    86400 * 7
}

fn default_authorization_code_lifetime() -> i64 {
    300
}

fn default_scopes_supported() -> Vec<String> {
    ["openid", "profile", "email"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Any environment variable matching the key path separated by double underscores
/// (e.g. `OAUTH2__ACCESS_TOKEN_LIFETIME`) overrides the file value.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(Path::new("config.yaml"))
}

pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::from(path))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.oauth2.validate()?;

    Ok(app)
}

/// Convenience helper for binaries wanting panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = OAuth2Config::new("https://idp.example.org/");
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.issuer(), "https://idp.example.org");
        assert_eq!(cfg.endpoint("/oauth2/token"), "https://idp.example.org/oauth2/token");
    }

    #[test]
    fn code_lifetime_must_stay_short() {
        let mut cfg = OAuth2Config::new("https://idp.example.org");
        cfg.authorization_code_lifetime = 3600;
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
        cfg.authorization_code_lifetime = 30;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn refresh_lifetime_not_shorter_than_access() {
        let mut cfg = OAuth2Config::new("https://idp.example.org");
        cfg.refresh_token_lifetime = 60;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn image_base_url_falls_back_to_issuer() {
        let mut cfg = OAuth2Config::new("https://idp.example.org");
        assert_eq!(
            cfg.image_base_url(),
            "https://idp.example.org/api/v3/image/user/thumb"
        );
        cfg.user_image_base_url = Some("https://cdn.example.org/img/".into());
        assert_eq!(cfg.image_base_url(), "https://cdn.example.org/img");
    }
}
