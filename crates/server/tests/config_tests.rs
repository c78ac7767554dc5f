//! Configuration loading tests.

use identity_provider::config::{ConfigError, load_config_from};
use std::io::Write;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn test_load_minimal_config_applies_defaults() {
    let file = write_config(
        r#"
database_url: "sqlite::memory:"
oauth2:
  issuer_url: "https://idp.example.org/"
"#,
    );

    let config = load_config_from(file.path()).expect("load config");
    assert_eq!(config.database_url, "sqlite::memory:");
    assert_eq!(config.bind_address, "0.0.0.0:8080");
    assert_eq!(config.oauth2.issuer(), "https://idp.example.org");
    assert_eq!(config.oauth2.access_token_lifetime, 3600);
    assert_eq!(config.oauth2.refresh_token_lifetime, 604800);
    assert_eq!(config.oauth2.authorization_code_lifetime, 300);
    assert!(config.oauth2.signing_key_path.is_none());
    assert_eq!(
        config.oauth2.scopes_supported,
        vec!["openid", "profile", "email"]
    );
}

#[test]
fn test_load_full_config() {
    let file = write_config(
        r#"
database_url: "postgres://idp@localhost/idp"
bind_address: "127.0.0.1:9000"
oauth2:
  issuer_url: "https://login.example.org"
  access_token_lifetime: 900
  refresh_token_lifetime: 2592000
  authorization_code_lifetime: 120
  signing_key_path: "/etc/idp/signing.pem"
  user_image_base_url: "https://cdn.example.org/avatars"
  scopes_supported: ["openid", "profile", "email", "api:read"]
"#,
    );

    let config = load_config_from(file.path()).expect("load config");
    assert_eq!(config.bind_address, "127.0.0.1:9000");
    assert_eq!(config.oauth2.access_token_lifetime, 900);
    assert_eq!(config.oauth2.authorization_code_lifetime, 120);
    assert_eq!(
        config.oauth2.signing_key_path.as_deref(),
        Some(std::path::Path::new("/etc/idp/signing.pem"))
    );
    assert_eq!(
        config.oauth2.image_base_url(),
        "https://cdn.example.org/avatars"
    );
    assert_eq!(config.oauth2.scopes_supported.len(), 4);
}

#[test]
fn test_invalid_lifetimes_are_rejected() {
    let file = write_config(
        r#"
database_url: "sqlite::memory:"
oauth2:
  issuer_url: "https://idp.example.org"
  authorization_code_lifetime: 86400
"#,
    );

    assert!(matches!(
        load_config_from(file.path()),
        Err(ConfigError::Validation(_))
    ));
}

#[test]
fn test_issuer_must_be_http_url() {
    let file = write_config(
        r#"
database_url: "sqlite::memory:"
oauth2:
  issuer_url: "idp.example.org"
"#,
    );

    assert!(matches!(
        load_config_from(file.path()),
        Err(ConfigError::Validation(_))
    ));
}

#[test]
fn test_missing_required_fields() {
    let file = write_config("bind_address: \"127.0.0.1:9000\"\n");

    assert!(matches!(
        load_config_from(file.path()),
        Err(ConfigError::Build(_))
    ));
}
