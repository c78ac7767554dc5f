use identity_provider::api::start_webserver;
use identity_provider::config::load_config_or_panic;
use identity_provider::oauth2::{KeySet, OAuth2State};
use identity_provider::storage;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "identity_provider=info,tower_http=info,sea_orm=warn";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let layer = fmt::layer().with_target(true).with_level(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    // -------- Tracing Initialization --------
    initialize_tracing();

    // Load config
    let config = load_config_or_panic();

    let db = storage::connect(&config.database_url).await?;
    storage::ensure_schema(&db).await?;
    let db = Arc::new(db);

    let keys = match &config.oauth2.signing_key_path {
        Some(path) => KeySet::from_pem_file(path)?,
        None => {
            tracing::warn!(
                "No oauth2.signing_key_path configured; generated an ephemeral signing key. \
                 ID tokens will not verify after a restart."
            );
            KeySet::generate()?
        }
    };
    tracing::info!(kid = %keys.active_kid(), issuer = %config.oauth2.issuer(), "Signing key loaded");

    let bind_address = config.bind_address.clone();
    let state = OAuth2State::new(db, config.oauth2, keys);

    start_webserver(state, &bind_address).await?;
    Ok(())
}
