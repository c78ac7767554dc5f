//! OAuth2 state management.
//!
//! Bundles the client registry, both ledgers and the signing keys. Cloned
//! into every handler; nothing in here is mutated after startup.

use crate::config::OAuth2Config;
use crate::entity::oauth2_user;
use crate::oauth2::codes::AuthorizationCodeLedger;
use crate::oauth2::id_token::KeySet;
use crate::oauth2::registry::ClientRegistry;
use crate::oauth2::tokens::TokenLedger;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter,
};
use std::sync::Arc;
use time::OffsetDateTime;

/// OAuth2 state containing all components needed for the provider.
#[derive(Clone)]
pub struct OAuth2State {
    pub db: Arc<DatabaseConnection>,
    pub clients: ClientRegistry,
    pub codes: AuthorizationCodeLedger,
    pub tokens: TokenLedger,
    pub keys: Arc<KeySet>,
    pub config: Arc<OAuth2Config>,
}

impl OAuth2State {
    pub fn new(db: Arc<DatabaseConnection>, config: OAuth2Config, keys: KeySet) -> Self {
        Self {
            clients: ClientRegistry::new(db.clone()),
            codes: AuthorizationCodeLedger::new(db.clone(), config.authorization_code_lifetime),
            tokens: TokenLedger::new(
                db.clone(),
                config.access_token_lifetime,
                config.refresh_token_lifetime,
            ),
            db,
            keys: Arc::new(keys),
            config: Arc::new(config),
        }
    }

    pub async fn find_user(&self, user_id: &str) -> Result<Option<oauth2_user::Model>, DbErr> {
        oauth2_user::Entity::find_by_id(user_id)
            .one(self.db.as_ref())
            .await
    }

    /// Get or create the service principal that owns a client's
    /// client_credentials tokens.
    #[tracing::instrument(skip(self))]
    pub async fn service_principal(&self, client_id: &str) -> Result<oauth2_user::Model, DbErr> {
        let username = format!("service:{client_id}");

        if let Some(user) = oauth2_user::Entity::find()
            .filter(oauth2_user::Column::Username.eq(&username))
            .one(self.db.as_ref())
            .await?
        {
            return Ok(user);
        }

        let principal = oauth2_user::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            username: Set(username.clone()),
            display_name: Set(None),
            email: Set(None),
            email_verified: Set(false),
            user_image: Set(None),
            is_service_account: Set(true),
            created_at: Set(OffsetDateTime::now_utc()),
        };

        match principal.insert(self.db.as_ref()).await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "Created service principal");
                Ok(user)
            }
            // Lost a creation race on the unique username; read the winner.
            Err(e) => oauth2_user::Entity::find()
                .filter(oauth2_user::Column::Username.eq(&username))
                .one(self.db.as_ref())
                .await?
                .ok_or(e),
        }
    }
}
