//! Access/refresh token ledger.
//!
//! Tokens are created by successful grants, rotated in place on refresh and
//! revoked idempotently. Every mutation is a single conditional statement.

use crate::entity::oauth2_token;
use crate::error::TokenLedgerError;
use crate::oauth2::password::generate_token;
use crate::oauth2::scope::ScopeSet;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter,
};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// Parameters for a new token row.
#[derive(Debug, Clone)]
pub struct NewToken<'a> {
    pub client_id: &'a str,
    pub user_id: &'a str,
    pub scopes: &'a ScopeSet,
    pub auth_time: Option<OffsetDateTime>,
    /// Only grants that continue a user session get a refresh token.
    pub with_refresh: bool,
}

#[derive(Clone)]
pub struct TokenLedger {
    db: Arc<DatabaseConnection>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenLedger {
    pub fn new(
        db: Arc<DatabaseConnection>,
        access_token_lifetime: i64,
        refresh_token_lifetime: i64,
    ) -> Self {
        Self {
            db,
            access_ttl: Duration::seconds(access_token_lifetime),
            refresh_ttl: Duration::seconds(refresh_token_lifetime),
        }
    }

    pub fn access_token_lifetime(&self) -> i64 {
        self.access_ttl.whole_seconds()
    }

    #[tracing::instrument(skip(self, new), fields(client_id = new.client_id, with_refresh = new.with_refresh))]
    pub async fn issue(&self, new: NewToken<'_>) -> Result<oauth2_token::Model, DbErr> {
        let now = OffsetDateTime::now_utc();
        let (refresh_token, refresh_expires) = if new.with_refresh {
            (Some(generate_token()), Some(now + self.refresh_ttl))
        } else {
            (None, None)
        };

        let token = oauth2_token::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            access_token: Set(generate_token()),
            refresh_token: Set(refresh_token),
            token_type: Set("Bearer".to_string()),
            client_id: Set(new.client_id.to_string()),
            user_id: Set(new.user_id.to_string()),
            scope: Set(new.scopes.to_string()),
            access_token_expires_at: Set(now + self.access_ttl),
            refresh_token_expires_at: Set(refresh_expires),
            auth_time: Set(new.auth_time),
            created_at: Set(now),
            issued_at: Set(now),
            revoked_at: Set(None),
        };

        token.insert(self.db.as_ref()).await
    }

    /// Rotate both credentials of `existing` in place.
    ///
    /// The access expiry and issue time reset; the refresh expiry is preserved. The update is
    /// conditioned on the presented refresh token still being current and the
    /// row not revoked, so a refresh token can be spent at most once.
    #[tracing::instrument(skip_all, fields(token_id = %existing.id))]
    pub async fn rotate(
        &self,
        existing: &oauth2_token::Model,
        scopes: &ScopeSet,
    ) -> Result<oauth2_token::Model, TokenLedgerError> {
        let Some(current_refresh) = existing.refresh_token.as_deref() else {
            return Err(TokenLedgerError::NotFound);
        };

        let now = OffsetDateTime::now_utc();
        let new_access = generate_token();
        let new_refresh = generate_token();

        let result = oauth2_token::Entity::update_many()
            .col_expr(oauth2_token::Column::AccessToken, Expr::value(new_access.clone()))
            .col_expr(
                oauth2_token::Column::RefreshToken,
                Expr::value(Some(new_refresh)),
            )
            .col_expr(
                oauth2_token::Column::AccessTokenExpiresAt,
                Expr::value(now + self.access_ttl),
            )
            .col_expr(oauth2_token::Column::IssuedAt, Expr::value(now))
            .col_expr(oauth2_token::Column::Scope, Expr::value(scopes.to_string()))
            .filter(oauth2_token::Column::Id.eq(existing.id.as_str()))
            .filter(oauth2_token::Column::RefreshToken.eq(current_refresh))
            .filter(oauth2_token::Column::RevokedAt.is_null())
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            tracing::warn!("Refresh token was rotated or revoked concurrently");
            return Err(TokenLedgerError::NotFound);
        }

        self.lookup_by_access_token(&new_access)
            .await?
            .ok_or(TokenLedgerError::NotFound)
    }

    /// Revoke the token whose access or refresh value equals `token`.
    ///
    /// Idempotent: unknown and already-revoked tokens are a no-op. When
    /// `client_id` is given only tokens issued to that client are touched.
    /// Returns the number of rows revoked.
    #[tracing::instrument(skip(self, token))]
    pub async fn revoke(&self, token: &str, client_id: Option<&str>) -> Result<u64, DbErr> {
        let mut update = oauth2_token::Entity::update_many()
            .col_expr(
                oauth2_token::Column::RevokedAt,
                Expr::value(Some(OffsetDateTime::now_utc())),
            )
            .filter(
                oauth2_token::Column::AccessToken
                    .eq(token)
                    .or(oauth2_token::Column::RefreshToken.eq(token)),
            )
            .filter(oauth2_token::Column::RevokedAt.is_null());
        if let Some(client_id) = client_id {
            update = update.filter(oauth2_token::Column::ClientId.eq(client_id));
        }

        let result = update.exec(self.db.as_ref()).await?;
        if result.rows_affected > 0 {
            tracing::info!("Token revoked");
        }
        Ok(result.rows_affected)
    }

    pub async fn lookup_by_access_token(
        &self,
        token: &str,
    ) -> Result<Option<oauth2_token::Model>, DbErr> {
        oauth2_token::Entity::find()
            .filter(oauth2_token::Column::AccessToken.eq(token))
            .one(self.db.as_ref())
            .await
    }

    pub async fn lookup_by_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<oauth2_token::Model>, DbErr> {
        oauth2_token::Entity::find()
            .filter(oauth2_token::Column::RefreshToken.eq(token))
            .one(self.db.as_ref())
            .await
    }
}
