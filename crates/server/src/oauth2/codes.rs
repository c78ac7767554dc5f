//! Authorization code ledger.
//!
//! Codes are issued by the authorize step and consumed exactly once by the
//! token exchange. Consumption is a single conditional `UPDATE` on `is_used`,
//! so concurrent claims of the same code are linearized by the database.

use crate::entity::oauth2_authorization;
use crate::error::CodeClaimError;
use crate::oauth2::password::generate_token;
use crate::oauth2::pkce::PkceMethod;
use crate::oauth2::scope::ScopeSet;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter,
};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// Everything the authorize step binds to a new code.
#[derive(Debug, Clone)]
pub struct NewAuthorizationCode {
    pub client_id: String,
    pub user_id: String,
    pub redirect_uri: String,
    pub scopes: ScopeSet,
    pub nonce: Option<String>,
    pub code_challenge: Option<(String, PkceMethod)>,
    pub auth_time: OffsetDateTime,
}

#[derive(Clone)]
pub struct AuthorizationCodeLedger {
    db: Arc<DatabaseConnection>,
    ttl: Duration,
}

impl AuthorizationCodeLedger {
    pub fn new(db: Arc<DatabaseConnection>, ttl_seconds: i64) -> Self {
        Self {
            db,
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    /// Persist a fresh code with 256 bits of entropy and the configured TTL.
    #[tracing::instrument(skip(self, request), fields(client_id = %request.client_id))]
    pub async fn issue(
        &self,
        request: NewAuthorizationCode,
    ) -> Result<oauth2_authorization::Model, DbErr> {
        let now = OffsetDateTime::now_utc();
        let (code_challenge, code_challenge_method) = match request.code_challenge {
            Some((challenge, method)) => (Some(challenge), Some(method.as_str().to_string())),
            None => (None, None),
        };

        let code = oauth2_authorization::ActiveModel {
            code: Set(generate_token()),
            client_id: Set(request.client_id),
            user_id: Set(request.user_id),
            redirect_uri: Set(request.redirect_uri),
            scope: Set(request.scopes.to_string()),
            nonce: Set(request.nonce),
            code_challenge: Set(code_challenge),
            code_challenge_method: Set(code_challenge_method),
            auth_time: Set(request.auth_time),
            is_used: Set(false),
            expires_at: Set(now + self.ttl),
            created_at: Set(now),
        };

        code.insert(self.db.as_ref()).await
    }

    /// Atomically claim a code.
    ///
    /// Exactly one caller can flip `is_used`; every other caller observes
    /// `AlreadyUsed`. An expired code is still flipped before `Expired` is
    /// reported, so it is dead from first touch onwards.
    #[tracing::instrument(skip_all)]
    pub async fn claim(&self, code: &str) -> Result<oauth2_authorization::Model, CodeClaimError> {
        let result = oauth2_authorization::Entity::update_many()
            .col_expr(oauth2_authorization::Column::IsUsed, Expr::value(true))
            .filter(oauth2_authorization::Column::Code.eq(code))
            .filter(oauth2_authorization::Column::IsUsed.eq(false))
            .exec(self.db.as_ref())
            .await?;

        let record = oauth2_authorization::Entity::find_by_id(code)
            .one(self.db.as_ref())
            .await?;

        let record = match (result.rows_affected, record) {
            (_, None) => return Err(CodeClaimError::NotFound),
            (0, Some(_)) => {
                tracing::warn!("Authorization code replay detected");
                return Err(CodeClaimError::AlreadyUsed);
            }
            (_, Some(r)) => r,
        };

        if record.is_expired_at(OffsetDateTime::now_utc()) {
            tracing::debug!(client_id = %record.client_id, "Authorization code expired");
            return Err(CodeClaimError::Expired);
        }

        Ok(record)
    }

    pub async fn find(&self, code: &str) -> Result<Option<oauth2_authorization::Model>, DbErr> {
        oauth2_authorization::Entity::find_by_id(code)
            .one(self.db.as_ref())
            .await
    }
}
