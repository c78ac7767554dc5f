//! OAuth2 Token entity - access and refresh tokens.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::oauth2::scope::ScopeSet;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth2_token")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub access_token: String,
    #[sea_orm(unique)]
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub client_id: String,
    pub user_id: String,
    pub scope: String,
    pub access_token_expires_at: OffsetDateTime,
    pub refresh_token_expires_at: Option<OffsetDateTime>,
    /// Authentication time of the user session this token descends from
    pub auth_time: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    /// Issue time of the current access token; moves on every rotation
    pub issued_at: OffsetDateTime,
    pub revoked_at: Option<OffsetDateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Check if this token has been revoked
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Access-token active-ness: not revoked and `now < expires_at`.
    pub fn is_active_at(&self, now: OffsetDateTime) -> bool {
        !self.is_revoked() && now < self.access_token_expires_at
    }

    /// Refresh eligibility: not revoked and `now < refresh_token_expires_at`.
    pub fn is_refreshable_at(&self, now: OffsetDateTime) -> bool {
        match self.refresh_token_expires_at {
            Some(expires_at) => !self.is_revoked() && now < expires_at,
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(OffsetDateTime::now_utc())
    }

    pub fn scopes(&self) -> ScopeSet {
        ScopeSet::parse(&self.scope)
    }

    /// Check if token has a specific scope
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes().contains(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn token(now: OffsetDateTime) -> Model {
        Model {
            id: "t".into(),
            access_token: "a".into(),
            refresh_token: Some("r".into()),
            token_type: "Bearer".into(),
            client_id: "c".into(),
            user_id: "u".into(),
            scope: "openid profile".into(),
            access_token_expires_at: now + Duration::hours(1),
            refresh_token_expires_at: Some(now + Duration::days(7)),
            auth_time: Some(now),
            created_at: now,
            issued_at: now,
            revoked_at: None,
        }
    }

    #[test]
    fn active_until_access_expiry() {
        let now = OffsetDateTime::now_utc();
        let t = token(now);
        assert!(t.is_active_at(now));
        assert!(!t.is_active_at(now + Duration::hours(1)));
        assert!(t.is_refreshable_at(now + Duration::hours(2)));
        assert!(!t.is_refreshable_at(now + Duration::days(7)));
    }

    #[test]
    fn revoked_is_permanently_inactive() {
        let now = OffsetDateTime::now_utc();
        let mut t = token(now);
        t.revoked_at = Some(now);
        assert!(!t.is_active_at(now));
        assert!(!t.is_refreshable_at(now));
    }

    #[test]
    fn no_refresh_token_is_never_refreshable() {
        let now = OffsetDateTime::now_utc();
        let mut t = token(now);
        t.refresh_token = None;
        t.refresh_token_expires_at = None;
        assert!(!t.is_refreshable_at(now));
        assert!(t.has_scope("profile"));
        assert!(!t.has_scope("email"));
    }
}
