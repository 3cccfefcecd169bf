//! Token families: one row per issued access/refresh pair.

use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "oauth2_token")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// `jti` of the most recent access JWT issued for this family.
    #[sea_orm(unique)]
    pub access_token: String,
    /// Stable across refreshes.
    #[sea_orm(unique)]
    pub refresh_token: String,
    pub client_id: String,
    pub user_id: String,
    pub role: String,
    pub scope: String,
    pub access_token_expires_at: OffsetDateTime,
    pub refresh_token_expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
    pub revoked_at: Option<OffsetDateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_access_token_expired(&self) -> bool {
        self.access_token_expires_at < OffsetDateTime::now_utc()
    }

    pub fn is_refresh_token_expired(&self) -> bool {
        self.refresh_token_expires_at < OffsetDateTime::now_utc()
    }
}
