//! End-user principal record.

use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "user_account")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub email: String,
    /// Stored as submitted.
    pub password: String,
    pub role: String,
    /// Opaque refresh token of the current token family.
    pub refresh_token: String,
    pub refresh_jwt: String,
    pub email_validation_code: i64,
    pub is_email_validated: i32,
    pub name: String,
    pub age: String,
    pub city: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
