//! Durable Identity Store.
//!
//! Create/update/get-by-key access to the principal records. Token-field updates are
//! single `UPDATE ... WHERE key = ?` statements so each principal's row changes
//! atomically. Every call is bounded by the configured store timeout.

use crate::entity::{api_server, user_account};
use crate::error::StoreError;
use crate::model::Role;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, sea_query::Expr, sea_query::OnConflict,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// The refresh artifacts written after a grant.
#[derive(Clone)]
pub struct PrincipalTokens {
    pub refresh_token: String,
    pub refresh_jwt: String,
}

/// Fields of a freshly signed-up user.
#[derive(Clone)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub tokens: PrincipalTokens,
    pub email_validation_code: i64,
    pub name: String,
    pub age: String,
    pub city: String,
}

/// Role-independent view of a principal's refresh state.
#[derive(Clone, Debug, PartialEq)]
pub struct PrincipalRecord {
    pub identifier: String,
    pub role: Role,
    pub refresh_token: String,
    pub refresh_jwt: String,
}

#[derive(Clone)]
pub struct IdentityStore {
    db: Arc<DatabaseConnection>,
    timeout: Duration,
}

impl IdentityStore {
    pub fn new(db: Arc<DatabaseConnection>, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, DbErr>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }

    pub async fn user_exists(&self, email: &str) -> Result<bool, StoreError> {
        let found = self
            .bounded(user_account::Entity::find_by_id(email).one(self.db.as_ref()))
            .await?;
        Ok(found.is_some())
    }

    pub async fn find_user(&self, email: &str) -> Result<user_account::Model, StoreError> {
        self.bounded(user_account::Entity::find_by_id(email).one(self.db.as_ref()))
            .await?
            .ok_or(StoreError::NotFound)
    }

    /// Insert a new user. A concurrent insert for the same email yields `Conflict`.
    pub async fn create_user(&self, user: NewUser) -> Result<(), StoreError> {
        let now = OffsetDateTime::now_utc();
        let record = user_account::ActiveModel {
            email: Set(user.email),
            password: Set(user.password),
            role: Set(Role::User.as_str().to_string()),
            refresh_token: Set(user.tokens.refresh_token),
            refresh_jwt: Set(user.tokens.refresh_jwt),
            email_validation_code: Set(user.email_validation_code),
            is_email_validated: Set(0),
            name: Set(user.name),
            age: Set(user.age),
            city: Set(user.city),
            created_at: Set(now),
            updated_at: Set(now),
        };
        self.bounded(record.insert(self.db.as_ref())).await?;
        Ok(())
    }

    /// Replace both refresh artifacts after a signin.
    pub async fn update_user_tokens(
        &self,
        email: &str,
        tokens: PrincipalTokens,
    ) -> Result<(), StoreError> {
        let result = self
            .bounded(
                user_account::Entity::update_many()
                    .col_expr(
                        user_account::Column::RefreshToken,
                        Expr::value(tokens.refresh_token),
                    )
                    .col_expr(
                        user_account::Column::RefreshJwt,
                        Expr::value(tokens.refresh_jwt),
                    )
                    .col_expr(
                        user_account::Column::UpdatedAt,
                        Expr::value(OffsetDateTime::now_utc()),
                    )
                    .filter(user_account::Column::Email.eq(email))
                    .exec(self.db.as_ref()),
            )
            .await?;
        if result.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub async fn update_user_refresh_jwt(
        &self,
        email: &str,
        refresh_jwt: &str,
    ) -> Result<(), StoreError> {
        let result = self
            .bounded(
                user_account::Entity::update_many()
                    .col_expr(user_account::Column::RefreshJwt, Expr::value(refresh_jwt))
                    .col_expr(
                        user_account::Column::UpdatedAt,
                        Expr::value(OffsetDateTime::now_utc()),
                    )
                    .filter(user_account::Column::Email.eq(email))
                    .exec(self.db.as_ref()),
            )
            .await?;
        if result.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub async fn count_users(&self) -> Result<u64, StoreError> {
        self.bounded(user_account::Entity::find().count(self.db.as_ref()))
            .await
    }

    pub async fn find_api_server(
        &self,
        service_id: &str,
    ) -> Result<api_server::Model, StoreError> {
        self.bounded(api_server::Entity::find_by_id(service_id).one(self.db.as_ref()))
            .await?
            .ok_or(StoreError::NotFound)
    }

    /// Create the service record, or replace its tokens if the service has
    /// authenticated before.
    pub async fn upsert_api_server(
        &self,
        service_id: &str,
        tokens: PrincipalTokens,
    ) -> Result<(), StoreError> {
        let now = OffsetDateTime::now_utc();
        let record = api_server::ActiveModel {
            service_id: Set(service_id.to_string()),
            role: Set(Role::ApiServer.as_str().to_string()),
            refresh_token: Set(tokens.refresh_token),
            refresh_jwt: Set(tokens.refresh_jwt),
            created_at: Set(now),
            updated_at: Set(now),
        };
        self.bounded(
            api_server::Entity::insert(record)
                .on_conflict(
                    OnConflict::column(api_server::Column::ServiceId)
                        .update_columns([
                            api_server::Column::RefreshToken,
                            api_server::Column::RefreshJwt,
                            api_server::Column::UpdatedAt,
                        ])
                        .to_owned(),
                )
                .exec(self.db.as_ref()),
        )
        .await?;
        Ok(())
    }

    pub async fn update_api_server_refresh_jwt(
        &self,
        service_id: &str,
        refresh_jwt: &str,
    ) -> Result<(), StoreError> {
        let result = self
            .bounded(
                api_server::Entity::update_many()
                    .col_expr(api_server::Column::RefreshJwt, Expr::value(refresh_jwt))
                    .col_expr(
                        api_server::Column::UpdatedAt,
                        Expr::value(OffsetDateTime::now_utc()),
                    )
                    .filter(api_server::Column::ServiceId.eq(service_id))
                    .exec(self.db.as_ref()),
            )
            .await?;
        if result.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Load whichever record backs `identifier` for `role`.
    pub async fn find_principal(
        &self,
        role: Role,
        identifier: &str,
    ) -> Result<PrincipalRecord, StoreError> {
        match role {
            Role::User => {
                let user = self.find_user(identifier).await?;
                Ok(PrincipalRecord {
                    identifier: user.email,
                    role,
                    refresh_token: user.refresh_token,
                    refresh_jwt: user.refresh_jwt,
                })
            }
            Role::ApiServer => {
                let service = self.find_api_server(identifier).await?;
                Ok(PrincipalRecord {
                    identifier: service.service_id,
                    role,
                    refresh_token: service.refresh_token,
                    refresh_jwt: service.refresh_jwt,
                })
            }
        }
    }
}
