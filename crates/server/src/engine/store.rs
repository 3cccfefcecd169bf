//! Persistence for authorization codes and token families.

use crate::entity::{oauth2_authorization, oauth2_token};
use crate::error::StoreError;
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, sea_query::Expr,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn save_code(&self, code: oauth2_authorization::Model) -> Result<(), StoreError>;

    /// Remove and return a code. Of several concurrent callers at most one succeeds.
    async fn take_code(&self, code: &str) -> Result<oauth2_authorization::Model, StoreError>;

    async fn create_family(&self, family: oauth2_token::Model) -> Result<(), StoreError>;

    async fn find_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<oauth2_token::Model, StoreError>;

    async fn find_by_access_token(
        &self,
        access_token: &str,
    ) -> Result<oauth2_token::Model, StoreError>;

    /// Point the family at a newly minted access token.
    async fn rotate_access_token(
        &self,
        family_id: &str,
        access_token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError>;

    /// Revoke every live family sharing `refresh_token`, returning how many changed.
    async fn revoke_by_refresh_token(&self, refresh_token: &str) -> Result<u64, StoreError>;
}

#[derive(Clone)]
pub struct DbTokenStore {
    db: Arc<DatabaseConnection>,
    timeout: Duration,
}

impl DbTokenStore {
    pub fn new(db: Arc<DatabaseConnection>, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, DbErr>> + Send,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
            .map_err(StoreError::from)
    }
}

#[async_trait]
impl TokenStore for DbTokenStore {
    async fn save_code(&self, code: oauth2_authorization::Model) -> Result<(), StoreError> {
        let row = oauth2_authorization::ActiveModel {
            code: Set(code.code),
            client_id: Set(code.client_id),
            user_id: Set(code.user_id),
            redirect_uri: Set(code.redirect_uri),
            scope: Set(code.scope),
            state: Set(code.state),
            code_challenge: Set(code.code_challenge),
            code_challenge_method: Set(code.code_challenge_method),
            expires_at: Set(code.expires_at),
            created_at: Set(code.created_at),
        };
        self.bounded(row.insert(self.db.as_ref())).await?;
        Ok(())
    }

    async fn take_code(&self, code: &str) -> Result<oauth2_authorization::Model, StoreError> {
        let found = self
            .bounded(oauth2_authorization::Entity::find_by_id(code).one(self.db.as_ref()))
            .await?
            .ok_or(StoreError::NotFound)?;
        let deleted = self
            .bounded(oauth2_authorization::Entity::delete_by_id(code).exec(self.db.as_ref()))
            .await?;
        // Another exchange deleted it between our read and delete.
        if deleted.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(found)
    }

    async fn create_family(&self, family: oauth2_token::Model) -> Result<(), StoreError> {
        let row = oauth2_token::ActiveModel {
            id: Set(family.id),
            access_token: Set(family.access_token),
            refresh_token: Set(family.refresh_token),
            client_id: Set(family.client_id),
            user_id: Set(family.user_id),
            role: Set(family.role),
            scope: Set(family.scope),
            access_token_expires_at: Set(family.access_token_expires_at),
            refresh_token_expires_at: Set(family.refresh_token_expires_at),
            created_at: Set(family.created_at),
            revoked_at: Set(family.revoked_at),
        };
        self.bounded(row.insert(self.db.as_ref())).await?;
        Ok(())
    }

    async fn find_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<oauth2_token::Model, StoreError> {
        self.bounded(
            oauth2_token::Entity::find()
                .filter(oauth2_token::Column::RefreshToken.eq(refresh_token))
                .one(self.db.as_ref()),
        )
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn find_by_access_token(
        &self,
        access_token: &str,
    ) -> Result<oauth2_token::Model, StoreError> {
        self.bounded(
            oauth2_token::Entity::find()
                .filter(oauth2_token::Column::AccessToken.eq(access_token))
                .one(self.db.as_ref()),
        )
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn rotate_access_token(
        &self,
        family_id: &str,
        access_token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let result = self
            .bounded(
                oauth2_token::Entity::update_many()
                    .col_expr(oauth2_token::Column::AccessToken, Expr::value(access_token))
                    .col_expr(
                        oauth2_token::Column::AccessTokenExpiresAt,
                        Expr::value(expires_at),
                    )
                    .filter(oauth2_token::Column::Id.eq(family_id))
                    .filter(oauth2_token::Column::RevokedAt.is_null())
                    .exec(self.db.as_ref()),
            )
            .await?;
        if result.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn revoke_by_refresh_token(&self, refresh_token: &str) -> Result<u64, StoreError> {
        let result = self
            .bounded(
                oauth2_token::Entity::update_many()
                    .col_expr(
                        oauth2_token::Column::RevokedAt,
                        Expr::value(OffsetDateTime::now_utc()),
                    )
                    .filter(oauth2_token::Column::RefreshToken.eq(refresh_token))
                    .filter(oauth2_token::Column::RevokedAt.is_null())
                    .exec(self.db.as_ref()),
            )
            .await?;
        Ok(result.rows_affected)
    }
}
