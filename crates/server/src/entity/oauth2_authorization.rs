//! Single-use authorization codes awaiting exchange.

use crate::engine::pkce::PkceMethod;
use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "oauth2_authorization")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub code: String,
    pub client_id: String,
    /// Principal resolved by the authorization hook.
    pub user_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    /// `S256` or `plain`
    pub code_challenge_method: Option<String>,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_expired(&self) -> bool {
        self.expires_at < OffsetDateTime::now_utc()
    }

    /// Check the verifier presented at exchange against the stored challenge.
    ///
    /// Codes issued without a challenge accept any (or no) verifier.
    pub fn verify_pkce(&self, verifier: Option<&str>) -> bool {
        let Some(challenge) = self.code_challenge.as_deref() else {
            return true;
        };
        let method = match self.code_challenge_method.as_deref() {
            Some(raw) => match raw.parse::<PkceMethod>() {
                Ok(method) => method,
                Err(_) => return false,
            },
            None => PkceMethod::Plain,
        };
        verifier.is_some_and(|v| method.verify(challenge, v))
    }
}
