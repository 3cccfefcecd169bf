//! Token Service: exchange, refresh, introspection, validation and
//! permission checks on issued tokens.

use crate::engine::{GrantEngine, RefreshRequest, TokenRequest};
use crate::error::{AuthError, GrantError, JwtError, StoreError};
use crate::store::IdentityStore;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use utoipa::ToSchema;

/// A permission a bearer can ask to be checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Permission {
    Read,
    Write,
    All,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::All => "all",
        }
    }

    /// Whether `scope` grants this permission. `all` in the scope grants everything.
    pub fn granted_by(&self, scope: &str) -> bool {
        let mut granted = scope
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty());
        granted.any(|s| s == Permission::All.as_str() || s == self.as_str())
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Permission::Read),
            "write" => Ok(Permission::Write),
            "all" => Ok(Permission::All),
            other => Err(AuthError::bad_request(format!(
                "unknown permission `{other}`"
            ))),
        }
    }
}

/// Successful permission check.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct PermissionGrant {
    /// Seconds until the access token expires
    pub expires_in: i64,
    pub client_id: String,
    pub user_id: String,
    /// The full scope granted to the token
    pub permission: String,
}

#[derive(Clone)]
pub struct TokenService {
    engine: Arc<GrantEngine>,
    store: IdentityStore,
}

impl TokenService {
    pub fn new(engine: Arc<GrantEngine>, store: IdentityStore) -> Self {
        Self { engine, store }
    }

    /// Exchange an authorization code for an access JWT.
    ///
    /// Every failure is reported as an opaque internal error.
    #[tracing::instrument(skip_all, fields(sub = request.sub.as_deref().unwrap_or_default()))]
    pub async fn exchange(&self, request: TokenRequest) -> Result<String, AuthError> {
        self.engine.exchange(request).await.map_err(|e| {
            tracing::warn!(error = %e, "token exchange failed");
            AuthError::internal("token exchange failed")
        })
    }

    /// Mint a new access JWT for the holder of `access_jwt`, which may be expired.
    #[tracing::instrument(skip_all)]
    pub async fn refresh(&self, access_jwt: &str) -> Result<String, AuthError> {
        let claims = self
            .engine
            .keys()
            .decode_ignoring_expiry(access_jwt)
            .map_err(|e| AuthError::forbidden(e.to_string()))?;
        let role = claims
            .role()
            .ok_or_else(|| AuthError::forbidden("unfound role"))?;
        let principal = match self.store.find_principal(role, &claims.sub).await {
            Ok(principal) => principal,
            Err(StoreError::NotFound) => return Err(AuthError::forbidden("unknown subject")),
            Err(e) => {
                tracing::error!(error = %e, "failed to load principal for refresh");
                return Err(AuthError::internal("failed to load principal"));
            }
        };

        let request = RefreshRequest {
            subject: principal.identifier,
            role,
            refresh_token: principal.refresh_token,
            refresh_jwt: principal.refresh_jwt,
            access_jwt: access_jwt.to_string(),
        };
        self.engine.refresh(request).await.map_err(|err| match err {
            GrantError::Hook(hook) => hook,
            GrantError::Jwt(jwt @ (JwtError::Expired | JwtError::Invalid)) => {
                AuthError::forbidden(jwt.to_string())
            }
            other if other.is_internal() => AuthError::internal("token refresh failed"),
            other => AuthError::forbidden(other.to_string()),
        })
    }

    /// Claims of a live access JWT, flattened into one map.
    pub fn introspect(&self, access_jwt: &str) -> Result<Map<String, Value>, AuthError> {
        let claims = self.engine.keys().decode(access_jwt).map_err(|e| match e {
            JwtError::Expired => AuthError::unauthorized(e.to_string()),
            _ => AuthError::forbidden(e.to_string()),
        })?;
        Ok(claims.flatten())
    }

    /// Check that `access_jwt` is signed by a known key and not expired.
    pub fn validate(&self, access_jwt: &str) -> Result<(), AuthError> {
        self.engine
            .keys()
            .decode(access_jwt)
            .map(|_| ())
            .map_err(|e| AuthError::unauthorized(e.to_string()))
    }

    /// Check a bearer token against a requested permission.
    #[tracing::instrument(skip(self, bearer))]
    pub async fn check_permission(
        &self,
        bearer: Option<&str>,
        permission: &str,
    ) -> Result<PermissionGrant, AuthError> {
        let token = bearer
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::bad_request("missing bearer token"))?;
        let info = self.engine.validate_bearer(token).await.map_err(|e| {
            tracing::debug!(error = %e, "bearer validation failed");
            AuthError::bad_request(e.to_string())
        })?;
        let requested: Permission = permission.parse()?;
        if !requested.granted_by(&info.scope) {
            return Err(AuthError::bad_request(format!(
                "permission {requested} is not granted"
            )));
        }
        Ok(PermissionGrant {
            expires_in: info.expires_in(),
            client_id: info.client_id,
            user_id: info.user_id,
            permission: info.scope,
        })
    }
}
