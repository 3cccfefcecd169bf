//! Identity-side implementation of the grant-engine hooks.

use crate::engine::{
    AuthorizeRequest, GrantContext, GrantHooks, KeyRing, OpenidData, TokenData,
};
use crate::error::{AuthError, StoreError};
use crate::model::{DemoProfile, FlowPath, Role};
use crate::store::{IdentityStore, NewUser, PrincipalTokens};
use crate::ticket::{ClaimCache, CorrelationMap};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Upper bound (exclusive) for the six-digit email validation code.
const VALIDATION_CODE_RANGE: u32 = 1_000_000;

pub struct IdentityHooks {
    store: IdentityStore,
    claims: ClaimCache,
    correlations: CorrelationMap,
    keys: KeyRing,
    frontend_client_id: String,
    allowed_services: Arc<HashSet<String>>,
}

impl IdentityHooks {
    pub fn new(
        store: IdentityStore,
        claims: ClaimCache,
        correlations: CorrelationMap,
        keys: KeyRing,
        frontend_client_id: impl Into<String>,
        allowed_services: Arc<HashSet<String>>,
    ) -> Self {
        Self {
            store,
            claims,
            correlations,
            keys,
            frontend_client_id: frontend_client_id.into(),
            allowed_services,
        }
    }

    /// The correlation key suffix for an authorize request.
    fn correlation_source<'a>(&self, request: &'a AuthorizeRequest) -> Result<&'a str, AuthError> {
        if request.client_id == self.frontend_client_id {
            return request
                .email
                .as_deref()
                .filter(|email| !email.is_empty())
                .ok_or_else(|| AuthError::forbidden("email is required"));
        }
        if self.allowed_services.contains(&request.client_id) {
            return Ok(&request.client_id);
        }
        Err(AuthError::forbidden("client is not allowed"))
    }
}

fn store_failure(err: StoreError, context: &str) -> AuthError {
    match err {
        StoreError::NotFound => AuthError::forbidden(format!("{context}: record not found")),
        StoreError::Conflict => AuthError::bad_request("email already exist"),
        other => {
            tracing::error!(error = %other, "{context}");
            AuthError::internal(context)
        }
    }
}

fn require<'a>(value: &'a str, name: &str) -> Result<&'a str, AuthError> {
    if value.is_empty() {
        return Err(AuthError::bad_request(format!("unfound {name}")));
    }
    Ok(value)
}

#[async_trait]
impl GrantHooks for IdentityHooks {
    async fn authorize(&self, request: &AuthorizeRequest) -> Result<String, AuthError> {
        let source = self.correlation_source(request)?;
        self.correlations
            .take_for(source)
            .map_err(|_| AuthError::forbidden("no login in progress"))
    }

    async fn openid_data(&self, ctx: &mut GrantContext) -> Result<OpenidData, AuthError> {
        let key = self.keys.signing_key(ctx.role).clone();
        if ctx.path == Some(FlowPath::RefreshOpenid) {
            return Ok(OpenidData {
                claims: Map::new(),
                key,
            });
        }

        if ctx.subject.is_empty() {
            return Err(AuthError::bad_request("unfound sub"));
        }
        let ticket = self
            .claims
            .take_once(&ctx.subject)
            .map_err(|_| AuthError::forbidden("no claim ticket for subject"))?;

        let mut claims = Map::new();
        match (ctx.role, ticket.path) {
            (Role::User, FlowPath::Signup) => {
                claims.insert("name".into(), Value::from(DemoProfile::NAME));
                claims.insert("age".into(), Value::from(DemoProfile::AGE));
                claims.insert("city".into(), Value::from(DemoProfile::CITY));
                ctx.password = ticket.password;
            }
            (Role::User, FlowPath::Signin) => {
                let user = self
                    .store
                    .find_user(&ticket.identifier)
                    .await
                    .map_err(|e| store_failure(e, "failed to load user"))?;
                if ticket.password.as_deref() != Some(user.password.as_str()) {
                    return Err(AuthError::forbidden("invalid credentials"));
                }
                claims.insert("name".into(), Value::from(user.name));
                claims.insert("age".into(), Value::from(user.age));
                claims.insert("city".into(), Value::from(user.city));
            }
            (Role::ApiServer, FlowPath::ApiAuth) => {
                claims.insert("service_id".into(), Value::from(ticket.identifier));
            }
            (Role::User, FlowPath::ApiAuth)
            | (Role::User, FlowPath::RefreshOpenid)
            | (Role::ApiServer, FlowPath::Signup)
            | (Role::ApiServer, FlowPath::Signin)
            | (Role::ApiServer, FlowPath::RefreshOpenid) => {
                return Err(AuthError::forbidden(format!(
                    "path {} is not available to role {}",
                    ticket.path, ctx.role
                )));
            }
        }
        ctx.path = Some(ticket.path);

        Ok(OpenidData { claims, key })
    }

    async fn finalize_token(
        &self,
        ctx: &GrantContext,
        tokens: &TokenData,
    ) -> Result<String, AuthError> {
        let refresh_token = require(&tokens.refresh_token, "refresh_token")?;
        let access_jwt = require(&tokens.access_jwt, "access_token")?;
        let refresh_jwt = require(&tokens.refresh_jwt, "refresh_jwt")?;
        let path = ctx.path.ok_or_else(|| AuthError::bad_request("unfound path"))?;
        let subject = require(&ctx.subject, "sub")?;

        let issued = PrincipalTokens {
            refresh_token: refresh_token.to_string(),
            refresh_jwt: refresh_jwt.to_string(),
        };
        match (ctx.role, path) {
            (Role::ApiServer, FlowPath::ApiAuth) => self
                .store
                .upsert_api_server(subject, issued)
                .await
                .map_err(|e| store_failure(e, "failed to save service tokens"))?,
            (Role::ApiServer, FlowPath::RefreshOpenid) => self
                .store
                .update_api_server_refresh_jwt(subject, refresh_jwt)
                .await
                .map_err(|e| store_failure(e, "failed to refresh service tokens"))?,
            (Role::User, FlowPath::Signup) => {
                let exists = self
                    .store
                    .user_exists(subject)
                    .await
                    .map_err(|e| store_failure(e, "failed to check user"))?;
                if exists {
                    return Err(AuthError::bad_request("email already exist"));
                }
                let password = ctx
                    .password
                    .clone()
                    .ok_or_else(|| AuthError::bad_request("unfound password"))?;
                self.store
                    .create_user(NewUser {
                        email: subject.to_string(),
                        password,
                        tokens: issued,
                        email_validation_code: i64::from(
                            getrandom::u32().map_err(|e| {
                                tracing::error!(error = %e, "entropy source unavailable");
                                AuthError::internal("failed to create user")
                            })? % VALIDATION_CODE_RANGE,
                        ),
                        name: DemoProfile::NAME.to_string(),
                        age: DemoProfile::AGE.to_string(),
                        city: DemoProfile::CITY.to_string(),
                    })
                    .await
                    .map_err(|e| store_failure(e, "failed to create user"))?;
            }
            (Role::User, FlowPath::Signin) => self
                .store
                .update_user_tokens(subject, issued)
                .await
                .map_err(|e| store_failure(e, "failed to save user tokens"))?,
            (Role::User, FlowPath::RefreshOpenid) => self
                .store
                .update_user_refresh_jwt(subject, refresh_jwt)
                .await
                .map_err(|e| store_failure(e, "failed to refresh user tokens"))?,
            (Role::User, FlowPath::ApiAuth)
            | (Role::ApiServer, FlowPath::Signup)
            | (Role::ApiServer, FlowPath::Signin) => {
                return Err(AuthError::forbidden(format!(
                    "path {path} is not available to role {}",
                    ctx.role
                )));
            }
        }

        tracing::info!(sub = subject, role = %ctx.role, path = %path, "grant finalized");
        Ok(access_jwt.to_string())
    }
}
