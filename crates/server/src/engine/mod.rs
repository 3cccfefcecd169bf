//! In-process OAuth2/OpenID grant engine.
//!
//! The engine owns the protocol mechanics and defers every identity decision
//! to a [`GrantHooks`] implementation registered at construction.
//!
//! ## Supported Flows
//!
//! - Authorization Code with PKCE (`S256` or `plain`)
//! - Refresh of the signed JWT pair against a stable opaque refresh token
//!
//! ## Grant lifecycle
//!
//! 1. [`GrantEngine::authorize`] asks [`GrantHooks::authorize`] for the principal
//!    and stores a single-use code.
//! 2. [`GrantEngine::exchange`] consumes the code, collects claims through
//!    [`GrantHooks::openid_data`], signs an access and a refresh JWT, lets
//!    [`GrantHooks::finalize_token`] persist the principal and only then records
//!    the token family. A failing finalize hook leaves nothing live behind.
//! 3. [`GrantEngine::refresh`] re-signs the pair for a live family.
//! 4. [`GrantEngine::revoke_family`] ends a family.

pub mod clients;
pub mod hooks;
pub mod jwt;
pub mod pkce;
pub mod store;

pub use clients::{ClientRegistry, RegisteredClient};
pub use hooks::{AuthorizeRequest, GrantContext, GrantHooks, OpenidData, TokenData};
pub use jwt::{Claims, KeyRing, SigningKey};
pub use store::{DbTokenStore, TokenStore};

use crate::config::LifetimeConfig;
use crate::entity::{oauth2_authorization, oauth2_token};
use crate::error::{GrantError, JwtError, StoreError};
use crate::model::{FlowPath, Role};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use pkce::PkceMethod;
use serde_json::{Map, Value};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// Random bytes behind an authorization code; encodes to 48 characters.
const CODE_BYTES: usize = 36;
/// Random bytes behind an opaque refresh token.
const REFRESH_TOKEN_BYTES: usize = 32;

#[derive(Clone, Copy, Debug)]
pub struct Lifetimes {
    pub user_access: Duration,
    pub user_refresh: Duration,
    pub service_access: Duration,
    pub service_refresh: Duration,
    pub authorization_code: Duration,
}

impl Lifetimes {
    pub fn access(&self, role: Role) -> Duration {
        match role {
            Role::User => self.user_access,
            Role::ApiServer => self.service_access,
        }
    }

    pub fn refresh(&self, role: Role) -> Duration {
        match role {
            Role::User => self.user_refresh,
            Role::ApiServer => self.service_refresh,
        }
    }
}

impl From<&LifetimeConfig> for Lifetimes {
    fn from(config: &LifetimeConfig) -> Self {
        Self {
            user_access: Duration::seconds(config.user_access),
            user_refresh: Duration::seconds(config.user_refresh),
            service_access: Duration::seconds(config.service_access),
            service_refresh: Duration::seconds(config.service_refresh),
            authorization_code: Duration::seconds(config.authorization_code),
        }
    }
}

/// Token-endpoint request for the `authorization_code` grant.
#[derive(Clone, Debug, Default)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub sub: Option<String>,
    pub role: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Everything the engine needs to re-sign a principal's token pair.
#[derive(Clone)]
pub struct RefreshRequest {
    pub subject: String,
    pub role: Role,
    pub refresh_token: String,
    pub refresh_jwt: String,
    /// Prior access JWT; its `openidInfo` is carried into the new token.
    pub access_jwt: String,
}

/// What a validated bearer token grants.
#[derive(Clone, Debug, PartialEq)]
pub struct TokenInfo {
    pub client_id: String,
    pub user_id: String,
    pub scope: String,
    pub expires_at: OffsetDateTime,
}

impl TokenInfo {
    /// Whole seconds until the access token expires.
    pub fn expires_in(&self) -> i64 {
        (self.expires_at - OffsetDateTime::now_utc())
            .whole_seconds()
            .max(0)
    }
}

struct MintedPair {
    access_jwt: String,
    access_jti: String,
    access_expires_at: OffsetDateTime,
    refresh_jwt: String,
    refresh_expires_at: OffsetDateTime,
}

pub struct GrantEngine {
    clients: ClientRegistry,
    keys: KeyRing,
    lifetimes: Lifetimes,
    tokens: Arc<dyn TokenStore>,
    hooks: Arc<dyn GrantHooks>,
}

impl GrantEngine {
    pub fn new(
        clients: ClientRegistry,
        keys: KeyRing,
        lifetimes: Lifetimes,
        tokens: Arc<dyn TokenStore>,
        hooks: Arc<dyn GrantHooks>,
    ) -> Self {
        Self {
            clients,
            keys,
            lifetimes,
            tokens,
            hooks,
        }
    }

    pub fn keys(&self) -> &KeyRing {
        &self.keys
    }

    /// Issue an authorization code.
    #[tracing::instrument(skip(self, request), fields(client_id = %request.client_id))]
    pub async fn authorize(&self, request: AuthorizeRequest) -> Result<String, GrantError> {
        let result = self.issue_code(&request).await;
        self.report(result)
    }

    /// Exchange an authorization code for a signed access JWT.
    #[tracing::instrument(skip(self, request), fields(sub = request.sub.as_deref().unwrap_or_default()))]
    pub async fn exchange(&self, request: TokenRequest) -> Result<String, GrantError> {
        let result = self.exchange_code(request).await;
        self.report(result)
    }

    /// Mint a fresh access/refresh JWT pair for a live token family.
    #[tracing::instrument(skip(self, request), fields(sub = %request.subject, role = %request.role))]
    pub async fn refresh(&self, request: RefreshRequest) -> Result<String, GrantError> {
        let result = self.refresh_pair(request).await;
        self.report(result)
    }

    /// Validate a bearer access JWT against its token family.
    pub async fn validate_bearer(&self, token: &str) -> Result<TokenInfo, GrantError> {
        let claims = self.keys.decode(token)?;
        let family = match self.tokens.find_by_access_token(&claims.jti).await {
            Ok(family) => family,
            Err(StoreError::NotFound) => {
                return Err(GrantError::InvalidToken("unknown access token".into()));
            }
            Err(e) => return Err(e.into()),
        };
        if family.is_revoked() {
            return Err(GrantError::InvalidToken("token has been revoked".into()));
        }
        if family.is_access_token_expired() {
            return Err(GrantError::InvalidToken("token has expired".into()));
        }
        Ok(TokenInfo {
            client_id: family.client_id,
            user_id: family.user_id,
            scope: family.scope,
            expires_at: family.access_token_expires_at,
        })
    }

    /// Revoke every token family issued under `refresh_token`.
    #[tracing::instrument(skip_all)]
    pub async fn revoke_family(&self, refresh_token: &str) -> Result<u64, GrantError> {
        let revoked = self.tokens.revoke_by_refresh_token(refresh_token).await?;
        tracing::debug!(revoked, "revoked token families");
        Ok(revoked)
    }

    // =========================================================================
    // Grant steps
    // =========================================================================

    async fn issue_code(&self, request: &AuthorizeRequest) -> Result<String, GrantError> {
        if request.response_type != "code" {
            return Err(GrantError::UnsupportedResponseType);
        }
        let client = self
            .clients
            .get(&request.client_id)
            .ok_or(GrantError::InvalidClient)?;
        let redirect_uri = self
            .clients
            .bound_redirect(client, request.redirect_uri.as_deref())?;
        if !client.allows_scope(&request.scope) {
            return Err(GrantError::InvalidScope(request.scope.clone()));
        }

        let challenge_method = match (&request.code_challenge, &request.code_challenge_method) {
            (Some(_), Some(method)) => Some(
                method
                    .parse::<PkceMethod>()
                    .map_err(|e| GrantError::InvalidRequest(e.to_string()))?,
            ),
            (Some(_), None) => Some(PkceMethod::Plain),
            (None, Some(_)) => {
                return Err(GrantError::InvalidRequest(
                    "code_challenge_method without code_challenge".into(),
                ));
            }
            (None, None) => None,
        };

        let principal = self.hooks.authorize(request).await?;

        let code = random_token(CODE_BYTES)?;
        let now = OffsetDateTime::now_utc();
        self.tokens
            .save_code(oauth2_authorization::Model {
                code: code.clone(),
                client_id: client.id.clone(),
                user_id: principal,
                redirect_uri,
                scope: request.scope.clone(),
                state: request.state.clone(),
                code_challenge: request.code_challenge.clone(),
                code_challenge_method: challenge_method.map(|m| m.as_str().to_string()),
                expires_at: expiry(now, self.lifetimes.authorization_code)?,
                created_at: now,
            })
            .await?;
        Ok(code)
    }

    async fn exchange_code(&self, request: TokenRequest) -> Result<String, GrantError> {
        if request.grant_type != "authorization_code" {
            return Err(GrantError::UnsupportedGrantType);
        }
        let client = self.clients.authenticate(
            request.client_id.as_deref(),
            request.client_secret.as_deref(),
        )?;
        let code = request
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| GrantError::InvalidRequest("code is required".into()))?;
        let role: Role = request
            .role
            .as_deref()
            .ok_or_else(|| GrantError::InvalidRequest("role is required".into()))?
            .parse()
            .map_err(|e: crate::model::UnknownTag| GrantError::InvalidRequest(e.to_string()))?;

        let grant = match self.tokens.take_code(code).await {
            Ok(grant) => grant,
            Err(StoreError::NotFound) => {
                return Err(GrantError::InvalidGrant(
                    "authorization code not found".into(),
                ));
            }
            Err(e) => return Err(e.into()),
        };
        if grant.is_expired() {
            return Err(GrantError::InvalidGrant("authorization code expired".into()));
        }
        if grant.client_id != client.id {
            return Err(GrantError::InvalidGrant("client mismatch".into()));
        }
        if let Some(uri) = request.redirect_uri.as_deref()
            && !uri.is_empty()
            && uri != grant.redirect_uri
        {
            return Err(GrantError::InvalidGrant("redirect_uri mismatch".into()));
        }
        if request.sub.as_deref() != Some(grant.user_id.as_str()) {
            return Err(GrantError::InvalidGrant("subject mismatch".into()));
        }
        if !grant.verify_pkce(request.code_verifier.as_deref()) {
            return Err(GrantError::InvalidGrant("PKCE verification failed".into()));
        }

        let mut ctx = GrantContext {
            client_id: client.id.clone(),
            subject: grant.user_id,
            role,
            scope: grant.scope,
            path: None,
            password: None,
        };
        let data = self.hooks.openid_data(&mut ctx).await?;
        let minted = self.mint(&ctx, data.claims, &data.key)?;
        let refresh_token = random_token(REFRESH_TOKEN_BYTES)?;

        let echoed = self
            .hooks
            .finalize_token(
                &ctx,
                &TokenData {
                    refresh_token: refresh_token.clone(),
                    access_jwt: minted.access_jwt,
                    refresh_jwt: minted.refresh_jwt,
                },
            )
            .await?;

        self.tokens
            .create_family(oauth2_token::Model {
                id: uuid::Uuid::new_v4().to_string(),
                access_token: minted.access_jti,
                refresh_token,
                client_id: ctx.client_id,
                user_id: ctx.subject,
                role: role.as_str().to_string(),
                scope: ctx.scope,
                access_token_expires_at: minted.access_expires_at,
                refresh_token_expires_at: minted.refresh_expires_at,
                created_at: OffsetDateTime::now_utc(),
                revoked_at: None,
            })
            .await?;

        Ok(echoed)
    }

    async fn refresh_pair(&self, request: RefreshRequest) -> Result<String, GrantError> {
        let refresh_claims = self.keys.decode(&request.refresh_jwt)?;
        let prior = self.keys.decode_ignoring_expiry(&request.access_jwt)?;
        if refresh_claims.sub != request.subject || prior.sub != request.subject {
            return Err(JwtError::Invalid.into());
        }

        let family = match self.tokens.find_by_refresh_token(&request.refresh_token).await {
            Ok(family) => family,
            Err(StoreError::NotFound) => {
                return Err(GrantError::InvalidGrant("unknown refresh token".into()));
            }
            Err(e) => return Err(e.into()),
        };
        if family.is_revoked() {
            return Err(GrantError::InvalidGrant("refresh token revoked".into()));
        }
        if family.is_refresh_token_expired() {
            return Err(GrantError::InvalidGrant("refresh token expired".into()));
        }
        if family.user_id != request.subject || family.role != request.role.as_str() {
            return Err(GrantError::InvalidGrant("refresh token belongs to another principal".into()));
        }

        let mut ctx = GrantContext {
            client_id: family.client_id.clone(),
            subject: request.subject,
            role: request.role,
            scope: family.scope.clone(),
            path: Some(FlowPath::RefreshOpenid),
            password: None,
        };
        let data = self.hooks.openid_data(&mut ctx).await?;
        let mut carried = prior.openid_info;
        carried.extend(data.claims);
        let minted = self.mint(&ctx, carried, &data.key)?;

        let echoed = self
            .hooks
            .finalize_token(
                &ctx,
                &TokenData {
                    refresh_token: family.refresh_token,
                    access_jwt: minted.access_jwt,
                    refresh_jwt: minted.refresh_jwt,
                },
            )
            .await?;
        self.tokens
            .rotate_access_token(&family.id, &minted.access_jti, minted.access_expires_at)
            .await?;

        Ok(echoed)
    }

    /// Sign an access and a refresh JWT for `ctx`.
    fn mint(
        &self,
        ctx: &GrantContext,
        mut openid_info: Map<String, Value>,
        key: &SigningKey,
    ) -> Result<MintedPair, GrantError> {
        openid_info.insert(jwt::SCOPE_CLAIM.into(), Value::from(ctx.scope.clone()));
        openid_info.insert(jwt::ROLE_CLAIM.into(), Value::from(ctx.role.as_str()));

        let now = OffsetDateTime::now_utc();
        let access_expires_at = expiry(now, self.lifetimes.access(ctx.role))?;
        let refresh_expires_at = expiry(now, self.lifetimes.refresh(ctx.role))?;

        let access = Claims {
            aud: ctx.client_id.clone(),
            sub: ctx.subject.clone(),
            iat: now.unix_timestamp(),
            exp: access_expires_at.unix_timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
            openid_info,
        };
        let refresh = Claims {
            exp: refresh_expires_at.unix_timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
            ..access.clone()
        };

        Ok(MintedPair {
            access_jwt: key.sign(&access)?,
            access_jti: access.jti,
            access_expires_at,
            refresh_jwt: key.sign(&refresh)?,
            refresh_expires_at,
        })
    }

    fn report<T>(&self, result: Result<T, GrantError>) -> Result<T, GrantError> {
        if let Err(err) = &result {
            if err.is_internal() {
                self.hooks.internal_error(err);
            } else {
                self.hooks.response_error(err);
            }
        }
        result
    }
}

fn expiry(now: OffsetDateTime, lifetime: Duration) -> Result<OffsetDateTime, GrantError> {
    now.checked_add(lifetime)
        .ok_or_else(|| GrantError::Internal(format!("lifetime {lifetime} overflows the date range")))
}

/// URL-safe random string from `len` bytes of OS entropy.
fn random_token(len: usize) -> Result<String, GrantError> {
    let mut bytes = vec![0u8; len];
    getrandom::fill(&mut bytes)
        .map_err(|e| GrantError::Internal(format!("entropy source unavailable: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
