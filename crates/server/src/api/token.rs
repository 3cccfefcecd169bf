//! Token endpoints: code exchange, refresh, introspection, validation and
//! permission checks.

use crate::api::extract::{BearerToken, JwtCookie, basic_credentials};
use crate::engine::TokenRequest;
use crate::error::{AuthError, ErrorBody};
use crate::services::{AuthServices, PermissionGrant};
use axum::{
    Form, Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use serde_json::{Map, Value};
use utoipa::{IntoParams, ToSchema};

pub const TOKEN_TAG: &str = "Token";

#[derive(Deserialize, ToSchema)]
pub struct TokenForm {
    /// Must be `authorization_code`
    pub grant_type: String,
    pub code: Option<String>,
    /// Principal the code was issued to: an email or a service id
    pub sub: Option<String>,
    pub code_verifier: Option<String>,
    pub redirect_uri: Option<String>,
    /// `user` or `APIServer`
    pub role: Option<String>,
    /// Used only when no Basic credentials are sent
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl TokenForm {
    fn into_request(self, headers: &HeaderMap) -> TokenRequest {
        let (client_id, client_secret) = match basic_credentials(headers) {
            Some((id, secret)) => (Some(id), Some(secret)),
            None => (self.client_id, self.client_secret),
        };
        TokenRequest {
            grant_type: self.grant_type,
            code: self.code,
            redirect_uri: self.redirect_uri,
            code_verifier: self.code_verifier,
            sub: self.sub,
            role: self.role,
            client_id,
            client_secret,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PermissionQuery {
    /// `read`, `write` or `all`
    #[serde(default)]
    pub permission: String,
}

#[tracing::instrument(skip_all, fields(sub = form.sub.as_deref().unwrap_or_default()))]
#[utoipa::path(
    post,
    path = "/oauth/token",
    tag = TOKEN_TAG,
    operation_id = "Token Exchange",
    summary = "Exchange an authorization code for an access token",
    description = "Client credentials go in an `Authorization: Basic` header (or the form). \
                   The response body is the signed access JWT as a JSON string.\n\n\
                   Failures are deliberately opaque: every rejection is reported as 500.",
    request_body(content = TokenForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Access JWT", body = String),
        (status = 500, description = "Exchange failed", body = ErrorBody),
    )
)]
pub async fn token(
    State(services): State<AuthServices>,
    headers: HeaderMap,
    Form(form): Form<TokenForm>,
) -> Result<Json<String>, AuthError> {
    let request = form.into_request(&headers);
    let access_jwt = services.tokens.exchange(request).await?;
    Ok(Json(access_jwt))
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/refreshopenid",
    tag = TOKEN_TAG,
    operation_id = "Refresh",
    summary = "Mint a new access token",
    description = "The `jwt_token` cookie may hold an expired access token; the stored refresh \
                   JWT must still be valid.",
    responses(
        (status = 200, description = "New access JWT", body = String),
        (status = 403, description = "Missing cookie, or expired or invalid refresh token", body = ErrorBody),
    )
)]
pub async fn refreshopenid(
    State(services): State<AuthServices>,
    JwtCookie(token): JwtCookie,
) -> Result<Json<String>, AuthError> {
    let access_jwt = services.tokens.refresh(&token).await?;
    Ok(Json(access_jwt))
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/jwtgetdata",
    tag = TOKEN_TAG,
    operation_id = "Introspect",
    summary = "Claims of the caller's access token",
    responses(
        (status = 200, description = "Flattened claims", body = std::collections::HashMap<String, serde_json::Value>),
        (status = 401, description = "Token expired", body = ErrorBody),
        (status = 403, description = "Token invalid or cookie missing", body = ErrorBody),
    )
)]
pub async fn jwtgetdata(
    State(services): State<AuthServices>,
    JwtCookie(token): JwtCookie,
) -> Result<Json<Map<String, Value>>, AuthError> {
    Ok(Json(services.tokens.introspect(&token)?))
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/jwtvalidation",
    tag = TOKEN_TAG,
    operation_id = "Validate",
    summary = "Check the caller's access token",
    responses(
        (status = 200, description = "Token valid"),
        (status = 401, description = "Token expired or invalid", body = ErrorBody),
        (status = 403, description = "Cookie missing", body = ErrorBody),
    )
)]
pub async fn jwtvalidation(
    State(services): State<AuthServices>,
    JwtCookie(token): JwtCookie,
) -> Result<StatusCode, AuthError> {
    services.tokens.validate(&token)?;
    Ok(StatusCode::OK)
}

#[tracing::instrument(skip(services, bearer))]
#[utoipa::path(
    get,
    path = "/permission",
    tag = TOKEN_TAG,
    operation_id = "Check Permission",
    summary = "Check a bearer token against a permission",
    params(PermissionQuery),
    responses(
        (status = 200, description = "Permission granted", body = PermissionGrant),
        (status = 400, description = "Token invalid or permission not granted", body = ErrorBody),
    ),
    security(("Bearer" = []))
)]
pub async fn permission(
    State(services): State<AuthServices>,
    BearerToken(bearer): BearerToken,
    Query(query): Query<PermissionQuery>,
) -> Result<Json<PermissionGrant>, AuthError> {
    let grant = services
        .tokens
        .check_permission(bearer.as_deref(), &query.permission)
        .await?;
    Ok(Json(grant))
}
