//! Browser and service session endpoints: signup, signin, apiauth, signout.

use crate::api::extract::JwtCookie;
use crate::engine::AuthorizeRequest;
use crate::error::{AuthError, ErrorBody};
use crate::services::AuthServices;
use axum::{
    Form, Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub const SESSION_TAG: &str = "Session";

/// Scope granted when the request does not name one.
pub const DEFAULT_SCOPE: &str = "read, openid";

/// OAuth2 authorization parameters accepted on the query string.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthorizeQuery {
    /// Client identifier; signup and signin default to the frontend client
    pub client_id: Option<String>,
    /// Must be `code` when given
    pub response_type: Option<String>,
    pub redirect_uri: Option<String>,
    /// Requested scope, limited by the client's configured `scopes` when it has any
    pub scope: Option<String>,
    pub state: Option<String>,
    /// PKCE challenge
    pub code_challenge: Option<String>,
    /// `S256` or `plain`
    pub code_challenge_method: Option<String>,
}

impl AuthorizeQuery {
    fn into_request(self, default_client_id: &str) -> AuthorizeRequest {
        AuthorizeRequest {
            response_type: self.response_type.unwrap_or_else(|| "code".to_string()),
            client_id: self
                .client_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| default_client_id.to_string()),
            redirect_uri: self.redirect_uri,
            scope: self
                .scope
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
            state: self.state,
            code_challenge: self.code_challenge,
            code_challenge_method: self.code_challenge_method,
            email: None,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CredentialsForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ServiceForm {
    #[serde(default)]
    pub client_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CodeResponse {
    /// Single-use authorization code
    pub code: String,
}

#[tracing::instrument(skip(services, query, form), fields(email = %form.email))]
#[utoipa::path(
    post,
    path = "/signup",
    tag = SESSION_TAG,
    operation_id = "Signup",
    summary = "Register a user and obtain an authorization code",
    description = "Stages the credentials and issues a single-use authorization code for the \
                   frontend client. Exchange the code at `/oauth/token` with `role=user` to \
                   create the account and receive the access token.",
    params(AuthorizeQuery),
    request_body(content = CredentialsForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Authorization code issued", body = CodeResponse),
        (status = 400, description = "Email already registered", body = ErrorBody),
        (status = 403, description = "Missing email or password, or client not allowed", body = ErrorBody),
    )
)]
pub async fn signup(
    State(services): State<AuthServices>,
    Query(query): Query<AuthorizeQuery>,
    Form(form): Form<CredentialsForm>,
) -> Result<Json<CodeResponse>, AuthError> {
    let request = query.into_request(&services.frontend_client_id);
    let code = services
        .intake
        .signup(&form.email, &form.password, request)
        .await?;
    Ok(Json(CodeResponse { code }))
}

#[tracing::instrument(skip(services, query, form), fields(email = %form.email))]
#[utoipa::path(
    post,
    path = "/signin",
    tag = SESSION_TAG,
    operation_id = "Signin",
    summary = "Sign a user in and obtain an authorization code",
    description = "Stages the credentials and issues a single-use authorization code. The \
                   password is verified when the code is exchanged.",
    params(AuthorizeQuery),
    request_body(content = CredentialsForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Authorization code issued", body = CodeResponse),
        (status = 403, description = "Missing email or password", body = ErrorBody),
    )
)]
pub async fn signin(
    State(services): State<AuthServices>,
    Query(query): Query<AuthorizeQuery>,
    Form(form): Form<CredentialsForm>,
) -> Result<Json<CodeResponse>, AuthError> {
    let request = query.into_request(&services.frontend_client_id);
    let code = services
        .intake
        .signin(&form.email, &form.password, request)
        .await?;
    Ok(Json(CodeResponse { code }))
}

#[tracing::instrument(skip(services, query, form), fields(client_id = %form.client_id))]
#[utoipa::path(
    post,
    path = "/apiauth",
    tag = SESSION_TAG,
    operation_id = "Service Auth",
    summary = "Authenticate a backend service",
    description = "Issues an authorization code for an allow-listed backend service. Exchange \
                   it at `/oauth/token` with `role=APIServer` and the service's Basic credentials.",
    params(AuthorizeQuery),
    request_body(content = ServiceForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Authorization code issued", body = CodeResponse),
        (status = 403, description = "Unknown service", body = ErrorBody),
    )
)]
pub async fn apiauth(
    State(services): State<AuthServices>,
    Query(query): Query<AuthorizeQuery>,
    Form(form): Form<ServiceForm>,
) -> Result<Json<CodeResponse>, AuthError> {
    let request = query.into_request(&form.client_id);
    let code = services
        .intake
        .service_auth(&form.client_id, request)
        .await?;
    Ok(Json(CodeResponse { code }))
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/signout",
    tag = SESSION_TAG,
    operation_id = "Signout",
    summary = "Revoke the caller's token family",
    description = "Accepts an expired but correctly signed access token so a session can always be ended.",
    responses(
        (status = 200, description = "Signed out"),
        (status = 401, description = "Token signature not recognised", body = ErrorBody),
        (status = 403, description = "Missing cookie or unknown principal", body = ErrorBody),
        (status = 500, description = "Revocation failed", body = ErrorBody),
    )
)]
pub async fn signout(
    State(services): State<AuthServices>,
    JwtCookie(token): JwtCookie,
) -> Result<StatusCode, AuthError> {
    services.intake.signout(&token).await?;
    Ok(StatusCode::OK)
}
