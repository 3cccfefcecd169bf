//! The callback surface the grant engine drives during code issuance, code
//! exchange and refresh.

use crate::engine::jwt::SigningKey;
use crate::error::{AuthError, GrantError};
use crate::model::{FlowPath, Role};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Parameters of an authorization-code request.
#[derive(Clone, Debug)]
pub struct AuthorizeRequest {
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: Option<String>,
    pub scope: String,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    /// Form `email` field; only the frontend client keys its flows by it.
    pub email: Option<String>,
}

/// State threaded through one exchange or refresh.
///
/// The engine fills in client, subject, role and scope; hooks may set `path` and
/// `password` for later hooks to read.
#[derive(Clone)]
pub struct GrantContext {
    pub client_id: String,
    pub subject: String,
    pub role: Role,
    pub scope: String,
    pub path: Option<FlowPath>,
    pub password: Option<String>,
}

impl std::fmt::Debug for GrantContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantContext")
            .field("client_id", &self.client_id)
            .field("subject", &self.subject)
            .field("role", &self.role)
            .field("scope", &self.scope)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Extra claims and the key to sign them with.
#[derive(Clone, Debug)]
pub struct OpenidData {
    pub claims: Map<String, Value>,
    pub key: SigningKey,
}

/// Artifacts produced by one grant, handed to [`GrantHooks::finalize_token`].
#[derive(Clone)]
pub struct TokenData {
    pub refresh_token: String,
    pub access_jwt: String,
    pub refresh_jwt: String,
}

#[async_trait]
pub trait GrantHooks: Send + Sync {
    /// Resolve the principal an authorization code is issued to.
    async fn authorize(&self, request: &AuthorizeRequest) -> Result<String, AuthError>;

    /// Supply claims and signing key for the tokens about to be minted.
    async fn openid_data(&self, ctx: &mut GrantContext) -> Result<OpenidData, AuthError>;

    /// Persist the grant. Returns the access JWT to hand back to the caller.
    async fn finalize_token(
        &self,
        ctx: &GrantContext,
        tokens: &TokenData,
    ) -> Result<String, AuthError>;

    /// Sink for failures caused by the server.
    fn internal_error(&self, err: &GrantError) {
        tracing::error!(error = %err, "grant engine internal error");
    }

    /// Sink for failures caused by the request.
    fn response_error(&self, err: &GrantError) {
        tracing::debug!(error = %err, code = err.error_code(), "grant request rejected");
    }
}
