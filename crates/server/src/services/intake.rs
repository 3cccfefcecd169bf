//! Credential intake: validates the first request of each flow, stages the
//! single-use tickets the hooks consume, and drives code issuance.

use crate::engine::{AuthorizeRequest, GrantEngine};
use crate::error::{AuthError, GrantError};
use crate::model::{ClaimTicket, FlowPath};
use crate::store::IdentityStore;
use crate::ticket::{ClaimCache, CorrelationMap};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone)]
pub struct CredentialIntake {
    engine: Arc<GrantEngine>,
    store: IdentityStore,
    claims: ClaimCache,
    correlations: CorrelationMap,
    allowed_services: Arc<HashSet<String>>,
}

impl CredentialIntake {
    pub fn new(
        engine: Arc<GrantEngine>,
        store: IdentityStore,
        claims: ClaimCache,
        correlations: CorrelationMap,
        allowed_services: Arc<HashSet<String>>,
    ) -> Self {
        Self {
            engine,
            store,
            claims,
            correlations,
            allowed_services,
        }
    }

    /// Start a signup and return the authorization code.
    #[tracing::instrument(skip(self, password, request))]
    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        request: AuthorizeRequest,
    ) -> Result<String, AuthError> {
        require_credentials(email, password)?;
        match self.store.user_exists(email).await {
            Ok(true) => return Err(AuthError::bad_request("email already exist")),
            Ok(false) => {}
            Err(e) => {
                tracing::error!(error = %e, "failed to check for existing user");
                return Err(AuthError::internal("failed to check user"));
            }
        }
        self.start_user_flow(email, password, FlowPath::Signup, request)
            .await
    }

    /// Start a signin and return the authorization code.
    ///
    /// The password is checked during code exchange, not here.
    #[tracing::instrument(skip(self, password, request))]
    pub async fn signin(
        &self,
        email: &str,
        password: &str,
        request: AuthorizeRequest,
    ) -> Result<String, AuthError> {
        require_credentials(email, password)?;
        self.start_user_flow(email, password, FlowPath::Signin, request)
            .await
    }

    /// Start a backend-service authentication and return the authorization code.
    #[tracing::instrument(skip(self, request))]
    pub async fn service_auth(
        &self,
        client_id: &str,
        mut request: AuthorizeRequest,
    ) -> Result<String, AuthError> {
        if client_id.is_empty() || !self.allowed_services.contains(client_id) {
            return Err(AuthError::forbidden("service is not allowed"));
        }
        self.claims.stage(ClaimTicket::service(client_id));
        self.correlations.stage(client_id, client_id);
        request.client_id = client_id.to_string();

        self.authorize_or_discard(client_id, request).await
    }

    /// End the session identified by `token`, revoking its token family.
    ///
    /// Expired tokens are accepted so a user can always sign out.
    #[tracing::instrument(skip_all)]
    pub async fn signout(&self, token: &str) -> Result<(), AuthError> {
        let claims = self
            .engine
            .keys()
            .decode_ignoring_expiry(token)
            .map_err(|e| AuthError::unauthorized(e.to_string()))?;
        if claims.sub.is_empty() {
            return Err(AuthError::forbidden("unfound sub"));
        }
        let role = claims
            .role()
            .ok_or_else(|| AuthError::forbidden("unfound role"))?;
        let principal = self
            .store
            .find_principal(role, &claims.sub)
            .await
            .map_err(|e| {
                tracing::debug!(error = %e, sub = %claims.sub, "signout for unknown principal");
                AuthError::forbidden("unknown subject")
            })?;
        self.engine
            .revoke_family(&principal.refresh_token)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to revoke token family");
                AuthError::internal("failed to sign out")
            })?;
        tracing::info!(sub = %claims.sub, role = %role, "signed out");
        Ok(())
    }

    async fn start_user_flow(
        &self,
        email: &str,
        password: &str,
        path: FlowPath,
        mut request: AuthorizeRequest,
    ) -> Result<String, AuthError> {
        self.claims.stage(ClaimTicket::user(email, password, path));
        self.correlations.stage(email, email);
        request.email = Some(email.to_string());

        self.authorize_or_discard(email, request).await
    }

    async fn authorize_or_discard(
        &self,
        identifier: &str,
        request: AuthorizeRequest,
    ) -> Result<String, AuthError> {
        match self.engine.authorize(request).await {
            Ok(code) => Ok(code),
            Err(err) => {
                self.claims.discard(identifier);
                self.correlations.discard_for(identifier);
                Err(match err {
                    GrantError::Hook(hook) => hook,
                    other if other.is_internal() => AuthError::internal("failed to issue code"),
                    other => AuthError::forbidden(other.to_string()),
                })
            }
        }
    }
}

fn require_credentials(email: &str, password: &str) -> Result<(), AuthError> {
    if email.is_empty() || password.is_empty() {
        return Err(AuthError::forbidden("email and password are required"));
    }
    Ok(())
}
