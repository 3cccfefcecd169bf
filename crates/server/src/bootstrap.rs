//! Startup authentication for backend services.
//!
//! A service runs the `apiauth` flow once when it boots and reuses the
//! long-lived access token for every outbound call.

use crate::api::session::CodeResponse;
use crate::engine::pkce;
use crate::model::Role;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("authorization server answered {status}: {body}")]
    Rejected { status: StatusCode, body: String },
    #[error("could not generate a PKCE verifier: {0}")]
    Entropy(String),
    #[error("no access token cached; call authenticate first")]
    NotAuthenticated,
}

#[derive(Clone, Debug)]
pub struct ServiceCredentials {
    pub service_id: String,
    pub secret: String,
    pub redirect_uri: String,
    pub scope: String,
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

#[derive(Clone)]
pub struct ServiceAuthenticator {
    http: Client,
    base_url: String,
    credentials: ServiceCredentials,
    retry: RetryPolicy,
    token: Arc<RwLock<Option<String>>>,
}

impl ServiceAuthenticator {
    pub fn new(base_url: impl Into<String>, credentials: ServiceCredentials) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            retry: RetryPolicy::default(),
            token: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run the flow, retrying on failure, and cache the resulting access token.
    #[tracing::instrument(skip(self), fields(service_id = %self.credentials.service_id))]
    pub async fn authenticate(&self) -> Result<String, BootstrapError> {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.attempt().await {
                Ok(token) => {
                    *self.token.write().await = Some(token.clone());
                    tracing::info!(attempt, "service authenticated");
                    return Ok(token);
                }
                Err(e) if attempt < attempts => {
                    tracing::warn!(attempt, error = %e, "service authentication failed, retrying");
                    tokio::time::sleep(self.retry.delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(attempt, error = %e, "service authentication failed");
                    return Err(e);
                }
            }
        }
    }

    /// The cached access token.
    pub async fn access_token(&self) -> Result<String, BootstrapError> {
        self.token
            .read()
            .await
            .clone()
            .ok_or(BootstrapError::NotAuthenticated)
    }

    async fn attempt(&self) -> Result<String, BootstrapError> {
        let verifier =
            pkce::generate_verifier().map_err(|e| BootstrapError::Entropy(e.to_string()))?;
        let challenge = pkce::s256_challenge(&verifier);
        let creds = &self.credentials;

        let response = self
            .http
            .post(format!("{}/v1/apiauth", self.base_url))
            .query(&[
                ("client_id", creds.service_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", creds.redirect_uri.as_str()),
                ("scope", creds.scope.as_str()),
                ("code_challenge", challenge.as_str()),
                ("code_challenge_method", "S256"),
            ])
            .form(&[("client_id", creds.service_id.as_str())])
            .send()
            .await?;
        let CodeResponse { code } = checked(response).await?.json().await?;

        let response = self
            .http
            .post(format!("{}/v1/oauth/token", self.base_url))
            .basic_auth(&creds.service_id, Some(&creds.secret))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("sub", creds.service_id.as_str()),
                ("code_verifier", verifier.as_str()),
                ("redirect_uri", creds.redirect_uri.as_str()),
                ("role", Role::ApiServer.as_str()),
            ])
            .send()
            .await?;
        Ok(checked(response).await?.json::<String>().await?)
    }
}

async fn checked(response: reqwest::Response) -> Result<reqwest::Response, BootstrapError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BootstrapError::Rejected { status, body })
}
