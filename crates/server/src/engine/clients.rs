//! Static client registrar.
//!
//! Clients come from configuration and never change at runtime, so lookups are a
//! plain map read shared behind an `Arc`.

use crate::config::ClientConfig;
use crate::error::GrantError;
use std::collections::HashMap;
use std::sync::Arc;
use subtle::ConstantTimeEq;

#[derive(Clone)]
pub struct RegisteredClient {
    pub id: String,
    pub domain: String,
    secret: String,
    /// Scopes this client may request. Empty means unrestricted.
    scopes: Vec<String>,
}

impl RegisteredClient {
    pub fn new(id: impl Into<String>, secret: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
            domain: domain.into(),
            scopes: Vec::new(),
        }
    }

    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Whether every entry of a comma or space separated `scope` is allowed.
    pub fn allows_scope(&self, scope: &str) -> bool {
        self.scopes.is_empty()
            || scope
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .all(|requested| self.scopes.iter().any(|allowed| allowed == requested))
    }

    /// Whether `uri` lives under this client's registered origin.
    pub fn allows_redirect(&self, uri: &str) -> bool {
        let domain = self.domain.trim_end_matches('/');
        match uri.strip_prefix(domain) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
            None => false,
        }
    }

    fn secret_matches(&self, presented: &str) -> bool {
        self.secret.as_bytes().ct_eq(presented.as_bytes()).into()
    }
}

#[derive(Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<HashMap<String, RegisteredClient>>,
}

impl ClientRegistry {
    pub fn new(clients: impl IntoIterator<Item = RegisteredClient>) -> Self {
        Self {
            clients: Arc::new(clients.into_iter().map(|c| (c.id.clone(), c)).collect()),
        }
    }

    pub fn from_config(clients: &[ClientConfig]) -> Self {
        Self::new(
            clients
                .iter()
                .map(|c| RegisteredClient::new(&c.id, &c.secret, &c.domain).with_scopes(&c.scopes)),
        )
    }

    pub fn get(&self, client_id: &str) -> Option<&RegisteredClient> {
        self.clients.get(client_id)
    }

    /// Check confidential-client credentials presented to the token endpoint.
    pub fn authenticate(
        &self,
        client_id: Option<&str>,
        secret: Option<&str>,
    ) -> Result<&RegisteredClient, GrantError> {
        let (Some(client_id), Some(secret)) = (client_id, secret) else {
            return Err(GrantError::InvalidClient);
        };
        match self.get(client_id) {
            Some(client) if client.secret_matches(secret) => Ok(client),
            _ => Err(GrantError::InvalidClient),
        }
    }

    /// Resolve the redirect URI for a request, defaulting to the client's domain.
    pub fn bound_redirect(
        &self,
        client: &RegisteredClient,
        requested: Option<&str>,
    ) -> Result<String, GrantError> {
        match requested {
            None | Some("") => Ok(client.domain.clone()),
            Some(uri) if client.allows_redirect(uri) => Ok(uri.to_string()),
            Some(_) => Err(GrantError::InvalidRequest(
                "redirect_uri does not match the registered domain".into(),
            )),
        }
    }
}
