use jsonwebtoken::Algorithm;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Minimum length for HMAC signing secrets.
const MIN_SECRET_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// A named HMAC key used to sign one role's tokens.
#[derive(Clone, Deserialize)]
pub struct SigningKeyConfig {
    pub key_id: String,
    pub secret: String,
}

impl fmt::Debug for SigningKeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyConfig")
            .field("key_id", &self.key_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct JwtConfig {
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    /// Key for end-user tokens.
    pub user: SigningKeyConfig,
    /// Key for backend-service tokens.
    pub service: SigningKeyConfig,
}

impl JwtConfig {
    pub fn algorithm(&self) -> Result<Algorithm, ConfigError> {
        match self.algorithm.as_str() {
            "HS256" => Ok(Algorithm::HS256),
            "HS384" => Ok(Algorithm::HS384),
            "HS512" => Ok(Algorithm::HS512),
            other => Err(ConfigError::Validation(format!(
                "jwt.algorithm must be one of HS256, HS384, HS512 (got {other})"
            ))),
        }
    }
}

/// An OAuth2 client allowed to use the authorization and token endpoints.
#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    pub id: String,
    pub secret: String,
    /// Origin every redirect URI of this client must live under.
    pub domain: String,
    /// Scopes the client may request; empty leaves the requested scope unchecked.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("id", &self.id)
            .field("domain", &self.domain)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

/// Upper bound for any configured lifetime: 100 years.
pub const MAX_LIFETIME_SECS: i64 = 100 * 365 * 24 * 3600;

/// Token and code lifetimes, in seconds.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LifetimeConfig {
    pub user_access: i64,
    pub user_refresh: i64,
    pub service_access: i64,
    pub service_refresh: i64,
    pub authorization_code: i64,
}

impl Default for LifetimeConfig {
    fn default() -> Self {
        const HOUR: i64 = 3600;
        const DAY: i64 = 24 * HOUR;
        Self {
            user_access: 2 * HOUR,
            user_refresh: 15 * DAY,
            service_access: 15 * DAY,
            service_refresh: 360 * DAY,
            authorization_code: 600,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TicketConfig {
    /// How long a staged ticket survives if its flow is abandoned.
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for TicketConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

impl TicketConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Upper bound for a single durable-store call.
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,
    pub jwt: JwtConfig,
    /// The browser-facing client whose flows are keyed by the user's email.
    #[serde(default = "default_frontend_client_id")]
    pub frontend_client_id: String,
    /// Backend services allowed to run the `apiauth` flow.
    #[serde(default = "default_allowed_services")]
    pub allowed_services: Vec<String>,
    #[serde(default)]
    pub clients: Vec<ClientConfig>,
    #[serde(default)]
    pub lifetimes: LifetimeConfig,
    #[serde(default)]
    pub tickets: TicketConfig,
}

impl AppConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    /// The service allow-list as an immutable set.
    pub fn allow_list(&self) -> HashSet<String> {
        self.allowed_services.iter().cloned().collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.jwt.algorithm()?;

        for (role, key) in [("user", &self.jwt.user), ("service", &self.jwt.service)] {
            if key.key_id.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "jwt.{role}.key_id must not be empty"
                )));
            }
            if key.secret.len() < MIN_SECRET_LEN {
                return Err(ConfigError::Validation(format!(
                    "jwt.{role}.secret must be at least {MIN_SECRET_LEN} characters"
                )));
            }
        }
        if self.jwt.user.key_id == self.jwt.service.key_id {
            return Err(ConfigError::Validation(
                "jwt.user.key_id and jwt.service.key_id must differ".into(),
            ));
        }

        let registered: HashSet<&str> = self.clients.iter().map(|c| c.id.as_str()).collect();
        if !registered.contains(self.frontend_client_id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "frontend client {} is not listed under clients",
                self.frontend_client_id
            )));
        }
        if let Some(missing) = self
            .allowed_services
            .iter()
            .find(|service| !registered.contains(service.as_str()))
        {
            return Err(ConfigError::Validation(format!(
                "allowed service {missing} is not listed under clients"
            )));
        }

        let l = &self.lifetimes;
        if [
            l.user_access,
            l.user_refresh,
            l.service_access,
            l.service_refresh,
            l.authorization_code,
        ]
        .iter()
        .any(|secs| !(1..=MAX_LIFETIME_SECS).contains(secs))
        {
            return Err(ConfigError::Validation(format!(
                "all lifetimes must be between 1 and {MAX_LIFETIME_SECS} seconds"
            )));
        }
        if self.tickets.ttl_secs == 0 || self.tickets.sweep_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "tickets.ttl_secs and tickets.sweep_interval_secs must be > 0".into(),
            ));
        }
        if self.tickets.ttl_secs > MAX_LIFETIME_SECS as u64 {
            return Err(ConfigError::Validation(format!(
                "tickets.ttl_secs must not exceed {MAX_LIFETIME_SECS}"
            )));
        }
        if self.store_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "store_timeout_secs must be > 0".into(),
            ));
        }

        Ok(())
    }
}

fn default_algorithm() -> String {
    "HS256".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:8079".to_string()
}

fn default_store_timeout_secs() -> u64 {
    5
}

fn default_frontend_client_id() -> String {
    "222222".to_string()
}

fn default_allowed_services() -> Vec<String> {
    ["order", "brokerSvc", "registrySvc"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// The file path can be overridden with `MESH_AUTH_CONFIG`. Any environment variable
/// matching a key path separated by double underscores (e.g. `JWT__USER__SECRET`)
/// overrides the file value.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let path = std::env::var("MESH_AUTH_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let cfg = Config::builder()
        .add_source(File::with_name(&path))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".into(),
            listen_addr: default_listen_addr(),
            store_timeout_secs: 5,
            jwt: JwtConfig {
                algorithm: "HS256".into(),
                user: SigningKeyConfig {
                    key_id: "user-key".into(),
                    secret: "user-secret-0123456789".into(),
                },
                service: SigningKeyConfig {
                    key_id: "service-key".into(),
                    secret: "service-secret-0123456789".into(),
                },
            },
            frontend_client_id: "222222".into(),
            allowed_services: vec!["brokerSvc".into()],
            clients: vec![
                ClientConfig {
                    id: "222222".into(),
                    secret: "22222222".into(),
                    domain: "http://localhost:80".into(),
                    scopes: Vec::new(),
                },
                ClientConfig {
                    id: "brokerSvc".into(),
                    secret: "brokerSvcSecret".into(),
                    domain: "http://localhost:8080".into(),
                    scopes: Vec::new(),
                },
            ],
            lifetimes: LifetimeConfig::default(),
            tickets: TicketConfig::default(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn rejects_unknown_algorithm() {
        let mut cfg = base();
        cfg.jwt.algorithm = "RS256".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_short_secret() {
        let mut cfg = base();
        cfg.jwt.service.secret = "short".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_shared_key_id() {
        let mut cfg = base();
        cfg.jwt.service.key_id = "user-key".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unregistered_allowed_service() {
        let mut cfg = base();
        cfg.allowed_services.push("ghostSvc".into());
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("ghostSvc"));
    }

    #[test]
    fn rejects_unregistered_frontend() {
        let mut cfg = base();
        cfg.frontend_client_id = "999".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_lifetimes() {
        let mut cfg = base();
        cfg.lifetimes.user_refresh = 1_000_000_000_000;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("lifetimes"));

        let mut cfg = base();
        cfg.lifetimes.service_refresh = MAX_LIFETIME_SECS;
        assert!(cfg.validate().is_ok());

        let mut cfg = base();
        cfg.tickets.ttl_secs = u64::MAX;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn default_lifetimes_follow_roles() {
        let l = LifetimeConfig::default();
        assert_eq!(l.user_access, 7200);
        assert_eq!(l.service_access, 15 * 24 * 3600);
        assert!(l.service_refresh > l.user_refresh);
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let rendered = format!("{:?}", base().jwt);
        assert!(!rendered.contains("user-secret"));
        assert!(rendered.contains("user-key"));
    }
}
