//! The identity core: credential intake, the grant-engine hooks and the token
//! service, wired together over shared stores.

pub mod hooks;
pub mod intake;
pub mod tokens;

pub use hooks::IdentityHooks;
pub use intake::CredentialIntake;
pub use tokens::{Permission, PermissionGrant, TokenService};

use crate::config::{AppConfig, ConfigError};
use crate::engine::{ClientRegistry, DbTokenStore, GrantEngine, KeyRing, Lifetimes};
use crate::store::IdentityStore;
use crate::ticket::{ClaimCache, CorrelationMap};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Everything the HTTP layer needs, cheap to clone into handler state.
#[derive(Clone)]
pub struct AuthServices {
    pub intake: CredentialIntake,
    pub tokens: TokenService,
    pub claims: ClaimCache,
    pub correlations: CorrelationMap,
    pub store: IdentityStore,
    pub frontend_client_id: Arc<str>,
}

impl AuthServices {
    pub fn new(db: Arc<DatabaseConnection>, config: &AppConfig) -> Result<Self, ConfigError> {
        let keys = KeyRing::from_config(&config.jwt)?;
        let allowed_services = Arc::new(config.allow_list());
        let store = IdentityStore::new(db.clone(), config.store_timeout());
        let claims = ClaimCache::new(config.tickets.ttl());
        let correlations = CorrelationMap::new(config.tickets.ttl());

        let hooks = IdentityHooks::new(
            store.clone(),
            claims.clone(),
            correlations.clone(),
            keys.clone(),
            config.frontend_client_id.clone(),
            allowed_services.clone(),
        );
        let engine = Arc::new(GrantEngine::new(
            ClientRegistry::from_config(&config.clients),
            keys,
            Lifetimes::from(&config.lifetimes),
            Arc::new(DbTokenStore::new(db, config.store_timeout())),
            Arc::new(hooks),
        ));

        Ok(Self {
            intake: CredentialIntake::new(
                engine.clone(),
                store.clone(),
                claims.clone(),
                correlations.clone(),
                allowed_services,
            ),
            tokens: TokenService::new(engine, store.clone()),
            claims,
            correlations,
            store,
            frontend_client_id: Arc::from(config.frontend_client_id.as_str()),
        })
    }
}
