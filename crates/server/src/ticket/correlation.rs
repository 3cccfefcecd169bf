use super::TicketStore;
use crate::error::TicketError;
use crate::model::correlation_key;
use std::time::Duration;

/// Bridges the request that starts a flow and the authorization callback that
/// finishes it: maps a correlation key to the resolved principal id.
///
/// Process-local. Running several instances needs sticky routing per flow.
#[derive(Clone)]
pub struct CorrelationMap {
    tickets: TicketStore<String, String>,
}

impl CorrelationMap {
    pub fn new(ttl: Duration) -> Self {
        Self {
            tickets: TicketStore::new(ttl),
        }
    }

    pub fn set(&self, key: impl Into<String>, principal_id: impl Into<String>) {
        self.tickets.set(key.into(), principal_id.into());
    }

    pub fn get(&self, key: &str) -> Result<String, TicketError> {
        self.tickets.get(&key.to_string())
    }

    pub fn delete(&self, key: &str) -> bool {
        self.tickets.delete(&key.to_string())
    }

    pub fn take_once(&self, key: &str) -> Result<String, TicketError> {
        self.tickets.take_once(&key.to_string())
    }

    pub fn count(&self) -> usize {
        self.tickets.count()
    }

    pub fn reset(&self) {
        self.tickets.reset();
    }

    pub fn sweep(&self) -> usize {
        self.tickets.sweep()
    }

    /// Record that a login started by `client_or_email` resolves to `principal_id`.
    pub fn stage(&self, client_or_email: &str, principal_id: &str) {
        self.set(correlation_key(client_or_email), principal_id);
    }

    /// Consume the entry staged for `client_or_email`.
    pub fn take_for(&self, client_or_email: &str) -> Result<String, TicketError> {
        self.take_once(&correlation_key(client_or_email))
    }

    pub fn discard_for(&self, client_or_email: &str) {
        self.delete(&correlation_key(client_or_email));
    }
}
