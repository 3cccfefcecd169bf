use super::TicketStore;
use crate::error::TicketError;
use crate::model::ClaimTicket;
use std::time::Duration;

/// Pending credentials keyed by principal identifier (email or service id).
#[derive(Clone)]
pub struct ClaimCache {
    tickets: TicketStore<String, ClaimTicket>,
}

impl ClaimCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            tickets: TicketStore::new(ttl),
        }
    }

    /// Stage a ticket under its own identifier, replacing any earlier attempt.
    pub fn stage(&self, ticket: ClaimTicket) {
        self.tickets.set(ticket.identifier.clone(), ticket);
    }

    pub fn take_once(&self, identifier: &str) -> Result<ClaimTicket, TicketError> {
        self.tickets.take_once(&identifier.to_string())
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.tickets.get(&identifier.to_string()).is_ok()
    }

    pub fn discard(&self, identifier: &str) {
        self.tickets.delete(&identifier.to_string());
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
}
