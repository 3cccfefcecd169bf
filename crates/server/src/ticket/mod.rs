//! Single-use ephemeral tickets.
//!
//! Both the claim cache and the correlation map sit on [`TicketStore`], a
//! sharded map whose entries carry an expiry. Reads that consume a ticket go
//! through [`TicketStore::take_once`], which removes and returns the entry in one
//! step so a ticket can never be observed by two flows. Abandoned tickets are
//! dropped by [`spawn_sweeper`].

mod claims;
mod correlation;

pub use claims::ClaimCache;
pub use correlation::CorrelationMap;

use crate::error::TicketError;
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

#[derive(Clone)]
struct TicketEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> TicketEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Key/value store with per-entry expiry and an atomic consume operation.
#[derive(Clone)]
pub struct TicketStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    entries: Arc<DashMap<K, TicketEntry<V>>>,
    ttl: Duration,
}

impl<K, V> TicketStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert or replace the ticket for `key`.
    pub fn set(&self, key: K, value: V) {
        self.entries.insert(key, TicketEntry::new(value, self.ttl));
    }

    /// Read without consuming.
    pub fn get(&self, key: &K) -> Result<V, TicketError> {
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => Ok(entry.value.clone()),
            _ => Err(TicketError::NotFound),
        }
    }

    /// Returns whether a ticket was present.
    pub fn delete(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove and return the ticket for `key`.
    ///
    /// Removal happens under the shard lock, so concurrent callers racing for the
    /// same key see exactly one success.
    pub fn take_once(&self, key: &K) -> Result<V, TicketError> {
        match self.entries.remove(key) {
            Some((_, entry)) if !entry.is_expired() => Ok(entry.value),
            _ => Err(TicketError::NotFound),
        }
    }

    /// Number of live tickets.
    pub fn count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| !entry.is_expired())
            .count()
    }

    pub fn reset(&self) {
        self.entries.clear();
    }

    /// Drop expired tickets, returning how many were removed.
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(self.entries.len())
    }
}

/// Periodically sweep both ticket stores until the runtime shuts down.
pub fn spawn_sweeper(
    claims: ClaimCache,
    correlations: CorrelationMap,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let claims_removed = claims.sweep();
            let correlations_removed = correlations.sweep();
            if claims_removed + correlations_removed > 0 {
                tracing::debug!(
                    claims_removed,
                    correlations_removed,
                    "swept abandoned tickets"
                );
            }
        }
    })
}
