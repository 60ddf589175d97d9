//! Process-local named locks

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::domain::{DomainError, DomainResult, LockManager, LockToken};

struct Held {
    owner: String,
    expires_at: Instant,
}

/// [`LockManager`] backed by a `DashMap`. Expired locks are taken over on
/// the next acquire.
#[derive(Default)]
pub struct InMemoryLockManager {
    locks: DashMap<String, Held>,
}

impl InMemoryLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, name: &str) -> bool {
        self.locks
            .get(name)
            .map(|held| held.expires_at > Instant::now())
            .unwrap_or(false)
    }
}

#[async_trait]
impl LockManager for InMemoryLockManager {
    async fn acquire(&self, name: &str, ttl: Duration) -> DomainResult<LockToken> {
        let now = Instant::now();
        let owner = Uuid::new_v4().to_string();
        let held = Held {
            owner: owner.clone(),
            expires_at: now + ttl,
        };

        match self.locks.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().expires_at > now {
                    return Err(DomainError::LockUnavailable(name.to_string()));
                }
                entry.insert(held);
            }
            Entry::Vacant(entry) => {
                entry.insert(held);
            }
        }

        Ok(LockToken {
            name: name.to_string(),
            owner,
        })
    }

    async fn release(&self, token: &LockToken) -> DomainResult<bool> {
        Ok(self
            .locks
            .remove_if(&token.name, |_, held| held.owner == token.owner)
            .is_some())
    }
}
