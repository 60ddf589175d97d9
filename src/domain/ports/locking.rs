//! Named lock port
//!
//! Consumed by callers above the protocol engine (reservations, remote start,
//! scheduled tasks) to serialize business operations per connector. The engine
//! itself never takes these locks.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::error::DomainResult;

/// Proof of ownership returned by [`LockManager::acquire`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    pub name: String,
    pub owner: String,
}

#[async_trait]
pub trait LockManager: Send + Sync {
    /// Acquire `name` for `ttl`. Fails with `LockUnavailable` while another
    /// owner holds an unexpired lock.
    async fn acquire(&self, name: &str, ttl: Duration) -> DomainResult<LockToken>;

    /// Release a lock. Returns `false` if the token no longer owns it.
    async fn release(&self, token: &LockToken) -> DomainResult<bool>;
}
