//! Authorization port

use async_trait::async_trait;

use crate::domain::error::DomainResult;

/// Outcome of an idTag lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdTagStatus {
    Accepted,
    Blocked,
    Expired,
    Invalid,
    ConcurrentTx,
}

impl IdTagStatus {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Resolves a presented tag to an authorization decision.
///
/// The policy (users, badges, roaming tokens) lives behind this trait.
#[async_trait]
pub trait Authorization: Send + Sync {
    async fn authorize(
        &self,
        tenant_id: &str,
        charge_box_id: &str,
        id_tag: &str,
    ) -> DomainResult<IdTagStatus>;
}
