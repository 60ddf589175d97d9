//! Static tag list authorizer

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{Authorization, DomainResult, IdTagStatus};

/// Accepts a fixed set of tags and blocks another.
///
/// Any tag in neither list is `Invalid`. A tag present in both is blocked.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthorization {
    accepted: HashSet<String>,
    blocked: HashSet<String>,
}

impl StaticAuthorization {
    pub fn new(accepted: HashSet<String>, blocked: HashSet<String>) -> Self {
        Self { accepted, blocked }
    }

    pub fn from_lists<I, S>(accepted: I, blocked: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            accepted.into_iter().map(Into::into).collect(),
            blocked.into_iter().map(Into::into).collect(),
        )
    }

    fn status_of(&self, id_tag: &str) -> IdTagStatus {
        if self.blocked.contains(id_tag) {
            IdTagStatus::Blocked
        } else if self.accepted.contains(id_tag) {
            IdTagStatus::Accepted
        } else {
            IdTagStatus::Invalid
        }
    }
}

#[async_trait]
impl Authorization for StaticAuthorization {
    async fn authorize(
        &self,
        tenant_id: &str,
        charge_box_id: &str,
        id_tag: &str,
    ) -> DomainResult<IdTagStatus> {
        let status = self.status_of(id_tag);
        debug!(tenant_id, charge_point_id = charge_box_id, id_tag, ?status, "Tag lookup");
        Ok(status)
    }
}
