//! Tenant resolution port

use async_trait::async_trait;

use crate::domain::error::DomainResult;

/// Maps the tenant subdomain found in the connection URL to a tenant id.
#[async_trait]
pub trait TenantResolver: Send + Sync {
    /// `Ok(None)` means the subdomain is unknown and the connection must be refused.
    async fn resolve(&self, subdomain: &str) -> DomainResult<Option<String>>;
}
