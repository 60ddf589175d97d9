//! Configured tenant table

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::{DomainResult, TenantResolver};

/// Resolves tenant subdomains from a fixed map (subdomain → tenant id).
///
/// Subdomains are matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct StaticTenantResolver {
    tenants: HashMap<String, String>,
}

impl StaticTenantResolver {
    pub fn new(tenants: HashMap<String, String>) -> Self {
        Self {
            tenants: tenants
                .into_iter()
                .map(|(subdomain, id)| (subdomain.to_ascii_lowercase(), id))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}

#[async_trait]
impl TenantResolver for StaticTenantResolver {
    async fn resolve(&self, subdomain: &str) -> DomainResult<Option<String>> {
        Ok(self.tenants.get(&subdomain.to_ascii_lowercase()).cloned())
    }
}
