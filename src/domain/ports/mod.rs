//! Collaborator ports consumed by the protocol engine

pub mod authorization;
pub mod locking;
pub mod pricing;
pub mod storage;
pub mod tenant;

pub use authorization::{Authorization, IdTagStatus};
pub use locking::{LockManager, LockToken};
pub use pricing::PricingProvider;
pub use storage::{DataTransferRecord, Storage};
pub use tenant::TenantResolver;
