//! Infrastructure layer - reference collaborators

pub mod authorization;
pub mod locking;
pub mod pricing;
pub mod storage;
pub mod tenant;

pub use authorization::StaticAuthorization;
pub use locking::InMemoryLockManager;
pub use pricing::{NoPricing, ZeroCostPricing};
pub use storage::InMemoryStorage;
pub use tenant::StaticTenantResolver;
