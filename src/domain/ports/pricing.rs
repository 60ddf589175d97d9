//! Pricing / billing port

use async_trait::async_trait;

use crate::domain::error::DomainResult;
use crate::domain::transaction::{Transaction, TransactionCost};

/// Computes the cost of a closed transaction from its consumption.
///
/// Invoked by StopTransaction. `Ok(None)` means the transaction is not priced.
#[async_trait]
pub trait PricingProvider: Send + Sync {
    async fn price(&self, transaction: &Transaction) -> DomainResult<Option<TransactionCost>>;
}
