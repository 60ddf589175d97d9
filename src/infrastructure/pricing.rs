//! Reference pricing providers

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{DomainResult, PricingProvider, Transaction, TransactionCost};

/// Leaves every transaction unpriced.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPricing;

#[async_trait]
impl PricingProvider for NoPricing {
    async fn price(&self, _transaction: &Transaction) -> DomainResult<Option<TransactionCost>> {
        Ok(None)
    }
}

/// Prices every transaction at zero in the configured currency.
#[derive(Debug, Clone)]
pub struct ZeroCostPricing {
    currency: String,
}

impl ZeroCostPricing {
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
        }
    }
}

#[async_trait]
impl PricingProvider for ZeroCostPricing {
    async fn price(&self, _transaction: &Transaction) -> DomainResult<Option<TransactionCost>> {
        Ok(Some(TransactionCost {
            amount: Decimal::ZERO,
            currency: self.currency.clone(),
        }))
    }
}
