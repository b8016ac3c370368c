//! Trade rejection reasons.

use thiserror::Error;

use crate::{
    models::{CompanyId, ResourceId},
    money::{Money, MoneyError},
};

/// Reasons a trade, or a lookup feeding one, is refused.
///
/// The processor returns these before touching shared state, so a rejected
/// trade never leaves a partial mutation behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TradeError {
    /// Malformed request (non-positive pack count, bad company name, ...).
    #[error("invalid request: {0}")]
    Validation(String),
    /// Buying would take the balance below zero.
    #[error("insufficient funds: need {required}, have {available}")]
    InsufficientFunds {
        /// Cost of the requested packs.
        required: Money,
        /// Balance at the time of the check.
        available: Money,
    },
    /// Selling would take the holding below zero.
    #[error("insufficient inventory: need {required} units, have {available}")]
    InsufficientInventory {
        /// Units the sell would remove.
        required: u64,
        /// Units currently held.
        available: u64,
    },
    /// Catalog entry with a non-positive price or pack size.
    #[error("resource {resource} is not tradeable: {reason}")]
    InvalidResource {
        /// Offending catalog entry.
        resource: ResourceId,
        /// Which field is out of range.
        reason: String,
    },
    /// No company with this id.
    #[error("company {0} not found")]
    CompanyNotFound(CompanyId),
    /// No catalog entry with this id.
    #[error("resource {0} not found")]
    ResourceNotFound(ResourceId),
    /// Cost or balance arithmetic failed.
    #[error(transparent)]
    Money(#[from] MoneyError),
    /// The worker running the trade went away before reporting back.
    #[error("trade task aborted: {0}")]
    Aborted(String),
}

impl TradeError {
    /// True for unknown company or resource.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            TradeError::CompanyNotFound(_) | TradeError::ResourceNotFound(_)
        )
    }

    /// True for the expected business-rule rejections.
    pub fn is_business_rejection(&self) -> bool {
        matches!(
            self,
            TradeError::InsufficientFunds { .. } | TradeError::InsufficientInventory { .. }
        )
    }
}
