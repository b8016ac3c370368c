//! Max-buy arithmetic for a balance against a pack price.

use serde::Serialize;
use tracing::error;

use crate::{models::Resource, money::Money};

use super::TradeError;

/// Result of an affordability check for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Affordability {
    /// `floor(balance / price)`.
    pub max_affordable_packs: u64,
    /// `baseline + max_affordable_packs × pack_size`; upper bound for buy targets.
    pub buy_ceiling_quantity: u64,
}

impl Affordability {
    /// Nothing affordable: the ceiling sits at the baseline.
    pub fn none(baseline: u64) -> Self {
        Self {
            max_affordable_packs: 0,
            buy_ceiling_quantity: baseline,
        }
    }
}

/// Compute how many packs of `resource` the balance covers and the resulting ceiling.
///
/// Fails with [`TradeError::InvalidResource`] when the price or pack size is not
/// positive; callers that only need a bound should use [`assess_or_none`].
pub fn assess(
    balance: Money,
    resource: &Resource,
    baseline: u64,
) -> Result<Affordability, TradeError> {
    if resource.pack_size == 0 {
        return Err(TradeError::InvalidResource {
            resource: resource.id,
            reason: "pack size must be positive".to_string(),
        });
    }
    let max_affordable_packs = balance.whole_multiples_of(resource.price).ok_or_else(|| {
        TradeError::InvalidResource {
            resource: resource.id,
            reason: format!("price {} must be positive", resource.price),
        }
    })?;

    let buy_ceiling_quantity = max_affordable_packs
        .checked_mul(resource.pack_size)
        .and_then(|units| units.checked_add(baseline))
        .unwrap_or(u64::MAX);

    Ok(Affordability {
        max_affordable_packs,
        buy_ceiling_quantity,
    })
}

/// Like [`assess`] but reports zero affordable packs on a catalog integrity error.
pub fn assess_or_none(balance: Money, resource: &Resource, baseline: u64) -> Affordability {
    match assess(balance, resource, baseline) {
        Ok(affordability) => affordability,
        Err(err) => {
            error!(resource = %resource.id, %err, "affordability check failed");
            Affordability::none(baseline)
        }
    }
}
