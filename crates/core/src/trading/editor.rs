//! Reconciles an in-progress target quantity against the owned baseline.

use serde::Serialize;

use crate::{
    models::{CompanyId, Direction, Resource, ResourceId},
    money::Money,
};

use super::{
    affordability::{self, Affordability},
    processor::TradeRequest,
    TradeError,
};

/// Whole packs needed to cover `units`; a partial pack counts as a full one.
///
/// `pack_size` must be positive; zero yields zero packs.
pub fn packs_for_units(units: u64, pack_size: u64) -> u64 {
    if pack_size == 0 {
        return 0;
    }
    units.div_ceil(pack_size)
}

/// Trade derived from a target quantity versus the baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeIntent {
    /// Resource being edited.
    pub resource_id: ResourceId,
    /// Owned quantity at the start of the edit session.
    pub original_quantity: u64,
    /// Quantity the user proposes to own.
    pub target_quantity: u64,
    /// `None` when target and baseline agree.
    pub direction: Option<Direction>,
    /// `|target − baseline|`.
    pub units: u64,
    /// Packs that will actually be submitted.
    pub pack_count: u64,
    /// Units per pack for this resource.
    pub pack_size: u64,
    /// `pack_count × price`: cost of a buy or proceeds of a sell.
    pub cost: Money,
}

impl TradeIntent {
    /// Signed difference `target − baseline`.
    pub fn diff(&self) -> i128 {
        i128::from(self.target_quantity) - i128::from(self.original_quantity)
    }

    /// Units moved by the submitted packs.
    pub fn units_moved(&self) -> u64 {
        self.pack_count.saturating_mul(self.pack_size)
    }

    /// Owned quantity once the submitted packs settle.
    pub fn resulting_quantity(&self) -> u64 {
        match self.direction {
            Some(Direction::Buy) => self.original_quantity.saturating_add(self.units_moved()),
            Some(Direction::Sell) => self.original_quantity.saturating_sub(self.units_moved()),
            None => self.original_quantity,
        }
    }

    /// True when there is at least one whole pack to trade.
    pub fn is_submittable(&self) -> bool {
        self.direction.is_some() && self.pack_count > 0
    }

    /// Request for the processor, if there is anything to trade.
    pub fn to_request(&self, company_id: CompanyId) -> Option<TradeRequest> {
        let direction = self.direction?;
        if self.pack_count == 0 {
            return None;
        }
        Some(TradeRequest {
            company_id,
            resource_id: self.resource_id,
            direction,
            pack_count: self.pack_count,
        })
    }
}

/// Result of moving the baseline to a new canonical quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BaselineShift {
    /// Baseline before the refresh.
    pub previous_baseline: u64,
    /// Baseline after the refresh.
    pub baseline: u64,
    /// Target after the refresh.
    pub target: u64,
    /// Whether the target had to be lowered to the new buy ceiling.
    pub target_clamped: bool,
}

impl BaselineShift {
    /// True when the canonical quantity differed from the old baseline.
    pub fn changed(&self) -> bool {
        self.previous_baseline != self.baseline
    }
}

/// Edit state for one resource: baseline, target and the affordability ceiling.
#[derive(Debug, Clone)]
pub struct QuantityEditor {
    resource: Resource,
    baseline: u64,
    target: u64,
    affordability: Option<Affordability>,
}

impl QuantityEditor {
    /// Start editing at the owned `baseline`, with no balance ceiling yet.
    pub fn new(resource: Resource, baseline: u64) -> Result<Self, TradeError> {
        if resource.pack_size == 0 {
            return Err(TradeError::InvalidResource {
                resource: resource.id,
                reason: "pack size must be positive".to_string(),
            });
        }
        if !resource.price.is_positive() {
            return Err(TradeError::InvalidResource {
                resource: resource.id,
                reason: format!("price {} must be positive", resource.price),
            });
        }
        Ok(Self {
            resource,
            baseline,
            target: baseline,
            affordability: None,
        })
    }

    /// Builder form of [`QuantityEditor::set_balance`].
    pub fn with_balance(mut self, balance: Money) -> Self {
        self.set_balance(balance);
        self
    }

    /// Recompute the buy ceiling for `balance`, lowering the target if it no longer fits.
    pub fn set_balance(&mut self, balance: Money) -> bool {
        let affordability = affordability::assess_or_none(balance, &self.resource, self.baseline);
        self.affordability = Some(affordability);
        if self.target > affordability.buy_ceiling_quantity {
            self.target = affordability.buy_ceiling_quantity;
            return true;
        }
        false
    }

    /// Resource under edit.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Owned quantity the diff is measured against.
    pub fn baseline(&self) -> u64 {
        self.baseline
    }

    /// Proposed quantity.
    pub fn target(&self) -> u64 {
        self.target
    }

    /// Latest affordability, if a balance has been supplied.
    pub fn affordability(&self) -> Option<Affordability> {
        self.affordability
    }

    /// Highest target reachable with the known balance.
    pub fn buy_ceiling(&self) -> Option<u64> {
        self.affordability.map(|a| a.buy_ceiling_quantity)
    }

    /// Set the target, clamped to `0..=ceiling`. Returns the stored target.
    pub fn set_target(&mut self, new_target: i64) -> u64 {
        let mut target = u64::try_from(new_target).unwrap_or(0);
        if let Some(ceiling) = self.buy_ceiling() {
            target = target.min(ceiling);
        }
        self.target = target;
        target
    }

    /// Whether a one-pack step in `direction` is allowed.
    pub fn can_step(&self, direction: Direction) -> bool {
        match direction {
            Direction::Sell => self.target > 0,
            Direction::Buy => match self.target.checked_add(self.resource.pack_size) {
                Some(next) => self.buy_ceiling().map_or(true, |ceiling| next <= ceiling),
                None => false,
            },
        }
    }

    /// Move the target by one pack. Selling stops at zero; buying stops at the ceiling.
    pub fn step(&mut self, direction: Direction) -> bool {
        if !self.can_step(direction) {
            return false;
        }
        self.target = match direction {
            Direction::Buy => self.target + self.resource.pack_size,
            Direction::Sell => self.target.saturating_sub(self.resource.pack_size),
        };
        true
    }

    /// Whether there is anything owned to sell.
    pub fn can_sell_all(&self) -> bool {
        self.baseline > 0
    }

    /// Propose selling everything.
    pub fn sell_all(&mut self) {
        self.target = 0;
    }

    /// Whether the target is still below the buy ceiling.
    pub fn can_buy_max(&self) -> bool {
        self.buy_ceiling().is_some_and(|ceiling| self.target < ceiling)
    }

    /// Jump the target to the buy ceiling.
    pub fn set_max_buy(&mut self) -> bool {
        match self.buy_ceiling() {
            Some(ceiling) if self.target < ceiling => {
                self.target = ceiling;
                true
            }
            _ => false,
        }
    }

    /// Drop the pending edit.
    pub fn reset(&mut self) {
        self.target = self.baseline;
    }

    /// Adopt an externally changed canonical quantity, keeping the user's target.
    pub fn resync(&mut self, canonical_quantity: u64, balance: Money) -> BaselineShift {
        let previous_baseline = self.baseline;
        self.baseline = canonical_quantity;
        let target_clamped = self.set_balance(balance);
        BaselineShift {
            previous_baseline,
            baseline: self.baseline,
            target: self.target,
            target_clamped,
        }
    }

    /// Settle after a successful trade: baseline and target both become canonical.
    pub fn commit(&mut self, canonical_quantity: u64, balance: Money) {
        self.baseline = canonical_quantity;
        self.target = canonical_quantity;
        self.set_balance(balance);
    }

    /// Derive the trade for the current target.
    ///
    /// Buys round the unit count up to whole packs. Sells are additionally capped at
    /// the whole packs held (`floor(baseline / pack_size)`), so a sell intent never
    /// asks for more units than are owned.
    pub fn intent(&self) -> Result<TradeIntent, TradeError> {
        let pack_size = self.resource.pack_size;
        let (direction, units) = if self.target > self.baseline {
            (Some(Direction::Buy), self.target - self.baseline)
        } else if self.target < self.baseline {
            (Some(Direction::Sell), self.baseline - self.target)
        } else {
            (None, 0)
        };

        let pack_count = match direction {
            Some(Direction::Buy) => packs_for_units(units, pack_size),
            Some(Direction::Sell) => {
                packs_for_units(units, pack_size).min(self.baseline / pack_size)
            }
            None => 0,
        };
        let cost = self.resource.price.checked_mul(pack_count)?;

        Ok(TradeIntent {
            resource_id: self.resource.id,
            original_quantity: self.baseline,
            target_quantity: self.target,
            direction,
            units,
            pack_count,
            pack_size,
            cost,
        })
    }
}
