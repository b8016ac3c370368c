//! Shared domain models.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// Identifier of a catalog resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub i64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyId(pub i64);

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable catalog entry for a tradeable resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Catalog identifier.
    pub id: ResourceId,
    /// Display name.
    pub name: String,
    /// Icon glyph or asset name.
    #[serde(default)]
    pub icon: String,
    /// Encyclopedia blurb.
    #[serde(default)]
    pub description: String,
    /// Price of one pack.
    pub price: Money,
    /// Units contained in one pack.
    pub pack_size: u64,
}

/// Company record; `money` is never negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    /// Company identifier.
    pub id: CompanyId,
    /// Company name.
    pub name: String,
    /// Current balance.
    pub money: Money,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last balance change.
    pub updated_at: DateTime<Utc>,
}

/// Units of a resource owned by a company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Owning company.
    pub company_id: CompanyId,
    /// Held resource.
    pub resource_id: ResourceId,
    /// Owned units (unit granularity, not packs).
    pub quantity: u64,
    /// Last quantity change.
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    /// Empty holding for a company/resource pair.
    pub fn empty(company_id: CompanyId, resource_id: ResourceId) -> Self {
        Self {
            company_id,
            resource_id,
            quantity: 0,
            updated_at: Utc::now(),
        }
    }
}

/// Inventory row joined with its catalog details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLine {
    /// Held resource.
    pub resource_id: ResourceId,
    /// Resource display name.
    pub name: String,
    /// Resource icon.
    pub icon: String,
    /// Owned units.
    pub quantity: u64,
    /// Price of one pack.
    pub price: Money,
    /// Units per pack.
    pub pack_size: u64,
}

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Spend money, receive units.
    Buy,
    /// Give up units, receive money.
    Sell,
}

impl Direction {
    /// Lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "buy",
            Direction::Sell => "sell",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" | "b" => Ok(Direction::Buy),
            "sell" | "s" => Ok(Direction::Sell),
            other => Err(format!("unknown trade direction '{other}'")),
        }
    }
}
