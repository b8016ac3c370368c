#![warn(clippy::all, missing_docs)]

//! Core trading engine for Your Own Boss.
//!
//! Companies buy and sell catalog resources in whole packs. This crate hosts
//! the fixed-point money type, the resource catalog, the company ledger with
//! its per-company critical section, the trade processor, the client-side
//! quantity editor and trade desk, and configuration loading.

pub mod catalog;
pub mod config;
pub mod ledger;
pub mod models;
pub mod money;
pub mod session;
pub mod trading;

pub use catalog::Catalog;
pub use config::AppConfig;
pub use ledger::{Ledger, SnapshotStore};
pub use models::{Company, CompanyId, Direction, InventoryItem, InventoryLine, Resource, ResourceId};
pub use money::{Money, MoneyError};
pub use session::{DeskError, TradeDesk};
pub use trading::{
    QuantityEditor, SubmitRejected, TradeError, TradeIntent, TradeProcessor, TradeReceipt,
    TradeRequest, TradeStatus,
};
