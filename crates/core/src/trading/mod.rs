//! Pack-constrained trading.
//!
//! Client-side pieces ([`QuantityEditor`], [`TradeStatusMachine`]) shape a
//! trade; [`TradeProcessor`] is the only place balances and holdings change.

/// Max-buy arithmetic.
pub mod affordability;
/// Target quantity editing and intent derivation.
pub mod editor;
mod error;
/// Authoritative trade execution.
pub mod processor;
/// Per-resource trade status.
pub mod status;

pub use affordability::{assess, assess_or_none, Affordability};
pub use editor::{packs_for_units, BaselineShift, QuantityEditor, TradeIntent};
pub use error::TradeError;
pub use processor::{TradeProcessor, TradeReceipt, TradeRequest};
pub use status::{SubmitRejected, TradeStatus, TradeStatusMachine, DEFAULT_SUCCESS_DISPLAY};
