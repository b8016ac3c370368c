//! Client-side trading session for one company.

mod desk;

pub use desk::{DeskError, TradeDesk};
