//! Per-resource trade status: idle, pending, briefly succeeded.

use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use crate::models::ResourceId;

use super::editor::TradeIntent;

/// Default time a success stays visible before reverting to idle.
pub const DEFAULT_SUCCESS_DISPLAY: Duration = Duration::from_millis(1_500);

/// Visible trade state of one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    /// Nothing in flight.
    Idle,
    /// A request is with the processor.
    Pending,
    /// The last request succeeded; reverts to idle on a timer.
    Succeeded,
}

/// Reasons a submission never reaches the processor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitRejected {
    /// Another request for the resource has not answered yet.
    #[error("a trade for resource {0} is already pending")]
    AlreadyPending(ResourceId),
    /// The intent has no whole pack to move.
    #[error("nothing to trade for resource {0}")]
    NothingToTrade(ResourceId),
    /// No edit session is open for the resource.
    #[error("resource {0} is not being edited")]
    NotEditing(ResourceId),
}

/// Status transitions for one resource.
///
/// `Idle -> Pending` on submit, `Pending -> Succeeded` or `Pending -> Idle` on
/// completion, `Succeeded -> Idle` once the display window has elapsed.
/// Submitting from `Succeeded` is allowed.
#[derive(Debug, Clone)]
pub struct TradeStatusMachine {
    resource_id: ResourceId,
    status: TradeStatus,
    succeeded_at: Option<Instant>,
    display_window: Duration,
}

impl TradeStatusMachine {
    /// Idle machine for `resource_id`.
    pub fn new(resource_id: ResourceId, display_window: Duration) -> Self {
        Self {
            resource_id,
            status: TradeStatus::Idle,
            succeeded_at: None,
            display_window,
        }
    }

    /// Current status.
    pub fn status(&self) -> TradeStatus {
        self.status
    }

    /// True while a request is in flight.
    pub fn is_pending(&self) -> bool {
        self.status == TradeStatus::Pending
    }

    /// Move to `Pending` if `intent` may be sent.
    pub fn submit(&mut self, intent: &TradeIntent) -> Result<(), SubmitRejected> {
        if self.is_pending() {
            return Err(SubmitRejected::AlreadyPending(self.resource_id));
        }
        if !intent.is_submittable() {
            return Err(SubmitRejected::NothingToTrade(self.resource_id));
        }
        self.status = TradeStatus::Pending;
        self.succeeded_at = None;
        Ok(())
    }

    /// Record a processor success. Ignored unless pending.
    pub fn succeed(&mut self, now: Instant) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = TradeStatus::Succeeded;
        self.succeeded_at = Some(now);
        true
    }

    /// Record a processor failure. Ignored unless pending.
    pub fn fail(&mut self) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = TradeStatus::Idle;
        true
    }

    /// Expire a success whose display window has passed.
    pub fn tick(&mut self, now: Instant) -> bool {
        match (self.status, self.succeeded_at) {
            (TradeStatus::Succeeded, Some(at))
                if now.saturating_duration_since(at) >= self.display_window =>
            {
                self.status = TradeStatus::Idle;
                self.succeeded_at = None;
                true
            }
            _ => false,
        }
    }
}
