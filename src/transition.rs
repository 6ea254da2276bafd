use orderdesk_backend::OrderStatus;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::error::LifecycleError;

/// What an operator can do to an order's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderAction {
    Advance,
    #[serde(alias = "reject")]
    Cancel,
}

impl OrderAction {
    /// Cancelling cannot be undone, so surfaces ask before doing it.
    pub const fn requires_confirmation(self) -> bool {
        matches!(self, Self::Cancel)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Advance => "advance",
            Self::Cancel => "cancel",
        }
    }
}

impl Display for OrderAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Actions offered for an order in `status`, in display order.
pub fn available_actions(status: OrderStatus) -> Vec<OrderAction> {
    let mut actions = Vec::with_capacity(2);
    if status.next().is_some() {
        actions.push(OrderAction::Advance);
    }
    if status.can_cancel() {
        actions.push(OrderAction::Cancel);
    }
    actions
}

/// Target status of `action` applied to an order in `status`.
pub fn resolve_action(
    status: OrderStatus,
    action: OrderAction,
) -> Result<OrderStatus, LifecycleError> {
    let target = match action {
        OrderAction::Advance => status.next(),
        OrderAction::Cancel => status.can_cancel().then_some(OrderStatus::Cancelled),
    };

    target.ok_or(LifecycleError::ActionNotAvailable { action, status })
}
