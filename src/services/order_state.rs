//! Order lifecycle.
//!
//! ```text
//! PENDING --action required--> REQUIRE_CLIENT_CONFIRMATION --succeeded--> PAID
//!                                   |        ^                  \
//!                                   +--------+ (resumed)         +--failed--> destroyed
//! ```

use crate::services::error::SettlementError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    RequireClientConfirmation,
    Paid,
}

/// Something that happened to an order's payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEvent {
    /// The provider intent needs the payer to act (redirect).
    ActionRequired,
    ConfirmationSucceeded,
    ConfirmationFailed,
}

/// Where an order ends up after a legal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderTransition {
    Status(OrderStatus),
    Destroyed,
}

impl OrderStatus {
    pub fn to_db_status(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::RequireClientConfirmation => "REQUIRE_CLIENT_CONFIRMATION",
            OrderStatus::Paid => "PAID",
        }
    }

    pub fn from_db_status(status: &str) -> Option<Self> {
        match status {
            "PENDING" => Some(OrderStatus::Pending),
            "REQUIRE_CLIENT_CONFIRMATION" => Some(OrderStatus::RequireClientConfirmation),
            "PAID" => Some(OrderStatus::Paid),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Paid)
    }

    /// Only orders waiting on the payer's redirect can be confirmed.
    pub fn accepts_confirmation(&self) -> bool {
        matches!(self, OrderStatus::RequireClientConfirmation)
    }

    pub fn transition(&self, event: OrderEvent) -> Result<OrderTransition, SettlementError> {
        use OrderEvent::*;
        use OrderStatus::*;

        match (self, event) {
            (Pending, ActionRequired) | (RequireClientConfirmation, ActionRequired) => {
                Ok(OrderTransition::Status(RequireClientConfirmation))
            }
            (RequireClientConfirmation, ConfirmationSucceeded) => {
                Ok(OrderTransition::Status(Paid))
            }
            (RequireClientConfirmation, ConfirmationFailed) => Ok(OrderTransition::Destroyed),
            (from, event) => Err(SettlementError::IllegalTransition { from: *from, event }),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_status())
    }
}

impl fmt::Display for OrderEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OrderEvent::ActionRequired => "action_required",
            OrderEvent::ConfirmationSucceeded => "confirmation_succeeded",
            OrderEvent::ConfirmationFailed => "confirmation_failed",
        };
        f.write_str(label)
    }
}
