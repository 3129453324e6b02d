//! Merchandise orders.

use crate::ids::{EventId, OrderId, ParticipantId, TicketId};
use crate::ticket::Ticket;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Awaiting the organizer's decision
    Pending,
    /// Approved; carries a ticket
    Approved,
    /// Rejected; the participant may order again
    Rejected,
}

impl OrderStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Parse status from database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Whether the order blocks the participant from ordering again.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The organizer's verdict on a pending order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderDecision {
    /// Accept payment, issue a ticket, take stock
    Approved,
    /// Decline; no ticket
    Rejected,
}

impl From<OrderDecision> for OrderStatus {
    fn from(decision: OrderDecision) -> Self {
        match decision {
            OrderDecision::Approved => Self::Approved,
            OrderDecision::Rejected => Self::Rejected,
        }
    }
}

/// Which variant of the item is being bought.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariantChoice {
    /// Size label
    #[serde(default)]
    pub size: Option<String>,
    /// Colour label
    #[serde(default)]
    pub color: Option<String>,
}

impl VariantChoice {
    /// A choice by size and colour.
    #[must_use]
    pub fn new(size: Option<&str>, color: Option<&str>) -> Self {
        Self {
            size: size.map(str::to_string),
            color: color.map(str::to_string),
        }
    }
}

/// A merchandise order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order identifier
    pub id: OrderId,
    /// Merchandise event
    pub event_id: EventId,
    /// Buyer
    pub participant_id: ParticipantId,
    /// Chosen variant
    pub variant: VariantChoice,
    /// Units ordered
    pub quantity: u32,
    /// Reference to the uploaded payment proof
    pub proof_ref: String,
    /// Current status
    pub status: OrderStatus,
    /// Ticket, present only once approved
    pub ticket_id: Option<TicketId>,
    /// Scannable ticket reference, present only once approved
    pub qr_reference: Option<String>,
    /// When the order was approved or rejected
    pub decided_at: Option<DateTime<Utc>>,
    /// When the order was submitted
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// A pending order.
    #[must_use]
    pub fn pending(
        event_id: EventId,
        participant_id: ParticipantId,
        variant: VariantChoice,
        quantity: u32,
        proof_ref: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            event_id,
            participant_id,
            variant,
            quantity,
            proof_ref,
            status: OrderStatus::Pending,
            ticket_id: None,
            qr_reference: None,
            decided_at: None,
            created_at: now,
        }
    }

    /// The ticket on an approved order.
    #[must_use]
    pub fn ticket(&self) -> Option<Ticket> {
        match (&self.ticket_id, &self.qr_reference) {
            (Some(ticket_id), Some(qr_reference)) => Some(Ticket {
                ticket_id: ticket_id.clone(),
                qr_reference: qr_reference.clone(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rejected_orders_are_inactive() {
        assert!(OrderStatus::Pending.is_active());
        assert!(OrderStatus::Approved.is_active());
        assert!(!OrderStatus::Rejected.is_active());
    }

    #[test]
    fn pending_order_has_no_ticket() {
        let order = Order::pending(
            EventId::new(),
            ParticipantId::new(),
            VariantChoice::new(Some("M"), None),
            1,
            "proof.png".to_string(),
            Utc::now(),
        );
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.ticket().is_none());
    }

    #[test]
    fn decision_maps_to_status() {
        assert_eq!(OrderStatus::from(OrderDecision::Approved), OrderStatus::Approved);
        assert_eq!(OrderStatus::from(OrderDecision::Rejected), OrderStatus::Rejected);
    }
}
