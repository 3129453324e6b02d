//! Error taxonomy for every engine operation.
//!
//! Every failure is a normal, typed outcome. Precondition failures map to one
//! of the domain kinds; only [`EngineError::Storage`] signals an
//! infrastructure problem.

use crate::event::{EventStatus, EventType};
use crate::ids::{EventId, OrderId, ParticipantId, TeamId};
use crate::order::OrderStatus;
use crate::store::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by the engine's public operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The referenced event, team, order or invite code does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record that was looked up
        entity: &'static str,
        /// The identifier that failed to resolve
        id: String,
    },

    /// The caller is not allowed to perform this operation.
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Forbidden field edit or status move for the current state.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// The event is not accepting registrations in its current status.
    #[error("Registration is closed for event {event_id} (status: {status:?})")]
    RegistrationClosed {
        /// Event that was targeted
        event_id: EventId,
        /// Status observed when the request was evaluated
        status: EventStatus,
    },

    /// The registration deadline is in the past.
    #[error("Registration deadline passed at {deadline}")]
    DeadlinePassed {
        /// The event's registration deadline
        deadline: DateTime<Utc>,
    },

    /// The participant already holds a registration (or an active order) for the event.
    #[error("Participant {participant_id} is already registered for event {event_id}")]
    AlreadyRegistered {
        /// Event that was targeted
        event_id: EventId,
        /// Participant that already holds a record
        participant_id: ParticipantId,
    },

    /// No seats left.
    #[error("Event {event_id} is at capacity ({limit} seats)")]
    CapacityExceeded {
        /// Event that was targeted
        event_id: EventId,
        /// Registration limit at the time of the check
        limit: u32,
    },

    /// The operation does not apply to this kind of event.
    #[error("Operation requires {expected} event, but event {event_id} is {actual}")]
    WrongEventType {
        /// Event that was targeted
        event_id: EventId,
        /// What the operation needs
        expected: &'static str,
        /// What the event actually is
        actual: String,
    },

    /// The participant is already a member of this team.
    #[error("Participant {participant_id} is already a member of team {team_id}")]
    AlreadyMember {
        /// Team that was targeted
        team_id: TeamId,
        /// The participant
        participant_id: ParticipantId,
    },

    /// The participant already belongs to another team for the same event.
    #[error("Participant {participant_id} already belongs to a team for event {event_id}")]
    AlreadyInOtherTeam {
        /// Event the teams belong to
        event_id: EventId,
        /// The participant
        participant_id: ParticipantId,
    },

    /// The team has no room left.
    #[error("Team {team_id} is already full")]
    TeamFull {
        /// Team that was targeted
        team_id: TeamId,
    },

    /// The order was already approved or rejected.
    #[error("Order {order_id} was already processed (status: {status:?})")]
    AlreadyProcessed {
        /// Order that was targeted
        order_id: OrderId,
        /// Status found on the order
        status: OrderStatus,
    },

    /// A request value is malformed (missing proof, unknown variant, bad limit...).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The requested merchandise variant has no stock left.
    #[error("Requested variant of event {event_id} is out of stock")]
    OutOfStock {
        /// Merchandise event
        event_id: EventId,
    },

    /// The storage collaborator failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Stable, transport-agnostic classification of an [`EngineError`].
///
/// Calling layers map these to HTTP status codes or RPC error codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// See [`EngineError::NotFound`]
    NotFound,
    /// See [`EngineError::Unauthorized`]
    Unauthorized,
    /// See [`EngineError::InvalidTransition`]
    InvalidTransition,
    /// See [`EngineError::RegistrationClosed`]
    RegistrationClosed,
    /// See [`EngineError::DeadlinePassed`]
    DeadlinePassed,
    /// See [`EngineError::AlreadyRegistered`]
    AlreadyRegistered,
    /// See [`EngineError::CapacityExceeded`]
    CapacityExceeded,
    /// See [`EngineError::WrongEventType`]
    WrongEventType,
    /// See [`EngineError::AlreadyMember`]
    AlreadyMember,
    /// See [`EngineError::AlreadyInOtherTeam`]
    AlreadyInOtherTeam,
    /// See [`EngineError::TeamFull`]
    TeamFull,
    /// See [`EngineError::AlreadyProcessed`]
    AlreadyProcessed,
    /// See [`EngineError::InvalidInput`]
    InvalidInput,
    /// See [`EngineError::OutOfStock`]
    OutOfStock,
    /// See [`EngineError::Storage`]
    Storage,
}

impl EngineError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::InvalidTransition(_) => ErrorKind::InvalidTransition,
            Self::RegistrationClosed { .. } => ErrorKind::RegistrationClosed,
            Self::DeadlinePassed { .. } => ErrorKind::DeadlinePassed,
            Self::AlreadyRegistered { .. } => ErrorKind::AlreadyRegistered,
            Self::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Self::WrongEventType { .. } => ErrorKind::WrongEventType,
            Self::AlreadyMember { .. } => ErrorKind::AlreadyMember,
            Self::AlreadyInOtherTeam { .. } => ErrorKind::AlreadyInOtherTeam,
            Self::TeamFull { .. } => ErrorKind::TeamFull,
            Self::AlreadyProcessed { .. } => ErrorKind::AlreadyProcessed,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::OutOfStock { .. } => ErrorKind::OutOfStock,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// `NotFound` for an event.
    #[must_use]
    pub fn event_not_found(event_id: EventId) -> Self {
        Self::NotFound {
            entity: "Event",
            id: event_id.to_string(),
        }
    }

    /// `WrongEventType` with a readable description of the actual event.
    #[must_use]
    pub fn wrong_event_type(
        event_id: EventId,
        expected: &'static str,
        actual: EventType,
        is_team_event: bool,
    ) -> Self {
        let actual = match (actual, is_team_event) {
            (EventType::Normal, true) => "a team event".to_string(),
            (EventType::Normal, false) => "a normal event".to_string(),
            (EventType::Merchandise, _) => "a merchandise event".to_string(),
        };
        Self::WrongEventType {
            event_id,
            expected,
            actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_names_entity() {
        let id = EventId::new();
        let error = EngineError::event_not_found(id);
        let display = format!("{error}");
        assert!(display.contains("Event not found"));
        assert!(display.contains(&id.to_string()));
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn storage_errors_convert() {
        let error: EngineError = StoreError::Database("connection reset".to_string()).into();
        assert_eq!(error.kind(), ErrorKind::Storage);
        assert!(format!("{error}").contains("connection reset"));
    }

    #[test]
    fn wrong_event_type_describes_team_events() {
        let error =
            EngineError::wrong_event_type(EventId::new(), "an individual", EventType::Normal, true);
        assert!(format!("{error}").contains("a team event"));
    }
}
