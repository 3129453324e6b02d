//! Registration records: one confirmed seat held by one participant.

use crate::ids::{EventId, ParticipantId, RegistrationId, TeamId, TicketId};
use crate::ticket::Ticket;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Answers to an event's custom form, keyed by field label.
pub type FormData = BTreeMap<String, serde_json::Value>;

/// Registration status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistrationStatus {
    /// Holds a seat and a valid ticket
    Confirmed,
    /// Awaiting confirmation (reserved for paid flows)
    Pending,
    /// Cancelled by the participant or organizer
    Cancelled,
}

impl RegistrationStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Pending => "pending",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse status from database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "confirmed" => Some(Self::Confirmed),
            "pending" => Some(Self::Pending),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// A participant's registration for an event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    /// Record identifier
    pub id: RegistrationId,
    /// Event registered for
    pub event_id: EventId,
    /// Ticket holder
    pub participant_id: ParticipantId,
    /// Globally unique ticket identifier
    pub ticket_id: TicketId,
    /// Scannable ticket reference
    pub qr_reference: String,
    /// Current status
    pub status: RegistrationStatus,
    /// Custom form answers
    #[serde(default)]
    pub form_data: FormData,
    /// Team whose completion produced this registration
    pub team_id: Option<TeamId>,
    /// When the registration was created
    pub created_at: DateTime<Utc>,
}

impl Registration {
    /// A confirmed registration carrying `ticket`.
    #[must_use]
    pub fn confirmed(
        event_id: EventId,
        participant_id: ParticipantId,
        ticket: Ticket,
        form_data: FormData,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RegistrationId::new(),
            event_id,
            participant_id,
            ticket_id: ticket.ticket_id,
            qr_reference: ticket.qr_reference,
            status: RegistrationStatus::Confirmed,
            form_data,
            team_id: None,
            created_at: now,
        }
    }

    /// Attribute this registration to a team.
    #[must_use]
    pub const fn for_team(mut self, team_id: TeamId) -> Self {
        self.team_id = Some(team_id);
        self
    }

    /// Replace the ticket after an identifier collision.
    pub fn reissue(&mut self, ticket: Ticket) {
        self.ticket_id = ticket.ticket_id;
        self.qr_reference = ticket.qr_reference;
    }

    /// The ticket carried by this registration.
    #[must_use]
    pub fn ticket(&self) -> Ticket {
        Ticket {
            ticket_id: self.ticket_id.clone(),
            qr_reference: self.qr_reference.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_database_strings() {
        for status in [
            RegistrationStatus::Confirmed,
            RegistrationStatus::Pending,
            RegistrationStatus::Cancelled,
        ] {
            assert_eq!(RegistrationStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn reissue_swaps_ticket() {
        let ticket = Ticket {
            ticket_id: TicketId::new("FEL-AAAAAAAAAA"),
            qr_reference: "qr-a".to_string(),
        };
        let mut registration = Registration::confirmed(
            EventId::new(),
            ParticipantId::new(),
            ticket,
            FormData::new(),
            Utc::now(),
        );
        registration.reissue(Ticket {
            ticket_id: TicketId::new("FEL-BBBBBBBBBB"),
            qr_reference: "qr-b".to_string(),
        });
        assert_eq!(registration.ticket_id.as_str(), "FEL-BBBBBBBBBB");
        assert_eq!(registration.ticket().qr_reference, "qr-b");
    }
}
