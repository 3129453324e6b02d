//! Teams for team events.

use crate::ids::{EventId, InviteCode, ParticipantId, TeamId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Team status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TeamStatus {
    /// Still accepting members
    Incomplete,
    /// Full; tickets are (or are being) issued for every member
    Complete,
}

impl TeamStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Incomplete => "incomplete",
            Self::Complete => "complete",
        }
    }

    /// Parse status from database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "incomplete" => Some(Self::Incomplete),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }
}

/// A team registering together for a team event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Team identifier
    pub id: TeamId,
    /// The team event
    pub event_id: EventId,
    /// Display name chosen by the leader
    pub name: String,
    /// Participant who created the team
    pub leader_id: ParticipantId,
    /// Members in join order; the leader is always first
    pub members: Vec<ParticipantId>,
    /// Capacity, copied from the event's team size at creation
    pub max_size: u32,
    /// Code other participants use to join
    pub invite_code: InviteCode,
    /// Current status
    pub status: TeamStatus,
    /// Set once every member holds a registration
    pub tickets_issued_at: Option<DateTime<Utc>>,
    /// When the team was created
    pub created_at: DateTime<Utc>,
}

impl Team {
    /// A new team containing only its leader.
    ///
    /// A team of size 1 is complete from the start.
    #[must_use]
    pub fn new(
        id: TeamId,
        event_id: EventId,
        name: String,
        leader_id: ParticipantId,
        max_size: u32,
        invite_code: InviteCode,
        now: DateTime<Utc>,
    ) -> Self {
        let status = if max_size <= 1 {
            TeamStatus::Complete
        } else {
            TeamStatus::Incomplete
        };
        Self {
            id,
            event_id,
            name,
            leader_id,
            members: vec![leader_id],
            max_size,
            invite_code,
            status,
            tickets_issued_at: None,
            created_at: now,
        }
    }

    /// Whether `participant_id` is on this team.
    #[must_use]
    pub fn has_member(&self, participant_id: ParticipantId) -> bool {
        self.members.contains(&participant_id)
    }

    /// Whether the team can take another member.
    #[must_use]
    pub fn has_room(&self) -> bool {
        self.status == TeamStatus::Incomplete && self.member_count() < self.max_size
    }

    /// Number of members.
    #[must_use]
    pub fn member_count(&self) -> u32 {
        u32::try_from(self.members.len()).unwrap_or(u32::MAX)
    }

    /// Whether the team is complete but its members' tickets are not yet recorded.
    #[must_use]
    pub const fn awaiting_tickets(&self) -> bool {
        matches!(self.status, TeamStatus::Complete) && self.tickets_issued_at.is_none()
    }
}

/// Result of an atomic join.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Team state right after the join
    pub team: Team,
    /// `true` for exactly one joiner per team: the one whose join filled it
    pub completed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team(max_size: u32) -> Team {
        Team::new(
            TeamId::new(),
            EventId::new(),
            "Rustaceans".to_string(),
            ParticipantId::new(),
            max_size,
            InviteCode::new("A1B2C3"),
            Utc::now(),
        )
    }

    #[test]
    fn new_team_holds_only_its_leader() {
        let team = team(3);
        assert_eq!(team.members, vec![team.leader_id]);
        assert_eq!(team.status, TeamStatus::Incomplete);
        assert!(team.has_room());
    }

    #[test]
    fn solo_team_is_complete_immediately() {
        let team = team(1);
        assert_eq!(team.status, TeamStatus::Complete);
        assert!(!team.has_room());
        assert!(team.awaiting_tickets());
    }
}
