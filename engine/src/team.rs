//! Team formation and batch ticket issuance on completion.
//!
//! A team is created with its leader and reserves `team_size` seats up
//! front. Members join through the invite code; the join that fills the team
//! also flips it to `Complete` in the same atomic storage step, so exactly one
//! caller sees the completion and runs issuance. Issuance itself is
//! insert-if-absent per member and can be re-run safely, which is what
//! [`TeamFormation::reconcile_completed_teams`] does after a crash.

use crate::environment::EngineEnvironment;
use crate::ledger::{CapacityLedger, is_ticket_collision};
use crate::metrics::{self, TicketSource};
use crate::retry::retry_with_predicate;
use felicity_core::error::EngineError;
use felicity_core::event::{Event, EventType};
use felicity_core::ids::{EventId, InviteCode, ParticipantId, TeamId};
use felicity_core::registration::{FormData, Registration};
use felicity_core::store::{Constraint, StoreError};
use felicity_core::team::{Team, TeamStatus};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Team creation, joining and member ticket issuance.
#[derive(Clone)]
pub struct TeamFormation {
    env: EngineEnvironment,
    ledger: CapacityLedger,
}

impl TeamFormation {
    /// Create the workflow.
    #[must_use]
    pub fn new(env: EngineEnvironment) -> Self {
        let ledger = CapacityLedger::new(env.clone());
        Self { env, ledger }
    }

    /// Create a team led by `leader_id` and reserve its seats.
    ///
    /// A team whose event has `team_size == 1` is complete at creation and
    /// its leader's ticket is issued immediately.
    ///
    /// # Errors
    ///
    /// `NotFound`, `WrongEventType`, `RegistrationClosed`, `DeadlinePassed`,
    /// `InvalidInput` (blank name), `AlreadyInOtherTeam`, `CapacityExceeded`,
    /// or `Storage`.
    #[tracing::instrument(skip(self, team_name))]
    pub async fn create_team(
        &self,
        event_id: EventId,
        leader_id: ParticipantId,
        team_name: &str,
    ) -> Result<Team, EngineError> {
        let event = self.load_event(event_id).await?;

        if event.event_type != EventType::Normal || !event.is_team_event {
            return Err(EngineError::wrong_event_type(
                event_id,
                "a team event",
                event.event_type,
                event.is_team_event,
            ));
        }
        if !event.status.accepts_registrations() {
            return Err(EngineError::RegistrationClosed {
                event_id,
                status: event.status,
            });
        }
        let now = self.env.clock.now();
        if !event.deadline_open_at(now) {
            return Err(EngineError::DeadlinePassed {
                deadline: event.registration_deadline,
            });
        }
        let name = team_name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidInput(
                "team name cannot be empty".to_string(),
            ));
        }

        // Fast path only; the membership constraint decides races.
        let leader_teams = self.env.store.teams_for_participant(leader_id).await?;
        if leader_teams.iter().any(|team| team.event_id == event_id) {
            return Err(EngineError::AlreadyInOtherTeam {
                event_id,
                participant_id: leader_id,
            });
        }

        let team = Team::new(
            TeamId::new(),
            event_id,
            name.to_string(),
            leader_id,
            event.team_size,
            self.env.issuer.mint_invite_code(),
            now,
        );
        let mut team = self.ledger.reserve_team_seats(&event, team).await?;
        info!(team_id = %team.id, invite_code = %team.invite_code, "Team created");

        if team.status == TeamStatus::Complete {
            self.complete(&mut team).await;
        }
        Ok(team)
    }

    /// Join the team behind `invite_code`.
    ///
    /// If this join fills the team, tickets are issued to every member
    /// before returning. An issuance failure is logged and left for
    /// [`TeamFormation::reconcile_completed_teams`]; the join itself stands.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for a blank code
    /// - `NotFound` if the code does not resolve
    /// - `RegistrationClosed` if the event is no longer Published or Ongoing
    /// - `AlreadyMember` if the participant is already on this team
    /// - `AlreadyInOtherTeam` if they are on another team for the event
    /// - `TeamFull` if the team has no room or is already complete
    /// - `Storage` if membership cannot be resolved after a conflict
    #[tracing::instrument(skip(self))]
    pub async fn join_team(
        &self,
        invite_code: &str,
        participant_id: ParticipantId,
    ) -> Result<Team, EngineError> {
        let code = InviteCode::parse(invite_code)
            .map_err(|e| EngineError::InvalidInput(e.to_string()))?;
        let team = self
            .env
            .store
            .team_by_invite_code(code.clone())
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: "Team",
                id: format!("invite code {code}"),
            })?;

        let event = self.load_event(team.event_id).await?;
        if !event.status.accepts_registrations() {
            return Err(EngineError::RegistrationClosed {
                event_id: event.id,
                status: event.status,
            });
        }
        if team.has_member(participant_id) {
            return Err(EngineError::AlreadyMember {
                team_id: team.id,
                participant_id,
            });
        }

        let outcome = match self.env.store.join_team(team.id, participant_id).await {
            Ok(outcome) => outcome,
            Err(StoreError::UniqueViolation(Constraint::TeamMembership)) => {
                return Err(self.membership_conflict(&team, participant_id).await);
            }
            Err(StoreError::TeamFull) => return Err(EngineError::TeamFull { team_id: team.id }),
            Err(StoreError::RegistrationClosed(status)) => {
                return Err(EngineError::RegistrationClosed {
                    event_id: team.event_id,
                    status,
                });
            }
            Err(StoreError::NotFound(_)) => {
                return Err(EngineError::NotFound {
                    entity: "Team",
                    id: team.id.to_string(),
                });
            }
            Err(other) => return Err(other.into()),
        };

        info!(
            team_id = %team.id,
            members = outcome.team.members.len(),
            completed = outcome.completed,
            "Participant joined team"
        );

        let mut team = outcome.team;
        if outcome.completed {
            self.complete(&mut team).await;
        }
        Ok(team)
    }

    /// Distinguish "already on this team" from "on another team" after the
    /// membership constraint fired.
    async fn membership_conflict(&self, team: &Team, participant_id: ParticipantId) -> EngineError {
        let on_this_team = match self.env.store.load_team(team.id).await {
            Ok(Some(current)) => current.has_member(participant_id),
            Ok(None) => {
                return EngineError::NotFound {
                    entity: "Team",
                    id: team.id.to_string(),
                };
            }
            Err(e) => return EngineError::Storage(e),
        };
        if on_this_team {
            EngineError::AlreadyMember {
                team_id: team.id,
                participant_id,
            }
        } else {
            EngineError::AlreadyInOtherTeam {
                event_id: team.event_id,
                participant_id,
            }
        }
    }

    /// Run issuance for a team this caller just completed.
    async fn complete(&self, team: &mut Team) {
        let started = Instant::now();
        match self.issue_team_tickets(team).await {
            Ok(issued) => {
                metrics::record_team_completed(started.elapsed().as_secs_f64());
                info!(team_id = %team.id, issued, "Team complete, tickets issued");
            }
            Err(e) => {
                error!(team_id = %team.id, error = %e, "Team ticket issuance failed, left for reconciliation");
            }
        }
    }

    /// Ensure every member of a complete team holds a confirmed registration,
    /// then record the team as issued.
    ///
    /// Idempotent: members who already hold a registration for the event are
    /// skipped. Returns the number of registrations created by this call.
    async fn issue_team_tickets(&self, team: &mut Team) -> Result<usize, EngineError> {
        let now = self.env.clock.now();
        let mut issued = 0;

        for &member in &team.members {
            if self
                .env
                .store
                .registration_for(team.event_id, member)
                .await?
                .is_some()
            {
                continue;
            }
            if let Some(registration) = self.issue_member_ticket(team, member).await? {
                self.env.render_in_background(registration.ticket());
                issued += 1;
            }
        }

        self.env.store.mark_tickets_issued(team.id, now).await?;
        team.tickets_issued_at.get_or_insert(now);
        metrics::record_tickets_issued(TicketSource::Team, u64::try_from(issued).unwrap_or(u64::MAX));
        Ok(issued)
    }

    /// Insert one member's registration unless one already exists.
    async fn issue_member_ticket(
        &self,
        team: &Team,
        member: ParticipantId,
    ) -> Result<Option<Registration>, EngineError> {
        let env = &self.env;
        let now = env.clock.now();

        let inserted = retry_with_predicate(
            &env.retry,
            move || {
                let registration = Registration::confirmed(
                    team.event_id,
                    member,
                    env.issuer.issue(),
                    FormData::new(),
                    now,
                )
                .for_team(team.id);
                async move {
                    let inserted = env
                        .store
                        .insert_registration_if_absent(registration.clone())
                        .await?;
                    Ok::<_, StoreError>(inserted.then_some(registration))
                }
            },
            is_ticket_collision,
        )
        .await?;
        Ok(inserted)
    }

    /// Re-run issuance for complete teams whose tickets were never recorded.
    ///
    /// Safe to call at any time, including concurrently with joins. Returns
    /// the number of teams reconciled; a team that fails is logged and
    /// retried on the next call.
    ///
    /// # Errors
    ///
    /// `Storage` if the pending teams cannot be listed.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile_completed_teams(&self) -> Result<usize, EngineError> {
        let pending = self.env.store.teams_awaiting_tickets().await?;
        let mut reconciled = 0;

        for mut team in pending {
            match self.issue_team_tickets(&mut team).await {
                Ok(issued) => {
                    reconciled += 1;
                    info!(team_id = %team.id, issued, "Reconciled team tickets");
                }
                Err(e) => warn!(team_id = %team.id, error = %e, "Team reconciliation failed"),
            }
        }
        if reconciled > 0 {
            info!(reconciled, "Team reconciliation finished");
        }
        Ok(reconciled)
    }

    /// Teams the participant belongs to, newest first.
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    #[tracing::instrument(skip(self))]
    pub async fn my_teams(&self, participant_id: ParticipantId) -> Result<Vec<Team>, EngineError> {
        Ok(self.env.store.teams_for_participant(participant_id).await?)
    }

    /// A team's details, visible to its members only.
    ///
    /// # Errors
    ///
    /// `NotFound` if the team does not exist, `Unauthorized` for non-members.
    #[tracing::instrument(skip(self))]
    pub async fn team_details(
        &self,
        team_id: TeamId,
        participant_id: ParticipantId,
    ) -> Result<Team, EngineError> {
        let team = self
            .env
            .store
            .load_team(team_id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: "Team",
                id: team_id.to_string(),
            })?;
        if !team.has_member(participant_id) {
            debug!("Team details requested by a non-member");
            return Err(EngineError::Unauthorized(format!(
                "only members of team {team_id} may view it"
            )));
        }
        Ok(team)
    }

    async fn load_event(&self, event_id: EventId) -> Result<Event, EngineError> {
        self.env
            .store
            .load_event(event_id)
            .await?
            .map(|versioned| versioned.value)
            .ok_or_else(|| EngineError::event_not_found(event_id))
    }
}
