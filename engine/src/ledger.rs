//! The capacity ledger: seat reservation against an event's registration limit.
//!
//! The ledger never counts in process. Every reservation is one atomic
//! storage call that checks uniqueness and capacity and writes the result,
//! so concurrent callers across any number of engine instances can never
//! admit more than `registration_limit` seats.

use crate::environment::EngineEnvironment;
use crate::retry::retry_with_predicate;
use felicity_core::error::EngineError;
use felicity_core::event::Event;
use felicity_core::ids::{EventId, ParticipantId};
use felicity_core::registration::{FormData, Registration};
use felicity_core::store::{Constraint, StoreError};
use felicity_core::team::Team;

/// Seat reservation for individual registrations and whole teams.
#[derive(Clone)]
pub struct CapacityLedger {
    env: EngineEnvironment,
}

impl CapacityLedger {
    /// Create a ledger over `env`'s store.
    #[must_use]
    pub const fn new(env: EngineEnvironment) -> Self {
        Self { env }
    }

    /// Reserve one seat by persisting a confirmed registration for
    /// `participant_id`.
    ///
    /// A ticket is minted for the attempt and re-minted if its id collides.
    ///
    /// # Errors
    ///
    /// - [`EngineError::RegistrationClosed`] or [`EngineError::DeadlinePassed`]
    ///   if the event closed after the caller read it
    /// - [`EngineError::AlreadyRegistered`] if the participant already holds a
    ///   registration (checked before capacity)
    /// - [`EngineError::CapacityExceeded`] if no seat is left
    /// - [`EngineError::NotFound`] if the event vanished
    #[tracing::instrument(skip(self, event, form_data), fields(event_id = %event.id))]
    pub async fn try_reserve_seat(
        &self,
        event: &Event,
        participant_id: ParticipantId,
        form_data: FormData,
    ) -> Result<Registration, EngineError> {
        let now = self.env.clock.now();
        let env = &self.env;
        let form_data = &form_data;

        let admitted = retry_with_predicate(
            &self.env.retry,
            move || {
                let registration = Registration::confirmed(
                    event.id,
                    participant_id,
                    env.issuer.issue(),
                    form_data.clone(),
                    now,
                );
                async move {
                    env.store
                        .admit_registration(registration.clone())
                        .await
                        .map(|()| registration)
                }
            },
            is_ticket_collision,
        )
        .await;

        admitted.map_err(|error| match error {
            StoreError::UniqueViolation(Constraint::Registration) => {
                EngineError::AlreadyRegistered {
                    event_id: event.id,
                    participant_id,
                }
            }
            StoreError::RegistrationClosed(status) => EngineError::RegistrationClosed {
                event_id: event.id,
                status,
            },
            StoreError::DeadlinePassed(deadline) => EngineError::DeadlinePassed { deadline },
            StoreError::CapacityExceeded => EngineError::CapacityExceeded {
                event_id: event.id,
                limit: event.registration_limit,
            },
            StoreError::NotFound(_) => EngineError::event_not_found(event.id),
            other => EngineError::Storage(other),
        })
    }

    /// Persist `team` and reserve `team.max_size` seats for it in the same
    /// storage transaction.
    ///
    /// The team's invite code is tried first and re-minted on each collision.
    /// Returns the team as stored.
    ///
    /// # Errors
    ///
    /// - [`EngineError::RegistrationClosed`] or [`EngineError::DeadlinePassed`]
    ///   if the event closed after the caller read it
    /// - [`EngineError::AlreadyInOtherTeam`] if the leader already has a team
    ///   for the event
    /// - [`EngineError::CapacityExceeded`] if the team does not fit
    /// - [`EngineError::NotFound`] if the event vanished
    #[tracing::instrument(skip(self, event, team), fields(event_id = %event.id, team_id = %team.id))]
    pub async fn reserve_team_seats(&self, event: &Event, team: Team) -> Result<Team, EngineError> {
        let leader_id = team.leader_id;
        let env = &self.env;
        let team = &team;
        let mut retrying = false;

        let inserted = retry_with_predicate(
            &self.env.retry,
            move || {
                let mut attempt = team.clone();
                if retrying {
                    attempt.invite_code = env.issuer.mint_invite_code();
                }
                retrying = true;
                async move { env.store.insert_team(attempt.clone()).await.map(|()| attempt) }
            },
            |error| matches!(error, StoreError::UniqueViolation(Constraint::InviteCode)),
        )
        .await;

        inserted.map_err(|error| match error {
            StoreError::UniqueViolation(Constraint::TeamMembership) => {
                EngineError::AlreadyInOtherTeam {
                    event_id: event.id,
                    participant_id: leader_id,
                }
            }
            StoreError::RegistrationClosed(status) => EngineError::RegistrationClosed {
                event_id: event.id,
                status,
            },
            StoreError::DeadlinePassed(deadline) => EngineError::DeadlinePassed { deadline },
            StoreError::CapacityExceeded => EngineError::CapacityExceeded {
                event_id: event.id,
                limit: event.registration_limit,
            },
            StoreError::NotFound(_) => EngineError::event_not_found(event.id),
            other => EngineError::Storage(other),
        })
    }

    /// Seats still available on the event.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] if the event does not exist.
    pub async fn seats_remaining(&self, event_id: EventId) -> Result<u32, EngineError> {
        let event = self
            .env
            .store
            .load_event(event_id)
            .await?
            .ok_or_else(|| EngineError::event_not_found(event_id))?;
        let taken = self.env.store.seats_taken(event_id).await?;
        Ok(event.value.registration_limit.saturating_sub(taken))
    }
}

/// Whether a storage error is a ticket id collision worth re-minting for.
pub(crate) const fn is_ticket_collision(error: &StoreError) -> bool {
    matches!(error, StoreError::UniqueViolation(Constraint::TicketId))
}
