//! Individual registration for normal events.

use crate::environment::EngineEnvironment;
use crate::ledger::CapacityLedger;
use crate::metrics::{self, TicketSource};
use felicity_core::error::EngineError;
use felicity_core::event::{Event, EventType};
use felicity_core::ids::{EventId, OrganizerId, ParticipantId};
use felicity_core::registration::{FormData, Registration};
use tracing::{debug, info};

/// Registers participants for normal, non-team events.
#[derive(Clone)]
pub struct RegistrationWorkflow {
    env: EngineEnvironment,
    ledger: CapacityLedger,
}

impl RegistrationWorkflow {
    /// Create the workflow.
    #[must_use]
    pub fn new(env: EngineEnvironment) -> Self {
        let ledger = CapacityLedger::new(env.clone());
        Self { env, ledger }
    }

    /// Register `participant_id` for an event and issue their ticket.
    ///
    /// Preconditions are checked in this order, each with its own error:
    /// the event exists, is a normal individual event, is Published or
    /// Ongoing, its deadline has not passed, the participant is not yet
    /// registered, and a seat is left. The last two are decided atomically
    /// by the storage layer, uniqueness first.
    ///
    /// # Errors
    ///
    /// `NotFound`, `WrongEventType`, `RegistrationClosed`, `DeadlinePassed`,
    /// `AlreadyRegistered`, `CapacityExceeded`, or `Storage`.
    #[tracing::instrument(skip(self, form_data))]
    pub async fn register_participant(
        &self,
        event_id: EventId,
        participant_id: ParticipantId,
        form_data: FormData,
    ) -> Result<Registration, EngineError> {
        let result = self.register(event_id, participant_id, form_data).await;
        metrics::record_registration(&result);

        match &result {
            Ok(registration) => {
                metrics::record_tickets_issued(TicketSource::Individual, 1);
                info!(ticket_id = %registration.ticket_id, "Participant registered");
                self.env.render_in_background(registration.ticket());
            }
            Err(error) => debug!(error = %error, "Registration rejected"),
        }
        result
    }

    async fn register(
        &self,
        event_id: EventId,
        participant_id: ParticipantId,
        form_data: FormData,
    ) -> Result<Registration, EngineError> {
        let event = self.load_event(event_id).await?;

        if event.event_type != EventType::Normal || event.is_team_event {
            return Err(EngineError::wrong_event_type(
                event_id,
                "an individual event",
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

        // Fast path only; the ledger's unique constraint decides races.
        if self
            .env
            .store
            .registration_for(event_id, participant_id)
            .await?
            .is_some()
        {
            return Err(EngineError::AlreadyRegistered {
                event_id,
                participant_id,
            });
        }

        self.ledger
            .try_reserve_seat(&event, participant_id, form_data)
            .await
    }

    /// Registrations for an event, oldest first. Organizer only.
    ///
    /// # Errors
    ///
    /// `NotFound` if the event does not exist, `Unauthorized` if
    /// `organizer_id` does not own it.
    #[tracing::instrument(skip(self))]
    pub async fn event_attendees(
        &self,
        event_id: EventId,
        organizer_id: OrganizerId,
    ) -> Result<Vec<Registration>, EngineError> {
        let event = self.load_event(event_id).await?;
        if !event.is_owned_by(organizer_id) {
            return Err(EngineError::Unauthorized(format!(
                "only the organizer of event {event_id} may list its attendees"
            )));
        }
        Ok(self.env.store.registrations_for_event(event_id).await?)
    }

    /// Every ticket a participant holds, newest first.
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    #[tracing::instrument(skip(self))]
    pub async fn participant_tickets(
        &self,
        participant_id: ParticipantId,
    ) -> Result<Vec<Registration>, EngineError> {
        Ok(self
            .env
            .store
            .registrations_for_participant(participant_id)
            .await?)
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
