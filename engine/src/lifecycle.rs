//! Event creation and organizer edits.
//!
//! Edits are compare-and-set against the persisted event: load the event and
//! its version, evaluate the lifecycle rules against that state, and save
//! with the version that was read. On a conflict the whole evaluation runs
//! again against the fresh state, so an edit that was legal against a stale
//! copy can still be rejected.

use crate::environment::EngineEnvironment;
use crate::metrics;
use crate::retry::retry_with_predicate;
use felicity_core::error::EngineError;
use felicity_core::event::{Event, EventChanges, EventDraft, EventStatus};
use felicity_core::ids::{EventId, OrganizerId};
use felicity_core::lifecycle::{apply_changes, validate_draft};
use felicity_core::store::StoreError;
use tracing::{debug, info, warn};

/// Organizer-facing event operations.
#[derive(Clone)]
pub struct EventLifecycle {
    env: EngineEnvironment,
}

impl EventLifecycle {
    /// Create the workflow.
    #[must_use]
    pub const fn new(env: EngineEnvironment) -> Self {
        Self { env }
    }

    /// Create an event in `Draft`.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the draft violates a value constraint, `Storage`
    /// on infrastructure failure.
    #[tracing::instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn create_event(
        &self,
        organizer_id: OrganizerId,
        draft: EventDraft,
    ) -> Result<Event, EngineError> {
        validate_draft(&draft)?;
        let event = Event::from_draft(EventId::new(), organizer_id, draft, self.env.clock.now());
        self.env.store.insert_event(event.clone()).await?;
        info!(event_id = %event.id, "Event created");
        Ok(event)
    }

    /// Apply an organizer's edit to the persisted event.
    ///
    /// An empty change set returns the event untouched.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the event does not exist
    /// - `Unauthorized` if `organizer_id` does not own it
    /// - `InvalidTransition` for a forbidden field, a limit decrease while
    ///   Published, or an illegal status move
    /// - `InvalidInput` if the result violates a value constraint
    /// - `Storage` if conflicts outlast the retry policy
    #[tracing::instrument(skip(self, changes), fields(fields = ?changes.touched_fields()))]
    pub async fn apply_edit(
        &self,
        event_id: EventId,
        changes: EventChanges,
        organizer_id: OrganizerId,
    ) -> Result<Event, EngineError> {
        let result = retry_with_predicate(
            &self.env.retry,
            || self.try_edit(event_id, &changes, organizer_id),
            |error| {
                matches!(
                    error,
                    EngineError::Storage(StoreError::ConcurrencyConflict { .. })
                )
            },
        )
        .await;
        metrics::record_edit(&result);

        match &result {
            Ok(event) => info!(status = %event.status, "Event updated"),
            Err(error) => debug!(error = %error, "Event edit rejected"),
        }
        result
    }

    /// Move the event to `status`. Equivalent to an edit touching only
    /// `status`.
    ///
    /// # Errors
    ///
    /// Same as [`EventLifecycle::apply_edit`].
    pub async fn transition_status(
        &self,
        event_id: EventId,
        status: EventStatus,
        organizer_id: OrganizerId,
    ) -> Result<Event, EngineError> {
        self.apply_edit(event_id, EventChanges::status(status), organizer_id)
            .await
    }

    /// One load, evaluate, compare-and-set round.
    async fn try_edit(
        &self,
        event_id: EventId,
        changes: &EventChanges,
        organizer_id: OrganizerId,
    ) -> Result<Event, EngineError> {
        let current = self
            .env
            .store
            .load_event(event_id)
            .await?
            .ok_or_else(|| EngineError::event_not_found(event_id))?;

        if !current.value.is_owned_by(organizer_id) {
            return Err(EngineError::Unauthorized(format!(
                "only the organizer of event {event_id} may edit it"
            )));
        }
        if changes.is_empty() {
            return Ok(current.value);
        }

        let updated = apply_changes(&current.value, changes, self.env.clock.now())?;
        match self
            .env
            .store
            .save_event(updated.clone(), current.version)
            .await
        {
            Ok(_) => Ok(updated),
            Err(conflict @ StoreError::ConcurrencyConflict { .. }) => {
                metrics::record_edit_conflict();
                warn!(error = %conflict, "Event changed concurrently, re-evaluating edit");
                Err(conflict.into())
            }
            Err(StoreError::NotFound(_)) => Err(EngineError::event_not_found(event_id)),
            Err(other) => Err(other.into()),
        }
    }

    /// Events owned by the organizer, newest first.
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    #[tracing::instrument(skip(self))]
    pub async fn organizer_events(&self, organizer_id: OrganizerId) -> Result<Vec<Event>, EngineError> {
        Ok(self.env.store.events_by_organizer(organizer_id).await?)
    }

    /// Load one event.
    ///
    /// # Errors
    ///
    /// `NotFound` if the event does not exist.
    pub async fn event(&self, event_id: EventId) -> Result<Event, EngineError> {
        self.env
            .store
            .load_event(event_id)
            .await?
            .map(|versioned| versioned.value)
            .ok_or_else(|| EngineError::event_not_found(event_id))
    }
}
