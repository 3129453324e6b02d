//! A store that interleaves scripted interference with real calls.
//!
//! Workflows read an event, decide, then write. [`ScriptedStore`] lets a test
//! land an organizer action between that read and the write, or make a
//! follow-up read fail, without spawning racing tasks.

use crate::memory_store::InMemoryStore;
use chrono::{DateTime, Utc};
use felicity_core::event::{Event, EventStatus};
use felicity_core::ids::{EventId, InviteCode, OrderId, OrganizerId, ParticipantId, TeamId, Version};
use felicity_core::order::{Order, OrderDecision};
use felicity_core::registration::Registration;
use felicity_core::store::{
    EventRepository, OrderRepository, RegistrationLedger, StoreError, StoreFuture,
    TeamRepository, Versioned,
};
use felicity_core::team::{JoinOutcome, Team};
use felicity_core::ticket::Ticket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Delegates to an [`InMemoryStore`], with scripted interference.
///
/// Cloning shares both the state and the script.
///
/// # Example
///
/// ```
/// use felicity_testing::ScriptedStore;
/// use felicity_core::ids::EventId;
///
/// let store = ScriptedStore::new();
/// store.close_before_next_write(EventId::new());
/// assert_eq!(store.inner().registration_count(EventId::new()), 0);
/// ```
#[derive(Clone, Debug, Default)]
pub struct ScriptedStore {
    inner: InMemoryStore,
    close_on_write: Arc<Mutex<Option<EventId>>>,
    fail_team_loads: Arc<AtomicBool>,
}

impl ScriptedStore {
    /// Wrap a fresh in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The wrapped store, for setup and assertions that bypass the script.
    #[must_use]
    pub const fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    /// Move `event_id` to `Closed` right before the next registration, team
    /// or order write runs, as an organizer committing in between would.
    pub fn close_before_next_write(&self, event_id: EventId) {
        if let Ok(mut pending) = self.close_on_write.lock() {
            *pending = Some(event_id);
        }
    }

    /// Make every `load_team` call fail with a database error.
    pub fn fail_team_loads(&self) {
        self.fail_team_loads.store(true, Ordering::SeqCst);
    }

    async fn interfere(&self) -> Result<(), StoreError> {
        let pending = self
            .close_on_write
            .lock()
            .ok()
            .and_then(|mut pending| pending.take());
        let Some(event_id) = pending else {
            return Ok(());
        };

        let current = self
            .inner
            .load_event(event_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("event {event_id}")))?;
        let mut closed = current.value;
        closed.status = EventStatus::Closed;
        self.inner.save_event(closed, current.version).await?;
        Ok(())
    }
}

impl EventRepository for ScriptedStore {
    fn insert_event(&self, event: Event) -> StoreFuture<'_, Version> {
        self.inner.insert_event(event)
    }

    fn load_event(&self, event_id: EventId) -> StoreFuture<'_, Option<Versioned<Event>>> {
        self.inner.load_event(event_id)
    }

    fn save_event(&self, event: Event, expected_version: Version) -> StoreFuture<'_, Version> {
        self.inner.save_event(event, expected_version)
    }

    fn events_by_organizer(&self, organizer_id: OrganizerId) -> StoreFuture<'_, Vec<Event>> {
        self.inner.events_by_organizer(organizer_id)
    }
}

impl RegistrationLedger for ScriptedStore {
    fn admit_registration(&self, registration: Registration) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.interfere().await?;
            self.inner.admit_registration(registration).await
        })
    }

    fn insert_registration_if_absent(
        &self,
        registration: Registration,
    ) -> StoreFuture<'_, bool> {
        self.inner.insert_registration_if_absent(registration)
    }

    fn seats_taken(&self, event_id: EventId) -> StoreFuture<'_, u32> {
        self.inner.seats_taken(event_id)
    }

    fn registration_for(
        &self,
        event_id: EventId,
        participant_id: ParticipantId,
    ) -> StoreFuture<'_, Option<Registration>> {
        self.inner.registration_for(event_id, participant_id)
    }

    fn registrations_for_event(&self, event_id: EventId) -> StoreFuture<'_, Vec<Registration>> {
        self.inner.registrations_for_event(event_id)
    }

    fn registrations_for_participant(
        &self,
        participant_id: ParticipantId,
    ) -> StoreFuture<'_, Vec<Registration>> {
        self.inner.registrations_for_participant(participant_id)
    }
}

impl TeamRepository for ScriptedStore {
    fn insert_team(&self, team: Team) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.interfere().await?;
            self.inner.insert_team(team).await
        })
    }

    fn load_team(&self, team_id: TeamId) -> StoreFuture<'_, Option<Team>> {
        if self.fail_team_loads.load(Ordering::SeqCst) {
            return Box::pin(async {
                Err(StoreError::Database("team lookup unavailable".to_string()))
            });
        }
        self.inner.load_team(team_id)
    }

    fn team_by_invite_code(&self, code: InviteCode) -> StoreFuture<'_, Option<Team>> {
        self.inner.team_by_invite_code(code)
    }

    fn join_team(
        &self,
        team_id: TeamId,
        participant_id: ParticipantId,
    ) -> StoreFuture<'_, JoinOutcome> {
        Box::pin(async move {
            self.interfere().await?;
            self.inner.join_team(team_id, participant_id).await
        })
    }

    fn mark_tickets_issued(&self, team_id: TeamId, at: DateTime<Utc>) -> StoreFuture<'_, ()> {
        self.inner.mark_tickets_issued(team_id, at)
    }

    fn teams_awaiting_tickets(&self) -> StoreFuture<'_, Vec<Team>> {
        self.inner.teams_awaiting_tickets()
    }

    fn teams_for_participant(
        &self,
        participant_id: ParticipantId,
    ) -> StoreFuture<'_, Vec<Team>> {
        self.inner.teams_for_participant(participant_id)
    }
}

impl OrderRepository for ScriptedStore {
    fn insert_order(&self, order: Order) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.interfere().await?;
            self.inner.insert_order(order).await
        })
    }

    fn load_order(&self, order_id: OrderId) -> StoreFuture<'_, Option<Order>> {
        self.inner.load_order(order_id)
    }

    fn decide_order(
        &self,
        order_id: OrderId,
        decision: OrderDecision,
        ticket: Option<Ticket>,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Order> {
        self.inner.decide_order(order_id, decision, ticket, at)
    }

    fn orders_for_event(&self, event_id: EventId) -> StoreFuture<'_, Vec<Order>> {
        self.inner.orders_for_event(event_id)
    }
}
