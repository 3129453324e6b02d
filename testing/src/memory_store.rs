//! In-memory implementation of every storage contract.
//!
//! All state sits behind one mutex that is held only for the duration of a
//! single storage call, never across an `.await`. Each call is therefore
//! linearizable, the same guarantee a database transaction gives the
//! production store.

use felicity_core::event::Event;
use felicity_core::ids::{
    EventId, InviteCode, OrderId, OrganizerId, ParticipantId, TeamId, TicketId, Version,
};
use felicity_core::order::{Order, OrderDecision, OrderStatus};
use felicity_core::registration::Registration;
use felicity_core::store::{
    Constraint, EventRepository, OrderRepository, RegistrationLedger, StoreError, StoreFuture,
    TeamRepository, Versioned,
};
use felicity_core::team::{JoinOutcome, Team, TeamStatus};
use felicity_core::ticket::Ticket;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
struct EventRow {
    event: Event,
    version: Version,
    seats_taken: u32,
}

impl EventRow {
    /// Registration-open check made under the store lock. `at` is `None`
    /// for writes that ignore the deadline.
    fn check_open(&self, at: Option<DateTime<Utc>>) -> Result<(), StoreError> {
        if !self.event.status.accepts_registrations() {
            return Err(StoreError::RegistrationClosed(self.event.status));
        }
        match at {
            Some(at) if !self.event.deadline_open_at(at) => {
                Err(StoreError::DeadlinePassed(self.event.registration_deadline))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    // Insertion order doubles as creation order.
    events: Vec<EventRow>,
    registrations: Vec<Registration>,
    teams: Vec<Team>,
    orders: Vec<Order>,
    ticket_ids: HashSet<TicketId>,
    invite_codes: HashMap<InviteCode, TeamId>,
    memberships: HashMap<(EventId, ParticipantId), TeamId>,
    forced_ticket_collisions: usize,
    forced_invite_collisions: usize,
}

impl State {
    fn event_row(&self, event_id: EventId) -> Result<&EventRow, StoreError> {
        self.events
            .iter()
            .find(|row| row.event.id == event_id)
            .ok_or_else(|| StoreError::NotFound(format!("event {event_id}")))
    }

    fn event_row_mut(&mut self, event_id: EventId) -> Result<&mut EventRow, StoreError> {
        self.events
            .iter_mut()
            .find(|row| row.event.id == event_id)
            .ok_or_else(|| StoreError::NotFound(format!("event {event_id}")))
    }

    fn has_registration(&self, event_id: EventId, participant_id: ParticipantId) -> bool {
        self.registrations
            .iter()
            .any(|r| r.event_id == event_id && r.participant_id == participant_id)
    }

    fn check_ticket_free(&mut self, ticket_id: &TicketId) -> Result<(), StoreError> {
        if self.forced_ticket_collisions > 0 {
            self.forced_ticket_collisions -= 1;
            return Err(StoreError::UniqueViolation(Constraint::TicketId));
        }
        if self.ticket_ids.contains(ticket_id) {
            return Err(StoreError::UniqueViolation(Constraint::TicketId));
        }
        Ok(())
    }

    fn check_invite_code_free(&mut self, code: &InviteCode) -> Result<(), StoreError> {
        if self.forced_invite_collisions > 0 {
            self.forced_invite_collisions -= 1;
            return Err(StoreError::UniqueViolation(Constraint::InviteCode));
        }
        if self.invite_codes.contains_key(code) {
            return Err(StoreError::UniqueViolation(Constraint::InviteCode));
        }
        Ok(())
    }

    fn team_mut(&mut self, team_id: TeamId) -> Result<&mut Team, StoreError> {
        self.teams
            .iter_mut()
            .find(|team| team.id == team_id)
            .ok_or_else(|| StoreError::NotFound(format!("team {team_id}")))
    }
}

/// In-memory store for fast, deterministic tests.
///
/// Cloning shares the underlying state.
///
/// # Example
///
/// ```
/// use felicity_testing::InMemoryStore;
/// use felicity_core::store::RegistrationLedger;
/// use felicity_core::ids::EventId;
///
/// # async fn example() {
/// let store = InMemoryStore::new();
/// assert!(store.seats_taken(EventId::new()).await.is_err());
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` ticket writes fail with a ticket id collision.
    ///
    /// Lets tests drive the re-mint path deterministically.
    pub fn force_ticket_collisions(&self, n: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.forced_ticket_collisions = n;
        }
    }

    /// Make the next `n` team inserts fail with an invite code collision.
    pub fn force_invite_code_collisions(&self, n: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.forced_invite_collisions = n;
        }
    }

    /// Number of registrations stored for `event_id`.
    #[must_use]
    pub fn registration_count(&self, event_id: EventId) -> usize {
        self.state.lock().map_or(0, |state| {
            state
                .registrations
                .iter()
                .filter(|r| r.event_id == event_id)
                .count()
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|e| StoreError::Database(format!("store lock poisoned: {e}")))
    }
}

impl EventRepository for InMemoryStore {
    fn insert_event(&self, event: Event) -> StoreFuture<'_, Version> {
        Box::pin(async move {
            let mut state = self.lock()?;
            state.events.push(EventRow {
                event,
                version: Version::INITIAL,
                seats_taken: 0,
            });
            Ok(Version::INITIAL)
        })
    }

    fn load_event(&self, event_id: EventId) -> StoreFuture<'_, Option<Versioned<Event>>> {
        Box::pin(async move {
            let state = self.lock()?;
            Ok(state.event_row(event_id).ok().map(|row| Versioned {
                value: row.event.clone(),
                version: row.version,
            }))
        })
    }

    fn save_event(&self, event: Event, expected_version: Version) -> StoreFuture<'_, Version> {
        Box::pin(async move {
            let mut state = self.lock()?;
            let row = state.event_row_mut(event.id)?;
            if row.version != expected_version {
                return Err(StoreError::ConcurrencyConflict {
                    expected: expected_version,
                    actual: row.version,
                });
            }
            row.event = event;
            row.version = row.version.next();
            Ok(row.version)
        })
    }

    fn events_by_organizer(&self, organizer_id: OrganizerId) -> StoreFuture<'_, Vec<Event>> {
        Box::pin(async move {
            let state = self.lock()?;
            Ok(state
                .events
                .iter()
                .rev()
                .filter(|row| row.event.organizer_id == organizer_id)
                .map(|row| row.event.clone())
                .collect())
        })
    }
}

impl RegistrationLedger for InMemoryStore {
    fn admit_registration(&self, registration: Registration) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.lock()?;
            let row = state.event_row(registration.event_id)?;
            row.check_open(Some(registration.created_at))?;
            let (seats_taken, limit) = (row.seats_taken, row.event.registration_limit);

            if state.has_registration(registration.event_id, registration.participant_id) {
                return Err(StoreError::UniqueViolation(Constraint::Registration));
            }
            state.check_ticket_free(&registration.ticket_id)?;
            if seats_taken >= limit {
                return Err(StoreError::CapacityExceeded);
            }

            state.event_row_mut(registration.event_id)?.seats_taken += 1;
            state.ticket_ids.insert(registration.ticket_id.clone());
            state.registrations.push(registration);
            Ok(())
        })
    }

    fn insert_registration_if_absent(
        &self,
        registration: Registration,
    ) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let mut state = self.lock()?;
            if state.has_registration(registration.event_id, registration.participant_id) {
                return Ok(false);
            }
            state.check_ticket_free(&registration.ticket_id)?;
            state.ticket_ids.insert(registration.ticket_id.clone());
            state.registrations.push(registration);
            Ok(true)
        })
    }

    fn seats_taken(&self, event_id: EventId) -> StoreFuture<'_, u32> {
        Box::pin(async move {
            let state = self.lock()?;
            Ok(state.event_row(event_id)?.seats_taken)
        })
    }

    fn registration_for(
        &self,
        event_id: EventId,
        participant_id: ParticipantId,
    ) -> StoreFuture<'_, Option<Registration>> {
        Box::pin(async move {
            let state = self.lock()?;
            Ok(state
                .registrations
                .iter()
                .find(|r| r.event_id == event_id && r.participant_id == participant_id)
                .cloned())
        })
    }

    fn registrations_for_event(&self, event_id: EventId) -> StoreFuture<'_, Vec<Registration>> {
        Box::pin(async move {
            let state = self.lock()?;
            Ok(state
                .registrations
                .iter()
                .filter(|r| r.event_id == event_id)
                .cloned()
                .collect())
        })
    }

    fn registrations_for_participant(
        &self,
        participant_id: ParticipantId,
    ) -> StoreFuture<'_, Vec<Registration>> {
        Box::pin(async move {
            let state = self.lock()?;
            Ok(state
                .registrations
                .iter()
                .rev()
                .filter(|r| r.participant_id == participant_id)
                .cloned()
                .collect())
        })
    }
}

impl TeamRepository for InMemoryStore {
    fn insert_team(&self, team: Team) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.lock()?;
            let row = state.event_row(team.event_id)?;
            row.check_open(Some(team.created_at))?;
            let (seats_taken, limit) = (row.seats_taken, row.event.registration_limit);

            if state
                .memberships
                .contains_key(&(team.event_id, team.leader_id))
            {
                return Err(StoreError::UniqueViolation(Constraint::TeamMembership));
            }
            state.check_invite_code_free(&team.invite_code)?;
            if seats_taken.saturating_add(team.max_size) > limit {
                return Err(StoreError::CapacityExceeded);
            }

            state.event_row_mut(team.event_id)?.seats_taken += team.max_size;
            state
                .memberships
                .insert((team.event_id, team.leader_id), team.id);
            state.invite_codes.insert(team.invite_code.clone(), team.id);
            state.teams.push(team);
            Ok(())
        })
    }

    fn load_team(&self, team_id: TeamId) -> StoreFuture<'_, Option<Team>> {
        Box::pin(async move {
            let state = self.lock()?;
            Ok(state.teams.iter().find(|t| t.id == team_id).cloned())
        })
    }

    fn team_by_invite_code(&self, code: InviteCode) -> StoreFuture<'_, Option<Team>> {
        Box::pin(async move {
            let state = self.lock()?;
            Ok(state
                .invite_codes
                .get(&code)
                .and_then(|team_id| state.teams.iter().find(|t| t.id == *team_id))
                .cloned())
        })
    }

    fn join_team(
        &self,
        team_id: TeamId,
        participant_id: ParticipantId,
    ) -> StoreFuture<'_, JoinOutcome> {
        Box::pin(async move {
            let mut state = self.lock()?;
            let event_id = state.team_mut(team_id)?.event_id;
            state.event_row(event_id)?.check_open(None)?;
            if state.memberships.contains_key(&(event_id, participant_id)) {
                return Err(StoreError::UniqueViolation(Constraint::TeamMembership));
            }

            let team = state.team_mut(team_id)?;
            if !team.has_room() {
                return Err(StoreError::TeamFull);
            }
            team.members.push(participant_id);
            let completed = team.member_count() == team.max_size;
            if completed {
                team.status = TeamStatus::Complete;
            }
            let team = team.clone();

            state.memberships.insert((event_id, participant_id), team_id);
            Ok(JoinOutcome { team, completed })
        })
    }

    fn mark_tickets_issued(&self, team_id: TeamId, at: DateTime<Utc>) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.lock()?;
            let team = state.team_mut(team_id)?;
            if team.tickets_issued_at.is_none() {
                team.tickets_issued_at = Some(at);
            }
            Ok(())
        })
    }

    fn teams_awaiting_tickets(&self) -> StoreFuture<'_, Vec<Team>> {
        Box::pin(async move {
            let state = self.lock()?;
            Ok(state
                .teams
                .iter()
                .filter(|t| t.awaiting_tickets())
                .cloned()
                .collect())
        })
    }

    fn teams_for_participant(
        &self,
        participant_id: ParticipantId,
    ) -> StoreFuture<'_, Vec<Team>> {
        Box::pin(async move {
            let state = self.lock()?;
            Ok(state
                .teams
                .iter()
                .rev()
                .filter(|t| t.has_member(participant_id))
                .cloned()
                .collect())
        })
    }
}

impl OrderRepository for InMemoryStore {
    fn insert_order(&self, order: Order) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.lock()?;
            state.event_row(order.event_id)?.check_open(None)?;
            let active = state.orders.iter().any(|o| {
                o.event_id == order.event_id
                    && o.participant_id == order.participant_id
                    && o.status.is_active()
            });
            if active {
                return Err(StoreError::UniqueViolation(Constraint::ActiveOrder));
            }
            state.orders.push(order);
            Ok(())
        })
    }

    fn load_order(&self, order_id: OrderId) -> StoreFuture<'_, Option<Order>> {
        Box::pin(async move {
            let state = self.lock()?;
            Ok(state.orders.iter().find(|o| o.id == order_id).cloned())
        })
    }

    fn decide_order(
        &self,
        order_id: OrderId,
        decision: OrderDecision,
        ticket: Option<Ticket>,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Order> {
        Box::pin(async move {
            let mut state = self.lock()?;
            let order = state
                .orders
                .iter()
                .find(|o| o.id == order_id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("order {order_id}")))?;
            if order.status != OrderStatus::Pending {
                return Err(StoreError::NotPending(order.status));
            }

            if decision == OrderDecision::Approved {
                let ticket = ticket.as_ref().ok_or_else(|| {
                    StoreError::Database("approval requires a ticket".to_string())
                })?;
                state.check_ticket_free(&ticket.ticket_id)?;

                let row = state.event_row_mut(order.event_id)?;
                if let Some(merchandise) = row.event.merchandise.as_mut() {
                    if !merchandise.variants.is_empty() {
                        let variant = merchandise
                            .variants
                            .iter_mut()
                            .find(|v| {
                                v.matches(
                                    order.variant.size.as_deref(),
                                    order.variant.color.as_deref(),
                                )
                            })
                            .filter(|v| v.stock >= order.quantity)
                            .ok_or(StoreError::OutOfStock)?;
                        variant.stock -= order.quantity;
                        row.version = row.version.next();
                    }
                }
                state.ticket_ids.insert(ticket.ticket_id.clone());
            }

            let stored = state
                .orders
                .iter_mut()
                .find(|o| o.id == order_id)
                .ok_or_else(|| StoreError::NotFound(format!("order {order_id}")))?;
            stored.status = decision.into();
            stored.decided_at = Some(at);
            if let Some(ticket) = ticket.filter(|_| decision == OrderDecision::Approved) {
                stored.ticket_id = Some(ticket.ticket_id);
                stored.qr_reference = Some(ticket.qr_reference);
            }
            Ok(stored.clone())
        })
    }

    fn orders_for_event(&self, event_id: EventId) -> StoreFuture<'_, Vec<Order>> {
        Box::pin(async move {
            let state = self.lock()?;
            Ok(state
                .orders
                .iter()
                .filter(|o| o.event_id == event_id)
                .cloned()
                .collect())
        })
    }
}
