//! Storage contracts.
//!
//! The engine holds no locks. Every guarantee about capacity, uniqueness and
//! one-shot transitions is provided by these operations, each of which an
//! implementation must execute atomically (one database transaction, or one
//! critical section for the in-memory store).
//!
//! # Implementations
//!
//! - `PostgresStore` (in `felicity-postgres`): production, constraint and
//!   conditional-update based
//! - `InMemoryStore` (in `felicity-testing`): fast, deterministic tests
//!
//! # Dyn Compatibility
//!
//! Methods return explicit `Pin<Box<dyn Future>>` instead of using `async fn`
//! so that the engine can hold an `Arc<dyn EngineStore>`.

use crate::event::{Event, EventStatus};
use crate::ids::{EventId, InviteCode, OrderId, OrganizerId, ParticipantId, TeamId, Version};
use crate::order::{Order, OrderDecision, OrderStatus};
use crate::registration::Registration;
use crate::team::{JoinOutcome, Team};
use crate::ticket::Ticket;
use chrono::{DateTime, Utc};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by every storage operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Uniqueness constraints the storage layer enforces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Constraint {
    /// One registration per (participant, event)
    Registration,
    /// Ticket ids are globally unique
    TicketId,
    /// One team per (participant, event)
    TeamMembership,
    /// Invite codes are globally unique
    InviteCode,
    /// One non-rejected order per (participant, event)
    ActiveOrder,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Registration => "registration",
            Self::TicketId => "ticket_id",
            Self::TeamMembership => "team_membership",
            Self::InviteCode => "invite_code",
            Self::ActiveOrder => "active_order",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during storage operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The referenced record does not exist.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Optimistic concurrency conflict on an event row.
    #[error("Concurrency conflict: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The version the writer read
        expected: Version,
        /// The version currently stored
        actual: Version,
    },

    /// A uniqueness constraint rejected the write.
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(Constraint),

    /// The event was not Published or Ongoing when the write was applied.
    #[error("Event is not accepting registrations (status: {0})")]
    RegistrationClosed(EventStatus),

    /// The write was applied after the event's registration deadline.
    #[error("Registration deadline passed at {0}")]
    DeadlinePassed(DateTime<Utc>),

    /// The event's seat counter would exceed its registration limit.
    #[error("Registration limit reached")]
    CapacityExceeded,

    /// The team has no room left or is already complete.
    #[error("Team is full")]
    TeamFull,

    /// The order was no longer pending when the decision was applied.
    #[error("Order is no longer pending (status: {0})")]
    NotPending(OrderStatus),

    /// The chosen merchandise variant lacks stock.
    #[error("Insufficient stock")]
    OutOfStock,

    /// Database connection, query or decoding failure.
    #[error("Database error: {0}")]
    Database(String),
}

/// A value together with the row version it was read at.
#[derive(Clone, Debug, PartialEq)]
pub struct Versioned<T> {
    /// The stored value
    pub value: T,
    /// Version to pass back as `expected_version` when saving
    pub version: Version,
}

/// Persistence of events.
pub trait EventRepository: Send + Sync {
    /// Insert a new event at [`Version::INITIAL`] with zero seats taken.
    ///
    /// # Errors
    ///
    /// `Database` on infrastructure failure.
    fn insert_event(&self, event: Event) -> StoreFuture<'_, Version>;

    /// Load an event and its current version.
    ///
    /// # Errors
    ///
    /// `Database` on infrastructure failure.
    fn load_event(&self, event_id: EventId) -> StoreFuture<'_, Option<Versioned<Event>>>;

    /// Overwrite an event if it is still at `expected_version`.
    ///
    /// Returns the new version.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict` if the row moved on
    /// - `NotFound` if the event does not exist
    fn save_event(&self, event: Event, expected_version: Version) -> StoreFuture<'_, Version>;

    /// Events owned by `organizer_id`, newest first.
    ///
    /// # Errors
    ///
    /// `Database` on infrastructure failure.
    fn events_by_organizer(&self, organizer_id: OrganizerId) -> StoreFuture<'_, Vec<Event>>;
}

/// The capacity ledger and registration records.
pub trait RegistrationLedger: Send + Sync {
    /// Insert a confirmed registration and take one seat, atomically.
    ///
    /// Checks run in this order inside the same transaction, with the event
    /// row locked: status Published or Ongoing, `registration.created_at` at
    /// or before the deadline, registration uniqueness, ticket uniqueness,
    /// then `seats_taken < registration_limit`. Either the row is inserted
    /// and the counter incremented, or neither happens.
    ///
    /// # Errors
    ///
    /// - `RegistrationClosed` if the event no longer accepts registrations
    /// - `DeadlinePassed` if `registration.created_at` is past the deadline
    /// - `UniqueViolation(Registration)` if the participant already holds one
    /// - `UniqueViolation(TicketId)` if the ticket id is taken
    /// - `CapacityExceeded` if no seat is left
    /// - `NotFound` if the event does not exist
    fn admit_registration(&self, registration: Registration) -> StoreFuture<'_, ()>;

    /// Insert a registration unless the participant already has one for the
    /// event. Does not touch the seat counter (team seats are reserved when
    /// the team is created).
    ///
    /// Returns `true` if a row was inserted.
    ///
    /// # Errors
    ///
    /// `UniqueViolation(TicketId)` if the ticket id is taken.
    fn insert_registration_if_absent(
        &self,
        registration: Registration,
    ) -> StoreFuture<'_, bool>;

    /// Seats currently taken for the event.
    ///
    /// # Errors
    ///
    /// `NotFound` if the event does not exist.
    fn seats_taken(&self, event_id: EventId) -> StoreFuture<'_, u32>;

    /// The participant's registration for the event, if any.
    ///
    /// # Errors
    ///
    /// `Database` on infrastructure failure.
    fn registration_for(
        &self,
        event_id: EventId,
        participant_id: ParticipantId,
    ) -> StoreFuture<'_, Option<Registration>>;

    /// All registrations for an event, oldest first.
    ///
    /// # Errors
    ///
    /// `Database` on infrastructure failure.
    fn registrations_for_event(&self, event_id: EventId) -> StoreFuture<'_, Vec<Registration>>;

    /// All registrations held by a participant, newest first.
    ///
    /// # Errors
    ///
    /// `Database` on infrastructure failure.
    fn registrations_for_participant(
        &self,
        participant_id: ParticipantId,
    ) -> StoreFuture<'_, Vec<Registration>>;
}

/// Teams and their atomic join/completion step.
pub trait TeamRepository: Send + Sync {
    /// Insert a team and reserve `team.max_size` seats on its event, atomically.
    ///
    /// The event's status and deadline (against `team.created_at`) are
    /// re-checked on the locked event row.
    ///
    /// # Errors
    ///
    /// - `RegistrationClosed` if the event no longer accepts registrations
    /// - `DeadlinePassed` if `team.created_at` is past the deadline
    /// - `UniqueViolation(TeamMembership)` if the leader already has a team for the event
    /// - `UniqueViolation(InviteCode)` if the code is taken
    /// - `CapacityExceeded` if the seats do not fit under the limit
    /// - `NotFound` if the event does not exist
    fn insert_team(&self, team: Team) -> StoreFuture<'_, ()>;

    /// Load a team.
    ///
    /// # Errors
    ///
    /// `Database` on infrastructure failure.
    fn load_team(&self, team_id: TeamId) -> StoreFuture<'_, Option<Team>>;

    /// Resolve an invite code.
    ///
    /// # Errors
    ///
    /// `Database` on infrastructure failure.
    fn team_by_invite_code(&self, code: InviteCode) -> StoreFuture<'_, Option<Team>>;

    /// Append a member, completing the team if this join fills it.
    ///
    /// The append and the `Incomplete -> Complete` transition are a single
    /// conditional update guarded by `status = Incomplete AND size < max_size`,
    /// so exactly one joiner observes `completed = true`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the team does not exist
    /// - `RegistrationClosed` if the team's event no longer accepts registrations
    /// - `UniqueViolation(TeamMembership)` if the participant is in any team for the event
    ///   (this one included)
    /// - `TeamFull` if the guard fails
    fn join_team(&self, team_id: TeamId, participant_id: ParticipantId)
    -> StoreFuture<'_, JoinOutcome>;

    /// Record that every member of a complete team holds a registration.
    ///
    /// # Errors
    ///
    /// `NotFound` if the team does not exist.
    fn mark_tickets_issued(&self, team_id: TeamId, at: DateTime<Utc>) -> StoreFuture<'_, ()>;

    /// Complete teams whose tickets were never recorded as issued.
    ///
    /// # Errors
    ///
    /// `Database` on infrastructure failure.
    fn teams_awaiting_tickets(&self) -> StoreFuture<'_, Vec<Team>>;

    /// Teams the participant belongs to, newest first.
    ///
    /// # Errors
    ///
    /// `Database` on infrastructure failure.
    fn teams_for_participant(&self, participant_id: ParticipantId)
    -> StoreFuture<'_, Vec<Team>>;
}

/// Merchandise orders.
pub trait OrderRepository: Send + Sync {
    /// Insert a pending order.
    ///
    /// # Errors
    ///
    /// - `RegistrationClosed` if the event no longer accepts orders
    /// - `UniqueViolation(ActiveOrder)` if the participant already has a
    ///   non-rejected order for the event
    /// - `NotFound` if the event does not exist
    fn insert_order(&self, order: Order) -> StoreFuture<'_, ()>;

    /// Load an order.
    ///
    /// # Errors
    ///
    /// `Database` on infrastructure failure.
    fn load_order(&self, order_id: OrderId) -> StoreFuture<'_, Option<Order>>;

    /// Move a pending order to its decided status.
    ///
    /// Runs as one transaction: a conditional update `WHERE status = pending`;
    /// on approval, store `ticket` on the order, decrement the matching
    /// variant's stock by the order quantity (when the event declares
    /// variants) and bump the event version.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the order does not exist
    /// - `NotPending` if another decision already landed
    /// - `OutOfStock` if the variant cannot cover the quantity
    /// - `UniqueViolation(TicketId)` if the ticket id is taken
    fn decide_order(
        &self,
        order_id: OrderId,
        decision: OrderDecision,
        ticket: Option<Ticket>,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Order>;

    /// Orders for an event, oldest first.
    ///
    /// # Errors
    ///
    /// `Database` on infrastructure failure.
    fn orders_for_event(&self, event_id: EventId) -> StoreFuture<'_, Vec<Order>>;
}

/// Everything the engine needs from storage.
pub trait EngineStore: EventRepository + RegistrationLedger + TeamRepository + OrderRepository {}

impl<T> EngineStore for T where
    T: EventRepository + RegistrationLedger + TeamRepository + OrderRepository
{
}
