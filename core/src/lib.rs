//! # Felicity Core
//!
//! Domain types, lifecycle rules and storage contracts for the Felicity
//! event-management engine.
//!
//! This crate is the functional core of the system. Everything here is pure:
//! no I/O, no locks, no clocks read implicitly. The workflows in
//! `felicity-engine` combine these pieces with a storage collaborator.
//!
//! ## Core Concepts
//!
//! - **Event**: something an organizer publishes (a fest, a hackathon, a merch drop)
//! - **Lifecycle**: the table of which fields may change in which [`EventStatus`]
//! - **Registration**: a confirmed seat, carrying a ticket
//! - **Team**: participants joining through an invite code; tickets are issued
//!   for all members at once when the team fills
//! - **Order**: a merchandise purchase awaiting organizer approval
//! - **Store traits**: the persistence contracts whose implementations must
//!   provide the atomicity guarantees (unique constraints, compare-and-set)
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell
//! - Invariants enforced by the storage layer, not by in-process locks
//! - Dependency Injection via traits ([`environment::Clock`], [`store::EngineStore`],
//!   [`ticket::TicketRenderer`])
//!
//! ## Example
//!
//! ```
//! use felicity_core::event::{EventChanges, EventStatus};
//! use felicity_core::lifecycle::check_edit;
//!
//! // Ongoing events only accept status changes
//! let changes = EventChanges {
//!     description: Some("new text".to_string()),
//!     ..EventChanges::default()
//! };
//! assert!(check_edit(EventStatus::Ongoing, &changes).is_err());
//! ```

pub mod environment;
pub mod error;
pub mod event;
pub mod ids;
pub mod lifecycle;
pub mod order;
pub mod registration;
pub mod store;
pub mod team;
pub mod ticket;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use error::{EngineError, ErrorKind};
pub use event::{Event, EventChanges, EventDraft, EventField, EventStatus, EventType};
pub use ids::{
    EventId, InviteCode, OrderId, OrganizerId, ParticipantId, RegistrationId, TeamId, TicketId,
    Version,
};
pub use order::{Order, OrderDecision, OrderStatus, VariantChoice};
pub use registration::{FormData, Registration, RegistrationStatus};
pub use store::{Constraint, EngineStore, StoreError, Versioned};
pub use team::{JoinOutcome, Team, TeamStatus};
pub use ticket::{Ticket, TicketIssuer, TicketRenderer};
