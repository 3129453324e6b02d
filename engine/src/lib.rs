//! # Felicity Engine
//!
//! The workflows of the Felicity event platform, built on the pure rules in
//! `felicity-core` and a storage collaborator that provides every atomicity
//! guarantee.
//!
//! ## Workflows
//!
//! - [`EventLifecycle`]: create events, compare-and-set edits and status moves
//! - [`CapacityLedger`]: seat reservation for individuals and whole teams
//! - [`RegistrationWorkflow`]: ordered preconditions, then one atomic admission
//! - [`TeamFormation`]: invite-code joins, single-winner completion and
//!   idempotent member ticket issuance
//! - [`MerchandiseOrders`]: orders with payment proof and one-shot verification
//!
//! [`Engine`] bundles them behind one cloneable handle.
//!
//! ## Example
//!
//! ```
//! use felicity_engine::{Engine, EngineEnvironment};
//! use felicity_core::event::EventStatus;
//! use felicity_core::ids::{OrganizerId, ParticipantId};
//! use felicity_core::registration::FormData;
//! use felicity_core::environment::Clock;
//! use felicity_testing::{InMemoryStore, helpers, test_clock};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), felicity_core::EngineError> {
//! let clock = test_clock();
//! let env = EngineEnvironment::new(Arc::new(InMemoryStore::new()))
//!     .with_clock(Arc::new(clock.clone()));
//! let engine = Engine::new(env);
//!
//! let organizer = OrganizerId::new();
//! let event = engine
//!     .create_event(organizer, helpers::normal_event_draft(clock.now(), 100))
//!     .await?;
//! engine
//!     .transition_status(event.id, EventStatus::Published, organizer)
//!     .await?;
//!
//! let registration = engine
//!     .register_participant(event.id, ParticipantId::new(), FormData::new())
//!     .await?;
//! assert!(registration.ticket_id.as_str().starts_with("FEL-"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod environment;
pub mod ledger;
pub mod lifecycle;
pub mod merchandise;
pub mod metrics;
pub mod registration;
pub mod render;
pub mod retry;
pub mod team;

pub use config::{Config, ConfigError};
pub use engine::Engine;
pub use environment::EngineEnvironment;
pub use ledger::CapacityLedger;
pub use lifecycle::EventLifecycle;
pub use merchandise::{MerchandiseOrders, OrderRequest};
pub use registration::RegistrationWorkflow;
pub use render::HttpQrRenderer;
pub use retry::RetryPolicy;
pub use team::TeamFormation;
