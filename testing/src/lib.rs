//! # Felicity Testing
//!
//! Testing utilities for the Felicity engine.
//!
//! This crate provides:
//! - [`FixedClock`]: deterministic time
//! - [`InMemoryStore`]: every storage contract, linearizable per call
//! - [`ScriptedStore`]: an in-memory store that lands an event close between a
//!   workflow's read and its write
//! - [`RecordingRenderer`] / [`FailingRenderer`]: ticket renderer doubles
//! - Draft builders for the common event shapes
//! - proptest strategies for domain enums
//!
//! ## Example
//!
//! ```
//! use felicity_testing::{InMemoryStore, helpers, test_clock};
//! use felicity_core::environment::Clock;
//!
//! let clock = test_clock();
//! let draft = helpers::normal_event_draft(clock.now(), 10);
//! assert_eq!(draft.registration_limit, 10);
//! let _store = InMemoryStore::new();
//! ```

use chrono::{DateTime, Utc};
use felicity_core::environment::Clock;

pub mod memory_store;
pub mod renderer;
pub mod scripted_store;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use felicity_testing::mocks::FixedClock;
    /// use felicity_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::days(20_089))
    }
}

/// Builders for event drafts used across the test suites.
pub mod helpers {
    use chrono::{DateTime, Duration, Utc};
    use felicity_core::event::{EventDraft, EventType, MerchandiseDetails, Variant};

    /// A normal, individual-registration event whose deadline is 5 days after `now`.
    #[must_use]
    pub fn normal_event_draft(now: DateTime<Utc>, registration_limit: u32) -> EventDraft {
        EventDraft {
            name: "Felicity Hackathon".to_string(),
            description: "Twenty-four hours of building".to_string(),
            event_type: EventType::Normal,
            eligibility: None,
            registration_deadline: now + Duration::days(5),
            event_start: now + Duration::days(7),
            event_end: now + Duration::days(8),
            registration_limit,
            fee: 0,
            tags: vec!["tech".to_string()],
            is_team_event: false,
            team_size: 1,
            custom_form_fields: vec![],
            merchandise: None,
        }
    }

    /// A team event with the given team size.
    #[must_use]
    pub fn team_event_draft(
        now: DateTime<Utc>,
        registration_limit: u32,
        team_size: u32,
    ) -> EventDraft {
        EventDraft {
            name: "Felicity Team Quiz".to_string(),
            is_team_event: true,
            team_size,
            ..normal_event_draft(now, registration_limit)
        }
    }

    /// A merchandise event selling one T-shirt in two sizes.
    #[must_use]
    pub fn merchandise_event_draft(now: DateTime<Utc>, stock_per_size: u32) -> EventDraft {
        EventDraft {
            name: "Felicity T-shirt".to_string(),
            event_type: EventType::Merchandise,
            merchandise: Some(MerchandiseDetails {
                item_name: "Fest T-shirt".to_string(),
                variants: vec![
                    Variant {
                        size: Some("M".to_string()),
                        color: Some("Black".to_string()),
                        stock: stock_per_size,
                    },
                    Variant {
                        size: Some("L".to_string()),
                        color: Some("Black".to_string()),
                        stock: stock_per_size,
                    },
                ],
                purchase_limit_per_participant: 2,
            }),
            ..normal_event_draft(now, 1_000)
        }
    }
}

/// proptest strategies for domain types.
pub mod properties {
    use felicity_core::event::{EventField, EventStatus};
    use proptest::prelude::*;

    /// Any event status.
    pub fn event_status() -> impl Strategy<Value = EventStatus> {
        prop::sample::select(EventStatus::ALL.to_vec())
    }

    /// Any editable event field.
    pub fn event_field() -> impl Strategy<Value = EventField> {
        prop::sample::select(EventField::ALL.to_vec())
    }
}

// Re-export commonly used items
pub use memory_store::InMemoryStore;
pub use mocks::{FixedClock, test_clock};
pub use renderer::{FailingRenderer, RecordingRenderer};
pub use scripted_store::ScriptedStore;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use felicity_core::event::{Event, EventDraft, EventStatus};
    use felicity_core::ids::{EventId, OrganizerId, ParticipantId, TeamId};
    use felicity_core::order::{Order, VariantChoice};
    use felicity_core::registration::{FormData, Registration};
    use felicity_core::store::{
        EventRepository, OrderRepository, RegistrationLedger, StoreError, TeamRepository,
    };
    use felicity_core::team::Team;
    use felicity_core::ticket::TicketIssuer;

    #[test]
    fn test_clock_is_new_year_2025() {
        let clock = test_clock();
        assert_eq!(clock.now().to_rfc3339(), "2025-01-01T00:00:00+00:00");
        assert_eq!(clock.now(), clock.now());
    }

    #[tokio::test]
    async fn stale_event_version_conflicts() {
        let store = InMemoryStore::new();
        let now = test_clock().now();
        let event = Event::from_draft(
            EventId::new(),
            OrganizerId::new(),
            helpers::normal_event_draft(now, 5),
            now,
        );
        let v1 = store.insert_event(event.clone()).await.unwrap();
        let v2 = store.save_event(event.clone(), v1).await.unwrap();
        assert_eq!(v2, v1.next());

        let error = store.save_event(event, v1).await.unwrap_err();
        assert!(matches!(
            error,
            StoreError::ConcurrencyConflict { expected, actual } if expected == v1 && actual == v2
        ));
    }

    async fn published(store: &InMemoryStore, draft: EventDraft) -> Event {
        let now = test_clock().now();
        let mut event = Event::from_draft(EventId::new(), OrganizerId::new(), draft, now);
        event.status = EventStatus::Published;
        store.insert_event(event.clone()).await.unwrap();
        event
    }

    async fn close(store: &InMemoryStore, event: &Event) {
        let current = store.load_event(event.id).await.unwrap().unwrap();
        let mut closed = current.value;
        closed.status = EventStatus::Closed;
        store.save_event(closed, current.version).await.unwrap();
    }

    fn registration(event: &Event, at: DateTime<Utc>) -> Registration {
        Registration::confirmed(
            event.id,
            ParticipantId::new(),
            TicketIssuer::default().issue(),
            FormData::new(),
            at,
        )
    }

    #[tokio::test]
    async fn admission_rechecks_status_and_deadline() {
        let store = InMemoryStore::new();
        let now = test_clock().now();
        let event = published(&store, helpers::normal_event_draft(now, 5)).await;

        let late = registration(&event, event.registration_deadline + Duration::seconds(1));
        let error = store.admit_registration(late).await.unwrap_err();
        assert!(matches!(error, StoreError::DeadlinePassed(d) if d == event.registration_deadline));

        store
            .admit_registration(registration(&event, event.registration_deadline))
            .await
            .unwrap();

        close(&store, &event).await;
        let error = store.admit_registration(registration(&event, now)).await.unwrap_err();
        assert!(matches!(error, StoreError::RegistrationClosed(EventStatus::Closed)));
        assert_eq!(store.registration_count(event.id), 1);
        assert_eq!(store.seats_taken(event.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn team_writes_on_a_closed_event_are_refused() {
        let store = InMemoryStore::new();
        let now = test_clock().now();
        let event = published(&store, helpers::team_event_draft(now, 10, 3)).await;
        let issuer = TicketIssuer::default();
        let team = Team::new(
            TeamId::new(),
            event.id,
            "Team".to_string(),
            ParticipantId::new(),
            3,
            issuer.mint_invite_code(),
            now,
        );
        store.insert_team(team.clone()).await.unwrap();

        close(&store, &event).await;
        let error = store.join_team(team.id, ParticipantId::new()).await.unwrap_err();
        assert!(matches!(error, StoreError::RegistrationClosed(EventStatus::Closed)));

        let second = Team::new(
            TeamId::new(),
            event.id,
            "Late".to_string(),
            ParticipantId::new(),
            3,
            issuer.mint_invite_code(),
            now,
        );
        let error = store.insert_team(second).await.unwrap_err();
        assert!(matches!(error, StoreError::RegistrationClosed(EventStatus::Closed)));

        assert_eq!(store.seats_taken(event.id).await.unwrap(), 3);
        let stored = store.load_team(team.id).await.unwrap().unwrap();
        assert_eq!(stored.members, vec![team.leader_id]);
    }

    #[tokio::test]
    async fn orders_on_a_closed_event_are_refused() {
        let store = InMemoryStore::new();
        let now = test_clock().now();
        let event = published(&store, helpers::merchandise_event_draft(now, 5)).await;
        close(&store, &event).await;

        let order = Order::pending(
            event.id,
            ParticipantId::new(),
            VariantChoice::new(Some("M"), Some("Black")),
            1,
            "proof.png".to_string(),
            now,
        );
        let error = store.insert_order(order).await.unwrap_err();
        assert!(matches!(error, StoreError::RegistrationClosed(EventStatus::Closed)));
        assert!(store.orders_for_event(event.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn team_insert_reserves_seats_atomically() {
        let store = InMemoryStore::new();
        let now = test_clock().now();
        let event = published(&store, helpers::team_event_draft(now, 3, 2)).await;
        let issuer = TicketIssuer::default();

        let team = |leader| {
            Team::new(
                TeamId::new(),
                event.id,
                "Team".to_string(),
                leader,
                2,
                issuer.mint_invite_code(),
                now,
            )
        };
        store.insert_team(team(ParticipantId::new())).await.unwrap();
        let error = store.insert_team(team(ParticipantId::new())).await.unwrap_err();
        assert!(matches!(error, StoreError::CapacityExceeded));
        assert_eq!(store.teams_awaiting_tickets().await.unwrap().len(), 0);
    }
}
