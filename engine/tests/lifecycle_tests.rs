//! Integration tests for event creation, edits and status moves.

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code uses expect for clear failure messages

use chrono::Duration;
use felicity_core::environment::Clock;
use felicity_core::error::{EngineError, ErrorKind};
use felicity_core::event::{Event, EventChanges, EventStatus, EventType};
use felicity_core::ids::{EventId, OrganizerId};
use felicity_engine::{Engine, EngineEnvironment, RetryPolicy};
use felicity_testing::{FixedClock, InMemoryStore, helpers, properties, test_clock};
use proptest::prelude::*;
use std::sync::Arc;

// ============================================================================
// Test Fixtures
// ============================================================================

fn engine() -> (Engine, FixedClock) {
    let clock = test_clock();
    let env = EngineEnvironment::new(Arc::new(InMemoryStore::new()))
        .with_clock(Arc::new(clock.clone()))
        .with_retry_policy(RetryPolicy::immediate(5));
    (Engine::new(env), clock)
}

async fn event_in(engine: &Engine, clock: &FixedClock, organizer: OrganizerId, status: EventStatus) -> Event {
    let event = engine
        .create_event(organizer, helpers::normal_event_draft(clock.now(), 10))
        .await
        .expect("create event");
    let path: &[EventStatus] = match status {
        EventStatus::Draft => &[],
        EventStatus::Published => &[EventStatus::Published],
        EventStatus::Ongoing => &[EventStatus::Published, EventStatus::Ongoing],
        EventStatus::Completed => &[
            EventStatus::Published,
            EventStatus::Ongoing,
            EventStatus::Completed,
        ],
        EventStatus::Closed => &[EventStatus::Closed],
    };
    let mut event = event;
    for &step in path {
        event = engine
            .transition_status(event.id, step, organizer)
            .await
            .expect("status move");
    }
    event
}

fn limit(value: u32) -> EventChanges {
    EventChanges {
        registration_limit: Some(value),
        ..EventChanges::default()
    }
}

// ============================================================================
// Creation
// ============================================================================

#[tokio::test]
async fn created_events_start_as_drafts() {
    let (engine, clock) = engine();
    let organizer = OrganizerId::new();

    let event = engine
        .create_event(organizer, helpers::normal_event_draft(clock.now(), 10))
        .await
        .unwrap();

    assert_eq!(event.status, EventStatus::Draft);
    assert_eq!(event.organizer_id, organizer);
    assert_eq!(event.eligibility, "Open to All");
    assert_eq!(engine.event(event.id).await.unwrap(), event);
    assert_eq!(engine.seats_remaining(event.id).await.unwrap(), 10);
}

#[tokio::test]
async fn invalid_drafts_are_rejected() {
    let (engine, clock) = engine();
    let now = clock.now();

    let mut zero_limit = helpers::normal_event_draft(now, 0);
    zero_limit.name = "Zero".to_string();
    let mut blank_name = helpers::normal_event_draft(now, 10);
    blank_name.name = "  ".to_string();
    let mut backwards = helpers::normal_event_draft(now, 10);
    backwards.event_end = backwards.event_start - Duration::hours(1);

    for draft in [zero_limit, blank_name, backwards] {
        let error = engine.create_event(OrganizerId::new(), draft).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidInput);
    }
}

#[tokio::test]
async fn organizer_events_are_newest_first() {
    let (engine, clock) = engine();
    let organizer = OrganizerId::new();
    let first = event_in(&engine, &clock, organizer, EventStatus::Draft).await;
    let second = event_in(&engine, &clock, organizer, EventStatus::Draft).await;
    event_in(&engine, &clock, OrganizerId::new(), EventStatus::Draft).await;

    let ids: Vec<EventId> = engine
        .organizer_events(organizer)
        .await
        .unwrap()
        .into_iter()
        .map(|event| event.id)
        .collect();
    assert_eq!(ids, vec![second.id, first.id]);
}

// ============================================================================
// Edits
// ============================================================================

#[tokio::test]
async fn drafts_accept_any_field() {
    let (engine, clock) = engine();
    let organizer = OrganizerId::new();
    let event = event_in(&engine, &clock, organizer, EventStatus::Draft).await;

    let changes = EventChanges {
        name: Some("Felicity Finals".to_string()),
        event_type: Some(EventType::Normal),
        registration_limit: Some(3),
        fee: Some(150),
        is_team_event: Some(true),
        team_size: Some(4),
        tags: Some(vec!["finals".to_string()]),
        ..EventChanges::default()
    };
    let edited = engine.apply_edit(event.id, changes, organizer).await.unwrap();

    assert_eq!(edited.name, "Felicity Finals");
    assert_eq!(edited.registration_limit, 3);
    assert_eq!(edited.fee, 150);
    assert!(edited.is_team_event);
    assert_eq!(edited.team_size, 4);
    assert_eq!(engine.event(event.id).await.unwrap(), edited);
}

#[tokio::test]
async fn published_events_only_grow() {
    let (engine, clock) = engine();
    let organizer = OrganizerId::new();
    let event = event_in(&engine, &clock, organizer, EventStatus::Published).await;

    let error = engine.apply_edit(event.id, limit(9), organizer).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidTransition);

    let edited = engine.apply_edit(event.id, limit(25), organizer).await.unwrap();
    assert_eq!(edited.registration_limit, 25);

    let later = EventChanges {
        description: Some("Now with prizes".to_string()),
        registration_deadline: Some(event.registration_deadline + Duration::days(1)),
        ..EventChanges::default()
    };
    engine.apply_edit(event.id, later, organizer).await.unwrap();

    let rename = EventChanges {
        name: Some("Renamed".to_string()),
        ..EventChanges::default()
    };
    let error = engine.apply_edit(event.id, rename, organizer).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidTransition);
    assert_eq!(engine.event(event.id).await.unwrap().name, event.name);
}

#[tokio::test]
async fn ongoing_events_only_move_status() {
    let (engine, clock) = engine();
    let organizer = OrganizerId::new();
    let event = event_in(&engine, &clock, organizer, EventStatus::Ongoing).await;

    let describe = EventChanges {
        description: Some("Too late".to_string()),
        ..EventChanges::default()
    };
    let error = engine.apply_edit(event.id, describe, organizer).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidTransition);

    let done = engine
        .transition_status(event.id, EventStatus::Completed, organizer)
        .await
        .unwrap();
    assert_eq!(done.status, EventStatus::Completed);
}

#[tokio::test]
async fn terminal_statuses_stay_put() {
    let (engine, clock) = engine();
    let organizer = OrganizerId::new();

    for terminal in [EventStatus::Completed, EventStatus::Closed] {
        let event = event_in(&engine, &clock, organizer, terminal).await;
        for target in EventStatus::ALL.into_iter().filter(|s| *s != terminal) {
            let error = engine
                .transition_status(event.id, target, organizer)
                .await
                .unwrap_err();
            assert_eq!(error.kind(), ErrorKind::InvalidTransition, "{terminal} -> {target}");
        }
        let same = engine
            .transition_status(event.id, terminal, organizer)
            .await
            .unwrap();
        assert_eq!(same.status, terminal);
    }
}

#[tokio::test]
async fn drafts_cannot_skip_publication() {
    let (engine, clock) = engine();
    let organizer = OrganizerId::new();
    let event = event_in(&engine, &clock, organizer, EventStatus::Draft).await;

    let error = engine
        .transition_status(event.id, EventStatus::Ongoing, organizer)
        .await
        .unwrap_err();
    assert!(matches!(error, EngineError::InvalidTransition(_)));
}

#[tokio::test]
async fn only_the_owner_may_edit() {
    let (engine, clock) = engine();
    let organizer = OrganizerId::new();
    let event = event_in(&engine, &clock, organizer, EventStatus::Draft).await;

    let error = engine
        .transition_status(event.id, EventStatus::Published, OrganizerId::new())
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Unauthorized);
    assert_eq!(engine.event(event.id).await.unwrap().status, EventStatus::Draft);

    let error = engine
        .transition_status(EventId::new(), EventStatus::Published, organizer)
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn empty_edit_returns_the_event_unchanged() {
    let (engine, clock) = engine();
    let organizer = OrganizerId::new();
    let event = event_in(&engine, &clock, organizer, EventStatus::Ongoing).await;

    let same = engine
        .apply_edit(event.id, EventChanges::default(), organizer)
        .await
        .unwrap();
    assert_eq!(same, event);
}

// ============================================================================
// Property Tests
// ============================================================================

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime")
}

proptest! {
    #[test]
    fn published_limit_edit_fails_exactly_when_it_decreases(new_limit in 1u32..40) {
        let outcome = runtime().block_on(async {
            let (engine, clock) = engine();
            let organizer = OrganizerId::new();
            let event = event_in(&engine, &clock, organizer, EventStatus::Published).await;
            engine.apply_edit(event.id, limit(new_limit), organizer).await
        });

        if new_limit < 10 {
            prop_assert_eq!(outcome.map_err(|e| e.kind()).err(), Some(ErrorKind::InvalidTransition));
        } else {
            prop_assert_eq!(outcome.map(|e| e.registration_limit).ok(), Some(new_limit));
        }
    }

    #[test]
    fn status_moves_match_the_graph(target in properties::event_status()) {
        let outcome = runtime().block_on(async {
            let (engine, clock) = engine();
            let organizer = OrganizerId::new();
            let event = event_in(&engine, &clock, organizer, EventStatus::Published).await;
            engine.transition_status(event.id, target, organizer).await
        });

        let allowed = felicity_core::lifecycle::is_transition_allowed(EventStatus::Published, target);
        prop_assert_eq!(outcome.is_ok(), allowed);
    }
}
