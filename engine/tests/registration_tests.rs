//! Integration tests for individual registration.
//!
//! Every precondition has its own error, and they are evaluated in a fixed
//! order. These tests pin both.

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code uses expect for clear failure messages

use chrono::Duration;
use felicity_core::environment::Clock;
use felicity_core::error::{EngineError, ErrorKind};
use felicity_core::event::{Event, EventDraft, EventStatus};
use felicity_core::ids::{EventId, OrganizerId, ParticipantId};
use felicity_core::registration::{FormData, RegistrationStatus};
use felicity_engine::{Engine, EngineEnvironment, RetryPolicy};
use felicity_testing::renderer::{FailingRenderer, RecordingRenderer};
use felicity_testing::{FixedClock, InMemoryStore, ScriptedStore, helpers, test_clock};
use std::sync::Arc;

// ============================================================================
// Test Fixtures
// ============================================================================

struct Harness {
    engine: Engine,
    store: InMemoryStore,
    clock: FixedClock,
    organizer: OrganizerId,
}

fn environment(store: &InMemoryStore, clock: &FixedClock) -> EngineEnvironment {
    EngineEnvironment::new(Arc::new(store.clone()))
        .with_clock(Arc::new(clock.clone()))
        .with_retry_policy(RetryPolicy::immediate(5))
}

fn harness() -> Harness {
    let store = InMemoryStore::new();
    let clock = test_clock();
    Harness {
        engine: Engine::new(environment(&store, &clock)),
        store,
        clock,
        organizer: OrganizerId::new(),
    }
}

impl Harness {
    async fn published(&self, draft: EventDraft) -> Event {
        let event = self
            .engine
            .create_event(self.organizer, draft)
            .await
            .expect("create event");
        self.engine
            .transition_status(event.id, EventStatus::Published, self.organizer)
            .await
            .expect("publish event")
    }

    /// The same store and renderer-less environment, seen at another instant.
    fn engine_at(&self, clock: FixedClock) -> Engine {
        Engine::new(environment(&self.store, &clock))
    }

    async fn register(&self, event_id: EventId, participant: ParticipantId) -> Result<(), EngineError> {
        self.engine
            .register_participant(event_id, participant, FormData::new())
            .await
            .map(|_| ())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn registration_issues_a_confirmed_ticket() {
    let h = harness();
    let event = h.published(helpers::normal_event_draft(h.clock.now(), 10)).await;
    let participant = ParticipantId::new();

    let mut form_data = FormData::new();
    form_data.insert("roll_number".to_string(), serde_json::json!("2021101001"));

    let registration = h
        .engine
        .register_participant(event.id, participant, form_data.clone())
        .await
        .unwrap();

    assert_eq!(registration.status, RegistrationStatus::Confirmed);
    assert_eq!(registration.form_data, form_data);
    assert!(registration.team_id.is_none());
    assert!(registration.ticket_id.as_str().starts_with("FEL-"));
    assert!(registration.qr_reference.ends_with(registration.ticket_id.as_str()));
    assert_eq!(h.engine.seats_remaining(event.id).await.unwrap(), 9);

    let tickets = h.engine.participant_tickets(participant).await.unwrap();
    assert_eq!(tickets, vec![registration]);
}

#[tokio::test]
async fn unknown_event_is_not_found() {
    let h = harness();
    let error = h.register(EventId::new(), ParticipantId::new()).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn merchandise_and_team_events_reject_individual_registration() {
    let h = harness();
    let now = h.clock.now();
    let merch = h.published(helpers::merchandise_event_draft(now, 5)).await;
    let team = h.published(helpers::team_event_draft(now, 10, 3)).await;

    for event_id in [merch.id, team.id] {
        let error = h.register(event_id, ParticipantId::new()).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::WrongEventType);
    }
}

#[tokio::test]
async fn drafts_and_finished_events_are_closed() {
    let h = harness();
    let draft = h
        .engine
        .create_event(h.organizer, helpers::normal_event_draft(h.clock.now(), 10))
        .await
        .unwrap();

    let error = h.register(draft.id, ParticipantId::new()).await.unwrap_err();
    assert!(matches!(
        error,
        EngineError::RegistrationClosed { status: EventStatus::Draft, .. }
    ));

    let event = h.published(helpers::normal_event_draft(h.clock.now(), 10)).await;
    for status in [EventStatus::Ongoing, EventStatus::Completed] {
        h.engine
            .transition_status(event.id, status, h.organizer)
            .await
            .unwrap();
    }
    let error = h.register(event.id, ParticipantId::new()).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::RegistrationClosed);
}

#[tokio::test]
async fn ongoing_events_still_accept_registrations() {
    let h = harness();
    let event = h.published(helpers::normal_event_draft(h.clock.now(), 10)).await;
    h.engine
        .transition_status(event.id, EventStatus::Ongoing, h.organizer)
        .await
        .unwrap();

    h.register(event.id, ParticipantId::new()).await.unwrap();
}

#[tokio::test]
async fn deadline_is_inclusive() {
    let h = harness();
    let event = h.published(helpers::normal_event_draft(h.clock.now(), 10)).await;

    let at_deadline = h.engine_at(FixedClock::new(event.registration_deadline));
    at_deadline
        .register_participant(event.id, ParticipantId::new(), FormData::new())
        .await
        .unwrap();

    let late = h.engine_at(FixedClock::new(
        event.registration_deadline + Duration::seconds(1),
    ));
    let error = late
        .register_participant(event.id, ParticipantId::new(), FormData::new())
        .await
        .unwrap_err();
    assert!(matches!(error, EngineError::DeadlinePassed { deadline } if deadline == event.registration_deadline));
}

#[tokio::test]
async fn closed_status_is_reported_before_the_deadline() {
    let h = harness();
    let event = h.published(helpers::normal_event_draft(h.clock.now(), 10)).await;
    h.engine
        .transition_status(event.id, EventStatus::Closed, h.organizer)
        .await
        .unwrap();

    let late = h.engine_at(FixedClock::new(event.registration_deadline + Duration::days(1)));
    let error = late
        .register_participant(event.id, ParticipantId::new(), FormData::new())
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::RegistrationClosed);
}

#[tokio::test]
async fn second_registration_is_already_registered_even_when_full() {
    let h = harness();
    let event = h.published(helpers::normal_event_draft(h.clock.now(), 1)).await;
    let participant = ParticipantId::new();

    h.register(event.id, participant).await.unwrap();
    let error = h.register(event.id, participant).await.unwrap_err();
    assert!(matches!(
        error,
        EngineError::AlreadyRegistered { participant_id, .. } if participant_id == participant
    ));

    let error = h.register(event.id, ParticipantId::new()).await.unwrap_err();
    assert!(matches!(error, EngineError::CapacityExceeded { limit: 1, .. }));
    assert_eq!(h.store.registration_count(event.id), 1);
}

#[tokio::test]
async fn ticket_collisions_are_reminted() {
    let h = harness();
    let event = h.published(helpers::normal_event_draft(h.clock.now(), 10)).await;
    h.store.force_ticket_collisions(3);

    h.register(event.id, ParticipantId::new()).await.unwrap();
    assert_eq!(h.store.registration_count(event.id), 1);
    assert_eq!(h.engine.seats_remaining(event.id).await.unwrap(), 9);
}

#[tokio::test]
async fn ticket_collisions_beyond_the_retry_budget_surface_as_storage_errors() {
    let h = harness();
    let event = h.published(helpers::normal_event_draft(h.clock.now(), 10)).await;
    h.store.force_ticket_collisions(100);

    let error = h.register(event.id, ParticipantId::new()).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Storage);
    assert_eq!(h.store.registration_count(event.id), 0);
    assert_eq!(h.engine.seats_remaining(event.id).await.unwrap(), 10);
}

#[tokio::test]
async fn attendees_are_visible_to_the_organizer_only() {
    let h = harness();
    let event = h.published(helpers::normal_event_draft(h.clock.now(), 10)).await;
    h.register(event.id, ParticipantId::new()).await.unwrap();
    h.register(event.id, ParticipantId::new()).await.unwrap();

    let attendees = h.engine.event_attendees(event.id, h.organizer).await.unwrap();
    assert_eq!(attendees.len(), 2);

    let error = h
        .engine
        .event_attendees(event.id, OrganizerId::new())
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Unauthorized);
}

#[tokio::test]
async fn issued_tickets_are_rendered_in_the_background() {
    let store = InMemoryStore::new();
    let clock = test_clock();
    let renderer = RecordingRenderer::new();
    let engine = Engine::new(environment(&store, &clock).with_renderer(Arc::new(renderer.clone())));
    let organizer = OrganizerId::new();

    let event = engine
        .create_event(organizer, helpers::normal_event_draft(clock.now(), 10))
        .await
        .unwrap();
    engine
        .transition_status(event.id, EventStatus::Published, organizer)
        .await
        .unwrap();
    let registration = engine
        .register_participant(event.id, ParticipantId::new(), FormData::new())
        .await
        .unwrap();

    assert_eq!(renderer.wait_for(1).await, vec![registration.ticket_id]);
}

#[tokio::test]
async fn renderer_failures_do_not_affect_registration() {
    let store = InMemoryStore::new();
    let clock = test_clock();
    let engine = Engine::new(environment(&store, &clock).with_renderer(Arc::new(FailingRenderer)));
    let organizer = OrganizerId::new();

    let event = engine
        .create_event(organizer, helpers::normal_event_draft(clock.now(), 10))
        .await
        .unwrap();
    engine
        .transition_status(event.id, EventStatus::Published, organizer)
        .await
        .unwrap();

    let registration = engine
        .register_participant(event.id, ParticipantId::new(), FormData::new())
        .await
        .unwrap();
    assert_eq!(registration.status, RegistrationStatus::Confirmed);
    assert_eq!(store.registration_count(event.id), 1);
}

// ============================================================================
// Close Landing Mid-Registration
// ============================================================================

#[tokio::test]
async fn close_between_read_and_admission_refuses_the_registration() {
    let store = ScriptedStore::new();
    let clock = test_clock();
    let engine = Engine::new(
        EngineEnvironment::new(Arc::new(store.clone()))
            .with_clock(Arc::new(clock.clone()))
            .with_retry_policy(RetryPolicy::immediate(5)),
    );
    let organizer = OrganizerId::new();
    let event = engine
        .create_event(organizer, helpers::normal_event_draft(clock.now(), 10))
        .await
        .unwrap();
    engine
        .transition_status(event.id, EventStatus::Published, organizer)
        .await
        .unwrap();

    store.close_before_next_write(event.id);
    let error = engine
        .register_participant(event.id, ParticipantId::new(), FormData::new())
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        EngineError::RegistrationClosed { event_id, status: EventStatus::Closed } if event_id == event.id
    ));
    assert_eq!(engine.event(event.id).await.unwrap().status, EventStatus::Closed);
    assert_eq!(store.inner().registration_count(event.id), 0);
    assert_eq!(engine.seats_remaining(event.id).await.unwrap(), 10);
}
