//! Event lifecycle rules: which fields may change in which status, and which
//! status moves are legal.
//!
//! The rules are a table keyed by `(EventStatus, EventField)` plus a handful of
//! cross-field guards:
//!
//! ```text
//!               Draft  Published  Ongoing  Completed  Closed
//! any field       ✓        -         -         -        -
//! description     ✓        ✓         -         -        -
//! deadline        ✓        ✓         -         -        -
//! limit           ✓     ✓ (up)       -         -        -
//! status          ✓        ✓         ✓         ✓        ✓
//!
//! status graph:  Draft ──▶ Published ──▶ Ongoing ──▶ Completed
//!                  │           │            │
//!                  └───────────┴────────────┴──────▶ Closed
//! ```
//!
//! Completed and Closed are terminal. Requesting the current status is a no-op.
//!
//! These functions are pure. Callers must evaluate them against the persisted
//! event they are about to overwrite (see `EventLifecycle` in the engine, which
//! re-evaluates after every optimistic-concurrency conflict).

use crate::error::EngineError;
use crate::event::{Event, EventChanges, EventDraft, EventField, EventStatus, EventType};
use chrono::{DateTime, Utc};

const PUBLISHED_EDITABLE: &[EventField] = &[
    EventField::Description,
    EventField::RegistrationDeadline,
    EventField::RegistrationLimit,
    EventField::Status,
];

const STATUS_ONLY: &[EventField] = &[EventField::Status];

/// Fields an organizer may touch while the event is in `status`.
#[must_use]
pub const fn editable_fields(status: EventStatus) -> &'static [EventField] {
    match status {
        EventStatus::Draft => &EventField::ALL,
        EventStatus::Published => PUBLISHED_EDITABLE,
        EventStatus::Ongoing | EventStatus::Completed | EventStatus::Closed => STATUS_ONLY,
    }
}

/// Lookup in the edit table.
#[must_use]
pub fn is_field_editable(status: EventStatus, field: EventField) -> bool {
    editable_fields(status).contains(&field)
}

/// Whether the status graph permits moving from `from` to `to`.
///
/// Staying in the same status is always permitted.
#[must_use]
pub const fn is_transition_allowed(from: EventStatus, to: EventStatus) -> bool {
    use EventStatus::{Closed, Completed, Draft, Ongoing, Published};

    matches!(
        (from, to),
        (Draft, Draft | Published | Closed)
            | (Published, Published | Ongoing | Closed)
            | (Ongoing, Ongoing | Completed | Closed)
            | (Completed, Completed)
            | (Closed, Closed)
    )
}

/// Check a requested change against the edit table only.
///
/// # Errors
///
/// Returns [`EngineError::InvalidTransition`] naming the first forbidden field.
pub fn check_edit(status: EventStatus, changes: &EventChanges) -> Result<(), EngineError> {
    if let Some(field) = changes
        .touched_fields()
        .into_iter()
        .find(|field| !is_field_editable(status, *field))
    {
        return Err(EngineError::InvalidTransition(format!(
            "field {field:?} cannot be edited while the event is {status}"
        )));
    }
    Ok(())
}

/// Apply `changes` to `current`, enforcing every lifecycle rule.
///
/// `current` must be the persisted state the result will overwrite.
///
/// # Errors
///
/// - [`EngineError::InvalidTransition`] if a forbidden field is touched, the
///   registration limit would decrease while Published, or the status move is
///   not in the graph
/// - [`EngineError::InvalidInput`] if the resulting event violates a value
///   constraint (limit or team size below 1, start after end)
pub fn apply_changes(
    current: &Event,
    changes: &EventChanges,
    now: DateTime<Utc>,
) -> Result<Event, EngineError> {
    check_edit(current.status, changes)?;

    if current.status == EventStatus::Published {
        if let Some(limit) = changes.registration_limit {
            if limit < current.registration_limit {
                return Err(EngineError::InvalidTransition(format!(
                    "registration limit cannot decrease once published ({} -> {limit})",
                    current.registration_limit
                )));
            }
        }
    }

    if let Some(to) = changes.status {
        if !is_transition_allowed(current.status, to) {
            return Err(EngineError::InvalidTransition(format!(
                "status cannot move from {} to {to}",
                current.status
            )));
        }
    }

    let mut next = current.clone();
    let EventChanges {
        name,
        description,
        event_type,
        eligibility,
        registration_deadline,
        event_start,
        event_end,
        registration_limit,
        fee,
        tags,
        is_team_event,
        team_size,
        custom_form_fields,
        merchandise,
        status,
    } = changes.clone();

    if let Some(v) = name {
        next.name = v;
    }
    if let Some(v) = description {
        next.description = v;
    }
    if let Some(v) = event_type {
        next.event_type = v;
    }
    if let Some(v) = eligibility {
        next.eligibility = v;
    }
    if let Some(v) = registration_deadline {
        next.registration_deadline = v;
    }
    if let Some(v) = event_start {
        next.event_start = v;
    }
    if let Some(v) = event_end {
        next.event_end = v;
    }
    if let Some(v) = registration_limit {
        next.registration_limit = v;
    }
    if let Some(v) = fee {
        next.fee = v;
    }
    if let Some(v) = tags {
        next.tags = v;
    }
    if let Some(v) = is_team_event {
        next.is_team_event = v;
    }
    if let Some(v) = team_size {
        next.team_size = v;
    }
    if let Some(v) = custom_form_fields {
        next.custom_form_fields = v;
    }
    if let Some(v) = merchandise {
        next.merchandise = Some(v);
    }
    if let Some(v) = status {
        next.status = v;
    }

    validate_values(
        &next.name,
        next.registration_limit,
        next.team_size,
        next.event_start,
        next.event_end,
    )?;
    validate_merchandise(next.event_type, next.merchandise.as_ref())?;

    next.updated_at = now;
    Ok(next)
}

/// Validate an organizer's draft before the event is created.
///
/// # Errors
///
/// Returns [`EngineError::InvalidInput`] describing the first violated constraint.
pub fn validate_draft(draft: &EventDraft) -> Result<(), EngineError> {
    validate_values(
        &draft.name,
        draft.registration_limit,
        draft.team_size,
        draft.event_start,
        draft.event_end,
    )?;
    validate_merchandise(draft.event_type, draft.merchandise.as_ref())
}

fn validate_values(
    name: &str,
    registration_limit: u32,
    team_size: u32,
    event_start: DateTime<Utc>,
    event_end: DateTime<Utc>,
) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::InvalidInput(
            "event name cannot be empty".to_string(),
        ));
    }
    if registration_limit < 1 {
        return Err(EngineError::InvalidInput(
            "registration limit must be at least 1".to_string(),
        ));
    }
    if team_size < 1 {
        return Err(EngineError::InvalidInput(
            "team size must be at least 1".to_string(),
        ));
    }
    if event_start > event_end {
        return Err(EngineError::InvalidInput(format!(
            "event starts ({event_start}) after it ends ({event_end})"
        )));
    }
    Ok(())
}

fn validate_merchandise(
    event_type: EventType,
    merchandise: Option<&crate::event::MerchandiseDetails>,
) -> Result<(), EngineError> {
    if let (EventType::Merchandise, Some(details)) = (event_type, merchandise) {
        if details.purchase_limit_per_participant < 1 {
            return Err(EngineError::InvalidInput(
                "purchase limit per participant must be at least 1".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::event::FormField;
    use crate::event::FormFieldKind;
    use crate::ids::{EventId, OrganizerId};
    use chrono::Duration;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn event(status: EventStatus, limit: u32) -> Event {
        let draft = EventDraft {
            name: "Hackathon".to_string(),
            description: "24h build".to_string(),
            event_type: EventType::Normal,
            eligibility: None,
            registration_deadline: now() + Duration::days(5),
            event_start: now() + Duration::days(7),
            event_end: now() + Duration::days(8),
            registration_limit: limit,
            fee: 0,
            tags: vec![],
            is_team_event: false,
            team_size: 1,
            custom_form_fields: vec![],
            merchandise: None,
        };
        let mut event = Event::from_draft(EventId::new(), OrganizerId::new(), draft, now());
        event.status = status;
        event
    }

    fn every_field_changed() -> EventChanges {
        EventChanges {
            name: Some("Renamed".to_string()),
            description: Some("Longer description".to_string()),
            event_type: Some(EventType::Normal),
            eligibility: Some("Students only".to_string()),
            registration_deadline: Some(now() + Duration::days(6)),
            event_start: Some(now() + Duration::days(9)),
            event_end: Some(now() + Duration::days(10)),
            registration_limit: Some(50),
            fee: Some(200),
            tags: Some(vec!["tech".to_string()]),
            is_team_event: Some(true),
            team_size: Some(4),
            custom_form_fields: Some(vec![FormField {
                label: "GitHub".to_string(),
                kind: FormFieldKind::Text,
                options: vec![],
                required: true,
                order: 0,
            }]),
            merchandise: None,
            status: Some(EventStatus::Published),
        }
    }

    #[test]
    fn draft_accepts_every_field() {
        let current = event(EventStatus::Draft, 10);
        let updated = apply_changes(&current, &every_field_changed(), now()).unwrap();

        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.eligibility, "Students only");
        assert_eq!(updated.registration_limit, 50);
        assert_eq!(updated.fee, 200);
        assert!(updated.is_team_event);
        assert_eq!(updated.team_size, 4);
        assert_eq!(updated.custom_form_fields.len(), 1);
        assert_eq!(updated.status, EventStatus::Published);
        assert_eq!(updated.organizer_id, current.organizer_id);
    }

    #[test]
    fn draft_may_lower_the_limit() {
        let current = event(EventStatus::Draft, 10);
        let changes = EventChanges {
            registration_limit: Some(3),
            ..EventChanges::default()
        };
        assert_eq!(
            apply_changes(&current, &changes, now())
                .unwrap()
                .registration_limit,
            3
        );
    }

    #[test]
    fn published_rejects_limit_decrease() {
        let current = event(EventStatus::Published, 10);
        let changes = EventChanges {
            registration_limit: Some(9),
            ..EventChanges::default()
        };
        let error = apply_changes(&current, &changes, now()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidTransition);
    }

    #[test]
    fn published_rejects_fields_outside_the_allowed_set() {
        let current = event(EventStatus::Published, 10);
        let changes = EventChanges {
            name: Some(current.name.clone()),
            ..EventChanges::default()
        };
        let error = apply_changes(&current, &changes, now()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidTransition);
    }

    #[test]
    fn published_allows_description_deadline_and_close() {
        let current = event(EventStatus::Published, 10);
        let changes = EventChanges {
            description: Some("Updated".to_string()),
            registration_deadline: Some(now() + Duration::days(6)),
            registration_limit: Some(10),
            status: Some(EventStatus::Closed),
            ..EventChanges::default()
        };
        let updated = apply_changes(&current, &changes, now()).unwrap();
        assert_eq!(updated.description, "Updated");
        assert_eq!(updated.status, EventStatus::Closed);
    }

    #[test]
    fn ongoing_rejects_description_but_completes() {
        let current = event(EventStatus::Ongoing, 10);
        let description = EventChanges {
            description: Some("late edit".to_string()),
            ..EventChanges::default()
        };
        assert_eq!(
            apply_changes(&current, &description, now())
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidTransition
        );

        let completed = apply_changes(
            &current,
            &EventChanges::status(EventStatus::Completed),
            now(),
        )
        .unwrap();
        assert_eq!(completed.status, EventStatus::Completed);
    }

    #[test]
    fn terminal_statuses_never_reopen() {
        for terminal in [EventStatus::Completed, EventStatus::Closed] {
            for to in EventStatus::ALL {
                assert_eq!(is_transition_allowed(terminal, to), to == terminal);
            }
        }
    }

    #[test]
    fn nothing_moves_back_to_draft_or_published() {
        for from in [
            EventStatus::Ongoing,
            EventStatus::Completed,
            EventStatus::Closed,
        ] {
            assert!(!is_transition_allowed(from, EventStatus::Draft));
            assert!(!is_transition_allowed(from, EventStatus::Published));
        }
        assert!(!is_transition_allowed(
            EventStatus::Published,
            EventStatus::Draft
        ));
    }

    #[test]
    fn draft_cannot_jump_to_ongoing() {
        let current = event(EventStatus::Draft, 10);
        let error = apply_changes(&current, &EventChanges::status(EventStatus::Ongoing), now())
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidTransition);
    }

    #[test]
    fn zero_limit_is_invalid_input() {
        let current = event(EventStatus::Draft, 10);
        let changes = EventChanges {
            registration_limit: Some(0),
            ..EventChanges::default()
        };
        assert_eq!(
            apply_changes(&current, &changes, now()).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
    }

    fn status_strategy() -> impl Strategy<Value = EventStatus> {
        prop::sample::select(EventStatus::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn published_limit_edits_are_monotonic(current in 1u32..500, requested in 1u32..500) {
            let event = event(EventStatus::Published, current);
            let changes = EventChanges {
                registration_limit: Some(requested),
                ..EventChanges::default()
            };
            let result = apply_changes(&event, &changes, now());
            if requested >= current {
                prop_assert_eq!(result.unwrap().registration_limit, requested);
            } else {
                prop_assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidTransition);
            }
        }

        #[test]
        fn edit_table_matches_check_edit(status in status_strategy(), index in 0usize..EventField::ALL.len()) {
            let field = EventField::ALL[index];
            let changes = match field {
                EventField::Name => EventChanges { name: Some("n".into()), ..EventChanges::default() },
                EventField::Description => EventChanges { description: Some("d".into()), ..EventChanges::default() },
                EventField::EventType => EventChanges { event_type: Some(EventType::Normal), ..EventChanges::default() },
                EventField::Eligibility => EventChanges { eligibility: Some("e".into()), ..EventChanges::default() },
                EventField::RegistrationDeadline => EventChanges { registration_deadline: Some(now()), ..EventChanges::default() },
                EventField::EventStart => EventChanges { event_start: Some(now()), ..EventChanges::default() },
                EventField::EventEnd => EventChanges { event_end: Some(now()), ..EventChanges::default() },
                EventField::RegistrationLimit => EventChanges { registration_limit: Some(1), ..EventChanges::default() },
                EventField::Fee => EventChanges { fee: Some(1), ..EventChanges::default() },
                EventField::Tags => EventChanges { tags: Some(vec![]), ..EventChanges::default() },
                EventField::IsTeamEvent => EventChanges { is_team_event: Some(false), ..EventChanges::default() },
                EventField::TeamSize => EventChanges { team_size: Some(1), ..EventChanges::default() },
                EventField::CustomFormFields => EventChanges { custom_form_fields: Some(vec![]), ..EventChanges::default() },
                EventField::Merchandise => EventChanges { merchandise: None, ..EventChanges::default() },
                EventField::Status => EventChanges::status(status),
            };
            if changes.is_empty() {
                return Ok(());
            }
            prop_assert_eq!(check_edit(status, &changes).is_ok(), is_field_editable(status, field));
        }
    }
}
