//! Event entity, its status, and the request types used to create and edit it.

use crate::ids::{EventId, OrganizerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Event lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventStatus {
    /// Being configured by the organizer, not visible to participants
    Draft,
    /// Visible and accepting registrations
    Published,
    /// Running; registrations still accepted until the deadline
    Ongoing,
    /// Finished
    Completed,
    /// Closed by the organizer
    Closed,
}

impl EventStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Draft,
        Self::Published,
        Self::Ongoing,
        Self::Completed,
        Self::Closed,
    ];

    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
            Self::Closed => "closed",
        }
    }

    /// Parse status from database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "published" => Some(Self::Published),
            "ongoing" => Some(Self::Ongoing),
            "completed" => Some(Self::Completed),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    /// Whether participants may register, join teams or order in this status.
    #[must_use]
    pub const fn accepts_registrations(self) -> bool {
        matches!(self, Self::Published | Self::Ongoing)
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What participants get out of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Seats (individual or team registrations)
    Normal,
    /// Merchandise sold through approved orders
    Merchandise,
}

impl EventType {
    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Merchandise => "merchandise",
        }
    }

    /// Parse from database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(Self::Normal),
            "merchandise" => Some(Self::Merchandise),
            _ => None,
        }
    }
}

/// Input widget for a custom registration form field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormFieldKind {
    /// Free text
    Text,
    /// One of `options`
    Dropdown,
    /// Boolean tick box
    Checkbox,
    /// Uploaded file reference
    File,
}

/// A custom field participants fill in when registering.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    /// Label shown to participants
    pub label: String,
    /// Input widget
    pub kind: FormFieldKind,
    /// Choices (dropdown only)
    #[serde(default)]
    pub options: Vec<String>,
    /// Whether a value must be supplied
    #[serde(default)]
    pub required: bool,
    /// Display position
    pub order: u32,
}

/// A purchasable variant of a merchandise item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    /// Size label, if the item comes in sizes
    pub size: Option<String>,
    /// Colour label, if the item comes in colours
    pub color: Option<String>,
    /// Units left
    pub stock: u32,
}

impl Variant {
    /// Whether this variant is the one described by `size`/`color`.
    #[must_use]
    pub fn matches(&self, size: Option<&str>, color: Option<&str>) -> bool {
        self.size.as_deref() == size && self.color.as_deref() == color
    }
}

/// Merchandise-specific event settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchandiseDetails {
    /// Item being sold
    pub item_name: String,
    /// Available variants with stock
    #[serde(default)]
    pub variants: Vec<Variant>,
    /// Maximum quantity per order
    pub purchase_limit_per_participant: u32,
}

/// Event entity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier
    pub id: EventId,
    /// Owning organizer (immutable after creation)
    pub organizer_id: OrganizerId,
    /// Event name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Normal or merchandise
    pub event_type: EventType,
    /// Who may take part
    pub eligibility: String,
    /// Last instant registrations are accepted
    pub registration_deadline: DateTime<Utc>,
    /// When the event starts
    pub event_start: DateTime<Utc>,
    /// When the event ends
    pub event_end: DateTime<Utc>,
    /// Maximum number of confirmed registrations (>= 1)
    pub registration_limit: u32,
    /// Entry fee, 0 for free events
    pub fee: u32,
    /// Search tags
    pub tags: Vec<String>,
    /// Current lifecycle status
    pub status: EventStatus,
    /// Whether participants register as teams
    pub is_team_event: bool,
    /// Members per team (meaningful only for team events)
    pub team_size: u32,
    /// Custom registration form
    pub custom_form_fields: Vec<FormField>,
    /// Merchandise settings (merchandise events only)
    pub merchandise: Option<MerchandiseDetails>,
    /// When the event was created
    pub created_at: DateTime<Utc>,
    /// When the event was last modified
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Creates a new `Draft` event from an organizer's draft.
    #[must_use]
    pub fn from_draft(
        id: EventId,
        organizer_id: OrganizerId,
        draft: EventDraft,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            organizer_id,
            name: draft.name,
            description: draft.description,
            event_type: draft.event_type,
            eligibility: draft
                .eligibility
                .unwrap_or_else(|| DEFAULT_ELIGIBILITY.to_string()),
            registration_deadline: draft.registration_deadline,
            event_start: draft.event_start,
            event_end: draft.event_end,
            registration_limit: draft.registration_limit,
            fee: draft.fee,
            tags: draft.tags,
            status: EventStatus::Draft,
            is_team_event: draft.is_team_event,
            team_size: draft.team_size,
            custom_form_fields: draft.custom_form_fields,
            merchandise: draft.merchandise,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `organizer_id` owns this event.
    #[must_use]
    pub fn is_owned_by(&self, organizer_id: OrganizerId) -> bool {
        self.organizer_id == organizer_id
    }

    /// Whether the deadline has not yet passed at `now` (inclusive).
    #[must_use]
    pub fn deadline_open_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.registration_deadline
    }

    /// Merchandise variant matching `size`/`color`, if declared.
    #[must_use]
    pub fn variant(&self, size: Option<&str>, color: Option<&str>) -> Option<&Variant> {
        self.merchandise
            .as_ref()
            .and_then(|m| m.variants.iter().find(|v| v.matches(size, color)))
    }
}

/// Default eligibility text for new events.
pub const DEFAULT_ELIGIBILITY: &str = "Open to All";

/// Everything an organizer supplies to create an event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    /// Event name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Normal or merchandise
    pub event_type: EventType,
    /// Eligibility text (defaults to "Open to All")
    #[serde(default)]
    pub eligibility: Option<String>,
    /// Registration deadline
    pub registration_deadline: DateTime<Utc>,
    /// Start
    pub event_start: DateTime<Utc>,
    /// End
    pub event_end: DateTime<Utc>,
    /// Seat limit (>= 1)
    pub registration_limit: u32,
    /// Entry fee
    #[serde(default)]
    pub fee: u32,
    /// Tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Team registrations
    #[serde(default)]
    pub is_team_event: bool,
    /// Team size (>= 1)
    #[serde(default = "default_team_size")]
    pub team_size: u32,
    /// Custom form
    #[serde(default)]
    pub custom_form_fields: Vec<FormField>,
    /// Merchandise settings
    #[serde(default)]
    pub merchandise: Option<MerchandiseDetails>,
}

const fn default_team_size() -> u32 {
    1
}

/// Editable fields of an event, used as keys of the lifecycle edit table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventField {
    /// `name`
    Name,
    /// `description`
    Description,
    /// `event_type`
    EventType,
    /// `eligibility`
    Eligibility,
    /// `registration_deadline`
    RegistrationDeadline,
    /// `event_start`
    EventStart,
    /// `event_end`
    EventEnd,
    /// `registration_limit`
    RegistrationLimit,
    /// `fee`
    Fee,
    /// `tags`
    Tags,
    /// `is_team_event`
    IsTeamEvent,
    /// `team_size`
    TeamSize,
    /// `custom_form_fields`
    CustomFormFields,
    /// `merchandise`
    Merchandise,
    /// `status`
    Status,
}

impl EventField {
    /// All fields.
    pub const ALL: [Self; 15] = [
        Self::Name,
        Self::Description,
        Self::EventType,
        Self::Eligibility,
        Self::RegistrationDeadline,
        Self::EventStart,
        Self::EventEnd,
        Self::RegistrationLimit,
        Self::Fee,
        Self::Tags,
        Self::IsTeamEvent,
        Self::TeamSize,
        Self::CustomFormFields,
        Self::Merchandise,
        Self::Status,
    ];
}

/// A partial update requested by an organizer. `None` means "leave unchanged".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventChanges {
    /// New name
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New event type
    pub event_type: Option<EventType>,
    /// New eligibility text
    pub eligibility: Option<String>,
    /// New registration deadline
    pub registration_deadline: Option<DateTime<Utc>>,
    /// New start
    pub event_start: Option<DateTime<Utc>>,
    /// New end
    pub event_end: Option<DateTime<Utc>>,
    /// New seat limit
    pub registration_limit: Option<u32>,
    /// New fee
    pub fee: Option<u32>,
    /// New tags
    pub tags: Option<Vec<String>>,
    /// Toggle team registrations
    pub is_team_event: Option<bool>,
    /// New team size
    pub team_size: Option<u32>,
    /// New custom form
    pub custom_form_fields: Option<Vec<FormField>>,
    /// New merchandise settings
    pub merchandise: Option<MerchandiseDetails>,
    /// New status
    pub status: Option<EventStatus>,
}

impl EventChanges {
    /// A change that only moves the status.
    #[must_use]
    pub fn status(status: EventStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Fields this change touches, in [`EventField::ALL`] order.
    #[must_use]
    pub fn touched_fields(&self) -> Vec<EventField> {
        let touched = [
            (EventField::Name, self.name.is_some()),
            (EventField::Description, self.description.is_some()),
            (EventField::EventType, self.event_type.is_some()),
            (EventField::Eligibility, self.eligibility.is_some()),
            (
                EventField::RegistrationDeadline,
                self.registration_deadline.is_some(),
            ),
            (EventField::EventStart, self.event_start.is_some()),
            (EventField::EventEnd, self.event_end.is_some()),
            (
                EventField::RegistrationLimit,
                self.registration_limit.is_some(),
            ),
            (EventField::Fee, self.fee.is_some()),
            (EventField::Tags, self.tags.is_some()),
            (EventField::IsTeamEvent, self.is_team_event.is_some()),
            (EventField::TeamSize, self.team_size.is_some()),
            (
                EventField::CustomFormFields,
                self.custom_form_fields.is_some(),
            ),
            (EventField::Merchandise, self.merchandise.is_some()),
            (EventField::Status, self.status.is_some()),
        ];
        touched
            .into_iter()
            .filter_map(|(field, set)| set.then_some(field))
            .collect()
    }

    /// Whether no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.touched_fields().is_empty()
    }
}
