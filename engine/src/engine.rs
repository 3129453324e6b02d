//! The `Engine` facade: one handle over every workflow.

use crate::environment::EngineEnvironment;
use crate::ledger::CapacityLedger;
use crate::lifecycle::EventLifecycle;
use crate::merchandise::{MerchandiseOrders, OrderRequest};
use crate::registration::RegistrationWorkflow;
use crate::team::TeamFormation;
use felicity_core::error::EngineError;
use felicity_core::event::{Event, EventChanges, EventDraft, EventStatus};
use felicity_core::ids::{EventId, OrderId, OrganizerId, ParticipantId, TeamId};
use felicity_core::order::{Order, OrderDecision};
use felicity_core::registration::{FormData, Registration};
use felicity_core::team::Team;

/// Entry point for request handlers.
///
/// Holds no mutable state of its own; clone it freely and call it from as
/// many tasks or processes as needed. All exclusivity lives in the store.
#[derive(Clone)]
pub struct Engine {
    lifecycle: EventLifecycle,
    ledger: CapacityLedger,
    registrations: RegistrationWorkflow,
    teams: TeamFormation,
    orders: MerchandiseOrders,
}

impl Engine {
    /// Build every workflow over one environment.
    #[must_use]
    pub fn new(env: EngineEnvironment) -> Self {
        Self {
            lifecycle: EventLifecycle::new(env.clone()),
            ledger: CapacityLedger::new(env.clone()),
            registrations: RegistrationWorkflow::new(env.clone()),
            teams: TeamFormation::new(env.clone()),
            orders: MerchandiseOrders::new(env),
        }
    }

    /// Event creation and edits.
    #[must_use]
    pub const fn lifecycle(&self) -> &EventLifecycle {
        &self.lifecycle
    }

    /// Seat accounting.
    #[must_use]
    pub const fn ledger(&self) -> &CapacityLedger {
        &self.ledger
    }

    /// Individual registration.
    #[must_use]
    pub const fn registrations(&self) -> &RegistrationWorkflow {
        &self.registrations
    }

    /// Team formation.
    #[must_use]
    pub const fn teams(&self) -> &TeamFormation {
        &self.teams
    }

    /// Merchandise orders.
    #[must_use]
    pub const fn orders(&self) -> &MerchandiseOrders {
        &self.orders
    }

    /// See [`EventLifecycle::create_event`].
    ///
    /// # Errors
    ///
    /// `InvalidInput` or `Storage`.
    pub async fn create_event(
        &self,
        organizer_id: OrganizerId,
        draft: EventDraft,
    ) -> Result<Event, EngineError> {
        self.lifecycle.create_event(organizer_id, draft).await
    }

    /// See [`EventLifecycle::apply_edit`].
    ///
    /// # Errors
    ///
    /// `NotFound`, `Unauthorized`, `InvalidTransition`, `InvalidInput` or `Storage`.
    pub async fn apply_edit(
        &self,
        event_id: EventId,
        changes: EventChanges,
        organizer_id: OrganizerId,
    ) -> Result<Event, EngineError> {
        self.lifecycle.apply_edit(event_id, changes, organizer_id).await
    }

    /// See [`EventLifecycle::transition_status`].
    ///
    /// # Errors
    ///
    /// `NotFound`, `Unauthorized`, `InvalidTransition` or `Storage`.
    pub async fn transition_status(
        &self,
        event_id: EventId,
        status: EventStatus,
        organizer_id: OrganizerId,
    ) -> Result<Event, EngineError> {
        self.lifecycle
            .transition_status(event_id, status, organizer_id)
            .await
    }

    /// See [`EventLifecycle::organizer_events`].
    ///
    /// # Errors
    ///
    /// `Storage`.
    pub async fn organizer_events(&self, organizer_id: OrganizerId) -> Result<Vec<Event>, EngineError> {
        self.lifecycle.organizer_events(organizer_id).await
    }

    /// See [`EventLifecycle::event`].
    ///
    /// # Errors
    ///
    /// `NotFound` or `Storage`.
    pub async fn event(&self, event_id: EventId) -> Result<Event, EngineError> {
        self.lifecycle.event(event_id).await
    }

    /// See [`CapacityLedger::seats_remaining`].
    ///
    /// # Errors
    ///
    /// `NotFound` or `Storage`.
    pub async fn seats_remaining(&self, event_id: EventId) -> Result<u32, EngineError> {
        self.ledger.seats_remaining(event_id).await
    }

    /// See [`RegistrationWorkflow::register_participant`].
    ///
    /// # Errors
    ///
    /// `NotFound`, `WrongEventType`, `RegistrationClosed`, `DeadlinePassed`,
    /// `AlreadyRegistered`, `CapacityExceeded` or `Storage`.
    pub async fn register_participant(
        &self,
        event_id: EventId,
        participant_id: ParticipantId,
        form_data: FormData,
    ) -> Result<Registration, EngineError> {
        self.registrations
            .register_participant(event_id, participant_id, form_data)
            .await
    }

    /// See [`RegistrationWorkflow::event_attendees`].
    ///
    /// # Errors
    ///
    /// `NotFound`, `Unauthorized` or `Storage`.
    pub async fn event_attendees(
        &self,
        event_id: EventId,
        organizer_id: OrganizerId,
    ) -> Result<Vec<Registration>, EngineError> {
        self.registrations
            .event_attendees(event_id, organizer_id)
            .await
    }

    /// See [`RegistrationWorkflow::participant_tickets`].
    ///
    /// # Errors
    ///
    /// `Storage`.
    pub async fn participant_tickets(
        &self,
        participant_id: ParticipantId,
    ) -> Result<Vec<Registration>, EngineError> {
        self.registrations.participant_tickets(participant_id).await
    }

    /// See [`TeamFormation::create_team`].
    ///
    /// # Errors
    ///
    /// `NotFound`, `WrongEventType`, `RegistrationClosed`, `DeadlinePassed`,
    /// `InvalidInput`, `AlreadyInOtherTeam`, `CapacityExceeded` or `Storage`.
    pub async fn create_team(
        &self,
        event_id: EventId,
        leader_id: ParticipantId,
        team_name: &str,
    ) -> Result<Team, EngineError> {
        self.teams.create_team(event_id, leader_id, team_name).await
    }

    /// See [`TeamFormation::join_team`].
    ///
    /// # Errors
    ///
    /// `InvalidInput`, `NotFound`, `RegistrationClosed`, `AlreadyMember`,
    /// `AlreadyInOtherTeam`, `TeamFull` or `Storage`.
    pub async fn join_team(
        &self,
        invite_code: &str,
        participant_id: ParticipantId,
    ) -> Result<Team, EngineError> {
        self.teams.join_team(invite_code, participant_id).await
    }

    /// See [`TeamFormation::my_teams`].
    ///
    /// # Errors
    ///
    /// `Storage`.
    pub async fn my_teams(&self, participant_id: ParticipantId) -> Result<Vec<Team>, EngineError> {
        self.teams.my_teams(participant_id).await
    }

    /// See [`TeamFormation::team_details`].
    ///
    /// # Errors
    ///
    /// `NotFound`, `Unauthorized` or `Storage`.
    pub async fn team_details(
        &self,
        team_id: TeamId,
        participant_id: ParticipantId,
    ) -> Result<Team, EngineError> {
        self.teams.team_details(team_id, participant_id).await
    }

    /// See [`TeamFormation::reconcile_completed_teams`].
    ///
    /// # Errors
    ///
    /// `Storage`.
    pub async fn reconcile_completed_teams(&self) -> Result<usize, EngineError> {
        self.teams.reconcile_completed_teams().await
    }

    /// See [`MerchandiseOrders::submit_order`].
    ///
    /// # Errors
    ///
    /// `NotFound`, `WrongEventType`, `RegistrationClosed`, `AlreadyRegistered`,
    /// `InvalidInput` or `Storage`.
    pub async fn submit_order(
        &self,
        event_id: EventId,
        participant_id: ParticipantId,
        request: OrderRequest,
    ) -> Result<Order, EngineError> {
        self.orders
            .submit_order(event_id, participant_id, request)
            .await
    }

    /// See [`MerchandiseOrders::verify_order`].
    ///
    /// # Errors
    ///
    /// `NotFound`, `Unauthorized`, `AlreadyProcessed`, `OutOfStock` or `Storage`.
    pub async fn verify_order(
        &self,
        order_id: OrderId,
        organizer_id: OrganizerId,
        decision: OrderDecision,
    ) -> Result<Order, EngineError> {
        self.orders
            .verify_order(order_id, organizer_id, decision)
            .await
    }

    /// See [`MerchandiseOrders::event_orders`].
    ///
    /// # Errors
    ///
    /// `NotFound`, `Unauthorized` or `Storage`.
    pub async fn event_orders(
        &self,
        event_id: EventId,
        organizer_id: OrganizerId,
    ) -> Result<Vec<Order>, EngineError> {
        self.orders.event_orders(event_id, organizer_id).await
    }
}
