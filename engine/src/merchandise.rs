//! Merchandise orders: submission with payment proof, one-shot organizer
//! verification.

use crate::environment::EngineEnvironment;
use crate::ledger::is_ticket_collision;
use crate::metrics::{self, TicketSource};
use crate::retry::retry_with_predicate;
use felicity_core::error::EngineError;
use felicity_core::event::{Event, EventType};
use felicity_core::ids::{EventId, OrderId, OrganizerId, ParticipantId};
use felicity_core::order::{Order, OrderDecision, OrderStatus, VariantChoice};
use felicity_core::store::{Constraint, StoreError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// What a participant asks to buy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Chosen size and color
    pub variant: VariantChoice,
    /// Number of items
    pub quantity: u32,
    /// Reference to the uploaded payment proof
    pub proof_ref: String,
}

/// Purchase limit for merchandise events that declare no details.
const DEFAULT_PURCHASE_LIMIT: u32 = 1;

/// Order submission and verification.
#[derive(Clone)]
pub struct MerchandiseOrders {
    env: EngineEnvironment,
}

impl MerchandiseOrders {
    /// Create the workflow.
    #[must_use]
    pub const fn new(env: EngineEnvironment) -> Self {
        Self { env }
    }

    /// Submit a pending order.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the event does not exist
    /// - `WrongEventType` unless it is a merchandise event
    /// - `RegistrationClosed` unless it is Published or Ongoing
    /// - `AlreadyRegistered` if the participant has a pending or approved order
    /// - `InvalidInput` for a missing proof, an undeclared variant or a
    ///   quantity outside `1..=purchase_limit_per_participant`
    #[tracing::instrument(skip(self, request), fields(quantity = request.quantity))]
    pub async fn submit_order(
        &self,
        event_id: EventId,
        participant_id: ParticipantId,
        request: OrderRequest,
    ) -> Result<Order, EngineError> {
        let event = self.load_event(event_id).await?;

        if event.event_type != EventType::Merchandise {
            return Err(EngineError::wrong_event_type(
                event_id,
                "a merchandise event",
                event.event_type,
                event.is_team_event,
            ));
        }
        if !event.status.accepts_registrations() {
            return Err(EngineError::RegistrationClosed {
                event_id,
                status: event.status,
            });
        }

        // Fast path only; the partial unique index decides races.
        let existing = self.env.store.orders_for_event(event_id).await?;
        if existing
            .iter()
            .any(|order| order.participant_id == participant_id && order.status.is_active())
        {
            return Err(EngineError::AlreadyRegistered {
                event_id,
                participant_id,
            });
        }

        validate_request(&event, &request)?;

        let order = Order::pending(
            event_id,
            participant_id,
            request.variant,
            request.quantity,
            request.proof_ref.trim().to_string(),
            self.env.clock.now(),
        );
        match self.env.store.insert_order(order.clone()).await {
            Ok(()) => {}
            Err(StoreError::UniqueViolation(Constraint::ActiveOrder)) => {
                return Err(EngineError::AlreadyRegistered {
                    event_id,
                    participant_id,
                });
            }
            Err(StoreError::RegistrationClosed(status)) => {
                return Err(EngineError::RegistrationClosed { event_id, status });
            }
            Err(other) => return Err(other.into()),
        }

        metrics::record_order(OrderStatus::Pending.as_str());
        info!(order_id = %order.id, "Order submitted");
        Ok(order)
    }

    /// Approve or reject a pending order. Organizer of the event only.
    ///
    /// Approval mints a ticket and takes the ordered quantity from the
    /// variant's stock in one storage transaction. A second decision on the
    /// same order fails and mints nothing.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Unauthorized`, `AlreadyProcessed`, `OutOfStock`, or `Storage`.
    #[tracing::instrument(skip(self))]
    pub async fn verify_order(
        &self,
        order_id: OrderId,
        organizer_id: OrganizerId,
        decision: OrderDecision,
    ) -> Result<Order, EngineError> {
        let order = self
            .env
            .store
            .load_order(order_id)
            .await?
            .ok_or_else(|| order_not_found(order_id))?;
        let event = self.load_event(order.event_id).await?;
        if !event.is_owned_by(organizer_id) {
            return Err(EngineError::Unauthorized(format!(
                "only the organizer of event {} may verify its orders",
                event.id
            )));
        }
        if order.status != OrderStatus::Pending {
            return Err(EngineError::AlreadyProcessed {
                order_id,
                status: order.status,
            });
        }

        let env = &self.env;
        let now = env.clock.now();
        let decided = retry_with_predicate(
            &env.retry,
            move || {
                let ticket = (decision == OrderDecision::Approved).then(|| env.issuer.issue());
                env.store.decide_order(order_id, decision, ticket, now)
            },
            is_ticket_collision,
        )
        .await
        .map_err(|error| match error {
            StoreError::NotPending(status) => EngineError::AlreadyProcessed { order_id, status },
            StoreError::OutOfStock => EngineError::OutOfStock {
                event_id: order.event_id,
            },
            StoreError::NotFound(_) => order_not_found(order_id),
            other => EngineError::Storage(other),
        });

        let decided = match decided {
            Ok(decided) => decided,
            Err(error) => {
                debug!(error = %error, "Order verification rejected");
                return Err(error);
            }
        };

        metrics::record_order(decided.status.as_str());
        if let Some(ticket) = decided.ticket() {
            metrics::record_tickets_issued(TicketSource::Merchandise, 1);
            self.env.render_in_background(ticket);
        }
        info!(status = %decided.status, "Order verified");
        Ok(decided)
    }

    /// Orders for an event, oldest first. Organizer only.
    ///
    /// # Errors
    ///
    /// `NotFound` if the event does not exist, `Unauthorized` if
    /// `organizer_id` does not own it.
    #[tracing::instrument(skip(self))]
    pub async fn event_orders(
        &self,
        event_id: EventId,
        organizer_id: OrganizerId,
    ) -> Result<Vec<Order>, EngineError> {
        let event = self.load_event(event_id).await?;
        if !event.is_owned_by(organizer_id) {
            return Err(EngineError::Unauthorized(format!(
                "only the organizer of event {event_id} may list its orders"
            )));
        }
        Ok(self.env.store.orders_for_event(event_id).await?)
    }

    async fn load_event(&self, event_id: EventId) -> Result<Event, EngineError> {
        self.env
            .store
            .load_event(event_id)
            .await?
            .map(|versioned| versioned.value)
            .ok_or_else(|| EngineError::event_not_found(event_id))
    }
}

fn order_not_found(order_id: OrderId) -> EngineError {
    EngineError::NotFound {
        entity: "Order",
        id: order_id.to_string(),
    }
}

fn validate_request(event: &Event, request: &OrderRequest) -> Result<(), EngineError> {
    if request.proof_ref.trim().is_empty() {
        return Err(EngineError::InvalidInput(
            "payment proof is required".to_string(),
        ));
    }

    let details = event.merchandise.as_ref();
    let declares_variants = details.is_some_and(|d| !d.variants.is_empty());
    let size = request.variant.size.as_deref();
    let color = request.variant.color.as_deref();
    if declares_variants && event.variant(size, color).is_none() {
        return Err(EngineError::InvalidInput(format!(
            "variant (size {size:?}, color {color:?}) is not offered"
        )));
    }

    let limit = details.map_or(DEFAULT_PURCHASE_LIMIT, |d| d.purchase_limit_per_participant);
    if request.quantity < 1 || request.quantity > limit {
        return Err(EngineError::InvalidInput(format!(
            "quantity must be between 1 and {limit}, got {}",
            request.quantity
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use felicity_core::ids::OrganizerId;
    use felicity_testing::{helpers, test_clock};
    use felicity_core::environment::Clock;

    fn merch_event() -> Event {
        let now = test_clock().now();
        Event::from_draft(
            EventId::new(),
            OrganizerId::new(),
            helpers::merchandise_event_draft(now, 5),
            now,
        )
    }

    fn request(size: Option<&str>, quantity: u32, proof: &str) -> OrderRequest {
        OrderRequest {
            variant: VariantChoice::new(size, Some("Black")),
            quantity,
            proof_ref: proof.to_string(),
        }
    }

    #[test]
    fn accepts_declared_variant_within_limit() {
        assert!(validate_request(&merch_event(), &request(Some("M"), 2, "proof.png")).is_ok());
    }

    #[test]
    fn rejects_blank_proof() {
        let error = validate_request(&merch_event(), &request(Some("M"), 1, "  ")).unwrap_err();
        assert!(matches!(error, EngineError::InvalidInput(_)));
    }

    #[test]
    fn rejects_undeclared_variant() {
        let error = validate_request(&merch_event(), &request(Some("XXL"), 1, "p")).unwrap_err();
        assert!(format!("{error}").contains("not offered"));
    }

    #[test]
    fn rejects_quantity_outside_limit() {
        let event = merch_event();
        assert!(validate_request(&event, &request(Some("M"), 0, "p")).is_err());
        assert!(validate_request(&event, &request(Some("M"), 3, "p")).is_err());
    }

    #[test]
    fn events_without_details_allow_one_item_of_anything() {
        let mut event = merch_event();
        event.merchandise = None;
        assert!(validate_request(&event, &request(Some("Any"), 1, "p")).is_ok());
        assert!(validate_request(&event, &request(Some("Any"), 2, "p")).is_err());
    }
}
