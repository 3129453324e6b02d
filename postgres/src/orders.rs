//! Merchandise orders and their one-shot decision.

use crate::registrations::{lock_open_event, record_ticket};
use crate::{PostgresStore, db_error, from_db_int, invalid_column, to_db_int};
use chrono::{DateTime, Utc};
use felicity_core::ids::{EventId, OrderId, ParticipantId, TicketId};
use felicity_core::order::{Order, OrderDecision, OrderStatus, VariantChoice};
use felicity_core::store::{OrderRepository, StoreError, StoreFuture};
use felicity_core::ticket::Ticket;
use sqlx::Row;
use sqlx::postgres::PgRow;

const ORDER_COLUMNS: &str = r"
    id, event_id, participant_id, size, color, quantity, proof_ref, status,
    ticket_id, qr_reference, decided_at, created_at
";

fn order_from_row(row: &PgRow) -> Result<Order, StoreError> {
    let status: String = row.try_get("status").map_err(db_error)?;
    let ticket_id: Option<String> = row.try_get("ticket_id").map_err(db_error)?;
    Ok(Order {
        id: OrderId::from_uuid(row.try_get("id").map_err(db_error)?),
        event_id: EventId::from_uuid(row.try_get("event_id").map_err(db_error)?),
        participant_id: ParticipantId::from_uuid(
            row.try_get("participant_id").map_err(db_error)?,
        ),
        variant: VariantChoice {
            size: row.try_get("size").map_err(db_error)?,
            color: row.try_get("color").map_err(db_error)?,
        },
        quantity: from_db_int(row.try_get("quantity").map_err(db_error)?, "quantity")?,
        proof_ref: row.try_get("proof_ref").map_err(db_error)?,
        status: OrderStatus::parse(&status)
            .ok_or_else(|| invalid_column("order status", &status))?,
        ticket_id: ticket_id.map(TicketId::new),
        qr_reference: row.try_get("qr_reference").map_err(db_error)?,
        decided_at: row.try_get("decided_at").map_err(db_error)?,
        created_at: row.try_get("created_at").map_err(db_error)?,
    })
}

impl OrderRepository for PostgresStore {
    fn insert_order(&self, order: Order) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db_error)?;
            lock_open_event(&mut tx, order.event_id, None).await?;

            sqlx::query(
                r"
                INSERT INTO orders (
                    id, event_id, participant_id, size, color, quantity, proof_ref,
                    status, ticket_id, qr_reference, decided_at, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                ",
            )
            .bind(*order.id.as_uuid())
            .bind(*order.event_id.as_uuid())
            .bind(*order.participant_id.as_uuid())
            .bind(order.variant.size.as_deref())
            .bind(order.variant.color.as_deref())
            .bind(to_db_int(order.quantity, "quantity")?)
            .bind(&order.proof_ref)
            .bind(order.status.as_str())
            .bind(order.ticket_id.as_ref().map(TicketId::as_str))
            .bind(order.qr_reference.as_deref())
            .bind(order.decided_at)
            .bind(order.created_at)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

            tx.commit().await.map_err(db_error)?;
            Ok(())
        })
    }

    fn load_order(&self, order_id: OrderId) -> StoreFuture<'_, Option<Order>> {
        Box::pin(async move {
            let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
                .bind(*order_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;
            row.as_ref().map(order_from_row).transpose()
        })
    }

    fn decide_order(
        &self,
        order_id: OrderId,
        decision: OrderDecision,
        ticket: Option<Ticket>,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Order> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db_error)?;

            let current = sqlx::query(&format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
            ))
            .bind(*order_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?
            .ok_or_else(|| StoreError::NotFound(format!("order {order_id}")))?;
            let current = order_from_row(&current)?;

            let approved = decision == OrderDecision::Approved;
            let ticket = ticket.filter(|_| approved);
            if approved && ticket.is_none() {
                return Err(StoreError::Database(
                    "approval requires a ticket".to_string(),
                ));
            }

            let status: OrderStatus = decision.into();
            let updated = sqlx::query(&format!(
                r"
                UPDATE orders
                SET status = $2, decided_at = $3, ticket_id = $4, qr_reference = $5
                WHERE id = $1 AND status = 'pending'
                RETURNING {ORDER_COLUMNS}
                "
            ))
            .bind(*order_id.as_uuid())
            .bind(status.as_str())
            .bind(at)
            .bind(ticket.as_ref().map(|t| t.ticket_id.as_str()))
            .bind(ticket.as_ref().map(|t| t.qr_reference.as_str()))
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?
            .ok_or(StoreError::NotPending(current.status))?;
            let updated = order_from_row(&updated)?;

            if let Some(ticket) = &ticket {
                record_ticket(&mut tx, &ticket.ticket_id).await?;
                take_stock(&mut tx, &updated).await?;
            }

            tx.commit().await.map_err(db_error)?;
            Ok(updated)
        })
    }

    fn orders_for_event(&self, event_id: EventId) -> StoreFuture<'_, Vec<Order>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE event_id = $1 ORDER BY created_at, id"
            ))
            .bind(*event_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
            rows.iter().map(order_from_row).collect()
        })
    }
}

/// Decrement the ordered variant's stock and bump the event version.
///
/// Events without declared variants have unlimited stock.
async fn take_stock(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    order: &Order,
) -> Result<(), StoreError> {
    let has_variants: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM event_variants WHERE event_id = $1)",
    )
    .bind(*order.event_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(db_error)?;
    if !has_variants {
        return Ok(());
    }

    let taken = sqlx::query(
        r"
        UPDATE event_variants
        SET stock = stock - $4
        WHERE event_id = $1
          AND size IS NOT DISTINCT FROM $2
          AND color IS NOT DISTINCT FROM $3
          AND stock >= $4
        ",
    )
    .bind(*order.event_id.as_uuid())
    .bind(order.variant.size.as_deref())
    .bind(order.variant.color.as_deref())
    .bind(to_db_int(order.quantity, "quantity")?)
    .execute(&mut **tx)
    .await
    .map_err(db_error)?;
    if taken.rows_affected() == 0 {
        return Err(StoreError::OutOfStock);
    }

    sqlx::query("UPDATE events SET version = version + 1 WHERE id = $1")
        .bind(*order.event_id.as_uuid())
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;
    Ok(())
}
