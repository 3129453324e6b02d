//! Registrations and the seat counter.

use crate::{PostgresStore, db_error, invalid_column};
use chrono::{DateTime, Utc};
use felicity_core::event::EventStatus;
use felicity_core::ids::{EventId, ParticipantId, RegistrationId, TeamId, TicketId};
use felicity_core::registration::{FormData, Registration, RegistrationStatus};
use felicity_core::store::{RegistrationLedger, StoreError, StoreFuture};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;

const REGISTRATION_COLUMNS: &str = r"
    id, event_id, participant_id, ticket_id, qr_reference, status, form_data,
    team_id, created_at
";

fn registration_from_row(row: &PgRow) -> Result<Registration, StoreError> {
    let status: String = row.try_get("status").map_err(db_error)?;
    let form_data: Json<FormData> = row.try_get("form_data").map_err(db_error)?;
    let team_id: Option<Uuid> = row.try_get("team_id").map_err(db_error)?;
    let ticket_id: String = row.try_get("ticket_id").map_err(db_error)?;

    Ok(Registration {
        id: RegistrationId::from_uuid(row.try_get("id").map_err(db_error)?),
        event_id: EventId::from_uuid(row.try_get("event_id").map_err(db_error)?),
        participant_id: ParticipantId::from_uuid(
            row.try_get("participant_id").map_err(db_error)?,
        ),
        ticket_id: TicketId::new(ticket_id),
        qr_reference: row.try_get("qr_reference").map_err(db_error)?,
        status: RegistrationStatus::parse(&status)
            .ok_or_else(|| invalid_column("registration status", &status))?,
        form_data: form_data.0,
        team_id: team_id.map(TeamId::from_uuid),
        created_at: row.try_get("created_at").map_err(db_error)?,
    })
}

/// Claim a ticket id for the whole system.
/// Lock the event row for the rest of the transaction and re-check that it
/// still accepts registrations. `at` is `None` for writes that ignore the
/// deadline.
pub(crate) async fn lock_open_event(
    tx: &mut Transaction<'_, Postgres>,
    event_id: EventId,
    at: Option<DateTime<Utc>>,
) -> Result<(), StoreError> {
    let row = sqlx::query(
        "SELECT status, registration_deadline FROM events WHERE id = $1 FOR UPDATE",
    )
    .bind(*event_id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_error)?
    .ok_or_else(|| StoreError::NotFound(format!("event {event_id}")))?;

    let status: String = row.try_get("status").map_err(db_error)?;
    let status =
        EventStatus::parse(&status).ok_or_else(|| invalid_column("event status", &status))?;
    if !status.accepts_registrations() {
        return Err(StoreError::RegistrationClosed(status));
    }
    let deadline: DateTime<Utc> = row.try_get("registration_deadline").map_err(db_error)?;
    if at.is_some_and(|at| at > deadline) {
        return Err(StoreError::DeadlinePassed(deadline));
    }
    Ok(())
}

pub(crate) async fn record_ticket(
    tx: &mut Transaction<'_, Postgres>,
    ticket_id: &TicketId,
) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO issued_tickets (ticket_id) VALUES ($1)")
        .bind(ticket_id.as_str())
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;
    Ok(())
}

/// Insert the registration row. With `skip_existing`, a duplicate
/// (participant, event) pair is ignored instead of raising a violation.
///
/// Returns whether a row was written.
async fn insert_registration(
    tx: &mut Transaction<'_, Postgres>,
    registration: &Registration,
    skip_existing: bool,
) -> Result<bool, StoreError> {
    let conflict_clause = if skip_existing {
        "ON CONFLICT ON CONSTRAINT registrations_event_participant_key DO NOTHING"
    } else {
        ""
    };
    let result = sqlx::query(&format!(
        r"
        INSERT INTO registrations (
            id, event_id, participant_id, ticket_id, qr_reference, status,
            form_data, team_id, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        {conflict_clause}
        "
    ))
    .bind(*registration.id.as_uuid())
    .bind(*registration.event_id.as_uuid())
    .bind(*registration.participant_id.as_uuid())
    .bind(registration.ticket_id.as_str())
    .bind(&registration.qr_reference)
    .bind(registration.status.as_str())
    .bind(Json(&registration.form_data))
    .bind(registration.team_id.map(|id| *id.as_uuid()))
    .bind(registration.created_at)
    .execute(&mut **tx)
    .await
    .map_err(db_error)?;
    Ok(result.rows_affected() == 1)
}

impl RegistrationLedger for PostgresStore {
    fn admit_registration(&self, registration: Registration) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db_error)?;

            // Serializes admissions per event.
            lock_open_event(
                &mut tx,
                registration.event_id,
                Some(registration.created_at),
            )
            .await?;

            insert_registration(&mut tx, &registration, false).await?;
            record_ticket(&mut tx, &registration.ticket_id).await?;

            let taken = sqlx::query(
                r"
                UPDATE events
                SET seats_taken = seats_taken + 1
                WHERE id = $1 AND seats_taken < registration_limit
                ",
            )
            .bind(*registration.event_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
            if taken.rows_affected() == 0 {
                return Err(StoreError::CapacityExceeded);
            }

            tx.commit().await.map_err(db_error)?;
            Ok(())
        })
    }

    fn insert_registration_if_absent(
        &self,
        registration: Registration,
    ) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db_error)?;
            let inserted = insert_registration(&mut tx, &registration, true).await?;
            if inserted {
                record_ticket(&mut tx, &registration.ticket_id).await?;
            }
            tx.commit().await.map_err(db_error)?;
            Ok(inserted)
        })
    }

    fn seats_taken(&self, event_id: EventId) -> StoreFuture<'_, u32> {
        Box::pin(async move {
            let taken: Option<i32> =
                sqlx::query_scalar("SELECT seats_taken FROM events WHERE id = $1")
                    .bind(*event_id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(db_error)?;
            let taken = taken.ok_or_else(|| StoreError::NotFound(format!("event {event_id}")))?;
            crate::from_db_int(taken, "seats_taken")
        })
    }

    fn registration_for(
        &self,
        event_id: EventId,
        participant_id: ParticipantId,
    ) -> StoreFuture<'_, Option<Registration>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE event_id = $1 AND participant_id = $2"
            ))
            .bind(*event_id.as_uuid())
            .bind(*participant_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
            row.as_ref().map(registration_from_row).transpose()
        })
    }

    fn registrations_for_event(&self, event_id: EventId) -> StoreFuture<'_, Vec<Registration>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE event_id = $1 ORDER BY created_at, id"
            ))
            .bind(*event_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
            rows.iter().map(registration_from_row).collect()
        })
    }

    fn registrations_for_participant(
        &self,
        participant_id: ParticipantId,
    ) -> StoreFuture<'_, Vec<Registration>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE participant_id = $1 ORDER BY created_at DESC"
            ))
            .bind(*participant_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
            rows.iter().map(registration_from_row).collect()
        })
    }
}
