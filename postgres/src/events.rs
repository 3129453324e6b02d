//! Event rows, merchandise variants and optimistic concurrency.

use crate::{PostgresStore, db_error, from_db_int, invalid_column, to_db_int};
use felicity_core::event::{Event, EventStatus, EventType, FormField, MerchandiseDetails, Variant};
use felicity_core::ids::{EventId, OrganizerId, Version};
use felicity_core::store::{EventRepository, StoreError, StoreFuture, Versioned};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgExecutor, Postgres, Row, Transaction};
use uuid::Uuid;

pub(crate) const EVENT_COLUMNS: &str = r"
    id, organizer_id, name, description, event_type, eligibility,
    registration_deadline, event_start, event_end, registration_limit, fee,
    tags, status, is_team_event, team_size, custom_form_fields, item_name,
    purchase_limit, version, created_at, updated_at
";

fn version_to_db(version: Version) -> Result<i64, StoreError> {
    i64::try_from(version.value())
        .map_err(|_| StoreError::Database(format!("version {version} exceeds i64::MAX")))
}

fn version_from_db(value: i64) -> Result<Version, StoreError> {
    u64::try_from(value)
        .map(Version::new)
        .map_err(|_| invalid_column("version", &value.to_string()))
}

pub(crate) async fn load_variants<'e>(
    executor: impl PgExecutor<'e>,
    event_id: Uuid,
) -> Result<Vec<Variant>, StoreError> {
    let rows = sqlx::query(
        r"
        SELECT size, color, stock
        FROM event_variants
        WHERE event_id = $1
        ORDER BY position
        ",
    )
    .bind(event_id)
    .fetch_all(executor)
    .await
    .map_err(db_error)?;

    rows.iter()
        .map(|row| -> Result<Variant, StoreError> {
            Ok(Variant {
                size: row.try_get("size").map_err(db_error)?,
                color: row.try_get("color").map_err(db_error)?,
                stock: from_db_int(row.try_get("stock").map_err(db_error)?, "stock")?,
            })
        })
        .collect()
}

/// Decode an `events` row; `variants` come from [`load_variants`].
pub(crate) fn event_from_row(
    row: &PgRow,
    variants: Vec<Variant>,
) -> Result<Versioned<Event>, StoreError> {
    let event_type: String = row.try_get("event_type").map_err(db_error)?;
    let status: String = row.try_get("status").map_err(db_error)?;
    let item_name: Option<String> = row.try_get("item_name").map_err(db_error)?;
    let purchase_limit: Option<i32> = row.try_get("purchase_limit").map_err(db_error)?;
    let tags: Json<Vec<String>> = row.try_get("tags").map_err(db_error)?;
    let custom_form_fields: Json<Vec<FormField>> =
        row.try_get("custom_form_fields").map_err(db_error)?;

    let merchandise = match item_name {
        Some(item_name) => Some(MerchandiseDetails {
            item_name,
            variants,
            purchase_limit_per_participant: from_db_int(
                purchase_limit.unwrap_or(1),
                "purchase_limit",
            )?,
        }),
        None => None,
    };

    let event = Event {
        id: EventId::from_uuid(row.try_get("id").map_err(db_error)?),
        organizer_id: OrganizerId::from_uuid(row.try_get("organizer_id").map_err(db_error)?),
        name: row.try_get("name").map_err(db_error)?,
        description: row.try_get("description").map_err(db_error)?,
        event_type: EventType::parse(&event_type)
            .ok_or_else(|| invalid_column("event_type", &event_type))?,
        eligibility: row.try_get("eligibility").map_err(db_error)?,
        registration_deadline: row.try_get("registration_deadline").map_err(db_error)?,
        event_start: row.try_get("event_start").map_err(db_error)?,
        event_end: row.try_get("event_end").map_err(db_error)?,
        registration_limit: from_db_int(
            row.try_get("registration_limit").map_err(db_error)?,
            "registration_limit",
        )?,
        fee: from_db_int(row.try_get("fee").map_err(db_error)?, "fee")?,
        tags: tags.0,
        status: EventStatus::parse(&status).ok_or_else(|| invalid_column("status", &status))?,
        is_team_event: row.try_get("is_team_event").map_err(db_error)?,
        team_size: from_db_int(row.try_get("team_size").map_err(db_error)?, "team_size")?,
        custom_form_fields: custom_form_fields.0,
        merchandise,
        created_at: row.try_get("created_at").map_err(db_error)?,
        updated_at: row.try_get("updated_at").map_err(db_error)?,
    };
    let version = version_from_db(row.try_get("version").map_err(db_error)?)?;
    Ok(Versioned {
        value: event,
        version,
    })
}

async fn replace_variants(
    tx: &mut Transaction<'_, Postgres>,
    event: &Event,
) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM event_variants WHERE event_id = $1")
        .bind(*event.id.as_uuid())
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;

    let variants = event
        .merchandise
        .as_ref()
        .map(|m| m.variants.as_slice())
        .unwrap_or_default();
    for (position, variant) in variants.iter().enumerate() {
        sqlx::query(
            r"
            INSERT INTO event_variants (event_id, position, size, color, stock)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(*event.id.as_uuid())
        .bind(i32::try_from(position).map_err(|_| invalid_column("position", "overflow"))?)
        .bind(variant.size.as_deref())
        .bind(variant.color.as_deref())
        .bind(to_db_int(variant.stock, "stock")?)
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;
    }
    Ok(())
}

impl EventRepository for PostgresStore {
    fn insert_event(&self, event: Event) -> StoreFuture<'_, Version> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db_error)?;

            sqlx::query(
                r"
                INSERT INTO events (
                    id, organizer_id, name, description, event_type, eligibility,
                    registration_deadline, event_start, event_end, registration_limit,
                    seats_taken, fee, tags, status, is_team_event, team_size,
                    custom_form_fields, item_name, purchase_limit, version,
                    created_at, updated_at
                ) VALUES (
                    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0, $11, $12, $13, $14,
                    $15, $16, $17, $18, $19, $20, $21
                )
                ",
            )
            .bind(*event.id.as_uuid())
            .bind(*event.organizer_id.as_uuid())
            .bind(&event.name)
            .bind(&event.description)
            .bind(event.event_type.as_str())
            .bind(&event.eligibility)
            .bind(event.registration_deadline)
            .bind(event.event_start)
            .bind(event.event_end)
            .bind(to_db_int(event.registration_limit, "registration_limit")?)
            .bind(to_db_int(event.fee, "fee")?)
            .bind(Json(&event.tags))
            .bind(event.status.as_str())
            .bind(event.is_team_event)
            .bind(to_db_int(event.team_size, "team_size")?)
            .bind(Json(&event.custom_form_fields))
            .bind(event.merchandise.as_ref().map(|m| m.item_name.clone()))
            .bind(
                event
                    .merchandise
                    .as_ref()
                    .map(|m| to_db_int(m.purchase_limit_per_participant, "purchase_limit"))
                    .transpose()?,
            )
            .bind(version_to_db(Version::INITIAL)?)
            .bind(event.created_at)
            .bind(event.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

            replace_variants(&mut tx, &event).await?;
            tx.commit().await.map_err(db_error)?;

            tracing::debug!(event_id = %event.id, "Event inserted");
            Ok(Version::INITIAL)
        })
    }

    fn load_event(&self, event_id: EventId) -> StoreFuture<'_, Option<Versioned<Event>>> {
        Box::pin(async move {
            let row = sqlx::query(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
                .bind(*event_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

            match row {
                Some(row) => {
                    let variants = load_variants(&self.pool, *event_id.as_uuid()).await?;
                    event_from_row(&row, variants).map(Some)
                },
                None => Ok(None),
            }
        })
    }

    fn save_event(&self, event: Event, expected_version: Version) -> StoreFuture<'_, Version> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db_error)?;

            let updated: Option<i64> = sqlx::query_scalar(
                r"
                UPDATE events
                SET name = $3,
                    description = $4,
                    event_type = $5,
                    eligibility = $6,
                    registration_deadline = $7,
                    event_start = $8,
                    event_end = $9,
                    registration_limit = $10,
                    fee = $11,
                    tags = $12,
                    status = $13,
                    is_team_event = $14,
                    team_size = $15,
                    custom_form_fields = $16,
                    item_name = $17,
                    purchase_limit = $18,
                    updated_at = $19,
                    version = version + 1
                WHERE id = $1 AND version = $2
                RETURNING version
                ",
            )
            .bind(*event.id.as_uuid())
            .bind(version_to_db(expected_version)?)
            .bind(&event.name)
            .bind(&event.description)
            .bind(event.event_type.as_str())
            .bind(&event.eligibility)
            .bind(event.registration_deadline)
            .bind(event.event_start)
            .bind(event.event_end)
            .bind(to_db_int(event.registration_limit, "registration_limit")?)
            .bind(to_db_int(event.fee, "fee")?)
            .bind(Json(&event.tags))
            .bind(event.status.as_str())
            .bind(event.is_team_event)
            .bind(to_db_int(event.team_size, "team_size")?)
            .bind(Json(&event.custom_form_fields))
            .bind(event.merchandise.as_ref().map(|m| m.item_name.clone()))
            .bind(
                event
                    .merchandise
                    .as_ref()
                    .map(|m| to_db_int(m.purchase_limit_per_participant, "purchase_limit"))
                    .transpose()?,
            )
            .bind(event.updated_at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?;

            let Some(new_version) = updated else {
                let actual: Option<i64> =
                    sqlx::query_scalar("SELECT version FROM events WHERE id = $1")
                        .bind(*event.id.as_uuid())
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(db_error)?;
                return match actual {
                    Some(actual) => Err(StoreError::ConcurrencyConflict {
                        expected: expected_version,
                        actual: version_from_db(actual)?,
                    }),
                    None => Err(StoreError::NotFound(format!("event {}", event.id))),
                };
            };

            replace_variants(&mut tx, &event).await?;
            tx.commit().await.map_err(db_error)?;
            version_from_db(new_version)
        })
    }

    fn events_by_organizer(&self, organizer_id: OrganizerId) -> StoreFuture<'_, Vec<Event>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE organizer_id = $1 ORDER BY created_at DESC"
            ))
            .bind(*organizer_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

            let mut events = Vec::with_capacity(rows.len());
            for row in &rows {
                let id: Uuid = row.try_get("id").map_err(db_error)?;
                let variants = load_variants(&self.pool, id).await?;
                events.push(event_from_row(row, variants)?.value);
            }
            Ok(events)
        })
    }
}
