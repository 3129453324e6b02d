//! `PostgreSQL` storage for the Felicity engine.
//!
//! [`PostgresStore`] implements every storage contract from
//! `felicity-core`. Each contract method runs in a single transaction and
//! relies on database features for its guarantees:
//!
//! - unique constraints and a partial unique index for one-per-pair rules
//! - `SELECT ... FOR UPDATE` plus conditional `UPDATE ... WHERE` for the seat
//!   counter, team completion and order decisions
//! - a `version` column for optimistic concurrency on events
//!
//! # Example
//!
//! ```no_run
//! use felicity_postgres::PostgresStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresStore::new("postgres://localhost/felicity").await?;
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod events;
mod orders;
mod registrations;
mod teams;

use felicity_core::store::{Constraint, StoreError};
use sqlx::PgPool;

/// `PostgreSQL`-backed implementation of every storage contract.
#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to `database_url` with a default pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection fails.
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))
    }
}

/// Map a unique-violation constraint name to the domain constraint.
fn constraint_for(name: &str) -> Option<Constraint> {
    match name {
        "registrations_event_participant_key" => Some(Constraint::Registration),
        "issued_tickets_pkey" => Some(Constraint::TicketId),
        "team_members_pkey" | "team_members_event_participant_key" => {
            Some(Constraint::TeamMembership)
        },
        "teams_invite_code_key" => Some(Constraint::InviteCode),
        "orders_active_participant_idx" => Some(Constraint::ActiveOrder),
        _ => None,
    }
}

/// Convert a sqlx error, surfacing known unique violations as such.
fn db_error(error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &error {
        if db_err.is_unique_violation() {
            if let Some(constraint) = db_err.constraint().and_then(constraint_for) {
                return StoreError::UniqueViolation(constraint);
            }
        }
    }
    tracing::error!(error = %error, "Database operation failed");
    StoreError::Database(error.to_string())
}

fn to_db_int(value: u32, column: &str) -> Result<i32, StoreError> {
    i32::try_from(value)
        .map_err(|_| StoreError::Database(format!("{column} value {value} exceeds i32::MAX")))
}

fn from_db_int(value: i32, column: &str) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::Database(format!("{column} holds negative value {value}")))
}

fn invalid_column(column: &str, value: &str) -> StoreError {
    StoreError::Database(format!("Invalid {column}: {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_constraints_map_to_domain_constraints() {
        assert_eq!(
            constraint_for("registrations_event_participant_key"),
            Some(Constraint::Registration)
        );
        assert_eq!(
            constraint_for("team_members_pkey"),
            Some(Constraint::TeamMembership)
        );
        assert_eq!(
            constraint_for("orders_active_participant_idx"),
            Some(Constraint::ActiveOrder)
        );
        assert_eq!(constraint_for("events_pkey"), None);
    }

    #[test]
    fn integer_columns_reject_out_of_range_values() {
        assert!(to_db_int(u32::MAX, "fee").is_err());
        assert!(from_db_int(-1, "stock").is_err());
        assert_eq!(from_db_int(7, "stock").ok(), Some(7));
    }
}
