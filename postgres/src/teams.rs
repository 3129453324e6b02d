//! Teams, membership and the atomic join-and-complete step.

use crate::registrations::lock_open_event;
use crate::{PostgresStore, db_error, from_db_int, invalid_column, to_db_int};
use chrono::{DateTime, Utc};
use felicity_core::ids::{EventId, InviteCode, ParticipantId, TeamId};
use felicity_core::store::{Constraint, StoreError, StoreFuture, TeamRepository};
use felicity_core::team::{JoinOutcome, Team, TeamStatus};
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, Row};
use uuid::Uuid;

const TEAM_COLUMNS: &str = r"
    id, event_id, name, leader_id, max_size, invite_code, status,
    tickets_issued_at, created_at
";

async fn load_members<'e>(
    executor: impl PgExecutor<'e>,
    team_id: Uuid,
) -> Result<Vec<ParticipantId>, StoreError> {
    let members: Vec<Uuid> = sqlx::query_scalar(
        "SELECT participant_id FROM team_members WHERE team_id = $1 ORDER BY position",
    )
    .bind(team_id)
    .fetch_all(executor)
    .await
    .map_err(db_error)?;
    Ok(members.into_iter().map(ParticipantId::from_uuid).collect())
}

fn team_from_row(row: &PgRow, members: Vec<ParticipantId>) -> Result<Team, StoreError> {
    let status: String = row.try_get("status").map_err(db_error)?;
    let invite_code: String = row.try_get("invite_code").map_err(db_error)?;
    Ok(Team {
        id: TeamId::from_uuid(row.try_get("id").map_err(db_error)?),
        event_id: EventId::from_uuid(row.try_get("event_id").map_err(db_error)?),
        name: row.try_get("name").map_err(db_error)?,
        leader_id: ParticipantId::from_uuid(row.try_get("leader_id").map_err(db_error)?),
        members,
        max_size: from_db_int(row.try_get("max_size").map_err(db_error)?, "max_size")?,
        invite_code: InviteCode::new(invite_code),
        status: TeamStatus::parse(&status).ok_or_else(|| invalid_column("team status", &status))?,
        tickets_issued_at: row.try_get("tickets_issued_at").map_err(db_error)?,
        created_at: row.try_get("created_at").map_err(db_error)?,
    })
}

impl PostgresStore {
    async fn teams_from_rows(&self, rows: &[PgRow]) -> Result<Vec<Team>, StoreError> {
        let mut teams = Vec::with_capacity(rows.len());
        for row in rows {
            let id: Uuid = row.try_get("id").map_err(db_error)?;
            let members = load_members(&self.pool, id).await?;
            teams.push(team_from_row(row, members)?);
        }
        Ok(teams)
    }

    async fn fetch_team(&self, key: TeamKey) -> Result<Option<Team>, StoreError> {
        let column = match key {
            TeamKey::Id(_) => "id",
            TeamKey::InviteCode(_) => "invite_code",
        };
        let sql = format!("SELECT {TEAM_COLUMNS} FROM teams WHERE {column} = $1");
        let query = match key {
            TeamKey::Id(id) => sqlx::query(&sql).bind(id),
            TeamKey::InviteCode(code) => sqlx::query(&sql).bind(code),
        };
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        match row {
            Some(row) => Ok(self.teams_from_rows(&[row]).await?.pop()),
            None => Ok(None),
        }
    }
}

enum TeamKey {
    Id(Uuid),
    InviteCode(String),
}

impl TeamRepository for PostgresStore {
    fn insert_team(&self, team: Team) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db_error)?;

            lock_open_event(&mut tx, team.event_id, Some(team.created_at)).await?;

            let leader_taken: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM team_members WHERE event_id = $1 AND participant_id = $2)",
            )
            .bind(*team.event_id.as_uuid())
            .bind(*team.leader_id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error)?;
            if leader_taken {
                return Err(StoreError::UniqueViolation(Constraint::TeamMembership));
            }

            sqlx::query(
                r"
                INSERT INTO teams (
                    id, event_id, name, leader_id, max_size, member_count,
                    invite_code, status, tickets_issued_at, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ",
            )
            .bind(*team.id.as_uuid())
            .bind(*team.event_id.as_uuid())
            .bind(&team.name)
            .bind(*team.leader_id.as_uuid())
            .bind(to_db_int(team.max_size, "max_size")?)
            .bind(to_db_int(team.member_count(), "member_count")?)
            .bind(team.invite_code.as_str())
            .bind(team.status.as_str())
            .bind(team.tickets_issued_at)
            .bind(team.created_at)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

            for (position, member) in team.members.iter().enumerate() {
                sqlx::query(
                    r"
                    INSERT INTO team_members (team_id, event_id, participant_id, position)
                    VALUES ($1, $2, $3, $4)
                    ",
                )
                .bind(*team.id.as_uuid())
                .bind(*team.event_id.as_uuid())
                .bind(*member.as_uuid())
                .bind(i32::try_from(position).map_err(|_| invalid_column("position", "overflow"))?)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
            }

            let reserved = sqlx::query(
                r"
                UPDATE events
                SET seats_taken = seats_taken + $2
                WHERE id = $1 AND seats_taken + $2 <= registration_limit
                ",
            )
            .bind(*team.event_id.as_uuid())
            .bind(to_db_int(team.max_size, "max_size")?)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
            if reserved.rows_affected() == 0 {
                return Err(StoreError::CapacityExceeded);
            }

            tx.commit().await.map_err(db_error)?;
            tracing::debug!(team_id = %team.id, event_id = %team.event_id, "Team inserted");
            Ok(())
        })
    }

    fn load_team(&self, team_id: TeamId) -> StoreFuture<'_, Option<Team>> {
        Box::pin(async move { self.fetch_team(TeamKey::Id(*team_id.as_uuid())).await })
    }

    fn team_by_invite_code(&self, code: InviteCode) -> StoreFuture<'_, Option<Team>> {
        Box::pin(async move {
            self.fetch_team(TeamKey::InviteCode(code.as_str().to_string()))
                .await
        })
    }

    fn join_team(
        &self,
        team_id: TeamId,
        participant_id: ParticipantId,
    ) -> StoreFuture<'_, JoinOutcome> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db_error)?;

            let locked = sqlx::query(
                "SELECT event_id, member_count FROM teams WHERE id = $1 FOR UPDATE",
            )
            .bind(*team_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?
            .ok_or_else(|| StoreError::NotFound(format!("team {team_id}")))?;
            let event_id: Uuid = locked.try_get("event_id").map_err(db_error)?;
            let position: i32 = locked.try_get("member_count").map_err(db_error)?;
            lock_open_event(&mut tx, EventId::from_uuid(event_id), None).await?;

            // Membership constraints fire before the room check.
            sqlx::query(
                r"
                INSERT INTO team_members (team_id, event_id, participant_id, position)
                VALUES ($1, $2, $3, $4)
                ",
            )
            .bind(*team_id.as_uuid())
            .bind(event_id)
            .bind(*participant_id.as_uuid())
            .bind(position)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

            let row = sqlx::query(&format!(
                r"
                UPDATE teams
                SET member_count = member_count + 1,
                    status = CASE WHEN member_count + 1 = max_size THEN 'complete' ELSE status END
                WHERE id = $1 AND status = 'incomplete' AND member_count < max_size
                RETURNING {TEAM_COLUMNS}
                "
            ))
            .bind(*team_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?
            .ok_or(StoreError::TeamFull)?;

            let members = load_members(&mut *tx, *team_id.as_uuid()).await?;
            let team = team_from_row(&row, members)?;
            tx.commit().await.map_err(db_error)?;

            let completed = team.status == TeamStatus::Complete;
            Ok(JoinOutcome { team, completed })
        })
    }

    fn mark_tickets_issued(&self, team_id: TeamId, at: DateTime<Utc>) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE teams
                SET tickets_issued_at = COALESCE(tickets_issued_at, $2)
                WHERE id = $1
                ",
            )
            .bind(*team_id.as_uuid())
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!("team {team_id}")));
            }
            Ok(())
        })
    }

    fn teams_awaiting_tickets(&self) -> StoreFuture<'_, Vec<Team>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                r"
                SELECT {TEAM_COLUMNS} FROM teams
                WHERE status = 'complete' AND tickets_issued_at IS NULL
                ORDER BY created_at
                "
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
            self.teams_from_rows(&rows).await
        })
    }

    fn teams_for_participant(
        &self,
        participant_id: ParticipantId,
    ) -> StoreFuture<'_, Vec<Team>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                r"
                SELECT {TEAM_COLUMNS} FROM teams
                WHERE id IN (SELECT team_id FROM team_members WHERE participant_id = $1)
                ORDER BY created_at DESC
                "
            ))
            .bind(*participant_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
            self.teams_from_rows(&rows).await
        })
    }
}
