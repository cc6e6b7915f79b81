//! Wall access domain - per-wall role grants and email invitations

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};

/// A user with a role on a wall, joined with their profile
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WallMember {
    pub user_id: i64,
    pub email: String,
    pub name: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Invitation {
    pub id: i64,
    pub wall_id: i64,
    pub email: String,
    pub role: String,
    pub token: String,
    pub invited_by: i64,
    pub accepted_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewInvitation {
    pub wall_id: i64,
    pub email: String,
    pub role: String,
    pub token: String,
    pub invited_by: i64,
    pub expires_at: DateTime<Utc>,
}

const INVITATION_COLUMNS: &str =
    "id, wall_id, email, role, token, invited_by, accepted_at, expires_at, created_at";

pub async fn get_access_role<'e, E>(
    executor: E,
    wall_id: i64,
    user_id: i64,
) -> Result<Option<String>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(String,)> =
        sqlx::query_as("SELECT role FROM wall_access WHERE wall_id = $1 AND user_id = $2")
            .bind(wall_id)
            .bind(user_id)
            .fetch_optional(executor)
            .await?;
    Ok(row.map(|r| r.0))
}

pub async fn list_members<'e, E>(executor: E, wall_id: i64) -> Result<Vec<WallMember>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT a.user_id, u.email, u.name, a.role, a.created_at
        FROM wall_access a
        JOIN users u ON u.id = a.user_id
        WHERE a.wall_id = $1
        ORDER BY a.created_at, a.user_id
        "#,
    )
    .bind(wall_id)
    .fetch_all(executor)
    .await
}

/// Grant (or change) a user's role on a wall
pub async fn grant_access<'e, E>(
    executor: E,
    wall_id: i64,
    user_id: i64,
    role: &str,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO wall_access (wall_id, user_id, role)
        VALUES ($1, $2, $3)
        ON CONFLICT (wall_id, user_id) DO UPDATE SET role = EXCLUDED.role
        "#,
    )
    .bind(wall_id)
    .bind(user_id)
    .bind(role)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn revoke_access<'e, E>(executor: E, wall_id: i64, user_id: i64) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM wall_access WHERE wall_id = $1 AND user_id = $2")
        .bind(wall_id)
        .bind(user_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn insert_invitation<'e, E>(
    executor: E,
    new: &NewInvitation,
) -> Result<Invitation, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        r#"
        INSERT INTO invitations (wall_id, email, role, token, invited_by, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {INVITATION_COLUMNS}
        "#
    );
    sqlx::query_as(&query)
        .bind(new.wall_id)
        .bind(&new.email)
        .bind(&new.role)
        .bind(&new.token)
        .bind(new.invited_by)
        .bind(new.expires_at)
        .fetch_one(executor)
        .await
}

pub async fn get_invitation_by_token<'e, E>(
    executor: E,
    token: &str,
) -> Result<Option<Invitation>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!("SELECT {INVITATION_COLUMNS} FROM invitations WHERE token = $1");
    sqlx::query_as(&query)
        .bind(token)
        .fetch_optional(executor)
        .await
}

/// Pending (not yet accepted) invitations for a wall
pub async fn list_pending_invitations<'e, E>(
    executor: E,
    wall_id: i64,
) -> Result<Vec<Invitation>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        r#"SELECT {INVITATION_COLUMNS} FROM invitations
           WHERE wall_id = $1 AND accepted_at IS NULL
           ORDER BY created_at DESC, id DESC"#
    );
    sqlx::query_as(&query)
        .bind(wall_id)
        .fetch_all(executor)
        .await
}

/// Mark accepted; false if it was already accepted
pub async fn mark_invitation_accepted<'e, E>(
    executor: E,
    invitation_id: i64,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        "UPDATE invitations SET accepted_at = NOW() WHERE id = $1 AND accepted_at IS NULL",
    )
    .bind(invitation_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_invitation<'e, E>(
    executor: E,
    wall_id: i64,
    invitation_id: i64,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM invitations WHERE id = $1 AND wall_id = $2")
        .bind(invitation_id)
        .bind(wall_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}
