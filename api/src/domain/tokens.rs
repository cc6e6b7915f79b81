//! Single-use tokens: email verification / password reset, refresh tokens and
//! OAuth PKCE state.

use chrono::{DateTime, Utc};
use sqlx::{Executor, PgPool, Postgres};

/// What an emailed token authorizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    VerifyEmail,
    ResetPassword,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::VerifyEmail => "verify_email",
            TokenPurpose::ResetPassword => "reset_password",
        }
    }
}

pub async fn insert_email_token<'e, E>(
    executor: E,
    token: &str,
    user_id: i64,
    purpose: TokenPurpose,
    expires_at: DateTime<Utc>,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO email_tokens (token, user_id, purpose, expires_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(token)
    .bind(user_id)
    .bind(purpose.as_str())
    .bind(expires_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Consume an email token. Atomic DELETE + RETURNING so a token works once.
pub async fn take_email_token<'e, E>(
    executor: E,
    token: &str,
    purpose: TokenPurpose,
    now: DateTime<Utc>,
) -> Result<Option<i64>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        DELETE FROM email_tokens
        WHERE token = $1 AND purpose = $2 AND expires_at > $3
        RETURNING user_id
        "#,
    )
    .bind(token)
    .bind(purpose.as_str())
    .bind(now)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(|r| r.0))
}

pub async fn insert_refresh_token<'e, E>(
    executor: E,
    token: &str,
    user_id: i64,
    expires_at: DateTime<Utc>,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (id, user_id, expires_at)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(token)
    .bind(user_id)
    .bind(expires_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Rotate a refresh token: delete the old one and insert its replacement.
/// Uses a transaction so the user isn't logged out if the insert fails.
/// Returns the owning user_id, or None when the old token is unknown/expired.
pub async fn rotate_refresh_token(
    db: &PgPool,
    old_token: &str,
    new_token: &str,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Option<i64>, sqlx::Error> {
    let mut tx = db.begin().await?;

    // If two requests try to use the same token, only one DELETE returns a row
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        DELETE FROM refresh_tokens
        WHERE id = $1 AND expires_at > $2
        RETURNING user_id
        "#,
    )
    .bind(old_token)
    .bind(now)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((user_id,)) = row else {
        return Ok(None);
    };

    insert_refresh_token(&mut *tx, new_token, user_id, expires_at).await?;
    tx.commit().await?;

    Ok(Some(user_id))
}

pub async fn delete_refresh_token<'e, E>(executor: E, token: &str) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("DELETE FROM refresh_tokens WHERE id = $1")
        .bind(token)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn delete_user_refresh_tokens<'e, E>(executor: E, user_id: i64) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
        .bind(user_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn insert_oauth_state<'e, E>(
    executor: E,
    state: &str,
    code_verifier: &str,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO oauth_states (state, code_verifier)
        VALUES ($1, $2)
        "#,
    )
    .bind(state)
    .bind(code_verifier)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn take_oauth_state<'e, E>(executor: E, state: &str) -> Result<Option<String>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(String,)> = sqlx::query_as(
        r#"
        DELETE FROM oauth_states
        WHERE state = $1 AND created_at > NOW() - INTERVAL '10 minutes'
        RETURNING code_verifier
        "#,
    )
    .bind(state)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(|r| r.0))
}
