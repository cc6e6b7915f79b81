//! User domain - models and DB queries for users and roles

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Executor, Postgres};

/// A user account
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub email_verified: bool,
    pub avatar_url: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

/// Fields required to create a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub email_verified: bool,
}

/// Partial profile update
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

/// A named role and the permissions it grants
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Role {
    pub name: String,
    pub permissions: Vec<String>,
}

const USER_COLUMNS: &str =
    "id, email, name, password_hash, google_id, email_verified, avatar_url, role, created_at";

pub async fn insert_user<'e, E>(executor: E, new: &NewUser) -> Result<User, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        r#"
        INSERT INTO users (email, name, password_hash, google_id, email_verified)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {USER_COLUMNS}
        "#
    );
    sqlx::query_as(&query)
        .bind(&new.email)
        .bind(&new.name)
        .bind(&new.password_hash)
        .bind(&new.google_id)
        .bind(new.email_verified)
        .fetch_one(executor)
        .await
}

pub async fn get_user_by_id<'e, E>(executor: E, user_id: i64) -> Result<Option<User>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    sqlx::query_as(&query)
        .bind(user_id)
        .fetch_optional(executor)
        .await
}

pub async fn get_user_by_email<'e, E>(executor: E, email: &str) -> Result<Option<User>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
    sqlx::query_as(&query)
        .bind(email)
        .fetch_optional(executor)
        .await
}

pub async fn get_user_by_google_id<'e, E>(
    executor: E,
    google_id: &str,
) -> Result<Option<User>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE google_id = $1");
    sqlx::query_as(&query)
        .bind(google_id)
        .fetch_optional(executor)
        .await
}

/// Attach a Google account to an existing user; Google has verified the address
pub async fn link_google_id<'e, E>(
    executor: E,
    user_id: i64,
    google_id: &str,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        UPDATE users SET google_id = $2, email_verified = TRUE, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .bind(google_id)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn mark_email_verified<'e, E>(executor: E, user_id: i64) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("UPDATE users SET email_verified = TRUE, updated_at = NOW() WHERE id = $1")
        .bind(user_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn set_password_hash<'e, E>(
    executor: E,
    user_id: i64,
    password_hash: &str,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
        .bind(user_id)
        .bind(password_hash)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn update_user<'e, E>(
    executor: E,
    user_id: i64,
    update: &UserUpdate,
) -> Result<Option<User>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        r#"
        UPDATE users SET
            name = COALESCE($2, name),
            avatar_url = COALESCE($3, avatar_url),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {USER_COLUMNS}
        "#
    );
    sqlx::query_as(&query)
        .bind(user_id)
        .bind(&update.name)
        .bind(&update.avatar_url)
        .fetch_optional(executor)
        .await
}

pub async fn delete_user<'e, E>(executor: E, user_id: i64) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_roles<'e, E>(executor: E) -> Result<Vec<Role>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as("SELECT name, permissions FROM roles ORDER BY name")
        .fetch_all(executor)
        .await
}

pub async fn get_role<'e, E>(executor: E, name: &str) -> Result<Option<Role>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as("SELECT name, permissions FROM roles WHERE name = $1")
        .bind(name)
        .fetch_optional(executor)
        .await
}
