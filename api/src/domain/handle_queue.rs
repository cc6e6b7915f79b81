//! Handle queue - author handles awaiting periodic re-ingestion

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HandleQueueEntry {
    pub id: i64,
    pub wall_id: i64,
    pub handle_url: String,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

/// Queue a handle for a wall. Returns false if it was already queued.
pub async fn enqueue_handle<'e, E>(
    executor: E,
    wall_id: i64,
    handle_url: &str,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO tweet_handle_queue (wall_id, handle_url)
        VALUES ($1, $2)
        ON CONFLICT (wall_id, handle_url) DO NOTHING
        "#,
    )
    .bind(wall_id)
    .bind(handle_url)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Oldest unprocessed entry (FIFO by insertion, ties broken by id)
pub async fn oldest_unprocessed<'e, E>(executor: E) -> Result<Option<HandleQueueEntry>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT id, wall_id, handle_url, processed, created_at
        FROM tweet_handle_queue
        WHERE processed = FALSE
        ORDER BY created_at, id
        LIMIT 1
        "#,
    )
    .fetch_optional(executor)
    .await
}

pub async fn mark_processed<'e, E>(executor: E, entry_id: i64) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("UPDATE tweet_handle_queue SET processed = TRUE WHERE id = $1")
        .bind(entry_id)
        .execute(executor)
        .await?;
    Ok(())
}

/// Start a new cycle: every entry becomes unprocessed again
pub async fn reset_all<'e, E>(executor: E) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("UPDATE tweet_handle_queue SET processed = FALSE")
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

pub async fn list_for_wall<'e, E>(
    executor: E,
    wall_id: i64,
) -> Result<Vec<HandleQueueEntry>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT id, wall_id, handle_url, processed, created_at
        FROM tweet_handle_queue
        WHERE wall_id = $1
        ORDER BY created_at, id
        "#,
    )
    .bind(wall_id)
    .fetch_all(executor)
    .await
}

pub async fn delete_entry<'e, E>(executor: E, wall_id: i64, entry_id: i64) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM tweet_handle_queue WHERE id = $1 AND wall_id = $2")
        .bind(entry_id)
        .bind(wall_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}
