//! Scheduled background jobs using apalis
//!
//! Two cron workers run under one monitor:
//! - handle sweep: re-ingests at most one queued author handle per tick
//! - metrics refresh: re-reads engagement counters for every stored tweet
//!
//! With a Postgres store the cron ticks are piped through apalis' Postgres
//! storage; the in-memory backend drives the workers from the bare cron stream.

use apalis::prelude::*;
use apalis_cron::{CronStream, Schedule};
use apalis_sql::postgres::PostgresStorage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::str::FromStr;
use std::sync::Arc;

use crate::services::ingest::{self, SweepOutcome};
use crate::services::twitter::TweetSource;
use crate::store::Store;

#[derive(Debug, thiserror::Error)]
pub enum JobsError {
    #[error("invalid cron expression {expr:?}: {reason}")]
    Schedule { expr: String, reason: String },
    #[error("job storage setup failed: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("job monitor failed: {0}")]
    Monitor(String),
}

/// Tick of the handle sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandleSweepJob {
    pub scheduled_at: DateTime<Utc>,
}

impl From<DateTime<Utc>> for HandleSweepJob {
    fn from(dt: DateTime<Utc>) -> Self {
        HandleSweepJob { scheduled_at: dt }
    }
}

/// Tick of the engagement refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsRefreshJob {
    pub scheduled_at: DateTime<Utc>,
}

impl From<DateTime<Utc>> for MetricsRefreshJob {
    fn from(dt: DateTime<Utc>) -> Self {
        MetricsRefreshJob { scheduled_at: dt }
    }
}

/// Dependencies handed to every job run
#[derive(Clone)]
pub struct JobContext {
    pub store: Arc<dyn Store>,
    pub tweets: Arc<dyn TweetSource>,
}

pub struct JobSchedules {
    pub handle_sweep: String,
    pub metrics_refresh: String,
}

/// Failures are logged and never fail the job; the next tick retries
async fn handle_sweep_job(job: HandleSweepJob, ctx: Data<JobContext>) -> Result<(), Error> {
    match ingest::poll_next_handle(ctx.store.as_ref(), ctx.tweets.as_ref()).await {
        Ok(SweepOutcome::Processed { entry_id, created }) => {
            tracing::info!(entry_id, created, scheduled_at = %job.scheduled_at, "handle sweep tick");
        }
        Ok(SweepOutcome::Reset { count }) => {
            tracing::debug!(count, "handle sweep found nothing to do");
        }
        Ok(SweepOutcome::Failed { entry_id }) => {
            tracing::warn!(entry_id, "handle sweep tick left entry for retry");
        }
        Err(e) => {
            tracing::error!(error = %e, "handle sweep could not read the queue");
        }
    }
    Ok(())
}

async fn metrics_refresh_job(job: MetricsRefreshJob, ctx: Data<JobContext>) -> Result<(), Error> {
    match ingest::refresh_engagement(ctx.store.as_ref(), ctx.tweets.as_ref()).await {
        Ok(updated) => {
            tracing::info!(updated, scheduled_at = %job.scheduled_at, "engagement refresh complete");
        }
        Err(e) => {
            tracing::error!(error = %e, "engagement refresh aborted");
        }
    }
    Ok(())
}

fn schedule(expr: &str) -> Result<Schedule, JobsError> {
    Schedule::from_str(expr).map_err(|e| JobsError::Schedule {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

/// Run both workers until the monitor stops
///
/// `pool` selects the Postgres-backed job storage; without it the cron
/// streams feed the workers directly.
pub async fn run_workers(
    ctx: JobContext,
    schedules: JobSchedules,
    pool: Option<PgPool>,
) -> Result<(), JobsError> {
    let sweep_schedule = schedule(&schedules.handle_sweep)?;
    let refresh_schedule = schedule(&schedules.metrics_refresh)?;

    tracing::info!(
        handle_sweep = %schedules.handle_sweep,
        metrics_refresh = %schedules.metrics_refresh,
        persistent = pool.is_some(),
        "starting background workers"
    );

    let monitor = match pool {
        Some(pool) => {
            PostgresStorage::setup(&pool).await?;

            let sweep_storage: PostgresStorage<HandleSweepJob> = PostgresStorage::new(pool.clone());
            let refresh_storage: PostgresStorage<MetricsRefreshJob> = PostgresStorage::new(pool);

            let sweep = WorkerBuilder::new("handle-sweep")
                .data(ctx.clone())
                .backend(CronStream::new(sweep_schedule).pipe_to_storage(sweep_storage))
                .build_fn(handle_sweep_job);
            let refresh = WorkerBuilder::new("metrics-refresh")
                .data(ctx)
                .backend(CronStream::new(refresh_schedule).pipe_to_storage(refresh_storage))
                .build_fn(metrics_refresh_job);

            Monitor::new().register(sweep).register(refresh)
        }
        None => {
            let sweep = WorkerBuilder::new("handle-sweep")
                .data(ctx.clone())
                .backend(CronStream::new(sweep_schedule))
                .build_fn(handle_sweep_job);
            let refresh = WorkerBuilder::new("metrics-refresh")
                .data(ctx)
                .backend(CronStream::new(refresh_schedule))
                .build_fn(metrics_refresh_job);

            Monitor::new().register(sweep).register(refresh)
        }
    };

    monitor.run().await.map_err(|e| JobsError::Monitor(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DEFAULT_HANDLE_SWEEP_CRON, DEFAULT_METRICS_REFRESH_CRON};

    #[test]
    fn test_default_schedules_parse() {
        assert!(schedule(DEFAULT_HANDLE_SWEEP_CRON).is_ok());
        assert!(schedule(DEFAULT_METRICS_REFRESH_CRON).is_ok());
    }

    #[test]
    fn test_bad_schedule_reports_expression() {
        let err = schedule("every quarter hour").unwrap_err();
        assert!(err.to_string().contains("every quarter hour"));
    }

    #[test]
    fn test_job_from_tick() {
        let now = Utc::now();
        assert_eq!(HandleSweepJob::from(now).scheduled_at, now);
        assert_eq!(MetricsRefreshJob::from(now).scheduled_at, now);
    }
}
