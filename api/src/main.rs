use google_cloud_storage::client::Storage;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use wall_of_love::config::{Config, StorageConfig, StoreBackend};
use wall_of_love::jobs::{self, JobContext, JobSchedules};
use wall_of_love::services::google::GoogleClient;
use wall_of_love::services::mailer::{LogMailer, Mailer, SmtpMailer};
use wall_of_love::services::stripe::StripeClient;
use wall_of_love::services::twitter::{TweetSource, TwitterClient};
use wall_of_love::storage::MediaStorage;
use wall_of_love::store::{MemoryStore, PgStore, Store};
use wall_of_love::{AppState, build_app};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(Config::from_env()?);

    let (store, pool): (Arc<dyn Store>, Option<PgPool>) = match config.store_backend {
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or("DATABASE_URL is required for the postgres store")?;
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("connected to postgres, migrations applied");
            (Arc::new(PgStore::new(pool.clone())), Some(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store, data is lost on restart");
            (Arc::new(MemoryStore::new()), None)
        }
    };

    // GCS client uses GOOGLE_APPLICATION_CREDENTIALS env var
    let media = match &config.storage {
        StorageConfig::Gcs { bucket } => MediaStorage::Gcs {
            client: Storage::builder().build().await?,
            bucket: bucket.clone(),
        },
        StorageConfig::Local(root) => {
            tokio::fs::create_dir_all(root).await?;
            MediaStorage::Local(root.clone())
        }
    };

    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpMailer::new(smtp, &config.mail_from)?),
        None => {
            tracing::warn!("SMTP not configured, mail will only be logged");
            Arc::new(LogMailer)
        }
    };

    if config.twitter_bearer_token.is_none() {
        tracing::warn!("TWITTER_BEARER_TOKEN not set, tweet ingestion is disabled");
    }
    let tweets: Arc<dyn TweetSource> =
        Arc::new(TwitterClient::new(config.twitter_bearer_token.clone()));

    let state = Arc::new(AppState {
        store: store.clone(),
        tweets: tweets.clone(),
        mailer,
        media,
        stripe: config.stripe.as_ref().map(StripeClient::new),
        google: config.google.as_ref().map(GoogleClient::new),
        config: config.clone(),
    });

    let schedules = JobSchedules {
        handle_sweep: config.handle_sweep_cron.clone(),
        metrics_refresh: config.metrics_refresh_cron.clone(),
    };
    tokio::spawn(async move {
        if let Err(e) = jobs::run_workers(JobContext { store, tweets }, schedules, pool).await {
            tracing::error!(error = %e, "background workers stopped");
        }
    });

    let app = build_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        tracing::info!("received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                tracing::info!("received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
