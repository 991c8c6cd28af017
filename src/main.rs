#![forbid(unsafe_code)]

mod assignment_service;
mod config;
mod http;
mod models;
mod notification_service;
mod notifier;
mod repository;
mod utils;

#[cfg(test)]
mod test_utils;

use std::{process::exit, str::FromStr, sync::Arc};

use assignment_service::AssignmentService;
use config::AppConfig;
use http::AppState;
use notification_service::NotificationService;
use notifier::{LogNotifier, Notifier, WebhookNotifier};
use repository::{
    AssignmentRepository, ExtensionRepository, NotificationRepository,
    ReviewRelationshipRepository, UserRepository,
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tokio::{signal, sync::Notify};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    if let Err(err) = dotenvy::dotenv() {
        warn!("Could not load config from .env file: {err}");
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(
                    "extension_review_matcher=info"
                        .parse()
                        .expect("Hard-coded default directive should be correct"),
                )
                .from_env_lossy(),
        )
        .init();

    let app_config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("Could not load app config: {err}");
            exit(255);
        }
    };

    if let Err(err) = run(app_config).await {
        error!("{err:#}");
        exit(255);
    }
}

async fn run(app_config: AppConfig) -> Result<(), anyhow::Error> {
    let policy = app_config.assignment_policy()?;
    let listen_address = app_config.listen_address()?;
    let notification_max_attempts = app_config.notification_max_attempts()?;

    let db_pool = setup_database(app_config.database_url()?).await?;

    let notifier: Arc<dyn Notifier> = match app_config.notification_webhook_url() {
        Some(url) => {
            info!("Sending notifications to {url}");
            Arc::new(WebhookNotifier::new(url)?)
        }
        None => {
            warn!("NOTIFICATION_WEBHOOK_URL is not set, notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let shutdown_notify = Arc::new(Notify::new());
    let notification_wakeup = Arc::new(Notify::new());

    let dispatcher = NotificationService::new(
        notifier,
        Arc::new(NotificationRepository::new(db_pool.clone())),
        notification_max_attempts,
    )
    .start(shutdown_notify.clone(), notification_wakeup.clone());

    let assignment_service = AssignmentService::new(
        Arc::new(UserRepository::new(db_pool.clone())),
        Arc::new(ExtensionRepository::new(db_pool.clone())),
        Arc::new(ReviewRelationshipRepository::new(db_pool.clone())),
        Arc::new(AssignmentRepository::new(db_pool.clone())),
        notification_wakeup,
        policy,
    );

    let app = http::create_router(AppState {
        assignment_service: Arc::new(assignment_service),
        db_pool: db_pool.clone(),
    });

    let listener = tokio::net::TcpListener::bind(listen_address).await?;
    info!(
        "Listening on {listen_address} (at most {} active assignment(s) per reviewer, {}h review window)",
        policy.max_active_assignments,
        policy.review_window.whole_hours()
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = signal::ctrl_c().await {
                error!("Could not listen for Ctrl-C: {err}");
                return;
            }
            info!("Ctrl-C received, shutting down");
        })
        .await;

    shutdown_notify.notify_one();
    if let Err(err) = dispatcher.await {
        error!("Notification dispatcher stopped abnormally: {err}");
    }
    db_pool.close().await;

    served?;
    info!("Shutdown complete");
    Ok(())
}

#[tracing::instrument(skip(url))]
async fn setup_database(url: &str) -> anyhow::Result<SqlitePool> {
    info!("Connecting to SQLite database at {url}");
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    info!("Running migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Done!");
    Ok(pool)
}
