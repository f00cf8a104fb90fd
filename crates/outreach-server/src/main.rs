//! Outreach - campaign send scheduler entry point

use anyhow::{Context, Result};
use outreach_api::AppState;
use outreach_common::config::{Config, LoggingConfig};
use outreach_core::{build_sender, CampaignManager, QueueProcessor, SchedulerMetrics, SchedulerWorker};
use outreach_storage::{DatabasePool, MemoryStore, Repositories};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting Outreach campaign scheduler...");

    // Initialize store
    let repos = match config.database.url.as_deref() {
        Some(_) => {
            let db_pool = DatabasePool::new(&config.database).await?;
            info!("Database connection established");

            if config.database.run_migrations {
                db_pool.migrate().await?;
                info!("Database migrations completed");
            }
            Repositories::postgres(db_pool)
        }
        None => {
            warn!("No database URL configured; using the in-memory store (data is lost on restart)");
            Repositories::in_memory(MemoryStore::new())
        }
    };

    // Email provider
    let sender = build_sender(&config.mailer)?;

    // Scheduler
    let metrics = Arc::new(SchedulerMetrics::new()?);
    let processor = Arc::new(QueueProcessor::new(
        repos.clone(),
        sender,
        config.scheduler.clone(),
        metrics,
    ));

    let worker_handle = if config.scheduler.enabled {
        let worker = SchedulerWorker::from_config(processor.clone(), &config.scheduler);
        Some(tokio::spawn(async move {
            worker.run().await;
        }))
    } else {
        info!("Background scheduler disabled; passes run only through the cron endpoint");
        None
    };

    if config.api.cron_secret.is_none() {
        warn!("No cron secret configured; the queue trigger is open");
    }
    if config.api.admin_token.is_none() {
        warn!("No admin token configured; campaign endpoints are open");
    }

    // API server
    let app = outreach_api::create_router(AppState {
        campaigns: Arc::new(CampaignManager::new(repos.clone())),
        repos,
        processor,
        api: config.api.clone(),
    });

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind API server on {}", addr))?;
    info!("Starting API server on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    if let Some(handle) = worker_handle {
        handle.abort();
    }

    info!("Outreach shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},outreach=debug", config.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry
            .with(fmt::layer().json().with_target(true).with_level(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
