use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, debug, trace, error, warn};

use super::initdb::run_migrations;
use crate::config::{initialize_app_state, Settings};
use crate::router::create_router;
use crate::scheduler::events::EventWorker;
use crate::scheduler::Scheduler;

pub async fn serve(
    database_url: Option<String>,
    bind_address: Option<String>,
    no_scheduler: bool,
) -> Result<()> {
    trace!("Entering serve function");
    info!("Spendwise starting up");

    let mut settings = Settings::load()?;
    if let Some(url) = database_url {
        settings.database_url = url;
    }
    if let Some(address) = bind_address {
        settings.bind_address = address;
    }
    if no_scheduler {
        settings.schedule.enabled = false;
    }
    let bind_address = settings.bind_address.clone();
    debug!("Bind address: {}", bind_address);

    let (state, receiver) = match initialize_app_state(settings).await {
        Ok(initialized) => initialized,
        Err(e) => {
            error!("Failed to initialize application state: {}", e);
            return Err(e);
        }
    };
    run_migrations(&state.db).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut background = vec![tokio::spawn(
        EventWorker::new(state.clone()).run(receiver, shutdown_rx.clone()),
    )];

    if state.settings.schedule.enabled {
        let scheduler = Scheduler::from_settings(state.clone())?;
        background.extend(scheduler.spawn(shutdown_rx.clone()));
        info!("Job scheduler started");
    } else {
        warn!("Job scheduler disabled; jobs only run when triggered");
    }

    let app = create_router(state);

    info!("Starting server on {}", bind_address);
    let listener = match TcpListener::bind(&bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to address {}: {}", bind_address, e);
            return Err(e.into());
        }
    };

    info!("Spendwise API server running on http://{}", bind_address);
    info!("Swagger UI available at http://{}/swagger-ui", bind_address);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Stops the scheduler loops and lets the worker finish in-flight events.
    let _ = shutdown_tx.send(true);
    for handle in background {
        if let Err(e) = handle.await {
            error!("Background task failed: {}", e);
        }
    }

    if let Err(e) = served {
        error!("Server error: {}", e);
        return Err(e.into());
    }
    info!("Server shutdown gracefully");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
}
