use anyhow::Result;
use tracing::{info, error};

use super::initdb::run_migrations;
use crate::config::{initialize_app_state, Settings};
use crate::jobs::{self, JobKind};
use crate::scheduler::events::EventWorker;

/// Runs `job` once. Recurring transactions queued by the run are processed
/// before returning.
pub async fn run_job(job: JobKind, database_url: Option<String>) -> Result<()> {
    let mut settings = Settings::load()?;
    if let Some(url) = database_url {
        settings.database_url = url;
    }

    let (state, mut receiver) = initialize_app_state(settings).await?;
    run_migrations(&state.db).await?;

    let summary = match jobs::run_job(&state, job).await {
        Ok(summary) => summary,
        Err(e) => {
            error!("Job {} failed: {}", job, e);
            return Err(e.into());
        }
    };

    if job == JobKind::RecurringTransactions {
        let handled = EventWorker::new(state.clone()).drain(&mut receiver).await;
        info!("Processed {} recurring transaction events", handled);
    }

    info!("Job {} finished", job);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
