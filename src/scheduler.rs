//! Runs the jobs on their cron schedules.

pub mod events;
pub mod throttle;

use chrono::Utc;
use cron::Schedule;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::jobs::{run_job, JobKind};
use crate::schemas::AppState;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid cron expression {expression:?} for {job}: {source}")]
    InvalidSchedule {
        job: JobKind,
        expression: String,
        #[source]
        source: cron::error::Error,
    },
}

/// Parses a six-field cron expression (`sec min hour day month weekday`).
pub fn parse_schedule(expression: &str) -> Result<Schedule, cron::error::Error> {
    Schedule::from_str(expression)
}

pub struct Scheduler {
    state: AppState,
    jobs: Vec<(JobKind, Schedule)>,
}

impl Scheduler {
    pub fn from_settings(state: AppState) -> Result<Self, SchedulerError> {
        let schedule = &state.settings.schedule;
        let mut jobs = Vec::with_capacity(JobKind::ALL.len());
        for kind in JobKind::ALL {
            let expression = match kind {
                JobKind::RecurringTransactions => &schedule.recurring_transactions,
                JobKind::MonthlyReports => &schedule.monthly_reports,
                JobKind::BudgetAlerts => &schedule.budget_alerts,
            };
            let parsed = parse_schedule(expression).map_err(|source| SchedulerError::InvalidSchedule {
                job: kind,
                expression: expression.clone(),
                source,
            })?;
            jobs.push((kind, parsed));
        }
        Ok(Self { state, jobs })
    }

    /// Starts one timer loop per job. Every loop ends when `shutdown` changes.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        self.jobs
            .into_iter()
            .map(|(kind, schedule)| {
                let state = self.state.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(run_on_schedule(state, kind, schedule, shutdown))
            })
            .collect()
    }
}

async fn run_on_schedule(
    state: AppState,
    kind: JobKind,
    schedule: Schedule,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Scheduled job {} started", kind);
    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            warn!("Schedule of {} has no upcoming runs", kind);
            return;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        debug!("Next {} run at {} (in {:?})", kind, next, wait);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.changed() => {
                info!("Scheduled job {} stopped", kind);
                return;
            }
        }

        if let Err(e) = run_job(&state, kind).await {
            error!("Scheduled run of {} failed: {}", kind, e);
        }
    }
}
