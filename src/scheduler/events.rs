//! In-process job events and the worker that consumes them.

use chrono::Utc;
use common::RecurringProcessOutcome;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument};

use super::throttle::UserThrottle;
use crate::jobs::recurring::process_recurring_transaction;
use crate::jobs::JobError;
use crate::schemas::{invalidate_user_stats, AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEvent {
    RecurringTransactionDue { transaction_id: i32, user_id: i32 },
}

impl JobEvent {
    /// The user an event is throttled under.
    pub fn user_id(&self) -> i32 {
        match self {
            JobEvent::RecurringTransactionDue { user_id, .. } => *user_id,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<JobEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<JobEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Processes [`JobEvent`]s, each under the per-user throttle.
#[derive(Debug, Clone)]
pub struct EventWorker {
    state: AppState,
    throttle: UserThrottle,
}

impl EventWorker {
    pub fn new(state: AppState) -> Self {
        let throttle = UserThrottle::new(
            state.settings.throttle.limit,
            state.settings.throttle.period(),
        );
        Self { state, throttle }
    }

    /// Handles one event once the user's throttle lets it through.
    #[instrument(skip(self))]
    pub async fn handle(&self, event: JobEvent) -> Result<RecurringProcessOutcome, JobError> {
        self.throttle.acquire(event.user_id()).await;
        match event {
            JobEvent::RecurringTransactionDue {
                transaction_id,
                user_id,
            } => {
                let now = Utc::now();
                let outcome = process_recurring_transaction(
                    &self.state.db,
                    transaction_id,
                    user_id,
                    now.date_naive(),
                    now,
                )
                .await?;
                if matches!(outcome, RecurringProcessOutcome::Materialized { .. }) {
                    invalidate_user_stats(&self.state, user_id);
                }
                Ok(outcome)
            }
        }
    }

    /// Consumes events until the channel closes or shutdown is signalled,
    /// then waits for events already in progress.
    pub async fn run(self, mut receiver: EventReceiver, mut shutdown: watch::Receiver<bool>) {
        info!("Event worker started");
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                maybe_event = receiver.recv() => {
                    let Some(event) = maybe_event else {
                        debug!("Event channel closed");
                        break;
                    };
                    let worker = self.clone();
                    in_flight.spawn(async move { worker.log_outcome(event).await });
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!("Event task panicked: {}", e);
                    }
                }
                _ = shutdown.changed() => {
                    info!("Event worker shutting down");
                    break;
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!("Event task panicked: {}", e);
            }
        }
        info!("Event worker stopped");
    }

    /// Handles whatever is queued right now, without waiting for more.
    /// Returns the number of events handled.
    pub async fn drain(&self, receiver: &mut EventReceiver) -> usize {
        let mut tasks = JoinSet::new();
        while let Ok(event) = receiver.try_recv() {
            let worker = self.clone();
            tasks.spawn(async move { worker.log_outcome(event).await });
        }

        let mut handled = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(()) => handled += 1,
                Err(e) => error!("Event task panicked: {}", e),
            }
        }
        handled
    }

    async fn log_outcome(&self, event: JobEvent) {
        match self.handle(event).await {
            Ok(outcome) => debug!("Event {:?} processed: {:?}", event, outcome),
            Err(e) => error!("Event {:?} failed: {}", event, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_utils::setup_test_app_state;

    #[test]
    fn test_event_user() {
        let event = JobEvent::RecurringTransactionDue {
            transaction_id: 3,
            user_id: 9,
        };
        assert_eq!(event.user_id(), 9);
    }

    #[tokio::test]
    async fn test_missing_transaction_is_skipped() {
        let state = setup_test_app_state().await;
        let worker = EventWorker::new(state);

        let outcome = worker
            .handle(JobEvent::RecurringTransactionDue {
                transaction_id: 999,
                user_id: 1,
            })
            .await
            .unwrap();
        assert_eq!(outcome, RecurringProcessOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_worker_stops_on_shutdown() {
        let state = setup_test_app_state().await;
        let (_sender, receiver) = event_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(EventWorker::new(state).run(receiver, shutdown_rx));
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
