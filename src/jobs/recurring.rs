//! Materializing due recurring transactions.
//!
//! The daily trigger only finds due templates and queues one event per
//! template. Each event is then processed on its own: the template is loaded
//! again and claimed by a conditional update of its next due date; only the
//! claiming event inserts the copy, in the same database transaction.

use chrono::{DateTime, NaiveDate, Utc};
use common::{RecurringProcessOutcome, RecurringTriggerSummary};
use compute::balance::signed_amount;
use compute::recurrence::{is_transaction_due, next_recurring_date};
use model::entities::transaction::{self, TransactionStatus};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use tracing::{debug, info, instrument, warn};

use super::JobError;
use crate::scheduler::events::{EventSender, JobEvent};
use crate::services::ledger::apply_balance_delta;

/// Description of a generated copy.
pub fn recurring_copy_description(template: Option<&str>) -> String {
    match template.map(str::trim).filter(|d| !d.is_empty()) {
        Some(description) => format!("{} (Recurring)", description),
        None => "Recurring transaction".to_string(),
    }
}

/// Queues a [`JobEvent::RecurringTransactionDue`] for every due template.
#[instrument(skip(db, events))]
pub async fn trigger_recurring_transactions(
    db: &DatabaseConnection,
    events: &EventSender,
    today: NaiveDate,
) -> Result<RecurringTriggerSummary, JobError> {
    let candidates = transaction::Entity::find()
        .filter(transaction::Column::IsRecurring.eq(true))
        .filter(transaction::Column::Status.eq(TransactionStatus::Completed))
        .filter(transaction::Column::RecurringInterval.is_not_null())
        .filter(
            Condition::any()
                .add(transaction::Column::NextRecurringDate.is_null())
                .add(transaction::Column::NextRecurringDate.lte(today)),
        )
        .order_by_asc(transaction::Column::Id)
        .all(db)
        .await?;
    debug!("Found {} recurring transaction candidates", candidates.len());

    let mut triggered = 0;
    for tx in candidates.iter().filter(|tx| is_transaction_due(tx, today)) {
        events
            .send(JobEvent::RecurringTransactionDue {
                transaction_id: tx.id,
                user_id: tx.user_id,
            })
            .map_err(|_| JobError::ChannelClosed)?;
        triggered += 1;
    }

    info!("Triggered {} recurring transactions for {}", triggered, today);
    Ok(RecurringTriggerSummary { triggered })
}

/// Materializes one due recurring transaction.
///
/// The template is looked up by id and owner. A missing, foreign or not yet
/// due template is skipped. Otherwise the copy is inserted, the account
/// balance adjusted and the template advanced to one interval after `today`.
///
/// The advance is a conditional update and the first write of the database
/// transaction: only the event whose update still finds the template due
/// goes on to insert the copy, concurrent duplicates are skipped.
#[instrument(skip(db))]
pub async fn process_recurring_transaction(
    db: &DatabaseConnection,
    transaction_id: i32,
    user_id: i32,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<RecurringProcessOutcome, JobError> {
    let Some(template) = transaction::Entity::find_by_id(transaction_id)
        .filter(transaction::Column::UserId.eq(user_id))
        .one(db)
        .await?
    else {
        warn!("Recurring transaction {} of user {} not found", transaction_id, user_id);
        return Ok(RecurringProcessOutcome::Skipped);
    };

    let interval = match template.recurring_interval {
        Some(interval) if is_transaction_due(&template, today) => interval,
        _ => {
            debug!(
                "Recurring transaction {} is not due on {} (next: {:?})",
                transaction_id, today, template.next_recurring_date
            );
            return Ok(RecurringProcessOutcome::Skipped);
        }
    };
    let next = next_recurring_date(today, interval)?;

    let txn = db.begin().await?;

    let claimed = transaction::Entity::update_many()
        .col_expr(transaction::Column::NextRecurringDate, Expr::value(next))
        .col_expr(transaction::Column::LastProcessed, Expr::value(now))
        .col_expr(transaction::Column::UpdatedAt, Expr::value(now))
        .filter(transaction::Column::Id.eq(transaction_id))
        .filter(transaction::Column::UserId.eq(user_id))
        .filter(transaction::Column::IsRecurring.eq(true))
        .filter(transaction::Column::Status.eq(TransactionStatus::Completed))
        .filter(transaction::Column::RecurringInterval.eq(interval))
        .filter(
            Condition::any()
                .add(transaction::Column::NextRecurringDate.is_null())
                .add(transaction::Column::NextRecurringDate.lte(today)),
        )
        .exec(&txn)
        .await?;
    if claimed.rows_affected != 1 {
        debug!(
            "Recurring transaction {} was already processed for {}",
            transaction_id, today
        );
        return Ok(RecurringProcessOutcome::Skipped);
    }

    let created = transaction::ActiveModel {
        transaction_type: Set(template.transaction_type),
        amount: Set(template.amount),
        description: Set(Some(recurring_copy_description(template.description.as_deref()))),
        date: Set(today),
        category: Set(template.category.clone()),
        receipt_url: Set(None),
        is_recurring: Set(false),
        recurring_interval: Set(None),
        next_recurring_date: Set(None),
        last_processed: Set(None),
        status: Set(TransactionStatus::Completed),
        user_id: Set(template.user_id),
        account_id: Set(template.account_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    apply_balance_delta(
        &txn,
        template.account_id,
        signed_amount(template.transaction_type, template.amount),
    )
    .await?;

    txn.commit().await?;

    info!(
        "Materialized recurring transaction {} as {}, next due {}",
        transaction_id, created.id, next
    );
    Ok(RecurringProcessOutcome::Materialized {
        created_transaction_id: created.id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::events::event_channel;
    use crate::services::accounts::{create_account, NewAccount};
    use crate::services::ledger::{create_transaction, TransactionInput};
    use crate::test_utils::test_utils::{create_test_user, setup_file_test_db, setup_test_db};
    use chrono::TimeZone;
    use model::entities::account::{self, AccountType};
    use model::entities::transaction::{RecurringInterval, TransactionType};
    use rust_decimal::Decimal;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    struct Fixture {
        db: DatabaseConnection,
        user_id: i32,
        account_id: i32,
        template: transaction::Model,
    }

    /// A 1000 balance account with a monthly 100 expense dated 2024-01-31,
    /// which leaves the balance at 900.
    async fn fixture(name: &str) -> Fixture {
        fixture_on(setup_test_db().await, name).await
    }

    async fn fixture_on(db: DatabaseConnection, name: &str) -> Fixture {
        let user = create_test_user(&db, name).await;
        let account = create_account(
            &db,
            user.id,
            NewAccount {
                name: "Main".to_string(),
                account_type: AccountType::Current,
                balance: Decimal::new(1000, 0),
                is_default: true,
            },
        )
        .await
        .unwrap();
        let template = create_transaction(
            &db,
            user.id,
            TransactionInput {
                transaction_type: TransactionType::Expense,
                amount: Decimal::new(100, 0),
                description: Some("Gym".to_string()),
                date: date(2024, 1, 31),
                category: "health".to_string(),
                receipt_url: None,
                is_recurring: true,
                recurring_interval: Some(RecurringInterval::Monthly),
                status: TransactionStatus::Completed,
                account_id: account.id,
            },
        )
        .await
        .unwrap();

        Fixture {
            db,
            user_id: user.id,
            account_id: account.id,
            template,
        }
    }

    async fn balance(db: &DatabaseConnection, account_id: i32) -> Decimal {
        account::Entity::find_by_id(account_id).one(db).await.unwrap().unwrap().balance
    }

    #[test]
    fn test_copy_description() {
        assert_eq!(recurring_copy_description(Some("Rent")), "Rent (Recurring)");
        assert_eq!(recurring_copy_description(Some("  ")), "Recurring transaction");
        assert_eq!(recurring_copy_description(None), "Recurring transaction");
    }

    #[tokio::test]
    async fn test_trigger_queues_only_due_templates() {
        let f = fixture("recurring_trigger").await;
        assert_eq!(f.template.next_recurring_date, Some(date(2024, 2, 29)));
        let (sender, mut receiver) = event_channel();

        let early = trigger_recurring_transactions(&f.db, &sender, date(2024, 2, 28)).await.unwrap();
        assert_eq!(early.triggered, 0);

        let due = trigger_recurring_transactions(&f.db, &sender, date(2024, 2, 29)).await.unwrap();
        assert_eq!(due.triggered, 1);
        assert_eq!(
            receiver.try_recv().unwrap(),
            JobEvent::RecurringTransactionDue {
                transaction_id: f.template.id,
                user_id: f.user_id,
            }
        );
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_process_materializes_once() {
        let f = fixture("recurring_process").await;
        let today = date(2024, 2, 29);
        let now = Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 5).unwrap();

        let outcome = process_recurring_transaction(&f.db, f.template.id, f.user_id, today, now)
            .await
            .unwrap();
        let RecurringProcessOutcome::Materialized { created_transaction_id } = outcome else {
            panic!("expected a materialized transaction, got {:?}", outcome);
        };

        let copy = transaction::Entity::find_by_id(created_transaction_id)
            .one(&f.db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(copy.description.as_deref(), Some("Gym (Recurring)"));
        assert_eq!(copy.date, today);
        assert!(!copy.is_recurring);
        assert_eq!(copy.status, TransactionStatus::Completed);
        assert_eq!(balance(&f.db, f.account_id).await, Decimal::new(800, 0));

        let template = transaction::Entity::find_by_id(f.template.id)
            .one(&f.db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(template.next_recurring_date, Some(date(2024, 3, 29)));
        assert_eq!(template.last_processed, Some(now));

        // A duplicate event for the same day finds the template no longer due.
        let again = process_recurring_transaction(&f.db, f.template.id, f.user_id, today, now)
            .await
            .unwrap();
        assert_eq!(again, RecurringProcessOutcome::Skipped);
        assert_eq!(balance(&f.db, f.account_id).await, Decimal::new(800, 0));
    }

    #[tokio::test]
    async fn test_process_skips_foreign_user() {
        let f = fixture("recurring_foreign").await;
        let now = Utc::now();

        let outcome = process_recurring_transaction(&f.db, f.template.id, f.user_id + 1000, date(2024, 3, 1), now)
            .await
            .unwrap();
        assert_eq!(outcome, RecurringProcessOutcome::Skipped);
        assert_eq!(balance(&f.db, f.account_id).await, Decimal::new(900, 0));
    }

    #[tokio::test]
    async fn test_concurrent_events_materialize_once() {
        let f = fixture_on(setup_file_test_db("recurring_concurrent").await, "recurring_concurrent").await;
        let today = date(2024, 2, 29);
        let now = Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 5).unwrap();

        let (first, second) = tokio::join!(
            process_recurring_transaction(&f.db, f.template.id, f.user_id, today, now),
            process_recurring_transaction(&f.db, f.template.id, f.user_id, today, now),
        );
        let outcomes = [first.unwrap(), second.unwrap()];
        let materialized = outcomes
            .iter()
            .filter(|o| matches!(o, RecurringProcessOutcome::Materialized { .. }))
            .count();
        assert_eq!(materialized, 1, "outcomes: {:?}", outcomes);
        assert!(outcomes.contains(&RecurringProcessOutcome::Skipped));

        let copies = transaction::Entity::find()
            .filter(transaction::Column::AccountId.eq(f.account_id))
            .filter(transaction::Column::IsRecurring.eq(false))
            .all(&f.db)
            .await
            .unwrap();
        assert_eq!(copies.len(), 1);
        assert_eq!(balance(&f.db, f.account_id).await, Decimal::new(800, 0));
    }
}
