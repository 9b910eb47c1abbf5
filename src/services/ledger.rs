//! Transaction writes and the balance updates that go with them.

use chrono::{NaiveDate, Utc};
use compute::balance::{
    balance_deltas_for_deletion, balance_deltas_for_update, signed_amount, BalanceDeltas,
    BalanceEntry,
};
use compute::recurrence::initial_next_recurring_date;
use model::entities::account;
use model::entities::transaction::{self, RecurringInterval, TransactionStatus, TransactionType};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use tracing::{debug, info, instrument, trace, warn};

use super::{ServiceError, ServiceResult};

/// Fields of a transaction as submitted by a client.
#[derive(Debug, Clone)]
pub struct TransactionInput {
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub category: String,
    pub receipt_url: Option<String>,
    pub is_recurring: bool,
    pub recurring_interval: Option<RecurringInterval>,
    pub status: TransactionStatus,
    pub account_id: i32,
}

impl TransactionInput {
    /// Amount must be positive and a recurring transaction needs an interval.
    /// A non-recurring one never keeps an interval.
    fn validated(mut self) -> ServiceResult<Self> {
        if self.amount <= Decimal::ZERO {
            return Err(ServiceError::Validation("Amount must be greater than zero".to_string()));
        }
        if self.category.trim().is_empty() {
            return Err(ServiceError::Validation("Category is required".to_string()));
        }
        if self.is_recurring && self.recurring_interval.is_none() {
            return Err(ServiceError::Validation(
                "Recurring interval is required for recurring transactions".to_string(),
            ));
        }
        if !self.is_recurring {
            self.recurring_interval = None;
        }
        Ok(self)
    }
}

/// Adds `delta` to an account balance in place.
pub async fn apply_balance_delta<C>(conn: &C, account_id: i32, delta: Decimal) -> ServiceResult<()>
where
    C: ConnectionTrait,
{
    if delta.is_zero() {
        return Ok(());
    }
    trace!("Adjusting balance of account {} by {}", account_id, delta);

    let result = account::Entity::update_many()
        .col_expr(
            account::Column::Balance,
            Expr::col(account::Column::Balance).add(delta),
        )
        .col_expr(account::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(account::Column::Id.eq(account_id))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        warn!("Balance update hit no rows for account {}", account_id);
        return Err(ServiceError::NotFound(format!("Account {}", account_id)));
    }
    Ok(())
}

pub async fn apply_balance_deltas<C>(conn: &C, deltas: &BalanceDeltas) -> ServiceResult<()>
where
    C: ConnectionTrait,
{
    for (account_id, delta) in deltas {
        apply_balance_delta(conn, *account_id, *delta).await?;
    }
    Ok(())
}

async fn owned_account<C>(conn: &C, user_id: i32, account_id: i32) -> ServiceResult<account::Model>
where
    C: ConnectionTrait,
{
    account::Entity::find_by_id(account_id)
        .filter(account::Column::UserId.eq(user_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Account {} of user {}", account_id, user_id)))
}

/// Records a transaction and applies it to the account balance.
#[instrument(skip(db))]
pub async fn create_transaction(
    db: &DatabaseConnection,
    user_id: i32,
    input: TransactionInput,
) -> ServiceResult<transaction::Model> {
    let input = input.validated()?;
    let next_recurring_date = initial_next_recurring_date(input.date, input.recurring_interval)?;

    let txn = db.begin().await?;
    owned_account(&txn, user_id, input.account_id).await?;

    let now = Utc::now();
    let created = transaction::ActiveModel {
        transaction_type: Set(input.transaction_type),
        amount: Set(input.amount),
        description: Set(input.description),
        date: Set(input.date),
        category: Set(input.category),
        receipt_url: Set(input.receipt_url),
        is_recurring: Set(input.is_recurring),
        recurring_interval: Set(input.recurring_interval),
        next_recurring_date: Set(next_recurring_date),
        last_processed: Set(None),
        status: Set(input.status),
        user_id: Set(user_id),
        account_id: Set(input.account_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    apply_balance_delta(
        &txn,
        created.account_id,
        signed_amount(created.transaction_type, created.amount),
    )
    .await?;
    txn.commit().await?;

    info!(
        "Created transaction {} on account {} for user {}",
        created.id, created.account_id, user_id
    );
    Ok(created)
}

/// Replaces a transaction's fields and moves its balance effect accordingly,
/// possibly from one account to another.
#[instrument(skip(db))]
pub async fn update_transaction(
    db: &DatabaseConnection,
    transaction_id: i32,
    input: TransactionInput,
) -> ServiceResult<transaction::Model> {
    let input = input.validated()?;

    let txn = db.begin().await?;
    let existing = transaction::Entity::find_by_id(transaction_id)
        .one(&txn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Transaction {}", transaction_id)))?;
    owned_account(&txn, existing.user_id, input.account_id).await?;

    // Rescheduling only happens when the schedule itself changed.
    let schedule_changed = existing.is_recurring != input.is_recurring
        || existing.recurring_interval != input.recurring_interval
        || existing.date != input.date;
    let next_recurring_date = if schedule_changed {
        initial_next_recurring_date(input.date, input.recurring_interval)?
    } else {
        existing.next_recurring_date
    };

    let deltas = balance_deltas_for_update(
        BalanceEntry::from(&existing),
        BalanceEntry {
            account_id: input.account_id,
            transaction_type: input.transaction_type,
            amount: input.amount,
        },
    );
    debug!("Balance deltas for transaction {}: {:?}", transaction_id, deltas);

    let mut active: transaction::ActiveModel = existing.into();
    active.transaction_type = Set(input.transaction_type);
    active.amount = Set(input.amount);
    active.description = Set(input.description);
    active.date = Set(input.date);
    active.category = Set(input.category);
    active.receipt_url = Set(input.receipt_url);
    active.is_recurring = Set(input.is_recurring);
    active.recurring_interval = Set(input.recurring_interval);
    active.next_recurring_date = Set(next_recurring_date);
    active.status = Set(input.status);
    active.account_id = Set(input.account_id);
    active.updated_at = Set(Utc::now());
    let updated = active.update(&txn).await?;

    apply_balance_deltas(&txn, &deltas).await?;
    txn.commit().await?;

    info!("Updated transaction {}", transaction_id);
    Ok(updated)
}

/// Deletes the user's transactions among `ids` and reverts their balance
/// effects. Ids that do not exist or belong to someone else are ignored.
/// Returns the touched account ids and the number of deleted rows.
#[instrument(skip(db))]
pub async fn bulk_delete_transactions(
    db: &DatabaseConnection,
    user_id: i32,
    ids: &[i32],
) -> ServiceResult<(Vec<i32>, u64)> {
    if ids.is_empty() {
        return Ok((Vec::new(), 0));
    }

    let txn = db.begin().await?;
    let doomed = transaction::Entity::find()
        .filter(transaction::Column::UserId.eq(user_id))
        .filter(transaction::Column::Id.is_in(ids.iter().copied()))
        .all(&txn)
        .await?;

    if doomed.is_empty() {
        debug!("None of {:?} belong to user {}", ids, user_id);
        return Ok((Vec::new(), 0));
    }

    let deltas = balance_deltas_for_deletion(&doomed);
    let result = transaction::Entity::delete_many()
        .filter(transaction::Column::UserId.eq(user_id))
        .filter(transaction::Column::Id.is_in(doomed.iter().map(|tx| tx.id)))
        .exec(&txn)
        .await?;
    apply_balance_deltas(&txn, &deltas).await?;
    txn.commit().await?;

    let mut accounts: Vec<i32> = doomed.iter().map(|tx| tx.account_id).collect();
    accounts.sort_unstable();
    accounts.dedup();

    info!(
        "Deleted {} transactions of user {} across {} accounts",
        result.rows_affected,
        user_id,
        accounts.len()
    );
    Ok((accounts, result.rows_affected))
}
