//! Date arithmetic for recurring transactions.
//!
//! A recurring transaction is a regular `transactions` row with
//! `is_recurring` set. Its `next_recurring_date` says when the scheduler
//! should next copy it into a fresh transaction.

use chrono::{Days, Months, NaiveDate};
use model::entities::transaction::{self, RecurringInterval, TransactionStatus};
use tracing::trace;

use crate::error::{ComputeError, Result};

/// Returns the date one `interval` after `from`.
///
/// Monthly and yearly steps keep the day of month where possible and clamp
/// to the last day of shorter months, so January 31st is followed by the
/// last day of February and February 29th by February 28th.
pub fn next_recurring_date(from: NaiveDate, interval: RecurringInterval) -> Result<NaiveDate> {
    let next = match interval {
        RecurringInterval::Daily => from.checked_add_days(Days::new(1)),
        RecurringInterval::Weekly => from.checked_add_days(Days::new(7)),
        RecurringInterval::Monthly => from.checked_add_months(Months::new(1)),
        RecurringInterval::Yearly => from.checked_add_months(Months::new(12)),
    };

    next.ok_or_else(|| {
        ComputeError::Date(format!(
            "cannot advance {} by one {:?} interval",
            from, interval
        ))
    })
}

/// The first due date of a newly recorded recurring transaction.
///
/// The recorded row itself accounts for the period it is dated in, so the
/// first copy is due one interval later.
pub fn initial_next_recurring_date(
    date: NaiveDate,
    interval: Option<RecurringInterval>,
) -> Result<Option<NaiveDate>> {
    interval
        .map(|interval| next_recurring_date(date, interval))
        .transpose()
}

/// Whether the scheduler should materialize `tx` on `today`.
///
/// Only completed recurring templates are ever due. A template that has no
/// `next_recurring_date` has never been scheduled and is due immediately.
pub fn is_transaction_due(tx: &transaction::Model, today: NaiveDate) -> bool {
    if !tx.is_recurring || tx.recurring_interval.is_none() {
        return false;
    }
    if tx.status != TransactionStatus::Completed {
        return false;
    }

    let due = match tx.next_recurring_date {
        None => true,
        Some(next_due) => next_due <= today,
    };
    trace!(
        transaction_id = tx.id,
        next_recurring_date = ?tx.next_recurring_date,
        %today,
        due,
        "Checked recurring transaction due date"
    );
    due
}
