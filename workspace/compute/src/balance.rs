//! Signed balance effects of transactions.

use std::collections::BTreeMap;

use model::entities::transaction::{self, TransactionType};
use rust_decimal::Decimal;

/// The change a transaction makes to its account balance.
pub fn signed_amount(transaction_type: TransactionType, amount: Decimal) -> Decimal {
    match transaction_type {
        TransactionType::Income => amount,
        TransactionType::Expense => -amount,
    }
}

/// Per-account balance changes, keyed by account id.
pub type BalanceDeltas = BTreeMap<i32, Decimal>;

/// The slice of a transaction that affects balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceEntry {
    pub account_id: i32,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
}

impl BalanceEntry {
    pub fn signed(&self) -> Decimal {
        signed_amount(self.transaction_type, self.amount)
    }
}

impl From<&transaction::Model> for BalanceEntry {
    fn from(tx: &transaction::Model) -> Self {
        Self {
            account_id: tx.account_id,
            transaction_type: tx.transaction_type,
            amount: tx.amount,
        }
    }
}

/// Balance changes needed when a transaction is edited from `old` to `new`.
///
/// The old effect is reverted and the new one applied. When the account did
/// not change the two collapse into one entry. Zero deltas are dropped.
pub fn balance_deltas_for_update(old: BalanceEntry, new: BalanceEntry) -> BalanceDeltas {
    let mut deltas = BalanceDeltas::new();
    *deltas.entry(old.account_id).or_default() -= old.signed();
    *deltas.entry(new.account_id).or_default() += new.signed();
    deltas.retain(|_, delta| !delta.is_zero());
    deltas
}

/// Balance changes that undo the given transactions, summed per account.
pub fn balance_deltas_for_deletion<'a, I>(transactions: I) -> BalanceDeltas
where
    I: IntoIterator<Item = &'a transaction::Model>,
{
    let mut deltas = BalanceDeltas::new();
    for tx in transactions {
        *deltas.entry(tx.account_id).or_default() -= signed_amount(tx.transaction_type, tx.amount);
    }
    deltas.retain(|_, delta| !delta.is_zero());
    deltas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::transaction_model;
    use chrono::NaiveDate;

    fn entry(account_id: i32, transaction_type: TransactionType, cents: i64) -> BalanceEntry {
        BalanceEntry {
            account_id,
            transaction_type,
            amount: Decimal::new(cents, 2),
        }
    }

    #[test]
    fn test_signed_amount() {
        assert_eq!(signed_amount(TransactionType::Income, Decimal::new(500, 2)), Decimal::new(500, 2));
        assert_eq!(signed_amount(TransactionType::Expense, Decimal::new(500, 2)), Decimal::new(-500, 2));
    }

    #[test]
    fn test_update_on_same_account_nets_out() {
        let deltas = balance_deltas_for_update(
            entry(1, TransactionType::Expense, 5000),
            entry(1, TransactionType::Expense, 7500),
        );
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[&1], Decimal::new(-2500, 2));
    }

    #[test]
    fn test_update_flipping_type() {
        let deltas = balance_deltas_for_update(
            entry(1, TransactionType::Expense, 1000),
            entry(1, TransactionType::Income, 1000),
        );
        assert_eq!(deltas[&1], Decimal::new(2000, 2));
    }

    #[test]
    fn test_update_moving_between_accounts() {
        let deltas = balance_deltas_for_update(
            entry(1, TransactionType::Expense, 1000),
            entry(2, TransactionType::Expense, 1200),
        );
        assert_eq!(deltas[&1], Decimal::new(1000, 2));
        assert_eq!(deltas[&2], Decimal::new(-1200, 2));
    }

    #[test]
    fn test_unchanged_update_has_no_deltas() {
        let same = entry(3, TransactionType::Income, 999);
        assert!(balance_deltas_for_update(same, same).is_empty());
    }

    #[test]
    fn test_deletion_groups_by_account() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let mut a = transaction_model(TransactionType::Expense, Decimal::new(1000, 2), day);
        a.account_id = 1;
        let mut b = transaction_model(TransactionType::Income, Decimal::new(300, 2), day);
        b.account_id = 1;
        let mut c = transaction_model(TransactionType::Income, Decimal::new(4200, 2), day);
        c.account_id = 2;

        let deltas = balance_deltas_for_deletion([&a, &b, &c]);
        assert_eq!(deltas[&1], Decimal::new(700, 2));
        assert_eq!(deltas[&2], Decimal::new(-4200, 2));
    }
}
