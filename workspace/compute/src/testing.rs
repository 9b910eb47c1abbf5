//! Fixtures shared by the compute tests.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{NaiveDate, Utc};
use migration::{Migrator, MigratorTrait};
use model::entities::account::{self, AccountType};
use model::entities::transaction::{self, TransactionStatus, TransactionType};
use model::entities::user;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, DbErr, Set};

static NEXT_FIXTURE: AtomicU64 = AtomicU64::new(1);

fn next_fixture() -> u64 {
    NEXT_FIXTURE.fetch_add(1, Ordering::Relaxed)
}

/// In-memory SQLite database with all migrations applied.
pub async fn setup_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to connect to in-memory database");
    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");
    db
}

pub async fn new_user(db: &DatabaseConnection) -> Result<user::Model, DbErr> {
    let n = next_fixture();
    let now = Utc::now();
    user::ActiveModel {
        external_id: Set(format!("ext_{n}")),
        email: Set(format!("user{n}@example.com")),
        name: Set(Some(format!("User {n}"))),
        image_url: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
}

pub async fn new_account(db: &DatabaseConnection, owner: &user::Model) -> Result<account::Model, DbErr> {
    let now = Utc::now();
    account::ActiveModel {
        name: Set(format!("Account {}", next_fixture())),
        account_type: Set(AccountType::Current),
        balance: Set(Decimal::ZERO),
        is_default: Set(false),
        user_id: Set(owner.id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
}

/// Inserts a completed, non-recurring transaction of `units` whole currency units.
pub async fn new_transaction(
    db: &DatabaseConnection,
    account: &account::Model,
    transaction_type: TransactionType,
    units: i64,
    date: NaiveDate,
) -> Result<transaction::Model, DbErr> {
    let now = Utc::now();
    transaction::ActiveModel {
        transaction_type: Set(transaction_type),
        amount: Set(Decimal::new(units, 0)),
        description: Set(None),
        date: Set(date),
        category: Set("general".to_string()),
        receipt_url: Set(None),
        is_recurring: Set(false),
        recurring_interval: Set(None),
        next_recurring_date: Set(None),
        last_processed: Set(None),
        status: Set(TransactionStatus::Completed),
        user_id: Set(account.user_id),
        account_id: Set(account.id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
}

/// A detached transaction model, never written to a database.
pub fn transaction_model(
    transaction_type: TransactionType,
    amount: Decimal,
    date: NaiveDate,
) -> transaction::Model {
    let now = Utc::now();
    transaction::Model {
        id: 1,
        transaction_type,
        amount,
        description: None,
        date,
        category: "general".to_string(),
        receipt_url: None,
        is_recurring: false,
        recurring_interval: None,
        next_recurring_date: None,
        last_processed: None,
        status: TransactionStatus::Completed,
        user_id: 1,
        account_id: 1,
        created_at: now,
        updated_at: now,
    }
}
