use chrono::Utc;
use model::entities::account::{self, AccountType};
use model::entities::user;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, Set, TransactionTrait,
};
use tracing::{debug, info, instrument, warn};

use super::{ServiceError, ServiceResult};

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub account_type: AccountType,
    /// Opening balance
    pub balance: Decimal,
    pub is_default: bool,
}

async fn clear_default<C>(conn: &C, user_id: i32) -> ServiceResult<()>
where
    C: ConnectionTrait,
{
    let result = account::Entity::update_many()
        .col_expr(account::Column::IsDefault, Expr::value(false))
        .filter(account::Column::UserId.eq(user_id))
        .filter(account::Column::IsDefault.eq(true))
        .exec(conn)
        .await?;
    debug!("Cleared default flag on {} accounts of user {}", result.rows_affected, user_id);
    Ok(())
}

/// Creates an account. A user's first account is always the default one,
/// and a new default account takes the flag from the previous one.
#[instrument(skip(db))]
pub async fn create_account(
    db: &DatabaseConnection,
    user_id: i32,
    new_account: NewAccount,
) -> ServiceResult<account::Model> {
    let txn = db.begin().await?;

    if user::Entity::find_by_id(user_id).one(&txn).await?.is_none() {
        return Err(ServiceError::NotFound(format!("User {}", user_id)));
    }

    let existing = account::Entity::find()
        .filter(account::Column::UserId.eq(user_id))
        .count(&txn)
        .await?;
    let is_default = existing == 0 || new_account.is_default;
    if is_default {
        clear_default(&txn, user_id).await?;
    }

    let now = Utc::now();
    let created = account::ActiveModel {
        name: Set(new_account.name),
        account_type: Set(new_account.account_type),
        balance: Set(new_account.balance),
        is_default: Set(is_default),
        user_id: Set(user_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    info!(
        "Created account {} ({}) for user {}, default: {}",
        created.id, created.name, user_id, created.is_default
    );
    Ok(created)
}

/// Makes `account_id` its owner's only default account.
#[instrument(skip(db))]
pub async fn set_default_account(
    db: &DatabaseConnection,
    account_id: i32,
) -> ServiceResult<account::Model> {
    let txn = db.begin().await?;
    let target = account::Entity::find_by_id(account_id)
        .one(&txn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Account {}", account_id)))?;

    if target.is_default {
        debug!("Account {} is already the default", account_id);
        return Ok(target);
    }

    clear_default(&txn, target.user_id).await?;
    let mut active: account::ActiveModel = target.into();
    active.is_default = Set(true);
    active.updated_at = Set(Utc::now());
    let updated = active.update(&txn).await?;
    txn.commit().await?;

    info!("Account {} is now the default of user {}", account_id, updated.user_id);
    Ok(updated)
}

/// Deletes an account together with its transactions.
///
/// The default account can only go when it is the user's last one.
#[instrument(skip(db))]
pub async fn delete_account(db: &DatabaseConnection, account_id: i32) -> ServiceResult<account::Model> {
    let txn = db.begin().await?;
    let target = account::Entity::find_by_id(account_id)
        .one(&txn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Account {}", account_id)))?;

    if target.is_default {
        let others = account::Entity::find()
            .filter(account::Column::UserId.eq(target.user_id))
            .filter(account::Column::Id.ne(account_id))
            .count(&txn)
            .await?;
        if others > 0 {
            warn!(
                "Refusing to delete default account {} while user {} has {} other accounts",
                account_id, target.user_id, others
            );
            return Err(ServiceError::Conflict(
                "Cannot delete the default account; make another account the default first".to_string(),
            ));
        }
    }

    account::Entity::delete_by_id(account_id).exec(&txn).await?;
    txn.commit().await?;

    info!("Deleted account {} of user {}", account_id, target.user_id);
    Ok(target)
}

/// The user's default account, if they have one.
pub async fn default_account<C>(conn: &C, user_id: i32) -> ServiceResult<Option<account::Model>>
where
    C: ConnectionTrait,
{
    Ok(account::Entity::find()
        .filter(account::Column::UserId.eq(user_id))
        .filter(account::Column::IsDefault.eq(true))
        .one(conn)
        .await?)
}
