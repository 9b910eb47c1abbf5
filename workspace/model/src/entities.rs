//! This file serves as the root for all SeaORM entity modules.
//! We define the persisted records of the finance tracker here: users,
//! their accounts, the transactions recorded against those accounts and
//! the single monthly budget each user may keep.

pub mod account;
pub mod budget;
pub mod transaction;
pub mod user;

pub mod prelude {
    //! A prelude module for easy importing of all entities.
    pub use super::account::Entity as Account;
    pub use super::budget::Entity as Budget;
    pub use super::transaction::Entity as Transaction;
    pub use super::user::Entity as User;
}
