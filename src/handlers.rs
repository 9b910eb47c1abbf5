pub mod accounts;
pub mod budgets;
pub mod dashboard;
pub mod health;
pub mod jobs;
pub mod statistics;
pub mod transactions;
pub mod users;
