//! Write paths that must keep account balances and default flags consistent.
//!
//! Each operation runs inside one database transaction.

pub mod accounts;
pub mod ledger;
pub mod users;

use compute::ComputeError;
use sea_orm::DbErr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error(transparent)]
    Compute(#[from] ComputeError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
