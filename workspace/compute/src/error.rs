use thiserror::Error;

/// Failures of the finance rules in this crate.
#[derive(Error, Debug)]
pub enum ComputeError {
    /// Loading transactions for an aggregate failed.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// A month or recurrence step fell outside chrono's calendar, such as
    /// month 13 or a date past `NaiveDate::MAX`.
    #[error("Date error: {0}")]
    Date(String),

    /// A running total no longer fits in a `Decimal`.
    #[error("Amount overflow: {0}")]
    Overflow(String),
}

pub type Result<T> = std::result::Result<T, ComputeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_failure() {
        assert_eq!(
            ComputeError::Date("invalid month 2024-13".into()).to_string(),
            "Date error: invalid month 2024-13"
        );
        assert_eq!(
            ComputeError::Overflow("expense total overflowed".into()).to_string(),
            "Amount overflow: expense total overflowed"
        );
    }
}
