//! Domain rules of the finance tracker that do not depend on the web layer:
//! recurrence date arithmetic, balance deltas, monthly aggregation and the
//! budget alert decision.

pub mod balance;
pub mod budget;
pub mod error;
pub mod recurrence;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ComputeError, Result};
