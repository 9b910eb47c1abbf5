pub mod initdb;
pub mod run_job;
pub mod serve;

pub use initdb::init_database;
pub use run_job::run_job;
pub use serve::serve;
