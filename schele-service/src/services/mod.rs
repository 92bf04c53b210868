//! Services module for schele-service.

pub mod database;
pub mod metrics;
pub mod sql;
pub mod unit_of_work;

pub use database::Database;
pub use metrics::{get_metrics, init_metrics, record_error, record_unpriced};
pub use unit_of_work::PgUnitOfWork;
