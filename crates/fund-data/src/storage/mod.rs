//! PostgreSQL 저장소.

mod accrual;
mod database;
mod returns;

pub use accrual::PgAccrualStore;
pub use database::{Database, DatabaseConfig};
pub use returns::{DailyReturnRecord, ReturnRepository};
