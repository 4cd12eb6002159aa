//! 배치 작업 모듈.

pub mod accrual;
pub mod returns_import;
pub mod statements_due;

pub use accrual::{recompute_all, recompute_client, run_nightly};
pub use returns_import::{import_returns, split_valid_rows, ImportSource};
pub use statements_due::{find_due_statements, periods_due_on, DueStatement};
