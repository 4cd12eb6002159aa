//! Repository pattern for database operations.
//!
//! 데이터베이스 접근 로직을 라우트 핸들러에서 분리하여 관리합니다.
//! 모든 Repository는 static methods 패턴을 사용합니다.
//! 잔고/성과 궤적은 여기서 쓰지 않고 `fund_core::AccrualStore`를 통해서만 갱신합니다.

pub mod deposits;
pub mod reference;
pub mod stats;
pub mod support;
pub mod users;
pub mod withdrawals;

pub use deposits::{
    changes_ledger, check_transition, CompletedDepositInput, DepositRecord, DepositRepository,
    DepositRequestInput, DepositTransition, DepositWithClient,
};
pub use stats::{AdminStats, StatsRepository};
pub use support::{
    MessageRecord, PostOutcome, Sender, SenderType, SupportRepository, TicketPriority,
    TicketRecord, TicketStatus,
};
pub use users::{NewUser, ProfileUpdate, UserAuthRecord, UserProfile, UserRepository};
pub use withdrawals::{
    NewWithdrawal, WithdrawalRecord, WithdrawalRepository, WithdrawalStatus, WithdrawalWithClient,
};

/// 상태 변경 실패.
#[derive(Debug, thiserror::Error)]
pub enum StatusChangeError {
    #[error("record not found")]
    NotFound,
    #[error("cannot change status from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("stored status is invalid: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// PostgreSQL unique violation (23505) 여부.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_error_is_not_unique_violation() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
        assert!(!is_unique_violation(&sqlx::Error::PoolTimedOut));
    }
}
