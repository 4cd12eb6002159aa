//! 에러 타입 정의.

use thiserror::Error;

/// 배치 작업 에러 타입
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// 데이터베이스 에러
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Config(String),

    /// 설정 파일 로드 에러
    #[error("Configuration error: {0}")]
    Settings(#[from] config::ConfigError),

    /// 데이터 계층 에러 (저장소, CSV 피드)
    #[error("Data error: {0}")]
    Data(#[from] fund_data::DataError),

    /// 재계산 에러
    #[error("Accrual error: {0}")]
    Fund(#[from] fund_core::FundError),
}

impl From<std::env::VarError> for SchedulerError {
    fn from(err: std::env::VarError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, SchedulerError>;
