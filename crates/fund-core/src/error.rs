//! 펀드 포털 코어 에러 타입.
//!
//! 엔진과 스케줄러가 반환하는 에러 분류를 정의합니다.
//! 엔진은 로그를 남기지 않고 타입화된 에러만 반환하며,
//! 로깅과 사용자 메시지 변환은 호출 측(스케줄러, API)이 담당합니다.

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

/// 핵심 도메인 에러.
#[derive(Debug, Error)]
pub enum FundError {
    /// 입금 원장 전제 조건 위반 (0 이하 금액, 정렬되지 않은 원장 등)
    #[error("잘못된 원장 상태: {0}")]
    InvalidLedgerState(String),

    /// 명세서를 발급할 수 없는 기간
    #[error("발급 가능한 명세서 없음: {0}")]
    PeriodNotEligible(String),

    /// 일일 수익률 데이터 없음 (엔진 내부에서는 0 수익률로 복구됨)
    #[error("수익률 데이터 없음: {0}")]
    DataUnavailable(NaiveDate),

    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),

    /// 찾을 수 없음
    #[error("찾을 수 없음: {0}")]
    NotFound(String),

    /// 데이터베이스 에러
    #[error("데이터베이스 에러: {0}")]
    Database(String),

    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 내부 에러
    #[error("내부 에러: {0}")]
    Internal(String),
}

/// 코어 작업 Result 타입.
pub type FundResult<T> = Result<T, FundError>;

impl FundError {
    /// 클라이언트를 찾지 못한 경우의 에러를 생성합니다.
    pub fn client_not_found(client_id: Uuid) -> Self {
        FundError::NotFound(format!("client {}", client_id))
    }

    /// 재시도 가능한 에러인지 확인합니다.
    ///
    /// 재시도 단위는 항상 recompute 호출 전체입니다.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FundError::Database(_))
    }

    /// 호출자 입력으로 인한 에러인지 확인합니다.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            FundError::InvalidLedgerState(_)
                | FundError::PeriodNotEligible(_)
                | FundError::InvalidInput(_)
                | FundError::NotFound(_)
        )
    }
}

impl From<serde_json::Error> for FundError {
    fn from(err: serde_json::Error) -> Self {
        FundError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for FundError {
    fn from(err: config::ConfigError) -> Self {
        FundError::Config(err.to_string())
    }
}

#[cfg(feature = "sqlx-support")]
impl From<sqlx::Error> for FundError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => FundError::NotFound("row not found".to_string()),
            other => FundError::Database(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let db_err = FundError::Database("connection reset".to_string());
        assert!(db_err.is_retryable());

        let ledger_err = FundError::InvalidLedgerState("amount <= 0".to_string());
        assert!(!ledger_err.is_retryable());
    }

    #[test]
    fn test_client_error_classification() {
        assert!(FundError::PeriodNotEligible("H1-2024".to_string()).is_client_error());
        assert!(FundError::client_not_found(Uuid::nil()).is_client_error());
        assert!(!FundError::Internal("boom".to_string()).is_client_error());
    }
}
