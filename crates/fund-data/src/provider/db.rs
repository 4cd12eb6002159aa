//! 데이터베이스에 저장된 일일 수익률을 읽는 소스.

use async_trait::async_trait;
use chrono::NaiveDate;
use fund_core::{ReturnSource, ReturnSourceError};
use rust_decimal::Decimal;

use crate::storage::ReturnRepository;

/// `algorithm_daily_returns` 기반 수익률 소스.
///
/// CSV 피드로 수익률을 가져오는 배포에서 야간 배치가 사용합니다.
#[derive(Clone)]
pub struct DbReturnSource {
    repo: ReturnRepository,
}

impl DbReturnSource {
    pub fn new(repo: ReturnRepository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl ReturnSource for DbReturnSource {
    fn name(&self) -> &str {
        "database"
    }

    async fn get(&self, date: NaiveDate) -> Result<Decimal, ReturnSourceError> {
        match self.repo.get(date).await {
            Ok(Some(record)) => Ok(record.daily_return_percent),
            Ok(None) => Err(ReturnSourceError::Unavailable(
                date,
                "no imported return".to_string(),
            )),
            Err(e) => Err(ReturnSourceError::Unavailable(date, e.to_string())),
        }
    }
}
