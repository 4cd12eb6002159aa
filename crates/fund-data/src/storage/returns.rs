//! 알고리즘 일일 수익률 repository.

use chrono::{DateTime, NaiveDate, Utc};
use fund_core::{DailyReturn, ReturnSeries};
use rust_decimal::Decimal;
use sqlx::FromRow;
use tracing::{debug, info, instrument};

use super::Database;
use crate::error::Result;

/// `algorithm_daily_returns` 레코드.
#[derive(Debug, Clone, FromRow)]
pub struct DailyReturnRecord {
    pub trade_date: NaiveDate,
    pub daily_return_percent: Decimal,
    pub cumulative_return: Option<Decimal>,
    pub source: String,
    pub updated_at: DateTime<Utc>,
}

impl From<DailyReturnRecord> for DailyReturn {
    fn from(record: DailyReturnRecord) -> Self {
        DailyReturn {
            trade_date: record.trade_date,
            daily_return_percent: record.daily_return_percent,
            cumulative_return: record.cumulative_return,
        }
    }
}

/// 일일 수익률 repository.
///
/// 같은 날짜는 마지막 쓰기가 이깁니다.
#[derive(Clone)]
pub struct ReturnRepository {
    db: Database,
}

impl ReturnRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// 하루치 수익률을 upsert 합니다.
    #[instrument(skip(self))]
    pub async fn upsert(&self, row: &DailyReturn, source: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO algorithm_daily_returns (
                trade_date, daily_return_percent, cumulative_return, source, updated_at
            )
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (trade_date)
            DO UPDATE SET
                daily_return_percent = EXCLUDED.daily_return_percent,
                cumulative_return = COALESCE(EXCLUDED.cumulative_return, algorithm_daily_returns.cumulative_return),
                source = EXCLUDED.source,
                updated_at = NOW()
            "#,
        )
        .bind(row.trade_date)
        .bind(row.daily_return_percent)
        .bind(row.cumulative_return)
        .bind(source)
        .execute(self.db.pool())
        .await?;

        debug!(trade_date = %row.trade_date, source, "Daily return upserted");
        Ok(())
    }

    /// 여러 날짜를 하나의 트랜잭션으로 가져옵니다.
    pub async fn import(&self, rows: &[DailyReturn], source: &str) -> Result<usize> {
        let mut tx = self.db.pool().begin().await?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO algorithm_daily_returns (
                    trade_date, daily_return_percent, cumulative_return, source, updated_at
                )
                VALUES ($1, $2, $3, $4, NOW())
                ON CONFLICT (trade_date)
                DO UPDATE SET
                    daily_return_percent = EXCLUDED.daily_return_percent,
                    cumulative_return = EXCLUDED.cumulative_return,
                    source = EXCLUDED.source,
                    updated_at = NOW()
                "#,
            )
            .bind(row.trade_date)
            .bind(row.daily_return_percent)
            .bind(row.cumulative_return)
            .bind(source)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(rows = rows.len(), source, "Daily returns imported");
        Ok(rows.len())
    }

    /// 특정 날짜의 수익률을 조회합니다.
    pub async fn get(&self, date: NaiveDate) -> Result<Option<DailyReturnRecord>> {
        let record = sqlx::query_as::<_, DailyReturnRecord>(
            r#"
            SELECT trade_date, daily_return_percent, cumulative_return, source, updated_at
            FROM algorithm_daily_returns
            WHERE trade_date = $1
            "#,
        )
        .bind(date)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(record)
    }

    /// 기간 내 수익률을 날짜 순으로 조회합니다.
    pub async fn list(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DailyReturnRecord>> {
        let records = sqlx::query_as::<_, DailyReturnRecord>(
            r#"
            SELECT trade_date, daily_return_percent, cumulative_return, source, updated_at
            FROM algorithm_daily_returns
            WHERE ($1::date IS NULL OR trade_date >= $1)
              AND ($2::date IS NULL OR trade_date <= $2)
            ORDER BY trade_date
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(self.db.pool())
        .await?;
        Ok(records)
    }

    /// 전체 수익률 시리즈를 조회합니다.
    pub async fn load_series(&self) -> Result<ReturnSeries> {
        let rows: Vec<DailyReturn> = self
            .list(None, None)
            .await?
            .into_iter()
            .map(DailyReturn::from)
            .collect();
        Ok(ReturnSeries::from_rows(&rows))
    }
}
