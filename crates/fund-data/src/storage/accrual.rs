//! `AccrualStore`의 PostgreSQL 구현.
//!
//! 계좌 요약은 `users` 테이블에, 성과 궤적은 `daily_performance` 테이블에 저장합니다.

use async_trait::async_trait;
use chrono::NaiveDate;
use fund_core::{
    AccountUpdate, AccrualOutcome, AccrualStore, ClientAccount, DailyPerformanceRecord,
    DailyReturn, Deposit, DepositStatus, FundError, FundResult, ReturnSeries,
};
use rust_decimal::Decimal;
use sqlx::{FromRow, Postgres, QueryBuilder, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::{Database, ReturnRepository};

/// 한 번의 INSERT에 담는 최대 행 수 (바인드 파라미터 한도 고려).
const INSERT_CHUNK: usize = 1000;

#[derive(Debug, FromRow)]
struct AccountRow {
    id: Uuid,
    inception_date: Option<NaiveDate>,
    live_trading_enabled: bool,
    current_balance: Decimal,
    total_deposits: Decimal,
    total_return_percent: Decimal,
    last_accrual_date: Option<NaiveDate>,
}

impl From<AccountRow> for ClientAccount {
    fn from(row: AccountRow) -> Self {
        ClientAccount {
            client_id: row.id,
            inception_date: row.inception_date,
            live_trading_enabled: row.live_trading_enabled,
            current_balance: row.current_balance,
            total_deposits: row.total_deposits,
            total_return_percent: row.total_return_percent,
            last_accrual_date: row.last_accrual_date,
        }
    }
}

#[derive(Debug, FromRow)]
struct PerformanceRow {
    user_id: Uuid,
    trade_date: NaiveDate,
    daily_return_percent: Decimal,
    opening_balance: Decimal,
    closing_balance: Decimal,
    daily_pnl: Decimal,
}

impl From<PerformanceRow> for DailyPerformanceRecord {
    fn from(row: PerformanceRow) -> Self {
        DailyPerformanceRecord {
            client_id: row.user_id,
            trade_date: row.trade_date,
            daily_return_percent: row.daily_return_percent,
            opening_balance: row.opening_balance,
            closing_balance: row.closing_balance,
            daily_pnl: row.daily_pnl,
        }
    }
}

/// PostgreSQL 기반 재계산 저장소.
#[derive(Clone)]
pub struct PgAccrualStore {
    db: Database,
    returns: ReturnRepository,
}

impl PgAccrualStore {
    pub fn new(db: Database) -> Self {
        let returns = ReturnRepository::new(db.clone());
        Self { db, returns }
    }

    /// 수익률 repository.
    pub fn returns(&self) -> &ReturnRepository {
        &self.returns
    }

    /// 계좌 요약을 갱신합니다.
    async fn update_account(
        tx: &mut Transaction<'_, Postgres>,
        client_id: Uuid,
        update: &AccountUpdate,
    ) -> FundResult<()> {
        sqlx::query(
            r#"
            UPDATE users SET
                current_balance = $2,
                total_deposits = $3,
                total_return_percent = $4,
                last_accrual_date = $5,
                inception_date = COALESCE(inception_date, $6),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(client_id)
        .bind(update.current_balance)
        .bind(update.total_deposits)
        .bind(update.total_return_percent)
        .bind(update.last_accrual_date)
        .bind(update.inception_date)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AccrualStore for PgAccrualStore {
    async fn load_account(&self, client_id: Uuid) -> FundResult<Option<ClientAccount>> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, inception_date, live_trading_enabled, current_balance,
                   total_deposits, total_return_percent, last_accrual_date
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(client_id)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row.map(ClientAccount::from))
    }

    async fn load_deposits(&self, client_id: Uuid) -> FundResult<Vec<Deposit>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, amount, deposit_date, status, seq
            FROM deposits
            WHERE user_id = $1 AND deposit_date IS NOT NULL
            ORDER BY deposit_date, seq
            "#,
        )
        .bind(client_id)
        .fetch_all(self.db.pool())
        .await?;

        rows.into_iter()
            .map(|row| -> FundResult<Deposit> {
                let status: String = row.get("status");
                Ok(Deposit {
                    id: row.get("id"),
                    client_id: row.get("user_id"),
                    amount: row.get("amount"),
                    effective_date: row.get("deposit_date"),
                    status: status.parse::<DepositStatus>()?,
                    sequence: row.get("seq"),
                })
            })
            .collect()
    }

    async fn load_return_series(&self) -> FundResult<ReturnSeries> {
        Ok(self.returns.load_series().await?)
    }

    async fn replace_trajectory(
        &self,
        client_id: Uuid,
        outcome: &AccrualOutcome,
        update: &AccountUpdate,
    ) -> FundResult<()> {
        let mut tx = self.db.pool().begin().await?;

        sqlx::query("DELETE FROM daily_performance WHERE user_id = $1")
            .bind(client_id)
            .execute(&mut *tx)
            .await?;

        for chunk in outcome.trajectory.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO daily_performance (user_id, trade_date, daily_return_percent, \
                 opening_balance, closing_balance, daily_pnl) ",
            );
            builder.push_values(chunk, |mut b, record| {
                b.push_bind(record.client_id)
                    .push_bind(record.trade_date)
                    .push_bind(record.daily_return_percent)
                    .push_bind(record.opening_balance)
                    .push_bind(record.closing_balance)
                    .push_bind(record.daily_pnl);
            });
            builder.build().execute(&mut *tx).await?;
        }

        Self::update_account(&mut tx, client_id, update).await?;
        tx.commit().await?;

        debug!(
            client_id = %client_id,
            rows = outcome.trajectory.len(),
            "Trajectory replaced"
        );
        Ok(())
    }

    async fn live_clients(&self, date: NaiveDate) -> FundResult<Vec<Uuid>> {
        let ids: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM users
            WHERE role = 'client'
              AND live_trading_enabled = TRUE
              AND inception_date IS NOT NULL
              AND inception_date <= $1
            ORDER BY id
            "#,
        )
        .bind(date)
        .fetch_all(self.db.pool())
        .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn clients_with_contributing_deposits(&self) -> FundResult<Vec<Uuid>> {
        let ids: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT user_id FROM deposits
            WHERE status IN ('approved', 'completed') AND deposit_date IS NOT NULL
            ORDER BY user_id
            "#,
        )
        .fetch_all(self.db.pool())
        .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn latest_record_before(
        &self,
        client_id: Uuid,
        date: NaiveDate,
    ) -> FundResult<Option<DailyPerformanceRecord>> {
        let row = sqlx::query_as::<_, PerformanceRow>(
            r#"
            SELECT user_id, trade_date, daily_return_percent, opening_balance,
                   closing_balance, daily_pnl
            FROM daily_performance
            WHERE user_id = $1 AND trade_date < $2
            ORDER BY trade_date DESC
            LIMIT 1
            "#,
        )
        .bind(client_id)
        .bind(date)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row.map(DailyPerformanceRecord::from))
    }

    async fn upsert_daily(
        &self,
        record: &DailyPerformanceRecord,
        update: Option<&AccountUpdate>,
    ) -> FundResult<()> {
        let mut tx = self.db.pool().begin().await?;

        sqlx::query(
            r#"
            INSERT INTO daily_performance (
                user_id, trade_date, daily_return_percent,
                opening_balance, closing_balance, daily_pnl
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, trade_date)
            DO UPDATE SET
                daily_return_percent = EXCLUDED.daily_return_percent,
                opening_balance = EXCLUDED.opening_balance,
                closing_balance = EXCLUDED.closing_balance,
                daily_pnl = EXCLUDED.daily_pnl
            "#,
        )
        .bind(record.client_id)
        .bind(record.trade_date)
        .bind(record.daily_return_percent)
        .bind(record.opening_balance)
        .bind(record.closing_balance)
        .bind(record.daily_pnl)
        .execute(&mut *tx)
        .await?;

        if let Some(update) = update {
            Self::update_account(&mut tx, record.client_id, update).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn save_daily_return(&self, date: NaiveDate, percent: Decimal) -> FundResult<()> {
        let row = DailyReturn {
            trade_date: date,
            daily_return_percent: percent,
            cumulative_return: None,
        };
        self.returns
            .upsert(&row, "backtest")
            .await
            .map_err(FundError::from)
    }

    async fn performance_range(
        &self,
        client_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> FundResult<Vec<DailyPerformanceRecord>> {
        let rows = sqlx::query_as::<_, PerformanceRow>(
            r#"
            SELECT user_id, trade_date, daily_return_percent, opening_balance,
                   closing_balance, daily_pnl
            FROM daily_performance
            WHERE user_id = $1
              AND ($2::date IS NULL OR trade_date >= $2)
              AND ($3::date IS NULL OR trade_date <= $3)
            ORDER BY trade_date
            "#,
        )
        .bind(client_id)
        .bind(from)
        .bind(to)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.into_iter().map(DailyPerformanceRecord::from).collect())
    }
}
