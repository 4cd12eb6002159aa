//! 관리자 대시보드 통계.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use utoipa::ToSchema;

/// 관리자 통계
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct AdminStats {
    /// 클라이언트 수
    pub client_count: i64,
    /// 실거래 클라이언트 수
    pub live_client_count: i64,
    /// 전체 클라이언트 잔고 합계
    pub total_balance: Decimal,
    /// 전체 반영 입금 합계
    pub total_deposits: Decimal,
    /// 승인 대기 입금 수
    pub pending_deposits: i64,
    /// 처리 대기 출금 수
    pub pending_withdrawals: i64,
    /// 이번 달 완료 입금 수
    pub completed_deposits_this_month: i64,
    /// 이번 달 완료 입금 금액
    pub completed_deposit_amount_this_month: Decimal,
    /// 열린 지원 티켓 수
    pub open_tickets: i64,
}

/// 통계 Repository
pub struct StatsRepository;

impl StatsRepository {
    /// `month_start` 이후를 이번 달로 집계합니다.
    pub async fn admin_stats(pool: &PgPool, month_start: NaiveDate) -> Result<AdminStats, sqlx::Error> {
        sqlx::query_as::<_, AdminStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users WHERE role = 'client') AS client_count,
                (SELECT COUNT(*) FROM users
                    WHERE role = 'client' AND live_trading_enabled) AS live_client_count,
                (SELECT COALESCE(SUM(current_balance), 0) FROM users
                    WHERE role = 'client') AS total_balance,
                (SELECT COALESCE(SUM(total_deposits), 0) FROM users
                    WHERE role = 'client') AS total_deposits,
                (SELECT COUNT(*) FROM deposits WHERE status = 'pending') AS pending_deposits,
                (SELECT COUNT(*) FROM withdrawals WHERE status = 'pending') AS pending_withdrawals,
                (SELECT COUNT(*) FROM deposits
                    WHERE status = 'completed' AND deposit_date >= $1) AS completed_deposits_this_month,
                (SELECT COALESCE(SUM(amount), 0) FROM deposits
                    WHERE status = 'completed' AND deposit_date >= $1) AS completed_deposit_amount_this_month,
                (SELECT COUNT(*) FROM support_tickets WHERE status <> 'closed') AS open_tickets
            "#,
        )
        .bind(month_start)
        .fetch_one(pool)
        .await
    }
}
