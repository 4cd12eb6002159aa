//! 잔고 재계산 작업.
//!
//! 실제 계산은 `RecalculationScheduler`가 담당하고, 이 모듈은 결과를 통계로 요약합니다.

use std::time::Instant;

use chrono::NaiveDate;
use fund_core::{ClientRunStatus, RecalculationScheduler};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{Result, RunStats};

/// 하루치 야간 증분 계산.
///
/// 주말로 건너뛴 경우 대상 0건의 통계를 반환합니다.
pub async fn run_nightly(scheduler: &RecalculationScheduler, date: NaiveDate) -> Result<RunStats> {
    let start = Instant::now();
    let report = scheduler.nightly(date).await?;

    if report.skipped_weekend {
        info!(date = %date, "주말, 야간 계산 없음");
    } else if report.return_fallback {
        warn!(date = %date, "수익률 조회 실패, 0%로 계산됨");
    }

    for failed in report
        .results
        .iter()
        .filter(|r| r.status == ClientRunStatus::Failed)
    {
        warn!(
            client_id = %failed.client_id,
            detail = failed.detail.as_deref().unwrap_or(""),
            "클라이언트 야간 계산 실패"
        );
    }

    Ok(RunStats::from_nightly(&report, start.elapsed()))
}

/// 한 클라이언트 전체 재계산.
pub async fn recompute_client(
    scheduler: &RecalculationScheduler,
    client_id: Uuid,
) -> Result<RunStats> {
    let start = Instant::now();
    let outcome = scheduler.recompute_one(client_id).await?;

    info!(
        client_id = %client_id,
        days = outcome.trajectory.len(),
        final_balance = %outcome.final_balance,
        total_deposits = %outcome.total_deposits,
        total_return_percent = %outcome.total_return_percent,
        "재계산 완료"
    );

    Ok(RunStats {
        total: 1,
        success: 1,
        elapsed: start.elapsed(),
        ..Default::default()
    })
}

/// 반영 입금이 있는 모든 클라이언트 전체 재계산.
pub async fn recompute_all(scheduler: &RecalculationScheduler) -> Result<RunStats> {
    let start = Instant::now();
    let report = scheduler.recompute_all_full().await?;
    Ok(RunStats::from_batch(&report, start.elapsed()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use fund_core::{
        AccrualStore, ClientAccount, Deposit, DepositStatus, FixedClock, MemoryAccrualStore,
        ReturnSeries, StaticReturnSource,
    };
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn scheduler_with(
        store: Arc<MemoryAccrualStore>,
        returns: Vec<(NaiveDate, rust_decimal::Decimal)>,
        today: NaiveDate,
    ) -> RecalculationScheduler {
        let store: Arc<dyn AccrualStore> = store;
        RecalculationScheduler::new(
            store,
            Arc::new(StaticReturnSource::new(returns)),
            Arc::new(FixedClock::at_date(today)),
        )
    }

    fn live_client(store: &MemoryAccrualStore, inception: NaiveDate, amount: rust_decimal::Decimal) -> Uuid {
        let client_id = Uuid::new_v4();
        store.insert_account(
            ClientAccount::new(client_id)
                .with_inception(inception)
                .with_live_trading(true),
        );
        store.insert_deposit(Deposit::new(client_id, amount, inception, DepositStatus::Completed));
        client_id
    }

    #[tokio::test]
    async fn test_run_nightly_counts_clients() {
        let store = Arc::new(MemoryAccrualStore::new());
        live_client(&store, date(2024, 7, 1), dec!(1000));
        live_client(&store, date(2024, 7, 1), dec!(500));

        let scheduler = scheduler_with(store.clone(), vec![(date(2024, 7, 2), dec!(1))], date(2024, 7, 2));
        let stats = run_nightly(&scheduler, date(2024, 7, 2)).await.unwrap();

        assert_eq!(stats.total, 2);
        assert_eq!(stats.success, 2);
        assert!(stats.is_clean());
    }

    #[tokio::test]
    async fn test_run_nightly_weekend_is_empty() {
        let store = Arc::new(MemoryAccrualStore::new());
        live_client(&store, date(2024, 7, 1), dec!(1000));

        let scheduler = scheduler_with(store, Vec::new(), date(2024, 7, 6)).with_skip_weekends(true);
        // 2024-07-06은 토요일
        let stats = run_nightly(&scheduler, date(2024, 7, 6)).await.unwrap();
        assert_eq!(stats.total, 0);
    }

    #[tokio::test]
    async fn test_recompute_client_unknown_fails() {
        let store = Arc::new(MemoryAccrualStore::new());
        store.set_series(ReturnSeries::new());
        let scheduler = scheduler_with(store, Vec::new(), date(2024, 7, 2));

        assert!(recompute_client(&scheduler, Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn test_recompute_all_reports_failures() {
        let store = Arc::new(MemoryAccrualStore::new());
        live_client(&store, date(2024, 7, 1), dec!(1000));
        let broken = live_client(&store, date(2024, 7, 1), dec!(2000));
        store.fail_client(broken);
        store.set_series(ReturnSeries::with_daily([(date(2024, 7, 2), dec!(2))]));

        let scheduler = scheduler_with(store, Vec::new(), date(2024, 7, 2));
        let stats = recompute_all(&scheduler).await.unwrap();

        assert_eq!(stats.total, 2);
        assert_eq!(stats.success, 1);
        assert_eq!(stats.errors, 1);
    }
}
