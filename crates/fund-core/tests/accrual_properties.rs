//! AccrualEngine 속성 기반 테스트
//!
//! 임의의 입금/수익률 조합에 대해 결정성, 증분 계산 동치성,
//! 첫 입금 이전 기록 없음을 확인합니다.

use chrono::{Duration, NaiveDate};
use fund_core::{AccrualEngine, Deposit, DepositStatus, ReturnSeries};
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

/// (시작일 기준 오프셋, 금액 센트)
fn arb_deposits() -> impl Strategy<Value = Vec<(i64, i64)>> {
    proptest::collection::vec((0i64..40, 1i64..10_000_000), 1..6)
}

/// 일별 수익률 (베이시스 포인트, -500 ~ 500)
fn arb_returns() -> impl Strategy<Value = Vec<Option<i64>>> {
    proptest::collection::vec(proptest::option::of(-500i64..500), 45)
}

fn build(
    client: Uuid,
    deposits: &[(i64, i64)],
    returns: &[Option<i64>],
) -> (Vec<Deposit>, ReturnSeries) {
    let mut ledger: Vec<Deposit> = deposits
        .iter()
        .enumerate()
        .map(|(i, (offset, cents))| {
            Deposit::new(
                client,
                Decimal::new(*cents, 2),
                base_date() + Duration::days(*offset),
                DepositStatus::Completed,
            )
            .with_sequence(i as i64)
        })
        .collect();
    ledger.sort_by_key(|d| (d.effective_date, d.sequence));

    let series = ReturnSeries::with_daily(returns.iter().enumerate().filter_map(|(i, bp)| {
        bp.map(|bp| (base_date() + Duration::days(i as i64), Decimal::new(bp, 2)))
    }));
    (ledger, series)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_recompute_is_deterministic(deposits in arb_deposits(), returns in arb_returns()) {
        let client = Uuid::new_v4();
        let (ledger, series) = build(client, &deposits, &returns);
        let today = base_date() + Duration::days(44);

        let a = AccrualEngine.recompute(client, base_date(), &ledger, &series, today).unwrap();
        let b = AccrualEngine.recompute(client, base_date(), &ledger, &series, today).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn prop_full_equals_incremental(deposits in arb_deposits(), returns in arb_returns()) {
        let client = Uuid::new_v4();
        let (ledger, series) = build(client, &deposits, &returns);
        let today = base_date() + Duration::days(44);

        let full = AccrualEngine.recompute(client, base_date(), &ledger, &series, today).unwrap();

        let mut balance = Decimal::ZERO;
        let mut day = base_date();
        while day <= today {
            let deposits_today: Decimal = ledger
                .iter()
                .filter(|d| d.effective_date == day)
                .map(|d| d.amount)
                .sum();
            if balance + deposits_today != Decimal::ZERO {
                let pct = series.daily_return(day).unwrap_or(Decimal::ZERO);
                balance = AccrualEngine::step(balance, deposits_today, pct).closing_balance;
            }
            day += Duration::days(1);
        }

        prop_assert_eq!(full.final_balance, balance);
    }

    #[test]
    fn prop_no_record_before_first_deposit(deposits in arb_deposits(), returns in arb_returns()) {
        let client = Uuid::new_v4();
        let (ledger, series) = build(client, &deposits, &returns);
        let today = base_date() + Duration::days(44);
        let first = ledger.iter().map(|d| d.effective_date).min().unwrap();

        let outcome = AccrualEngine.recompute(client, base_date(), &ledger, &series, today).unwrap();
        prop_assert!(outcome.trajectory.iter().all(|r| r.trade_date >= first));
        prop_assert_eq!(outcome.trajectory.first().map(|r| r.trade_date), Some(first));
    }
}
