//! AccrualEngine 시나리오 통합 테스트
//!
//! 알려진 입금/수익률 조합에 대한 일별 잔고를 검증합니다.

use chrono::NaiveDate;
use fund_core::{AccrualEngine, Deposit, DepositStatus, ReturnSeries};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn test_single_deposit_three_days() {
    let client = Uuid::new_v4();
    let deposits = vec![Deposit::new(
        client,
        dec!(100000),
        date(2024, 1, 1),
        DepositStatus::Completed,
    )];
    let series = ReturnSeries::with_daily(vec![
        (date(2024, 1, 1), dec!(0)),
        (date(2024, 1, 2), dec!(1)),
        (date(2024, 1, 3), dec!(-0.5)),
    ]);

    let outcome = AccrualEngine
        .recompute(client, date(2024, 1, 1), &deposits, &series, date(2024, 1, 3))
        .unwrap();

    let closings: Vec<Decimal> = outcome
        .trajectory
        .iter()
        .map(|r| r.closing_balance)
        .collect();
    assert_eq!(closings, vec![dec!(100000.00), dec!(101000.00), dec!(100495.00)]);

    assert_eq!(outcome.trajectory[1].opening_balance, dec!(100000));
    assert_eq!(outcome.trajectory[1].daily_pnl, dec!(1000));
    assert_eq!(outcome.trajectory[2].daily_pnl, dec!(-505));
    assert_eq!(outcome.final_balance, dec!(100495));
    assert_eq!(outcome.total_deposits, dec!(100000));
    assert_eq!(outcome.total_return_percent, dec!(0.495));
}

#[test]
fn test_two_deposits_flat_returns() {
    let client = Uuid::new_v4();
    let deposits = vec![
        Deposit::new(client, dec!(50000), date(2024, 1, 1), DepositStatus::Completed),
        Deposit::new(client, dec!(20000), date(2024, 1, 2), DepositStatus::Completed),
    ];

    let outcome = AccrualEngine
        .recompute(
            client,
            date(2024, 1, 1),
            &deposits,
            &ReturnSeries::new(),
            date(2024, 1, 2),
        )
        .unwrap();

    assert_eq!(outcome.trajectory.len(), 2);
    assert_eq!(outcome.trajectory[0].closing_balance, dec!(50000));
    assert_eq!(outcome.trajectory[1].opening_balance, dec!(70000));
    assert_eq!(outcome.trajectory[1].closing_balance, dec!(70000));
    assert_eq!(outcome.total_deposits, dec!(70000));
    assert_eq!(outcome.total_return_percent, Decimal::ZERO);
}

#[test]
fn test_same_day_deposits_both_compound() {
    let client = Uuid::new_v4();
    let deposits = vec![
        Deposit::new(client, dec!(300), date(2024, 5, 1), DepositStatus::Completed)
            .with_sequence(1),
        Deposit::new(client, dec!(700), date(2024, 5, 1), DepositStatus::Approved)
            .with_sequence(2),
    ];
    let series = ReturnSeries::with_daily(vec![(date(2024, 5, 1), dec!(10))]);

    let outcome = AccrualEngine
        .recompute(client, date(2024, 5, 1), &deposits, &series, date(2024, 5, 1))
        .unwrap();

    assert_eq!(outcome.trajectory.len(), 1);
    assert_eq!(outcome.trajectory[0].opening_balance, dec!(1000));
    assert_eq!(outcome.final_balance, dec!(1100));
}

#[test]
fn test_missing_return_is_flat_day() {
    let client = Uuid::new_v4();
    let deposits = vec![Deposit::new(
        client,
        dec!(1000),
        date(2024, 1, 1),
        DepositStatus::Completed,
    )];
    // 1월 2일 데이터 없음
    let series = ReturnSeries::with_daily(vec![
        (date(2024, 1, 1), dec!(1)),
        (date(2024, 1, 3), dec!(1)),
    ]);

    let outcome = AccrualEngine
        .recompute(client, date(2024, 1, 1), &deposits, &series, date(2024, 1, 3))
        .unwrap();

    let gap = &outcome.trajectory[1];
    assert_eq!(gap.trade_date, date(2024, 1, 2));
    assert_eq!(gap.daily_return_percent, Decimal::ZERO);
    assert_eq!(gap.daily_pnl, Decimal::ZERO);
    assert_eq!(gap.closing_balance, gap.opening_balance);
    assert_eq!(outcome.trajectory[2].closing_balance, dec!(1020.1));
}

#[test]
fn test_no_records_before_first_deposit() {
    let client = Uuid::new_v4();
    let deposits = vec![Deposit::new(
        client,
        dec!(1000),
        date(2024, 1, 10),
        DepositStatus::Completed,
    )];

    let outcome = AccrualEngine
        .recompute(
            client,
            date(2024, 1, 1),
            &deposits,
            &ReturnSeries::new(),
            date(2024, 1, 12),
        )
        .unwrap();

    assert_eq!(outcome.trajectory.len(), 3);
    assert_eq!(outcome.trajectory[0].trade_date, date(2024, 1, 10));
}

#[test]
fn test_recompute_is_deterministic() {
    let client = Uuid::new_v4();
    let deposits = vec![
        Deposit::new(client, dec!(12345.67), date(2024, 2, 1), DepositStatus::Completed),
        Deposit::new(client, dec!(890.12), date(2024, 2, 15), DepositStatus::Approved),
    ];
    let series = ReturnSeries::with_daily(
        (1..=28).map(|d| (date(2024, 2, d), Decimal::new(d as i64 * 7 - 90, 2))),
    );

    let run = || {
        AccrualEngine
            .recompute(client, date(2024, 2, 1), &deposits, &series, date(2024, 2, 29))
            .unwrap()
    };
    let first = run();
    let second = run();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}
