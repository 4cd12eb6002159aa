//! 일 단위 잔고 재계산 엔진.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{AccrualOutcome, DailyPerformanceRecord, Deposit, DepositLedger, ReturnSeries};
use crate::error::FundResult;
use crate::types::{return_percent, DecimalExt};

/// 하루치 계산 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayStep {
    /// 입금 반영 후 잔고
    pub opening_balance: Decimal,
    /// 적용한 수익률 (%)
    pub return_percent: Decimal,
    /// 당일 손익
    pub pnl: Decimal,
    /// 수익률 적용 후 잔고
    pub closing_balance: Decimal,
}

impl DayStep {
    /// 성과 기록으로 변환합니다.
    pub fn into_record(self, client_id: Uuid, trade_date: NaiveDate) -> DailyPerformanceRecord {
        DailyPerformanceRecord {
            client_id,
            trade_date,
            daily_return_percent: self.return_percent,
            opening_balance: self.opening_balance,
            closing_balance: self.closing_balance,
            daily_pnl: self.pnl,
        }
    }
}

/// 입금 원장과 일일 수익률을 하루씩 재생해 잔고 궤적을 만듭니다.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccrualEngine;

impl AccrualEngine {
    /// 하루치 계산.
    ///
    /// 당일 입금을 먼저 더한 뒤 수익률을 적용합니다.
    /// 전체 재계산과 야간 증분 계산이 모두 이 함수를 사용합니다.
    pub fn step(balance: Decimal, deposits_today: Decimal, return_percent: Decimal) -> DayStep {
        let opening_balance = balance + deposits_today;
        let pnl = opening_balance.percent_of(return_percent);
        DayStep {
            opening_balance,
            return_percent,
            pnl,
            closing_balance: opening_balance + pnl,
        }
    }

    /// `inception`부터 `today`까지(포함) 전체 궤적을 재계산합니다.
    ///
    /// - 원장은 유효일 오름차순이어야 합니다 (재정렬하지 않음).
    /// - approved/completed 입금만 반영합니다.
    /// - 운용 시작일 이전 입금은 시작일에 더해집니다.
    /// - 수익률이 없는 날은 0%로 계산합니다.
    /// - 잔고가 0인 날은 기록을 남기지 않습니다.
    /// - 운용 시작일이 미래이면 궤적은 비고 최종 잔고는 입금 합계입니다.
    pub fn recompute(
        &self,
        client_id: Uuid,
        inception: NaiveDate,
        deposits: &[Deposit],
        series: &ReturnSeries,
        today: NaiveDate,
    ) -> FundResult<AccrualOutcome> {
        DepositLedger::validate(deposits)?;

        let contributing: Vec<&Deposit> = deposits.iter().filter(|d| d.is_contributing()).collect();
        if contributing.is_empty() {
            return Ok(AccrualOutcome::empty());
        }

        if inception > today {
            let total: Decimal = contributing.iter().map(|d| d.amount).sum();
            return Ok(AccrualOutcome {
                trajectory: Vec::new(),
                final_balance: total,
                total_deposits: total,
                total_return_percent: Decimal::ZERO,
            });
        }

        let mut trajectory = Vec::new();
        let mut balance = Decimal::ZERO;
        let mut total_deposits = Decimal::ZERO;
        let mut next = 0;

        for day in inception.iter_days().take_while(|d| *d <= today) {
            let mut deposits_today = Decimal::ZERO;
            while let Some(deposit) = contributing.get(next) {
                if deposit.effective_date > day {
                    break;
                }
                deposits_today += deposit.amount;
                next += 1;
            }
            total_deposits += deposits_today;

            if balance + deposits_today == Decimal::ZERO {
                continue;
            }

            let pct = series.daily_return(day).unwrap_or(Decimal::ZERO);
            let step = Self::step(balance, deposits_today, pct);
            balance = step.closing_balance;
            trajectory.push(step.into_record(client_id, day));
        }

        Ok(AccrualOutcome {
            trajectory,
            final_balance: balance,
            total_deposits,
            total_return_percent: return_percent(balance, total_deposits),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DepositStatus;
    use crate::error::FundError;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_step_adds_deposit_before_return() {
        let step = AccrualEngine::step(dec!(100), dec!(100), dec!(10));
        assert_eq!(step.opening_balance, dec!(200));
        assert_eq!(step.pnl, dec!(20));
        assert_eq!(step.closing_balance, dec!(220));
    }

    #[test]
    fn test_pending_and_rejected_are_ignored() {
        let client = Uuid::new_v4();
        let deposits = vec![
            Deposit::new(client, dec!(1000), date(2024, 1, 1), DepositStatus::Pending),
            Deposit::new(client, dec!(2000), date(2024, 1, 1), DepositStatus::Rejected),
        ];
        let outcome = AccrualEngine
            .recompute(client, date(2024, 1, 1), &deposits, &ReturnSeries::new(), date(2024, 1, 5))
            .unwrap();
        assert_eq!(outcome, AccrualOutcome::empty());
    }

    #[test]
    fn test_deposit_before_inception_lands_on_inception_day() {
        let client = Uuid::new_v4();
        let deposits = vec![Deposit::new(
            client,
            dec!(1000),
            date(2023, 12, 30),
            DepositStatus::Completed,
        )];
        let series = ReturnSeries::with_daily(vec![(date(2024, 1, 1), dec!(2))]);
        let outcome = AccrualEngine
            .recompute(client, date(2024, 1, 1), &deposits, &series, date(2024, 1, 2))
            .unwrap();

        assert_eq!(outcome.trajectory.len(), 2);
        assert_eq!(outcome.trajectory[0].opening_balance, dec!(1000));
        assert_eq!(outcome.trajectory[0].closing_balance, dec!(1020));
        assert_eq!(outcome.final_balance, dec!(1020));
        assert_eq!(outcome.total_return_percent, dec!(2));
    }

    #[test]
    fn test_future_inception_keeps_balance_flat() {
        let client = Uuid::new_v4();
        let deposits = vec![Deposit::new(
            client,
            dec!(5000),
            date(2024, 3, 1),
            DepositStatus::Approved,
        )];
        let outcome = AccrualEngine
            .recompute(client, date(2024, 3, 1), &deposits, &ReturnSeries::new(), date(2024, 2, 1))
            .unwrap();

        assert!(outcome.trajectory.is_empty());
        assert_eq!(outcome.final_balance, dec!(5000));
        assert_eq!(outcome.total_deposits, dec!(5000));
        assert_eq!(outcome.total_return_percent, Decimal::ZERO);
    }

    #[test]
    fn test_deposit_after_today_not_counted() {
        let client = Uuid::new_v4();
        let deposits = vec![
            Deposit::new(client, dec!(100), date(2024, 1, 1), DepositStatus::Completed),
            Deposit::new(client, dec!(900), date(2024, 2, 1), DepositStatus::Completed),
        ];
        let outcome = AccrualEngine
            .recompute(client, date(2024, 1, 1), &deposits, &ReturnSeries::new(), date(2024, 1, 10))
            .unwrap();
        assert_eq!(outcome.total_deposits, dec!(100));
        assert_eq!(outcome.final_balance, dec!(100));
        assert_eq!(outcome.trajectory.len(), 10);
    }

    #[test]
    fn test_rejects_invalid_ledger() {
        let client = Uuid::new_v4();
        let deposits = vec![Deposit::new(
            client,
            dec!(-1),
            date(2024, 1, 1),
            DepositStatus::Completed,
        )];
        let result = AccrualEngine.recompute(
            client,
            date(2024, 1, 1),
            &deposits,
            &ReturnSeries::new(),
            date(2024, 1, 2),
        );
        assert!(matches!(result, Err(FundError::InvalidLedgerState(_))));
    }
}
