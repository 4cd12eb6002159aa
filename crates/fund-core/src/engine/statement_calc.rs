//! 누적 수익률 비율 기반 기간 명세서 계산기.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::domain::{Deposit, DepositLedger, GracePolicy, ReturnSeries, StatementFigures, StatementPeriod};
use crate::error::{FundError, FundResult};
use crate::types::{DecimalExt, ACCRUAL_SCALE, PERCENT_SCALE};

/// 기간 경계의 누적 수익률 표본만으로 명세서 수치를 계산합니다.
///
/// 일 단위 재생을 하지 않으므로 `AccrualEngine` 결과와 기간 경계에서만 일치합니다.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatementCalculator;

impl StatementCalculator {
    /// `[period_start, period_end]` 구간 수치를 계산합니다.
    ///
    /// 종료일 지수는 종료일 이하의 가장 최근 값을 사용하고, 시작일과 입금일 지수는
    /// 정확히 일치하는 값만 사용합니다. 값이 없거나 0이면 입금액을 그대로 씁니다.
    pub fn calculate(
        &self,
        deposits: &[Deposit],
        series: &ReturnSeries,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> FundResult<StatementFigures> {
        if period_start > period_end {
            return Err(FundError::InvalidInput(format!(
                "period start {} after end {}",
                period_start, period_end
            )));
        }
        if let Some(bad) = deposits.iter().find(|d| d.amount <= Decimal::ZERO) {
            return Err(FundError::InvalidLedgerState(format!(
                "deposit {} has non-positive amount {}",
                bad.id, bad.amount
            )));
        }

        let start_index = series.cumulative(period_start);
        let end_index = series.cumulative_on_or_before(period_end);

        let mut figures = StatementFigures {
            total_deposits: Decimal::ZERO,
            start_balance: Decimal::ZERO,
            end_balance: Decimal::ZERO,
            new_deposits: Decimal::ZERO,
            total_gain: Decimal::ZERO,
            return_percent: Decimal::ZERO,
        };

        for deposit in deposits
            .iter()
            .filter(|d| d.is_contributing() && d.effective_date <= period_end)
        {
            let amount = deposit.amount;
            let deposit_index = series.cumulative(deposit.effective_date);

            figures.total_deposits += amount;
            if deposit.effective_date <= period_start {
                figures.start_balance += scale(amount, start_index, deposit_index);
            } else {
                figures.new_deposits += amount;
            }
            figures.end_balance += scale(amount, end_index, deposit_index);
        }

        figures.total_gain = figures.end_balance - figures.start_balance - figures.new_deposits;
        if figures.start_balance > Decimal::ZERO {
            figures.return_percent = (figures.total_gain / figures.start_balance
                * Decimal::ONE_HUNDRED)
                .round_half_up(PERCENT_SCALE);
        }
        Ok(figures)
    }

    /// 반기 명세서 수치를 계산합니다.
    ///
    /// 유예일 이전이거나 기간 안에 완료 입금이 없으면 `PeriodNotEligible`을 반환합니다.
    pub fn calculate_for_period(
        &self,
        ledger: &DepositLedger,
        series: &ReturnSeries,
        period: &StatementPeriod,
        today: NaiveDate,
        policy: &GracePolicy,
    ) -> FundResult<StatementFigures> {
        if !period.is_available(today, policy) {
            return Err(FundError::PeriodNotEligible(format!(
                "{} is not yet available",
                period
            )));
        }
        if !ledger.has_completed_within(period.start, period.end) {
            return Err(FundError::PeriodNotEligible(format!(
                "no completed deposit in {}",
                period
            )));
        }
        self.calculate(ledger.as_slice(), series, period.start, period.end)
    }
}

/// `amount * (numerator / denominator)`. 지수가 없거나 0이면 `amount`.
fn scale(amount: Decimal, numerator: Option<Decimal>, denominator: Option<Decimal>) -> Decimal {
    let (Some(num), Some(den)) = (numerator, denominator) else {
        return amount;
    };
    if num.is_zero() || den.is_zero() {
        return amount;
    }
    amount
        .checked_mul(num)
        .and_then(|v| v.checked_div(den))
        .map(|v| v.round_half_up(ACCRUAL_SCALE))
        .unwrap_or(amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DepositStatus;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_scale_fallbacks() {
        assert_eq!(scale(dec!(100), Some(dec!(1.1)), Some(dec!(1))), dec!(110));
        assert_eq!(scale(dec!(100), None, Some(dec!(1))), dec!(100));
        assert_eq!(scale(dec!(100), Some(dec!(1.1)), Some(Decimal::ZERO)), dec!(100));
    }

    #[test]
    fn test_rejects_inverted_period() {
        let result =
            StatementCalculator.calculate(&[], &ReturnSeries::new(), date(2024, 6, 30), date(2024, 1, 1));
        assert!(matches!(result, Err(FundError::InvalidInput(_))));
    }

    #[test]
    fn test_excludes_deposits_after_period_and_pending() {
        let client = Uuid::new_v4();
        let deposits = vec![
            Deposit::new(client, dec!(100), date(2024, 1, 1), DepositStatus::Completed),
            Deposit::new(client, dec!(50), date(2024, 3, 1), DepositStatus::Pending),
            Deposit::new(client, dec!(70), date(2024, 8, 1), DepositStatus::Completed),
        ];
        let figures = StatementCalculator
            .calculate(&deposits, &ReturnSeries::new(), date(2024, 1, 1), date(2024, 6, 30))
            .unwrap();
        assert_eq!(figures.total_deposits, dec!(100));
        assert_eq!(figures.start_balance, dec!(100));
        assert_eq!(figures.end_balance, dec!(100));
        assert_eq!(figures.new_deposits, Decimal::ZERO);
        assert_eq!(figures.total_gain, Decimal::ZERO);
    }

    #[test]
    fn test_not_eligible_before_grace_date() {
        let client = Uuid::new_v4();
        let ledger = DepositLedger::new(vec![Deposit::new(
            client,
            dec!(100),
            date(2024, 2, 1),
            DepositStatus::Completed,
        )])
        .unwrap();
        let period = StatementPeriod::parse("H1-2024").unwrap();
        let result = StatementCalculator.calculate_for_period(
            &ledger,
            &ReturnSeries::new(),
            &period,
            date(2024, 7, 4),
            &GracePolicy::default(),
        );
        assert!(matches!(result, Err(FundError::PeriodNotEligible(_))));

        let ok = StatementCalculator.calculate_for_period(
            &ledger,
            &ReturnSeries::new(),
            &period,
            date(2024, 7, 5),
            &GracePolicy::default(),
        );
        assert!(ok.is_ok());
    }
}
