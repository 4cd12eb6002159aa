//! 정밀한 금융 계산을 위한 Decimal 유틸리티.
//!
//! 잔고와 수익률은 모두 `Decimal`로 다루며 부동소수점은 사용하지 않습니다.

use rust_decimal::{Decimal, RoundingStrategy};

/// 금액 타입.
pub type Money = Decimal;

/// 퍼센트 타입 (1 = 1%).
pub type Percent = Decimal;

/// 일일 손익 계산 시 유지하는 소수점 자릿수.
pub const ACCRUAL_SCALE: u32 = 8;

/// 누적 수익률 비율 계산 시 유지하는 소수점 자릿수.
pub const RATIO_SCALE: u32 = 12;

/// 총 수익률(%) 표시 자릿수.
pub const PERCENT_SCALE: u32 = 6;

/// 화면/명세서 금액 자릿수.
pub const MONEY_SCALE: u32 = 2;

/// Decimal 연산을 위한 확장 트레이트.
pub trait DecimalExt {
    /// 지정된 소수점 자릿수로 반올림합니다 (0.5는 0에서 먼 쪽으로).
    fn round_half_up(&self, dp: u32) -> Decimal;

    /// 금액 표시 자릿수(2자리)로 반올림합니다.
    fn to_money(&self) -> Decimal;

    /// 퍼센트 문자열로 변환합니다 (예: "0.50%").
    fn to_percentage_string(&self) -> String;

    /// `self`의 `pct`% 값을 계산합니다.
    fn percent_of(&self, pct: Decimal) -> Decimal;
}

impl DecimalExt for Decimal {
    fn round_half_up(&self, dp: u32) -> Decimal {
        self.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
    }

    fn to_money(&self) -> Decimal {
        self.round_half_up(MONEY_SCALE)
    }

    fn to_percentage_string(&self) -> String {
        format!("{:.2}%", self.round_half_up(2))
    }

    fn percent_of(&self, pct: Decimal) -> Decimal {
        (*self * pct / Decimal::ONE_HUNDRED).round_half_up(ACCRUAL_SCALE)
    }
}

/// 총 수익률(%)을 계산합니다. 원금이 0 이하이면 0입니다.
pub fn return_percent(final_balance: Decimal, principal: Decimal) -> Decimal {
    if principal <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    ((final_balance - principal) / principal * Decimal::ONE_HUNDRED).round_half_up(PERCENT_SCALE)
}
