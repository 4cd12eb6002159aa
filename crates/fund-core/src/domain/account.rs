//! 클라이언트 계좌와 일일 성과 기록.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 클라이언트 계좌 요약.
///
/// `current_balance`와 `total_return_percent`는 재계산 결과로만 갱신됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
pub struct ClientAccount {
    /// 클라이언트 ID
    pub client_id: Uuid,
    /// 운용 시작일 (없으면 첫 반영 입금일)
    pub inception_date: Option<NaiveDate>,
    /// 실거래 수익률 추종 여부
    pub live_trading_enabled: bool,
    /// 현재 잔고
    pub current_balance: Decimal,
    /// 반영 입금 합계
    pub total_deposits: Decimal,
    /// 총 수익률 (%)
    pub total_return_percent: Decimal,
    /// 마지막 재계산 날짜
    pub last_accrual_date: Option<NaiveDate>,
}

impl ClientAccount {
    /// 잔고가 비어 있는 새 계좌를 생성합니다.
    pub fn new(client_id: Uuid) -> Self {
        Self {
            client_id,
            inception_date: None,
            live_trading_enabled: false,
            current_balance: Decimal::ZERO,
            total_deposits: Decimal::ZERO,
            total_return_percent: Decimal::ZERO,
            last_accrual_date: None,
        }
    }

    /// 운용 시작일을 지정합니다.
    pub fn with_inception(mut self, date: NaiveDate) -> Self {
        self.inception_date = Some(date);
        self
    }

    /// 실거래 여부를 지정합니다.
    pub fn with_live_trading(mut self, enabled: bool) -> Self {
        self.live_trading_enabled = enabled;
        self
    }

    /// 재계산 결과를 계좌에 반영합니다.
    pub fn apply(&mut self, update: &AccountUpdate) {
        self.current_balance = update.current_balance;
        self.total_deposits = update.total_deposits;
        self.total_return_percent = update.total_return_percent;
        self.last_accrual_date = update.last_accrual_date;
        if self.inception_date.is_none() {
            self.inception_date = update.inception_date;
        }
    }
}

/// 하루치 성과 기록. (client_id, trade_date)당 하나만 존재합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
pub struct DailyPerformanceRecord {
    /// 클라이언트 ID
    pub client_id: Uuid,
    /// 거래일
    pub trade_date: NaiveDate,
    /// 적용된 일일 수익률 (%)
    pub daily_return_percent: Decimal,
    /// 당일 입금 반영 후 수익률 적용 전 잔고
    pub opening_balance: Decimal,
    /// 수익률 적용 후 잔고
    pub closing_balance: Decimal,
    /// 당일 손익
    pub daily_pnl: Decimal,
}

/// 재계산 후 계좌에 기록할 값.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdate {
    /// 새 현재 잔고
    pub current_balance: Decimal,
    /// 반영 입금 합계
    pub total_deposits: Decimal,
    /// 총 수익률 (%)
    pub total_return_percent: Decimal,
    /// 마지막 재계산 날짜 (`None`이면 궤적이 비어 날짜도 비움)
    pub last_accrual_date: Option<NaiveDate>,
    /// 새로 확정된 운용 시작일 (`None`이면 유지)
    pub inception_date: Option<NaiveDate>,
}

/// 전체 재계산 결과.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
pub struct AccrualOutcome {
    /// 일별 잔고 궤적
    pub trajectory: Vec<DailyPerformanceRecord>,
    /// 최종 잔고
    pub final_balance: Decimal,
    /// 반영 입금 합계
    pub total_deposits: Decimal,
    /// 총 수익률 (%)
    pub total_return_percent: Decimal,
}

impl AccrualOutcome {
    /// 입금이 없는 빈 결과.
    pub fn empty() -> Self {
        Self {
            trajectory: Vec::new(),
            final_balance: Decimal::ZERO,
            total_deposits: Decimal::ZERO,
            total_return_percent: Decimal::ZERO,
        }
    }

    /// 마지막 기록 날짜.
    pub fn last_trade_date(&self) -> Option<NaiveDate> {
        self.trajectory.last().map(|r| r.trade_date)
    }

    /// 계좌 갱신 값으로 변환합니다.
    pub fn account_update(&self, inception_date: Option<NaiveDate>) -> AccountUpdate {
        AccountUpdate {
            current_balance: self.final_balance,
            total_deposits: self.total_deposits,
            total_return_percent: self.total_return_percent,
            last_accrual_date: self.last_trade_date(),
            inception_date,
        }
    }
}
