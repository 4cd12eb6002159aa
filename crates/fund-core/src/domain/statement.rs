//! 반기 명세서 기간과 명세서 수치.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::DepositLedger;
use crate::error::{FundError, FundResult};

/// 반기 구분.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
pub enum HalfYear {
    /// 1월 1일 ~ 6월 30일
    H1,
    /// 7월 1일 ~ 12월 31일
    H2,
}

impl HalfYear {
    /// 날짜가 속한 반기.
    pub fn of(date: NaiveDate) -> Self {
        if date.month() <= 6 {
            HalfYear::H1
        } else {
            HalfYear::H2
        }
    }
}

impl std::fmt::Display for HalfYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HalfYear::H1 => write!(f, "H1"),
            HalfYear::H2 => write!(f, "H2"),
        }
    }
}

/// 명세서 발급 유예 정책.
///
/// 반기가 끝나도 유예일이 지나야 명세서를 발급합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GracePolicy {
    /// H1 발급 가능 월 (같은 해)
    pub h1_month: u32,
    /// H1 발급 가능 일
    pub h1_day: u32,
    /// H2 발급 가능 월 (다음 해)
    pub h2_month: u32,
    /// H2 발급 가능 일
    pub h2_day: u32,
}

impl Default for GracePolicy {
    fn default() -> Self {
        Self {
            h1_month: 7,
            h1_day: 5,
            h2_month: 1,
            h2_day: 5,
        }
    }
}

/// 반기 명세서 기간.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
pub struct StatementPeriod {
    /// 반기
    pub half: HalfYear,
    /// 연도
    pub year: i32,
    /// 시작일 (포함)
    pub start: NaiveDate,
    /// 종료일 (포함)
    pub end: NaiveDate,
}

impl StatementPeriod {
    /// 반기 기간을 생성합니다.
    pub fn new(half: HalfYear, year: i32) -> FundResult<Self> {
        let (start, end) = match half {
            HalfYear::H1 => (
                NaiveDate::from_ymd_opt(year, 1, 1),
                NaiveDate::from_ymd_opt(year, 6, 30),
            ),
            HalfYear::H2 => (
                NaiveDate::from_ymd_opt(year, 7, 1),
                NaiveDate::from_ymd_opt(year, 12, 31),
            ),
        };
        match (start, end) {
            (Some(start), Some(end)) => Ok(Self {
                half,
                year,
                start,
                end,
            }),
            _ => Err(FundError::InvalidInput(format!("year out of range: {}", year))),
        }
    }

    /// 날짜가 속한 반기 기간.
    pub fn containing(date: NaiveDate) -> FundResult<Self> {
        Self::new(HalfYear::of(date), date.year())
    }

    /// `"H1-2024"` 형식의 ID를 파싱합니다.
    pub fn parse(id: &str) -> FundResult<Self> {
        let invalid = || FundError::InvalidInput(format!("invalid statement id: {}", id));
        let (half, year) = id.trim().split_once('-').ok_or_else(invalid)?;
        let half = match half.to_uppercase().as_str() {
            "H1" => HalfYear::H1,
            "H2" => HalfYear::H2,
            _ => return Err(invalid()),
        };
        let year: i32 = year.parse().map_err(|_| invalid())?;
        if !(1900..=9999).contains(&year) {
            return Err(invalid());
        }
        Self::new(half, year)
    }

    /// 기간 ID (예: `H1-2024`).
    pub fn id(&self) -> String {
        format!("{}-{}", self.half, self.year)
    }

    /// 표시용 레이블.
    pub fn label(&self) -> String {
        match self.half {
            HalfYear::H1 => format!("January - June {}", self.year),
            HalfYear::H2 => format!("July - December {}", self.year),
        }
    }

    /// 명세서 발급이 가능해지는 날짜.
    pub fn grace_date(&self, policy: &GracePolicy) -> Option<NaiveDate> {
        match self.half {
            HalfYear::H1 => NaiveDate::from_ymd_opt(self.year, policy.h1_month, policy.h1_day),
            HalfYear::H2 => {
                NaiveDate::from_ymd_opt(self.year + 1, policy.h2_month, policy.h2_day)
            }
        }
    }

    /// `today` 기준으로 유예일이 지났는지 확인합니다.
    pub fn is_available(&self, today: NaiveDate, policy: &GracePolicy) -> bool {
        self.grace_date(policy).is_some_and(|grace| today >= grace)
    }

    /// 직전 반기 기간.
    pub fn previous(&self) -> FundResult<Self> {
        match self.half {
            HalfYear::H1 => Self::new(HalfYear::H2, self.year - 1),
            HalfYear::H2 => Self::new(HalfYear::H1, self.year),
        }
    }

    /// 발급 가능한 기간 목록 (최근 기간부터).
    ///
    /// 유예일이 지났고 기간 안에 완료 입금이 하나 이상 있는 반기만 포함합니다.
    pub fn eligible_periods(
        ledger: &DepositLedger,
        today: NaiveDate,
        policy: &GracePolicy,
    ) -> FundResult<Vec<Self>> {
        let Some(first) = ledger.as_slice().iter().map(|d| d.effective_date).min() else {
            return Ok(Vec::new());
        };

        let mut periods = Vec::new();
        let mut period = Self::containing(today)?;
        while period.end >= first {
            if period.is_available(today, policy)
                && ledger.has_completed_within(period.start, period.end)
            {
                periods.push(period);
            }
            period = period.previous()?;
        }
        Ok(periods)
    }
}

impl std::fmt::Display for StatementPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.half, self.year)
    }
}

/// 명세서에 인쇄되는 여섯 가지 수치.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
pub struct StatementFigures {
    /// 기간 종료일까지 반영된 입금 합계
    pub total_deposits: Decimal,
    /// 기간 시작 잔고
    pub start_balance: Decimal,
    /// 기간 종료 잔고
    pub end_balance: Decimal,
    /// 기간 중 신규 입금
    pub new_deposits: Decimal,
    /// 기간 손익
    pub total_gain: Decimal,
    /// 기간 수익률 (%)
    pub return_percent: Decimal,
}
