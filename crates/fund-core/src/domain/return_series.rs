//! 펀드 일일 수익률과 누적 수익률 지수.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{DecimalExt, RATIO_SCALE};

/// 특정 날짜의 누적 수익률 지수.
///
/// 기준일은 임의이며, 클라이언트 간 비교는 항상 두 날짜의 비율로 합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
pub struct ReturnPoint {
    /// 날짜
    pub date: NaiveDate,
    /// 누적 수익률 지수
    pub cumulative_return: Decimal,
}

/// 수익률 피드 한 줄 (일일 수익률 + 선택적 누적 지수).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
pub struct DailyReturn {
    /// 거래일
    pub trade_date: NaiveDate,
    /// 일일 수익률 (%)
    pub daily_return_percent: Decimal,
    /// 누적 수익률 지수
    pub cumulative_return: Option<Decimal>,
}

/// 날짜별 일일 수익률(%)과 누적 수익률 지수 테이블.
///
/// 같은 날짜는 최대 한 번만 존재하며 마지막 쓰기가 이깁니다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReturnSeries {
    daily: BTreeMap<NaiveDate, Decimal>,
    cumulative: BTreeMap<NaiveDate, Decimal>,
}

impl ReturnSeries {
    /// 빈 시리즈를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 일일 수익률 목록으로 시리즈를 생성합니다.
    pub fn with_daily<I>(daily: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, Decimal)>,
    {
        let mut series = Self::new();
        for (date, pct) in daily {
            series.insert_daily(date, pct);
        }
        series
    }

    /// 일일 수익률만으로 누적 지수를 유도합니다.
    ///
    /// 지수는 첫 날 이전을 1로 두고 `(1 + r/100)`을 차례로 곱한 값입니다.
    pub fn from_daily<I>(daily: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, Decimal)>,
    {
        let rows: Vec<DailyReturn> = daily
            .into_iter()
            .map(|(trade_date, daily_return_percent)| DailyReturn {
                trade_date,
                daily_return_percent,
                cumulative_return: None,
            })
            .collect();
        Self::from_rows(&rows)
    }

    /// 피드 행 목록으로 시리즈를 생성합니다.
    ///
    /// 누적 지수가 있는 행은 그 값을 쓰고, 없는 행은 직전 지수에 당일 수익률을
    /// 곱해 이어 붙입니다.
    pub fn from_rows(rows: &[DailyReturn]) -> Self {
        let mut series = Self::new();
        for row in rows {
            series.insert_daily(row.trade_date, row.daily_return_percent);
            if let Some(cum) = row.cumulative_return {
                series.insert_cumulative(row.trade_date, cum);
            }
        }

        let mut index = Decimal::ONE;
        let mut chained = BTreeMap::new();
        for (date, pct) in &series.daily {
            index = match series.cumulative.get(date) {
                Some(cum) => *cum,
                None => (index * (Decimal::ONE + *pct / Decimal::ONE_HUNDRED))
                    .round_half_up(RATIO_SCALE),
            };
            chained.insert(*date, index);
        }
        series.cumulative.extend(chained);
        series
    }

    /// 일일 수익률을 기록합니다.
    pub fn insert_daily(&mut self, date: NaiveDate, percent: Decimal) {
        self.daily.insert(date, percent);
    }

    /// 누적 지수를 기록합니다.
    pub fn insert_cumulative(&mut self, date: NaiveDate, value: Decimal) {
        self.cumulative.insert(date, value);
    }

    /// 해당 날짜의 일일 수익률(%).
    pub fn daily_return(&self, date: NaiveDate) -> Option<Decimal> {
        self.daily.get(&date).copied()
    }

    /// 해당 날짜의 누적 지수 (정확히 일치하는 날짜만).
    pub fn cumulative(&self, date: NaiveDate) -> Option<Decimal> {
        self.cumulative.get(&date).copied()
    }

    /// `date` 이하에서 가장 최근의 누적 지수.
    pub fn cumulative_on_or_before(&self, date: NaiveDate) -> Option<Decimal> {
        self.cumulative
            .range(..=date)
            .next_back()
            .map(|(_, value)| *value)
    }

    /// 누적 지수를 날짜 순으로 반환합니다.
    pub fn points(&self) -> impl Iterator<Item = ReturnPoint> + '_ {
        self.cumulative.iter().map(|(date, value)| ReturnPoint {
            date: *date,
            cumulative_return: *value,
        })
    }

    /// 일일 수익률을 날짜 순으로 반환합니다.
    pub fn daily_iter(&self) -> impl Iterator<Item = (NaiveDate, Decimal)> + '_ {
        self.daily.iter().map(|(d, p)| (*d, *p))
    }

    /// 가장 최근 일일 수익률 날짜.
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.daily.keys().next_back().copied()
    }

    /// 일일 수익률 개수.
    pub fn len(&self) -> usize {
        self.daily.len()
    }

    /// 두 맵이 모두 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.daily.is_empty() && self.cumulative.is_empty()
    }
}
