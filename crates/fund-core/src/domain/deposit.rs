//! 입금 및 입금 원장.
//!
//! - `DepositStatus` - 입금 상태 (pending/approved/completed/rejected)
//! - `Deposit` - 원장에 기록된 단일 입금
//! - `DepositLedger` - 유효일 순으로 정렬된 클라이언트 입금 목록

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FundError, FundResult};

/// 입금 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum DepositStatus {
    /// 승인 대기
    Pending,
    /// 승인됨
    Approved,
    /// 입금 완료
    Completed,
    /// 거절됨
    Rejected,
}

impl DepositStatus {
    /// 데이터베이스 저장용 문자열.
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositStatus::Pending => "pending",
            DepositStatus::Approved => "approved",
            DepositStatus::Completed => "completed",
            DepositStatus::Rejected => "rejected",
        }
    }

    /// 잔고 계산에 포함되는 상태인지 확인합니다.
    pub fn is_contributing(&self) -> bool {
        matches!(self, DepositStatus::Approved | DepositStatus::Completed)
    }
}

impl std::fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DepositStatus {
    type Err = FundError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(DepositStatus::Pending),
            "approved" => Ok(DepositStatus::Approved),
            "completed" => Ok(DepositStatus::Completed),
            "rejected" => Ok(DepositStatus::Rejected),
            other => Err(FundError::InvalidInput(format!(
                "unknown deposit status: {}",
                other
            ))),
        }
    }
}

/// 원장에 기록된 입금.
///
/// 금액과 유효일은 생성 이후 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    /// 입금 ID
    pub id: Uuid,
    /// 클라이언트 ID
    pub client_id: Uuid,
    /// 입금액 (0 초과)
    pub amount: Decimal,
    /// 잔고에 반영되는 날짜
    pub effective_date: NaiveDate,
    /// 상태
    pub status: DepositStatus,
    /// 같은 날짜 입금의 삽입 순서
    pub sequence: i64,
}

impl Deposit {
    /// 새 입금을 생성합니다.
    pub fn new(
        client_id: Uuid,
        amount: Decimal,
        effective_date: NaiveDate,
        status: DepositStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            amount,
            effective_date,
            status,
            sequence: 0,
        }
    }

    /// 삽입 순서를 지정합니다.
    pub fn with_sequence(mut self, sequence: i64) -> Self {
        self.sequence = sequence;
        self
    }

    /// 잔고 계산에 포함되는 입금인지 확인합니다.
    pub fn is_contributing(&self) -> bool {
        self.status.is_contributing()
    }
}

/// 유효일 오름차순(같은 날은 삽입 순서)으로 정렬된 입금 원장.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepositLedger {
    deposits: Vec<Deposit>,
}

impl DepositLedger {
    /// 이미 정렬된 입금 목록으로 원장을 생성합니다.
    pub fn new(deposits: Vec<Deposit>) -> FundResult<Self> {
        Self::validate(&deposits)?;
        Ok(Self { deposits })
    }

    /// 정렬되지 않은 입금 목록을 (유효일, 삽입 순서)로 정렬해 원장을 생성합니다.
    pub fn from_unsorted(mut deposits: Vec<Deposit>) -> FundResult<Self> {
        deposits.sort_by_key(|d| (d.effective_date, d.sequence));
        Self::new(deposits)
    }

    /// 원장 전제 조건을 검사합니다.
    ///
    /// 모든 금액은 0보다 커야 하고 유효일은 내림차순이 아니어야 합니다.
    pub fn validate(deposits: &[Deposit]) -> FundResult<()> {
        if let Some(bad) = deposits.iter().find(|d| d.amount <= Decimal::ZERO) {
            return Err(FundError::InvalidLedgerState(format!(
                "deposit {} has non-positive amount {}",
                bad.id, bad.amount
            )));
        }

        if let Some(pair) = deposits
            .windows(2)
            .find(|w| w[1].effective_date < w[0].effective_date)
        {
            return Err(FundError::InvalidLedgerState(format!(
                "ledger not sorted: {} after {}",
                pair[1].effective_date, pair[0].effective_date
            )));
        }

        Ok(())
    }

    /// 잔고에 반영되는 입금(approved/completed)만 반환합니다.
    pub fn contributing(&self) -> impl Iterator<Item = &Deposit> {
        self.deposits.iter().filter(|d| d.is_contributing())
    }

    /// 반영 입금 합계.
    pub fn contributing_total(&self) -> Decimal {
        self.contributing().map(|d| d.amount).sum()
    }

    /// 첫 번째 반영 입금의 유효일.
    pub fn first_contributing_date(&self) -> Option<NaiveDate> {
        self.contributing().map(|d| d.effective_date).next()
    }

    /// 완료(completed) 입금 중 `[start, end]` 구간에 유효한 것이 있는지 확인합니다.
    pub fn has_completed_within(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.deposits.iter().any(|d| {
            d.status == DepositStatus::Completed
                && d.effective_date >= start
                && d.effective_date <= end
        })
    }

    /// 입금 슬라이스.
    pub fn as_slice(&self) -> &[Deposit] {
        &self.deposits
    }

    /// 입금 개수.
    pub fn len(&self) -> usize {
        self.deposits.len()
    }

    /// 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.deposits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_status_round_trip_and_contributing() {
        for status in [
            DepositStatus::Pending,
            DepositStatus::Approved,
            DepositStatus::Completed,
            DepositStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<DepositStatus>().unwrap(), status);
        }
        assert!("COMPLETED".parse::<DepositStatus>().is_ok());
        assert!("cancelled".parse::<DepositStatus>().is_err());

        assert!(DepositStatus::Approved.is_contributing());
        assert!(DepositStatus::Completed.is_contributing());
        assert!(!DepositStatus::Pending.is_contributing());
        assert!(!DepositStatus::Rejected.is_contributing());
    }

    #[test]
    fn test_from_unsorted_orders_by_date_then_sequence() {
        let client = Uuid::new_v4();
        let a = Deposit::new(client, dec!(100), date(2024, 1, 3), DepositStatus::Completed)
            .with_sequence(1);
        let b = Deposit::new(client, dec!(200), date(2024, 1, 1), DepositStatus::Completed)
            .with_sequence(3);
        let c = Deposit::new(client, dec!(300), date(2024, 1, 1), DepositStatus::Approved)
            .with_sequence(2);

        let ledger = DepositLedger::from_unsorted(vec![a, b, c]).unwrap();
        let amounts: Vec<_> = ledger.as_slice().iter().map(|d| d.amount).collect();
        assert_eq!(amounts, vec![dec!(300), dec!(200), dec!(100)]);
    }

    #[test]
    fn test_validate_rejects_non_positive_and_unsorted() {
        let client = Uuid::new_v4();
        let zero = Deposit::new(client, dec!(0), date(2024, 1, 1), DepositStatus::Completed);
        assert!(matches!(
            DepositLedger::new(vec![zero]),
            Err(FundError::InvalidLedgerState(_))
        ));

        let later = Deposit::new(client, dec!(10), date(2024, 2, 1), DepositStatus::Completed);
        let earlier = Deposit::new(client, dec!(10), date(2024, 1, 1), DepositStatus::Completed);
        assert!(matches!(
            DepositLedger::new(vec![later, earlier]),
            Err(FundError::InvalidLedgerState(_))
        ));
    }

    #[test]
    fn test_contributing_filters_status() {
        let client = Uuid::new_v4();
        let ledger = DepositLedger::new(vec![
            Deposit::new(client, dec!(50), date(2024, 1, 1), DepositStatus::Pending),
            Deposit::new(client, dec!(70), date(2024, 1, 2), DepositStatus::Approved),
            Deposit::new(client, dec!(90), date(2024, 1, 3), DepositStatus::Rejected),
        ])
        .unwrap();

        assert_eq!(ledger.contributing_total(), dec!(70));
        assert_eq!(ledger.first_contributing_date(), Some(date(2024, 1, 2)));
        assert!(!ledger.has_completed_within(date(2024, 1, 1), date(2024, 12, 31)));
    }
}
