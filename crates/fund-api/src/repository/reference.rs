//! 입금/출금 참조 번호.
//!
//! - 클라이언트 입금 신청: `ACP` + 6자리
//! - 관리자 입금 기록: `DEP` + 8자리
//! - 출금 신청: `WD-YYYY-MM-NNN` (월별 일련번호)

use chrono::{Datelike, NaiveDate};
use rand::Rng;

fn digits(n: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|_| char::from(b'0' + rng.gen_range(0..10)))
        .collect()
}

/// 클라이언트 입금 신청 참조 번호.
pub fn deposit_request_reference() -> String {
    format!("ACP{}", digits(6))
}

/// 관리자 입금 기록 참조 번호.
pub fn admin_deposit_reference() -> String {
    format!("DEP{}", digits(8))
}

/// 해당 월의 출금 참조 번호 접두사 (`WD-2024-07-`).
pub fn withdrawal_prefix(date: NaiveDate) -> String {
    format!("WD-{:04}-{:02}-", date.year(), date.month())
}

/// 출금 참조 번호.
pub fn withdrawal_reference(date: NaiveDate, sequence: u32) -> String {
    format!("{}{:03}", withdrawal_prefix(date), sequence)
}

/// 참조 번호에서 월별 일련번호를 추출합니다.
pub fn withdrawal_sequence(reference: &str, prefix: &str) -> Option<u32> {
    reference.strip_prefix(prefix)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deposit_reference_formats() {
        let request = deposit_request_reference();
        assert!(request.starts_with("ACP"));
        assert_eq!(request.len(), 9);
        assert!(request[3..].chars().all(|c| c.is_ascii_digit()));

        let admin = admin_deposit_reference();
        assert!(admin.starts_with("DEP"));
        assert_eq!(admin.len(), 11);
    }

    #[test]
    fn test_withdrawal_reference() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 3).unwrap();
        assert_eq!(withdrawal_reference(date, 1), "WD-2024-07-001");
        assert_eq!(withdrawal_reference(date, 1234), "WD-2024-07-1234");

        let prefix = withdrawal_prefix(date);
        assert_eq!(withdrawal_sequence("WD-2024-07-042", &prefix), Some(42));
        assert_eq!(withdrawal_sequence("WD-2024-06-042", &prefix), None);
        assert_eq!(withdrawal_sequence("WD-2024-07-abc", &prefix), None);
    }
}
