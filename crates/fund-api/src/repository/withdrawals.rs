//! 출금 Repository.
//!
//! 출금은 신청/처리 기록만 관리하며 잔고 재계산 원장에는 영향을 주지 않습니다.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use utoipa::ToSchema;
use uuid::Uuid;

use super::reference::{withdrawal_prefix, withdrawal_reference, withdrawal_sequence};
use super::{is_unique_violation, StatusChangeError};

const REFERENCE_ATTEMPTS: usize = 3;

// ================================================================================================
// Types
// ================================================================================================

/// 출금 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Approved => "approved",
            WithdrawalStatus::Rejected => "rejected",
            WithdrawalStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(WithdrawalStatus::Pending),
            "approved" => Some(WithdrawalStatus::Approved),
            "rejected" => Some(WithdrawalStatus::Rejected),
            "completed" => Some(WithdrawalStatus::Completed),
            _ => None,
        }
    }

    /// 허용되는 상태 전이인지 확인합니다.
    ///
    /// Pending → Approved | Rejected | Completed, Approved → Completed | Rejected.
    pub fn can_transition_to(&self, to: WithdrawalStatus) -> bool {
        use WithdrawalStatus::*;
        matches!(
            (self, to),
            (Pending, Approved | Rejected | Completed) | (Approved, Completed | Rejected)
        )
    }
}

/// 출금 레코드
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct WithdrawalRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub reference: String,
    pub amount: Decimal,
    pub reason: String,
    pub details: Option<String>,
    pub account_name: String,
    pub iban: String,
    pub swift_code: Option<String>,
    pub bank_name: String,
    pub bank_address: Option<String>,
    pub status: String,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_by: Option<Uuid>,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 관리자 목록용 출금 + 클라이언트 정보
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct WithdrawalWithClient {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub withdrawal: WithdrawalRecord,
    pub client_email: String,
    pub client_name: String,
}

/// 출금 신청 입력
#[derive(Debug, Clone)]
pub struct NewWithdrawal {
    pub amount: Decimal,
    pub reason: String,
    pub details: Option<String>,
    pub account_name: String,
    pub iban: String,
    pub swift_code: Option<String>,
    pub bank_name: String,
    pub bank_address: Option<String>,
}

const WITHDRAWAL_COLUMNS: &str = r#"
    id, user_id, reference, amount, reason, details, account_name, iban, swift_code,
    bank_name, bank_address, status, processed_at, processed_by, admin_notes, created_at
"#;

// ================================================================================================
// Repository
// ================================================================================================

/// 출금 Repository
pub struct WithdrawalRepository;

impl WithdrawalRepository {
    /// 이번 달 다음 출금 참조 번호.
    async fn next_reference(pool: &PgPool, today: NaiveDate) -> Result<String, sqlx::Error> {
        let prefix = withdrawal_prefix(today);
        let existing: Vec<String> =
            sqlx::query_scalar("SELECT reference FROM withdrawals WHERE reference LIKE $1 || '%'")
                .bind(&prefix)
                .fetch_all(pool)
                .await?;

        let next = existing
            .iter()
            .filter_map(|r| withdrawal_sequence(r, &prefix))
            .max()
            .unwrap_or(0)
            + 1;
        Ok(withdrawal_reference(today, next))
    }

    /// 출금 신청 생성 (pending).
    pub async fn create(
        pool: &PgPool,
        user_id: Uuid,
        input: &NewWithdrawal,
        today: NaiveDate,
    ) -> Result<WithdrawalRecord, sqlx::Error> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let reference = Self::next_reference(pool, today).await?;
            let result = sqlx::query_as::<_, WithdrawalRecord>(&format!(
                r#"
                INSERT INTO withdrawals (
                    user_id, reference, amount, reason, details, account_name, iban,
                    swift_code, bank_name, bank_address, status
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending')
                RETURNING {}
                "#,
                WITHDRAWAL_COLUMNS
            ))
            .bind(user_id)
            .bind(&reference)
            .bind(input.amount)
            .bind(&input.reason)
            .bind(&input.details)
            .bind(&input.account_name)
            .bind(&input.iban)
            .bind(&input.swift_code)
            .bind(&input.bank_name)
            .bind(&input.bank_address)
            .fetch_one(pool)
            .await;

            match result {
                // 동시 신청으로 같은 번호가 나온 경우
                Err(e) if is_unique_violation(&e) && attempt < REFERENCE_ATTEMPTS => continue,
                other => return other,
            }
        }
    }

    /// 사용자 출금 목록 (최근순).
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Vec<WithdrawalRecord>, sqlx::Error> {
        sqlx::query_as::<_, WithdrawalRecord>(&format!(
            "SELECT {} FROM withdrawals WHERE user_id = $1 ORDER BY created_at DESC",
            WITHDRAWAL_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// 전체 출금 목록 (관리자).
    pub async fn list_all(
        pool: &PgPool,
        status: Option<WithdrawalStatus>,
    ) -> Result<Vec<WithdrawalWithClient>, sqlx::Error> {
        sqlx::query_as::<_, WithdrawalWithClient>(
            r#"
            SELECT
                w.id, w.user_id, w.reference, w.amount, w.reason, w.details, w.account_name,
                w.iban, w.swift_code, w.bank_name, w.bank_address, w.status, w.processed_at,
                w.processed_by, w.admin_notes, w.created_at,
                u.email AS client_email,
                u.first_name || ' ' || u.last_name AS client_name
            FROM withdrawals w
            JOIN users u ON u.id = w.user_id
            WHERE ($1::TEXT IS NULL OR w.status = $1)
            ORDER BY w.created_at DESC
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(pool)
        .await
    }

    /// 출금 상태 변경.
    pub async fn update_status(
        pool: &PgPool,
        id: Uuid,
        status: WithdrawalStatus,
        admin_id: Uuid,
        admin_notes: Option<&str>,
    ) -> Result<WithdrawalRecord, StatusChangeError> {
        let mut tx = pool.begin().await?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM withdrawals WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let current = current.ok_or(StatusChangeError::NotFound)?;
        let from = WithdrawalStatus::parse(&current)
            .ok_or_else(|| StatusChangeError::Corrupt(format!("withdrawal status {}", current)))?;

        if !from.can_transition_to(status) {
            return Err(StatusChangeError::InvalidTransition {
                from: from.as_str().to_string(),
                to: status.as_str().to_string(),
            });
        }

        let record = sqlx::query_as::<_, WithdrawalRecord>(&format!(
            r#"
            UPDATE withdrawals SET
                status = $2,
                admin_notes = COALESCE($3, admin_notes),
                processed_at = NOW(),
                processed_by = $4
            WHERE id = $1
            RETURNING {}
            "#,
            WITHDRAWAL_COLUMNS
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(admin_notes)
        .bind(admin_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_and_transitions() {
        use WithdrawalStatus::*;

        for status in [Pending, Approved, Rejected, Completed] {
            assert_eq!(WithdrawalStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(WithdrawalStatus::parse("cancelled"), None);

        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Pending.can_transition_to(Completed));
        assert!(!Approved.can_transition_to(Pending));
        assert!(Approved.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Approved));
    }
}
