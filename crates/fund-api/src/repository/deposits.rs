//! 입금 Repository.
//!
//! 입금 신청/기록과 관리자 승인 상태 변경을 담당합니다.
//! 반영 상태(Approved/Completed)로 바뀐 입금의 금액과 유효일은 이후 변경되지 않습니다.

use chrono::{DateTime, NaiveDate, Utc};
use fund_core::DepositStatus;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use utoipa::ToSchema;
use uuid::Uuid;

use super::reference::{admin_deposit_reference, deposit_request_reference};
use super::{is_unique_violation, StatusChangeError};

/// 참조 번호 충돌 시 재시도 횟수
const REFERENCE_ATTEMPTS: usize = 3;

// ================================================================================================
// Types
// ================================================================================================

/// 입금 레코드
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct DepositRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub reference: String,
    pub amount: Decimal,
    pub purpose: String,
    pub method: Option<String>,
    pub status: String,
    /// 유효일 (승인 전에는 없음)
    pub deposit_date: Option<NaiveDate>,
    pub seq: i64,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DepositRecord {
    /// 저장된 상태.
    pub fn status(&self) -> Result<DepositStatus, fund_core::FundError> {
        self.status.parse()
    }
}

/// 관리자 목록용 입금 + 클라이언트 정보
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct DepositWithClient {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub deposit: DepositRecord,
    pub client_email: String,
    pub client_name: String,
}

/// 클라이언트 입금 신청 입력
#[derive(Debug, Clone)]
pub struct DepositRequestInput {
    pub amount: Decimal,
    pub purpose: String,
    pub method: Option<String>,
}

/// 관리자 완료 입금 입력
#[derive(Debug, Clone)]
pub struct CompletedDepositInput {
    pub user_id: Uuid,
    pub amount: Decimal,
    pub deposit_date: NaiveDate,
    pub purpose: String,
    pub admin_notes: Option<String>,
}

/// 허용되는 상태 전이인지 확인합니다.
///
/// - Pending → Approved | Completed | Rejected
/// - Approved → Completed | Rejected
/// - Completed, Rejected는 최종 상태
pub fn check_transition(from: DepositStatus, to: DepositStatus) -> Result<(), StatusChangeError> {
    use DepositStatus::*;

    let allowed = matches!(
        (from, to),
        (Pending, Approved | Completed | Rejected) | (Approved, Completed | Rejected)
    );
    if allowed {
        Ok(())
    } else {
        Err(StatusChangeError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// 상태 변경이 반영 원장을 바꾸는지 여부.
///
/// 이전이나 이후 상태 중 하나라도 반영 상태면 잔고를 다시 계산해야 합니다.
pub fn changes_ledger(from: DepositStatus, to: DepositStatus) -> bool {
    from.is_contributing() || to.is_contributing()
}

/// 상태 변경 결과.
#[derive(Debug, Clone)]
pub struct DepositTransition {
    /// 변경된 입금
    pub record: DepositRecord,
    /// 변경 전 상태
    pub from: DepositStatus,
}

impl DepositTransition {
    /// 원장 재계산이 필요한지 여부
    pub fn changes_ledger(&self) -> bool {
        match self.record.status() {
            Ok(to) => changes_ledger(self.from, to),
            Err(_) => true,
        }
    }
}

const DEPOSIT_COLUMNS: &str = r#"
    id, user_id, reference, amount, purpose, method, status, deposit_date, seq,
    approved_at, approved_by, admin_notes, created_at
"#;

// ================================================================================================
// Repository
// ================================================================================================

/// 입금 Repository
pub struct DepositRepository;

impl DepositRepository {
    /// 클라이언트 입금 신청 (pending, 유효일 없음).
    pub async fn create_request(
        pool: &PgPool,
        user_id: Uuid,
        input: &DepositRequestInput,
    ) -> Result<DepositRecord, sqlx::Error> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = sqlx::query_as::<_, DepositRecord>(&format!(
                r#"
                INSERT INTO deposits (user_id, reference, amount, purpose, method, status)
                VALUES ($1, $2, $3, $4, $5, 'pending')
                RETURNING {}
                "#,
                DEPOSIT_COLUMNS
            ))
            .bind(user_id)
            .bind(deposit_request_reference())
            .bind(input.amount)
            .bind(&input.purpose)
            .bind(&input.method)
            .fetch_one(pool)
            .await;

            match result {
                Err(e) if is_unique_violation(&e) && attempt < REFERENCE_ATTEMPTS => continue,
                other => return other,
            }
        }
    }

    /// 관리자 완료 입금 기록 (completed, 유효일 지정).
    pub async fn create_completed(
        pool: &PgPool,
        admin_id: Uuid,
        input: &CompletedDepositInput,
    ) -> Result<DepositRecord, sqlx::Error> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = sqlx::query_as::<_, DepositRecord>(&format!(
                r#"
                INSERT INTO deposits (
                    user_id, reference, amount, purpose, method, status, deposit_date,
                    approved_at, approved_by, admin_notes
                )
                VALUES ($1, $2, $3, $4, 'admin', 'completed', $5, NOW(), $6, $7)
                RETURNING {}
                "#,
                DEPOSIT_COLUMNS
            ))
            .bind(input.user_id)
            .bind(admin_deposit_reference())
            .bind(input.amount)
            .bind(&input.purpose)
            .bind(input.deposit_date)
            .bind(admin_id)
            .bind(&input.admin_notes)
            .fetch_one(pool)
            .await;

            match result {
                Err(e) if is_unique_violation(&e) && attempt < REFERENCE_ATTEMPTS => continue,
                other => return other,
            }
        }
    }

    /// 사용자 입금 목록 (최근순).
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Vec<DepositRecord>, sqlx::Error> {
        sqlx::query_as::<_, DepositRecord>(&format!(
            "SELECT {} FROM deposits WHERE user_id = $1 ORDER BY created_at DESC",
            DEPOSIT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// 전체 입금 목록 (관리자), 상태 필터 선택.
    pub async fn list_all(
        pool: &PgPool,
        status: Option<DepositStatus>,
    ) -> Result<Vec<DepositWithClient>, sqlx::Error> {
        sqlx::query_as::<_, DepositWithClient>(
            r#"
            SELECT
                d.id, d.user_id, d.reference, d.amount, d.purpose, d.method, d.status,
                d.deposit_date, d.seq, d.approved_at, d.approved_by, d.admin_notes, d.created_at,
                u.email AS client_email,
                u.first_name || ' ' || u.last_name AS client_name
            FROM deposits d
            JOIN users u ON u.id = d.user_id
            WHERE ($1::TEXT IS NULL OR d.status = $1)
            ORDER BY d.created_at DESC
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(pool)
        .await
    }

    /// 입금 상태 변경.
    ///
    /// 반영 상태로 처음 바뀌면 승인 정보와 유효일(기존 값 우선, 없으면 `effective_date`)을 기록합니다.
    /// 변경 전 상태를 함께 반환합니다.
    pub async fn update_status(
        pool: &PgPool,
        id: Uuid,
        status: DepositStatus,
        admin_id: Uuid,
        admin_notes: Option<&str>,
        effective_date: NaiveDate,
    ) -> Result<DepositTransition, StatusChangeError> {
        let mut tx = pool.begin().await?;

        let current = sqlx::query_as::<_, DepositRecord>(&format!(
            "SELECT {} FROM deposits WHERE id = $1 FOR UPDATE",
            DEPOSIT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StatusChangeError::NotFound)?;

        let from = current
            .status()
            .map_err(|e| StatusChangeError::Corrupt(e.to_string()))?;
        check_transition(from, status)?;

        let record = sqlx::query_as::<_, DepositRecord>(&format!(
            r#"
            UPDATE deposits SET
                status = $2,
                admin_notes = COALESCE($3, admin_notes),
                approved_at = CASE WHEN $4 THEN COALESCE(approved_at, NOW()) ELSE approved_at END,
                approved_by = CASE WHEN $4 THEN COALESCE(approved_by, $5) ELSE approved_by END,
                deposit_date = CASE WHEN $4 THEN COALESCE(deposit_date, $6) ELSE deposit_date END
            WHERE id = $1
            RETURNING {}
            "#,
            DEPOSIT_COLUMNS
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(admin_notes)
        .bind(status.is_contributing())
        .bind(admin_id)
        .bind(effective_date)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(DepositTransition { record, from })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use DepositStatus::*;

        assert!(check_transition(Pending, Approved).is_ok());
        assert!(check_transition(Pending, Completed).is_ok());
        assert!(check_transition(Pending, Rejected).is_ok());
        assert!(check_transition(Approved, Completed).is_ok());
        assert!(check_transition(Approved, Rejected).is_ok());

        assert!(check_transition(Completed, Pending).is_err());
        assert!(check_transition(Rejected, Approved).is_err());
        assert!(check_transition(Approved, Pending).is_err());
        assert!(check_transition(Pending, Pending).is_err());
    }

    #[test]
    fn test_changes_ledger() {
        use DepositStatus::*;

        // 반영 상태로 진입
        assert!(changes_ledger(Pending, Approved));
        assert!(changes_ledger(Pending, Completed));
        assert!(changes_ledger(Approved, Completed));
        // 반영되던 입금이 거절되면 원장에서 빠짐
        assert!(changes_ledger(Approved, Rejected));

        // 반영된 적 없는 입금의 거절
        assert!(!changes_ledger(Pending, Rejected));
    }
}
