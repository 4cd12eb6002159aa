//! 사용자/클라이언트 계정 Repository.
//!
//! 잔고 필드(`current_balance`, `total_deposits`, `total_return_percent`,
//! `last_accrual_date`)는 읽기만 합니다. 쓰기는 재계산 스케줄러의 저장소가 담당합니다.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::totp::BackupCode;
use crate::auth::Role;

// ================================================================================================
// Types
// ================================================================================================

/// 인증용 사용자 레코드 (비밀 값 포함, 응답으로 직렬화하지 않음).
#[derive(Debug, Clone, FromRow)]
pub struct UserAuthRecord {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub two_factor_enabled: bool,
    pub two_factor_secret: Option<String>,
    pub two_factor_temp_secret: Option<String>,
    pub backup_codes: Json<Vec<BackupCode>>,
    pub two_factor_setup_required: bool,
}

impl UserAuthRecord {
    /// 저장된 역할. 알 수 없는 값은 Client로 취급합니다.
    pub fn role(&self) -> Role {
        Role::parse(&self.role).unwrap_or(Role::Client)
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// 사용자 프로필 및 계좌 요약.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub inception_date: Option<NaiveDate>,
    pub live_trading_enabled: bool,
    pub current_balance: Decimal,
    pub total_deposits: Decimal,
    pub total_return_percent: Decimal,
    pub last_accrual_date: Option<NaiveDate>,
    pub two_factor_enabled: bool,
    pub two_factor_setup_required: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// 새 사용자 입력.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

/// 프로필 수정 입력.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ProfileUpdate {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

const PROFILE_COLUMNS: &str = r#"
    id, email, first_name, last_name, role, phone, address,
    inception_date, live_trading_enabled, current_balance, total_deposits,
    total_return_percent, last_accrual_date, two_factor_enabled,
    two_factor_setup_required, last_login, created_at
"#;

const AUTH_COLUMNS: &str = r#"
    id, email, password_hash, first_name, last_name, role,
    two_factor_enabled, two_factor_secret, two_factor_temp_secret,
    backup_codes, two_factor_setup_required
"#;

// ================================================================================================
// Repository
// ================================================================================================

/// 사용자 Repository
pub struct UserRepository;

impl UserRepository {
    /// 이메일로 인증 레코드 조회 (대소문자 무시).
    pub async fn find_auth_by_email(
        pool: &PgPool,
        email: &str,
    ) -> Result<Option<UserAuthRecord>, sqlx::Error> {
        sqlx::query_as::<_, UserAuthRecord>(&format!(
            "SELECT {} FROM users WHERE LOWER(email) = LOWER($1)",
            AUTH_COLUMNS
        ))
        .bind(email.trim())
        .fetch_optional(pool)
        .await
    }

    /// ID로 인증 레코드 조회.
    pub async fn find_auth_by_id(
        pool: &PgPool,
        id: Uuid,
    ) -> Result<Option<UserAuthRecord>, sqlx::Error> {
        sqlx::query_as::<_, UserAuthRecord>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            AUTH_COLUMNS
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// 프로필 조회.
    pub async fn get_profile(pool: &PgPool, id: Uuid) -> Result<Option<UserProfile>, sqlx::Error> {
        sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            PROFILE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// 전체 클라이언트 목록 (최근 가입순).
    pub async fn list_clients(pool: &PgPool) -> Result<Vec<UserProfile>, sqlx::Error> {
        sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {} FROM users WHERE role = 'client' ORDER BY created_at DESC",
            PROFILE_COLUMNS
        ))
        .fetch_all(pool)
        .await
    }

    /// 사용자 생성. 이메일 중복 시 unique violation 에러를 반환합니다.
    pub async fn create(pool: &PgPool, user: &NewUser) -> Result<UserProfile, sqlx::Error> {
        sqlx::query_as::<_, UserProfile>(&format!(
            r#"
            INSERT INTO users (email, password_hash, first_name, last_name, role)
            VALUES (LOWER($1), $2, $3, $4, $5)
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        ))
        .bind(user.email.trim())
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role.as_str())
        .fetch_one(pool)
        .await
    }

    /// 프로필 수정.
    pub async fn update_profile(
        pool: &PgPool,
        id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<Option<UserProfile>, sqlx::Error> {
        sqlx::query_as::<_, UserProfile>(&format!(
            r#"
            UPDATE users SET
                first_name = $2, last_name = $3, phone = $4, address = $5, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        ))
        .bind(id)
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(&update.phone)
        .bind(&update.address)
        .fetch_optional(pool)
        .await
    }

    /// 마지막 로그인 시간 갱신.
    pub async fn touch_last_login(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// 비밀번호 변경.
    pub async fn update_password(
        pool: &PgPool,
        id: Uuid,
        password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(pool)
            .await?;
        Ok(())
    }

    // ============================================================================================
    // 2FA
    // ============================================================================================

    /// 설정 중인 임시 비밀 키 저장.
    pub async fn set_temp_secret(pool: &PgPool, id: Uuid, secret: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET two_factor_temp_secret = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(secret)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// 임시 비밀 키를 확정하고 2FA를 활성화합니다.
    pub async fn enable_two_factor(
        pool: &PgPool,
        id: Uuid,
        secret: &str,
        backup_codes: &[BackupCode],
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users SET
                two_factor_secret = $2,
                two_factor_temp_secret = NULL,
                two_factor_enabled = TRUE,
                backup_codes = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(secret)
        .bind(Json(backup_codes))
        .execute(pool)
        .await?;
        Ok(())
    }

    /// 백업 코드 사용 상태 저장.
    pub async fn update_backup_codes(
        pool: &PgPool,
        id: Uuid,
        backup_codes: &[BackupCode],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET backup_codes = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(Json(backup_codes))
            .execute(pool)
            .await?;
        Ok(())
    }

    /// 2FA 설정 필요 플래그 해제.
    pub async fn complete_setup(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users SET two_factor_setup_required = FALSE, updated_at = NOW()
            WHERE id = $1 AND two_factor_enabled = TRUE
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ============================================================================================
    // 실거래 설정
    // ============================================================================================

    /// 실거래 여부와 운용 시작일 설정.
    ///
    /// 운용 시작일은 이미 있으면 바꾸지 않습니다.
    pub async fn set_live_trading(
        pool: &PgPool,
        id: Uuid,
        enabled: bool,
        inception_date: Option<NaiveDate>,
    ) -> Result<Option<UserProfile>, sqlx::Error> {
        sqlx::query_as::<_, UserProfile>(&format!(
            r#"
            UPDATE users SET
                live_trading_enabled = $2,
                inception_date = COALESCE(inception_date, $3),
                updated_at = NOW()
            WHERE id = $1 AND role = 'client'
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        ))
        .bind(id)
        .bind(enabled)
        .bind(inception_date)
        .fetch_optional(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_role_falls_back_to_client() {
        let record = UserAuthRecord {
            id: Uuid::nil(),
            email: "a@example.com".to_string(),
            password_hash: String::new(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            role: "superuser".to_string(),
            two_factor_enabled: false,
            two_factor_secret: None,
            two_factor_temp_secret: None,
            backup_codes: Json(Vec::new()),
            two_factor_setup_required: true,
        };
        assert_eq!(record.role(), Role::Client);
        assert_eq!(record.full_name(), "Ada Lovelace");
    }
}
