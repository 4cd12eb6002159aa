//! TOTP 2단계 인증과 백업 코드.
//!
//! - SHA1, 6자리, 30초 주기, 앞뒤 한 주기 허용
//! - 비밀 키는 base32 문자열로 저장
//! - 백업 코드는 `XXXX-XXXX` 형식, sha256 hex 해시로만 저장

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use totp_rs::{Algorithm, Secret, TOTP};

/// 발급하는 백업 코드 개수.
pub const BACKUP_CODE_COUNT: usize = 10;

const DIGITS: usize = 6;
const SKEW: u8 = 1;
const STEP_SECS: u64 = 30;

/// TOTP 관련 에러.
#[derive(Debug, Error)]
pub enum TotpError {
    #[error("Invalid TOTP secret: {0}")]
    InvalidSecret(String),

    #[error("TOTP setup failed: {0}")]
    Setup(String),

    #[error("System clock error: {0}")]
    Clock(String),
}

/// 새 base32 비밀 키를 생성합니다 (160비트).
pub fn generate_secret() -> String {
    Secret::generate_secret().to_encoded().to_string()
}

fn build(secret: &str, issuer: &str, account: &str) -> Result<TOTP, TotpError> {
    let bytes = Secret::Encoded(secret.to_string())
        .to_bytes()
        .map_err(|e| TotpError::InvalidSecret(format!("{:?}", e)))?;

    TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        SKEW,
        STEP_SECS,
        bytes,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|e| TotpError::Setup(e.to_string()))
}

/// 인증 앱 등록용 `otpauth://` URL.
pub fn provisioning_url(secret: &str, issuer: &str, account: &str) -> Result<String, TotpError> {
    Ok(build(secret, issuer, account)?.get_url())
}

/// 주어진 유닉스 시각(초) 기준으로 코드를 검증합니다.
pub fn verify_code_at(
    secret: &str,
    issuer: &str,
    account: &str,
    code: &str,
    unix_secs: u64,
) -> Result<bool, TotpError> {
    let code = normalize_code(code);
    if code.len() != DIGITS || !code.chars().all(|c| c.is_ascii_digit()) {
        return Ok(false);
    }
    Ok(build(secret, issuer, account)?.check(&code, unix_secs))
}

/// 현재 시각 기준으로 코드를 검증합니다.
pub fn verify_code(
    secret: &str,
    issuer: &str,
    account: &str,
    code: &str,
) -> Result<bool, TotpError> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| TotpError::Clock(e.to_string()))?
        .as_secs();
    verify_code_at(secret, issuer, account, code, now)
}

fn normalize_code(code: &str) -> String {
    code.chars().filter(|c| !c.is_whitespace()).collect()
}

// ==================== 백업 코드 ====================

/// 저장되는 백업 코드 (해시와 사용 여부).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupCode {
    /// sha256 hex
    pub hash: String,
    pub used: bool,
}

/// 평문 백업 코드를 생성합니다.
pub fn generate_backup_codes(count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let mut bytes = [0u8; 4];
            rng.fill_bytes(&mut bytes);
            let code = hex::encode_upper(bytes);
            format!("{}-{}", &code[..4], &code[4..])
        })
        .collect()
}

/// 백업 코드 해시.
pub fn hash_backup_code(code: &str) -> String {
    let normalized = code.trim().to_uppercase();
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// 평문 코드 목록을 저장용 형태로 변환합니다.
pub fn hash_backup_codes(codes: &[String]) -> Vec<BackupCode> {
    codes
        .iter()
        .map(|code| BackupCode {
            hash: hash_backup_code(code),
            used: false,
        })
        .collect()
}

/// 일치하는 미사용 코드를 사용 처리합니다. 일치하는 코드가 없으면 `false`.
pub fn consume_backup_code(codes: &mut [BackupCode], input: &str) -> bool {
    let hash = hash_backup_code(input);
    match codes.iter_mut().find(|c| !c.used && c.hash == hash) {
        Some(code) => {
            code.used = true;
            true
        }
        None => false,
    }
}
