//! 비밀번호 해싱 유틸리티.
//!
//! Argon2 기반 비밀번호 해싱 및 검증.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// 비밀번호 처리 에러.
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("비밀번호 해싱 실패")]
    HashingFailed,
    #[error("비밀번호 검증 실패")]
    VerificationFailed,
    #[error("잘못된 해시 형식")]
    InvalidHashFormat,
}

/// Argon2id로 비밀번호를 해싱합니다. 결과는 솔트를 포함한 PHC 문자열입니다.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| PasswordError::HashingFailed)
}

/// 저장된 해시와 입력된 비밀번호를 비교합니다.
pub fn verify_password(password: &str, hash: &str) -> Result<(), PasswordError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHashFormat)?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| PasswordError::VerificationFailed)
}

/// 비밀번호 강도 검증.
///
/// - 최소 8자 이상
/// - 최소 1개의 숫자 포함
/// - 최소 1개의 영문자 포함
pub fn validate_password_strength(password: &str) -> Result<(), &'static str> {
    if password.chars().count() < 8 {
        return Err("비밀번호는 최소 8자 이상이어야 합니다");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("비밀번호에 최소 1개의 숫자가 포함되어야 합니다");
    }
    if !password.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err("비밀번호에 최소 1개의 영문자가 포함되어야 합니다");
    }
    Ok(())
}

/// 관리자가 생성한 계정의 임시 비밀번호.
///
/// 영숫자 10자 뒤에 숫자와 영문자를 하나씩 붙여 강도 검증을 항상 통과합니다.
pub fn generate_temp_password() -> String {
    use rand::{distributions::Alphanumeric, Rng};

    let mut rng = rand::thread_rng();
    let mut password: String = (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect();
    password.push(char::from(b'0' + rng.gen_range(0..10)));
    password.push(char::from(b'a' + rng.gen_range(0..26)));
    password
}
