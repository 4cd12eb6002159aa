//! JWT 토큰 처리.
//!
//! 세션 토큰과 2FA 대기(challenge) 토큰 생성/검증 로직.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Role;

/// JWT 페이로드.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - 사용자 ID
    pub sub: String,
    /// 사용자 이메일
    pub email: String,
    /// 사용자 역할
    pub role: Role,
    /// Issued At - 토큰 발급 시간 (Unix timestamp)
    pub iat: i64,
    /// Expiration - 토큰 만료 시간 (Unix timestamp)
    pub exp: i64,
    /// JWT ID - 토큰 고유 식별자
    pub jti: String,
    /// 2FA 코드 확인 전 발급된 대기 토큰 여부
    #[serde(default)]
    pub mfa_pending: bool,
}

impl Claims {
    /// 세션 토큰용 Claims 생성.
    ///
    /// # Arguments
    ///
    /// * `user_id` - 사용자 ID
    /// * `email` - 사용자 이메일
    /// * `role` - 사용자 역할
    /// * `expires_in_minutes` - 만료 시간 (분)
    pub fn new(user_id: Uuid, email: impl Into<String>, role: Role, expires_in_minutes: i64) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            email: email.into(),
            role,
            iat: now.timestamp(),
            exp: (now + Duration::minutes(expires_in_minutes)).timestamp(),
            jti: Uuid::new_v4().to_string(),
            mfa_pending: false,
        }
    }

    /// 2FA 대기 토큰용 Claims 생성.
    pub fn challenge(user_id: Uuid, email: impl Into<String>, role: Role, expires_in_minutes: i64) -> Self {
        Self {
            mfa_pending: true,
            ..Self::new(user_id, email, role, expires_in_minutes)
        }
    }

    /// 사용자 ID.
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }

    /// 관리자 여부.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// JWT 토큰 에러.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("토큰 인코딩 실패: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),
    #[error("토큰 디코딩 실패")]
    DecodingError,
    #[error("토큰이 만료되었습니다")]
    TokenExpired,
    #[error("잘못된 토큰 형식")]
    InvalidToken,
}

/// 토큰 생성 (HS256).
pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(JwtError::from)
}

/// 토큰 디코딩 및 검증.
pub fn decode_token(token: &str, secret: &str) -> Result<TokenData<Claims>, JwtError> {
    let mut validation = Validation::default();
    validation.validate_exp = true;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::TokenExpired,
        jsonwebtoken::errors::ErrorKind::InvalidToken => JwtError::InvalidToken,
        _ => JwtError::DecodingError,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "test-secret-key-for-jwt-testing-minimum-32-chars";

    #[test]
    fn test_create_and_decode_token() {
        let user_id = Uuid::new_v4();
        let claims = Claims::new(user_id, "client@example.com", Role::Client, 60);

        let token = create_token(&claims, TEST_SECRET).unwrap();
        let decoded = decode_token(&token, TEST_SECRET).unwrap();

        assert_eq!(decoded.claims.user_id(), Some(user_id));
        assert_eq!(decoded.claims.email, "client@example.com");
        assert_eq!(decoded.claims.role, Role::Client);
        assert!(!decoded.claims.mfa_pending);
    }

    #[test]
    fn test_challenge_token_is_pending() {
        let claims = Claims::challenge(Uuid::new_v4(), "a@b.c", Role::Admin, 5);
        let token = create_token(&claims, TEST_SECRET).unwrap();
        let decoded = decode_token(&token, TEST_SECRET).unwrap();
        assert!(decoded.claims.mfa_pending);
        assert!(decoded.claims.exp - decoded.claims.iat <= 5 * 60);
    }

    #[test]
    fn test_expired_token() {
        let claims = Claims::new(Uuid::new_v4(), "a@b.c", Role::Client, -10);
        let token = create_token(&claims, TEST_SECRET).unwrap();
        assert!(matches!(
            decode_token(&token, TEST_SECRET),
            Err(JwtError::TokenExpired)
        ));
    }

    #[test]
    fn test_wrong_secret() {
        let claims = Claims::new(Uuid::new_v4(), "a@b.c", Role::Client, 60);
        let token = create_token(&claims, TEST_SECRET).unwrap();
        assert!(decode_token(&token, "wrong-secret-key-for-testing-minimum-32-chars").is_err());
    }
}
