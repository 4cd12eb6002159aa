//! Axum용 JWT 인증 추출기.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use super::{decode_token, Claims, JwtError, Role};
use crate::error::ApiErrorResponse;

/// 개발/테스트 환경용 기본 시크릿.
pub const DEV_JWT_SECRET: &str = "development-secret-key-change-in-production";

/// JWT 인증 추출기.
///
/// 2FA 대기 토큰(`mfa_pending`)은 거부합니다.
///
/// ```rust,ignore
/// async fn protected_handler(JwtAuth(claims): JwtAuth) -> impl IntoResponse {
///     format!("Authenticated user: {}", claims.email)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct JwtAuth(pub Claims);

impl JwtAuth {
    /// 인증된 사용자 ID.
    pub fn user_id(&self) -> Result<Uuid, JwtAuthError> {
        self.0.user_id().ok_or(JwtAuthError::InvalidToken)
    }
}

/// JWT 인증 에러.
#[derive(Debug, thiserror::Error)]
pub enum JwtAuthError {
    #[error("인증 토큰이 필요합니다")]
    MissingToken,
    #[error("잘못된 Authorization 헤더 형식")]
    InvalidAuthHeader,
    #[error("토큰이 만료되었습니다")]
    TokenExpired,
    #[error("유효하지 않은 토큰")]
    InvalidToken,
    #[error("2단계 인증이 완료되지 않았습니다")]
    MfaPending,
    #[error("권한이 부족합니다")]
    InsufficientPermission,
}

impl IntoResponse for JwtAuthError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            JwtAuthError::MissingToken => (StatusCode::UNAUTHORIZED, "MISSING_TOKEN"),
            JwtAuthError::InvalidAuthHeader => (StatusCode::UNAUTHORIZED, "INVALID_AUTH_HEADER"),
            JwtAuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED"),
            JwtAuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
            JwtAuthError::MfaPending => (StatusCode::UNAUTHORIZED, "MFA_REQUIRED"),
            JwtAuthError::InsufficientPermission => {
                (StatusCode::FORBIDDEN, "INSUFFICIENT_PERMISSION")
            }
        };

        (status, Json(ApiErrorResponse::new(code, self.to_string()))).into_response()
    }
}

/// JWT 비밀 키 저장소.
///
/// 요청 extensions에 넣어 추출기에서 사용합니다.
#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
}

impl JwtConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// 환경 변수 `JWT_SECRET` 또는 개발용 기본값.
    pub fn from_env() -> Self {
        Self::new(std::env::var("JWT_SECRET").unwrap_or_else(|_| DEV_JWT_SECRET.to_string()))
    }
}

impl<S> FromRequestParts<S> for JwtAuth
where
    S: Send + Sync,
{
    type Rejection = JwtAuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(JwtAuthError::MissingToken)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(JwtAuthError::InvalidAuthHeader)?;

        let secret = parts
            .extensions
            .get::<JwtConfig>()
            .cloned()
            .unwrap_or_else(JwtConfig::from_env)
            .secret;

        let token_data = decode_token(token, &secret).map_err(|e| match e {
            JwtError::TokenExpired => JwtAuthError::TokenExpired,
            _ => JwtAuthError::InvalidToken,
        })?;

        if token_data.claims.mfa_pending {
            return Err(JwtAuthError::MfaPending);
        }

        Ok(JwtAuth(token_data.claims))
    }
}

/// 특정 역할 이상의 권한을 요구합니다.
pub fn require_role(required_role: Role, claims: &Claims) -> Result<(), JwtAuthError> {
    if claims.role.level() >= required_role.level() {
        Ok(())
    } else {
        Err(JwtAuthError::InsufficientPermission)
    }
}

/// Admin 권한을 요구하는 추출기.
#[derive(Debug, Clone)]
pub struct AdminAuth(pub Claims);

impl<S> FromRequestParts<S> for AdminAuth
where
    S: Send + Sync,
{
    type Rejection = JwtAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let JwtAuth(claims) = JwtAuth::from_request_parts(parts, state).await?;
        require_role(Role::Admin, &claims)?;
        Ok(AdminAuth(claims))
    }
}
