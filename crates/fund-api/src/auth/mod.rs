//! 인증 및 권한 부여.
//!
//! 비밀번호 + TOTP 2단계 인증과 JWT 세션, 역할 기반 접근 제어를 제공합니다.
//!
//! # 구성 요소
//!
//! - [`Claims`]: JWT 페이로드 구조체 (`mfa_pending` 포함)
//! - [`Role`]: 사용자 역할 (Admin, Client)
//! - [`JwtAuth`] / [`AdminAuth`]: Axum 추출기
//! - [`totp`]: TOTP 비밀 키, 백업 코드
//! - [`LoginLimiter`]: 이메일별 로그인 실패 제한
//!
//! # 사용 예시
//!
//! ```rust,ignore
//! async fn protected_handler(
//!     JwtAuth(claims): JwtAuth,
//! ) -> impl IntoResponse {
//!     format!("Hello, {}!", claims.email)
//! }
//! ```

mod jwt;
mod login_limit;
mod middleware;
mod password;
mod roles;
pub mod totp;

pub use jwt::{create_token, decode_token, Claims, JwtError};
pub use login_limit::LoginLimiter;
pub use middleware::{require_role, AdminAuth, JwtAuth, JwtAuthError, JwtConfig, DEV_JWT_SECRET};
pub use password::{
    generate_temp_password, hash_password, validate_password_strength, verify_password,
    PasswordError,
};
pub use roles::Role;
