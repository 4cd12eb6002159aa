//! 펀드 클라이언트 포털 REST API 서버.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - Axum 기반 REST API
//! - 비밀번호 + TOTP 2단계 인증, JWT 세션
//! - 입금/출금 신청 및 관리자 승인
//! - 성과 조회, 반기 명세서 데이터
//! - 고객 지원 티켓
//! - 헬스 체크, Prometheus 메트릭, OpenAPI 문서
//!
//! # 모듈 구성
//!
//! - [`state`]: 애플리케이션 공유 상태 (AppState)
//! - [`routes`]: REST API 엔드포인트
//! - [`auth`]: JWT 인증, 2FA, 권한 관리
//! - [`repository`]: 데이터베이스 접근
//! - [`metrics`]: Prometheus 메트릭 수집
//! - [`middleware`]: HTTP 미들웨어
//! - [`openapi`]: OpenAPI 문서 및 Swagger UI

pub mod auth;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod openapi;
pub mod repository;
pub mod routes;
pub mod state;

pub use auth::{hash_password, verify_password, Claims, JwtAuth, JwtAuthError, Role};
pub use error::{ApiErrorResponse, ApiResult};
pub use metrics::setup_metrics_recorder;
pub use middleware::metrics_layer;
pub use routes::*;
pub use state::AppState;

#[cfg(any(test, feature = "test-utils"))]
pub use state::{create_test_state, create_test_state_with};
