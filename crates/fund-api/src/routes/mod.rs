//! API 라우트.
//!
//! 모든 REST API 엔드포인트를 정의하고 라우터를 구성합니다.
//!
//! # 라우트 구조
//!
//! - `/health` - 헬스 체크 (liveness)
//! - `/health/ready` - 상세 헬스 체크 (readiness)
//! - `/api/v1/auth` - 로그인, 2단계 인증, 비밀번호 변경
//! - `/api/v1/profile` - 프로필 조회/수정
//! - `/api/v1/deposits` - 입금 신청/내역
//! - `/api/v1/withdrawals` - 출금 신청/내역
//! - `/api/v1/performance` - 계좌 요약 및 일별 성과
//! - `/api/v1/statements` - 반기 명세서 데이터
//! - `/api/v1/support` - 고객 지원 티켓
//! - `/api/v1/admin` - 관리자 (클라이언트, 승인, 재계산, 수익률 가져오기)

pub mod admin;
pub mod auth;
pub mod deposits;
pub mod health;
pub mod performance;
pub mod profile;
pub mod returns;
pub mod statements;
pub mod support;
pub mod withdrawals;

pub use admin::{admin_router, ClientCreatedResponse, CreateClientRequest, LiveTradingRequest};
pub use auth::{auth_router, LoginRequest, LoginResponse, SessionUser};
pub use deposits::{deposits_router, DepositRequest};
pub use health::{health_router, ComponentHealth, ComponentStatus, HealthResponse};
pub use performance::{performance_router, PerformanceResponse};
pub use profile::profile_router;
pub use returns::{returns_router, ImportReturnsResponse, UpsertReturnRequest};
pub use statements::{statements_router, StatementResponse, StatementSummary};
pub use support::{support_router, CreateTicketRequest, PostMessageRequest, TicketDetailResponse};
pub use withdrawals::{withdrawals_router, WithdrawalRequest};

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// 전체 API 라우터 생성.
///
/// 모든 서브 라우터를 조합하여 하나의 라우터로 반환합니다.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        // 헬스 체크 엔드포인트
        .nest("/health", health_router())
        // API v1 엔드포인트
        .nest("/api/v1/auth", auth_router())
        .nest("/api/v1/profile", profile_router())
        .nest("/api/v1/deposits", deposits_router())
        .nest("/api/v1/withdrawals", withdrawals_router())
        .nest("/api/v1/performance", performance_router())
        .nest("/api/v1/statements", statements_router())
        .nest("/api/v1/support", support_router())
        .nest("/api/v1/admin", admin_router())
        .nest("/api/v1/admin/returns", returns_router())
}

/// 라우트 테스트 공용 헬퍼.
#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, Response};
    use axum::{Extension, Router};
    use serde::de::DeserializeOwned;
    use uuid::Uuid;

    use crate::auth::{create_token, Claims, JwtConfig, Role, DEV_JWT_SECRET};
    use crate::state::AppState;

    /// 전체 라우터 + JWT 설정.
    pub fn app(state: AppState) -> Router {
        super::create_api_router()
            .layer(Extension(JwtConfig::new(DEV_JWT_SECRET)))
            .with_state(Arc::new(state))
    }

    /// 역할별 세션 토큰.
    pub fn token(user_id: Uuid, role: Role) -> String {
        let claims = Claims::new(user_id, "user@example.com", role, 60);
        create_token(&claims, DEV_JWT_SECRET).unwrap()
    }

    pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    pub fn send_json(
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: serde_json::Value,
    ) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    pub async fn json<T: DeserializeOwned>(response: Response<Body>) -> T {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }
}
