//! OpenAPI 문서화 설정.
//!
//! utoipa를 사용하여 REST API의 OpenAPI 3.0 스펙을 생성합니다.
//! Swagger UI는 `/swagger-ui` 경로에서 사용 가능합니다.
//!
//! 새로운 엔드포인트를 추가할 때:
//!
//! 1. 응답/요청 타입에 `#[derive(ToSchema)]` 추가
//! 2. 핸들러에 `#[utoipa::path(...)]` 어노테이션 추가
//! 3. 이 파일의 `paths(...)` 섹션에 추가 (참조된 스키마는 자동 등록)

use axum::Router;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

// ==================== 각 모듈에서 스키마 Import ====================

use crate::error::ApiErrorResponse;
use crate::routes::{
    // Health 모듈
    ComponentHealth,
    ComponentStatus,
    HealthResponse,
    // Auth 모듈
    LoginRequest,
    LoginResponse,
    SessionUser,
    // 명세서 모듈
    StatementResponse,
    StatementSummary,
    // 지원 모듈
    TicketDetailResponse,
};

// ==================== 보안 스키마 ====================

/// `bearer_auth` JWT 스키마 등록.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                Http::builder()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

// ==================== OpenAPI 문서 정의 ====================

/// Fund Portal API 문서.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Fund Portal API",
        version = "0.1.0",
        description = r#"
# 펀드 클라이언트 포털 REST API

클라이언트 계좌, 입출금, 명세서, 고객 지원을 위한 REST API입니다.

## 주요 기능

- **인증**: 비밀번호 + TOTP 2단계 인증, 백업 코드
- **입출금**: 입금/출금 신청과 관리자 승인
- **성과**: 일별 잔고 궤적과 계좌 요약
- **명세서**: 반기 명세서 데이터 (1월 5일 / 7월 5일 발급)
- **관리자**: 클라이언트 관리, 재계산, 수익률 가져오기

## 인증

대부분의 엔드포인트는 JWT Bearer 토큰 인증이 필요합니다.
`Authorization: Bearer <token>` 헤더를 포함하세요.
"#
    ),
    servers(
        (url = "http://localhost:3000", description = "로컬 개발 서버"),
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "헬스 체크 - 서버 상태 확인"),
        (name = "auth", description = "인증 - 로그인, 2단계 인증, 비밀번호"),
        (name = "profile", description = "프로필 - 개인 정보 조회/수정"),
        (name = "deposits", description = "입금 - 신청 및 내역"),
        (name = "withdrawals", description = "출금 - 신청 및 내역"),
        (name = "performance", description = "성과 - 계좌 요약 및 일별 잔고"),
        (name = "statements", description = "명세서 - 반기 명세서 데이터"),
        (name = "support", description = "지원 - 고객 지원 티켓"),
        (name = "admin", description = "관리자 - 클라이언트, 승인, 재계산"),
        (name = "returns", description = "수익률 - 알고리즘 일일 수익률 관리")
    ),
    // ==================== 스키마 등록 ====================
    components(
        schemas(
            // ===== Common =====
            ApiErrorResponse,

            // ===== Health =====
            HealthResponse,
            ComponentHealth,
            ComponentStatus,

            // ===== Auth =====
            LoginRequest,
            LoginResponse,
            SessionUser,

            // ===== Statements =====
            StatementSummary,
            StatementResponse,

            // ===== Support =====
            TicketDetailResponse,
        )
    ),
    // ==================== 경로 등록 ====================
    paths(
        // ===== Health =====
        crate::routes::health::health_check,
        crate::routes::health::health_ready,

        // ===== Auth =====
        crate::routes::auth::login,
        crate::routes::auth::two_factor_login,
        crate::routes::auth::two_factor_setup,
        crate::routes::auth::two_factor_verify_setup,
        crate::routes::auth::two_factor_complete_setup,
        crate::routes::auth::me,
        crate::routes::auth::change_password,

        // ===== Profile =====
        crate::routes::profile::get_profile,
        crate::routes::profile::update_profile,

        // ===== Deposits / Withdrawals =====
        crate::routes::deposits::request_deposit,
        crate::routes::deposits::list_my_deposits,
        crate::routes::withdrawals::request_withdrawal,
        crate::routes::withdrawals::list_my_withdrawals,

        // ===== Performance / Statements =====
        crate::routes::performance::get_performance,
        crate::routes::statements::list_statements,
        crate::routes::statements::get_statement,

        // ===== Support =====
        crate::routes::support::create_ticket,
        crate::routes::support::list_tickets,
        crate::routes::support::get_ticket,
        crate::routes::support::post_message,
        crate::routes::support::mark_read,
        crate::routes::support::close_ticket,

        // ===== Admin =====
        crate::routes::admin::list_clients,
        crate::routes::admin::create_client,
        crate::routes::admin::set_live_trading,
        crate::routes::admin::recompute_client,
        crate::routes::admin::recompute_all,
        crate::routes::admin::run_nightly,
        crate::routes::admin::get_stats,
        crate::routes::admin::list_deposits,
        crate::routes::admin::record_deposit,
        crate::routes::admin::update_deposit_status,
        crate::routes::admin::list_withdrawals,
        crate::routes::admin::update_withdrawal_status,

        // ===== Returns =====
        crate::routes::returns::list_returns,
        crate::routes::returns::upsert_return,
        crate::routes::returns::import_returns,
    )
)]
pub struct ApiDoc;

// ==================== Swagger UI 라우터 ====================

/// Swagger UI 라우터 생성.
///
/// 다음 경로에 문서 UI를 마운트합니다:
/// - `/swagger-ui` - Swagger UI 대화형 문서
/// - `/api-docs/openapi.json` - OpenAPI JSON 스펙
pub fn swagger_ui_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}

// ==================== 테스트 ====================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_valid() {
        let spec = ApiDoc::openapi();
        let json = serde_json::to_string_pretty(&spec).unwrap();

        assert!(json.contains("Fund Portal API"));

        // 태그 확인
        assert!(json.contains("statements"));
        assert!(json.contains("support"));

        // 경로 확인
        assert!(json.contains("/health/ready"));
        assert!(json.contains("/api/v1/auth/2fa/login"));
        assert!(json.contains("/api/v1/statements/{id}"));
        assert!(json.contains("/api/v1/admin/recompute-all"));
        assert!(json.contains("/api/v1/admin/returns/import"));
    }

    #[test]
    fn test_bearer_scheme_registered() {
        let spec = ApiDoc::openapi();
        let schemes = spec
            .components
            .as_ref()
            .map(|c| c.security_schemes.contains_key("bearer_auth"))
            .unwrap_or(false);
        assert!(schemes);
    }

    #[test]
    fn test_swagger_ui_router_creates() {
        let _router: Router<()> = swagger_ui_router();
    }

    #[test]
    fn test_openapi_contains_schemas() {
        let spec = ApiDoc::openapi();
        let json = serde_json::to_string(&spec).unwrap();

        assert!(json.contains("HealthResponse"));
        assert!(json.contains("StatementResponse"));
        assert!(json.contains("StatementSummary"));
        assert!(json.contains("ApiErrorResponse"));
    }
}
