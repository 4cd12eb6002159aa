//! 헬스 체크 endpoint.
//!
//! 로드밸런서나 오케스트레이션 시스템에서 사용하는 liveness/readiness 엔드포인트입니다.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::state::AppState;

/// 헬스 체크 응답 구조체.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// 전체 서비스 상태 ("healthy" | "degraded")
    pub status: String,

    /// API 버전
    pub version: String,

    /// 서버 업타임(초)
    pub uptime_secs: i64,

    /// 현재 시간 (ISO 8601)
    pub timestamp: String,

    /// 개별 컴포넌트 상태
    pub components: ComponentHealth,
}

/// 개별 컴포넌트 상태.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ComponentHealth {
    /// 데이터베이스 연결 상태
    pub database: ComponentStatus,

    /// 누적 수익률 테이블
    pub return_table: ComponentStatus,

    /// 재계산 스케줄러 기준일
    pub scheduler: ComponentStatus,
}

/// 컴포넌트 상태.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ComponentStatus {
    /// 상태 ("up" | "down" | "not_configured")
    pub status: String,

    /// 추가 정보 (선택적)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentStatus {
    /// 정상 상태.
    pub fn up() -> Self {
        Self {
            status: "up".to_string(),
            message: None,
        }
    }

    /// 비정상 상태.
    pub fn down(message: impl Into<String>) -> Self {
        Self {
            status: "down".to_string(),
            message: Some(message.into()),
        }
    }

    /// 미설정 상태.
    pub fn not_configured() -> Self {
        Self {
            status: "not_configured".to_string(),
            message: None,
        }
    }

    /// 정보 포함 정상 상태.
    pub fn up_with_info(message: impl Into<String>) -> Self {
        Self {
            status: "up".to_string(),
            message: Some(message.into()),
        }
    }
}

/// 간단한 헬스 체크 (liveness probe용).
///
/// GET /health
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "서버 응답 가능")),
    tag = "health"
)]
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// 상세 헬스 체크 (readiness probe용).
///
/// GET /health/ready
#[utoipa::path(
    get,
    path = "/health/ready",
    responses(
        (status = 200, description = "모든 의존성 정상", body = HealthResponse),
        (status = 503, description = "데이터베이스 연결 실패", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut overall_status = "healthy";
    let mut status_code = StatusCode::OK;

    // 데이터베이스 상태 확인
    let database_status = if state.db_pool.is_some() {
        if state.is_db_healthy().await {
            ComponentStatus::up()
        } else {
            overall_status = "degraded";
            status_code = StatusCode::SERVICE_UNAVAILABLE;
            ComponentStatus::down("연결 실패")
        }
    } else {
        ComponentStatus::not_configured()
    };

    // 수익률 테이블은 비어 있어도 서비스는 가능 (명세서 수치가 원금 그대로 나옴)
    let table = state.return_cache.get().await;
    let return_table = match table.latest_date() {
        Some(latest) => {
            ComponentStatus::up_with_info(format!("{} days, latest {}", table.len(), latest))
        }
        None => {
            if overall_status == "healthy" {
                overall_status = "degraded";
            }
            ComponentStatus::down("수익률 데이터 없음")
        }
    };

    let scheduler = ComponentStatus::up_with_info(format!(
        "today {}",
        state.scheduler.today()
    ));

    let response = HealthResponse {
        status: overall_status.to_string(),
        version: state.version.clone(),
        uptime_secs: state.uptime_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        components: ComponentHealth {
            database: database_status,
            return_table,
            scheduler,
        },
    };

    (status_code, Json(response))
}

/// 헬스 체크 라우터 생성.
pub fn health_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(health_ready))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use chrono::NaiveDate;
    use fund_core::{MemoryAccrualStore, ReturnSeries};
    use rust_decimal_macros::dec;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_check_returns_ok() {
        let app = Router::new().route("/health", get(health_check));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ready_degraded_without_returns() {
        use crate::state::create_test_state;

        let state = Arc::new(create_test_state());
        let app = Router::new()
            .route("/health/ready", get(health_ready))
            .with_state(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health/ready")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();

        assert_eq!(health.status, "degraded");
        assert_eq!(health.components.database.status, "not_configured");
        assert_eq!(health.components.return_table.status, "down");
        assert!(!health.version.is_empty());
    }

    #[tokio::test]
    async fn test_health_ready_with_returns() {
        use crate::state::create_test_state_with;

        let store = Arc::new(MemoryAccrualStore::new());
        store.set_series(ReturnSeries::with_daily([(
            NaiveDate::from_ymd_opt(2024, 7, 9).unwrap(),
            dec!(0.5),
        )]));
        let app = Router::new()
            .route("/health/ready", get(health_ready))
            .with_state(Arc::new(create_test_state_with(store)));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health/ready")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();

        assert_eq!(health.status, "healthy");
        assert_eq!(health.components.return_table.status, "up");
        assert!(health
            .components
            .return_table
            .message
            .unwrap()
            .contains("2024-07-09"));
        assert_eq!(
            health.components.scheduler.message.as_deref(),
            Some("today 2024-07-10")
        );
    }

    #[test]
    fn test_component_status_variants() {
        let up = ComponentStatus::up();
        assert_eq!(up.status, "up");
        assert!(up.message.is_none());

        let down = ComponentStatus::down("error");
        assert_eq!(down.status, "down");
        assert_eq!(down.message, Some("error".to_string()));

        let not_configured = ComponentStatus::not_configured();
        assert_eq!(not_configured.status, "not_configured");
    }
}
