//! 알고리즘 일일 수익률 관리 endpoint (관리자).
//!
//! 쓰기 후에는 누적 수익률 캐시를 무효화하여 다음 명세서 계산이 새 값을 읽도록 합니다.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use fund_core::DailyReturn;
use fund_data::parse_returns_csv;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::auth::AdminAuth;
use crate::error::{bad_request, db_error, db_unavailable, ApiResult};
use crate::metrics::record_returns_imported;
use crate::state::AppState;

/// 하루치 수익률 upsert 요청.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpsertReturnRequest {
    pub trade_date: NaiveDate,
    /// 일일 수익률 (%)
    pub daily_return_percent: Decimal,
    /// 누적 수익률 지수
    pub cumulative_return: Option<Decimal>,
}

impl From<UpsertReturnRequest> for DailyReturn {
    fn from(request: UpsertReturnRequest) -> Self {
        DailyReturn {
            trade_date: request.trade_date,
            daily_return_percent: request.daily_return_percent,
            cumulative_return: request.cumulative_return,
        }
    }
}

/// CSV 가져오기 결과.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ImportReturnsResponse {
    pub imported: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

/// 조회 기간.
#[derive(Debug, Deserialize, IntoParams)]
pub struct ReturnRangeQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// 저장된 일일 수익률 목록.
#[utoipa::path(
    get,
    path = "/api/v1/admin/returns",
    params(ReturnRangeQuery),
    responses(
        (status = 200, description = "일일 수익률 (날짜순)", body = Vec<DailyReturn>)
    ),
    security(("bearer_auth" = [])),
    tag = "returns"
)]
pub async fn list_returns(
    State(state): State<Arc<AppState>>,
    AdminAuth(_claims): AdminAuth,
    Query(query): Query<ReturnRangeQuery>,
) -> ApiResult<Json<Vec<DailyReturn>>> {
    let repo = state.returns.as_ref().ok_or_else(db_unavailable)?;
    let records = repo.list(query.from, query.to).await.map_err(db_error)?;
    Ok(Json(records.into_iter().map(DailyReturn::from).collect()))
}

/// 하루치 수익률 upsert (같은 날짜는 덮어씀).
#[utoipa::path(
    post,
    path = "/api/v1/admin/returns",
    request_body = UpsertReturnRequest,
    responses(
        (status = 200, description = "저장된 수익률", body = DailyReturn),
        (status = 400, description = "잘못된 값")
    ),
    security(("bearer_auth" = [])),
    tag = "returns"
)]
pub async fn upsert_return(
    State(state): State<Arc<AppState>>,
    AdminAuth(claims): AdminAuth,
    Json(request): Json<UpsertReturnRequest>,
) -> ApiResult<Json<DailyReturn>> {
    if request.daily_return_percent <= -Decimal::ONE_HUNDRED {
        return Err(bad_request("daily return must be greater than -100%"));
    }
    if request.cumulative_return.is_some_and(|c| c <= Decimal::ZERO) {
        return Err(bad_request("cumulative return must be positive"));
    }
    let repo = state.returns.as_ref().ok_or_else(db_unavailable)?;

    let row = DailyReturn::from(request);
    repo.upsert(&row, "admin").await.map_err(db_error)?;
    state.return_cache.invalidate().await;

    record_returns_imported("admin", 1);
    info!(
        trade_date = %row.trade_date,
        daily_return_percent = %row.daily_return_percent,
        admin = %claims.sub,
        "일일 수익률 수동 입력"
    );
    Ok(Json(row))
}

/// CSV 본문(`date,daily_return_percent,cumulative_return`) 가져오기.
#[utoipa::path(
    post,
    path = "/api/v1/admin/returns/import",
    request_body(content = String, content_type = "text/csv"),
    responses(
        (status = 200, description = "가져오기 결과", body = ImportReturnsResponse),
        (status = 400, description = "유효한 행 없음")
    ),
    security(("bearer_auth" = [])),
    tag = "returns"
)]
pub async fn import_returns(
    State(state): State<Arc<AppState>>,
    AdminAuth(claims): AdminAuth,
    body: String,
) -> ApiResult<Json<ImportReturnsResponse>> {
    let rows = parse_returns_csv(&body);
    if rows.is_empty() {
        warn!(bytes = body.len(), "CSV에 유효한 행이 없음");
        return Err(bad_request("no valid rows in CSV body"));
    }
    let repo = state.returns.as_ref().ok_or_else(db_unavailable)?;

    let imported = repo.import(&rows, "csv").await.map_err(db_error)?;
    state.return_cache.invalidate().await;

    record_returns_imported("csv", imported);
    let first_date = rows.iter().map(|r| r.trade_date).min();
    let last_date = rows.iter().map(|r| r.trade_date).max();
    info!(
        imported,
        first_date = ?first_date,
        last_date = ?last_date,
        admin = %claims.sub,
        "CSV 수익률 가져오기 완료"
    );

    Ok(Json(ImportReturnsResponse {
        imported,
        first_date,
        last_date,
    }))
}

/// 수익률 라우터 생성.
pub fn returns_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_returns).post(upsert_return))
        .route("/import", post(import_returns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::routes::test_support::{app, json, send_json, token};
    use crate::state::create_test_state;
    use crate::ApiErrorResponse;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn csv_request(body: &str, session: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/admin/returns/import")
            .header(header::CONTENT_TYPE, "text/csv")
            .header(header::AUTHORIZATION, format!("Bearer {}", session))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_import_rejects_empty_csv() {
        let session = token(Uuid::new_v4(), Role::Admin);
        let response = app(create_test_state())
            .oneshot(csv_request("date,daily_return_percent,cumulative_return\n", &session))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_import_without_database() {
        let session = token(Uuid::new_v4(), Role::Admin);
        let csv = "date,daily_return_percent,cumulative_return\n2024-07-01,0.5,1.005\n";
        let response = app(create_test_state())
            .oneshot(csv_request(csv, &session))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: ApiErrorResponse = json(response).await;
        assert_eq!(body.code, "DATABASE_ERROR");
    }

    #[tokio::test]
    async fn test_import_requires_admin() {
        let session = token(Uuid::new_v4(), Role::Client);
        let response = app(create_test_state())
            .oneshot(csv_request("2024-07-01,0.5,1.005\n", &session))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_upsert_rejects_total_loss() {
        let session = token(Uuid::new_v4(), Role::Admin);
        let response = app(create_test_state())
            .oneshot(send_json(
                "POST",
                "/api/v1/admin/returns",
                Some(&session),
                json!({"trade_date": "2024-07-01", "daily_return_percent": "-100"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
