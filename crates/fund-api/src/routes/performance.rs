//! 성과 조회 endpoint.
//!
//! 계좌 요약과 저장된 일별 성과 기록을 반환합니다. 값은 재계산 결과를
//! 그대로 읽기만 합니다.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use fund_core::{AccrualStore, ClientAccount, DailyPerformanceRecord};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

use crate::auth::JwtAuth;
use crate::error::{bad_request, forbidden, fund_error, not_found, ApiResult};
use crate::state::AppState;

/// 성과 조회 기간.
#[derive(Debug, Deserialize, IntoParams)]
pub struct PerformanceQuery {
    /// 시작일 (포함)
    pub from: Option<NaiveDate>,
    /// 종료일 (포함)
    pub to: Option<NaiveDate>,
}

/// 성과 응답.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PerformanceResponse {
    pub account: ClientAccount,
    pub records: Vec<DailyPerformanceRecord>,
}

/// 계좌 요약과 일별 성과.
#[utoipa::path(
    get,
    path = "/api/v1/performance",
    params(PerformanceQuery),
    responses(
        (status = 200, description = "성과 조회 성공", body = PerformanceResponse),
        (status = 400, description = "잘못된 기간"),
        (status = 401, description = "인증 필요"),
        (status = 404, description = "계좌 없음")
    ),
    security(("bearer_auth" = [])),
    tag = "performance"
)]
pub async fn get_performance(
    State(state): State<Arc<AppState>>,
    JwtAuth(claims): JwtAuth,
    Query(query): Query<PerformanceQuery>,
) -> ApiResult<Json<PerformanceResponse>> {
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(bad_request(format!("from {} is after to {}", from, to)));
        }
    }
    let client_id = claims
        .user_id()
        .ok_or_else(|| forbidden("invalid user"))?;
    debug!(client_id = %client_id, ?query, "GET /performance");

    let store = state.scheduler.store();
    let account = store
        .load_account(client_id)
        .await
        .map_err(fund_error)?
        .ok_or_else(|| not_found("Account not found"))?;
    let records = store
        .performance_range(client_id, query.from, query.to)
        .await
        .map_err(fund_error)?;

    Ok(Json(PerformanceResponse { account, records }))
}

/// 성과 라우터 생성.
pub fn performance_router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(get_performance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::routes::test_support::{app, get as get_req, json, token};
    use crate::state::create_test_state_with;
    use axum::http::StatusCode;
    use fund_core::{Deposit, DepositStatus, MemoryAccrualStore, ReturnSeries};
    use rust_decimal_macros::dec;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// 2024-07-01 입금 1000, 7/2 +1%, 7/3 -0.5%.
    fn seeded_client() -> (Arc<MemoryAccrualStore>, Uuid) {
        let store = Arc::new(MemoryAccrualStore::new());
        let client_id = Uuid::new_v4();
        store.insert_account(ClientAccount::new(client_id));
        store.insert_deposit(Deposit::new(
            client_id,
            dec!(1000),
            date(2024, 7, 1),
            DepositStatus::Completed,
        ));
        store.set_series(ReturnSeries::with_daily([
            (date(2024, 7, 2), dec!(1.0)),
            (date(2024, 7, 3), dec!(-0.5)),
        ]));
        (store, client_id)
    }

    #[tokio::test]
    async fn test_performance_returns_trajectory() {
        let (store, client_id) = seeded_client();
        let state = create_test_state_with(store);
        state.scheduler.recompute_one(client_id).await.unwrap();

        let response = app(state)
            .oneshot(get_req(
                "/api/v1/performance?from=2024-07-02&to=2024-07-03",
                Some(&token(client_id, Role::Client)),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: PerformanceResponse = json(response).await;
        assert_eq!(body.records.len(), 2);
        assert_eq!(body.records[0].trade_date, date(2024, 7, 2));
        assert_eq!(body.records[0].closing_balance, dec!(1010));
        assert_eq!(body.records[1].closing_balance, dec!(1004.95));
        assert_eq!(body.account.current_balance, dec!(1004.95));
    }

    #[tokio::test]
    async fn test_performance_rejects_inverted_range() {
        let (store, client_id) = seeded_client();
        let response = app(create_test_state_with(store))
            .oneshot(get_req(
                "/api/v1/performance?from=2024-07-05&to=2024-07-01",
                Some(&token(client_id, Role::Client)),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_performance_unknown_account() {
        let store = Arc::new(MemoryAccrualStore::new());
        let response = app(create_test_state_with(store))
            .oneshot(get_req(
                "/api/v1/performance",
                Some(&token(Uuid::new_v4(), Role::Client)),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
