//! 반기 명세서 endpoint.
//!
//! 명세서 수치는 요청 시점마다 누적 수익률 테이블(캐시)과 입금 원장으로 계산합니다.
//! PDF 렌더링은 외부 렌더러가 담당하고, 여기서는 JSON 데이터만 제공합니다.
//!
//! # 엔드포인트
//!
//! - `GET /api/v1/statements` - 발급 가능한 기간 목록 (최근 기간부터)
//! - `GET /api/v1/statements/{id}` - 기간 명세서 수치 (`H1-2024` 형식)
//!
//! 관리자는 `?client_id=`로 다른 클라이언트의 명세서를 조회할 수 있습니다.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use fund_core::{
    AccrualStore, DepositLedger, StatementCalculator, StatementFigures, StatementPeriod,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{Claims, JwtAuth};
use crate::error::{forbidden, fund_error, ApiResult};
use crate::state::AppState;

/// 조회 대상 클라이언트 (관리자 전용).
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct StatementQuery {
    pub client_id: Option<Uuid>,
}

/// 기간 메타데이터.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatementSummary {
    /// 기간 ID (예: `H1-2024`)
    pub id: String,
    /// 표시용 레이블 (예: `January - June 2024`)
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// 발급 가능일
    pub available_from: Option<NaiveDate>,
}

impl StatementSummary {
    fn new(period: &StatementPeriod, state: &AppState) -> Self {
        Self {
            id: period.id(),
            label: period.label(),
            start: period.start,
            end: period.end,
            available_from: period.grace_date(&state.grace_policy()),
        }
    }
}

/// 명세서 데이터.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatementResponse {
    pub client_id: Uuid,
    #[serde(flatten)]
    pub period: StatementSummary,
    /// 발행일 (생성 시점)
    pub issue_date: NaiveDate,
    #[serde(flatten)]
    pub figures: StatementFigures,
}

fn target_client(claims: &Claims, query: &StatementQuery) -> ApiResult<Uuid> {
    match query.client_id {
        Some(id) if claims.is_admin() => Ok(id),
        Some(_) => Err(forbidden("Admin access required")),
        None => claims.user_id().ok_or_else(|| forbidden("invalid user")),
    }
}

async fn load_ledger(state: &AppState, client_id: Uuid) -> ApiResult<DepositLedger> {
    let deposits = state
        .scheduler
        .store()
        .load_deposits(client_id)
        .await
        .map_err(fund_error)?;
    DepositLedger::from_unsorted(deposits).map_err(fund_error)
}

/// 발급 가능한 명세서 기간 목록.
#[utoipa::path(
    get,
    path = "/api/v1/statements",
    params(StatementQuery),
    responses(
        (status = 200, description = "발급 가능한 기간 (최근순)", body = Vec<StatementSummary>),
        (status = 401, description = "인증 필요"),
        (status = 403, description = "다른 클라이언트 조회 권한 없음")
    ),
    security(("bearer_auth" = [])),
    tag = "statements"
)]
pub async fn list_statements(
    State(state): State<Arc<AppState>>,
    JwtAuth(claims): JwtAuth,
    Query(query): Query<StatementQuery>,
) -> ApiResult<Json<Vec<StatementSummary>>> {
    let client_id = target_client(&claims, &query)?;
    let ledger = load_ledger(&state, client_id).await?;

    let periods = StatementPeriod::eligible_periods(&ledger, state.today(), &state.grace_policy())
        .map_err(fund_error)?;
    debug!(client_id = %client_id, count = periods.len(), "발급 가능 명세서 조회");

    Ok(Json(
        periods
            .iter()
            .map(|p| StatementSummary::new(p, &state))
            .collect(),
    ))
}

/// 기간 명세서 수치.
#[utoipa::path(
    get,
    path = "/api/v1/statements/{id}",
    params(
        ("id" = String, Path, description = "기간 ID (예: H1-2024)"),
        StatementQuery
    ),
    responses(
        (status = 200, description = "명세서 수치", body = StatementResponse),
        (status = 400, description = "잘못된 기간 ID"),
        (status = 401, description = "인증 필요"),
        (status = 404, description = "발급 불가 기간")
    ),
    security(("bearer_auth" = [])),
    tag = "statements"
)]
pub async fn get_statement(
    State(state): State<Arc<AppState>>,
    JwtAuth(claims): JwtAuth,
    Path(id): Path<String>,
    Query(query): Query<StatementQuery>,
) -> ApiResult<Json<StatementResponse>> {
    let client_id = target_client(&claims, &query)?;
    let period = StatementPeriod::parse(&id).map_err(fund_error)?;
    let ledger = load_ledger(&state, client_id).await?;
    let series = state.return_cache.get().await;
    let today = state.today();

    let figures = StatementCalculator
        .calculate_for_period(&ledger, &series, &period, today, &state.grace_policy())
        .map_err(fund_error)?;

    info!(
        client_id = %client_id,
        period = %period,
        end_balance = %figures.end_balance,
        "명세서 생성"
    );

    Ok(Json(StatementResponse {
        client_id,
        period: StatementSummary::new(&period, &state),
        issue_date: today,
        figures,
    }))
}

/// 명세서 라우터 생성.
pub fn statements_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_statements))
        .route("/{id}", get(get_statement))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::routes::test_support::{app, get as get_req, json, token};
    use crate::state::create_test_state_with;
    use crate::ApiErrorResponse;
    use axum::http::StatusCode;
    use fund_core::{ClientAccount, Deposit, DepositStatus, MemoryAccrualStore, ReturnSeries};
    use rust_decimal_macros::dec;
    use tower::ServiceExt;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// 2024-01-02 입금 10000, 2024-03-01 입금 5000.
    /// 누적 지수: 1/1 1.0, 1/2 1.0, 3/1 1.05, 6/28 1.10
    fn seeded_store() -> (Arc<MemoryAccrualStore>, Uuid) {
        let store = Arc::new(MemoryAccrualStore::new());
        let client_id = Uuid::new_v4();
        store.insert_account(ClientAccount::new(client_id));
        store.insert_deposit(Deposit::new(
            client_id,
            dec!(10000),
            date(2024, 1, 2),
            DepositStatus::Completed,
        ));
        store.insert_deposit(Deposit::new(
            client_id,
            dec!(5000),
            date(2024, 3, 1),
            DepositStatus::Completed,
        ));

        let mut series = ReturnSeries::new();
        for (d, cum) in [
            (date(2024, 1, 1), dec!(1.0)),
            (date(2024, 1, 2), dec!(1.0)),
            (date(2024, 3, 1), dec!(1.05)),
            (date(2024, 6, 28), dec!(1.10)),
        ] {
            series.insert_daily(d, dec!(0));
            series.insert_cumulative(d, cum);
        }
        store.set_series(series);
        (store, client_id)
    }

    #[tokio::test]
    async fn test_list_eligible_statements() {
        let (store, client_id) = seeded_store();
        // 오늘은 2024-07-10 → H1-2024만 발급 가능
        let response = app(create_test_state_with(store))
            .oneshot(get_req("/api/v1/statements", Some(&token(client_id, Role::Client))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let periods: Vec<StatementSummary> = json(response).await;
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].id, "H1-2024");
        assert_eq!(periods[0].label, "January - June 2024");
        assert_eq!(periods[0].available_from, Some(date(2024, 7, 5)));
    }

    #[tokio::test]
    async fn test_statement_figures() {
        let (store, client_id) = seeded_store();
        let response = app(create_test_state_with(store))
            .oneshot(get_req(
                "/api/v1/statements/H1-2024",
                Some(&token(client_id, Role::Client)),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let statement: StatementResponse = json(response).await;
        assert_eq!(statement.period.id, "H1-2024");
        assert_eq!(statement.issue_date, date(2024, 7, 10));
        assert_eq!(statement.figures.total_deposits, dec!(15000));
        // 1/2 입금은 기간 시작 이후 → 신규 입금
        assert_eq!(statement.figures.start_balance, dec!(0));
        assert_eq!(statement.figures.new_deposits, dec!(15000));
        // 10000 * 1.10/1.0 + 5000 * 1.10/1.05
        assert_eq!(
            statement.figures.end_balance.round_dp(2),
            dec!(16238.10)
        );
    }

    #[tokio::test]
    async fn test_statement_not_yet_available() {
        let (store, client_id) = seeded_store();
        let response = app(create_test_state_with(store))
            .oneshot(get_req(
                "/api/v1/statements/H2-2024",
                Some(&token(client_id, Role::Client)),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: ApiErrorResponse = json(response).await;
        assert_eq!(body.code, "NOT_ELIGIBLE");
        assert_eq!(body.message, "no statement available");
    }

    #[tokio::test]
    async fn test_statement_invalid_id() {
        let (store, client_id) = seeded_store();
        let response = app(create_test_state_with(store))
            .oneshot(get_req(
                "/api/v1/statements/Q3-2024",
                Some(&token(client_id, Role::Client)),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_client_cannot_read_other_client() {
        let (store, client_id) = seeded_store();
        let uri = format!("/api/v1/statements?client_id={}", client_id);

        let response = app(create_test_state_with(store.clone()))
            .oneshot(get_req(&uri, Some(&token(Uuid::new_v4(), Role::Client))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app(create_test_state_with(store))
            .oneshot(get_req(&uri, Some(&token(Uuid::new_v4(), Role::Admin))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
