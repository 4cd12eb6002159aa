//! 관리자 endpoint.
//!
//! 모든 핸들러는 `AdminAuth`를 요구합니다.
//!
//! # 엔드포인트
//!
//! - `GET/POST /api/v1/admin/clients` - 클라이언트 목록/생성
//! - `PUT /api/v1/admin/clients/{id}/live-trading` - 실거래 전환
//! - `POST /api/v1/admin/clients/{id}/recompute` - 단일 클라이언트 전체 재계산
//! - `POST /api/v1/admin/recompute-all` - 전체 클라이언트 전체 재계산
//! - `POST /api/v1/admin/nightly?date=` - 야간 증분 계산
//! - `GET /api/v1/admin/stats` - 대시보드 통계
//! - `GET/POST /api/v1/admin/deposits`, `PUT /api/v1/admin/deposits/{id}/status`
//! - `GET /api/v1/admin/withdrawals`, `PUT /api/v1/admin/withdrawals/{id}/status`

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{Datelike, NaiveDate};
use fund_core::{AccrualOutcome, BatchReport, DepositStatus, NightlyReport};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::deposits::validate_positive_amount;
use crate::auth::{generate_temp_password, hash_password, AdminAuth, Claims, Role};
use crate::error::{
    api_error, bad_request, db_error, db_unavailable, forbidden, fund_error, not_found,
    validation_error, ApiError, ApiResult,
};
use crate::metrics::{record_deposit_transition, record_withdrawal_transition, set_open_tickets};
use crate::repository::{
    is_unique_violation, AdminStats, CompletedDepositInput, DepositRecord, DepositRepository,
    DepositWithClient, NewUser, StatsRepository, StatusChangeError, UserProfile, UserRepository,
    WithdrawalRecord, WithdrawalRepository, WithdrawalStatus, WithdrawalWithClient,
};
use crate::state::AppState;

// ==================== 요청/응답 타입 ====================

/// 클라이언트 생성 요청.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateClientRequest {
    #[validate(email(message = "유효한 이메일 주소가 아닙니다"))]
    pub email: String,
    #[validate(length(min = 1, max = 100, message = "이름은 1-100자여야 합니다"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "성은 1-100자여야 합니다"))]
    pub last_name: String,
}

/// 클라이언트 생성 결과. 임시 비밀번호는 이 응답에서만 확인할 수 있습니다.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClientCreatedResponse {
    pub client: UserProfile,
    pub temporary_password: String,
}

/// 실거래 전환 요청.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LiveTradingRequest {
    pub enabled: bool,
    /// 운용 시작일 (처음 활성화할 때만 적용, 기본값 오늘)
    pub inception_date: Option<NaiveDate>,
}

/// 재계산 결과 요약.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RecomputeResponse {
    pub client_id: Uuid,
    pub days: usize,
    pub final_balance: Decimal,
    pub total_deposits: Decimal,
    pub total_return_percent: Decimal,
}

impl RecomputeResponse {
    fn new(client_id: Uuid, outcome: &AccrualOutcome) -> Self {
        Self {
            client_id,
            days: outcome.trajectory.len(),
            final_balance: outcome.final_balance,
            total_deposits: outcome.total_deposits,
            total_return_percent: outcome.total_return_percent,
        }
    }
}

/// 야간 계산 날짜 (기본값 오늘).
#[derive(Debug, Deserialize, IntoParams)]
pub struct NightlyQuery {
    pub date: Option<NaiveDate>,
}

/// 상태 필터.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct StatusQuery {
    pub status: Option<String>,
}

/// 관리자 입금 기록 요청.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RecordDepositRequest {
    pub client_id: Uuid,
    #[validate(custom(function = "validate_positive_amount"))]
    pub amount: Decimal,
    pub deposit_date: NaiveDate,
    #[validate(length(min = 1, max = 50, message = "입금 목적은 1-50자여야 합니다"))]
    pub purpose: Option<String>,
    #[validate(length(max = 1000, message = "메모는 1000자 이하여야 합니다"))]
    pub admin_notes: Option<String>,
}

/// 입금 상태 변경 요청.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DepositStatusRequest {
    pub status: DepositStatus,
    pub admin_notes: Option<String>,
    /// 유효일 (반영 상태로 바뀔 때만 사용, 기본값 오늘)
    pub deposit_date: Option<NaiveDate>,
}

/// 출금 상태 변경 요청.
#[derive(Debug, Deserialize, ToSchema)]
pub struct WithdrawalStatusRequest {
    pub status: WithdrawalStatus,
    pub admin_notes: Option<String>,
}

// ==================== 헬퍼 ====================

fn admin_id(claims: &Claims) -> ApiResult<Uuid> {
    claims.user_id().ok_or_else(|| forbidden("invalid user"))
}

fn status_change_error(err: StatusChangeError) -> ApiError {
    match err {
        StatusChangeError::NotFound => not_found("Record not found"),
        StatusChangeError::InvalidTransition { .. } => {
            api_error(StatusCode::CONFLICT, "INVALID_TRANSITION", err.to_string())
        }
        StatusChangeError::Corrupt(_) => db_error(err),
        StatusChangeError::Database(e) => db_error(e),
    }
}

/// 입금 반영 후 재계산. 실패해도 입금 기록은 유지되고 다음 전체 재계산에서 반영됩니다.
async fn recompute_after_deposit(state: &AppState, client_id: Uuid) {
    if let Err(e) = state.scheduler.recompute_one(client_id).await {
        error!(client_id = %client_id, error = %e, "입금 반영 후 재계산 실패");
    }
}

// ==================== 클라이언트 ====================

/// 클라이언트 목록 (잔고 포함).
#[utoipa::path(
    get,
    path = "/api/v1/admin/clients",
    responses(
        (status = 200, description = "클라이언트 목록", body = Vec<UserProfile>),
        (status = 403, description = "관리자 권한 필요")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn list_clients(
    State(state): State<Arc<AppState>>,
    AdminAuth(_claims): AdminAuth,
) -> ApiResult<Json<Vec<UserProfile>>> {
    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;
    UserRepository::list_clients(pool)
        .await
        .map(Json)
        .map_err(db_error)
}

/// 클라이언트 생성 (임시 비밀번호, 2FA 설정 필요).
#[utoipa::path(
    post,
    path = "/api/v1/admin/clients",
    request_body = CreateClientRequest,
    responses(
        (status = 201, description = "클라이언트 생성", body = ClientCreatedResponse),
        (status = 400, description = "잘못된 요청"),
        (status = 409, description = "이메일 중복")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn create_client(
    State(state): State<Arc<AppState>>,
    AdminAuth(claims): AdminAuth,
    Json(request): Json<CreateClientRequest>,
) -> ApiResult<(StatusCode, Json<ClientCreatedResponse>)> {
    request.validate().map_err(validation_error)?;
    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;

    let temporary_password = generate_temp_password();
    let password_hash = hash_password(&temporary_password).map_err(|e| {
        error!(error = %e, "임시 비밀번호 해싱 실패");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "internal server error")
    })?;

    let new_user = NewUser {
        email: request.email,
        password_hash,
        first_name: request.first_name.trim().to_string(),
        last_name: request.last_name.trim().to_string(),
        role: Role::Client,
    };
    let client = match UserRepository::create(pool, &new_user).await {
        Ok(client) => client,
        Err(e) if is_unique_violation(&e) => {
            return Err(api_error(
                StatusCode::CONFLICT,
                "EMAIL_EXISTS",
                "A user with this email already exists",
            ));
        }
        Err(e) => return Err(db_error(e)),
    };

    info!(client_id = %client.id, admin = %claims.sub, "클라이언트 생성");
    Ok((
        StatusCode::CREATED,
        Json(ClientCreatedResponse {
            client,
            temporary_password,
        }),
    ))
}

/// 실거래 전환. 처음 활성화할 때 운용 시작일이 고정됩니다.
#[utoipa::path(
    put,
    path = "/api/v1/admin/clients/{id}/live-trading",
    params(("id" = Uuid, Path, description = "클라이언트 ID")),
    request_body = LiveTradingRequest,
    responses(
        (status = 200, description = "변경된 프로필", body = UserProfile),
        (status = 404, description = "클라이언트 없음")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn set_live_trading(
    State(state): State<Arc<AppState>>,
    AdminAuth(claims): AdminAuth,
    Path(id): Path<Uuid>,
    Json(request): Json<LiveTradingRequest>,
) -> ApiResult<Json<UserProfile>> {
    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;
    let inception = request
        .enabled
        .then(|| request.inception_date.unwrap_or_else(|| state.today()));

    let profile = UserRepository::set_live_trading(pool, id, request.enabled, inception)
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found("Client not found"))?;
    info!(
        client_id = %id,
        enabled = request.enabled,
        inception_date = ?profile.inception_date,
        admin = %claims.sub,
        "실거래 설정 변경"
    );

    if !request.enabled {
        return Ok(Json(profile));
    }

    state
        .scheduler
        .recompute_one(id)
        .await
        .map_err(fund_error)?;
    // 재계산 후 잔고를 다시 읽음
    UserRepository::get_profile(pool, id)
        .await
        .map_err(db_error)?
        .map(Json)
        .ok_or_else(|| not_found("Client not found"))
}

// ==================== 재계산 ====================

/// 단일 클라이언트 전체 재계산.
#[utoipa::path(
    post,
    path = "/api/v1/admin/clients/{id}/recompute",
    params(("id" = Uuid, Path, description = "클라이언트 ID")),
    responses(
        (status = 200, description = "재계산 결과", body = RecomputeResponse),
        (status = 400, description = "원장 오류"),
        (status = 404, description = "클라이언트 없음")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn recompute_client(
    State(state): State<Arc<AppState>>,
    AdminAuth(claims): AdminAuth,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RecomputeResponse>> {
    info!(client_id = %id, admin = %claims.sub, "수동 재계산 요청");
    let outcome = state
        .scheduler
        .recompute_one(id)
        .await
        .map_err(fund_error)?;
    Ok(Json(RecomputeResponse::new(id, &outcome)))
}

/// 반영 입금이 있는 모든 클라이언트 전체 재계산.
#[utoipa::path(
    post,
    path = "/api/v1/admin/recompute-all",
    responses(
        (status = 200, description = "클라이언트별 결과", body = BatchReport)
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn recompute_all(
    State(state): State<Arc<AppState>>,
    AdminAuth(claims): AdminAuth,
) -> ApiResult<Json<BatchReport>> {
    info!(admin = %claims.sub, "전체 재계산 요청");
    let report = state
        .scheduler
        .recompute_all_full()
        .await
        .map_err(fund_error)?;
    Ok(Json(report))
}

/// 야간 증분 계산 (수동 실행).
#[utoipa::path(
    post,
    path = "/api/v1/admin/nightly",
    params(NightlyQuery),
    responses(
        (status = 200, description = "야간 계산 결과", body = NightlyReport)
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn run_nightly(
    State(state): State<Arc<AppState>>,
    AdminAuth(claims): AdminAuth,
    Query(query): Query<NightlyQuery>,
) -> ApiResult<Json<NightlyReport>> {
    let date = query.date.unwrap_or_else(|| state.today());
    if date > state.today() {
        return Err(bad_request(format!("date {} is in the future", date)));
    }
    info!(date = %date, admin = %claims.sub, "야간 계산 수동 실행");

    let report = state.scheduler.nightly(date).await.map_err(fund_error)?;
    if !report.skipped_weekend {
        // 저장된 수익률이 바뀌었을 수 있음
        state.return_cache.invalidate().await;
    }
    Ok(Json(report))
}

/// 대시보드 통계.
#[utoipa::path(
    get,
    path = "/api/v1/admin/stats",
    responses(
        (status = 200, description = "통계", body = AdminStats)
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    AdminAuth(_claims): AdminAuth,
) -> ApiResult<Json<AdminStats>> {
    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;
    let month_start = state.today().with_day(1).unwrap_or_else(|| state.today());

    let stats = StatsRepository::admin_stats(pool, month_start)
        .await
        .map_err(db_error)?;
    set_open_tickets(stats.open_tickets as f64);
    Ok(Json(stats))
}

// ==================== 입금 ====================

fn parse_deposit_status(raw: Option<&str>) -> ApiResult<Option<DepositStatus>> {
    raw.map(|s| s.parse::<DepositStatus>().map_err(fund_error))
        .transpose()
}

/// 전체 입금 목록.
#[utoipa::path(
    get,
    path = "/api/v1/admin/deposits",
    params(StatusQuery),
    responses(
        (status = 200, description = "입금 목록 (최신순)", body = Vec<DepositWithClient>),
        (status = 400, description = "잘못된 상태 필터")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn list_deposits(
    State(state): State<Arc<AppState>>,
    AdminAuth(_claims): AdminAuth,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<Vec<DepositWithClient>>> {
    let status = parse_deposit_status(query.status.as_deref())?;
    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;

    DepositRepository::list_all(pool, status)
        .await
        .map(Json)
        .map_err(db_error)
}

/// 완료 입금 기록 후 즉시 재계산.
#[utoipa::path(
    post,
    path = "/api/v1/admin/deposits",
    request_body = RecordDepositRequest,
    responses(
        (status = 201, description = "입금 기록", body = DepositRecord),
        (status = 400, description = "잘못된 요청")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn record_deposit(
    State(state): State<Arc<AppState>>,
    AdminAuth(claims): AdminAuth,
    Json(request): Json<RecordDepositRequest>,
) -> ApiResult<(StatusCode, Json<DepositRecord>)> {
    request.validate().map_err(validation_error)?;
    let admin = admin_id(&claims)?;
    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;

    let input = CompletedDepositInput {
        user_id: request.client_id,
        amount: request.amount,
        deposit_date: request.deposit_date,
        purpose: request.purpose.unwrap_or_else(|| "additional".to_string()),
        admin_notes: request.admin_notes,
    };
    let deposit = DepositRepository::create_completed(pool, admin, &input)
        .await
        .map_err(db_error)?;

    record_deposit_transition("completed");
    info!(
        client_id = %deposit.user_id,
        reference = %deposit.reference,
        amount = %deposit.amount,
        deposit_date = %request.deposit_date,
        "관리자 입금 기록"
    );

    recompute_after_deposit(&state, deposit.user_id).await;
    Ok((StatusCode::CREATED, Json(deposit)))
}

/// 입금 상태 변경 (승인/완료/거절).
#[utoipa::path(
    put,
    path = "/api/v1/admin/deposits/{id}/status",
    params(("id" = Uuid, Path, description = "입금 ID")),
    request_body = DepositStatusRequest,
    responses(
        (status = 200, description = "변경된 입금", body = DepositRecord),
        (status = 404, description = "입금 없음"),
        (status = 409, description = "허용되지 않는 상태 전이")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn update_deposit_status(
    State(state): State<Arc<AppState>>,
    AdminAuth(claims): AdminAuth,
    Path(id): Path<Uuid>,
    Json(request): Json<DepositStatusRequest>,
) -> ApiResult<Json<DepositRecord>> {
    let admin = admin_id(&claims)?;
    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;
    let effective_date = request.deposit_date.unwrap_or_else(|| state.today());

    let transition = DepositRepository::update_status(
        pool,
        id,
        request.status,
        admin,
        request.admin_notes.as_deref(),
        effective_date,
    )
    .await
    .map_err(status_change_error)?;

    record_deposit_transition(request.status.as_str());
    info!(
        deposit_id = %id,
        from = %transition.from,
        status = %request.status,
        admin = %claims.sub,
        "입금 상태 변경"
    );

    if transition.changes_ledger() {
        recompute_after_deposit(&state, transition.record.user_id).await;
    }
    Ok(Json(transition.record))
}

// ==================== 출금 ====================

/// 전체 출금 목록.
#[utoipa::path(
    get,
    path = "/api/v1/admin/withdrawals",
    params(StatusQuery),
    responses(
        (status = 200, description = "출금 목록 (최신순)", body = Vec<WithdrawalWithClient>),
        (status = 400, description = "잘못된 상태 필터")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn list_withdrawals(
    State(state): State<Arc<AppState>>,
    AdminAuth(_claims): AdminAuth,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<Vec<WithdrawalWithClient>>> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(
            WithdrawalStatus::parse(raw)
                .ok_or_else(|| bad_request(format!("unknown withdrawal status '{}'", raw)))?,
        ),
        None => None,
    };
    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;

    WithdrawalRepository::list_all(pool, status)
        .await
        .map(Json)
        .map_err(db_error)
}

/// 출금 상태 변경. 원장과 잔고 궤적에는 영향이 없습니다.
#[utoipa::path(
    put,
    path = "/api/v1/admin/withdrawals/{id}/status",
    params(("id" = Uuid, Path, description = "출금 ID")),
    request_body = WithdrawalStatusRequest,
    responses(
        (status = 200, description = "변경된 출금", body = WithdrawalRecord),
        (status = 400, description = "잘못된 상태"),
        (status = 404, description = "출금 없음"),
        (status = 409, description = "허용되지 않는 상태 전이")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn update_withdrawal_status(
    State(state): State<Arc<AppState>>,
    AdminAuth(claims): AdminAuth,
    Path(id): Path<Uuid>,
    Json(request): Json<WithdrawalStatusRequest>,
) -> ApiResult<Json<WithdrawalRecord>> {
    if request.status == WithdrawalStatus::Pending {
        return Err(bad_request("cannot move a withdrawal back to pending"));
    }
    let admin = admin_id(&claims)?;
    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;

    let withdrawal = WithdrawalRepository::update_status(
        pool,
        id,
        request.status,
        admin,
        request.admin_notes.as_deref(),
    )
    .await
    .map_err(status_change_error)?;

    record_withdrawal_transition(request.status.as_str());
    if request.status == WithdrawalStatus::Completed {
        warn!(
            withdrawal_id = %id,
            amount = %withdrawal.amount,
            "출금 완료 처리, 잔고 궤적은 변경되지 않음"
        );
    }
    info!(withdrawal_id = %id, status = request.status.as_str(), admin = %claims.sub, "출금 상태 변경");
    Ok(Json(withdrawal))
}

/// 관리자 라우터 생성.
pub fn admin_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/clients", get(list_clients).post(create_client))
        .route("/clients/{id}/live-trading", put(set_live_trading))
        .route("/clients/{id}/recompute", post(recompute_client))
        .route("/recompute-all", post(recompute_all))
        .route("/nightly", post(run_nightly))
        .route("/stats", get(get_stats))
        .route("/deposits", get(list_deposits).post(record_deposit))
        .route("/deposits/{id}/status", put(update_deposit_status))
        .route("/withdrawals", get(list_withdrawals))
        .route("/withdrawals/{id}/status", put(update_withdrawal_status))
}
