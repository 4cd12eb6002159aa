//! 클라이언트 출금 endpoint.
//!
//! 출금은 현재 잔고 이하로만 신청할 수 있습니다. 처리 결과는 입금 원장이나
//! 잔고 궤적에 반영되지 않습니다.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use fund_core::AccrualStore;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};
use utoipa::ToSchema;
use validator::Validate;

use super::deposits::validate_positive_amount;
use crate::auth::JwtAuth;
use crate::error::{
    api_error, db_error, db_unavailable, forbidden, fund_error, not_found, validation_error,
    ApiResult,
};
use crate::metrics::record_withdrawal_transition;
use crate::repository::{NewWithdrawal, WithdrawalRecord, WithdrawalRepository};
use crate::state::AppState;

/// 출금 신청 요청.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct WithdrawalRequest {
    #[validate(custom(function = "validate_positive_amount"))]
    pub amount: Decimal,
    #[validate(length(min = 1, max = 100, message = "출금 사유는 1-100자여야 합니다"))]
    pub reason: String,
    #[validate(length(max = 1000, message = "상세 내용은 1000자 이하여야 합니다"))]
    pub details: Option<String>,
    #[validate(length(min = 1, max = 200, message = "예금주명은 1-200자여야 합니다"))]
    pub account_name: String,
    #[validate(length(min = 5, max = 34, message = "IBAN은 5-34자여야 합니다"))]
    pub iban: String,
    #[validate(length(max = 11, message = "SWIFT 코드는 11자 이하여야 합니다"))]
    pub swift_code: Option<String>,
    #[validate(length(min = 1, max = 200, message = "은행명은 1-200자여야 합니다"))]
    pub bank_name: String,
    #[validate(length(max = 500, message = "은행 주소는 500자 이하여야 합니다"))]
    pub bank_address: Option<String>,
}

impl WithdrawalRequest {
    fn into_input(self) -> NewWithdrawal {
        NewWithdrawal {
            amount: self.amount,
            reason: self.reason,
            details: self.details,
            account_name: self.account_name,
            // 공백 제거 후 대문자로 저장
            iban: self
                .iban
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_uppercase(),
            swift_code: self.swift_code.map(|s| s.trim().to_uppercase()),
            bank_name: self.bank_name,
            bank_address: self.bank_address,
        }
    }
}

/// 출금 신청.
#[utoipa::path(
    post,
    path = "/api/v1/withdrawals",
    request_body = WithdrawalRequest,
    responses(
        (status = 201, description = "신청 접수", body = WithdrawalRecord),
        (status = 400, description = "잘못된 금액 또는 잔고 부족"),
        (status = 401, description = "인증 필요"),
        (status = 404, description = "계좌 없음")
    ),
    security(("bearer_auth" = [])),
    tag = "withdrawals"
)]
pub async fn request_withdrawal(
    State(state): State<Arc<AppState>>,
    JwtAuth(claims): JwtAuth,
    Json(request): Json<WithdrawalRequest>,
) -> ApiResult<(StatusCode, Json<WithdrawalRecord>)> {
    request.validate().map_err(validation_error)?;
    let user_id = claims
        .user_id()
        .ok_or_else(|| forbidden("invalid user"))?;

    let account = state
        .scheduler
        .store()
        .load_account(user_id)
        .await
        .map_err(fund_error)?
        .ok_or_else(|| not_found("Account not found"))?;

    if request.amount > account.current_balance {
        warn!(
            user_id = %user_id,
            amount = %request.amount,
            balance = %account.current_balance,
            "잔고 초과 출금 신청"
        );
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "INSUFFICIENT_BALANCE",
            "Insufficient account balance",
        ));
    }

    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;
    let withdrawal = WithdrawalRepository::create(pool, user_id, &request.into_input(), state.today())
        .await
        .map_err(db_error)?;

    record_withdrawal_transition("pending");
    info!(
        user_id = %user_id,
        reference = %withdrawal.reference,
        amount = %withdrawal.amount,
        "출금 신청 접수"
    );
    Ok((StatusCode::CREATED, Json(withdrawal)))
}

/// 내 출금 내역.
#[utoipa::path(
    get,
    path = "/api/v1/withdrawals",
    responses(
        (status = 200, description = "출금 내역 (최신순)", body = Vec<WithdrawalRecord>),
        (status = 401, description = "인증 필요")
    ),
    security(("bearer_auth" = [])),
    tag = "withdrawals"
)]
pub async fn list_my_withdrawals(
    State(state): State<Arc<AppState>>,
    JwtAuth(claims): JwtAuth,
) -> ApiResult<Json<Vec<WithdrawalRecord>>> {
    let user_id = claims
        .user_id()
        .ok_or_else(|| forbidden("invalid user"))?;
    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;

    WithdrawalRepository::list_for_user(pool, user_id)
        .await
        .map(Json)
        .map_err(db_error)
}

/// 출금 라우터 생성.
pub fn withdrawals_router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_my_withdrawals).post(request_withdrawal))
}
