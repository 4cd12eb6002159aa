//! 클라이언트 입금 endpoint.
//!
//! 클라이언트는 입금을 신청만 할 수 있고, 잔고 반영은 관리자 승인 후
//! 재계산에서 이루어집니다.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::auth::JwtAuth;
use crate::error::{db_error, db_unavailable, forbidden, validation_error, ApiResult};
use crate::metrics::record_deposit_transition;
use crate::repository::{DepositRecord, DepositRepository, DepositRequestInput};
use crate::state::AppState;

/// 입금/출금 금액 검증 (0 초과, 10억 이하).
pub(crate) fn validate_positive_amount(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        return Err(ValidationError::new("amount_not_positive")
            .with_message("금액은 0보다 커야 합니다".into()));
    }
    if *value > Decimal::from(1_000_000_000) {
        return Err(ValidationError::new("amount_too_large")
            .with_message("금액은 10억을 초과할 수 없습니다".into()));
    }
    Ok(())
}

fn default_purpose() -> String {
    "additional".to_string()
}

/// 입금 신청 요청.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct DepositRequest {
    #[validate(custom(function = "validate_positive_amount"))]
    pub amount: Decimal,
    #[serde(default = "default_purpose")]
    #[validate(length(min = 1, max = 50, message = "입금 목적은 1-50자여야 합니다"))]
    pub purpose: String,
    #[validate(length(max = 50, message = "입금 방법은 50자 이하여야 합니다"))]
    pub method: Option<String>,
}

/// 입금 신청 (상태 pending, 유효일 없음).
#[utoipa::path(
    post,
    path = "/api/v1/deposits",
    request_body = DepositRequest,
    responses(
        (status = 201, description = "신청 접수", body = DepositRecord),
        (status = 400, description = "잘못된 금액"),
        (status = 401, description = "인증 필요")
    ),
    security(("bearer_auth" = [])),
    tag = "deposits"
)]
pub async fn request_deposit(
    State(state): State<Arc<AppState>>,
    JwtAuth(claims): JwtAuth,
    Json(request): Json<DepositRequest>,
) -> ApiResult<(StatusCode, Json<DepositRecord>)> {
    request.validate().map_err(validation_error)?;
    let user_id = claims
        .user_id()
        .ok_or_else(|| forbidden("invalid user"))?;
    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;

    let input = DepositRequestInput {
        amount: request.amount,
        purpose: request.purpose,
        method: request.method,
    };
    let deposit = DepositRepository::create_request(pool, user_id, &input)
        .await
        .map_err(db_error)?;

    record_deposit_transition("pending");
    info!(
        user_id = %user_id,
        reference = %deposit.reference,
        amount = %deposit.amount,
        "입금 신청 접수"
    );
    Ok((StatusCode::CREATED, Json(deposit)))
}

/// 내 입금 내역.
#[utoipa::path(
    get,
    path = "/api/v1/deposits",
    responses(
        (status = 200, description = "입금 내역 (최신순)", body = Vec<DepositRecord>),
        (status = 401, description = "인증 필요")
    ),
    security(("bearer_auth" = [])),
    tag = "deposits"
)]
pub async fn list_my_deposits(
    State(state): State<Arc<AppState>>,
    JwtAuth(claims): JwtAuth,
) -> ApiResult<Json<Vec<DepositRecord>>> {
    let user_id = claims
        .user_id()
        .ok_or_else(|| forbidden("invalid user"))?;
    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;

    DepositRepository::list_for_user(pool, user_id)
        .await
        .map(Json)
        .map_err(db_error)
}

/// 입금 라우터 생성.
pub fn deposits_router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_my_deposits).post(request_deposit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::routes::test_support::{app, json, send_json, token};
    use crate::state::create_test_state;
    use crate::ApiErrorResponse;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use tower::ServiceExt;
    use uuid::Uuid;

    #[test]
    fn test_validate_positive_amount() {
        assert!(validate_positive_amount(&dec!(0.01)).is_ok());
        assert!(validate_positive_amount(&Decimal::ZERO).is_err());
        assert!(validate_positive_amount(&dec!(-100)).is_err());
        assert!(validate_positive_amount(&dec!(1000000001)).is_err());
    }

    #[test]
    fn test_purpose_defaults_to_additional() {
        let request: DepositRequest = serde_json::from_str(r#"{"amount": "500"}"#).unwrap();
        assert_eq!(request.purpose, "additional");
        assert!(request.validate().is_ok());
    }

    #[tokio::test]
    async fn test_request_deposit_rejects_zero_amount() {
        let session = token(Uuid::new_v4(), Role::Client);
        let response = app(create_test_state())
            .oneshot(send_json(
                "POST",
                "/api/v1/deposits",
                Some(&session),
                json!({"amount": "0"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ApiErrorResponse = json(response).await;
        assert_eq!(body.message, "금액은 0보다 커야 합니다");
    }

    #[tokio::test]
    async fn test_request_deposit_requires_auth() {
        let response = app(create_test_state())
            .oneshot(send_json(
                "POST",
                "/api/v1/deposits",
                None,
                json!({"amount": "100"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
