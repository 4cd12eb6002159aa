//! 프로필 endpoint.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::JwtAuth;
use crate::error::{db_error, db_unavailable, not_found, validation_error, ApiResult};
use crate::repository::{ProfileUpdate, UserProfile, UserRepository};
use crate::state::AppState;

/// 프로필 수정 요청.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "이름은 1-100자여야 합니다"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "성은 1-100자여야 합니다"))]
    pub last_name: String,
    #[validate(length(max = 50, message = "전화번호는 50자 이하여야 합니다"))]
    pub phone: Option<String>,
    #[validate(length(max = 500, message = "주소는 500자 이하여야 합니다"))]
    pub address: Option<String>,
}

/// 내 프로필 조회.
#[utoipa::path(
    get,
    path = "/api/v1/profile",
    responses(
        (status = 200, description = "프로필", body = UserProfile),
        (status = 401, description = "인증 필요")
    ),
    security(("bearer_auth" = [])),
    tag = "profile"
)]
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    JwtAuth(claims): JwtAuth,
) -> ApiResult<Json<UserProfile>> {
    let user_id = claims.user_id().ok_or_else(|| not_found("User not found"))?;
    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;

    UserRepository::get_profile(pool, user_id)
        .await
        .map_err(db_error)?
        .map(Json)
        .ok_or_else(|| not_found("User not found"))
}

/// 내 프로필 수정.
#[utoipa::path(
    put,
    path = "/api/v1/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "수정된 프로필", body = UserProfile),
        (status = 400, description = "잘못된 요청"),
        (status = 401, description = "인증 필요")
    ),
    security(("bearer_auth" = [])),
    tag = "profile"
)]
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    JwtAuth(claims): JwtAuth,
    Json(request): Json<UpdateProfileRequest>,
) -> ApiResult<Json<UserProfile>> {
    request.validate().map_err(validation_error)?;
    let user_id = claims.user_id().ok_or_else(|| not_found("User not found"))?;
    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;

    let update = ProfileUpdate {
        first_name: request.first_name.trim().to_string(),
        last_name: request.last_name.trim().to_string(),
        phone: request.phone.filter(|p| !p.trim().is_empty()),
        address: request.address.filter(|a| !a.trim().is_empty()),
    };
    let profile = UserRepository::update_profile(pool, user_id, &update)
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found("User not found"))?;
    info!(user_id = %user_id, "프로필 수정");

    Ok(Json(profile))
}

/// 프로필 라우터 생성.
pub fn profile_router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(get_profile).put(update_profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::routes::test_support::{app, json, send_json, token};
    use crate::state::create_test_state;
    use crate::ApiErrorResponse;
    use axum::http::StatusCode;
    use serde_json::json;
    use tower::ServiceExt;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_update_profile_validates_names() {
        let session = token(Uuid::new_v4(), Role::Client);
        let response = app(create_test_state())
            .oneshot(send_json(
                "PUT",
                "/api/v1/profile",
                Some(&session),
                json!({"first_name": "", "last_name": "Lovelace"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ApiErrorResponse = json(response).await;
        assert!(body.message.contains("이름"));
    }
}
