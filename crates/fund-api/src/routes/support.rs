//! 고객 지원 티켓 endpoint.
//!
//! 클라이언트는 자신의 티켓만, 관리자는 전체 티켓을 조회합니다.
//! 티켓 닫기는 관리자 전용입니다.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{AdminAuth, Claims, JwtAuth};
use crate::error::{
    api_error, bad_request, db_error, db_unavailable, forbidden, not_found, validation_error,
    ApiResult,
};
use crate::metrics::set_open_tickets;
use crate::repository::{
    MessageRecord, PostOutcome, Sender, SenderType, SupportRepository, TicketPriority,
    TicketRecord, TicketStatus, UserRepository,
};
use crate::state::AppState;

// ==================== 요청/응답 타입 ====================

/// 티켓 생성 요청.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateTicketRequest {
    #[validate(length(min = 1, max = 200, message = "제목은 1-200자여야 합니다"))]
    pub subject: String,
    #[serde(default)]
    pub priority: TicketPriority,
    #[validate(length(min = 1, max = 5000, message = "메시지는 1-5000자여야 합니다"))]
    pub message: String,
}

/// 메시지 작성 요청.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PostMessageRequest {
    #[validate(length(min = 1, max = 5000, message = "메시지는 1-5000자여야 합니다"))]
    pub message: String,
}

/// 티켓 상세 (메시지 포함).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TicketDetailResponse {
    pub ticket: TicketRecord,
    pub messages: Vec<MessageRecord>,
}

/// 티켓 목록 필터 (관리자 전용).
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct TicketListQuery {
    /// open | responded | closed
    pub status: Option<String>,
}

// ==================== 헬퍼 ====================

fn caller_id(claims: &Claims) -> ApiResult<Uuid> {
    claims.user_id().ok_or_else(|| forbidden("invalid user"))
}

fn sender_type(claims: &Claims) -> SenderType {
    if claims.is_admin() {
        SenderType::Admin
    } else {
        SenderType::User
    }
}

/// 작성자 표시 이름. 프로필이 없으면 이메일을 씁니다.
async fn sender_for(pool: &PgPool, claims: &Claims) -> ApiResult<Sender> {
    let id = caller_id(claims)?;
    let name = UserRepository::get_profile(pool, id)
        .await
        .map_err(db_error)?
        .map(|p| p.full_name())
        .unwrap_or_else(|| claims.email.clone());

    Ok(Sender {
        kind: sender_type(claims),
        id,
        name,
    })
}

/// 소유자 또는 관리자만 접근 가능한 티켓 조회.
async fn accessible_ticket(pool: &PgPool, claims: &Claims, id: Uuid) -> ApiResult<TicketRecord> {
    let ticket = SupportRepository::get_ticket(pool, id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found("Ticket not found"))?;

    if !claims.is_admin() && Some(ticket.user_id) != claims.user_id() {
        // 존재 여부를 노출하지 않음
        return Err(not_found("Ticket not found"));
    }
    Ok(ticket)
}

// ==================== 핸들러 ====================

/// 티켓 생성 (첫 메시지 포함).
#[utoipa::path(
    post,
    path = "/api/v1/support",
    request_body = CreateTicketRequest,
    responses(
        (status = 201, description = "티켓 생성", body = TicketRecord),
        (status = 400, description = "잘못된 요청"),
        (status = 401, description = "인증 필요")
    ),
    security(("bearer_auth" = [])),
    tag = "support"
)]
pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    JwtAuth(claims): JwtAuth,
    Json(request): Json<CreateTicketRequest>,
) -> ApiResult<(StatusCode, Json<TicketRecord>)> {
    request.validate().map_err(validation_error)?;
    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;
    let sender = sender_for(pool, &claims).await?;

    let ticket = SupportRepository::create_ticket(
        pool,
        &sender,
        request.subject.trim(),
        request.priority,
        &request.message,
    )
    .await
    .map_err(db_error)?;

    info!(
        ticket_id = %ticket.id,
        user_id = %sender.id,
        priority = request.priority.as_str(),
        "지원 티켓 생성"
    );
    Ok((StatusCode::CREATED, Json(ticket)))
}

/// 티켓 목록. 관리자는 전체 티켓을 상태별로 조회합니다.
#[utoipa::path(
    get,
    path = "/api/v1/support",
    params(TicketListQuery),
    responses(
        (status = 200, description = "티켓 목록 (최근 메시지순)", body = Vec<TicketRecord>),
        (status = 400, description = "잘못된 상태 필터"),
        (status = 401, description = "인증 필요")
    ),
    security(("bearer_auth" = [])),
    tag = "support"
)]
pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    JwtAuth(claims): JwtAuth,
    Query(query): Query<TicketListQuery>,
) -> ApiResult<Json<Vec<TicketRecord>>> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(
            TicketStatus::parse(raw)
                .ok_or_else(|| bad_request(format!("unknown ticket status '{}'", raw)))?,
        ),
        None => None,
    };
    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;

    if !claims.is_admin() {
        let user_id = caller_id(&claims)?;
        return SupportRepository::list_for_user(pool, user_id)
            .await
            .map(Json)
            .map_err(db_error);
    }

    let tickets = SupportRepository::list_all(pool, status)
        .await
        .map_err(db_error)?;
    if status.is_none() {
        let open = tickets.iter().filter(|t| !t.is_closed()).count();
        set_open_tickets(open as f64);
    }
    debug!(count = tickets.len(), ?status, "관리자 티켓 목록 조회");
    Ok(Json(tickets))
}

/// 티켓 상세.
#[utoipa::path(
    get,
    path = "/api/v1/support/{id}",
    params(("id" = Uuid, Path, description = "티켓 ID")),
    responses(
        (status = 200, description = "티켓 상세", body = TicketDetailResponse),
        (status = 401, description = "인증 필요"),
        (status = 404, description = "티켓 없음")
    ),
    security(("bearer_auth" = [])),
    tag = "support"
)]
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    JwtAuth(claims): JwtAuth,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TicketDetailResponse>> {
    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;
    let ticket = accessible_ticket(pool, &claims, id).await?;
    let messages = SupportRepository::messages(pool, id)
        .await
        .map_err(db_error)?;

    Ok(Json(TicketDetailResponse { ticket, messages }))
}

/// 메시지 작성.
#[utoipa::path(
    post,
    path = "/api/v1/support/{id}/messages",
    params(("id" = Uuid, Path, description = "티켓 ID")),
    request_body = PostMessageRequest,
    responses(
        (status = 201, description = "메시지 작성", body = MessageRecord),
        (status = 400, description = "잘못된 요청"),
        (status = 404, description = "티켓 없음"),
        (status = 409, description = "닫힌 티켓")
    ),
    security(("bearer_auth" = [])),
    tag = "support"
)]
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    JwtAuth(claims): JwtAuth,
    Path(id): Path<Uuid>,
    Json(request): Json<PostMessageRequest>,
) -> ApiResult<(StatusCode, Json<MessageRecord>)> {
    request.validate().map_err(validation_error)?;
    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;
    accessible_ticket(pool, &claims, id).await?;
    let sender = sender_for(pool, &claims).await?;

    match SupportRepository::post_message(pool, id, &sender, &request.message)
        .await
        .map_err(db_error)?
    {
        PostOutcome::Posted(message) => {
            info!(ticket_id = %id, sender = sender.kind.as_str(), "티켓 메시지 작성");
            Ok((StatusCode::CREATED, Json(message)))
        }
        PostOutcome::NotFound => Err(not_found("Ticket not found")),
        PostOutcome::Closed => {
            warn!(ticket_id = %id, "닫힌 티켓에 메시지 시도");
            Err(api_error(
                StatusCode::CONFLICT,
                "TICKET_CLOSED",
                "Ticket is closed",
            ))
        }
    }
}

/// 읽음 처리 (호출자 쪽 미읽음 수만 0).
#[utoipa::path(
    post,
    path = "/api/v1/support/{id}/read",
    params(("id" = Uuid, Path, description = "티켓 ID")),
    responses(
        (status = 204, description = "읽음 처리"),
        (status = 404, description = "티켓 없음")
    ),
    security(("bearer_auth" = [])),
    tag = "support"
)]
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    JwtAuth(claims): JwtAuth,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;
    accessible_ticket(pool, &claims, id).await?;

    if SupportRepository::mark_read(pool, id, sender_type(&claims))
        .await
        .map_err(db_error)?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Ticket not found"))
    }
}

/// 티켓 닫기 (관리자).
#[utoipa::path(
    post,
    path = "/api/v1/support/{id}/close",
    params(("id" = Uuid, Path, description = "티켓 ID")),
    responses(
        (status = 204, description = "티켓 닫힘"),
        (status = 403, description = "관리자 권한 필요"),
        (status = 404, description = "티켓 없음")
    ),
    security(("bearer_auth" = [])),
    tag = "support"
)]
pub async fn close_ticket(
    State(state): State<Arc<AppState>>,
    AdminAuth(claims): AdminAuth,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;

    if !SupportRepository::close(pool, id).await.map_err(db_error)? {
        return Err(not_found("Ticket not found"));
    }
    info!(ticket_id = %id, admin = %claims.sub, "티켓 닫힘");
    Ok(StatusCode::NO_CONTENT)
}

/// 지원 티켓 라우터 생성.
pub fn support_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_tickets).post(create_ticket))
        .route("/{id}", get(get_ticket))
        .route("/{id}/messages", post(post_message))
        .route("/{id}/read", post(mark_read))
        .route("/{id}/close", post(close_ticket))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::routes::test_support::{app, get as get_req, json, send_json, token};
    use crate::state::create_test_state;
    use crate::ApiErrorResponse;
    use serde_json::json;
    use tower::ServiceExt;

    #[test]
    fn test_priority_defaults_to_medium() {
        let request: CreateTicketRequest =
            serde_json::from_value(json!({"subject": "Login", "message": "Help"})).unwrap();
        assert_eq!(request.priority, TicketPriority::Medium);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_unknown_priority_rejected() {
        let result: Result<CreateTicketRequest, _> = serde_json::from_value(
            json!({"subject": "Login", "priority": "critical", "message": "Help"}),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_create_ticket_validates_subject() {
        let session = token(Uuid::new_v4(), Role::Client);
        let response = app(create_test_state())
            .oneshot(send_json(
                "POST",
                "/api/v1/support",
                Some(&session),
                json!({"subject": "", "message": "Help"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ApiErrorResponse = json(response).await;
        assert_eq!(body.code, "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_list_rejects_unknown_status() {
        let session = token(Uuid::new_v4(), Role::Admin);
        let response = app(create_test_state())
            .oneshot(get_req("/api/v1/support?status=pending", Some(&session)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_close_requires_admin() {
        let session = token(Uuid::new_v4(), Role::Client);
        let uri = format!("/api/v1/support/{}/close", Uuid::new_v4());
        let response = app(create_test_state())
            .oneshot(send_json("POST", &uri, Some(&session), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_list_without_database() {
        let session = token(Uuid::new_v4(), Role::Client);
        let response = app(create_test_state())
            .oneshot(get_req("/api/v1/support", Some(&session)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: ApiErrorResponse = json(response).await;
        assert_eq!(body.code, "DATABASE_ERROR");
    }
}
