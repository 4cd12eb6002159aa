//! 인증 endpoint.
//!
//! 비밀번호 로그인 → (2FA 사용 시) 대기 토큰 → TOTP/백업 코드 확인 → 세션 토큰.
//!
//! # 엔드포인트
//!
//! - `POST /api/v1/auth/login` - 비밀번호 로그인
//! - `POST /api/v1/auth/2fa/login` - 2단계 인증 완료
//! - `POST /api/v1/auth/2fa/setup` - TOTP 비밀 키 발급
//! - `POST /api/v1/auth/2fa/verify-setup` - 첫 코드 확인 후 2FA 활성화
//! - `POST /api/v1/auth/2fa/complete-setup` - 설정 필요 플래그 해제
//! - `GET /api/v1/auth/me` - 현재 사용자
//! - `PUT /api/v1/auth/password` - 비밀번호 변경

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::totp::{self, BACKUP_CODE_COUNT};
use crate::auth::{
    create_token, decode_token, hash_password, validate_password_strength, verify_password,
    Claims, JwtAuth, Role,
};
use crate::error::{api_error, bad_request, db_error, db_unavailable, not_found, validation_error, ApiError, ApiResult};
use crate::metrics::record_login_attempt;
use crate::repository::{UserAuthRecord, UserProfile, UserRepository};
use crate::state::AppState;

// ==================== 요청/응답 타입 ====================

/// 로그인 요청.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "유효한 이메일 주소가 아닙니다"))]
    pub email: String,
    #[validate(length(min = 1, max = 256, message = "비밀번호를 입력하세요"))]
    pub password: String,
}

/// 세션 사용자 정보.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub two_factor_enabled: bool,
    pub two_factor_setup_required: bool,
}

impl From<&UserAuthRecord> for SessionUser {
    fn from(user: &UserAuthRecord) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.full_name(),
            role: user.role(),
            two_factor_enabled: user.two_factor_enabled,
            two_factor_setup_required: user.two_factor_setup_required,
        }
    }
}

/// 로그인 응답.
///
/// 2FA가 켜져 있으면 `token` 대신 `challenge_token`만 내려갑니다.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub requires_two_factor: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<SessionUser>,
}

/// 2단계 인증 로그인 요청.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TwoFactorLoginRequest {
    #[validate(length(min = 1, message = "challenge_token이 필요합니다"))]
    pub challenge_token: String,
    #[validate(length(min = 1, max = 16, message = "인증 코드가 필요합니다"))]
    pub code: String,
    #[serde(default)]
    pub is_backup_code: bool,
}

/// TOTP 설정 응답.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TwoFactorSetupResponse {
    pub secret: String,
    pub otpauth_url: String,
}

/// TOTP 첫 코드 확인 요청.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifySetupRequest {
    #[validate(length(min = 6, max = 8, message = "6자리 코드를 입력하세요"))]
    pub code: String,
}

/// 백업 코드 응답 (평문은 이 응답에서만 노출).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BackupCodesResponse {
    pub backup_codes: Vec<String>,
}

/// 비밀번호 변경 요청.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "현재 비밀번호를 입력하세요"))]
    pub current_password: String,
    #[validate(custom(function = "check_password_strength"))]
    pub new_password: String,
}

fn check_password_strength(password: &str) -> Result<(), validator::ValidationError> {
    validate_password_strength(password).map_err(|msg| {
        let mut err = validator::ValidationError::new("weak_password");
        err.message = Some(msg.into());
        err
    })
}

/// 단순 성공 응답.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
}

// ==================== 공용 헬퍼 ====================

fn unauthorized(code: &str, message: &str) -> ApiError {
    api_error(StatusCode::UNAUTHORIZED, code, message)
}

fn too_many_attempts() -> ApiError {
    api_error(
        StatusCode::TOO_MANY_REQUESTS,
        "TOO_MANY_ATTEMPTS",
        "Too many login attempts. Please try again in 15 minutes.",
    )
}

fn issue_session(state: &AppState, user: &UserAuthRecord) -> ApiResult<String> {
    let minutes = state.config.auth.jwt_expiry_hours * 60;
    let claims = Claims::new(user.id, &user.email, user.role(), minutes);
    create_token(&claims, &state.jwt.secret).map_err(|e| {
        warn!(error = %e, "세션 토큰 생성 실패");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "TOKEN_ERROR", "failed to issue token")
    })
}

async fn load_user(state: &AppState, id: Uuid) -> ApiResult<UserAuthRecord> {
    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;
    UserRepository::find_auth_by_id(pool, id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found("User not found"))
}

// ==================== 핸들러 ====================

/// 비밀번호 로그인.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "로그인 성공 또는 2FA 필요", body = LoginResponse),
        (status = 400, description = "잘못된 요청"),
        (status = 401, description = "이메일 또는 비밀번호 불일치"),
        (status = 429, description = "로그인 시도 초과")
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    request.validate().map_err(validation_error)?;

    if state.login_limiter.is_blocked(&request.email).await {
        record_login_attempt("locked");
        return Err(too_many_attempts());
    }

    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;
    let user = UserRepository::find_auth_by_email(pool, &request.email)
        .await
        .map_err(db_error)?;

    let Some(user) = user.filter(|u| verify_password(&request.password, &u.password_hash).is_ok())
    else {
        let failures = state.login_limiter.record_failure(&request.email).await;
        record_login_attempt("invalid_credentials");
        warn!(failures, "로그인 실패");
        return Err(unauthorized("INVALID_CREDENTIALS", "Invalid email or password"));
    };

    state.login_limiter.reset(&request.email).await;

    if user.two_factor_enabled {
        let claims = Claims::challenge(
            user.id,
            &user.email,
            user.role(),
            state.config.auth.challenge_expiry_minutes,
        );
        let challenge = create_token(&claims, &state.jwt.secret).map_err(|e| {
            warn!(error = %e, "대기 토큰 생성 실패");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "TOKEN_ERROR", "failed to issue token")
        })?;
        record_login_attempt("two_factor_required");

        return Ok(Json(LoginResponse {
            requires_two_factor: true,
            challenge_token: Some(challenge),
            token: None,
            user: None,
        }));
    }

    let token = issue_session(&state, &user)?;
    UserRepository::touch_last_login(pool, user.id)
        .await
        .map_err(db_error)?;
    record_login_attempt("success");
    info!(user_id = %user.id, "로그인 성공");

    Ok(Json(LoginResponse {
        requires_two_factor: false,
        challenge_token: None,
        token: Some(token),
        user: Some(SessionUser::from(&user)),
    }))
}

/// 2단계 인증으로 로그인을 완료합니다.
#[utoipa::path(
    post,
    path = "/api/v1/auth/2fa/login",
    request_body = TwoFactorLoginRequest,
    responses(
        (status = 200, description = "세션 토큰 발급", body = LoginResponse),
        (status = 400, description = "2FA 미설정 계정"),
        (status = 401, description = "대기 토큰 만료 또는 코드 불일치"),
        (status = 429, description = "로그인 시도 초과")
    ),
    tag = "auth"
)]
pub async fn two_factor_login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TwoFactorLoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    request.validate().map_err(validation_error)?;

    let claims = decode_token(&request.challenge_token, &state.jwt.secret)
        .map(|data| data.claims)
        .ok()
        .filter(|c| c.mfa_pending)
        .ok_or_else(|| unauthorized("INVALID_CHALLENGE", "Invalid or expired token"))?;
    let user_id = claims
        .user_id()
        .ok_or_else(|| unauthorized("INVALID_CHALLENGE", "Invalid or expired token"))?;

    if state.login_limiter.is_blocked(&claims.email).await {
        record_login_attempt("locked");
        return Err(too_many_attempts());
    }

    let mut user = load_user(&state, user_id).await?;
    let Some(secret) = user.two_factor_secret.clone().filter(|_| user.two_factor_enabled) else {
        return Err(bad_request("2FA not enabled for this account"));
    };

    let verified = if request.is_backup_code {
        let consumed = totp::consume_backup_code(&mut user.backup_codes.0, &request.code);
        if consumed {
            let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;
            UserRepository::update_backup_codes(pool, user.id, &user.backup_codes.0)
                .await
                .map_err(db_error)?;
            let remaining = user.backup_codes.0.iter().filter(|c| !c.used).count();
            info!(user_id = %user.id, remaining, "백업 코드 사용");
        }
        consumed
    } else {
        totp::verify_code(&secret, &state.config.auth.totp_issuer, &user.email, &request.code)
            .map_err(|e| {
                warn!(error = %e, "TOTP 검증 오류");
                api_error(StatusCode::INTERNAL_SERVER_ERROR, "TOTP_ERROR", "failed to verify code")
            })?
    };

    if !verified {
        state.login_limiter.record_failure(&claims.email).await;
        record_login_attempt("two_factor_failed");
        let message = if request.is_backup_code {
            "Invalid backup code"
        } else {
            "Invalid authentication code"
        };
        return Err(unauthorized("INVALID_2FA_CODE", message));
    }

    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;
    let token = issue_session(&state, &user)?;
    UserRepository::touch_last_login(pool, user.id)
        .await
        .map_err(db_error)?;
    state.login_limiter.reset(&claims.email).await;
    record_login_attempt("success");
    info!(user_id = %user.id, "2FA 로그인 성공");

    Ok(Json(LoginResponse {
        requires_two_factor: false,
        challenge_token: None,
        token: Some(token),
        user: Some(SessionUser::from(&user)),
    }))
}

/// 새 TOTP 비밀 키를 발급합니다 (확인 전까지 임시 저장).
#[utoipa::path(
    post,
    path = "/api/v1/auth/2fa/setup",
    responses(
        (status = 200, description = "비밀 키 발급", body = TwoFactorSetupResponse),
        (status = 401, description = "인증 필요")
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn two_factor_setup(
    State(state): State<Arc<AppState>>,
    auth: JwtAuth,
) -> ApiResult<Json<TwoFactorSetupResponse>> {
    let user_id = auth.user_id().map_err(|_| unauthorized("INVALID_TOKEN", "Invalid token"))?;
    let user = load_user(&state, user_id).await?;
    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;

    let secret = totp::generate_secret();
    let otpauth_url = totp::provisioning_url(&secret, &state.config.auth.totp_issuer, &user.email)
        .map_err(|e| {
            warn!(error = %e, "otpauth URL 생성 실패");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "TOTP_ERROR", "failed to generate secret")
        })?;

    UserRepository::set_temp_secret(pool, user.id, &secret)
        .await
        .map_err(db_error)?;
    info!(user_id = %user.id, "2FA 비밀 키 발급");

    Ok(Json(TwoFactorSetupResponse {
        secret,
        otpauth_url,
    }))
}

/// 임시 비밀 키로 첫 코드를 확인하고 2FA를 활성화합니다.
#[utoipa::path(
    post,
    path = "/api/v1/auth/2fa/verify-setup",
    request_body = VerifySetupRequest,
    responses(
        (status = 200, description = "2FA 활성화, 백업 코드 반환", body = BackupCodesResponse),
        (status = 400, description = "코드 불일치 또는 설정 미시작"),
        (status = 401, description = "인증 필요")
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn two_factor_verify_setup(
    State(state): State<Arc<AppState>>,
    auth: JwtAuth,
    Json(request): Json<VerifySetupRequest>,
) -> ApiResult<Json<BackupCodesResponse>> {
    request.validate().map_err(validation_error)?;
    let user_id = auth.user_id().map_err(|_| unauthorized("INVALID_TOKEN", "Invalid token"))?;
    let user = load_user(&state, user_id).await?;

    let Some(temp_secret) = user.two_factor_temp_secret.clone() else {
        return Err(bad_request("2FA setup has not been started"));
    };

    let valid = totp::verify_code(
        &temp_secret,
        &state.config.auth.totp_issuer,
        &user.email,
        &request.code,
    )
    .map_err(|e| {
        warn!(error = %e, "TOTP 검증 오류");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "TOTP_ERROR", "failed to verify code")
    })?;
    if !valid {
        return Err(bad_request("Invalid verification code"));
    }

    let backup_codes = totp::generate_backup_codes(BACKUP_CODE_COUNT);
    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;
    UserRepository::enable_two_factor(
        pool,
        user.id,
        &temp_secret,
        &totp::hash_backup_codes(&backup_codes),
    )
    .await
    .map_err(db_error)?;
    info!(user_id = %user.id, "2FA 활성화");

    Ok(Json(BackupCodesResponse { backup_codes }))
}

/// 2FA 설정 필요 플래그를 해제합니다.
#[utoipa::path(
    post,
    path = "/api/v1/auth/2fa/complete-setup",
    responses(
        (status = 200, description = "설정 완료", body = SuccessResponse),
        (status = 400, description = "2FA 미활성화"),
        (status = 401, description = "인증 필요")
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn two_factor_complete_setup(
    State(state): State<Arc<AppState>>,
    auth: JwtAuth,
) -> ApiResult<Json<SuccessResponse>> {
    let user_id = auth.user_id().map_err(|_| unauthorized("INVALID_TOKEN", "Invalid token"))?;
    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;

    let updated = UserRepository::complete_setup(pool, user_id)
        .await
        .map_err(db_error)?;
    if !updated {
        return Err(bad_request("2FA must be enabled before completing setup"));
    }
    Ok(Json(SuccessResponse { success: true }))
}

/// 현재 사용자 프로필.
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "현재 사용자", body = UserProfile),
        (status = 401, description = "인증 필요"),
        (status = 404, description = "사용자 없음")
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn me(
    State(state): State<Arc<AppState>>,
    auth: JwtAuth,
) -> ApiResult<Json<UserProfile>> {
    let user_id = auth.user_id().map_err(|_| unauthorized("INVALID_TOKEN", "Invalid token"))?;
    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;

    UserRepository::get_profile(pool, user_id)
        .await
        .map_err(db_error)?
        .map(Json)
        .ok_or_else(|| not_found("User not found"))
}

/// 비밀번호 변경.
#[utoipa::path(
    put,
    path = "/api/v1/auth/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "변경 완료", body = SuccessResponse),
        (status = 400, description = "비밀번호 정책 위반"),
        (status = 401, description = "현재 비밀번호 불일치")
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    auth: JwtAuth,
    Json(request): Json<ChangePasswordRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    request.validate().map_err(validation_error)?;
    let user_id = auth.user_id().map_err(|_| unauthorized("INVALID_TOKEN", "Invalid token"))?;
    let user = load_user(&state, user_id).await?;

    if verify_password(&request.current_password, &user.password_hash).is_err() {
        return Err(unauthorized("INVALID_CREDENTIALS", "Current password is incorrect"));
    }

    let hash = hash_password(&request.new_password).map_err(|e| {
        warn!(error = %e, "비밀번호 해싱 실패");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "HASH_ERROR", "failed to update password")
    })?;
    let pool = state.db_pool.as_ref().ok_or_else(db_unavailable)?;
    UserRepository::update_password(pool, user.id, &hash)
        .await
        .map_err(db_error)?;
    info!(user_id = %user.id, "비밀번호 변경");

    Ok(Json(SuccessResponse { success: true }))
}

/// 인증 라우터 생성.
pub fn auth_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", post(login))
        .route("/2fa/login", post(two_factor_login))
        .route("/2fa/setup", post(two_factor_setup))
        .route("/2fa/verify-setup", post(two_factor_verify_setup))
        .route("/2fa/complete-setup", post(two_factor_complete_setup))
        .route("/me", get(me))
        .route("/password", put(change_password))
}
