//! 통합 API 에러 응답 타입.
//!
//! 모든 API 엔드포인트에서 일관된 에러 형식을 제공합니다.

use axum::http::{Method, StatusCode, Uri};
use axum::Json;
use fund_core::FundError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;
use utoipa::ToSchema;

/// 통합 API 에러 응답.
///
/// # 예시
///
/// ```json
/// {
///   "code": "NOT_ELIGIBLE",
///   "message": "no statement available",
///   "timestamp": 1738300800
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiErrorResponse {
    /// 에러 코드 (예: "DB_ERROR", "INVALID_INPUT", "NOT_FOUND")
    pub code: String,
    /// 사람이 읽을 수 있는 에러 메시지
    pub message: String,
    /// 추가 에러 상세 정보 (선택적)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// 에러 발생 타임스탬프 (Unix timestamp, 선택적)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// HTTP 메서드 (GET, POST 등)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// 요청 경로
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ApiErrorResponse {
    /// 기본 에러 생성 (타임스탬프 포함).
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            timestamp: Some(chrono::Utc::now().timestamp()),
            method: None,
            path: None,
        }
    }

    /// 상세 정보 포함 에러 생성.
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Value,
    ) -> Self {
        Self {
            details: Some(details),
            ..Self::new(code, message)
        }
    }

    /// 요청 정보(메서드, 경로)를 추가합니다.
    #[must_use]
    pub fn with_request_info(mut self, method: &Method, uri: &Uri) -> Self {
        self.method = Some(method.to_string());
        self.path = Some(uri.path().to_string());
        self
    }

    /// 에러 코드 반환.
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl std::fmt::Display for ApiErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiErrorResponse {}

// ==================== FundError 변환 ====================

/// 코어 에러의 HTTP 상태와 에러 코드.
pub fn status_for(err: &FundError) -> (StatusCode, &'static str) {
    match err {
        FundError::InvalidLedgerState(_) | FundError::InvalidInput(_) => {
            (StatusCode::BAD_REQUEST, "INVALID_INPUT")
        }
        FundError::PeriodNotEligible(_) => (StatusCode::NOT_FOUND, "NOT_ELIGIBLE"),
        FundError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        FundError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DB_ERROR"),
        FundError::DataUnavailable(_) | FundError::Config(_) | FundError::Internal(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
        }
    }
}

impl From<FundError> for ApiErrorResponse {
    fn from(err: FundError) -> Self {
        let (_, code) = status_for(&err);
        let message = match &err {
            FundError::PeriodNotEligible(_) => "no statement available".to_string(),
            // 내부 에러 상세는 응답에 노출하지 않음
            e if !e.is_client_error() => "internal server error".to_string(),
            e => e.to_string(),
        };
        Self::new(code, message)
    }
}

// ==================== Result Type Alias ====================

/// API 에러 (상태 코드 + 본문).
pub type ApiError = (StatusCode, Json<ApiErrorResponse>);

/// API 핸들러 Result 타입 별칭.
pub type ApiResult<T> = Result<T, ApiError>;

/// 코어 에러를 API 에러로 변환합니다. 서버 측 에러는 로그를 남깁니다.
pub fn fund_error(err: FundError) -> ApiError {
    let (status, _) = status_for(&err);
    if status.is_server_error() {
        error!(error = %err, "요청 처리 실패");
    }
    (status, Json(ApiErrorResponse::from(err)))
}

/// 400 입력 오류.
pub fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiErrorResponse::new("INVALID_INPUT", message)),
    )
}

/// 404 리소스 없음.
pub fn not_found(message: impl Into<String>) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ApiErrorResponse::new("NOT_FOUND", message)),
    )
}

/// 403 권한 없음.
pub fn forbidden(message: impl Into<String>) -> ApiError {
    (
        StatusCode::FORBIDDEN,
        Json(ApiErrorResponse::new("FORBIDDEN", message)),
    )
}

/// 500 데이터베이스 오류.
pub fn db_error(err: impl std::fmt::Display) -> ApiError {
    error!(error = %err, "데이터베이스 오류");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiErrorResponse::new("DB_ERROR", "database error")),
    )
}

/// 데이터베이스 미설정.
pub fn db_unavailable() -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiErrorResponse::new("DATABASE_ERROR", "Database not available")),
    )
}

/// 임의 상태 코드 에러.
pub fn api_error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
    (status, Json(ApiErrorResponse::new(code, message)))
}

/// validator 에러를 400 응답으로 변환합니다.
pub fn validation_error(errors: validator::ValidationErrors) -> ApiError {
    let message = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{}: 유효하지 않은 값", field))
            })
        })
        .collect::<Vec<_>>()
        .join("; ");
    (
        StatusCode::BAD_REQUEST,
        Json(ApiErrorResponse::new("VALIDATION_ERROR", message)),
    )
}
