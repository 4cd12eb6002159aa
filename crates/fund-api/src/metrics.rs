//! Prometheus 메트릭 설정 및 유틸리티.
//!
//! HTTP 요청 메트릭, 비즈니스 메트릭을 수집하고 `/metrics` 엔드포인트로 노출합니다.
//! 재계산 관련 메트릭(`accrual_recompute_*`, `return_source_fallback_total`)은
//! fund-core에서 같은 레코더로 기록됩니다.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Prometheus 메트릭 레코더를 설정하고 핸들을 반환합니다.
///
/// # 패닉
///
/// 레코더가 이미 설치되어 있으면 패닉합니다.
pub fn setup_metrics_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_request_duration_seconds".to_string()),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )
        .expect("히스토그램 버킷 설정 실패")
        .set_buckets_for_metric(
            Matcher::Full("accrual_recompute_duration_seconds".to_string()),
            &[0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0],
        )
        .expect("히스토그램 버킷 설정 실패")
        .install_recorder()
        .expect("Prometheus 레코더 설치 실패")
}

// ============================================================================
// HTTP 메트릭 헬퍼 함수
// ============================================================================

/// HTTP 요청 카운터 증가.
pub fn record_http_request(method: &str, path: &str) {
    counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string())
        .increment(1);
}

/// HTTP 응답 카운터 증가.
pub fn record_http_response(method: &str, path: &str, status: u16) {
    counter!(
        "http_responses_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// HTTP 요청 지속 시간 기록.
pub fn record_http_duration(method: &str, path: &str, duration_secs: f64) {
    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_secs);
}

// ============================================================================
// 비즈니스 메트릭 헬퍼 함수
// ============================================================================

/// 로그인 시도 결과 기록.
///
/// `result`: success, invalid_credentials, locked, two_factor_required, two_factor_failed
pub fn record_login_attempt(result: &'static str) {
    counter!("login_attempts_total", "result" => result).increment(1);
}

/// 입금 상태 변경 기록.
pub fn record_deposit_transition(status: &str) {
    counter!("deposit_transitions_total", "status" => status.to_string()).increment(1);
}

/// 출금 신청/처리 기록.
pub fn record_withdrawal_transition(status: &str) {
    counter!("withdrawal_transitions_total", "status" => status.to_string()).increment(1);
}

/// 수익률 가져오기 행 수 기록.
pub fn record_returns_imported(source: &str, rows: usize) {
    counter!("returns_imported_total", "source" => source.to_string()).increment(rows as u64);
}

/// 열린 지원 티켓 수 설정.
pub fn set_open_tickets(count: f64) {
    gauge!("support_tickets_open").set(count);
}

// ============================================================================
// 경로 정규화 유틸리티
// ============================================================================

/// 경로에서 동적 파라미터를 정규화합니다.
///
/// 예: `/api/v1/deposits/123e4567-e89b-12d3-a456-426614174000/status` → `/api/v1/deposits/:id/status`
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            let is_uuid = segment.len() == 36 && segment.chars().filter(|c| *c == '-').count() == 4;
            let is_numeric = !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit());
            // H1-2024 같은 명세서 ID
            let is_period = segment.len() == 7
                && (segment.starts_with("H1-") || segment.starts_with("H2-"))
                && segment[3..].chars().all(|c| c.is_ascii_digit());

            if is_uuid || is_numeric || is_period {
                ":id".to_string()
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/deposits/123e4567-e89b-12d3-a456-426614174000/status";
        assert_eq!(normalize_path(path), "/api/v1/deposits/:id/status");
    }

    #[test]
    fn test_normalize_path_numeric() {
        assert_eq!(normalize_path("/api/v1/support/12345"), "/api/v1/support/:id");
    }

    #[test]
    fn test_normalize_path_no_params() {
        assert_eq!(normalize_path("/api/v1/statements"), "/api/v1/statements");
    }

    #[test]
    fn test_normalize_path_statement_id() {
        assert_eq!(
            normalize_path("/api/v1/statements/H2-2023"),
            "/api/v1/statements/:id"
        );
        assert_eq!(normalize_path("/api/v1/H3-2023"), "/api/v1/H3-2023");
    }
}
