//! IP별 요청 rate limiting.
//!
//! Token Bucket 기반. 로그인 실패 제한(`auth::LoginLimiter`)과 별개로 모든 요청에 적용됩니다.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::ApiErrorResponse;

/// Rate Limiter 설정.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// 분당 최대 요청 수
    pub requests_per_minute: u32,
    /// 순간적으로 허용되는 추가 요청
    pub burst_size: u32,
    /// 유휴 버킷 정리 기준
    pub idle_timeout: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(600)
    }
}

impl RateLimitConfig {
    /// 분당 한도와 10% 버스트.
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            burst_size: requests_per_minute / 10,
            idle_timeout: Duration::from_secs(300),
        }
    }

    /// 버스트 없음.
    pub fn strict(requests_per_minute: u32) -> Self {
        Self {
            burst_size: 0,
            ..Self::new(requests_per_minute)
        }
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    max_tokens: f64,
    /// 초당 리필 토큰
    refill_rate: f64,
}

impl TokenBucket {
    fn new(config: &RateLimitConfig) -> Self {
        let refill_rate = config.requests_per_minute as f64 / 60.0;
        let max_tokens = refill_rate + config.burst_size as f64;
        Self {
            tokens: max_tokens,
            last_refill: Instant::now(),
            max_tokens,
            refill_rate,
        }
    }

    fn try_acquire(&mut self) -> Result<(), u64> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let wait = (1.0 - self.tokens) / self.refill_rate;
            Err(wait.ceil().max(1.0) as u64)
        }
    }
}

/// Rate Limit 확인 결과.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed,
    Limited {
        /// 재시도까지 대기 시간 (초)
        retry_after: u64,
    },
}

/// IP 주소별 Rate Limiter.
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Arc<RwLock<HashMap<IpAddr, TokenBucket>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 요청 허용 여부 확인.
    pub async fn check(&self, ip: IpAddr) -> RateLimitResult {
        let mut buckets = self.buckets.write().await;
        let bucket = buckets
            .entry(ip)
            .or_insert_with(|| TokenBucket::new(&self.config));

        match bucket.try_acquire() {
            Ok(()) => RateLimitResult::Allowed,
            Err(retry_after) => RateLimitResult::Limited { retry_after },
        }
    }

    /// 유휴 버킷 정리.
    pub async fn cleanup(&self) {
        let idle = self.config.idle_timeout;
        self.buckets
            .write()
            .await
            .retain(|_, bucket| bucket.last_refill.elapsed() < idle);
    }

    /// 추적 중인 IP 수.
    pub async fn tracked_ips(&self) -> usize {
        self.buckets.read().await.len()
    }
}

/// Rate Limit 미들웨어 상태.
#[derive(Clone)]
pub struct RateLimitState {
    limiter: RateLimiter,
}

impl RateLimitState {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            limiter: RateLimiter::new(config),
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}

/// Rate Limiting 미들웨어 함수.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let ip = extract_client_ip(&request);

    match state.limiter.check(ip).await {
        RateLimitResult::Allowed => {
            counter!("rate_limit_requests_total", "status" => "allowed").increment(1);
            next.run(request).await
        }
        RateLimitResult::Limited { retry_after } => {
            counter!("rate_limit_requests_total", "status" => "limited").increment(1);
            tracing::warn!(client_ip = %ip, retry_after, "Rate limit exceeded");

            let body = ApiErrorResponse::with_details(
                "RATE_LIMITED",
                "Rate limit exceeded. Please try again later.",
                serde_json::json!({ "retry_after": retry_after }),
            );
            let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after));
            response
        }
    }
}

/// 클라이언트 IP 추출.
///
/// X-Forwarded-For, X-Real-IP, 소켓 주소 순으로 확인합니다.
fn extract_client_ip(request: &Request) -> IpAddr {
    let header_ip = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    };

    header_ip("x-forwarded-for")
        .or_else(|| header_ip("x-real-ip"))
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip())
        })
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
