//! 이메일별 로그인 실패 제한.
//!
//! 집계 구간 안에서 실패가 한도에 도달하면 구간이 끝날 때까지 로그인을 막습니다.
//! 로그인에 성공하면 카운터를 초기화합니다.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct FailureWindow {
    count: u32,
    started: Instant,
}

/// 로그인 실패 제한기.
#[derive(Debug, Clone)]
pub struct LoginLimiter {
    max_attempts: u32,
    window: Duration,
    failures: Arc<RwLock<HashMap<String, FailureWindow>>>,
}

impl LoginLimiter {
    /// 새 제한기 생성.
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            failures: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 기본값: 15분 동안 5회.
    pub fn with_defaults() -> Self {
        Self::new(5, Duration::from_secs(15 * 60))
    }

    fn key(email: &str) -> String {
        email.trim().to_lowercase()
    }

    /// 현재 로그인이 막혀 있는지 확인합니다.
    pub async fn is_blocked(&self, email: &str) -> bool {
        let failures = self.failures.read().await;
        failures.get(&Self::key(email)).is_some_and(|w| {
            w.started.elapsed() < self.window && w.count >= self.max_attempts
        })
    }

    /// 실패를 기록하고 현재 구간의 실패 횟수를 반환합니다.
    pub async fn record_failure(&self, email: &str) -> u32 {
        let mut failures = self.failures.write().await;
        let now = Instant::now();
        let entry = failures.entry(Self::key(email)).or_insert(FailureWindow {
            count: 0,
            started: now,
        });

        if now.duration_since(entry.started) >= self.window {
            *entry = FailureWindow {
                count: 0,
                started: now,
            };
        }
        entry.count += 1;
        entry.count
    }

    /// 성공한 로그인 후 카운터를 초기화합니다.
    pub async fn reset(&self, email: &str) {
        self.failures.write().await.remove(&Self::key(email));
    }

    /// 만료된 항목 정리.
    pub async fn cleanup(&self) {
        let window = self.window;
        self.failures
            .write()
            .await
            .retain(|_, w| w.started.elapsed() < window);
    }
}

impl Default for LoginLimiter {
    fn default() -> Self {
        Self::with_defaults()
    }
}
