//! 모든 핸들러에서 공유되는 애플리케이션 상태.
//!
//! AppState는 모든 API 핸들러에서 공유되는 상태를 관리합니다.
//! Arc로 래핑되어 여러 요청 간에 안전하게 공유됩니다.

use std::sync::Arc;

use fund_core::{AppConfig, Clock, GracePolicy, RecalculationScheduler};
use fund_data::{CumulativeReturnCache, Database, ReturnRepository};

use crate::auth::{JwtConfig, LoginLimiter};

/// 애플리케이션 공유 상태.
#[derive(Clone)]
pub struct AppState {
    /// 애플리케이션 설정
    pub config: AppConfig,

    /// JWT 서명 키
    pub jwt: JwtConfig,

    /// 데이터베이스 연결 풀 (PostgreSQL)
    pub db_pool: Option<sqlx::PgPool>,

    /// 잔고 재계산 스케줄러 - 잔고와 성과 궤적을 쓰는 유일한 경로
    pub scheduler: Arc<RecalculationScheduler>,

    /// 누적 수익률 테이블 캐시 (명세서 계산용)
    pub return_cache: Arc<CumulativeReturnCache>,

    /// 일일 수익률 repository (DB 연결 시)
    pub returns: Option<ReturnRepository>,

    /// 이메일별 로그인 실패 제한
    pub login_limiter: LoginLimiter,

    /// 주입된 시계
    pub clock: Arc<dyn Clock>,

    /// 서버 시작 시간 (업타임 계산용)
    pub started_at: chrono::DateTime<chrono::Utc>,

    /// API 버전
    pub version: String,
}

impl AppState {
    /// 새로운 AppState 생성.
    pub fn new(
        config: AppConfig,
        jwt: JwtConfig,
        scheduler: Arc<RecalculationScheduler>,
        return_cache: Arc<CumulativeReturnCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let login_limiter = LoginLimiter::new(
            config.auth.login_max_attempts,
            std::time::Duration::from_secs(config.auth.login_window_minutes * 60),
        );

        Self {
            config,
            jwt,
            db_pool: None,
            scheduler,
            return_cache,
            returns: None,
            login_limiter,
            clock,
            started_at: chrono::Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// 데이터베이스 연결 설정.
    ///
    /// 수익률 repository도 같은 풀로 생성됩니다.
    pub fn with_db_pool(mut self, pool: sqlx::PgPool) -> Self {
        self.returns = Some(ReturnRepository::new(Database::from_pool(pool.clone())));
        self.db_pool = Some(pool);
        self
    }

    /// 오늘 날짜 (주입된 시계 기준).
    pub fn today(&self) -> chrono::NaiveDate {
        self.clock.today()
    }

    /// 명세서 발급 유예 정책.
    pub fn grace_policy(&self) -> GracePolicy {
        self.config.statements.grace_policy()
    }

    /// 서버 업타임(초) 반환.
    pub fn uptime_secs(&self) -> i64 {
        chrono::Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds()
    }

    /// 데이터베이스 연결 상태 확인.
    pub async fn is_db_healthy(&self) -> bool {
        if let Some(pool) = &self.db_pool {
            sqlx::query("SELECT 1").fetch_one(pool).await.is_ok()
        } else {
            false
        }
    }
}

/// 테스트용 AppState 생성 헬퍼.
///
/// 실제 DB 연결 없이 메모리 저장소와 고정 시계(2024-07-10)로 상태를 구성합니다.
#[cfg(any(test, feature = "test-utils"))]
pub fn create_test_state() -> AppState {
    create_test_state_with(Arc::new(fund_core::MemoryAccrualStore::new()))
}

/// 주어진 메모리 저장소로 테스트용 AppState를 생성합니다.
#[cfg(any(test, feature = "test-utils"))]
pub fn create_test_state_with(store: Arc<fund_core::MemoryAccrualStore>) -> AppState {
    use chrono::NaiveDate;
    use fund_core::{AccrualStore, FixedClock, ReturnSource, StaticReturnSource};
    use fund_data::StoreTableLoader;

    use crate::auth::DEV_JWT_SECRET;

    let today = NaiveDate::from_ymd_opt(2024, 7, 10).unwrap_or_default();
    let clock: Arc<dyn Clock> = Arc::new(FixedClock::at_date(today));
    let store: Arc<dyn AccrualStore> = store;
    let source: Arc<dyn ReturnSource> = Arc::new(StaticReturnSource::default());

    let config = AppConfig::default();
    let scheduler = Arc::new(RecalculationScheduler::new(
        store.clone(),
        source,
        clock.clone(),
    ));
    let cache = Arc::new(CumulativeReturnCache::new(
        Arc::new(StoreTableLoader::new(store)),
        clock.clone(),
        config.accrual.return_cache_ttl(),
    ));

    AppState::new(config, JwtConfig::new(DEV_JWT_SECRET), scheduler, cache, clock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_without_db() {
        let state = create_test_state();
        assert!(state.db_pool.is_none());
        assert!(state.returns.is_none());
        assert!(!state.is_db_healthy().await);
        assert_eq!(state.today().to_string(), "2024-07-10");
        assert!(state.uptime_secs() >= 0);
    }
}
