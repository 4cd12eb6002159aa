//! 누적 수익률 테이블 TTL 캐시.
//!
//! 명세서 계산은 요청마다 전체 누적 수익률 테이블을 필요로 합니다.
//! 테이블은 TTL 동안 메모리에 보관되고, 만료 후 첫 요청이 다시 로드합니다.
//! 로드 실패 시 빈 테이블을 반환하며 실패 결과는 캐시하지 않습니다.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fund_core::{AccrualStore, Clock, ReturnSeries};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{DataError, Result};
use crate::storage::ReturnRepository;

/// 수익률 테이블 로더.
#[async_trait]
pub trait ReturnTableLoader: Send + Sync {
    /// 전체 수익률 테이블을 로드합니다.
    async fn load(&self) -> Result<ReturnSeries>;
}

#[async_trait]
impl ReturnTableLoader for ReturnRepository {
    async fn load(&self) -> Result<ReturnSeries> {
        self.load_series().await
    }
}

/// `AccrualStore`의 수익률 시리즈를 읽는 로더.
pub struct StoreTableLoader {
    store: Arc<dyn AccrualStore>,
}

impl StoreTableLoader {
    pub fn new(store: Arc<dyn AccrualStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ReturnTableLoader for StoreTableLoader {
    async fn load(&self) -> Result<ReturnSeries> {
        self.store
            .load_return_series()
            .await
            .map_err(|e| DataError::QueryError(e.to_string()))
    }
}

struct CachedTable {
    loaded_at: DateTime<Utc>,
    table: Arc<ReturnSeries>,
}

/// 누적 수익률 테이블 캐시.
pub struct CumulativeReturnCache {
    loader: Arc<dyn ReturnTableLoader>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    state: RwLock<Option<CachedTable>>,
}

impl CumulativeReturnCache {
    pub fn new(loader: Arc<dyn ReturnTableLoader>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            loader,
            clock,
            ttl,
            state: RwLock::new(None),
        }
    }

    fn is_fresh(&self, cached: &CachedTable, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(cached.loaded_at);
        age >= chrono::Duration::zero()
            && age.to_std().map(|a| a < self.ttl).unwrap_or(false)
    }

    /// 테이블을 반환합니다. 만료되었으면 다시 로드합니다.
    pub async fn get(&self) -> Arc<ReturnSeries> {
        let now = self.clock.now();
        {
            let state = self.state.read().await;
            if let Some(cached) = state.as_ref() {
                if self.is_fresh(cached, now) {
                    return Arc::clone(&cached.table);
                }
            }
        }

        let mut state = self.state.write().await;
        // 대기 중 다른 요청이 이미 로드했을 수 있음
        if let Some(cached) = state.as_ref() {
            if self.is_fresh(cached, now) {
                return Arc::clone(&cached.table);
            }
        }

        match self.loader.load().await {
            Ok(series) => {
                debug!(points = series.len(), "누적 수익률 테이블 로드");
                let table = Arc::new(series);
                *state = Some(CachedTable {
                    loaded_at: now,
                    table: Arc::clone(&table),
                });
                table
            }
            Err(e) => {
                warn!(error = %e, "누적 수익률 테이블 로드 실패, 빈 테이블 사용");
                Arc::new(ReturnSeries::new())
            }
        }
    }

    /// 캐시를 비웁니다. 수익률 가져오기 직후 호출합니다.
    pub async fn invalidate(&self) {
        *self.state.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use fund_core::FixedClock;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingLoader {
        loads: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl ReturnTableLoader for CountingLoader {
        async fn load(&self) -> Result<ReturnSeries> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(DataError::FetchError("feed down".to_string()));
            }
            let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
            Ok(ReturnSeries::from_daily([(date, dec!(1))]))
        }
    }

    fn setup() -> (Arc<CountingLoader>, Arc<FixedClock>, CumulativeReturnCache) {
        let loader = Arc::new(CountingLoader::default());
        let clock = Arc::new(FixedClock::at_date(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        ));
        let cache = CumulativeReturnCache::new(
            loader.clone(),
            clock.clone(),
            Duration::from_secs(300),
        );
        (loader, clock, cache)
    }

    #[tokio::test]
    async fn test_reuses_table_within_ttl() {
        let (loader, clock, cache) = setup();

        assert_eq!(cache.get().await.len(), 1);
        clock.advance(chrono::Duration::seconds(299));
        cache.get().await;
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);

        clock.advance(chrono::Duration::seconds(1));
        cache.get().await;
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_returns_empty_and_is_not_cached() {
        let (loader, _clock, cache) = setup();
        loader.fail.store(true, Ordering::SeqCst);

        assert!(cache.get().await.is_empty());

        loader.fail.store(false, Ordering::SeqCst);
        assert_eq!(cache.get().await.len(), 1);
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let (loader, _clock, cache) = setup();
        cache.get().await;
        cache.invalidate().await;
        cache.get().await;
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    }
}
