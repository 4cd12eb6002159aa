//! 외부 협력자 경계: 일일 수익률 소스와 시계.
//!
//! - `ReturnSource` - 날짜별 일일 수익률(%) 조회
//! - `FallbackReturnSource` - 타임아웃을 걸고 실패 시 0%로 대체
//! - `Clock` - 현재 시각 (테스트에서 고정 가능)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::warn;

/// 수익률 소스 에러.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReturnSourceError {
    /// 해당 날짜 데이터 없음
    #[error("return unavailable for {0}: {1}")]
    Unavailable(NaiveDate, String),

    /// 시간 초과
    #[error("return source timed out after {0:?}")]
    Timeout(Duration),

    /// 응답 형식 오류
    #[error("malformed return source output: {0}")]
    Malformed(String),
}

impl ReturnSourceError {
    /// 메트릭 레이블용 사유.
    pub fn reason(&self) -> &'static str {
        match self {
            ReturnSourceError::Unavailable(..) => "unavailable",
            ReturnSourceError::Timeout(_) => "timeout",
            ReturnSourceError::Malformed(_) => "malformed",
        }
    }
}

/// 날짜별 일일 수익률(%)을 제공하는 외부 소스.
#[async_trait]
pub trait ReturnSource: Send + Sync {
    /// 소스 이름 (로그용).
    fn name(&self) -> &str;

    /// `date`의 일일 수익률(%)을 조회합니다.
    async fn get(&self, date: NaiveDate) -> Result<Decimal, ReturnSourceError>;
}

#[async_trait]
impl<T: ReturnSource + ?Sized> ReturnSource for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn get(&self, date: NaiveDate) -> Result<Decimal, ReturnSourceError> {
        (**self).get(date).await
    }
}

/// 대체값 적용 여부가 포함된 조회 결과.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnFetch {
    /// 적용할 수익률 (%)
    pub percent: Decimal,
    /// 0%로 대체된 경우 그 원인
    pub fallback: Option<ReturnSourceError>,
}

impl ReturnFetch {
    /// 실제 소스 값인지 확인합니다.
    pub fn is_genuine(&self) -> bool {
        self.fallback.is_none()
    }
}

/// 최대 대기 시간을 두고, 실패하거나 시간이 초과되면 0%를 돌려주는 래퍼.
pub struct FallbackReturnSource<S> {
    inner: S,
    timeout: Duration,
}

impl<S: ReturnSource> FallbackReturnSource<S> {
    /// 새 래퍼를 생성합니다.
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// 내부 소스.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// 수익률을 조회합니다. 이 함수는 실패하지 않습니다.
    pub async fn fetch(&self, date: NaiveDate) -> ReturnFetch {
        let result = match tokio::time::timeout(self.timeout, self.inner.get(date)).await {
            Ok(result) => result,
            Err(_) => Err(ReturnSourceError::Timeout(self.timeout)),
        };

        match result {
            Ok(percent) => ReturnFetch {
                percent,
                fallback: None,
            },
            Err(e) => {
                warn!(
                    source = self.inner.name(),
                    date = %date,
                    error = %e,
                    "수익률 조회 실패, 0%로 대체"
                );
                metrics::counter!("return_source_fallback_total", "reason" => e.reason())
                    .increment(1);
                ReturnFetch {
                    percent: Decimal::ZERO,
                    fallback: Some(e),
                }
            }
        }
    }
}

/// 현재 시각 제공자.
pub trait Clock: Send + Sync {
    /// 현재 UTC 시각.
    fn now(&self) -> DateTime<Utc>;

    /// 오늘 날짜.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// 시스템 시계.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use fakes::*;

#[cfg(any(test, feature = "test-utils"))]
mod fakes {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// 고정/수동 진행 시계.
    #[derive(Debug)]
    pub struct FixedClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl FixedClock {
        /// 주어진 시각으로 고정된 시계.
        pub fn new(now: DateTime<Utc>) -> Self {
            Self {
                now: Mutex::new(now),
            }
        }

        /// 날짜 자정으로 고정된 시계.
        pub fn at_date(date: NaiveDate) -> Self {
            Self::new(date.and_time(chrono::NaiveTime::MIN).and_utc())
        }

        /// 시각을 변경합니다.
        pub fn set(&self, now: DateTime<Utc>) {
            *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
        }

        /// 시간을 진행합니다.
        pub fn advance(&self, by: chrono::Duration) {
            let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
            *now += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap_or_else(|e| e.into_inner())
        }
    }

    /// 메모리 내 수익률 소스.
    #[derive(Debug, Default)]
    pub struct StaticReturnSource {
        returns: HashMap<NaiveDate, Decimal>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl StaticReturnSource {
        /// 날짜별 수익률로 생성합니다.
        pub fn new<I>(returns: I) -> Self
        where
            I: IntoIterator<Item = (NaiveDate, Decimal)>,
        {
            Self {
                returns: returns.into_iter().collect(),
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        /// 응답 지연을 설정합니다.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// 호출 횟수.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReturnSource for StaticReturnSource {
        fn name(&self) -> &str {
            "static"
        }

        async fn get(&self, date: NaiveDate) -> Result<Decimal, ReturnSourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.returns
                .get(&date)
                .copied()
                .ok_or_else(|| ReturnSourceError::Unavailable(date, "no data".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_fallback_passes_through_genuine_value() {
        let source = FallbackReturnSource::new(
            StaticReturnSource::new(vec![(date(2024, 1, 2), dec!(1.25))]),
            Duration::from_secs(5),
        );
        let fetch = source.fetch(date(2024, 1, 2)).await;
        assert_eq!(fetch.percent, dec!(1.25));
        assert!(fetch.is_genuine());
    }

    #[tokio::test]
    async fn test_fallback_on_missing_date() {
        let source =
            FallbackReturnSource::new(StaticReturnSource::default(), Duration::from_secs(5));
        let fetch = source.fetch(date(2024, 1, 2)).await;
        assert_eq!(fetch.percent, Decimal::ZERO);
        assert!(matches!(fetch.fallback, Some(ReturnSourceError::Unavailable(..))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_on_timeout() {
        let source = FallbackReturnSource::new(
            StaticReturnSource::new(vec![(date(2024, 1, 2), dec!(3))])
                .with_delay(Duration::from_secs(60)),
            Duration::from_secs(30),
        );
        let fetch = source.fetch(date(2024, 1, 2)).await;
        assert_eq!(fetch.percent, Decimal::ZERO);
        assert_eq!(
            fetch.fallback,
            Some(ReturnSourceError::Timeout(Duration::from_secs(30)))
        );
    }

    #[test]
    fn test_fixed_clock_advance() {
        let clock = FixedClock::at_date(date(2024, 1, 1));
        clock.advance(chrono::Duration::days(2));
        assert_eq!(clock.today(), date(2024, 1, 3));
    }
}
