//! 환경변수 기반 설정 모듈.
//!
//! 잔고 계산 관련 설정(`accrual`, `statements`, `database`)은 `AppConfig`를 그대로 쓰고,
//! 배치 실행 주기와 시간대만 환경변수로 받습니다.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Timelike};
use chrono_tz::Tz;
use fund_core::AppConfig;

use crate::error::SchedulerError;
use crate::Result;

/// 야간 배치 기본 시간대
pub const DEFAULT_TIMEZONE: &str = "Europe/London";

/// 배치 전체 설정
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 데이터베이스 URL
    pub database_url: String,
    /// 수익률 소스 (`db` 또는 `backtest`)
    pub return_source: ReturnSourceKind,
    /// 데몬 모드 설정
    pub daemon: DaemonConfig,
    /// 공통 애플리케이션 설정
    pub app: AppConfig,
}

/// 일일 수익률 조회 경로
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnSourceKind {
    /// `algorithm_daily_returns` 테이블
    Database,
    /// 백테스트 서브프로세스
    Backtest,
}

impl ReturnSourceKind {
    fn from_env_value(value: Option<&str>) -> Self {
        match value {
            Some("db") | Some("database") => Self::Database,
            _ => Self::Backtest,
        }
    }
}

/// 데몬 모드 설정
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// 깨어나는 주기 (분 단위)
    pub interval_minutes: u64,
    /// 야간 배치 실행 시각 (현지 시각, 0-23)
    pub nightly_hour: u32,
    /// 기준 시간대
    pub timezone: Tz,
    /// 야간 배치 전에 CSV 피드에서 수익률을 가져올지 여부
    pub import_before_nightly: bool,
}

impl SchedulerConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL").map_err(|_| {
            SchedulerError::Config("DATABASE_URL 환경변수가 설정되지 않았습니다".to_string())
        })?;

        let app = AppConfig::load_default()?;

        let timezone_name =
            std::env::var("SCHEDULER_TIMEZONE").unwrap_or_else(|_| DEFAULT_TIMEZONE.to_string());
        let timezone = parse_timezone(&timezone_name)?;

        let nightly_hour: u32 = env_var_parse("NIGHTLY_HOUR", 22);
        if nightly_hour > 23 {
            return Err(SchedulerError::Config(format!(
                "NIGHTLY_HOUR는 0-23 범위여야 합니다: {}",
                nightly_hour
            )));
        }

        Ok(Self {
            database_url,
            return_source: ReturnSourceKind::from_env_value(
                std::env::var("RETURN_SOURCE").ok().as_deref(),
            ),
            daemon: DaemonConfig {
                interval_minutes: env_var_parse("DAEMON_INTERVAL_MINUTES", 15),
                nightly_hour,
                timezone,
                import_before_nightly: env_var_bool("IMPORT_BEFORE_NIGHTLY", false),
            },
            app,
        })
    }
}

impl DaemonConfig {
    /// 깨어나는 주기를 Duration으로 반환
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.max(1) * 60)
    }

    /// 기준 시간대의 현지 시각
    pub fn local_now(&self, now: DateTime<chrono::Utc>) -> DateTime<Tz> {
        self.timezone.from_utc_datetime(&now.naive_utc())
    }

    /// 지금 야간 배치를 돌려야 하는 날짜.
    ///
    /// 현지 시각이 실행 시각 이후이고 그 날짜에 아직 실행하지 않았으면 현지 날짜를 반환합니다.
    pub fn nightly_due(
        &self,
        now: DateTime<chrono::Utc>,
        last_run: Option<NaiveDate>,
    ) -> Option<NaiveDate> {
        let local = self.local_now(now);
        let today = local.date_naive();
        if local.hour() < self.nightly_hour {
            return None;
        }
        match last_run {
            Some(last) if last >= today => None,
            _ => Some(today),
        }
    }
}

/// IANA 시간대 이름 파싱
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|e| SchedulerError::Config(format!("알 수 없는 시간대 {}: {}", name, e)))
}

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용)
fn env_var_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// 환경변수에서 bool 값 파싱
fn env_var_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn daemon(hour: u32) -> DaemonConfig {
        DaemonConfig {
            interval_minutes: 15,
            nightly_hour: hour,
            timezone: parse_timezone(DEFAULT_TIMEZONE).unwrap(),
            import_before_nightly: false,
        }
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_parse_timezone() {
        assert_eq!(parse_timezone("Europe/London").unwrap(), chrono_tz::Europe::London);
        assert!(parse_timezone("Mars/Olympus_Mons").is_err());
    }

    #[test]
    fn test_nightly_due_respects_local_hour() {
        let config = daemon(22);

        // 7월은 BST(UTC+1): 20:30 UTC = 21:30 현지
        assert_eq!(config.nightly_due(utc(2024, 7, 2, 20, 30), None), None);
        // 21:10 UTC = 22:10 현지
        assert_eq!(
            config.nightly_due(utc(2024, 7, 2, 21, 10), None),
            NaiveDate::from_ymd_opt(2024, 7, 2)
        );
    }

    #[test]
    fn test_nightly_due_once_per_day() {
        let config = daemon(22);
        let today = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();

        // 1월은 GMT(UTC+0)
        assert_eq!(config.nightly_due(utc(2024, 1, 10, 22, 5), Some(today)), None);
        assert_eq!(
            config.nightly_due(utc(2024, 1, 10, 22, 5), today.pred_opt()),
            Some(today)
        );
    }

    #[test]
    fn test_local_date_crosses_midnight() {
        let config = DaemonConfig {
            timezone: parse_timezone("Asia/Seoul").unwrap(),
            ..daemon(6)
        };

        // 22:00 UTC = 다음 날 07:00 KST
        assert_eq!(
            config.nightly_due(utc(2024, 3, 4, 22, 0), None),
            NaiveDate::from_ymd_opt(2024, 3, 5)
        );
    }

    #[test]
    fn test_return_source_kind() {
        assert_eq!(ReturnSourceKind::from_env_value(Some("db")), ReturnSourceKind::Database);
        assert_eq!(ReturnSourceKind::from_env_value(None), ReturnSourceKind::Backtest);
        assert_eq!(ReturnSourceKind::from_env_value(Some("other")), ReturnSourceKind::Backtest);
    }

    #[test]
    fn test_interval_minimum() {
        let config = DaemonConfig {
            interval_minutes: 0,
            ..daemon(22)
        };
        assert_eq!(config.interval(), Duration::from_secs(60));
    }
}
