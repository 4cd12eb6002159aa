//! 설정 관리.
//!
//! 이 모듈은 애플리케이션 설정을 정의하고 관리합니다.
//! 비밀 값(`DATABASE_URL`, `JWT_SECRET`)은 설정 파일이 아닌 환경 변수에서만 읽습니다.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::domain::GracePolicy;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// 서버 설정
    pub server: ServerConfig,
    /// 데이터베이스 설정
    pub database: DatabaseConfig,
    /// 로깅 설정
    pub logging: LoggingConfig,
    /// 잔고 재계산 설정
    pub accrual: AccrualConfig,
    /// 인증 설정
    pub auth: AuthConfig,
    /// 명세서 설정
    pub statements: StatementsConfig,
}

/// 서버 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트
    pub port: u16,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// IP당 분당 요청 한도
    pub rate_limit_rpm: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            request_timeout_secs: 30,
            rate_limit_rpm: 600,
        }
    }
}

/// 데이터베이스 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 최대 연결 수
    pub max_connections: u32,
    /// 연결 타임아웃 (초)
    pub connection_timeout_secs: u64,
    /// 유휴 타임아웃 (초)
    pub idle_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            connection_timeout_secs: 30,
            idle_timeout_secs: 300,
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 잔고 재계산 및 수익률 소스 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccrualConfig {
    /// 외부 수익률 계산 최대 대기 시간 (초)
    pub return_source_timeout_secs: u64,
    /// 누적 수익률 테이블 캐시 TTL (초)
    pub return_cache_ttl_secs: u64,
    /// 주말에는 야간 배치를 건너뜀
    pub skip_weekends: bool,
    /// 백테스트 실행 명령 (예: python3)
    pub backtest_command: String,
    /// 백테스트 스크립트 경로
    pub backtest_script: String,
    /// 백테스트 시작 잔고
    pub starting_balance: Decimal,
    /// 일일 수익률 CSV 피드 URL (선택)
    pub returns_csv_url: Option<String>,
}

impl Default for AccrualConfig {
    fn default() -> Self {
        Self {
            return_source_timeout_secs: 30,
            return_cache_ttl_secs: 300,
            skip_weekends: true,
            backtest_command: "python3".to_string(),
            backtest_script: "python/backtest.py".to_string(),
            starting_balance: Decimal::new(100_000, 0),
            returns_csv_url: None,
        }
    }
}

impl AccrualConfig {
    /// 수익률 소스 타임아웃을 Duration으로 반환
    pub fn return_source_timeout(&self) -> Duration {
        Duration::from_secs(self.return_source_timeout_secs)
    }

    /// 캐시 TTL을 Duration으로 반환
    pub fn return_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.return_cache_ttl_secs)
    }
}

/// 인증 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// 세션 토큰 유효 시간 (시간)
    pub jwt_expiry_hours: i64,
    /// 2FA 대기 토큰 유효 시간 (분)
    pub challenge_expiry_minutes: i64,
    /// 로그인 실패 허용 횟수
    pub login_max_attempts: u32,
    /// 로그인 실패 집계 구간 (분)
    pub login_window_minutes: u64,
    /// TOTP 발급자 이름
    pub totp_issuer: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_expiry_hours: 24,
            challenge_expiry_minutes: 5,
            login_max_attempts: 5,
            login_window_minutes: 15,
            totp_issuer: "Aequitas Capital Partners".to_string(),
        }
    }
}

/// 반기 명세서 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StatementsConfig {
    /// H1 명세서 발급 가능 월
    pub h1_grace_month: u32,
    /// H1 명세서 발급 가능 일
    pub h1_grace_day: u32,
    /// H2 명세서 발급 가능 월 (다음 해)
    pub h2_grace_month: u32,
    /// H2 명세서 발급 가능 일 (다음 해)
    pub h2_grace_day: u32,
}

impl Default for StatementsConfig {
    fn default() -> Self {
        let policy = GracePolicy::default();
        Self {
            h1_grace_month: policy.h1_month,
            h1_grace_day: policy.h1_day,
            h2_grace_month: policy.h2_month,
            h2_grace_day: policy.h2_day,
        }
    }
}

impl StatementsConfig {
    /// 발급 유예 정책으로 변환합니다.
    pub fn grace_policy(&self) -> GracePolicy {
        GracePolicy {
            h1_month: self.h1_grace_month,
            h1_day: self.h1_grace_day,
            h2_month: self.h2_grace_month,
            h2_day: self.h2_grace_day,
        }
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 파일이 없으면 기본값과 환경 변수만 사용합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            // 파일에서 로드
            .add_source(config::File::from(path.as_ref()).required(false))
            // 환경 변수로 오버라이드 (예: FUND__SERVER__PORT=8080)
            .add_source(
                config::Environment::with_prefix("FUND")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> Result<Self, config::ConfigError> {
        Self::load("config/default.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.accrual.return_cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.auth.login_max_attempts, 5);
        assert_eq!(config.statements.grace_policy(), GracePolicy::default());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = AppConfig::load("does/not/exist.toml").unwrap();
        assert_eq!(config.auth.jwt_expiry_hours, 24);
        assert!(config.accrual.skip_weekends);
    }
}
