//! 외부 백테스트 프로세스 기반 일일 수익률 소스.
//!
//! 스크립트는 다음 인자로 실행되고 stdout에 JSON 한 개를 출력합니다.
//!
//! ```text
//! <command> <script> --from-date D --to-date D --starting-balance N --output-format json
//! {"success": true, "daily_return_percent": 0.42}
//! ```
//!
//! 타임아웃은 `FallbackReturnSource`가 겁니다. 시간이 초과되어 future가 drop되면
//! 자식 프로세스도 종료됩니다.

use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDate;
use fund_core::{AccrualConfig, ReturnSource, ReturnSourceError};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

/// 백테스트 스크립트 출력.
#[derive(Debug, Deserialize)]
struct BacktestOutput {
    success: bool,
    #[serde(default)]
    daily_return_percent: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// 백테스트 프로세스 수익률 소스.
#[derive(Debug, Clone)]
pub struct SubprocessReturnSource {
    command: String,
    script: PathBuf,
    starting_balance: Decimal,
}

impl SubprocessReturnSource {
    pub fn new(command: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            script: script.into(),
            starting_balance: Decimal::new(100_000, 0),
        }
    }

    /// 설정에서 생성합니다.
    pub fn from_config(config: &AccrualConfig) -> Self {
        Self::new(config.backtest_command.clone(), config.backtest_script.clone())
            .with_starting_balance(config.starting_balance)
    }

    /// 시작 잔고를 지정합니다.
    pub fn with_starting_balance(mut self, balance: Decimal) -> Self {
        self.starting_balance = balance;
        self
    }

    /// 스크립트 stdout을 파싱합니다.
    pub fn parse_output(date: NaiveDate, stdout: &str) -> Result<Decimal, ReturnSourceError> {
        let output: BacktestOutput = serde_json::from_str(stdout.trim())
            .map_err(|e| ReturnSourceError::Malformed(e.to_string()))?;

        if !output.success {
            return Err(ReturnSourceError::Unavailable(
                date,
                output.error.unwrap_or_else(|| "script reported failure".to_string()),
            ));
        }

        match output.daily_return_percent {
            Some(serde_json::Value::Number(n)) => parse_decimal(&n.to_string()),
            Some(serde_json::Value::String(s)) => parse_decimal(&s),
            Some(other) => Err(ReturnSourceError::Malformed(format!(
                "daily_return_percent: {}",
                other
            ))),
            None => Err(ReturnSourceError::Unavailable(
                date,
                "daily_return_percent missing".to_string(),
            )),
        }
    }
}

fn parse_decimal(raw: &str) -> Result<Decimal, ReturnSourceError> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|e| ReturnSourceError::Malformed(format!("{}: {}", raw, e)))
}

#[async_trait]
impl ReturnSource for SubprocessReturnSource {
    fn name(&self) -> &str {
        "backtest"
    }

    async fn get(&self, date: NaiveDate) -> Result<Decimal, ReturnSourceError> {
        let day = date.format("%Y-%m-%d").to_string();
        debug!(script = %self.script.display(), date = %day, "백테스트 실행");

        let output = Command::new(&self.command)
            .arg(&self.script)
            .args(["--from-date", &day, "--to-date", &day])
            .args(["--starting-balance", &self.starting_balance.to_string()])
            .args(["--output-format", "json"])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ReturnSourceError::Unavailable(date, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReturnSourceError::Unavailable(
                date,
                format!("exit {}: {}", output.status, stderr.trim()),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::parse_output(date, &stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    #[test]
    fn test_parse_success() {
        let value = SubprocessReturnSource::parse_output(
            date(),
            r#"{"success": true, "daily_return_percent": 0.4213}"#,
        )
        .unwrap();
        assert_eq!(value, dec!(0.4213));

        let value = SubprocessReturnSource::parse_output(
            date(),
            r#"{"success": true, "daily_return_percent": "-1.5"}"#,
        )
        .unwrap();
        assert_eq!(value, dec!(-1.5));
    }

    #[test]
    fn test_parse_failure_modes() {
        let failed = SubprocessReturnSource::parse_output(
            date(),
            r#"{"success": false, "error": "no market data"}"#,
        );
        assert!(matches!(failed, Err(ReturnSourceError::Unavailable(..))));

        let missing = SubprocessReturnSource::parse_output(date(), r#"{"success": true}"#);
        assert!(matches!(missing, Err(ReturnSourceError::Unavailable(..))));

        let garbage = SubprocessReturnSource::parse_output(date(), "Traceback (most recent call last)");
        assert!(matches!(garbage, Err(ReturnSourceError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_missing_command_is_unavailable() {
        let source = SubprocessReturnSource::new("definitely-not-a-real-binary-xyz", "script.py");
        let result = source.get(date()).await;
        assert!(matches!(result, Err(ReturnSourceError::Unavailable(..))));
    }
}
