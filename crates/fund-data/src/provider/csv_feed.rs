//! 일일 수익률 CSV 피드.
//!
//! 형식 (첫 줄은 헤더):
//!
//! ```text
//! date,daily_return_percent,cumulative_return
//! 2024-01-02,0.85,1.0085
//! ```

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use fund_core::{DailyReturn, ReturnSeries};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::cache::ReturnTableLoader;
use crate::error::{DataError, Result};

/// CSV 본문을 파싱합니다.
///
/// 빈 줄이나 형식이 잘못된 줄은 건너뜁니다. 같은 날짜는 뒤의 줄이 이깁니다.
pub fn parse_returns_csv(content: &str) -> Vec<DailyReturn> {
    let mut rows = Vec::new();

    for (line_no, line) in content.lines().enumerate().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < 2 {
            debug!(line = line_no + 1, "필드 부족, 건너뜀");
            continue;
        }

        let Ok(trade_date) = NaiveDate::parse_from_str(fields[0], "%Y-%m-%d") else {
            debug!(line = line_no + 1, value = fields[0], "날짜 파싱 실패, 건너뜀");
            continue;
        };
        let Ok(daily_return_percent) = Decimal::from_str(fields[1]) else {
            debug!(line = line_no + 1, value = fields[1], "수익률 파싱 실패, 건너뜀");
            continue;
        };
        let cumulative_return = fields
            .get(2)
            .filter(|v| !v.is_empty())
            .and_then(|v| Decimal::from_str(v).ok());

        rows.push(DailyReturn {
            trade_date,
            daily_return_percent,
            cumulative_return,
        });
    }

    rows.sort_by_key(|r| r.trade_date);
    rows.dedup_by(|later, earlier| {
        if later.trade_date == earlier.trade_date {
            *earlier = later.clone();
            true
        } else {
            false
        }
    });
    rows
}

/// 원격 CSV 피드.
#[derive(Debug, Clone)]
pub struct CsvReturnFeed {
    client: reqwest::Client,
    url: String,
}

impl CsvReturnFeed {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// 피드 URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// 피드를 가져와 파싱합니다.
    pub async fn fetch(&self) -> Result<Vec<DailyReturn>> {
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(DataError::FetchError(format!(
                "{} returned {}",
                self.url,
                response.status()
            )));
        }
        let body = response.text().await?;
        let rows = parse_returns_csv(&body);
        info!(url = %self.url, rows = rows.len(), "수익률 CSV 수신");
        Ok(rows)
    }

    /// 로컬 파일을 읽어 파싱합니다.
    pub async fn read_file(path: impl AsRef<Path>) -> Result<Vec<DailyReturn>> {
        let path = path.as_ref();
        let body = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DataError::FetchError(format!("{}: {}", path.display(), e)))?;
        Ok(parse_returns_csv(&body))
    }
}

#[async_trait]
impl ReturnTableLoader for CsvReturnFeed {
    async fn load(&self) -> Result<ReturnSeries> {
        let rows = self.fetch().await?;
        Ok(ReturnSeries::from_rows(&rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_skips_header_and_bad_lines() {
        let csv = "date,daily_return_percent,cumulative_return\n\
                   2024-01-02,0.85,1.0085\n\
                   \n\
                   not-a-date,1,1\n\
                   2024-01-03,abc,1.01\n\
                   2024-01-04,-0.5,\n\
                   2024-01-05\n";
        let rows = parse_returns_csv(csv);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].trade_date, date(2024, 1, 2));
        assert_eq!(rows[0].cumulative_return, Some(dec!(1.0085)));
        assert_eq!(rows[1].daily_return_percent, dec!(-0.5));
        assert_eq!(rows[1].cumulative_return, None);
    }

    #[test]
    fn test_parse_last_write_wins() {
        let csv = "date,daily_return_percent,cumulative_return\n\
                   2024-01-02,1,1.01\n\
                   2024-01-02,2,1.02\n";
        let rows = parse_returns_csv(csv);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].daily_return_percent, dec!(2));
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let result = CsvReturnFeed::read_file("/nonexistent/returns.csv").await;
        assert!(matches!(result, Err(DataError::FetchError(_))));
    }
}
