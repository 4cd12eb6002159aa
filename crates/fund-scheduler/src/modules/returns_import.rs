//! 알고리즘 일일 수익률 가져오기.
//!
//! 로컬 CSV 파일 또는 원격 CSV 피드를 읽어 `algorithm_daily_returns` 테이블에 upsert 합니다.

use std::path::PathBuf;
use std::time::Instant;

use fund_core::DailyReturn;
use fund_data::{CsvReturnFeed, ReturnRepository};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::{Result, RunStats};

/// 가져올 CSV 위치
#[derive(Debug, Clone)]
pub enum ImportSource {
    /// 로컬 파일
    File(PathBuf),
    /// 원격 URL
    Url(String),
}

impl ImportSource {
    /// 저장소에 기록되는 출처 이름
    pub fn label(&self) -> &'static str {
        match self {
            ImportSource::File(_) => "csv",
            ImportSource::Url(_) => "feed",
        }
    }

    async fn read(&self) -> Result<Vec<DailyReturn>> {
        let rows = match self {
            ImportSource::File(path) => CsvReturnFeed::read_file(path).await?,
            ImportSource::Url(url) => CsvReturnFeed::new(url.clone())?.fetch().await?,
        };
        Ok(rows)
    }
}

/// 저장 가능한 행과 버린 행 수.
///
/// -100% 이하의 일일 수익률이나 0 이하의 누적 지수는 버립니다.
pub fn split_valid_rows(rows: Vec<DailyReturn>) -> (Vec<DailyReturn>, usize) {
    let total = rows.len();
    let valid: Vec<DailyReturn> = rows
        .into_iter()
        .filter(|row| {
            let ok = row.daily_return_percent > -Decimal::ONE_HUNDRED
                && row.cumulative_return.map_or(true, |c| c > Decimal::ZERO);
            if !ok {
                warn!(trade_date = %row.trade_date, "비정상 수익률 행, 건너뜀");
            }
            ok
        })
        .collect();
    let dropped = total - valid.len();
    (valid, dropped)
}

/// CSV를 읽어 수익률 테이블에 저장합니다.
pub async fn import_returns(repo: &ReturnRepository, source: &ImportSource) -> Result<RunStats> {
    let start = Instant::now();
    let rows = source.read().await?;
    let total = rows.len();

    let (rows, dropped) = split_valid_rows(rows);
    if rows.is_empty() {
        warn!(source = ?source, "가져올 유효한 행이 없습니다");
        return Ok(RunStats {
            total,
            skipped: dropped,
            elapsed: start.elapsed(),
            ..Default::default()
        });
    }

    let imported = repo.import(&rows, source.label()).await?;
    info!(
        imported,
        dropped,
        first_date = %rows[0].trade_date,
        last_date = %rows[rows.len() - 1].trade_date,
        "수익률 가져오기 완료"
    );

    Ok(RunStats {
        total,
        success: imported,
        skipped: dropped,
        elapsed: start.elapsed(),
        ..Default::default()
    })
}
