//! 배치 실행 통계.

use std::time::Duration;

use fund_core::{BatchReport, ClientRunResult, ClientRunStatus, NightlyReport};
use serde::{Deserialize, Serialize};

/// 배치 작업 통계
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// 총 처리 대상 수
    pub total: usize,
    /// 성공 횟수
    pub success: usize,
    /// 에러 횟수
    pub errors: usize,
    /// 건너뛴 횟수
    pub skipped: usize,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RunStats {
    /// 새 통계 객체 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 클라이언트별 결과에서 통계 생성
    pub fn from_results(results: &[ClientRunResult], elapsed: Duration) -> Self {
        let mut stats = Self {
            total: results.len(),
            elapsed,
            ..Default::default()
        };
        for result in results {
            match result.status {
                ClientRunStatus::Updated => stats.success += 1,
                ClientRunStatus::Skipped => stats.skipped += 1,
                ClientRunStatus::Failed => stats.errors += 1,
            }
        }
        stats
    }

    /// 야간 배치 결과에서 통계 생성
    pub fn from_nightly(report: &NightlyReport, elapsed: Duration) -> Self {
        Self::from_results(&report.results, elapsed)
    }

    /// 전체 재계산 결과에서 통계 생성
    pub fn from_batch(report: &BatchReport, elapsed: Duration) -> Self {
        Self::from_results(&report.results, elapsed)
    }

    /// 성공률 계산 (%)
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.success as f64 / self.total as f64) * 100.0
        }
    }

    /// 에러 없이 끝났는지 확인
    pub fn is_clean(&self) -> bool {
        self.errors == 0
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            total = self.total,
            success = self.success,
            errors = self.errors,
            skipped = self.skipped,
            success_rate = format!("{:.1}%", self.success_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "작업 완료"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fund_core::FundError;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_from_results_counts_each_status() {
        let results = vec![
            ClientRunResult::updated(Uuid::new_v4(), dec!(1000)),
            ClientRunResult::updated(Uuid::new_v4(), dec!(2500)),
            ClientRunResult::skipped(Uuid::new_v4(), "no contributing balance"),
            ClientRunResult::failed(Uuid::new_v4(), &FundError::Database("timeout".into())),
        ];

        let stats = RunStats::from_results(&results, Duration::from_millis(1500));
        assert_eq!(stats.total, 4);
        assert_eq!(stats.success, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.errors, 1);
        assert!(!stats.is_clean());
        assert!((stats.success_rate() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_stats() {
        let stats = RunStats::new();
        assert_eq!(stats.success_rate(), 0.0);
        assert!(stats.is_clean());
    }
}
