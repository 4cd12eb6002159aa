//! 펀드 포털 배치 작업.
//!
//! API 서버와 독립적으로 실행되는 바이너리를 제공합니다:
//! - 야간 증분 잔고 계산 (실거래 클라이언트)
//! - 단일/전체 클라이언트 재계산
//! - 알고리즘 일일 수익률 CSV 가져오기
//! - 반기 명세서 발급 대상 확인

pub mod config;
pub mod error;
pub mod modules;
pub mod stats;

pub use config::SchedulerConfig;
pub use error::{Result, SchedulerError};
pub use stats::RunStats;
