//! # Fund Core
//!
//! 펀드 클라이언트 포털의 핵심 도메인 모델과 잔고 계산 엔진을 제공합니다.
//!
//! - 입금 원장과 수익률 시리즈
//! - 일 단위 잔고 재계산 엔진 (`AccrualEngine`)
//! - 누적 수익률 비율 기반 명세서 계산기 (`StatementCalculator`)
//! - 재계산 스케줄러 (`RecalculationScheduler`)와 저장소/수익률 소스 경계
//! - 설정 관리와 로깅 인프라

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod logging;
pub mod scheduler;
pub mod source;
pub mod types;

pub use config::*;
pub use domain::*;
pub use engine::*;
pub use error::*;
pub use logging::*;
pub use scheduler::*;
pub use source::*;
pub use types::*;
