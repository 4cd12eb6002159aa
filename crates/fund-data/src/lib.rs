//! 데이터 관리 및 저장.
//!
//! 이 crate는 다음을 제공합니다:
//! - PostgreSQL 저장소 (`PgAccrualStore`, 수익률 repository, 마이그레이션)
//! - 외부 백테스트 프로세스 기반 일일 수익률 소스
//! - 일일 수익률 CSV 피드 파서/가져오기
//! - 누적 수익률 테이블 TTL 캐시

pub mod cache;
pub mod error;
pub mod provider;
pub mod storage;

pub use error::{DataError, Result};

pub use cache::{CumulativeReturnCache, ReturnTableLoader, StoreTableLoader};
pub use provider::{parse_returns_csv, CsvReturnFeed, DbReturnSource, SubprocessReturnSource};
pub use storage::{Database, DatabaseConfig, PgAccrualStore, ReturnRepository};
