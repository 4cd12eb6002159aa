//! 캐싱 레이어.
//!
//! - 누적 수익률 테이블: 명세서/성과 조회용 TTL 캐시

pub mod return_table;

pub use return_table::{CumulativeReturnCache, ReturnTableLoader, StoreTableLoader};
