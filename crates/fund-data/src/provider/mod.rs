//! 일일 수익률 Provider 모듈.
//!
//! ## 백테스트 프로세스
//! - `SubprocessReturnSource`: 외부 백테스트 스크립트를 날짜별로 실행
//!
//! ## 데이터베이스
//! - `DbReturnSource`: `algorithm_daily_returns`에 가져온 값을 조회
//!
//! ## CSV 피드
//! - `CsvReturnFeed`: `date,daily_return_percent,cumulative_return` 피드 가져오기

pub mod csv_feed;
pub mod db;
pub mod subprocess;

pub use csv_feed::{parse_returns_csv, CsvReturnFeed};
pub use db::DbReturnSource;
pub use subprocess::SubprocessReturnSource;
