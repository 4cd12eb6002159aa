//! 잔고 재계산 엔진과 명세서 계산기.
//!
//! 이 모듈의 함수는 순수 계산만 수행하며 로그나 I/O가 없습니다.

mod accrual;
mod statement_calc;

pub use accrual::*;
pub use statement_calc::*;
