//! 펀드 포털의 도메인 모델.

mod account;
mod deposit;
mod return_series;
mod statement;

pub use account::*;
pub use deposit::*;
pub use return_series::*;
pub use statement::*;
