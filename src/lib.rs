//! 병원 동행 서비스 코어
//!
//! 요청 → 주문 → 정산 → 출금 흐름의 상태 머신과 잔액 원장을 다룹니다.
//! 여러 엔티티를 바꾸는 연산은 모두 하나의 sqlx 트랜잭션 안에서 실행됩니다.

pub mod account;
pub mod config;
pub mod db;
pub mod demand;
pub mod error;
pub mod evaluation;
pub mod identity;
pub mod ledger;
pub mod money;
pub mod order;
pub mod page;
pub mod platform;
pub mod serial;

pub use config::{ConfigError, CoreConfig};
pub use error::{CoreError, CoreResult};
pub use identity::{Caller, Role, UserId};
pub use money::Money;
pub use page::{Page, PageRequest};
pub use platform::Platform;
