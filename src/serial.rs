//! 주문번호/명세번호 생성기
//!
//! 형식: 타임스탬프 접두 + 난수 접미. 전역 카운터가 아니므로 유일성은 난수 폭에 기대며,
//! 충돌 시에는 유니크 인덱스가 트랜잭션을 중단시킵니다.

use chrono::Utc;
use rand::Rng;

/// 수입 명세 접두사
pub const INCOME_PREFIX: &str = "INC";
/// 출금 명세 접두사
pub const WITHDRAW_PREFIX: &str = "WDR";

/// 번호 생성기 트레이트
pub trait SerialGenerator: Send + Sync {
    /// 주문번호
    fn order_no(&self) -> String;

    /// 원장 명세번호
    fn serial_no(&self, prefix: &str) -> String;
}

/// 기본 생성기
///
/// - 주문번호: `YYYYMMDDHHMMSS` + 6자리 난수
/// - 명세번호: 접두사 + `YYYYMMDD` + 8자리 난수
#[derive(Debug, Default, Clone, Copy)]
pub struct TimestampSerialGenerator;

impl SerialGenerator for TimestampSerialGenerator {
    fn order_no(&self) -> String {
        let suffix: u32 = rand::thread_rng().gen_range(100_000..=999_999);
        format!("{}{}", Utc::now().format("%Y%m%d%H%M%S"), suffix)
    }

    fn serial_no(&self, prefix: &str) -> String {
        let suffix: u32 = rand::thread_rng().gen_range(10_000_000..=99_999_999);
        format!("{}{}{}", prefix, Utc::now().format("%Y%m%d"), suffix)
    }
}
