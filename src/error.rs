//! 코어 에러 타입
//!
//! 모든 가드 위반은 변경 전에 감지되어 동기적으로 반환됩니다.
//! 트랜잭션 도중 실패하면 해당 단위 전체가 롤백됩니다.

use crate::money::Money;

/// 코어 연산 에러
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// 잘못된 입력값 (형식/범위)
    #[error("입력값 오류: {0}")]
    Validation(String),

    /// 대상이 없거나 요청한 전이를 허용하지 않는 상태
    #[error("{0}")]
    NotFoundOrLocked(String),

    /// 호출자 역할로는 수행할 수 없는 연산
    #[error("권한 없음: {0}")]
    Unauthorized(String),

    /// 호출자가 대상의 당사자가 아님
    #[error("본인 건이 아닙니다: {0}")]
    OwnershipMismatch(String),

    #[error("본인이 등록한 요청은 수락할 수 없습니다")]
    SelfClaimForbidden,

    #[error("잔액 부족 (현재 잔액: {balance}, 요청 금액: {requested})")]
    InsufficientBalance { balance: Money, requested: Money },

    #[error("이미 평가한 주문입니다")]
    AlreadyEvaluated,

    /// 평가 가능한 상태(완료)가 아니거나 존재하지 않는 주문
    #[error("평가할 수 없는 주문: {0}")]
    OrderNotEligible(String),

    #[error("이미 처리된 출금입니다: {serial_no}")]
    WithdrawAlreadyResolved { serial_no: String },

    /// 저장소 커밋/쿼리 실패
    #[error("트랜잭션 실패: {0}")]
    TransactionAborted(#[from] sqlx::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
