//! 호출자 식별 정보
//!
//! 인증은 외부 계층에서 끝난 상태로 들어옵니다. 코어는 (사용자 ID, 역할)만 받습니다.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

pub type UserId = i64;

/// 참여자 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[repr(i32)]
pub enum Role {
    /// 환자/보호자
    Patient = 1,
    /// 동행인
    Companion = 2,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::Patient => "환자",
            Role::Companion => "동행인",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 인증된 호출자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn patient(user_id: UserId) -> Self {
        Self::new(user_id, Role::Patient)
    }

    pub fn companion(user_id: UserId) -> Self {
        Self::new(user_id, Role::Companion)
    }

    /// 호출자가 요구 역할일 때만 사용자 ID를 돌려줍니다.
    pub fn require(&self, role: Role) -> CoreResult<UserId> {
        if self.role == role {
            Ok(self.user_id)
        } else {
            Err(CoreError::Unauthorized(format!(
                "{} 전용 기능입니다 (호출자: {})",
                role, self.role
            )))
        }
    }
}
