//! 사용자 계정
//!
//! 인증 정보와 토큰은 외부 계층 소관입니다. 여기서는 역할과 잔액을 가진 사용자 행만 관리합니다.

use chrono::Utc;
use log::{info, warn};
use sqlx::sqlite::SqlitePool;

use crate::db::models::User;
use crate::db::repository::UserRepository;
use crate::error::{CoreError, CoreResult};
use crate::identity::{Role, UserId};

const PHONE_DIGITS: usize = 11;
const NICKNAME_MAX_CHARS: usize = 16;

/// 계정 서비스
#[derive(Clone)]
pub struct AccountService {
    pool: SqlitePool,
}

impl AccountService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 사용자 등록 (잔액 0)
    pub async fn register(&self, phone: &str, nickname: &str, role: Role) -> CoreResult<User> {
        let phone = phone.trim();
        if phone.len() != PHONE_DIGITS || !phone.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::Validation(format!(
                "전화번호는 숫자 {}자리여야 합니다",
                PHONE_DIGITS
            )));
        }
        let nickname = nickname.trim();
        if nickname.chars().count() > NICKNAME_MAX_CHARS {
            return Err(CoreError::Validation(format!(
                "닉네임은 {}자를 넘을 수 없습니다",
                NICKNAME_MAX_CHARS
            )));
        }

        let mut conn = self.pool.acquire().await?;
        let id = match UserRepository::insert(&mut conn, phone, nickname, role, Utc::now()).await {
            Ok(id) => id,
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                warn!("중복 전화번호 등록 시도 - phone={}", phone);
                return Err(CoreError::Validation(format!("이미 등록된 전화번호입니다: {}", phone)));
            }
            Err(err) => return Err(err.into()),
        };

        let user = UserRepository::find(&mut conn, id)
            .await?
            .ok_or_else(|| CoreError::NotFoundOrLocked(format!("등록한 사용자를 찾을 수 없습니다: {}", id)))?;

        info!("👤 사용자 등록 - id={} role={}", user.id, user.role);
        Ok(user)
    }

    pub async fn get(&self, user_id: UserId) -> CoreResult<User> {
        let mut conn = self.pool.acquire().await?;
        UserRepository::find(&mut conn, user_id)
            .await?
            .ok_or_else(|| CoreError::NotFoundOrLocked(format!("사용자가 존재하지 않습니다: {}", user_id)))
    }
}
