//! 잔액 원장
//!
//! 잔액 변경은 항상 명세 한 건과 같은 트랜잭션에서 일어납니다.
//! 정합성 조건: 잔액 == 실패 처리되지 않은 모든 명세 금액의 합.
//!
//! 출금은 요청 시점에 잔액을 차감하고 `WithdrawPending`으로 기록합니다.
//! 지급 결과가 확정되면 성공으로 바꾸거나, 실패 시 잔액을 복원하고 `WithdrawFailed`로 바꿉니다.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::Transaction;

use crate::config::CoreConfig;
use crate::db::models::BalanceRecord;
use crate::db::repository::{BalanceRecordRepository, NewRecord, UserRepository};
use crate::error::{CoreError, CoreResult};
use crate::identity::{Caller, Role, UserId};
use crate::money::Money;
use crate::page::{Page, PageRequest};
use crate::serial::{SerialGenerator, INCOME_PREFIX, WITHDRAW_PREFIX};

const ACCOUNT_MAX_CHARS: usize = 64;
const REAL_NAME_MAX_CHARS: usize = 16;

/// 명세 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[repr(i32)]
pub enum RecordKind {
    /// 서비스 수입
    Income = 1,
    /// 출금 성공
    WithdrawSuccess = 2,
    /// 출금 실패 (차감액 복원됨)
    WithdrawFailed = 3,
    /// 출금 처리 중
    WithdrawPending = 4,
}

impl RecordKind {
    pub fn is_withdrawal(self) -> bool {
        !matches!(self, RecordKind::Income)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RecordKind::Income => "서비스 수입",
            RecordKind::WithdrawSuccess => "출금 성공",
            RecordKind::WithdrawFailed => "출금 실패",
            RecordKind::WithdrawPending => "출금 처리 중",
        };
        f.write_str(label)
    }
}

/// 외부 지급 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WithdrawOutcome {
    Succeeded,
    Failed,
}

/// 출금 요청
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub amount: Money,
    /// 지급 계좌
    pub account: String,
    /// 예금주 실명
    pub real_name: String,
}

impl WithdrawRequest {
    pub fn validate(&self) -> CoreResult<()> {
        if !self.amount.is_positive() {
            return Err(CoreError::Validation(format!(
                "출금 금액은 0보다 커야 합니다 (입력: {})",
                self.amount
            )));
        }

        for (field, value, max) in [
            ("출금 계좌", &self.account, ACCOUNT_MAX_CHARS),
            ("예금주", &self.real_name, REAL_NAME_MAX_CHARS),
        ] {
            let value = value.trim();
            if value.is_empty() {
                return Err(CoreError::Validation(format!("{}은(는) 필수 항목입니다", field)));
            }
            if value.chars().count() > max {
                return Err(CoreError::Validation(format!("{}은(는) {}자를 넘을 수 없습니다", field, max)));
            }
        }

        Ok(())
    }
}

/// 잔액/원장 대사 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub companion_id: UserId,
    pub balance: Money,
    pub ledger_sum: Money,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.balance == self.ledger_sum
    }
}

/// 계좌번호 마스킹 (끝 4자리만 노출)
pub fn mask_account(account: &str) -> String {
    let chars: Vec<char> = account.trim().chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}

/// 원장 서비스
#[derive(Clone)]
pub struct LedgerService {
    pool: SqlitePool,
    config: CoreConfig,
    serials: Arc<dyn SerialGenerator>,
}

impl LedgerService {
    pub fn new(pool: SqlitePool, config: CoreConfig, serials: Arc<dyn SerialGenerator>) -> Self {
        Self { pool, config, serials }
    }

    /// 동행인 현재 잔액
    pub async fn balance(&self, caller: &Caller) -> CoreResult<Money> {
        let companion_id = caller.require(Role::Companion)?;
        let mut conn = self.pool.acquire().await?;
        match UserRepository::find(&mut conn, companion_id).await? {
            Some(user) if user.role == Role::Companion => Ok(user.balance),
            _ => Err(not_a_companion(companion_id)),
        }
    }

    /// 수입 입금
    ///
    /// 호출자의 트랜잭션 안에서만 실행되므로 이를 유발한 주문 전이 없이 단독으로 커밋될 수 없습니다.
    pub async fn credit(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        companion_id: UserId,
        amount: Money,
        remark: &str,
        order_no: &str,
    ) -> CoreResult<BalanceRecord> {
        if amount.is_negative() {
            return Err(CoreError::Validation(format!("입금액은 음수일 수 없습니다: {}", amount)));
        }

        if !UserRepository::credit(tx, companion_id, amount).await? {
            return Err(not_a_companion(companion_id));
        }

        let serial_no = self.serials.serial_no(INCOME_PREFIX);
        let id = BalanceRecordRepository::insert(
            tx,
            &NewRecord {
                serial_no: &serial_no,
                companion_id,
                kind: RecordKind::Income,
                amount,
                remark,
                ref_order_no: Some(order_no),
            },
            Utc::now(),
        )
        .await?;

        debug!("수입 입금 - companion={} amount={} serial={}", companion_id, amount, serial_no);

        BalanceRecordRepository::find(tx, id)
            .await?
            .ok_or_else(|| CoreError::NotFoundOrLocked(format!("명세를 찾을 수 없습니다: {}", serial_no)))
    }

    /// 출금 요청. 잔액 확인과 차감은 한 문장으로 처리되며, 부족하면 아무것도 바꾸지 않습니다.
    ///
    /// 반환값은 상태 추적용 명세번호입니다.
    pub async fn request_withdraw(&self, caller: &Caller, request: WithdrawRequest) -> CoreResult<String> {
        let companion_id = caller.require(Role::Companion)?;
        request.validate()?;
        let amount = request.amount;

        let mut tx = self.pool.begin().await?;

        if !UserRepository::debit_if_sufficient(&mut tx, companion_id, amount).await? {
            return Err(match UserRepository::find(&mut tx, companion_id).await? {
                Some(user) if user.role == Role::Companion => {
                    warn!(
                        "출금 거부 (잔액 부족) - companion={} balance={} requested={}",
                        companion_id, user.balance, amount
                    );
                    CoreError::InsufficientBalance {
                        balance: user.balance,
                        requested: amount,
                    }
                }
                _ => not_a_companion(companion_id),
            });
        }

        let serial_no = self.serials.serial_no(WITHDRAW_PREFIX);
        let remark = format!(
            "출금: {} (예금주: {})",
            mask_account(&request.account),
            request.real_name.trim()
        );

        BalanceRecordRepository::insert(
            &mut tx,
            &NewRecord {
                serial_no: &serial_no,
                companion_id,
                kind: RecordKind::WithdrawPending,
                amount: -amount,
                remark: &remark,
                ref_order_no: None,
            },
            Utc::now(),
        )
        .await?;

        tx.commit().await?;

        info!("🏧 출금 요청 - companion={} amount={} serial={}", companion_id, amount, serial_no);
        Ok(serial_no)
    }

    /// 지급 결과 반영
    ///
    /// - 처리 중 → 성공: 종류만 변경
    /// - 처리 중/성공 → 실패: 차감액 복원 후 종류 변경
    /// - 이미 확정된 결과를 다시 적용하면 `WithdrawAlreadyResolved`
    ///
    /// 조건부 종류 변경이 트랜잭션의 첫 쓰기이므로 동시에 같은 결과를 반영해도 한 건만 적용됩니다.
    pub async fn resolve_withdraw(&self, serial_no: &str, outcome: WithdrawOutcome) -> CoreResult<BalanceRecord> {
        let (from, target): (&[RecordKind], RecordKind) = match outcome {
            WithdrawOutcome::Succeeded => (&[RecordKind::WithdrawPending], RecordKind::WithdrawSuccess),
            WithdrawOutcome::Failed => (
                &[RecordKind::WithdrawPending, RecordKind::WithdrawSuccess],
                RecordKind::WithdrawFailed,
            ),
        };

        let mut tx = self.pool.begin().await?;

        let applied = BalanceRecordRepository::relabel(&mut tx, serial_no, from, target).await?;
        let record = BalanceRecordRepository::find_by_serial(&mut tx, serial_no)
            .await?
            .filter(|record| record.kind.is_withdrawal())
            .ok_or_else(|| CoreError::NotFoundOrLocked(format!("출금 명세가 존재하지 않습니다: {}", serial_no)))?;

        if !applied {
            warn!("출금 결과 중복 반영 - serial={} kind={:?} outcome={:?}", serial_no, record.kind, outcome);
            return Err(CoreError::WithdrawAlreadyResolved {
                serial_no: serial_no.to_string(),
            });
        }

        if target == RecordKind::WithdrawFailed {
            // 출금액은 음수로 기록되어 있음
            let restore = -record.amount;
            if !UserRepository::credit(&mut tx, record.companion_id, restore).await? {
                return Err(not_a_companion(record.companion_id));
            }
            info!(
                "출금 실패 처리 - serial={} companion={} restored={}",
                serial_no, record.companion_id, restore
            );
        } else {
            info!("출금 성공 처리 - serial={} companion={}", serial_no, record.companion_id);
        }

        tx.commit().await?;
        Ok(record)
    }

    /// 지급 실패가 뒤늦게 확인된 출금 정정 (잔액 복원 + 실패로 변경)
    pub async fn correct_withdraw_outcome(&self, serial_no: &str) -> CoreResult<BalanceRecord> {
        self.resolve_withdraw(serial_no, WithdrawOutcome::Failed).await
    }

    /// 명세 목록 (최신순, 종류 필터 선택)
    pub async fn list_records(
        &self,
        caller: &Caller,
        kind: Option<RecordKind>,
        page: PageRequest,
    ) -> CoreResult<Page<BalanceRecord>> {
        let companion_id = caller.require(Role::Companion)?;
        let (limit, offset) = page.limit_offset(self.config.max_page_size)?;

        let mut conn = self.pool.acquire().await?;
        let (items, total) = BalanceRecordRepository::list(&mut conn, companion_id, kind, limit, offset).await?;
        debug!("명세 목록 조회 - companion={} kind={:?} total={}", companion_id, kind, total);

        Ok(Page::new(items, total, page))
    }

    pub async fn find_record(&self, serial_no: &str) -> CoreResult<BalanceRecord> {
        let mut conn = self.pool.acquire().await?;
        BalanceRecordRepository::find_by_serial(&mut conn, serial_no)
            .await?
            .ok_or_else(|| CoreError::NotFoundOrLocked(format!("명세가 존재하지 않습니다: {}", serial_no)))
    }

    /// 잔액과 원장 합계 대사
    pub async fn reconcile(&self, companion_id: UserId) -> CoreResult<Reconciliation> {
        let mut conn = self.pool.acquire().await?;
        let user = UserRepository::find(&mut conn, companion_id)
            .await?
            .filter(|user| user.role == Role::Companion)
            .ok_or_else(|| not_a_companion(companion_id))?;
        let ledger_sum = BalanceRecordRepository::effective_sum(&mut conn, companion_id).await?;

        let result = Reconciliation {
            companion_id,
            balance: user.balance,
            ledger_sum,
        };
        if !result.is_consistent() {
            warn!(
                "⚠️ 잔액 불일치 - companion={} balance={} ledger={}",
                companion_id, result.balance, result.ledger_sum
            );
        }
        Ok(result)
    }
}

fn not_a_companion(user_id: UserId) -> CoreError {
    CoreError::NotFoundOrLocked(format!("동행인 계정이 아닙니다: {}", user_id))
}
