//! 테이블별 저장소
//!
//! 모든 함수는 `&mut SqliteConnection`을 받습니다. 호출자가 트랜잭션(`&mut *tx`)이나
//! 풀 연결(`&mut *conn`) 중 무엇을 넘기느냐로 원자성 범위가 정해집니다.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use sqlx::types::Json;
use sqlx::Error as SqlxError;

use super::models::{
    BalanceRecord, Demand, DemandId, Evaluation, EvaluationId, Order, OrderId, RecordId, User,
};
use crate::demand::{DemandDraft, DemandStatus};
use crate::identity::{Role, UserId};
use crate::ledger::RecordKind;
use crate::money::Money;
use crate::order::OrderStatus;

const USER_COLUMNS: &str = "id, phone, nickname, role, balance, created_at";

const DEMAND_COLUMNS: &str = "id, patient_id, hospital, hospital_addr, service_time, expected_price,
     service_content, contact_name, contact_phone, status, order_id, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, order_no, demand_id, patient_id, companion_id, order_amount,
     companion_income, status, has_patient_eval, has_companion_eval, cancel_reason, created_at, updated_at";

const RECORD_COLUMNS: &str =
    "id, serial_no, companion_id, kind, amount, remark, ref_order_no, created_at";

const EVALUATION_COLUMNS: &str =
    "id, order_id, from_user_id, to_user_id, score, content, img_urls, created_at";

/// 역할별 주문 당사자 컬럼
fn party_column(role: Role) -> &'static str {
    match role {
        Role::Patient => "patient_id",
        Role::Companion => "companion_id",
    }
}

/// 역할별 평가 플래그 컬럼
fn evaluated_column(role: Role) -> &'static str {
    match role {
        Role::Patient => "has_patient_eval",
        Role::Companion => "has_companion_eval",
    }
}

/// 사용자 저장소
pub struct UserRepository;

impl UserRepository {
    pub async fn insert(
        conn: &mut SqliteConnection,
        phone: &str,
        nickname: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<UserId, SqlxError> {
        let result = sqlx::query(
            "INSERT INTO users (phone, nickname, role, balance, created_at) VALUES (?, ?, ?, 0, ?)"
        )
        .bind(phone)
        .bind(nickname)
        .bind(role)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find(conn: &mut SqliteConnection, id: UserId) -> Result<Option<User>, SqlxError> {
        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
    }

    /// 동행인 잔액 증가
    pub async fn credit(
        conn: &mut SqliteConnection,
        companion_id: UserId,
        amount: Money,
    ) -> Result<bool, SqlxError> {
        let result = sqlx::query("UPDATE users SET balance = balance + ? WHERE id = ? AND role = ?")
            .bind(amount)
            .bind(companion_id)
            .bind(Role::Companion)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// 잔액이 충분할 때만 차감 (확인과 차감이 한 문장)
    pub async fn debit_if_sufficient(
        conn: &mut SqliteConnection,
        companion_id: UserId,
        amount: Money,
    ) -> Result<bool, SqlxError> {
        let result = sqlx::query(
            "UPDATE users SET balance = balance - ?
             WHERE id = ? AND role = ? AND balance >= ?"
        )
        .bind(amount)
        .bind(companion_id)
        .bind(Role::Companion)
        .bind(amount)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

/// 동행 요청 저장소 (철회된 요청은 조회에서 제외)
pub struct DemandRepository;

impl DemandRepository {
    pub async fn insert(
        conn: &mut SqliteConnection,
        patient_id: UserId,
        draft: &DemandDraft,
        now: DateTime<Utc>,
    ) -> Result<DemandId, SqlxError> {
        let result = sqlx::query(
            "INSERT INTO demands
             (patient_id, hospital, hospital_addr, service_time, expected_price, service_content,
              contact_name, contact_phone, status, order_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)"
        )
        .bind(patient_id)
        .bind(draft.hospital.trim())
        .bind(draft.hospital_addr.trim())
        .bind(draft.service_time)
        .bind(draft.expected_price)
        .bind(draft.service_content.trim())
        .bind(draft.contact_name.trim())
        .bind(draft.contact_phone.trim())
        .bind(DemandStatus::Open)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find(conn: &mut SqliteConnection, id: DemandId) -> Result<Option<Demand>, SqlxError> {
        sqlx::query_as::<_, Demand>(&format!(
            "SELECT {} FROM demands WHERE id = ? AND deleted_at IS NULL",
            DEMAND_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
    }

    /// 본인 소유의 대기 중 요청만 수정
    pub async fn update_open(
        conn: &mut SqliteConnection,
        id: DemandId,
        patient_id: UserId,
        draft: &DemandDraft,
        now: DateTime<Utc>,
    ) -> Result<bool, SqlxError> {
        let result = sqlx::query(
            "UPDATE demands
             SET hospital = ?, hospital_addr = ?, service_time = ?, expected_price = ?,
                 service_content = ?, contact_name = ?, contact_phone = ?, updated_at = ?
             WHERE id = ? AND patient_id = ? AND status = ? AND deleted_at IS NULL"
        )
        .bind(draft.hospital.trim())
        .bind(draft.hospital_addr.trim())
        .bind(draft.service_time)
        .bind(draft.expected_price)
        .bind(draft.service_content.trim())
        .bind(draft.contact_name.trim())
        .bind(draft.contact_phone.trim())
        .bind(now)
        .bind(id)
        .bind(patient_id)
        .bind(DemandStatus::Open)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// 본인 소유의 대기 중 요청을 철회 (소프트 삭제)
    pub async fn withdraw_open(
        conn: &mut SqliteConnection,
        id: DemandId,
        patient_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, SqlxError> {
        let result = sqlx::query(
            "UPDATE demands SET deleted_at = ?, updated_at = ?
             WHERE id = ? AND patient_id = ? AND status = ? AND deleted_at IS NULL"
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(patient_id)
        .bind(DemandStatus::Open)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// OPEN → CLAIMED 선점. 동시 수락 중 한 건만 true를 받습니다.
    pub async fn mark_claimed(
        conn: &mut SqliteConnection,
        id: DemandId,
        now: DateTime<Utc>,
    ) -> Result<bool, SqlxError> {
        let result = sqlx::query(
            "UPDATE demands SET status = ?, updated_at = ?
             WHERE id = ? AND status = ? AND deleted_at IS NULL"
        )
        .bind(DemandStatus::Claimed)
        .bind(now)
        .bind(id)
        .bind(DemandStatus::Open)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn link_order(
        conn: &mut SqliteConnection,
        id: DemandId,
        order_id: OrderId,
    ) -> Result<bool, SqlxError> {
        let result = sqlx::query("UPDATE demands SET order_id = ? WHERE id = ? AND status = ?")
            .bind(order_id)
            .bind(id)
            .bind(DemandStatus::Claimed)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// CLAIMED → OPEN, 연결된 주문 해제
    pub async fn reopen(
        conn: &mut SqliteConnection,
        id: DemandId,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<bool, SqlxError> {
        let result = sqlx::query(
            "UPDATE demands SET status = ?, order_id = NULL, updated_at = ?
             WHERE id = ? AND status = ? AND order_id = ?"
        )
        .bind(DemandStatus::Open)
        .bind(now)
        .bind(id)
        .bind(DemandStatus::Claimed)
        .bind(order_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn list_by_patient(
        conn: &mut SqliteConnection,
        patient_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Demand>, i64), SqlxError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM demands WHERE patient_id = ? AND deleted_at IS NULL"
        )
        .bind(patient_id)
        .fetch_one(&mut *conn)
        .await?;

        let demands = sqlx::query_as::<_, Demand>(&format!(
            "SELECT {} FROM demands
             WHERE patient_id = ? AND deleted_at IS NULL
             ORDER BY created_at DESC, id DESC
             LIMIT ? OFFSET ?",
            DEMAND_COLUMNS
        ))
        .bind(patient_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?;

        Ok((demands, total))
    }

    /// 수락 대기 중인 요청 (동행인용 목록)
    pub async fn list_open(
        conn: &mut SqliteConnection,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Demand>, i64), SqlxError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM demands WHERE status = ? AND deleted_at IS NULL"
        )
        .bind(DemandStatus::Open)
        .fetch_one(&mut *conn)
        .await?;

        let demands = sqlx::query_as::<_, Demand>(&format!(
            "SELECT {} FROM demands
             WHERE status = ? AND deleted_at IS NULL
             ORDER BY created_at DESC, id DESC
             LIMIT ? OFFSET ?",
            DEMAND_COLUMNS
        ))
        .bind(DemandStatus::Open)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?;

        Ok((demands, total))
    }
}

/// 신규 주문
#[derive(Debug, Clone)]
pub struct NewOrder<'a> {
    pub order_no: &'a str,
    pub demand_id: DemandId,
    pub patient_id: UserId,
    pub companion_id: UserId,
    pub order_amount: Money,
    pub companion_income: Money,
}

/// 주문 저장소
pub struct OrderRepository;

impl OrderRepository {
    pub async fn insert(
        conn: &mut SqliteConnection,
        order: &NewOrder<'_>,
        now: DateTime<Utc>,
    ) -> Result<OrderId, SqlxError> {
        let result = sqlx::query(
            "INSERT INTO orders
             (order_no, demand_id, patient_id, companion_id, order_amount, companion_income,
              status, has_patient_eval, has_companion_eval, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, 0, ?, ?)"
        )
        .bind(order.order_no)
        .bind(order.demand_id)
        .bind(order.patient_id)
        .bind(order.companion_id)
        .bind(order.order_amount)
        .bind(order.companion_income)
        .bind(OrderStatus::PendingService)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find(conn: &mut SqliteConnection, id: OrderId) -> Result<Option<Order>, SqlxError> {
        sqlx::query_as::<_, Order>(&format!("SELECT {} FROM orders WHERE id = ?", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
    }

    /// 상태 조건부 전이. 당사자와 현재 상태가 모두 일치할 때만 갱신됩니다.
    pub async fn transition(
        conn: &mut SqliteConnection,
        id: OrderId,
        role: Role,
        user_id: UserId,
        from: OrderStatus,
        to: OrderStatus,
        cancel_reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, SqlxError> {
        let result = sqlx::query(&format!(
            "UPDATE orders
             SET status = ?, cancel_reason = COALESCE(?, cancel_reason), updated_at = ?
             WHERE id = ? AND {} = ? AND status = ?",
            party_column(role)
        ))
        .bind(to)
        .bind(cancel_reason)
        .bind(now)
        .bind(id)
        .bind(user_id)
        .bind(from)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// 완료된 주문의 평가 플래그를 당사자 본인이 한 번만 세웁니다.
    pub async fn mark_evaluated(
        conn: &mut SqliteConnection,
        id: OrderId,
        role: Role,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, SqlxError> {
        let flag = evaluated_column(role);
        let party = party_column(role);
        let result = sqlx::query(&format!(
            "UPDATE orders SET {flag} = 1, updated_at = ?
             WHERE id = ? AND {party} = ? AND status = ? AND {flag} = 0"
        ))
        .bind(now)
        .bind(id)
        .bind(user_id)
        .bind(OrderStatus::Completed)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// 당사자별 주문 목록 (상태 필터 선택)
    pub async fn list_by_party(
        conn: &mut SqliteConnection,
        role: Role,
        user_id: UserId,
        status: Option<OrderStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Order>, i64), SqlxError> {
        let column = party_column(role);

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM orders WHERE {} = ? AND (? IS NULL OR status = ?)",
            column
        ))
        .bind(user_id)
        .bind(status)
        .bind(status)
        .fetch_one(&mut *conn)
        .await?;

        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders
             WHERE {} = ? AND (? IS NULL OR status = ?)
             ORDER BY created_at DESC, id DESC
             LIMIT ? OFFSET ?",
            ORDER_COLUMNS, column
        ))
        .bind(user_id)
        .bind(status)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?;

        Ok((orders, total))
    }

    pub async fn list_by_demand(
        conn: &mut SqliteConnection,
        demand_id: DemandId,
    ) -> Result<Vec<Order>, SqlxError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE demand_id = ? ORDER BY id ASC",
            ORDER_COLUMNS
        ))
        .bind(demand_id)
        .fetch_all(&mut *conn)
        .await
    }
}

/// 신규 잔액 명세
#[derive(Debug, Clone)]
pub struct NewRecord<'a> {
    pub serial_no: &'a str,
    pub companion_id: UserId,
    pub kind: RecordKind,
    pub amount: Money,
    pub remark: &'a str,
    pub ref_order_no: Option<&'a str>,
}

/// 잔액 명세 저장소
pub struct BalanceRecordRepository;

impl BalanceRecordRepository {
    pub async fn insert(
        conn: &mut SqliteConnection,
        record: &NewRecord<'_>,
        now: DateTime<Utc>,
    ) -> Result<RecordId, SqlxError> {
        let result = sqlx::query(
            "INSERT INTO balance_records
             (serial_no, companion_id, kind, amount, remark, ref_order_no, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(record.serial_no)
        .bind(record.companion_id)
        .bind(record.kind)
        .bind(record.amount)
        .bind(record.remark)
        .bind(record.ref_order_no)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find(conn: &mut SqliteConnection, id: RecordId) -> Result<Option<BalanceRecord>, SqlxError> {
        sqlx::query_as::<_, BalanceRecord>(&format!(
            "SELECT {} FROM balance_records WHERE id = ?",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
    }

    pub async fn find_by_serial(
        conn: &mut SqliteConnection,
        serial_no: &str,
    ) -> Result<Option<BalanceRecord>, SqlxError> {
        sqlx::query_as::<_, BalanceRecord>(&format!(
            "SELECT {} FROM balance_records WHERE serial_no = ?",
            RECORD_COLUMNS
        ))
        .bind(serial_no)
        .fetch_optional(&mut *conn)
        .await
    }

    /// 명세 종류 변경 (현재 종류가 `from` 중 하나일 때만)
    pub async fn relabel(
        conn: &mut SqliteConnection,
        serial_no: &str,
        from: &[RecordKind],
        to: RecordKind,
    ) -> Result<bool, SqlxError> {
        if from.is_empty() {
            return Ok(false);
        }

        let placeholders = vec!["?"; from.len()].join(", ");
        let sql = format!(
            "UPDATE balance_records SET kind = ? WHERE serial_no = ? AND kind IN ({})",
            placeholders
        );
        let mut query = sqlx::query(&sql).bind(to).bind(serial_no);
        for kind in from {
            query = query.bind(*kind);
        }
        let result = query.execute(&mut *conn).await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn list(
        conn: &mut SqliteConnection,
        companion_id: UserId,
        kind: Option<RecordKind>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<BalanceRecord>, i64), SqlxError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM balance_records WHERE companion_id = ? AND (? IS NULL OR kind = ?)"
        )
        .bind(companion_id)
        .bind(kind)
        .bind(kind)
        .fetch_one(&mut *conn)
        .await?;

        let records = sqlx::query_as::<_, BalanceRecord>(&format!(
            "SELECT {} FROM balance_records
             WHERE companion_id = ? AND (? IS NULL OR kind = ?)
             ORDER BY created_at DESC, id DESC
             LIMIT ? OFFSET ?",
            RECORD_COLUMNS
        ))
        .bind(companion_id)
        .bind(kind)
        .bind(kind)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?;

        Ok((records, total))
    }

    /// 잔액에 반영되어 있어야 하는 명세 합계 (실패 처리된 출금 제외)
    pub async fn effective_sum(conn: &mut SqliteConnection, companion_id: UserId) -> Result<Money, SqlxError> {
        let cents: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM balance_records WHERE companion_id = ? AND kind != ?"
        )
        .bind(companion_id)
        .bind(RecordKind::WithdrawFailed)
        .fetch_one(&mut *conn)
        .await?;

        Ok(Money::from_cents(cents))
    }
}

/// 신규 평가
#[derive(Debug, Clone)]
pub struct NewEvaluation<'a> {
    pub order_id: OrderId,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub score: i32,
    pub content: &'a str,
    pub img_urls: &'a [String],
}

/// 평가 저장소
pub struct EvaluationRepository;

impl EvaluationRepository {
    pub async fn insert(
        conn: &mut SqliteConnection,
        evaluation: &NewEvaluation<'_>,
        now: DateTime<Utc>,
    ) -> Result<EvaluationId, SqlxError> {
        let result = sqlx::query(
            "INSERT INTO evaluations
             (order_id, from_user_id, to_user_id, score, content, img_urls, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(evaluation.order_id)
        .bind(evaluation.from_user_id)
        .bind(evaluation.to_user_id)
        .bind(evaluation.score)
        .bind(evaluation.content)
        .bind(Json(evaluation.img_urls))
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find(conn: &mut SqliteConnection, id: EvaluationId) -> Result<Option<Evaluation>, SqlxError> {
        sqlx::query_as::<_, Evaluation>(&format!(
            "SELECT {} FROM evaluations WHERE id = ?",
            EVALUATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
    }

    pub async fn list_by_order(
        conn: &mut SqliteConnection,
        order_id: OrderId,
    ) -> Result<Vec<Evaluation>, SqlxError> {
        sqlx::query_as::<_, Evaluation>(&format!(
            "SELECT {} FROM evaluations WHERE order_id = ? ORDER BY id ASC",
            EVALUATION_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await
    }

    /// 사용자가 받은 평가 목록
    pub async fn list_received(
        conn: &mut SqliteConnection,
        to_user_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Evaluation>, i64), SqlxError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM evaluations WHERE to_user_id = ?")
            .bind(to_user_id)
            .fetch_one(&mut *conn)
            .await?;

        let evaluations = sqlx::query_as::<_, Evaluation>(&format!(
            "SELECT {} FROM evaluations
             WHERE to_user_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ? OFFSET ?",
            EVALUATION_COLUMNS
        ))
        .bind(to_user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?;

        Ok((evaluations, total))
    }
}
