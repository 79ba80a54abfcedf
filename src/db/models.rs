use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;

use crate::demand::DemandStatus;
use crate::identity::{Role, UserId};
use crate::ledger::RecordKind;
use crate::money::Money;
use crate::order::OrderStatus;

pub type DemandId = i64;
pub type OrderId = i64;
pub type RecordId = i64;
pub type EvaluationId = i64;

/// 사용자 DB 모델
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: UserId,
    pub phone: String,
    pub nickname: String,
    pub role: Role,
    /// 출금 가능 잔액 (동행인만 의미 있음)
    pub balance: Money,
    pub created_at: DateTime<Utc>,
}

/// 동행 요청 DB 모델
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Demand {
    pub id: DemandId,
    pub patient_id: UserId,
    pub hospital: String,
    pub hospital_addr: String,
    pub service_time: DateTime<Utc>,
    pub expected_price: Money,
    pub service_content: String,
    pub contact_name: String,
    pub contact_phone: String,
    pub status: DemandStatus,
    /// 수락 전에는 None
    pub order_id: Option<OrderId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 주문 DB 모델
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Order {
    pub id: OrderId,
    pub order_no: String,
    pub demand_id: DemandId,
    pub patient_id: UserId,
    pub companion_id: UserId,
    pub order_amount: Money,
    /// 수수료 공제 후 동행인 수입
    pub companion_income: Money,
    pub status: OrderStatus,
    pub has_patient_eval: bool,
    pub has_companion_eval: bool,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// 역할별 당사자 ID
    pub fn party(&self, role: Role) -> UserId {
        match role {
            Role::Patient => self.patient_id,
            Role::Companion => self.companion_id,
        }
    }
}

/// 잔액 명세 DB 모델
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BalanceRecord {
    pub id: RecordId,
    pub serial_no: String,
    pub companion_id: UserId,
    pub kind: RecordKind,
    /// 입금은 양수, 출금은 음수
    pub amount: Money,
    pub remark: String,
    pub ref_order_no: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 평가 DB 모델
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Evaluation {
    pub id: EvaluationId,
    pub order_id: OrderId,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub score: i32,
    pub content: String,
    pub img_urls: Json<Vec<String>>,
    pub created_at: DateTime<Utc>,
}
