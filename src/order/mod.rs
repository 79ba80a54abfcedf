//! 주문 생명주기
//!
//! 동행인이 요청을 수락하면 주문이 생기고, 요청과 주문 상태는 항상 같은 트랜잭션에서
//! 함께 바뀝니다. 정산(잔액 입금)은 환자의 완료 확인에서만 일어납니다.

pub mod state;

pub use state::{OrderEvent, OrderStatus};

use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnection, SqlitePool};

use crate::config::CoreConfig;
use crate::db::models::{BalanceRecord, DemandId, Order, OrderId};
use crate::db::repository::{DemandRepository, NewOrder, OrderRepository, UserRepository};
use crate::error::{CoreError, CoreResult};
use crate::identity::{Caller, Role};
use crate::ledger::LedgerService;
use crate::page::{Page, PageRequest};
use crate::serial::SerialGenerator;

const CANCEL_REASON_MAX_CHARS: usize = 255;

/// 완료 확인 결과: 완료된 주문과 입금 명세
#[derive(Debug, Clone, Serialize)]
pub struct Settlement {
    pub order: Order,
    pub income: BalanceRecord,
}

/// 주문 서비스
#[derive(Clone)]
pub struct OrderService {
    pool: SqlitePool,
    config: CoreConfig,
    serials: Arc<dyn SerialGenerator>,
    ledger: LedgerService,
}

impl OrderService {
    pub fn new(
        pool: SqlitePool,
        config: CoreConfig,
        serials: Arc<dyn SerialGenerator>,
        ledger: LedgerService,
    ) -> Self {
        Self {
            pool,
            config,
            serials,
            ledger,
        }
    }

    /// 요청 수락 (주문 생성)
    ///
    /// 요청 선점(OPEN → CLAIMED)이 트랜잭션의 첫 쓰기입니다. 동시에 수락하면 한 건만
    /// 선점에 성공하고 나머지는 `NotFoundOrLocked`를 받습니다.
    /// 호출자 ID가 동행인 계정이 아니면 선점을 롤백하고 `Unauthorized`를 돌려줍니다.
    pub async fn claim(&self, caller: &Caller, demand_id: DemandId) -> CoreResult<Order> {
        let companion_id = caller.require(Role::Companion)?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        if !DemandRepository::mark_claimed(&mut tx, demand_id, now).await? {
            warn!("수락 실패 (요청 없음/이미 수락됨) - demand={} companion={}", demand_id, companion_id);
            return Err(CoreError::NotFoundOrLocked(format!(
                "요청이 없거나 이미 수락되었습니다: {}",
                demand_id
            )));
        }

        let demand = DemandRepository::find(&mut tx, demand_id)
            .await?
            .ok_or_else(|| CoreError::NotFoundOrLocked(format!("요청이 존재하지 않습니다: {}", demand_id)))?;

        if demand.patient_id == companion_id {
            warn!("본인 요청 수락 시도 - demand={} user={}", demand_id, companion_id);
            return Err(CoreError::SelfClaimForbidden);
        }

        let is_companion = UserRepository::find(&mut tx, companion_id)
            .await?
            .map_or(false, |user| user.role == Role::Companion);
        if !is_companion {
            warn!("수락 거부 (동행인 계정 아님) - demand={} user={}", demand_id, companion_id);
            return Err(CoreError::Unauthorized(format!("동행인 계정이 아닙니다: {}", companion_id)));
        }

        let order_amount = demand.expected_price;
        let companion_income = order_amount.apply_bps(self.config.companion_share_bps());
        let order_no = self.serials.order_no();

        let order_id = OrderRepository::insert(
            &mut tx,
            &NewOrder {
                order_no: &order_no,
                demand_id,
                patient_id: demand.patient_id,
                companion_id,
                order_amount,
                companion_income,
            },
            now,
        )
        .await?;

        if !DemandRepository::link_order(&mut tx, demand_id, order_id).await? {
            error!("요청-주문 연결 실패 - demand={} order={}", demand_id, order_id);
            return Err(CoreError::NotFoundOrLocked(format!(
                "요청 상태가 바뀌어 수락할 수 없습니다: {}",
                demand_id
            )));
        }

        let order = load_order(&mut tx, order_id).await?;
        tx.commit().await?;

        info!(
            "🤝 주문 생성 - order={} no={} demand={} companion={} amount={} income={}",
            order.id, order.order_no, demand_id, companion_id, order.order_amount, order.companion_income
        );
        Ok(order)
    }

    /// 서비스 시작 (서비스 대기 → 서비스 중)
    pub async fn begin_service(&self, caller: &Caller, order_id: OrderId) -> CoreResult<Order> {
        caller.require(Role::Companion)?;
        let mut conn = self.pool.acquire().await?;
        let order = apply_event(&mut conn, caller, order_id, OrderEvent::Begin, None).await?;
        info!("서비스 시작 - order={} companion={}", order_id, caller.user_id);
        Ok(order)
    }

    /// 동행인 서비스 완료 확인 (서비스 중 → 정산 대기). 금액 이동 없음.
    pub async fn companion_confirm_complete(&self, caller: &Caller, order_id: OrderId) -> CoreResult<Order> {
        caller.require(Role::Companion)?;
        let mut conn = self.pool.acquire().await?;
        let order = apply_event(&mut conn, caller, order_id, OrderEvent::CompanionConfirm, None).await?;
        info!("동행인 완료 확인 - order={} companion={}", order_id, caller.user_id);
        Ok(order)
    }

    /// 환자 완료 확인 (정산 대기 → 완료) 및 동행인 수입 입금
    ///
    /// 정산 대기 상태에서만 전이되므로 재시도해도 이중 입금되지 않습니다.
    pub async fn patient_confirm_complete(&self, caller: &Caller, order_id: OrderId) -> CoreResult<Settlement> {
        caller.require(Role::Patient)?;

        let mut tx = self.pool.begin().await?;
        let order = apply_event(&mut tx, caller, order_id, OrderEvent::PatientConfirm, None).await?;

        let remark = format!("주문 {} 서비스 수입", order.order_no);
        let income = self
            .ledger
            .credit(&mut tx, order.companion_id, order.companion_income, &remark, &order.order_no)
            .await?;

        tx.commit().await?;

        info!(
            "💰 주문 정산 완료 - order={} companion={} income={} serial={}",
            order.id, order.companion_id, income.amount, income.serial_no
        );
        Ok(Settlement { order, income })
    }

    /// 동행인 주문 취소 (서비스 대기 상태만)
    pub async fn companion_cancel(&self, caller: &Caller, order_id: OrderId, reason: &str) -> CoreResult<Order> {
        caller.require(Role::Companion)?;
        self.cancel(caller, order_id, reason).await
    }

    /// 환자 주문 취소 (서비스 대기 상태만)
    pub async fn patient_cancel(&self, caller: &Caller, order_id: OrderId, reason: &str) -> CoreResult<Order> {
        caller.require(Role::Patient)?;
        self.cancel(caller, order_id, reason).await
    }

    /// 주문 취소와 요청 복원은 함께 적용되거나 둘 다 적용되지 않습니다.
    async fn cancel(&self, caller: &Caller, order_id: OrderId, reason: &str) -> CoreResult<Order> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CoreError::Validation("취소 사유는 필수 항목입니다".into()));
        }
        if reason.chars().count() > CANCEL_REASON_MAX_CHARS {
            return Err(CoreError::Validation(format!(
                "취소 사유는 {}자를 넘을 수 없습니다",
                CANCEL_REASON_MAX_CHARS
            )));
        }

        let mut tx = self.pool.begin().await?;
        let order = apply_event(&mut tx, caller, order_id, OrderEvent::Cancel, Some(reason)).await?;

        if !DemandRepository::reopen(&mut tx, order.demand_id, order.id, Utc::now()).await? {
            error!("요청 복원 실패 - order={} demand={}", order.id, order.demand_id);
            return Err(CoreError::NotFoundOrLocked(format!(
                "요청 상태가 주문과 일치하지 않아 취소할 수 없습니다: {}",
                order.id
            )));
        }

        tx.commit().await?;

        info!(
            "주문 취소 - order={} by={}({}) reason={}",
            order.id, caller.role, caller.user_id, reason
        );
        Ok(order)
    }

    /// 주문 조회 (당사자만)
    pub async fn get(&self, caller: &Caller, order_id: OrderId) -> CoreResult<Order> {
        let mut conn = self.pool.acquire().await?;
        let order = load_order(&mut conn, order_id).await?;
        if order.party(caller.role) != caller.user_id {
            return Err(CoreError::OwnershipMismatch(format!("주문 {}", order_id)));
        }
        Ok(order)
    }

    pub async fn list_for_companion(
        &self,
        caller: &Caller,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> CoreResult<Page<Order>> {
        caller.require(Role::Companion)?;
        self.list_for_party(caller, status, page).await
    }

    pub async fn list_for_patient(
        &self,
        caller: &Caller,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> CoreResult<Page<Order>> {
        caller.require(Role::Patient)?;
        self.list_for_party(caller, status, page).await
    }

    async fn list_for_party(
        &self,
        caller: &Caller,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> CoreResult<Page<Order>> {
        let (limit, offset) = page.limit_offset(self.config.max_page_size)?;

        let mut conn = self.pool.acquire().await?;
        let (items, total) =
            OrderRepository::list_by_party(&mut conn, caller.role, caller.user_id, status, limit, offset).await?;
        debug!("주문 목록 조회 - {}={} status={:?} total={}", caller.role, caller.user_id, status, total);

        Ok(Page::new(items, total, page))
    }

    /// 요청에 대해 생성된 모든 주문 (취소 이력 포함, 생성순)
    pub async fn history_for_demand(&self, demand_id: DemandId) -> CoreResult<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        Ok(OrderRepository::list_by_demand(&mut conn, demand_id).await?)
    }
}

async fn load_order(conn: &mut SqliteConnection, order_id: OrderId) -> CoreResult<Order> {
    OrderRepository::find(conn, order_id)
        .await?
        .ok_or_else(|| CoreError::NotFoundOrLocked(format!("주문이 존재하지 않습니다: {}", order_id)))
}

/// 상태 조건부 갱신으로 이벤트를 적용하고, 실패하면 원인을 구분해 돌려줍니다.
async fn apply_event(
    conn: &mut SqliteConnection,
    caller: &Caller,
    order_id: OrderId,
    event: OrderEvent,
    cancel_reason: Option<&str>,
) -> CoreResult<Order> {
    if !event.permits(caller.role) {
        return Err(CoreError::Unauthorized(format!(
            "{}은(는) {}을(를) 할 수 없습니다",
            caller.role,
            event.label()
        )));
    }

    let applied = OrderRepository::transition(
        &mut *conn,
        order_id,
        caller.role,
        caller.user_id,
        event.source(),
        event.target(),
        cancel_reason,
        Utc::now(),
    )
    .await?;

    let order = load_order(&mut *conn, order_id).await?;
    if applied {
        return Ok(order);
    }

    if order.party(caller.role) != caller.user_id {
        warn!("{} 거부 (당사자 아님) - order={} caller={}", event.label(), order_id, caller.user_id);
        return Err(CoreError::OwnershipMismatch(format!("주문 {}", order_id)));
    }

    warn!(
        "{} 거부 (상태 불일치) - order={} status={:?} expected={:?}",
        event.label(),
        order_id,
        order.status,
        event.source()
    );
    if order.status.is_terminal() {
        return Err(CoreError::NotFoundOrLocked(format!(
            "이미 '{}' 처리된 주문입니다: {}",
            order.status, order_id
        )));
    }
    Err(CoreError::NotFoundOrLocked(format!(
        "주문이 '{}' 상태라 {}을(를) 할 수 없습니다: {}",
        order.status,
        event.label(),
        order_id
    )))
}
