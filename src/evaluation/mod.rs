//! 주문 평가
//!
//! 완료된 주문에 대해 방향(환자→동행인, 동행인→환자)별로 한 번씩만 남길 수 있습니다.
//! 평가 행 생성과 주문의 평가 플래그 변경은 같은 트랜잭션입니다.

use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

use crate::config::CoreConfig;
use crate::db::models::{Evaluation, OrderId};
use crate::db::repository::{EvaluationRepository, NewEvaluation, OrderRepository};
use crate::error::{CoreError, CoreResult};
use crate::identity::{Caller, Role};
use crate::order::OrderStatus;
use crate::page::{Page, PageRequest};

pub const MIN_SCORE: i32 = 1;
pub const MAX_SCORE: i32 = 5;
const CONTENT_MAX_CHARS: usize = 500;
const MAX_IMAGES: usize = 9;

/// 평가 입력
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationDraft {
    pub order_id: OrderId,
    pub score: i32,
    pub content: String,
    #[serde(default)]
    pub img_urls: Vec<String>,
}

impl EvaluationDraft {
    pub fn validate(&self) -> CoreResult<()> {
        if !(MIN_SCORE..=MAX_SCORE).contains(&self.score) {
            return Err(CoreError::Validation(format!(
                "평점은 {}~{} 사이여야 합니다 (입력: {})",
                MIN_SCORE, MAX_SCORE, self.score
            )));
        }

        let content = self.content.trim();
        if content.is_empty() {
            return Err(CoreError::Validation("평가 내용은 필수 항목입니다".into()));
        }
        if content.chars().count() > CONTENT_MAX_CHARS {
            return Err(CoreError::Validation(format!(
                "평가 내용은 {}자를 넘을 수 없습니다",
                CONTENT_MAX_CHARS
            )));
        }

        if self.img_urls.len() > MAX_IMAGES {
            return Err(CoreError::Validation(format!("이미지는 최대 {}장입니다", MAX_IMAGES)));
        }
        if self.img_urls.iter().any(|url| url.trim().is_empty()) {
            return Err(CoreError::Validation("빈 이미지 주소가 있습니다".into()));
        }

        Ok(())
    }
}

/// 주문의 평가 진행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EvaluationStatus {
    pub order_id: OrderId,
    pub order_status: OrderStatus,
    pub patient_evaluated: bool,
    pub companion_evaluated: bool,
}

impl EvaluationStatus {
    /// 호출자 역할이 지금 평가를 남길 수 있는지
    pub fn can_evaluate(&self, role: Role) -> bool {
        self.order_status == OrderStatus::Completed
            && match role {
                Role::Patient => !self.patient_evaluated,
                Role::Companion => !self.companion_evaluated,
            }
    }
}

/// 평가 서비스
#[derive(Clone)]
pub struct EvaluationService {
    pool: SqlitePool,
    config: CoreConfig,
}

impl EvaluationService {
    pub fn new(pool: SqlitePool, config: CoreConfig) -> Self {
        Self { pool, config }
    }

    /// 평가 등록
    ///
    /// 평가 대상은 호출자의 상대방입니다. 플래그 변경이 트랜잭션의 첫 쓰기이고 완료 상태에서
    /// 아직 세워지지 않았을 때만 바뀌므로, 동시에 여러 번 제출해도 한 건만 저장됩니다.
    pub async fn submit(&self, caller: &Caller, draft: EvaluationDraft) -> CoreResult<Evaluation> {
        draft.validate()?;
        let order_id = draft.order_id;

        let mut tx = self.pool.begin().await?;

        let flagged =
            OrderRepository::mark_evaluated(&mut tx, order_id, caller.role, caller.user_id, Utc::now()).await?;

        let order = OrderRepository::find(&mut tx, order_id)
            .await?
            .ok_or_else(|| CoreError::OrderNotEligible(format!("주문이 존재하지 않습니다: {}", order_id)))?;

        if !flagged {
            return Err(if order.party(caller.role) != caller.user_id {
                warn!("평가 거부 (당사자 아님) - order={} caller={}", order_id, caller.user_id);
                CoreError::OwnershipMismatch(format!("주문 {}", order_id))
            } else if order.status != OrderStatus::Completed {
                CoreError::OrderNotEligible(format!(
                    "완료된 주문만 평가할 수 있습니다 (현재: {})",
                    order.status
                ))
            } else {
                warn!("중복 평가 시도 - order={} by={}({})", order_id, caller.role, caller.user_id);
                CoreError::AlreadyEvaluated
            });
        }

        let to_user_id = match caller.role {
            Role::Patient => order.companion_id,
            Role::Companion => order.patient_id,
        };
        let img_urls: Vec<String> = draft.img_urls.iter().map(|url| url.trim().to_string()).collect();

        let id = EvaluationRepository::insert(
            &mut tx,
            &NewEvaluation {
                order_id,
                from_user_id: caller.user_id,
                to_user_id,
                score: draft.score,
                content: draft.content.trim(),
                img_urls: &img_urls,
            },
            Utc::now(),
        )
        .await?;

        let evaluation = EvaluationRepository::find(&mut tx, id)
            .await?
            .ok_or_else(|| CoreError::NotFoundOrLocked(format!("평가를 찾을 수 없습니다: {}", id)))?;

        tx.commit().await?;

        info!(
            "⭐ 평가 등록 - order={} from={} to={} score={}",
            order_id, caller.user_id, to_user_id, draft.score
        );
        Ok(evaluation)
    }

    /// 받은 평가 목록 (최신순)
    pub async fn list_received(&self, caller: &Caller, page: PageRequest) -> CoreResult<Page<Evaluation>> {
        let (limit, offset) = page.limit_offset(self.config.max_page_size)?;

        let mut conn = self.pool.acquire().await?;
        let (items, total) = EvaluationRepository::list_received(&mut conn, caller.user_id, limit, offset).await?;
        debug!("받은 평가 조회 - user={} total={}", caller.user_id, total);

        Ok(Page::new(items, total, page))
    }

    pub async fn order_status(&self, caller: &Caller, order_id: OrderId) -> CoreResult<EvaluationStatus> {
        let mut conn = self.pool.acquire().await?;
        let order = OrderRepository::find(&mut conn, order_id)
            .await?
            .ok_or_else(|| CoreError::NotFoundOrLocked(format!("주문이 존재하지 않습니다: {}", order_id)))?;

        if order.party(caller.role) != caller.user_id {
            return Err(CoreError::OwnershipMismatch(format!("주문 {}", order_id)));
        }

        Ok(EvaluationStatus {
            order_id,
            order_status: order.status,
            patient_evaluated: order.has_patient_eval,
            companion_evaluated: order.has_companion_eval,
        })
    }

    /// 주문에 달린 평가 (당사자만)
    pub async fn list_for_order(&self, caller: &Caller, order_id: OrderId) -> CoreResult<Vec<Evaluation>> {
        let mut conn = self.pool.acquire().await?;
        let order = OrderRepository::find(&mut conn, order_id)
            .await?
            .ok_or_else(|| CoreError::NotFoundOrLocked(format!("주문이 존재하지 않습니다: {}", order_id)))?;

        if order.party(caller.role) != caller.user_id {
            return Err(CoreError::OwnershipMismatch(format!("주문 {}", order_id)));
        }

        Ok(EvaluationRepository::list_by_order(&mut conn, order_id).await?)
    }
}
