//! 동행 요청 (환자 측)
//!
//! 요청은 환자가 등록하고, 대기(OPEN) 상태일 때만 수정/철회할 수 있습니다.
//! 존재하지 않음과 이미 수락됨은 하나의 `NotFoundOrLocked`로 응답합니다.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

use crate::config::CoreConfig;
use crate::db::models::{Demand, DemandId};
use crate::db::repository::DemandRepository;
use crate::error::{CoreError, CoreResult};
use crate::identity::{Caller, Role};
use crate::money::Money;
use crate::page::{Page, PageRequest};

const HOSPITAL_MAX_CHARS: usize = 100;
const HOSPITAL_ADDR_MAX_CHARS: usize = 255;
const CONTACT_NAME_MAX_CHARS: usize = 16;
const CONTACT_PHONE_DIGITS: usize = 11;

/// 요청 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[repr(i32)]
pub enum DemandStatus {
    /// 수락 대기
    Open = 0,
    /// 주문 생성됨
    Claimed = 1,
}

/// 요청 등록/수정 입력
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemandDraft {
    pub hospital: String,
    pub hospital_addr: String,
    pub service_time: DateTime<Utc>,
    pub expected_price: Money,
    pub service_content: String,
    pub contact_name: String,
    pub contact_phone: String,
}

impl DemandDraft {
    /// 필수값과 서비스 시간을 검증합니다. 서비스 시간은 `now`보다 엄격히 뒤여야 합니다.
    pub fn validate(&self, now: DateTime<Utc>) -> CoreResult<()> {
        require_text("병원", &self.hospital, HOSPITAL_MAX_CHARS)?;
        require_text("병원 주소", &self.hospital_addr, HOSPITAL_ADDR_MAX_CHARS)?;
        require_text("서비스 내용", &self.service_content, usize::MAX)?;
        require_text("연락처 이름", &self.contact_name, CONTACT_NAME_MAX_CHARS)?;

        let phone = self.contact_phone.trim();
        if phone.len() != CONTACT_PHONE_DIGITS || !phone.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::Validation(format!(
                "연락처 전화번호는 숫자 {}자리여야 합니다",
                CONTACT_PHONE_DIGITS
            )));
        }

        if !self.expected_price.is_positive() {
            return Err(CoreError::Validation(format!(
                "희망 금액은 0보다 커야 합니다 (입력: {})",
                self.expected_price
            )));
        }

        if self.service_time <= now {
            return Err(CoreError::Validation(
                "서비스 시간은 현재 시각 이후여야 합니다".into(),
            ));
        }

        Ok(())
    }
}

fn require_text(field: &str, value: &str, max_chars: usize) -> CoreResult<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation(format!("{}은(는) 필수 항목입니다", field)));
    }
    if trimmed.chars().count() > max_chars {
        return Err(CoreError::Validation(format!(
            "{}은(는) {}자를 넘을 수 없습니다",
            field, max_chars
        )));
    }
    Ok(())
}

/// 동행 요청 서비스
#[derive(Clone)]
pub struct DemandService {
    pool: SqlitePool,
    config: CoreConfig,
}

impl DemandService {
    pub fn new(pool: SqlitePool, config: CoreConfig) -> Self {
        Self { pool, config }
    }

    /// 요청 등록 (OPEN 상태로 생성)
    pub async fn publish(&self, caller: &Caller, draft: DemandDraft) -> CoreResult<Demand> {
        let patient_id = caller.require(Role::Patient)?;
        let now = Utc::now();
        draft.validate(now)?;

        let mut conn = self.pool.acquire().await?;
        let id = DemandRepository::insert(&mut conn, patient_id, &draft, now).await?;
        let demand = DemandRepository::find(&mut conn, id)
            .await?
            .ok_or_else(|| CoreError::NotFoundOrLocked(format!("등록한 요청을 찾을 수 없습니다: {}", id)))?;

        info!("📝 요청 등록 - demand={} patient={} price={}", id, patient_id, demand.expected_price);
        Ok(demand)
    }

    /// 요청 수정 (본인 소유, OPEN 상태만)
    pub async fn update(&self, caller: &Caller, demand_id: DemandId, draft: DemandDraft) -> CoreResult<Demand> {
        let patient_id = caller.require(Role::Patient)?;
        let now = Utc::now();
        draft.validate(now)?;

        let mut conn = self.pool.acquire().await?;
        if !DemandRepository::update_open(&mut conn, demand_id, patient_id, &draft, now).await? {
            warn!("요청 수정 거부 - demand={} patient={}", demand_id, patient_id);
            return Err(not_found_or_locked(demand_id, "수정"));
        }

        info!("요청 수정 - demand={} patient={}", demand_id, patient_id);
        DemandRepository::find(&mut conn, demand_id)
            .await?
            .ok_or_else(|| not_found_or_locked(demand_id, "수정"))
    }

    /// 요청 철회 (본인 소유, OPEN 상태만)
    pub async fn withdraw(&self, caller: &Caller, demand_id: DemandId) -> CoreResult<()> {
        let patient_id = caller.require(Role::Patient)?;

        let mut conn = self.pool.acquire().await?;
        if !DemandRepository::withdraw_open(&mut conn, demand_id, patient_id, Utc::now()).await? {
            warn!("요청 철회 거부 - demand={} patient={}", demand_id, patient_id);
            return Err(not_found_or_locked(demand_id, "철회"));
        }

        info!("요청 철회 - demand={} patient={}", demand_id, patient_id);
        Ok(())
    }

    pub async fn get(&self, demand_id: DemandId) -> CoreResult<Demand> {
        let mut conn = self.pool.acquire().await?;
        DemandRepository::find(&mut conn, demand_id)
            .await?
            .ok_or_else(|| CoreError::NotFoundOrLocked(format!("요청이 존재하지 않습니다: {}", demand_id)))
    }

    /// 내가 등록한 요청 목록 (최신순)
    pub async fn list_mine(&self, caller: &Caller, page: PageRequest) -> CoreResult<Page<Demand>> {
        let patient_id = caller.require(Role::Patient)?;
        let (limit, offset) = page.limit_offset(self.config.max_page_size)?;

        let mut conn = self.pool.acquire().await?;
        let (items, total) = DemandRepository::list_by_patient(&mut conn, patient_id, limit, offset).await?;
        debug!("요청 목록 조회 - patient={} total={}", patient_id, total);

        Ok(Page::new(items, total, page))
    }

    /// 수락 대기 요청 목록 (동행인용, 최신순)
    pub async fn list_open(&self, caller: &Caller, page: PageRequest) -> CoreResult<Page<Demand>> {
        caller.require(Role::Companion)?;
        let (limit, offset) = page.limit_offset(self.config.max_page_size)?;

        let mut conn = self.pool.acquire().await?;
        let (items, total) = DemandRepository::list_open(&mut conn, limit, offset).await?;
        debug!("대기 요청 목록 조회 - total={}", total);

        Ok(Page::new(items, total, page))
    }
}

fn not_found_or_locked(demand_id: DemandId, action: &str) -> CoreError {
    CoreError::NotFoundOrLocked(format!(
        "요청이 없거나 이미 수락되어 {}할 수 없습니다: {}",
        action, demand_id
    ))
}
