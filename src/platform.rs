use std::sync::Arc;

use log::info;
use sqlx::sqlite::SqlitePool;

use crate::account::AccountService;
use crate::config::CoreConfig;
use crate::db::init_database;
use crate::demand::DemandService;
use crate::error::CoreResult;
use crate::evaluation::EvaluationService;
use crate::ledger::LedgerService;
use crate::order::OrderService;
use crate::page::PageRequest;
use crate::serial::{SerialGenerator, TimestampSerialGenerator};

/// 플랫폼 상태 (모든 서비스가 하나의 풀과 설정을 공유)
#[derive(Clone)]
pub struct Platform {
    pub accounts: AccountService,
    pub demands: DemandService,
    pub orders: OrderService,
    pub ledger: LedgerService,
    pub evaluations: EvaluationService,
    pub pool: SqlitePool,
    pub config: CoreConfig,
}

impl Platform {
    /// DB 초기화 후 서비스 구성
    pub async fn connect(config: CoreConfig) -> CoreResult<Self> {
        let pool = init_database(&config).await?;
        Ok(Self::new(pool, config))
    }

    pub fn new(pool: SqlitePool, config: CoreConfig) -> Self {
        Self::with_serials(pool, config, Arc::new(TimestampSerialGenerator))
    }

    /// 설정된 기본 크기의 첫 페이지
    pub fn first_page(&self) -> PageRequest {
        PageRequest::default_for(&self.config)
    }

    /// 번호 생성기를 교체해 구성 (테스트에서 고정 번호를 쓸 때)
    pub fn with_serials(pool: SqlitePool, config: CoreConfig, serials: Arc<dyn SerialGenerator>) -> Self {
        let ledger = LedgerService::new(pool.clone(), config.clone(), serials.clone());
        let platform = Self {
            accounts: AccountService::new(pool.clone()),
            demands: DemandService::new(pool.clone(), config.clone()),
            orders: OrderService::new(pool.clone(), config.clone(), serials, ledger.clone()),
            ledger,
            evaluations: EvaluationService::new(pool.clone(), config.clone()),
            pool,
            config,
        };

        info!("🚀 플랫폼 구성 완료 (수수료 {} bps)", platform.config.commission_bps);
        platform
    }
}
