//! 통합 테스트 공용 픽스처
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};

use companion_core::db::init_database;
use companion_core::db::models::{Demand, Order};
use companion_core::demand::DemandDraft;
use companion_core::order::Settlement;
use companion_core::serial::SerialGenerator;
use companion_core::{Caller, CoreConfig, Money, Platform, Role};

/// 순차 번호 생성기 (테스트에서 번호 충돌 없이 재현 가능)
#[derive(Default)]
pub struct SequentialSerials {
    next: AtomicU64,
}

impl SerialGenerator for SequentialSerials {
    fn order_no(&self) -> String {
        format!("ORD{:08}", self.next.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn serial_no(&self, prefix: &str) -> String {
        format!("{}{:08}", prefix, self.next.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

pub async fn platform() -> Platform {
    platform_with(CoreConfig::in_memory()).await
}

pub async fn platform_with(config: CoreConfig) -> Platform {
    let _ = env_logger::builder().is_test(true).try_init();
    let pool = init_database(&config).await.expect("DB 초기화");
    Platform::with_serials(pool, config, Arc::new(SequentialSerials::default()))
}

/// 테스트 종료 시 삭제되는 임시 DB 파일
pub struct TempDatabase {
    path: PathBuf,
}

impl Drop for TempDatabase {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", self.path.display(), suffix));
        }
    }
}

/// 파일 DB(WAL, 다중 연결) 플랫폼. 트랜잭션이 실제로 서로 겹치는 동시성 테스트용.
pub async fn file_platform() -> (Platform, TempDatabase) {
    file_platform_with(CoreConfig::in_memory()).await
}

pub async fn file_platform_with(config: CoreConfig) -> (Platform, TempDatabase) {
    static NEXT_DB: AtomicU64 = AtomicU64::new(0);

    let path = std::env::temp_dir().join(format!(
        "companion-core-{}-{}-{}.db",
        std::process::id(),
        NEXT_DB.fetch_add(1, Ordering::SeqCst),
        Utc::now().timestamp_subsec_nanos()
    ));
    let guard = TempDatabase { path: path.clone() };

    let config = CoreConfig {
        database_url: format!("sqlite://{}", path.display()),
        max_connections: 8,
        ..config
    };
    assert!(!config.is_in_memory());

    (platform_with(config).await, guard)
}

pub async fn patient(platform: &Platform, phone: &str) -> Caller {
    let user = platform
        .accounts
        .register(phone, "환자", Role::Patient)
        .await
        .expect("환자 등록");
    Caller::patient(user.id)
}

pub async fn companion(platform: &Platform, phone: &str) -> Caller {
    let user = platform
        .accounts
        .register(phone, "동행인", Role::Companion)
        .await
        .expect("동행인 등록");
    Caller::companion(user.id)
}

pub fn draft(price: Money) -> DemandDraft {
    DemandDraft {
        hospital: "서울아산병원".into(),
        hospital_addr: "서울 송파구 올림픽로43길 88".into(),
        service_time: Utc::now() + Duration::days(2),
        expected_price: price,
        service_content: "정형외과 외래 동행".into(),
        contact_name: "이보호".into(),
        contact_phone: "01098765432".into(),
    }
}

pub async fn publish(platform: &Platform, patient: &Caller, price: Money) -> Demand {
    platform
        .demands
        .publish(patient, draft(price))
        .await
        .expect("요청 등록")
}

/// 요청 등록 후 동행인이 수락한 주문
pub async fn claimed_order(platform: &Platform, patient: &Caller, companion: &Caller, price: Money) -> Order {
    let demand = publish(platform, patient, price).await;
    platform
        .orders
        .claim(companion, demand.id)
        .await
        .expect("수락")
}

/// 정산 대기까지 진행한 주문
pub async fn pending_settlement_order(
    platform: &Platform,
    patient: &Caller,
    companion: &Caller,
    price: Money,
) -> Order {
    let order = claimed_order(platform, patient, companion, price).await;
    platform
        .orders
        .begin_service(companion, order.id)
        .await
        .expect("서비스 시작");
    platform
        .orders
        .companion_confirm_complete(companion, order.id)
        .await
        .expect("동행인 완료 확인")
}

/// 정산까지 끝낸 주문
pub async fn settled_order(platform: &Platform, patient: &Caller, companion: &Caller, price: Money) -> Settlement {
    let order = pending_settlement_order(platform, patient, companion, price).await;
    platform
        .orders
        .patient_confirm_complete(patient, order.id)
        .await
        .expect("환자 완료 확인")
}
