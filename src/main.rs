use anyhow::Context;
use chrono::{Duration, Utc};
use log::info;
use rand::Rng;

use companion_core::demand::DemandDraft;
use companion_core::evaluation::EvaluationDraft;
use companion_core::ledger::{RecordKind, WithdrawOutcome, WithdrawRequest};
use companion_core::{Caller, CoreConfig, Money, Platform, Role};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("병원 동행 서비스 코어 시작 (시나리오 모드)");

    let config = CoreConfig::from_env().context("설정 로드 실패")?;
    let platform = Platform::connect(config).await.context("DB 연결 실패")?;

    run_settlement_scenario(&platform).await?;

    println!("시나리오 완료, 프로그램 종료.");
    Ok(())
}

/// 요청 등록부터 정산, 출금, 평가까지 한 바퀴
async fn run_settlement_scenario(platform: &Platform) -> anyhow::Result<()> {
    // 파일 DB로 다시 실행해도 전화번호가 겹치지 않도록 매번 새 번호 사용
    let base: u32 = rand::thread_rng().gen_range(10_000_000..99_999_999);
    let patient = platform
        .accounts
        .register(&format!("010{}", base), "김환자", Role::Patient)
        .await?;
    let companion = platform
        .accounts
        .register(&format!("010{}", base + 1), "박동행", Role::Companion)
        .await?;
    let patient = Caller::patient(patient.id);
    let companion = Caller::companion(companion.id);

    // 1. 요청 등록
    let demand = platform
        .demands
        .publish(
            &patient,
            DemandDraft {
                hospital: "서울대학교병원".into(),
                hospital_addr: "서울 종로구 대학로 101".into(),
                service_time: Utc::now() + Duration::days(1),
                expected_price: Money::from_units(500),
                service_content: "외래 진료 접수 및 검사 동행".into(),
                contact_name: "김보호".into(),
                contact_phone: "01055556666".into(),
            },
        )
        .await?;
    println!("요청 등록:\n{}", serde_json::to_string_pretty(&demand)?);

    // 2. 수락 → 서비스 → 완료 확인
    let order = platform.orders.claim(&companion, demand.id).await?;
    println!("주문 생성: {} (금액 {}, 동행인 수입 {})", order.order_no, order.order_amount, order.companion_income);

    platform.orders.begin_service(&companion, order.id).await?;
    platform.orders.companion_confirm_complete(&companion, order.id).await?;
    let settlement = platform.orders.patient_confirm_complete(&patient, order.id).await?;
    println!("정산 결과:\n{}", serde_json::to_string_pretty(&settlement)?);

    // 3. 출금 요청 후 지급 결과 반영
    let balance = platform.ledger.balance(&companion).await?;
    info!("동행인 잔액: {}", balance);

    let serial_no = platform
        .ledger
        .request_withdraw(
            &companion,
            WithdrawRequest {
                amount: Money::from_units(200),
                account: "110123456789".into(),
                real_name: "박동행".into(),
            },
        )
        .await?;
    let record = platform.ledger.resolve_withdraw(&serial_no, WithdrawOutcome::Succeeded).await?;
    println!("출금 처리: {} {} ({})", record.serial_no, record.amount, record.kind);

    let records = platform
        .ledger
        .list_records(&companion, None, platform.first_page())
        .await?;
    println!("명세 목록:\n{}", serde_json::to_string_pretty(&records)?);

    let incomes = platform
        .ledger
        .list_records(&companion, Some(RecordKind::Income), platform.first_page())
        .await?;
    info!("수입 명세 {}건", incomes.total);

    let reconciliation = platform.ledger.reconcile(companion.user_id).await?;
    println!(
        "대사 결과: 잔액 {} / 원장 {} → {}",
        reconciliation.balance,
        reconciliation.ledger_sum,
        if reconciliation.is_consistent() { "일치" } else { "불일치" }
    );

    // 4. 상호 평가
    for (caller, content) in [(&patient, "친절하고 꼼꼼했습니다"), (&companion, "시간 약속을 잘 지켜 주셨습니다")] {
        platform
            .evaluations
            .submit(
                caller,
                EvaluationDraft {
                    order_id: order.id,
                    score: 5,
                    content: content.into(),
                    img_urls: vec![],
                },
            )
            .await?;
    }
    let status = platform.evaluations.order_status(&patient, order.id).await?;
    println!("평가 상태:\n{}", serde_json::to_string_pretty(&status)?);

    Ok(())
}
