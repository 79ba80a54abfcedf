//! 잔액 원장 통합 테스트

mod common;

use companion_core::ledger::{RecordKind, WithdrawOutcome, WithdrawRequest};
use companion_core::{Caller, CoreConfig, CoreError, Money, PageRequest, Platform};

fn withdraw(amount: Money) -> WithdrawRequest {
    WithdrawRequest {
        amount,
        account: "3333012345678".into(),
        real_name: "최동행".into(),
    }
}

/// 수수료 없는 설정에서 잔액 100.00인 동행인
async fn funded_companion() -> (Platform, Caller) {
    let config = CoreConfig {
        commission_bps: 0,
        ..CoreConfig::in_memory()
    };
    let platform = common::platform_with(config).await;
    let patient = common::patient(&platform, "01000000001").await;
    let companion = common::companion(&platform, "01000000002").await;

    common::settled_order(&platform, &patient, &companion, Money::from_units(100)).await;
    assert_eq!(platform.ledger.balance(&companion).await.unwrap(), Money::from_units(100));

    (platform, companion)
}

#[tokio::test]
async fn test_insufficient_balance_leaves_ledger_untouched() {
    let (platform, companion) = funded_companion().await;

    let err = platform
        .ledger
        .request_withdraw(&companion, withdraw(Money::from_units(150)))
        .await
        .unwrap_err();
    match err {
        CoreError::InsufficientBalance { balance, requested } => {
            assert_eq!(balance, Money::from_units(100));
            assert_eq!(requested, Money::from_units(150));
        }
        other => panic!("예상하지 못한 에러: {:?}", other),
    }

    assert_eq!(platform.ledger.balance(&companion).await.unwrap(), Money::from_units(100));
    let records = platform.ledger.list_records(&companion, None, PageRequest::first(10)).await.unwrap();
    assert_eq!(records.total, 1);
    assert_eq!(records.items[0].kind, RecordKind::Income);
}

#[tokio::test]
async fn test_withdraw_debits_immediately_as_pending() {
    let (platform, companion) = funded_companion().await;

    let serial_no = platform
        .ledger
        .request_withdraw(&companion, withdraw(Money::from_units(100)))
        .await
        .unwrap();
    assert!(serial_no.starts_with("WDR"));

    assert_eq!(platform.ledger.balance(&companion).await.unwrap(), Money::ZERO);

    let record = platform.ledger.find_record(&serial_no).await.unwrap();
    assert_eq!(record.kind, RecordKind::WithdrawPending);
    assert_eq!(record.amount, Money::from_units(-100));
    assert!(record.remark.contains("5678"));
    assert!(!record.remark.contains("3333012345678"));

    assert!(platform.ledger.reconcile(companion.user_id).await.unwrap().is_consistent());
}

#[tokio::test]
async fn test_resolve_success_then_duplicate() {
    let (platform, companion) = funded_companion().await;
    let serial_no = platform
        .ledger
        .request_withdraw(&companion, withdraw(Money::from_units(40)))
        .await
        .unwrap();

    let record = platform
        .ledger
        .resolve_withdraw(&serial_no, WithdrawOutcome::Succeeded)
        .await
        .unwrap();
    assert_eq!(record.kind, RecordKind::WithdrawSuccess);
    assert_eq!(platform.ledger.balance(&companion).await.unwrap(), Money::from_units(60));

    let err = platform
        .ledger
        .resolve_withdraw(&serial_no, WithdrawOutcome::Succeeded)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::WithdrawAlreadyResolved { .. }));
    assert_eq!(platform.ledger.balance(&companion).await.unwrap(), Money::from_units(60));
}

#[tokio::test]
async fn test_failed_payout_restores_balance() {
    let (platform, companion) = funded_companion().await;
    let serial_no = platform
        .ledger
        .request_withdraw(&companion, withdraw(Money::from_units(30)))
        .await
        .unwrap();

    let record = platform
        .ledger
        .resolve_withdraw(&serial_no, WithdrawOutcome::Failed)
        .await
        .unwrap();
    assert_eq!(record.kind, RecordKind::WithdrawFailed);
    assert_eq!(platform.ledger.balance(&companion).await.unwrap(), Money::from_units(100));

    // 실패 확정 후에는 어떤 결과도 다시 적용되지 않음
    for outcome in [WithdrawOutcome::Succeeded, WithdrawOutcome::Failed] {
        let err = platform.ledger.resolve_withdraw(&serial_no, outcome).await.unwrap_err();
        assert!(matches!(err, CoreError::WithdrawAlreadyResolved { .. }));
    }
    assert_eq!(platform.ledger.balance(&companion).await.unwrap(), Money::from_units(100));
    assert!(platform.ledger.reconcile(companion.user_id).await.unwrap().is_consistent());
}

#[tokio::test]
async fn test_correct_withdraw_after_success() {
    let (platform, companion) = funded_companion().await;
    let serial_no = platform
        .ledger
        .request_withdraw(&companion, withdraw(Money::from_cents(2_550)))
        .await
        .unwrap();
    platform
        .ledger
        .resolve_withdraw(&serial_no, WithdrawOutcome::Succeeded)
        .await
        .unwrap();
    assert_eq!(platform.ledger.balance(&companion).await.unwrap(), Money::from_cents(7_450));

    let corrected = platform.ledger.correct_withdraw_outcome(&serial_no).await.unwrap();
    assert_eq!(corrected.kind, RecordKind::WithdrawFailed);
    assert_eq!(platform.ledger.balance(&companion).await.unwrap(), Money::from_units(100));

    let err = platform.ledger.correct_withdraw_outcome(&serial_no).await.unwrap_err();
    assert!(matches!(err, CoreError::WithdrawAlreadyResolved { .. }));
    assert_eq!(platform.ledger.balance(&companion).await.unwrap(), Money::from_units(100));

    let reconciliation = platform.ledger.reconcile(companion.user_id).await.unwrap();
    assert_eq!(reconciliation.ledger_sum, Money::from_units(100));
    assert!(reconciliation.is_consistent());
}

#[tokio::test]
async fn test_resolve_rejects_unknown_and_income_serials() {
    let (platform, companion) = funded_companion().await;

    let err = platform
        .ledger
        .resolve_withdraw("WDR00000000", WithdrawOutcome::Failed)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFoundOrLocked(_)));

    let income = platform
        .ledger
        .list_records(&companion, Some(RecordKind::Income), PageRequest::first(1))
        .await
        .unwrap();
    let err = platform
        .ledger
        .correct_withdraw_outcome(&income.items[0].serial_no)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFoundOrLocked(_)));
    assert_eq!(platform.ledger.balance(&companion).await.unwrap(), Money::from_units(100));
}

#[tokio::test]
async fn test_list_records_filter_and_order() {
    let (platform, companion) = funded_companion().await;
    let first = platform
        .ledger
        .request_withdraw(&companion, withdraw(Money::from_units(10)))
        .await
        .unwrap();
    let second = platform
        .ledger
        .request_withdraw(&companion, withdraw(Money::from_units(20)))
        .await
        .unwrap();
    platform
        .ledger
        .resolve_withdraw(&first, WithdrawOutcome::Succeeded)
        .await
        .unwrap();

    let all = platform.ledger.list_records(&companion, None, PageRequest::first(10)).await.unwrap();
    assert_eq!(all.total, 3);
    assert_eq!(all.items[0].serial_no, second);

    let pending = platform
        .ledger
        .list_records(&companion, Some(RecordKind::WithdrawPending), PageRequest::first(10))
        .await
        .unwrap();
    assert_eq!(pending.total, 1);
    assert_eq!(pending.items[0].serial_no, second);

    let paged = platform.ledger.list_records(&companion, None, PageRequest::new(2, 2)).await.unwrap();
    assert_eq!(paged.total, 3);
    assert_eq!(paged.items.len(), 1);

    let err = platform
        .ledger
        .list_records(&companion, None, PageRequest::new(1, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
}

#[tokio::test]
async fn test_ledger_is_companion_only() {
    let platform = common::platform().await;
    let patient = common::patient(&platform, "01000000001").await;

    let err = platform.ledger.balance(&patient).await.unwrap_err();
    assert!(matches!(err, CoreError::Unauthorized(_)));

    let err = platform
        .ledger
        .request_withdraw(&patient, withdraw(Money::from_units(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Unauthorized(_)));

    let err = platform.ledger.reconcile(patient.user_id).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFoundOrLocked(_)));
}
