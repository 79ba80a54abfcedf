//! 파일 DB(WAL, 다중 연결) 위에서 실제로 겹치는 트랜잭션 테스트

mod common;

use futures::future::join_all;

use companion_core::demand::DemandStatus;
use companion_core::evaluation::EvaluationDraft;
use companion_core::ledger::{WithdrawOutcome, WithdrawRequest};
use companion_core::{CoreConfig, CoreError, Money};

const ROUNDS: usize = 5;
const CLAIMERS: usize = 8;

fn withdraw(amount: Money) -> WithdrawRequest {
    WithdrawRequest {
        amount,
        account: "3333012345678".into(),
        real_name: "최동행".into(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_claim_race_has_single_winner() {
    let (platform, _db) = common::file_platform().await;
    let patient = common::patient(&platform, "01000000001").await;

    let mut companions = Vec::new();
    for i in 0..CLAIMERS {
        companions.push(common::companion(&platform, &format!("0102000{:04}", i)).await);
    }

    for round in 0..ROUNDS {
        let demand = common::publish(&platform, &patient, Money::from_units(100)).await;
        let demand_id = demand.id;

        let handles = companions.iter().map(|companion| {
            let platform = platform.clone();
            let companion = *companion;
            tokio::spawn(async move { platform.orders.claim(&companion, demand_id).await })
        });
        let results: Vec<_> = join_all(handles).await.into_iter().map(|joined| joined.unwrap()).collect();

        let winners = results.iter().filter(|result| result.is_ok()).count();
        assert_eq!(winners, 1, "round {}: {:?}", round, results);
        for err in results.iter().filter_map(|result| result.as_ref().err()) {
            assert!(matches!(err, CoreError::NotFoundOrLocked(_)), "round {}: {:?}", round, err);
        }

        assert_eq!(platform.orders.history_for_demand(demand_id).await.unwrap().len(), 1);
        assert_eq!(platform.demands.get(demand_id).await.unwrap().status, DemandStatus::Claimed);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_withdraw_race_never_overdraws() {
    let config = CoreConfig {
        commission_bps: 0,
        ..CoreConfig::in_memory()
    };
    let (platform, _db) = common::file_platform_with(config).await;
    let patient = common::patient(&platform, "01000000001").await;
    let companion = common::companion(&platform, "01000000002").await;
    common::settled_order(&platform, &patient, &companion, Money::from_units(100)).await;

    let handles = (0..10).map(|_| {
        let platform = platform.clone();
        tokio::spawn(async move {
            platform
                .ledger
                .request_withdraw(&companion, withdraw(Money::from_units(30)))
                .await
        })
    });
    let results: Vec<_> = join_all(handles).await.into_iter().map(|joined| joined.unwrap()).collect();

    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 3, "{:?}", results);
    for err in results.iter().filter_map(|result| result.as_ref().err()) {
        assert!(matches!(err, CoreError::InsufficientBalance { .. }), "{:?}", err);
    }

    assert_eq!(platform.ledger.balance(&companion).await.unwrap(), Money::from_units(10));
    let reconciliation = platform.ledger.reconcile(companion.user_id).await.unwrap();
    assert!(reconciliation.is_consistent(), "{:?}", reconciliation);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_evaluations_race_to_already_evaluated() {
    let (platform, _db) = common::file_platform().await;
    let patient = common::patient(&platform, "01000000001").await;
    let companion = common::companion(&platform, "01000000002").await;

    for round in 0..ROUNDS {
        let settlement = common::settled_order(&platform, &patient, &companion, Money::from_units(100)).await;
        let order_id = settlement.order.id;

        let handles = (0..6).map(|i| {
            let platform = platform.clone();
            tokio::spawn(async move {
                platform
                    .evaluations
                    .submit(
                        &patient,
                        EvaluationDraft {
                            order_id,
                            score: 5,
                            content: format!("동시 제출 {}", i),
                            img_urls: vec![],
                        },
                    )
                    .await
            })
        });
        let results: Vec<_> = join_all(handles).await.into_iter().map(|joined| joined.unwrap()).collect();

        assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1, "round {}: {:?}", round, results);
        for err in results.iter().filter_map(|result| result.as_ref().err()) {
            assert!(matches!(err, CoreError::AlreadyEvaluated), "round {}: {:?}", round, err);
        }

        let evaluations = platform.evaluations.list_for_order(&patient, order_id).await.unwrap();
        assert_eq!(evaluations.len(), 1);
        let status = platform.evaluations.order_status(&patient, order_id).await.unwrap();
        assert!(status.patient_evaluated);
        assert!(!status.companion_evaluated);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_failed_payouts_refund_once() {
    let config = CoreConfig {
        commission_bps: 0,
        ..CoreConfig::in_memory()
    };
    let (platform, _db) = common::file_platform_with(config).await;
    let patient = common::patient(&platform, "01000000001").await;
    let companion = common::companion(&platform, "01000000002").await;
    common::settled_order(&platform, &patient, &companion, Money::from_units(100)).await;

    for round in 0..ROUNDS {
        let serial_no = platform
            .ledger
            .request_withdraw(&companion, withdraw(Money::from_units(20)))
            .await
            .unwrap();
        assert_eq!(platform.ledger.balance(&companion).await.unwrap(), Money::from_units(80));

        let handles = (0..6).map(|_| {
            let platform = platform.clone();
            let serial_no = serial_no.clone();
            tokio::spawn(async move { platform.ledger.resolve_withdraw(&serial_no, WithdrawOutcome::Failed).await })
        });
        let results: Vec<_> = join_all(handles).await.into_iter().map(|joined| joined.unwrap()).collect();

        assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1, "round {}: {:?}", round, results);
        for err in results.iter().filter_map(|result| result.as_ref().err()) {
            assert!(matches!(err, CoreError::WithdrawAlreadyResolved { .. }), "round {}: {:?}", round, err);
        }

        // 환불은 정확히 한 번
        assert_eq!(platform.ledger.balance(&companion).await.unwrap(), Money::from_units(100));
        let reconciliation = platform.ledger.reconcile(companion.user_id).await.unwrap();
        assert!(reconciliation.is_consistent(), "{:?}", reconciliation);
    }
}
