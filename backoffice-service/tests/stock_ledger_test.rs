//! Stock ledger integration tests: availability, clamped deltas and the
//! conditional decrement.

mod common;

use backoffice_service::error::WorkflowError;
use backoffice_service::models::{ActivityAction, ActivityTarget};
use backoffice_service::services::{StockLedger, Store, StoreTx};
use common::setup;
use uuid::Uuid;

#[tokio::test]
async fn availability_reports_on_hand() {
    let ctx = setup();
    let gauze = ctx.stock("Gauze", 4, 10).await;
    let ledger = StockLedger::new(ctx.store.clone());

    let check = ledger.check_availability(gauze, 4).await.unwrap();
    assert!(check.available);
    assert_eq!(check.on_hand, 4);

    let check = ledger.check_availability(gauze, 5).await.unwrap();
    assert!(!check.available);

    let err = ledger
        .check_availability(Uuid::new_v4(), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound(_)));
}

#[tokio::test]
async fn apply_delta_floors_at_zero_and_logs_once() {
    let ctx = setup();
    let gauze = ctx.stock("Gauze", 4, 10).await;
    let ledger = StockLedger::new(ctx.store.clone());

    let mut tx = ctx.store.begin().await.unwrap();
    let movement = ledger
        .apply_delta(&mut tx, gauze, -9, &ctx.clerk, ActivityAction::StockUpdate, "")
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(movement.before, 4);
    assert_eq!(movement.after, 0);
    assert!(movement.item.is_low_stock);
    assert_eq!(ctx.on_hand(gauze).await, 0);

    let history = ctx
        .store
        .list_activity(ActivityTarget::StockItem(gauze))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, ActivityAction::StockUpdate);
    assert_eq!(history[0].quantity_before, Some(4));
    assert_eq!(history[0].quantity_after, Some(0));
}

#[tokio::test]
async fn low_stock_flag_follows_quantity() {
    let ctx = setup();
    // Seeded items use a threshold of 3.
    let gauze = ctx.stock("Gauze", 2, 10).await;

    let item = ctx.catalog.adjust_stock(gauze, 1, &ctx.clerk).await.unwrap();
    assert_eq!(item.quantity, 3);
    assert!(!item.is_low_stock);

    let item = ctx.catalog.adjust_stock(gauze, -1, &ctx.clerk).await.unwrap();
    assert!(item.is_low_stock);
}

#[tokio::test]
async fn reserve_refuses_overdraw_without_side_effects() {
    let ctx = setup();
    let gauze = ctx.stock("Gauze", 3, 10).await;
    let ledger = StockLedger::new(ctx.store.clone());

    let mut tx = ctx.store.begin().await.unwrap();
    let err = ledger
        .reserve(&mut tx, gauze, 4, &ctx.clerk, ActivityAction::Sale, "")
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Conflict(_)));
    assert!(err.to_string().contains("Gauze"));

    let err = ledger
        .reserve(&mut tx, Uuid::new_v4(), 1, &ctx.clerk, ActivityAction::Sale, "")
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound(_)));

    let movement = ledger
        .reserve(&mut tx, gauze, 3, &ctx.clerk, ActivityAction::Sale, "counter sale")
        .await
        .unwrap();
    assert_eq!((movement.before, movement.after), (3, 0));
    tx.commit().await.unwrap();

    let history = ctx
        .store
        .list_activity(ActivityTarget::StockItem(gauze))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].description, "Sold 3 units (counter sale)");
}

#[tokio::test]
async fn adjust_stock_validates_and_records() {
    let ctx = setup();
    let gauze = ctx.stock("Gauze", 5, 10).await;

    let err = ctx
        .catalog
        .adjust_stock(gauze, 0, &ctx.clerk)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::BadRequest { .. }));

    let err = ctx
        .catalog
        .adjust_stock(Uuid::new_v4(), 2, &ctx.clerk)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound(_)));

    ctx.catalog.adjust_stock(gauze, -2, &ctx.clerk).await.unwrap();
    ctx.catalog.adjust_stock(gauze, 6, &ctx.admin).await.unwrap();
    ctx.catalog.adjust_stock(gauze, -20, &ctx.clerk).await.unwrap();

    assert_eq!(ctx.on_hand(gauze).await, 0);

    let history = ctx.catalog.activity_for(ActivityTarget::StockItem(gauze)).await.unwrap();
    let trail: Vec<_> = history
        .iter()
        .map(|e| (e.quantity_before, e.quantity_after))
        .collect();
    assert_eq!(
        trail,
        [(Some(5), Some(3)), (Some(3), Some(9)), (Some(9), Some(0))]
    );
    assert_eq!(history[1].user_name, "Avery Admin");
}
