//! Invoice creation integration tests against the in-memory store.

mod common;

use backoffice_service::error::WorkflowError;
use backoffice_service::models::{
    ActivityAction, ActivityTarget, InvoiceIntent, InvoiceStatus, LineRequest, StockItemPatch,
};
use backoffice_service::services::Store;
use common::{intent, setup};
use rust_decimal::Decimal;
use uuid::Uuid;

#[tokio::test]
async fn create_takes_stock_and_links_customer() {
    let ctx = setup();
    let gauze = ctx.stock("Gauze", 10, 10).await;
    let tape = ctx.stock("Tape", 5, 5).await;
    let customer = ctx.customer("Northside Clinic").await;

    let request = InvoiceIntent {
        sn: Some("INV-001".to_string()),
        declared_total: Some(Decimal::new(2125, 2)),
        ..intent(customer, &[(gauze, 2), (tape, 1)])
    };
    let invoice = ctx.workflow.create_invoice(request, &ctx.clerk).await.unwrap();

    assert_eq!(invoice.total_amount, Decimal::new(2125, 2));
    assert_eq!(invoice.discount_rate, Decimal::from(15));
    assert_eq!(invoice.status, InvoiceStatus::Due);
    assert_eq!(invoice.user_id, ctx.clerk.user_id);
    assert_eq!(invoice.line_items.len(), 2);
    assert_eq!(invoice.line_items[0].name, "Gauze");
    assert_eq!(invoice.line_items[0].unit_price, Decimal::from(10));

    assert_eq!(ctx.on_hand(gauze).await, 8);
    assert_eq!(ctx.on_hand(tape).await, 4);
    assert_eq!(ctx.customer_invoices(customer).await, vec![invoice.invoice_id]);

    let stored = ctx.workflow.get_invoice(invoice.invoice_id).await.unwrap();
    assert_eq!(stored, invoice);

    let history = ctx
        .store
        .list_activity(ActivityTarget::Invoice(invoice.invoice_id))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, ActivityAction::Created);
    assert_eq!(history[0].user_name, "Casey Clerk");

    let movements = ctx
        .store
        .list_activity(ActivityTarget::StockItem(gauze))
        .await
        .unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].action, ActivityAction::Sale);
    assert_eq!(movements[0].quantity_before, Some(10));
    assert_eq!(movements[0].quantity_after, Some(8));
}

#[tokio::test]
async fn insufficient_stock_reports_every_line_and_changes_nothing() {
    let ctx = setup();
    let gauze = ctx.stock("Gauze", 1, 10).await;
    let tape = ctx.stock("Tape", 0, 5).await;
    let customer = ctx.customer("Northside Clinic").await;
    let ghost = Uuid::new_v4();

    let err = ctx
        .workflow
        .create_invoice(
            intent(customer, &[(gauze, 2), (tape, 1), (ghost, 1), (gauze, 0)]),
            &ctx.clerk,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::BadRequest { .. }));
    let problems = err.problems();
    assert_eq!(problems.len(), 4, "{:?}", problems);
    assert!(problems.iter().any(|p| p.starts_with("Line 4:")));
    assert!(problems.iter().any(|p| p.contains("Gauze")));
    assert!(problems.iter().any(|p| p.contains("Tape")));
    assert!(problems.iter().any(|p| p.contains(&ghost.to_string())));

    assert_eq!(ctx.on_hand(gauze).await, 1);
    assert_eq!(ctx.on_hand(tape).await, 0);
    assert_eq!(ctx.store.invoice_count().await, 0);
    assert!(ctx.customer_invoices(customer).await.is_empty());
    assert!(ctx
        .store
        .list_activity(ActivityTarget::StockItem(gauze))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn repeated_product_lines_are_checked_together() {
    let ctx = setup();
    let gauze = ctx.stock("Gauze", 5, 10).await;
    let customer = ctx.customer("Northside Clinic").await;

    let err = ctx
        .workflow
        .create_invoice(intent(customer, &[(gauze, 3), (gauze, 3)]), &ctx.clerk)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::BadRequest { .. }));
    assert_eq!(ctx.on_hand(gauze).await, 5);

    let invoice = ctx
        .workflow
        .create_invoice(intent(customer, &[(gauze, 3), (gauze, 2)]), &ctx.clerk)
        .await
        .unwrap();
    assert_eq!(invoice.line_items.len(), 2);
    assert_eq!(ctx.on_hand(gauze).await, 0);
}

#[tokio::test]
async fn declared_total_mismatch_is_rejected_before_stock_moves() {
    let ctx = setup();
    let gauze = ctx.stock("Gauze", 10, 10).await;
    let customer = ctx.customer("Northside Clinic").await;

    let request = InvoiceIntent {
        declared_total: Some(Decimal::from(20)),
        ..intent(customer, &[(gauze, 2)])
    };
    let err = ctx
        .workflow
        .create_invoice(request, &ctx.clerk)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::BadRequest { .. }));
    assert!(err.to_string().contains("mismatch"));
    assert_eq!(ctx.on_hand(gauze).await, 10);
    assert_eq!(ctx.store.invoice_count().await, 0);
}

#[tokio::test]
async fn malformed_requests_are_rejected() {
    let ctx = setup();
    let gauze = ctx.stock("Gauze", 10, 10).await;
    let customer = ctx.customer("Northside Clinic").await;

    let empty = ctx
        .workflow
        .create_invoice(intent(customer, &[]), &ctx.clerk)
        .await
        .unwrap_err();
    assert!(matches!(empty, WorkflowError::BadRequest { .. }));

    let no_customer = InvoiceIntent {
        lines: vec![LineRequest::new(gauze, 1)],
        ..Default::default()
    };
    let err = ctx
        .workflow
        .create_invoice(no_customer, &ctx.clerk)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::BadRequest { .. }));

    let err = ctx
        .workflow
        .create_invoice(intent(Uuid::new_v4(), &[(gauze, 1)]), &ctx.clerk)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound(_)));

    assert_eq!(ctx.on_hand(gauze).await, 10);
}

#[tokio::test]
async fn failed_persist_rolls_back_reserved_stock() {
    let ctx = setup();
    let gauze = ctx.stock("Gauze", 10, 10).await;
    let tape = ctx.stock("Tape", 4, 5).await;
    let customer = ctx.customer("Northside Clinic").await;

    ctx.store.fail_next_invoice_insert();
    let err = ctx
        .workflow
        .create_invoice(intent(customer, &[(gauze, 6), (tape, 4)]), &ctx.clerk)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::Internal(_)));
    assert_eq!(ctx.on_hand(gauze).await, 10);
    assert_eq!(ctx.on_hand(tape).await, 4);
    assert_eq!(ctx.store.invoice_count().await, 0);
    assert!(ctx.customer_invoices(customer).await.is_empty());
    assert!(ctx
        .store
        .list_activity(ActivityTarget::StockItem(gauze))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn line_prices_are_frozen_at_invoicing_time() {
    let ctx = setup();
    let gauze = ctx.stock("Gauze", 10, 10).await;
    let customer = ctx.customer("Northside Clinic").await;

    let invoice = ctx
        .workflow
        .create_invoice(intent(customer, &[(gauze, 1)]), &ctx.clerk)
        .await
        .unwrap();

    let patch = StockItemPatch {
        name: Some("Sterile Gauze".to_string()),
        unit_price: Some(Decimal::from(99)),
        ..Default::default()
    };
    ctx.catalog
        .update_stock_item(gauze, patch, &ctx.admin)
        .await
        .unwrap();

    let stored = ctx.workflow.get_invoice(invoice.invoice_id).await.unwrap();
    assert_eq!(stored.line_items[0].name, "Gauze");
    assert_eq!(stored.line_items[0].unit_price, Decimal::from(10));
    assert_eq!(stored.total_amount, Decimal::new(85, 1));
}

#[tokio::test]
async fn explicit_and_negative_discounts() {
    let ctx = setup();
    let gauze = ctx.stock("Gauze", 10, 10).await;
    let customer = ctx.customer("Northside Clinic").await;

    let none = InvoiceIntent {
        discount: Some(Decimal::ZERO),
        ..intent(customer, &[(gauze, 2)])
    };
    let invoice = ctx.workflow.create_invoice(none, &ctx.clerk).await.unwrap();
    assert_eq!(invoice.total_amount, Decimal::from(20));

    let negative = InvoiceIntent {
        discount: Some(Decimal::from(-5)),
        ..intent(customer, &[(gauze, 1)])
    };
    let invoice = ctx
        .workflow
        .create_invoice(negative, &ctx.clerk)
        .await
        .unwrap();
    assert_eq!(invoice.discount_rate, Decimal::ZERO);
    assert_eq!(invoice.total_amount, Decimal::from(10));

    assert_eq!(ctx.customer_invoices(customer).await.len(), 2);
}

#[tokio::test]
async fn quantity_totals_that_overflow_are_rejected() {
    let ctx = setup();
    let gauze = ctx.stock("Gauze", 5, 10).await;
    let customer = ctx.customer("Northside Clinic").await;

    let err = ctx
        .workflow
        .create_invoice(
            intent(customer, &[(gauze, i64::MAX), (gauze, 2)]),
            &ctx.clerk,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::BadRequest { .. }));
    assert!(
        err.problems().iter().any(|p| p.starts_with("Line 2:")),
        "{:?}",
        err.problems()
    );
    assert_eq!(ctx.on_hand(gauze).await, 5);
    assert_eq!(ctx.store.invoice_count().await, 0);
    assert!(ctx
        .store
        .list_activity(ActivityTarget::StockItem(gauze))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn amounts_too_large_to_price_are_rejected() {
    let ctx = setup();
    let bulk = ctx.stock("Bulk saline", i64::MAX, i64::MAX).await;
    let customer = ctx.customer("Northside Clinic").await;

    let err = ctx
        .workflow
        .create_invoice(intent(customer, &[(bulk, i64::MAX)]), &ctx.clerk)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::BadRequest { .. }));
    assert_eq!(err.to_string(), "Invoice amount out of range");
    assert_eq!(ctx.on_hand(bulk).await, i64::MAX);
    assert_eq!(ctx.store.invoice_count().await, 0);
}
