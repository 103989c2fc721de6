mod common;

use common::*;
use futures::future::join_all;
use std::time::Duration;
use threeds_reconciler::domain::{OrderStatus, PaymentStatus, Transaction, TransactionStatus};

#[tokio::test]
async fn test_concurrent_deliveries_write_once() {
    let harness = TestHarness::new(
        FakeCompleter::new(FakeVerdict::Approve).with_delay(Duration::from_millis(50)),
    );
    harness.ledger.seed(Transaction::pending("conv-race", "ORD-race"));
    let form = redirect_form("conv-race", "pay-race", "1", "success");

    let responses = join_all((0..8).map(|_| harness.post_form(&form))).await;

    assert_eq!(harness.ledger.writes(), 1);
    for (status, html) in &responses {
        assert_eq!(*status, 200);
        assert_eq!(outcome(html), "success");
        assert!(html.contains("\"orderNumber\":\"ORD-race\""));
        assert!(html.contains("\"paymentId\":\"pay-race\""));
    }

    let tx = harness.ledger.transaction("conv-race").unwrap();
    assert_eq!(tx.status, TransactionStatus::Success);
    let order = harness.ledger.order("ORD-race").unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn test_redirect_and_notification_race_agree() {
    let harness = TestHarness::new(
        FakeCompleter::new(FakeVerdict::Approve).with_delay(Duration::from_millis(20)),
    );
    harness.ledger.seed(Transaction::pending("conv-mixed", "ORD-mixed"));

    let redirect = redirect_form("conv-mixed", "pay-mixed", "1", "success");
    let notification = serde_json::json!({
        "iyziEventType": "THREE_DS_AUTH",
        "paymentConversationId": "conv-mixed",
        "paymentId": "pay-mixed",
        "status": "SUCCESS"
    });

    let (first, second) = tokio::join!(
        harness.post_form(&redirect),
        harness.post_json(notification)
    );

    assert_eq!(harness.ledger.writes(), 1);
    assert_eq!(outcome(&first.1), outcome(&second.1));
    assert_eq!(
        harness.ledger.transaction("conv-mixed").unwrap().status,
        TransactionStatus::Success
    );
}

#[tokio::test]
async fn test_order_never_paid_without_successful_transaction() {
    let harness = TestHarness::new(FakeCompleter::new(FakeVerdict::Decline));
    harness.ledger.seed(Transaction::pending("conv-d", "ORD-d"));
    let form = redirect_form("conv-d", "pay-d", "1", "success");

    join_all((0..4).map(|_| harness.post_form(&form))).await;

    let tx = harness.ledger.transaction("conv-d").unwrap();
    let order = harness.ledger.order("ORD-d").unwrap();
    assert_eq!(tx.status, TransactionStatus::Failure);
    assert_ne!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(harness.ledger.writes(), 1);
}
