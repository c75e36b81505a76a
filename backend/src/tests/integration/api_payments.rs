// Integration tests for the payments API: filtered listing with summary,
// status updates, pending-only deletion, and recent-payment bounds.

use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde_json::json;
use serial_test::serial;

use crate::tests::fixtures::{
    insert_client_fixture, insert_payment_fixture, ClientFixture, PaymentFixture,
};
use crate::tests::helpers::{decimal_field, delete_request, get_request, json_request, send, test_app};
use crate::tests::TestContext;

#[tokio::test]
#[serial]
async fn test_list_payments_filters_by_status_with_summary() {
    let ctx = TestContext::new().await;
    let client = ClientFixture::default();
    insert_client_fixture(&ctx.db_pool, &client).await.unwrap();

    let pending = PaymentFixture::new_with_client(client.id).with_amount(Decimal::from(150));
    let completed = PaymentFixture::new_with_client(client.id)
        .with_status("completed")
        .with_amount(Decimal::from(450));
    insert_payment_fixture(&ctx.db_pool, &pending).await.unwrap();
    insert_payment_fixture(&ctx.db_pool, &completed).await.unwrap();

    let (status, body) = send(
        test_app(&ctx),
        get_request("/api/v1/payments?status=pending"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let payments = body["data"]["payments"].as_array().expect("payments missing");
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0]["status"], json!("pending"));
    assert_eq!(payments[0]["client"]["id"], json!(client.id.to_string()));

    let summary = &body["data"]["summary"];
    assert_eq!(summary["count"], json!(1));
    assert_eq!(decimal_field(summary, "total_amount"), Decimal::from(150));

    // "all" disables the filter
    let (_, body) = send(test_app(&ctx), get_request("/api/v1/payments?status=all")).await;
    assert_eq!(body["data"]["payments"].as_array().unwrap().len(), 2);
    assert_eq!(
        decimal_field(&body["data"]["summary"], "total_amount"),
        Decimal::from(600)
    );

    // Unknown status values are rejected
    let (status, _) = send(
        test_app(&ctx),
        get_request("/api/v1/payments?status=refunded"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn test_patch_to_completed_stamps_paid_at() {
    let ctx = TestContext::new().await;
    let client = ClientFixture::default();
    insert_client_fixture(&ctx.db_pool, &client).await.unwrap();
    let payment = PaymentFixture::new_with_client(client.id);
    insert_payment_fixture(&ctx.db_pool, &payment).await.unwrap();

    let (status, body) = send(
        test_app(&ctx),
        json_request(
            "PATCH",
            &format!("/api/v1/payments/{}", payment.id),
            json!({ "status": "completed", "payment_method": "bank_transfer" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("completed"));
    assert_eq!(body["data"]["payment_method"], json!("bank_transfer"));
    assert!(
        body["data"]["paid_at"].is_string(),
        "paid_at must be stamped on transition to completed"
    );

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn test_patch_rejects_unknown_status_and_method() {
    let ctx = TestContext::new().await;
    let client = ClientFixture::default();
    insert_client_fixture(&ctx.db_pool, &client).await.unwrap();
    let payment = PaymentFixture::new_with_client(client.id);
    insert_payment_fixture(&ctx.db_pool, &payment).await.unwrap();

    let (status, body) = send(
        test_app(&ctx),
        json_request(
            "PATCH",
            &format!("/api/v1/payments/{}", payment.id),
            json!({ "status": "refunded", "payment_method": "cash" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let details = body["details"].as_object().expect("details missing");
    assert!(details.contains_key("status"));
    assert!(details.contains_key("payment_method"));

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn test_delete_payment_requires_pending_status() {
    let ctx = TestContext::new().await;
    let client = ClientFixture::default();
    insert_client_fixture(&ctx.db_pool, &client).await.unwrap();
    let completed = PaymentFixture::new_with_client(client.id).with_status("completed");
    insert_payment_fixture(&ctx.db_pool, &completed).await.unwrap();

    let (status, _) = send(
        test_app(&ctx),
        delete_request(&format!("/api/v1/payments/{}", completed.id)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let pending = PaymentFixture::new_with_client(client.id);
    insert_payment_fixture(&ctx.db_pool, &pending).await.unwrap();

    let (status, _) = send(
        test_app(&ctx),
        delete_request(&format!("/api/v1/payments/{}", pending.id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn test_recent_payments_count_is_bounded() {
    let ctx = TestContext::new().await;
    let client = ClientFixture::default();
    insert_client_fixture(&ctx.db_pool, &client).await.unwrap();
    let payment = PaymentFixture::new_with_client(client.id);
    insert_payment_fixture(&ctx.db_pool, &payment).await.unwrap();

    let (status, _) = send(test_app(&ctx), get_request("/api/v1/payments/recent/100")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(test_app(&ctx), get_request("/api/v1/payments/recent/5")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    ctx.cleanup().await;
}
