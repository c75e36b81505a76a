// Integration tests for the stats API: summary totals, dashboard shape,
// period filters, and per-client metrics.

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use serial_test::serial;

use crate::tests::fixtures::{
    insert_client_fixture, insert_payment_fixture, ClientFixture, PaymentFixture,
};
use crate::tests::helpers::{decimal_field, get_request, send, test_app};
use crate::tests::TestContext;

async fn seed_mixed_payments(ctx: &TestContext) -> ClientFixture {
    let client = ClientFixture::default();
    insert_client_fixture(&ctx.db_pool, &client).await.unwrap();

    let completed = PaymentFixture::new_with_client(client.id)
        .with_status("completed")
        .with_amount(Decimal::from(300));
    insert_payment_fixture(&ctx.db_pool, &completed).await.unwrap();

    // Pending and already past due
    let mut overdue = PaymentFixture::new_with_client(client.id).with_amount(Decimal::from(200));
    overdue.due_date = Utc::now().date_naive() - Duration::days(10);
    insert_payment_fixture(&ctx.db_pool, &overdue).await.unwrap();

    client
}

#[tokio::test]
#[serial]
async fn test_summary_stats() {
    let ctx = TestContext::new().await;
    seed_mixed_payments(&ctx).await;

    let (status, body) = send(test_app(&ctx), get_request("/api/v1/stats")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    let data = &body["data"];
    assert_eq!(decimal_field(data, "total"), Decimal::from(300));
    assert_eq!(decimal_field(data, "pending"), Decimal::from(200));
    assert_eq!(decimal_field(data, "overdue"), Decimal::from(200));
    assert_eq!(data["total_payments"], json!(2));
    assert_eq!(data["completed_payments"], json!(1));
    assert_eq!(data["overdue_payments_count"], json!(1));
    assert_eq!(data["total_clients"], json!(1));

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn test_dashboard_stats() {
    let ctx = TestContext::new().await;
    seed_mixed_payments(&ctx).await;

    let (status, body) = send(test_app(&ctx), get_request("/api/v1/stats/dashboard")).await;

    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(decimal_field(&data["overview"], "total_revenue"), Decimal::from(300));
    assert_eq!(data["overview"]["total_invoices"], json!(2));
    assert_eq!(data["status_distribution"]["completed"], json!(1));
    assert_eq!(data["status_distribution"]["pending"], json!(1));
    assert_eq!(data["status_distribution"]["overdue"], json!(1));
    assert_eq!(
        data["monthly_trend"].as_array().expect("trend missing").len(),
        6
    );
    assert_eq!(data["performance"]["collection_rate"], json!(50.0));

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn test_payment_stats_period_filter() {
    let ctx = TestContext::new().await;
    seed_mixed_payments(&ctx).await;

    let (status, body) = send(
        test_app(&ctx),
        get_request("/api/v1/stats/payments?period=7d"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let summary = &body["data"]["summary"];
    assert_eq!(summary["total_payments"], json!(2));
    assert_eq!(decimal_field(summary, "total_amount"), Decimal::from(500));
    assert_eq!(summary["status_counts"]["completed"], json!(1));
    assert!(!body["data"]["daily_breakdown"]
        .as_array()
        .expect("breakdown missing")
        .is_empty());

    let (status, _) = send(
        test_app(&ctx),
        get_request("/api/v1/stats/payments?period=2w"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn test_client_stats_metrics() {
    let ctx = TestContext::new().await;
    let client = seed_mixed_payments(&ctx).await;

    let (status, body) = send(test_app(&ctx), get_request("/api/v1/stats/clients")).await;

    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["summary"]["total_clients"], json!(1));
    assert_eq!(data["summary"]["active_clients"], json!(1));
    assert_eq!(decimal_field(&data["summary"], "total_revenue"), Decimal::from(300));

    let clients = data["clients"].as_array().expect("clients missing");
    assert_eq!(clients[0]["id"], json!(client.id.to_string()));
    assert_eq!(clients[0]["metrics"]["total_invoices"], json!(2));
    assert_eq!(clients[0]["metrics"]["payment_rate"], json!(50.0));

    ctx.cleanup().await;
}
