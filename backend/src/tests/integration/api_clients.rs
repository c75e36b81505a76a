// Integration tests for the clients API: CRUD, case-insensitive email
// uniqueness, deletion rules, and per-client statistics.

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
async fn test_create_client_and_duplicate_email_conflict() {
    let ctx = TestContext::new().await;

    let payload = json!({
        "name": "John Smith",
        "email": "John.Smith@Example.com",
        "company": "Tech Solutions Inc."
    });

    let (status, body) = send(
        test_app(&ctx),
        json_request("POST", "/api/v1/clients", payload),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    // Email is normalized to lowercase on write
    assert_eq!(body["data"]["email"], json!("john.smith@example.com"));
    assert_eq!(body["data"]["is_active"], json!(true));

    // Same address with different casing is a conflict
    let duplicate = json!({
        "name": "Jon Smith",
        "email": "JOHN.SMITH@example.COM"
    });
    let (status, body) = send(
        test_app(&ctx),
        json_request("POST", "/api/v1/clients", duplicate),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], json!("Conflict"));

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn test_create_client_aggregates_validation_errors() {
    let ctx = TestContext::new().await;

    let (status, body) = send(
        test_app(&ctx),
        json_request("POST", "/api/v1/clients", json!({ "email": "not-an-email" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let details = body["details"].as_object().expect("details missing");
    assert!(details.contains_key("name"));
    assert!(details.contains_key("email"));

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn test_list_clients_search_and_pagination() {
    let ctx = TestContext::new().await;

    let mut acme = ClientFixture::default();
    acme.name = "Acme Industrial".to_string();
    insert_client_fixture(&ctx.db_pool, &acme).await.unwrap();

    for _ in 0..2 {
        insert_client_fixture(&ctx.db_pool, &ClientFixture::default())
            .await
            .unwrap();
    }

    let (status, body) = send(
        test_app(&ctx),
        get_request("/api/v1/clients?search=Acme&page=1&limit=10"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let clients = body["data"]["clients"].as_array().expect("clients missing");
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0]["name"], json!("Acme Industrial"));
    assert_eq!(body["data"]["pagination"]["total"], json!(1));

    let (_, all) = send(test_app(&ctx), get_request("/api/v1/clients?limit=2")).await;
    assert_eq!(all["data"]["clients"].as_array().unwrap().len(), 2);
    assert_eq!(all["data"]["pagination"]["total"], json!(3));
    assert_eq!(all["data"]["pagination"]["has_next"], json!(true));

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn test_update_client() {
    let ctx = TestContext::new().await;
    let client = ClientFixture::default();
    insert_client_fixture(&ctx.db_pool, &client).await.unwrap();

    let payload = json!({
        "name": "Renamed Client",
        "email": client.email,
        "is_active": false
    });
    let (status, body) = send(
        test_app(&ctx),
        json_request("PUT", &format!("/api/v1/clients/{}", client.id), payload),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], json!("Renamed Client"));
    assert_eq!(body["data"]["is_active"], json!(false));
    // Optional fields not sent are cleared by the full update
    assert_eq!(body["data"]["phone"], json!(null));

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn test_delete_client_refused_while_payments_exist() {
    let ctx = TestContext::new().await;
    let client = ClientFixture::default();
    insert_client_fixture(&ctx.db_pool, &client).await.unwrap();
    let payment = PaymentFixture::new_with_client(client.id);
    insert_payment_fixture(&ctx.db_pool, &payment).await.unwrap();

    let (status, body) = send(
        test_app(&ctx),
        delete_request(&format!("/api/v1/clients/{}", client.id)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], json!("Conflict"));

    sqlx::query("DELETE FROM payments WHERE id = $1")
        .bind(payment.id)
        .execute(&ctx.db_pool)
        .await
        .unwrap();

    let (status, _) = send(
        test_app(&ctx),
        delete_request(&format!("/api/v1/clients/{}", client.id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn test_client_stats_aggregates_by_status() {
    let ctx = TestContext::new().await;
    let client = ClientFixture::default();
    insert_client_fixture(&ctx.db_pool, &client).await.unwrap();

    let completed = PaymentFixture::new_with_client(client.id)
        .with_status("completed")
        .with_amount(Decimal::from(300));
    let pending = PaymentFixture::new_with_client(client.id).with_amount(Decimal::from(200));
    insert_payment_fixture(&ctx.db_pool, &completed).await.unwrap();
    insert_payment_fixture(&ctx.db_pool, &pending).await.unwrap();

    let (status, body) = send(
        test_app(&ctx),
        get_request(&format!("/api/v1/clients/{}/stats", client.id)),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let stats = &body["data"]["statistics"];
    assert_eq!(stats["total_invoices"], json!(2));
    assert_eq!(decimal_field(stats, "total_amount"), Decimal::from(500));
    assert_eq!(decimal_field(stats, "paid_amount"), Decimal::from(300));
    assert_eq!(decimal_field(stats, "pending_amount"), Decimal::from(200));
    assert_eq!(stats["status_counts"]["completed"], json!(1));
    assert_eq!(stats["status_counts"]["pending"], json!(1));
    assert_eq!(stats["payment_rate"], json!(50.0));

    ctx.cleanup().await;
}
