// Integration tests for the invoices API: creation envelope, validation
// aggregation, lookup, and pending-only deletion.

use axum::http::StatusCode;
use serde_json::json;
use serial_test::serial;
use uuid::Uuid;

use crate::tests::fixtures::{insert_client_fixture, ClientFixture};
use crate::tests::helpers::{decimal_field, delete_request, get_request, json_request, send, test_app};
use crate::tests::TestContext;

fn dec(s: &str) -> rust_decimal::Decimal {
    s.parse().expect("valid decimal literal")
}

fn invoice_payload(client_id: Uuid) -> serde_json::Value {
    json!({
        "client_id": client_id,
        "due_date": "2025-06-30",
        "items": [
            { "description": "Development", "quantity": 10, "rate": 50 }
        ],
        "tax_rate": 10
    })
}

#[tokio::test]
#[serial]
async fn test_create_invoice_returns_created_envelope() {
    let ctx = TestContext::new().await;
    let client = ClientFixture::default();
    insert_client_fixture(&ctx.db_pool, &client).await.unwrap();

    let (status, body) = send(
        test_app(&ctx),
        json_request("POST", "/api/v1/invoices", invoice_payload(client.id)),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["message"], json!("Invoice created successfully"));

    let data = &body["data"];
    assert!(data["invoice_number"]
        .as_str()
        .expect("invoice_number missing")
        .starts_with("INV-"));
    assert_eq!(data["status"], json!("pending"));
    assert_eq!(decimal_field(data, "subtotal"), dec("500"));
    assert_eq!(decimal_field(data, "tax_amount"), dec("50"));
    assert_eq!(decimal_field(data, "discount_amount"), dec("0"));
    assert_eq!(decimal_field(data, "amount"), dec("550"));
    assert_eq!(data["client"]["id"], json!(client.id.to_string()));

    let items = data["invoice_items"].as_array().expect("items missing");
    assert_eq!(items.len(), 1);
    assert_eq!(decimal_field(&items[0], "rate"), dec("50"));
    assert_eq!(decimal_field(&items[0], "amount"), dec("500"));

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn test_create_invoice_reports_every_violation() {
    let ctx = TestContext::new().await;

    let payload = json!({
        "items": [
            { "description": "", "quantity": 0 }
        ],
        "tax_rate": 150,
        "discount": -5
    });

    let (status, body) = send(
        test_app(&ctx),
        json_request("POST", "/api/v1/invoices", payload),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"], json!("Validation failed"));

    let details = body["details"].as_object().expect("details missing");
    for field in [
        "client_id",
        "due_date",
        "items[0].description",
        "items[0].quantity",
        "items[0].rate",
        "tax_rate",
        "discount",
    ] {
        assert!(details.contains_key(field), "missing violation for {}", field);
    }

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn test_create_invoice_for_unknown_client_is_not_found() {
    let ctx = TestContext::new().await;

    let (status, body) = send(
        test_app(&ctx),
        json_request("POST", "/api/v1/invoices", invoice_payload(Uuid::new_v4())),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("Not found"));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments")
        .fetch_one(&ctx.db_pool)
        .await
        .unwrap();
    assert_eq!(count, 0, "nothing may be written for an unknown client");

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn test_get_invoice_returns_identical_totals() {
    let ctx = TestContext::new().await;
    let client = ClientFixture::default();
    insert_client_fixture(&ctx.db_pool, &client).await.unwrap();

    let (_, created) = send(
        test_app(&ctx),
        json_request("POST", "/api/v1/invoices", invoice_payload(client.id)),
    )
    .await;
    let id = created["data"]["id"].as_str().expect("id missing");

    let (status, fetched) = send(
        test_app(&ctx),
        get_request(&format!("/api/v1/invoices/{}", id)),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    for field in ["amount", "subtotal", "tax_amount", "discount_amount"] {
        assert_eq!(
            decimal_field(&fetched["data"], field),
            decimal_field(&created["data"], field),
            "stored {} drifted from creation response",
            field
        );
    }

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn test_delete_invoice_allowed_only_while_pending() {
    let ctx = TestContext::new().await;
    let client = ClientFixture::default();
    insert_client_fixture(&ctx.db_pool, &client).await.unwrap();

    let (_, created) = send(
        test_app(&ctx),
        json_request("POST", "/api/v1/invoices", invoice_payload(client.id)),
    )
    .await;
    let id = created["data"]["id"].as_str().expect("id missing").to_string();

    // Pending invoices delete cleanly, items cascade
    let (status, _) = send(
        test_app(&ctx),
        delete_request(&format!("/api/v1/invoices/{}", id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let remaining_items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoice_items")
        .fetch_one(&ctx.db_pool)
        .await
        .unwrap();
    assert_eq!(remaining_items, 0, "items must cascade with the header");

    // Non-pending invoices are refused
    let (_, created) = send(
        test_app(&ctx),
        json_request("POST", "/api/v1/invoices", invoice_payload(client.id)),
    )
    .await;
    let id = created["data"]["id"].as_str().expect("id missing").to_string();

    sqlx::query("UPDATE payments SET status = 'completed' WHERE id = $1::uuid")
        .bind(&id)
        .execute(&ctx.db_pool)
        .await
        .unwrap();

    let (status, body) = send(
        test_app(&ctx),
        delete_request(&format!("/api/v1/invoices/{}", id)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Bad request"));

    ctx.cleanup().await;
}
