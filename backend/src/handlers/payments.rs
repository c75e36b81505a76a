use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::get,
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult, AppError};
use crate::pagination::{search_pattern, PaginationMeta, PaginationParams, PaymentFilters, QueryBuilder};
use crate::response::ApiResponse;
use crate::services::invoicing::{ITEM_COLUMNS, PAYMENT_COLUMNS};
use crate::services::totals;
use crate::validation::{enums, number, Validator, MAX_NOTES_LENGTH, PAYMENT_METHODS, PAYMENT_STATUSES};
use crate::AppState;
use quickpay_shared::{ClientSummary, InvoiceItem, Payment};

#[derive(Debug, Deserialize)]
pub struct PaymentUpdate {
    pub status: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub payment_method: Option<String>,
    pub transaction_id: Option<String>,
}

/// Client shape embedded in payment responses
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PaymentClient {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub company: Option<String>,
}

/// Item shape embedded in payment responses
#[derive(Debug, Serialize)]
pub struct PaymentItemSummary {
    pub id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

#[derive(Debug, Serialize)]
pub struct PaymentWithRelations {
    #[serde(flatten)]
    pub payment: Payment,
    pub client: PaymentClient,
    pub items: Vec<PaymentItemSummary>,
}

#[derive(Debug, Serialize)]
pub struct PaymentSummaryTotals {
    pub total_amount: Decimal,
    pub average_amount: Decimal,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct PaymentListData {
    pub payments: Vec<PaymentWithRelations>,
    pub pagination: PaginationMeta,
    pub summary: PaymentSummaryTotals,
}

#[derive(Debug, Serialize)]
pub struct PaymentDetail {
    #[serde(flatten)]
    pub payment: Payment,
    pub client: ClientSummary,
    pub invoice_items: Vec<PaymentItemSummary>,
}

#[derive(Debug, Serialize)]
pub struct PaymentWithClient {
    #[serde(flatten)]
    pub payment: Payment,
    pub client: PaymentClient,
}

pub fn payment_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_payments))
        .route(
            "/:id",
            get(get_payment).patch(update_payment).delete(delete_payment),
        )
        .route("/recent/:count", get(get_recent_payments))
}

async fn list_payments(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filters): Query<PaymentFilters>,
) -> ApiResult<Json<ApiResponse<PaymentListData>>> {
    // "all" disables the status filter
    let status_filter = match filters.status.as_deref() {
        None | Some("all") => None,
        Some(s) => Some(enums::one_of(s, "status", PAYMENT_STATUSES)?),
    };

    let mut qb = QueryBuilder::new();
    if status_filter.is_some() {
        qb.add_condition("p.status = {}");
    }
    if filters.client_id.is_some() {
        qb.add_condition("p.client_id = {}");
    }
    if filters.search.is_some() {
        qb.add_condition(
            "(p.invoice_number ILIKE {} OR p.description ILIKE {} OR c.name ILIKE {} OR c.email ILIKE {})",
        );
    }
    let where_clause = qb.where_clause();

    let count_sql = format!(
        "SELECT COUNT(*) FROM payments p JOIN clients c ON p.client_id = c.id {}",
        where_clause
    );
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(status) = &status_filter {
        count_query = count_query.bind(status);
    }
    if let Some(client_id) = filters.client_id {
        count_query = count_query.bind(client_id);
    }
    if let Some(search) = &filters.search {
        count_query = count_query.bind(search_pattern(search));
    }
    let total = count_query
        .fetch_one(&state.db_pool)
        .await
        .map_err(AppError::from)?;

    let summary_sql = format!(
        "SELECT COALESCE(SUM(p.amount), 0), COALESCE(AVG(p.amount), 0), COUNT(*)
         FROM payments p JOIN clients c ON p.client_id = c.id {}",
        where_clause
    );
    let mut summary_query = sqlx::query_as::<_, (Decimal, Decimal, i64)>(&summary_sql);
    if let Some(status) = &status_filter {
        summary_query = summary_query.bind(status);
    }
    if let Some(client_id) = filters.client_id {
        summary_query = summary_query.bind(client_id);
    }
    if let Some(search) = &filters.search {
        summary_query = summary_query.bind(search_pattern(search));
    }
    let (total_amount, average_amount, count) = summary_query
        .fetch_one(&state.db_pool)
        .await
        .map_err(AppError::from)?;

    let list_sql = format!(
        "SELECT {} FROM payments p JOIN clients c ON p.client_id = c.id {}
         ORDER BY p.created_at DESC LIMIT ${} OFFSET ${}",
        prefixed_payment_columns(),
        where_clause,
        qb.param_count() + 1,
        qb.param_count() + 2
    );
    let mut list_query = sqlx::query_as::<_, Payment>(&list_sql);
    if let Some(status) = &status_filter {
        list_query = list_query.bind(status);
    }
    if let Some(client_id) = filters.client_id {
        list_query = list_query.bind(client_id);
    }
    if let Some(search) = &filters.search {
        list_query = list_query.bind(search_pattern(search));
    }
    let payments = list_query
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&state.db_pool)
        .await
        .map_err(AppError::from)?;

    let client_ids: Vec<Uuid> = payments.iter().map(|p| p.client_id).collect();
    let clients: Vec<PaymentClient> = sqlx::query_as(
        "SELECT id, name, email, company FROM clients WHERE id = ANY($1)",
    )
    .bind(&client_ids)
    .fetch_all(&state.db_pool)
    .await
    .map_err(AppError::from)?;
    let clients_by_id: HashMap<Uuid, PaymentClient> =
        clients.into_iter().map(|c| (c.id, c)).collect();

    let payment_ids: Vec<Uuid> = payments.iter().map(|p| p.id).collect();
    let item_rows: Vec<(Uuid, Uuid, String, Decimal, Decimal, Decimal)> = sqlx::query_as(
        "SELECT payment_id, id, description, quantity, unit_price, total_price
         FROM invoice_items WHERE payment_id = ANY($1) ORDER BY created_at, id",
    )
    .bind(&payment_ids)
    .fetch_all(&state.db_pool)
    .await
    .map_err(AppError::from)?;

    let mut items_by_payment: HashMap<Uuid, Vec<PaymentItemSummary>> = HashMap::new();
    for (payment_id, id, description, quantity, unit_price, total_price) in item_rows {
        items_by_payment
            .entry(payment_id)
            .or_default()
            .push(PaymentItemSummary {
                id,
                description,
                quantity,
                unit_price,
                total_price,
            });
    }

    let mut rows = Vec::with_capacity(payments.len());
    for payment in payments {
        let client = clients_by_id
            .get(&payment.client_id)
            .cloned()
            .ok_or_else(|| ApiError::internal("Payment references a missing client"))?;
        let items = items_by_payment.remove(&payment.id).unwrap_or_default();
        rows.push(PaymentWithRelations {
            payment,
            client,
            items,
        });
    }

    let fetched = rows.len();
    let data = PaymentListData {
        payments: rows,
        pagination: PaginationMeta::new(
            pagination.page.max(1),
            pagination.limit(),
            total,
        ),
        summary: PaymentSummaryTotals {
            total_amount,
            average_amount: totals::round_money(average_amount),
            count,
        },
    };
    let message = format!(
        "Retrieved {} payment{}",
        fetched,
        if fetched == 1 { "" } else { "s" }
    );
    Ok(ApiResponse::new(data, message))
}

async fn get_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<PaymentDetail>>> {
    let payment = fetch_payment(&state, id).await?;
    let client = fetch_client_summary(&state, payment.client_id).await?;

    let items = sqlx::query_as::<_, InvoiceItem>(&format!(
        "SELECT {} FROM invoice_items WHERE payment_id = $1 ORDER BY created_at, id",
        ITEM_COLUMNS
    ))
    .bind(id)
    .fetch_all(&state.db_pool)
    .await
    .map_err(AppError::from)?;

    let invoice_items = items
        .into_iter()
        .map(|item| PaymentItemSummary {
            id: item.id,
            description: item.description,
            quantity: item.quantity,
            unit_price: item.unit_price,
            total_price: item.total_price,
        })
        .collect();

    Ok(ApiResponse::new(
        PaymentDetail {
            payment,
            client,
            invoice_items,
        },
        "Payment retrieved successfully",
    ))
}

async fn update_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PaymentUpdate>,
) -> ApiResult<Json<ApiResponse<PaymentWithClient>>> {
    let mut v = Validator::new();
    if let Some(status) = &payload.status {
        v = v.error_if(
            !PAYMENT_STATUSES.contains(&status.to_lowercase().as_str()),
            "status",
            "Invalid status",
        );
    }
    if let Some(method) = &payload.payment_method {
        v = v.error_if(
            !PAYMENT_METHODS.contains(&method.to_lowercase().as_str()),
            "payment_method",
            "Invalid payment method",
        );
    }
    v = v.max_length(&payload.notes, "notes", MAX_NOTES_LENGTH);
    v.finish()?;

    let status = payload.status.map(|s| s.to_lowercase());
    let payment_method = payload.payment_method.map(|m| m.to_lowercase());

    let payment = sqlx::query_as::<_, Payment>(&format!(
        "UPDATE payments SET
         status = COALESCE($2, status),
         description = COALESCE($3, description),
         notes = COALESCE($4, notes),
         payment_method = COALESCE($5, payment_method),
         transaction_id = COALESCE($6, transaction_id),
         paid_at = CASE WHEN $2 = 'completed' AND paid_at IS NULL THEN NOW() ELSE paid_at END,
         updated_at = NOW()
         WHERE id = $1
         RETURNING {}",
        PAYMENT_COLUMNS
    ))
    .bind(id)
    .bind(status)
    .bind(payload.description)
    .bind(payload.notes)
    .bind(payment_method)
    .bind(payload.transaction_id)
    .fetch_optional(&state.db_pool)
    .await
    .map_err(AppError::from)?
    .ok_or_else(|| ApiError::not_found("Payment"))?;

    let client = sqlx::query_as::<_, PaymentClient>(
        "SELECT id, name, email, company FROM clients WHERE id = $1",
    )
    .bind(payment.client_id)
    .fetch_one(&state.db_pool)
    .await
    .map_err(AppError::from)?;

    Ok(ApiResponse::new(
        PaymentWithClient { payment, client },
        "Payment updated successfully",
    ))
}

async fn delete_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<()>>> {
    delete_pending(&state, id, "Payment").await?;
    Ok(ApiResponse::new((), "Payment deleted successfully"))
}

/// Delete a payment that is still pending; items cascade with the header.
/// Shared by the payments and invoices delete endpoints.
pub(crate) async fn delete_pending(state: &AppState, id: Uuid, resource: &str) -> ApiResult<()> {
    let status: Option<String> = sqlx::query_scalar("SELECT status FROM payments WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db_pool)
        .await
        .map_err(AppError::from)?;

    let Some(status) = status else {
        return Err(ApiError::not_found(resource));
    };

    if status != "pending" {
        return Err(ApiError::bad_request(format!(
            "Only pending {}s can be deleted",
            resource.to_lowercase()
        )));
    }

    sqlx::query("DELETE FROM payments WHERE id = $1")
        .bind(id)
        .execute(&state.db_pool)
        .await
        .map_err(AppError::from)?;

    Ok(())
}

async fn get_recent_payments(
    State(state): State<Arc<AppState>>,
    Path(count): Path<i64>,
) -> ApiResult<Json<ApiResponse<Vec<PaymentWithClient>>>> {
    let count = number::in_range(count, "count", 1, 50)?;

    let payments = sqlx::query_as::<_, Payment>(&format!(
        "SELECT {} FROM payments p ORDER BY p.created_at DESC LIMIT $1",
        prefixed_payment_columns()
    ))
    .bind(count)
    .fetch_all(&state.db_pool)
    .await
    .map_err(AppError::from)?;

    let client_ids: Vec<Uuid> = payments.iter().map(|p| p.client_id).collect();
    let clients: Vec<PaymentClient> = sqlx::query_as(
        "SELECT id, name, email, company FROM clients WHERE id = ANY($1)",
    )
    .bind(&client_ids)
    .fetch_all(&state.db_pool)
    .await
    .map_err(AppError::from)?;
    let clients_by_id: HashMap<Uuid, PaymentClient> =
        clients.into_iter().map(|c| (c.id, c)).collect();

    let mut rows = Vec::with_capacity(payments.len());
    for payment in payments {
        let client = clients_by_id
            .get(&payment.client_id)
            .cloned()
            .ok_or_else(|| ApiError::internal("Payment references a missing client"))?;
        rows.push(PaymentWithClient { payment, client });
    }

    Ok(ApiResponse::new(
        rows,
        "Recent payments retrieved successfully",
    ))
}

pub(crate) async fn fetch_payment(state: &AppState, id: Uuid) -> ApiResult<Payment> {
    sqlx::query_as::<_, Payment>(&format!(
        "SELECT {} FROM payments WHERE id = $1",
        PAYMENT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&state.db_pool)
    .await
    .map_err(AppError::from)?
    .ok_or_else(|| ApiError::not_found("Payment"))
}

pub(crate) async fn fetch_client_summary(
    state: &AppState,
    client_id: Uuid,
) -> ApiResult<ClientSummary> {
    sqlx::query_as::<_, ClientSummary>(
        "SELECT id, name, email, phone, company, address FROM clients WHERE id = $1",
    )
    .bind(client_id)
    .fetch_one(&state.db_pool)
    .await
    .map_err(AppError::from)
}

/// Payment columns qualified with the `p.` alias for joined queries.
fn prefixed_payment_columns() -> String {
    PAYMENT_COLUMNS
        .split(", ")
        .map(|col| format!("p.{}", col.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}
