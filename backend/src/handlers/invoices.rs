use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult, AppError};
use crate::pagination::{InvoiceFilters, PaginatedResponse, PaginationParams, QueryBuilder};
use crate::response::ApiResponse;
use crate::services::invoicing::{self, CreateInvoiceRequest, CreatedInvoice, ITEM_COLUMNS};
use crate::validation::{enums, PAYMENT_STATUSES};
use crate::AppState;
use quickpay_shared::{ClientSummary, InvoiceItem, Payment};

use super::payments;

/// Columns callers may sort invoice lists by.
const INVOICE_SORT_FIELDS: &[&str] = &["created_at", "due_date", "amount", "status", "invoice_number"];

/// Line item as rendered on the invoice surface: the caller-facing names are
/// `rate` and `amount` rather than the stored `unit_price`/`total_price`.
#[derive(Debug, Serialize)]
pub struct InvoiceItemResponse {
    pub id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
    pub category: Option<String>,
    pub sku: Option<String>,
    pub taxable: bool,
    pub created_at: DateTime<Utc>,
}

impl From<InvoiceItem> for InvoiceItemResponse {
    fn from(item: InvoiceItem) -> Self {
        Self {
            id: item.id,
            description: item.description,
            quantity: item.quantity,
            rate: item.unit_price,
            amount: item.total_price,
            category: item.category,
            sku: item.sku,
            taxable: item.taxable,
            created_at: item.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    #[serde(flatten)]
    pub payment: Payment,
    pub client: ClientSummary,
    pub invoice_items: Vec<InvoiceItemResponse>,
}

impl From<CreatedInvoice> for InvoiceResponse {
    fn from(created: CreatedInvoice) -> Self {
        Self {
            payment: created.payment,
            client: created.client,
            invoice_items: created.items.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InvoiceListFlat {
    id: Uuid,
    invoice_number: String,
    amount: Decimal,
    status: String,
    due_date: NaiveDate,
    created_at: DateTime<Utc>,
    client_id: Uuid,
    client_name: String,
    client_company: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InvoiceListClient {
    pub id: Uuid,
    pub name: String,
    pub company: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InvoiceListRow {
    pub id: Uuid,
    pub invoice_number: String,
    pub amount: Decimal,
    pub status: String,
    pub due_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub client: InvoiceListClient,
}

impl From<InvoiceListFlat> for InvoiceListRow {
    fn from(row: InvoiceListFlat) -> Self {
        Self {
            id: row.id,
            invoice_number: row.invoice_number,
            amount: row.amount,
            status: row.status,
            due_date: row.due_date,
            created_at: row.created_at,
            client: InvoiceListClient {
                id: row.client_id,
                name: row.client_name,
                company: row.client_company,
            },
        }
    }
}

pub fn invoice_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_invoices).post(create_invoice))
        .route("/:id", get(get_invoice).delete(delete_invoice))
}

async fn create_invoice(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateInvoiceRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<InvoiceResponse>>)> {
    let created = invoicing::create_invoice(&state.db_pool, payload).await?;
    Ok(ApiResponse::created(
        created.into(),
        "Invoice created successfully",
    ))
}

async fn get_invoice(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<InvoiceResponse>>> {
    let payment = payments::fetch_payment(&state, id)
        .await
        .map_err(|err| match err {
            AppError::NotFound(_) => ApiError::not_found("Invoice"),
            other => other,
        })?;
    let client = payments::fetch_client_summary(&state, payment.client_id).await?;

    let items = sqlx::query_as::<_, InvoiceItem>(&format!(
        "SELECT {} FROM invoice_items WHERE payment_id = $1 ORDER BY created_at, id",
        ITEM_COLUMNS
    ))
    .bind(id)
    .fetch_all(&state.db_pool)
    .await
    .map_err(AppError::from)?;

    Ok(ApiResponse::new(
        InvoiceResponse {
            payment,
            client,
            invoice_items: items.into_iter().map(Into::into).collect(),
        },
        "Invoice retrieved successfully",
    ))
}

async fn list_invoices(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filters): Query<InvoiceFilters>,
) -> ApiResult<Json<ApiResponse<PaginatedResponse<InvoiceListRow>>>> {
    let status_filter = match &filters.status {
        None => None,
        Some(s) => Some(enums::one_of(s, "status", PAYMENT_STATUSES)?),
    };

    let mut qb = QueryBuilder::new();
    if status_filter.is_some() {
        qb.add_condition("p.status = {}");
    }

    let count_sql = format!("SELECT COUNT(*) FROM payments p {}", qb.where_clause());
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(status) = &status_filter {
        count_query = count_query.bind(status);
    }
    let total = count_query
        .fetch_one(&state.db_pool)
        .await
        .map_err(AppError::from)?;

    let sort_field = pagination.validated_sort_field(INVOICE_SORT_FIELDS, "created_at");
    let list_sql = format!(
        "SELECT p.id, p.invoice_number, p.amount, p.status, p.due_date, p.created_at,
                c.id AS client_id, c.name AS client_name, c.company AS client_company
         FROM payments p JOIN clients c ON p.client_id = c.id
         {}
         ORDER BY p.{} {}
         LIMIT ${} OFFSET ${}",
        qb.where_clause(),
        sort_field,
        pagination.sort_direction(),
        qb.param_count() + 1,
        qb.param_count() + 2
    );
    let mut list_query = sqlx::query_as::<_, InvoiceListFlat>(&list_sql);
    if let Some(status) = &status_filter {
        list_query = list_query.bind(status);
    }
    let rows = list_query
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&state.db_pool)
        .await
        .map_err(AppError::from)?;

    let data = PaginatedResponse::new(
        rows.into_iter().map(Into::into).collect(),
        &pagination,
        total,
    );
    Ok(ApiResponse::data(data))
}

async fn delete_invoice(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<()>>> {
    payments::delete_pending(&state, id, "Invoice").await?;
    Ok(ApiResponse::new((), "Invoice deleted successfully"))
}
