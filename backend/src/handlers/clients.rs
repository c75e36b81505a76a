use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult, AppError};
use crate::pagination::{search_pattern, ClientFilters, PaginationMeta, PaginationParams, QueryBuilder};
use crate::response::ApiResponse;
use crate::validation::{email, string, Validator, MAX_ADDRESS_LENGTH};
use crate::AppState;
use quickpay_shared::Client;

#[derive(Debug, Deserialize)]
pub struct ClientCreate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClientUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub address: Option<String>,
    pub is_active: Option<bool>,
}

/// Payment summary embedded in client list rows
#[derive(Debug, Serialize)]
pub struct ClientPaymentSummary {
    pub id: Uuid,
    pub amount: Decimal,
    pub status: String,
}

/// Payment summary embedded in single-client responses
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ClientPaymentDetail {
    pub id: Uuid,
    pub invoice_number: String,
    pub amount: Decimal,
    pub status: String,
    pub due_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ClientWithPayments {
    #[serde(flatten)]
    pub client: Client,
    pub payments: Vec<ClientPaymentSummary>,
}

#[derive(Debug, Serialize)]
pub struct ClientListData {
    pub clients: Vec<ClientWithPayments>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Serialize)]
pub struct ClientDetailData {
    #[serde(flatten)]
    pub client: Client,
    pub payments: Vec<ClientPaymentDetail>,
}

const CLIENT_COLUMNS: &str =
    "id, name, email, phone, company, address, is_active, created_at, updated_at";

pub fn client_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_clients).post(create_client))
        .route(
            "/:id",
            get(get_client).put(update_client).delete(delete_client),
        )
        .route("/:id/stats", get(get_client_stats))
}

async fn list_clients(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filters): Query<ClientFilters>,
) -> ApiResult<Json<ApiResponse<ClientListData>>> {
    let mut qb = QueryBuilder::new();
    if filters.search.is_some() {
        qb.add_condition("(name ILIKE {} OR email ILIKE {} OR company ILIKE {})");
    }

    let count_sql = format!("SELECT COUNT(*) FROM clients {}", qb.where_clause());
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(search) = &filters.search {
        count_query = count_query.bind(search_pattern(search));
    }
    let total = count_query
        .fetch_one(&state.db_pool)
        .await
        .map_err(AppError::from)?;

    let list_sql = format!(
        "SELECT {} FROM clients {} ORDER BY name ASC LIMIT ${} OFFSET ${}",
        CLIENT_COLUMNS,
        qb.where_clause(),
        qb.param_count() + 1,
        qb.param_count() + 2
    );
    let mut list_query = sqlx::query_as::<_, Client>(&list_sql);
    if let Some(search) = &filters.search {
        list_query = list_query.bind(search_pattern(search));
    }
    let clients = list_query
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&state.db_pool)
        .await
        .map_err(AppError::from)?;

    let client_ids: Vec<Uuid> = clients.iter().map(|c| c.id).collect();
    let payment_rows: Vec<(Uuid, Uuid, Decimal, String)> = sqlx::query_as(
        "SELECT client_id, id, amount, status FROM payments WHERE client_id = ANY($1)",
    )
    .bind(&client_ids)
    .fetch_all(&state.db_pool)
    .await
    .map_err(AppError::from)?;

    let mut payments_by_client: HashMap<Uuid, Vec<ClientPaymentSummary>> = HashMap::new();
    for (client_id, id, amount, status) in payment_rows {
        payments_by_client
            .entry(client_id)
            .or_default()
            .push(ClientPaymentSummary { id, amount, status });
    }

    let count = clients.len();
    let clients = clients
        .into_iter()
        .map(|client| {
            let payments = payments_by_client.remove(&client.id).unwrap_or_default();
            ClientWithPayments { client, payments }
        })
        .collect();

    let data = ClientListData {
        clients,
        pagination: PaginationMeta::new(pagination.page.max(1), pagination.limit(), total),
    };
    let message = format!(
        "Retrieved {} client{}",
        count,
        if count == 1 { "" } else { "s" }
    );
    Ok(ApiResponse::new(data, message))
}

async fn create_client(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ClientCreate>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Client>>)> {
    Validator::new()
        .required_string(&payload.name, "name")
        .email(&payload.email, "email")
        .max_length(&payload.address, "address", MAX_ADDRESS_LENGTH)
        .finish()?;

    let name = string::required(&payload.name, "name")?;
    let email = email::validate(payload.email.as_deref().unwrap_or_default(), "email")?;
    let address = string::max_length(&payload.address, "address", MAX_ADDRESS_LENGTH)?;

    let client = sqlx::query_as::<_, Client>(&format!(
        "INSERT INTO clients (id, name, email, phone, company, address, is_active, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, TRUE, NOW())
         RETURNING {}",
        CLIENT_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(email)
    .bind(payload.phone.map(|p| p.trim().to_string()))
    .bind(payload.company.map(|c| c.trim().to_string()))
    .bind(address)
    .fetch_one(&state.db_pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            ApiError::conflict("A client with this email already exists")
        }
        _ => AppError::from(e),
    })?;

    Ok(ApiResponse::created(client, "Client created successfully"))
}

async fn get_client(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<ClientDetailData>>> {
    let client = fetch_client(&state, id).await?;

    let payments = sqlx::query_as::<_, ClientPaymentDetail>(
        "SELECT id, invoice_number, amount, status, due_date, created_at
         FROM payments WHERE client_id = $1 ORDER BY created_at DESC",
    )
    .bind(id)
    .fetch_all(&state.db_pool)
    .await
    .map_err(AppError::from)?;

    Ok(ApiResponse::new(
        ClientDetailData { client, payments },
        "Client retrieved successfully",
    ))
}

async fn update_client(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ClientUpdate>,
) -> ApiResult<Json<ApiResponse<Client>>> {
    Validator::new()
        .required_string(&payload.name, "name")
        .email(&payload.email, "email")
        .max_length(&payload.address, "address", MAX_ADDRESS_LENGTH)
        .finish()?;

    let name = string::required(&payload.name, "name")?;
    let email = email::validate(payload.email.as_deref().unwrap_or_default(), "email")?;
    let address = string::max_length(&payload.address, "address", MAX_ADDRESS_LENGTH)?;

    let client = sqlx::query_as::<_, Client>(&format!(
        "UPDATE clients SET
         name = $2,
         email = $3,
         phone = $4,
         company = $5,
         address = $6,
         is_active = COALESCE($7, is_active),
         updated_at = NOW()
         WHERE id = $1
         RETURNING {}",
        CLIENT_COLUMNS
    ))
    .bind(id)
    .bind(name)
    .bind(email)
    .bind(payload.phone.map(|p| p.trim().to_string()))
    .bind(payload.company.map(|c| c.trim().to_string()))
    .bind(address)
    .bind(payload.is_active)
    .fetch_optional(&state.db_pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            ApiError::conflict("Another client with this email already exists")
        }
        _ => AppError::from(e),
    })?
    .ok_or_else(|| ApiError::not_found("Client"))?;

    Ok(ApiResponse::new(client, "Client updated successfully"))
}

async fn delete_client(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let has_payments: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM payments WHERE client_id = $1)")
            .bind(id)
            .fetch_one(&state.db_pool)
            .await
            .map_err(AppError::from)?;

    if has_payments {
        return Err(ApiError::conflict(
            "Client has existing invoices/payments and cannot be deleted",
        ));
    }

    let result = sqlx::query("DELETE FROM clients WHERE id = $1")
        .bind(id)
        .execute(&state.db_pool)
        .await
        .map_err(|e| match &e {
            // The restrict FK is the backstop if a payment lands between the
            // existence check and the delete.
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23503") => {
                ApiError::conflict("Client has existing invoices/payments and cannot be deleted")
            }
            _ => AppError::from(e),
        })?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Client"));
    }

    Ok(ApiResponse::new((), "Client deleted successfully"))
}

#[derive(Debug, sqlx::FromRow)]
struct ClientStatsRow {
    total_invoices: i64,
    total_amount: Decimal,
    paid_amount: Decimal,
    pending_amount: Decimal,
    overdue_amount: Decimal,
    completed_count: i64,
    pending_count: i64,
    processing_count: i64,
    failed_count: i64,
    cancelled_count: i64,
}

#[derive(Debug, Serialize)]
pub struct StatsClient {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub company: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusCounts {
    pub completed: i64,
    pub pending: i64,
    pub processing: i64,
    pub failed: i64,
    pub cancelled: i64,
}

#[derive(Debug, Serialize)]
pub struct ClientStatistics {
    pub total_invoices: i64,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub pending_amount: Decimal,
    pub overdue_amount: Decimal,
    pub status_counts: StatusCounts,
    pub payment_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct ClientStatsData {
    pub client: StatsClient,
    pub statistics: ClientStatistics,
}

async fn get_client_stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<ClientStatsData>>> {
    let client = fetch_client(&state, id).await?;

    let stats = sqlx::query_as::<_, ClientStatsRow>(
        "SELECT
            COUNT(*) AS total_invoices,
            COALESCE(SUM(amount), 0) AS total_amount,
            COALESCE(SUM(amount) FILTER (WHERE status = 'completed'), 0) AS paid_amount,
            COALESCE(SUM(amount) FILTER (WHERE status = 'pending'), 0) AS pending_amount,
            COALESCE(SUM(amount) FILTER (WHERE status = 'pending' AND due_date < CURRENT_DATE), 0) AS overdue_amount,
            COUNT(*) FILTER (WHERE status = 'completed') AS completed_count,
            COUNT(*) FILTER (WHERE status = 'pending') AS pending_count,
            COUNT(*) FILTER (WHERE status = 'processing') AS processing_count,
            COUNT(*) FILTER (WHERE status = 'failed') AS failed_count,
            COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled_count
         FROM payments WHERE client_id = $1",
    )
    .bind(id)
    .fetch_one(&state.db_pool)
    .await
    .map_err(AppError::from)?;

    let payment_rate = if stats.total_invoices > 0 {
        (stats.completed_count as f64 / stats.total_invoices as f64) * 100.0
    } else {
        0.0
    };

    let data = ClientStatsData {
        client: StatsClient {
            id: client.id,
            name: client.name,
            email: client.email,
            company: client.company,
        },
        statistics: ClientStatistics {
            total_invoices: stats.total_invoices,
            total_amount: stats.total_amount,
            paid_amount: stats.paid_amount,
            pending_amount: stats.pending_amount,
            overdue_amount: stats.overdue_amount,
            status_counts: StatusCounts {
                completed: stats.completed_count,
                pending: stats.pending_count,
                processing: stats.processing_count,
                failed: stats.failed_count,
                cancelled: stats.cancelled_count,
            },
            payment_rate,
        },
    };

    Ok(ApiResponse::new(
        data,
        "Client statistics retrieved successfully",
    ))
}

async fn fetch_client(state: &AppState, id: Uuid) -> ApiResult<Client> {
    sqlx::query_as::<_, Client>(&format!(
        "SELECT {} FROM clients WHERE id = $1",
        CLIENT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&state.db_pool)
    .await
    .map_err(AppError::from)?
    .ok_or_else(|| ApiError::not_found("Client"))
}
