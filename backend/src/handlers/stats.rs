use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult, AppError};
use crate::response::ApiResponse;
use crate::services::totals::round_money;
use crate::validation::{enums, PAYMENT_STATUSES};
use crate::AppState;

pub fn stats_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_summary_stats))
        .route("/dashboard", get(get_dashboard_stats))
        .route("/payments", get(get_payment_stats))
        .route("/clients", get(get_client_stats))
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentAggregates {
    total_revenue: Decimal,
    pending_amount: Decimal,
    overdue_amount: Decimal,
    recent_revenue: Decimal,
    total_amount: Decimal,
    total_payments: i64,
    completed_count: i64,
    pending_count: i64,
    processing_count: i64,
    failed_count: i64,
    cancelled_count: i64,
    overdue_count: i64,
    recent_count: i64,
}

const PAYMENT_AGGREGATES_SQL: &str = "SELECT
    COALESCE(SUM(amount) FILTER (WHERE status = 'completed'), 0) AS total_revenue,
    COALESCE(SUM(amount) FILTER (WHERE status = 'pending'), 0) AS pending_amount,
    COALESCE(SUM(amount) FILTER (WHERE status = 'pending' AND due_date < CURRENT_DATE), 0) AS overdue_amount,
    COALESCE(SUM(amount) FILTER (WHERE status = 'completed' AND created_at >= NOW() - INTERVAL '30 days'), 0) AS recent_revenue,
    COALESCE(SUM(amount), 0) AS total_amount,
    COUNT(*) AS total_payments,
    COUNT(*) FILTER (WHERE status = 'completed') AS completed_count,
    COUNT(*) FILTER (WHERE status = 'pending') AS pending_count,
    COUNT(*) FILTER (WHERE status = 'processing') AS processing_count,
    COUNT(*) FILTER (WHERE status = 'failed') AS failed_count,
    COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled_count,
    COUNT(*) FILTER (WHERE status = 'pending' AND due_date < CURRENT_DATE) AS overdue_count,
    COUNT(*) FILTER (WHERE created_at >= NOW() - INTERVAL '30 days') AS recent_count
 FROM payments";

async fn fetch_payment_aggregates(state: &AppState) -> ApiResult<PaymentAggregates> {
    sqlx::query_as::<_, PaymentAggregates>(PAYMENT_AGGREGATES_SQL)
        .fetch_one(&state.db_pool)
        .await
        .map_err(AppError::from)
}

async fn count_clients(state: &AppState) -> ApiResult<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM clients")
        .fetch_one(&state.db_pool)
        .await
        .map_err(AppError::from)
}

#[derive(Debug, Serialize)]
pub struct SummaryStats {
    pub total: Decimal,
    pub paid: Decimal,
    pub pending: Decimal,
    pub overdue: Decimal,
    pub total_payments: i64,
    pub completed_payments: i64,
    pub pending_payments_count: i64,
    pub overdue_payments_count: i64,
    pub total_clients: i64,
    pub recent_payments_count: i64,
}

async fn get_summary_stats(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ApiResponse<SummaryStats>>> {
    let aggregates = fetch_payment_aggregates(&state).await?;
    let total_clients = count_clients(&state).await?;

    let stats = SummaryStats {
        total: aggregates.total_revenue,
        paid: aggregates.total_revenue,
        pending: aggregates.pending_amount,
        overdue: aggregates.overdue_amount,
        total_payments: aggregates.total_payments,
        completed_payments: aggregates.completed_count,
        pending_payments_count: aggregates.pending_count,
        overdue_payments_count: aggregates.overdue_count,
        total_clients,
        recent_payments_count: aggregates.recent_count,
    };

    Ok(ApiResponse::data(stats))
}

#[derive(Debug, Serialize)]
pub struct DashboardOverview {
    pub total_revenue: Decimal,
    pub pending_amount: Decimal,
    pub overdue_amount: Decimal,
    pub total_invoices: i64,
    pub total_clients: i64,
    /// Completed revenue over the last 30 days
    pub recent_revenue: Decimal,
    pub pending_invoices: i64,
    pub overdue_invoices: i64,
}

#[derive(Debug, Serialize)]
pub struct StatusDistribution {
    pub completed: i64,
    pub pending: i64,
    pub processing: i64,
    pub failed: i64,
    pub cancelled: i64,
    pub overdue: i64,
}

#[derive(Debug, Serialize)]
pub struct MonthlyRevenue {
    /// e.g. "Jan 2025"
    pub month: String,
    pub revenue: Decimal,
    pub payments: i64,
}

#[derive(Debug, Serialize)]
pub struct PerformanceStats {
    pub collection_rate: f64,
    pub average_invoice_value: Decimal,
    pub on_time_payment_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub overview: DashboardOverview,
    pub status_distribution: StatusDistribution,
    pub monthly_trend: Vec<MonthlyRevenue>,
    pub performance: PerformanceStats,
}

async fn get_dashboard_stats(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ApiResponse<DashboardStats>>> {
    let aggregates = fetch_payment_aggregates(&state).await?;
    let total_clients = count_clients(&state).await?;

    // Completed revenue per calendar month, last six months
    let trend_rows: Vec<(DateTime<Utc>, Decimal, i64)> = sqlx::query_as(
        "SELECT date_trunc('month', created_at) AS month,
                COALESCE(SUM(amount) FILTER (WHERE status = 'completed'), 0) AS revenue,
                COUNT(*) FILTER (WHERE status = 'completed') AS payments
         FROM payments
         WHERE created_at >= date_trunc('month', NOW()) - INTERVAL '5 months'
         GROUP BY 1",
    )
    .fetch_all(&state.db_pool)
    .await
    .map_err(AppError::from)?;

    let by_month: HashMap<(i32, u32), (Decimal, i64)> = trend_rows
        .into_iter()
        .map(|(month, revenue, payments)| ((month.year(), month.month()), (revenue, payments)))
        .collect();

    let today = Utc::now().date_naive();
    let mut monthly_trend = Vec::with_capacity(6);
    for offset in (0..6).rev() {
        let total_months = today.year() * 12 + today.month0() as i32 - offset;
        let year = total_months.div_euclid(12);
        let month = total_months.rem_euclid(12) as u32 + 1;
        if let Some(label_date) = NaiveDate::from_ymd_opt(year, month, 1) {
            let (revenue, payments) = by_month
                .get(&(year, month))
                .copied()
                .unwrap_or((Decimal::ZERO, 0));
            monthly_trend.push(MonthlyRevenue {
                month: label_date.format("%b %Y").to_string(),
                revenue,
                payments,
            });
        }
    }

    let collection_rate = if aggregates.total_payments > 0 {
        (aggregates.completed_count as f64 / aggregates.total_payments as f64) * 100.0
    } else {
        0.0
    };
    let average_invoice_value = if aggregates.total_payments > 0 {
        round_money(aggregates.total_amount / Decimal::from(aggregates.total_payments))
    } else {
        Decimal::ZERO
    };

    let stats = DashboardStats {
        overview: DashboardOverview {
            total_revenue: aggregates.total_revenue,
            pending_amount: aggregates.pending_amount,
            overdue_amount: aggregates.overdue_amount,
            total_invoices: aggregates.total_payments,
            total_clients,
            recent_revenue: aggregates.recent_revenue,
            pending_invoices: aggregates.pending_count,
            overdue_invoices: aggregates.overdue_count,
        },
        status_distribution: StatusDistribution {
            completed: aggregates.completed_count,
            pending: aggregates.pending_count,
            processing: aggregates.processing_count,
            failed: aggregates.failed_count,
            cancelled: aggregates.cancelled_count,
            overdue: aggregates.overdue_count,
        },
        monthly_trend,
        performance: PerformanceStats {
            collection_rate,
            average_invoice_value,
            on_time_payment_rate: collection_rate,
        },
    };

    Ok(ApiResponse::new(
        stats,
        "Dashboard statistics retrieved successfully",
    ))
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatsQuery {
    pub period: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct PeriodSummary {
    pub total_payments: i64,
    pub total_amount: Decimal,
    pub average_amount: Decimal,
    pub status_counts: HashMap<String, i64>,
}

#[derive(Debug, Serialize)]
pub struct DailyStat {
    pub date: NaiveDate,
    pub count: i64,
    pub amount: Decimal,
    pub statuses: HashMap<String, i64>,
}

#[derive(Debug, Serialize)]
pub struct TopClient {
    pub name: String,
    pub amount: Decimal,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct PaymentStats {
    pub period: String,
    pub date_range: DateRange,
    pub summary: PeriodSummary,
    pub daily_breakdown: Vec<DailyStat>,
    pub top_clients: Vec<TopClient>,
}

async fn get_payment_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaymentStatsQuery>,
) -> ApiResult<Json<ApiResponse<PaymentStats>>> {
    let period = params.period.unwrap_or_else(|| "30d".to_string());
    let days = match period.as_str() {
        "7d" => 7,
        "30d" => 30,
        "90d" => 90,
        "1y" => 365,
        _ => {
            return Err(ApiError::validation_single(
                "period",
                "Period must be one of: 7d, 30d, 90d, 1y",
            ))
        }
    };

    let status_filter = match &params.status {
        None => None,
        Some(s) => Some(enums::one_of(s, "status", PAYMENT_STATUSES)?),
    };

    let end = Utc::now();
    let start = end - Duration::days(days);
    let status_condition = if status_filter.is_some() {
        " AND p.status = $2"
    } else {
        ""
    };

    let summary_sql = format!(
        "SELECT COUNT(*), COALESCE(SUM(p.amount), 0), COALESCE(AVG(p.amount), 0)
         FROM payments p WHERE p.created_at >= $1{}",
        status_condition
    );
    let mut summary_query =
        sqlx::query_as::<_, (i64, Decimal, Decimal)>(&summary_sql).bind(start);
    if let Some(status) = &status_filter {
        summary_query = summary_query.bind(status);
    }
    let (total_payments, total_amount, average_amount) = summary_query
        .fetch_one(&state.db_pool)
        .await
        .map_err(AppError::from)?;

    let daily_sql = format!(
        "SELECT p.created_at::date AS day, p.status, COUNT(*), COALESCE(SUM(p.amount), 0)
         FROM payments p WHERE p.created_at >= $1{}
         GROUP BY 1, 2",
        status_condition
    );
    let mut daily_query =
        sqlx::query_as::<_, (NaiveDate, String, i64, Decimal)>(&daily_sql).bind(start);
    if let Some(status) = &status_filter {
        daily_query = daily_query.bind(status);
    }
    let daily_rows = daily_query
        .fetch_all(&state.db_pool)
        .await
        .map_err(AppError::from)?;

    let mut status_counts: HashMap<String, i64> = PAYMENT_STATUSES
        .iter()
        .map(|s| (s.to_string(), 0))
        .collect();
    let mut daily: BTreeMap<NaiveDate, DailyStat> = BTreeMap::new();
    for (day, status, count, amount) in daily_rows {
        if let Some(total) = status_counts.get_mut(&status) {
            *total += count;
        }
        let entry = daily.entry(day).or_insert_with(|| DailyStat {
            date: day,
            count: 0,
            amount: Decimal::ZERO,
            statuses: HashMap::new(),
        });
        entry.count += count;
        entry.amount += amount;
        entry.statuses.insert(status, count);
    }

    let top_sql = format!(
        "SELECT c.name, COALESCE(SUM(p.amount), 0) AS amount, COUNT(*)
         FROM payments p JOIN clients c ON p.client_id = c.id
         WHERE p.created_at >= $1{}
         GROUP BY c.name ORDER BY amount DESC LIMIT 5",
        status_condition
    );
    let mut top_query = sqlx::query_as::<_, (String, Decimal, i64)>(&top_sql).bind(start);
    if let Some(status) = &status_filter {
        top_query = top_query.bind(status);
    }
    let top_clients = top_query
        .fetch_all(&state.db_pool)
        .await
        .map_err(AppError::from)?
        .into_iter()
        .map(|(name, amount, count)| TopClient {
            name,
            amount,
            count,
        })
        .collect();

    let stats = PaymentStats {
        period,
        date_range: DateRange { start, end },
        summary: PeriodSummary {
            total_payments,
            total_amount,
            average_amount: round_money(average_amount),
            status_counts,
        },
        daily_breakdown: daily.into_values().collect(),
        top_clients,
    };

    Ok(ApiResponse::new(
        stats,
        "Payment statistics retrieved successfully",
    ))
}

#[derive(Debug, sqlx::FromRow)]
struct ClientMetricsRow {
    id: Uuid,
    name: String,
    email: String,
    company: Option<String>,
    created_at: DateTime<Utc>,
    total_invoices: i64,
    total_amount: Decimal,
    paid_amount: Decimal,
    pending_amount: Decimal,
    completed_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ClientMetrics {
    pub total_invoices: i64,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub pending_amount: Decimal,
    pub payment_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct ClientStatsEntry {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub created_at: DateTime<Utc>,
    pub metrics: ClientMetrics,
}

#[derive(Debug, Serialize)]
pub struct ClientStatsSummary {
    pub total_clients: i64,
    pub active_clients: i64,
    pub total_revenue: Decimal,
    pub average_client_value: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ClientStats {
    pub summary: ClientStatsSummary,
    pub clients: Vec<ClientStatsEntry>,
}

async fn get_client_stats(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ApiResponse<ClientStats>>> {
    let rows = sqlx::query_as::<_, ClientMetricsRow>(
        "SELECT c.id, c.name, c.email, c.company, c.created_at,
                COUNT(p.id) AS total_invoices,
                COALESCE(SUM(p.amount), 0) AS total_amount,
                COALESCE(SUM(p.amount) FILTER (WHERE p.status = 'completed'), 0) AS paid_amount,
                COALESCE(SUM(p.amount) FILTER (WHERE p.status = 'pending'), 0) AS pending_amount,
                COUNT(p.id) FILTER (WHERE p.status = 'completed') AS completed_count
         FROM clients c
         LEFT JOIN payments p ON p.client_id = c.id
         GROUP BY c.id
         ORDER BY total_amount DESC",
    )
    .fetch_all(&state.db_pool)
    .await
    .map_err(AppError::from)?;

    let total_clients = rows.len() as i64;
    let active_clients = rows.iter().filter(|r| r.total_invoices > 0).count() as i64;
    let total_revenue: Decimal = rows.iter().map(|r| r.paid_amount).sum();
    let combined_amount: Decimal = rows.iter().map(|r| r.total_amount).sum();
    let average_client_value = if total_clients > 0 {
        round_money(combined_amount / Decimal::from(total_clients))
    } else {
        Decimal::ZERO
    };

    let clients = rows
        .into_iter()
        .map(|row| {
            let payment_rate = if row.total_invoices > 0 {
                (row.completed_count as f64 / row.total_invoices as f64) * 100.0
            } else {
                0.0
            };
            ClientStatsEntry {
                id: row.id,
                name: row.name,
                email: row.email,
                company: row.company,
                created_at: row.created_at,
                metrics: ClientMetrics {
                    total_invoices: row.total_invoices,
                    total_amount: row.total_amount,
                    paid_amount: row.paid_amount,
                    pending_amount: row.pending_amount,
                    payment_rate,
                },
            }
        })
        .collect();

    let stats = ClientStats {
        summary: ClientStatsSummary {
            total_clients,
            active_clients,
            total_revenue,
            average_client_value,
        },
        clients,
    };

    Ok(ApiResponse::new(
        stats,
        "Client statistics retrieved successfully",
    ))
}
