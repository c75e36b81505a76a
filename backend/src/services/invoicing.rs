//! Invoice creation workflow.
//!
//! The single entry point that turns a create-invoice request into a durable
//! payment header plus its line items, or fails with nothing persisted.
//! Validation runs before any write; the header and all items are written in
//! one transaction; invoice-number races are resolved by retrying with a
//! fresh candidate against the unique index.

use chrono::NaiveDate;
use quickpay_shared::{ClientSummary, InvoiceItem, Payment};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult, AppError};
use crate::services::invoice_numbers;
use crate::services::totals::{self, InvoiceTotals};
use crate::validation::{Validator, MAX_NOTES_LENGTH};

/// Attempts at allocating an invoice number before giving up with a conflict.
const INVOICE_NUMBER_ATTEMPTS: u32 = 5;

/// Raw create-invoice payload. Fields are optional so validation can report
/// every missing or invalid field in a single response.
#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub client_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub items: Vec<InvoiceItemRequest>,
    /// Percent, 0..=100. Stored as a fraction.
    pub tax_rate: Option<Decimal>,
    /// Flat amount applied before tax.
    pub discount: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InvoiceItemRequest {
    pub description: Option<String>,
    pub quantity: Option<Decimal>,
    pub rate: Option<Decimal>,
    pub category: Option<String>,
    pub sku: Option<String>,
    pub taxable: Option<bool>,
}

/// A request that passed aggregate validation.
#[derive(Debug, Clone)]
pub struct ValidatedInvoice {
    pub client_id: Uuid,
    pub due_date: NaiveDate,
    pub items: Vec<ValidatedItem>,
    pub tax_rate_percent: Decimal,
    pub discount: Decimal,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ValidatedItem {
    pub description: String,
    pub quantity: Decimal,
    pub rate: Decimal,
    pub category: Option<String>,
    pub sku: Option<String>,
    pub taxable: bool,
}

/// The fully persisted result returned to the API layer.
#[derive(Debug, Clone)]
pub struct CreatedInvoice {
    pub payment: Payment,
    pub client: ClientSummary,
    pub items: Vec<InvoiceItem>,
}

pub(crate) const PAYMENT_COLUMNS: &str =
    "id, invoice_number, client_id, amount, subtotal, tax_amount, discount_amount, \
     tax_rate, currency, status, due_date, description, notes, payment_method, \
     transaction_id, paid_at, created_at, updated_at";

pub(crate) const ITEM_COLUMNS: &str =
    "id, payment_id, description, quantity, unit_price, total_price, category, sku, \
     taxable, created_at";

/// Validate the raw payload, reporting every violation at once.
pub fn validate_request(payload: CreateInvoiceRequest) -> ApiResult<ValidatedInvoice> {
    let mut v = Validator::new();

    if payload.client_id.is_none() {
        v = v.error("client_id", "client_id is required");
    }
    if payload.due_date.is_none() {
        v = v.error("due_date", "due_date is required");
    }
    if payload.items.is_empty() {
        v = v.error("items", "At least one invoice item is required");
    }

    for (i, item) in payload.items.iter().enumerate() {
        match &item.description {
            Some(d) if !d.trim().is_empty() => {}
            Some(_) => {
                v = v.error(
                    &format!("items[{}].description", i),
                    "Item description cannot be empty",
                )
            }
            None => {
                v = v.error(
                    &format!("items[{}].description", i),
                    "Item description is required",
                )
            }
        }
        match item.quantity {
            Some(q) if q > Decimal::ZERO => {}
            Some(_) => {
                v = v.error(
                    &format!("items[{}].quantity", i),
                    "Quantity must be greater than 0",
                )
            }
            None => v = v.error(&format!("items[{}].quantity", i), "Quantity is required"),
        }
        match item.rate {
            Some(r) if r > Decimal::ZERO => {}
            Some(_) => {
                v = v.error(
                    &format!("items[{}].rate", i),
                    "Rate must be greater than 0",
                )
            }
            None => v = v.error(&format!("items[{}].rate", i), "Rate is required"),
        }
    }

    let tax_rate_percent = payload.tax_rate.unwrap_or(Decimal::ZERO);
    v = v.error_if(
        tax_rate_percent < Decimal::ZERO || tax_rate_percent > Decimal::from(100),
        "tax_rate",
        "Tax rate must be between 0 and 100",
    );

    let discount = payload.discount.unwrap_or(Decimal::ZERO);
    v = v.error_if(
        discount.is_sign_negative(),
        "discount",
        "Discount must be 0 or greater",
    );

    v = v.max_length(&payload.notes, "notes", MAX_NOTES_LENGTH);

    v.finish()?;

    let (Some(client_id), Some(due_date)) = (payload.client_id, payload.due_date) else {
        return Err(ApiError::internal(
            "Invoice request passed validation with missing fields",
        ));
    };

    let items = payload
        .items
        .into_iter()
        .filter_map(|item| match (item.description, item.quantity, item.rate) {
            (Some(description), Some(quantity), Some(rate)) => Some(ValidatedItem {
                description: description.trim().to_string(),
                quantity,
                rate,
                category: item.category,
                sku: item.sku,
                taxable: item.taxable.unwrap_or(true),
            }),
            _ => None,
        })
        .collect();

    Ok(ValidatedInvoice {
        client_id,
        due_date,
        items,
        tax_rate_percent,
        discount,
        notes: payload.notes.map(|n| n.trim().to_string()),
    })
}

/// Create an invoice: validate, verify the client, derive totals, then write
/// header and items atomically under a freshly allocated invoice number.
pub async fn create_invoice(
    pool: &PgPool,
    payload: CreateInvoiceRequest,
) -> ApiResult<CreatedInvoice> {
    let request = validate_request(payload)?;

    let client = sqlx::query_as::<_, ClientSummary>(
        "SELECT id, name, email, phone, company, address FROM clients WHERE id = $1",
    )
    .bind(request.client_id)
    .fetch_optional(pool)
    .await
    .map_err(AppError::from)?
    .ok_or_else(|| AppError::NotFound("Client".to_string()))?;

    let totals = totals::calculate(&request.items, request.tax_rate_percent, request.discount)?;

    for attempt in 1..=INVOICE_NUMBER_ATTEMPTS {
        let mut tx = pool.begin().await.map_err(AppError::from)?;
        let invoice_number = invoice_numbers::next_candidate(&mut tx)
            .await
            .map_err(AppError::from)?;
        let payment_id = Uuid::new_v4();

        match insert_invoice(&mut tx, payment_id, &invoice_number, &request, &totals).await {
            Ok(()) => match tx.commit().await {
                Ok(()) => {
                    tracing::info!(
                        invoice_number = %invoice_number,
                        client_id = %request.client_id,
                        total = %totals.total,
                        "Invoice created"
                    );
                    return load_created(pool, payment_id, client.clone()).await;
                }
                Err(err) if invoice_numbers::is_number_conflict(&err) => {
                    tracing::warn!(
                        invoice_number = %invoice_number,
                        attempt,
                        "Invoice number taken at commit, retrying"
                    );
                    continue;
                }
                Err(err) => return Err(err.into()),
            },
            Err(err) if invoice_numbers::is_number_conflict(&err) => {
                // Lost the race for this candidate; roll back and pick again.
                let _ = tx.rollback().await;
                tracing::warn!(
                    invoice_number = %invoice_number,
                    attempt,
                    "Invoice number taken, retrying"
                );
                continue;
            }
            Err(err) => {
                let mapped = AppError::from(err);
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(
                        invoice_number = %invoice_number,
                        error = %rollback_err,
                        "Rollback failed after partial invoice write"
                    );
                    return Err(AppError::PartialFailure(format!(
                        "Invoice {} header may persist without its items",
                        invoice_number
                    )));
                }
                return Err(mapped);
            }
        }
    }

    Err(AppError::Conflict(
        "Unable to allocate a unique invoice number".to_string(),
    ))
}

/// Write the header and all item rows. Item insertion is strictly ordered
/// after the header insert (items carry the header's foreign key); the caller
/// owns commit/rollback.
pub(crate) async fn insert_invoice(
    tx: &mut Transaction<'_, Postgres>,
    payment_id: Uuid,
    invoice_number: &str,
    request: &ValidatedInvoice,
    totals: &InvoiceTotals,
) -> Result<(), sqlx::Error> {
    let tax_rate_fraction = request.tax_rate_percent / Decimal::from(100);

    sqlx::query(
        "INSERT INTO payments (
            id, invoice_number, client_id, amount, subtotal, tax_amount,
            discount_amount, tax_rate, currency, status, due_date, notes, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'USD', 'pending', $9, $10, NOW())",
    )
    .bind(payment_id)
    .bind(invoice_number)
    .bind(request.client_id)
    .bind(totals.total)
    .bind(totals.subtotal)
    .bind(totals.tax_amount)
    .bind(totals.discount_amount)
    .bind(tax_rate_fraction)
    .bind(request.due_date)
    .bind(request.notes.as_deref())
    .execute(&mut **tx)
    .await?;

    for (item, line_total) in request.items.iter().zip(totals.line_totals.iter()) {
        sqlx::query(
            "INSERT INTO invoice_items (
                id, payment_id, description, quantity, unit_price, total_price,
                category, sku, taxable, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())",
        )
        .bind(Uuid::new_v4())
        .bind(payment_id)
        .bind(&item.description)
        .bind(item.quantity)
        .bind(item.rate)
        .bind(*line_total)
        .bind(item.category.as_deref())
        .bind(item.sku.as_deref())
        .bind(item.taxable)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

/// Re-read the committed rows so the response reflects exactly what was
/// stored, not what was computed in memory.
async fn load_created(
    pool: &PgPool,
    payment_id: Uuid,
    client: ClientSummary,
) -> ApiResult<CreatedInvoice> {
    let payment = sqlx::query_as::<_, Payment>(&format!(
        "SELECT {} FROM payments WHERE id = $1",
        PAYMENT_COLUMNS
    ))
    .bind(payment_id)
    .fetch_one(pool)
    .await
    .map_err(AppError::from)?;

    let items = sqlx::query_as::<_, InvoiceItem>(&format!(
        "SELECT {} FROM invoice_items WHERE payment_id = $1 ORDER BY created_at, id",
        ITEM_COLUMNS
    ))
    .bind(payment_id)
    .fetch_all(pool)
    .await
    .map_err(AppError::from)?;

    Ok(CreatedInvoice {
        payment,
        client,
        items,
    })
}
