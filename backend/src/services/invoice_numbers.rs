//! Invoice number generation.
//!
//! Sequence-based strategy: `INV-` followed by a zero-padded running count.
//! Candidates are derived from the highest existing number inside the
//! creation transaction; the unique index on `payments.invoice_number` is the
//! actual uniqueness guarantee, and the creation workflow retries with a
//! fresh candidate when two concurrent transactions pick the same one.

use sqlx::{Postgres, Transaction};

/// Unique constraint backing invoice number allocation.
const INVOICE_NUMBER_CONSTRAINT: &str = "payments_invoice_number_key";

pub fn format_invoice_number(sequence: i32) -> String {
    format!("INV-{:06}", sequence)
}

/// Compute the next candidate number from what is currently visible to the
/// transaction. Not unique on its own under concurrency; see module docs.
pub async fn next_candidate(tx: &mut Transaction<'_, Postgres>) -> Result<String, sqlx::Error> {
    let next: i32 = sqlx::query_scalar(
        r"SELECT COALESCE(MAX(CAST(SUBSTRING(invoice_number FROM '^INV-(\d+)$') AS INTEGER)), 0) + 1
          FROM payments WHERE invoice_number ~ '^INV-\d+$'",
    )
    .fetch_one(&mut **tx)
    .await?;

    Ok(format_invoice_number(next))
}

/// True when the error is a unique violation on the invoice number index,
/// i.e. another transaction won the race for this candidate.
pub fn is_number_conflict(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some("23505")
                && db.constraint() == Some(INVOICE_NUMBER_CONSTRAINT)
        }
        _ => false,
    }
}
