pub mod invoice_numbers;
pub mod invoicing;
pub mod totals;
