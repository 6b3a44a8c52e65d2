//! CSV format handling for operation records and payment output
//!
//! This module centralizes all CSV format concerns, providing:
//! - CsvRecord structure for deserialization
//! - Conversion from CSV records to domain types
//! - Payment output serialization
//!
//! All functions are pure (no I/O) for easy testing.

use crate::types::{AccountId, OperationRecord, OperationType, Payment, PaymentId};
use serde::Deserialize;
use std::io::Write;

/// CSV record structure for deserialization
///
/// Matches the input CSV format with columns:
/// `op, id, payer, base, extra, sponsor, subsidy_limit, amount, source`.
/// Every field except `op` is optional because each operation uses its own
/// subset; `convert_csv_record` validates presence per operation.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct CsvRecord {
    pub op: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub payer: Option<String>,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub extra: Option<String>,
    #[serde(default)]
    pub sponsor: Option<String>,
    #[serde(default)]
    pub subsidy_limit: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Convert a CsvRecord to an OperationRecord
///
/// This function:
/// - Parses the operation string into an OperationType enum
/// - Parses identifiers and addresses from their hex text form
/// - Parses amounts as unsigned token units
/// - Validates field presence per operation (`make` needs an id and payer,
///   `refund`/`confirm`/`fund` need an amount, `merge` needs a source, ...)
///
/// # Arguments
///
/// * `csv_record` - The deserialized CSV record
///
/// # Returns
///
/// Result containing either:
/// - Ok(OperationRecord) - Successfully converted record
/// - Err(String) - Error message describing the conversion failure
pub fn convert_csv_record(csv_record: CsvRecord) -> Result<OperationRecord, String> {
    let op = match csv_record.op.to_lowercase().as_str() {
        "fund" => OperationType::Fund,
        "make" => OperationType::Make,
        "update" => OperationType::Update,
        "refund" => OperationType::Refund,
        "confirm" => OperationType::Confirm,
        "revoke" => OperationType::Revoke,
        "reverse" => OperationType::Reverse,
        "merge" => OperationType::Merge,
        _ => return Err(format!("Invalid operation: '{}'", csv_record.op)),
    };
    let op_name = csv_record.op.to_lowercase();

    let id = parse_field::<PaymentId>(&csv_record.id, "id", &op_name)?;
    let payer = parse_field::<AccountId>(&csv_record.payer, "payer", &op_name)?;
    let base = parse_amount(&csv_record.base, "base", &op_name)?;
    let extra = parse_amount(&csv_record.extra, "extra", &op_name)?;
    let sponsor = parse_field::<AccountId>(&csv_record.sponsor, "sponsor", &op_name)?;
    let subsidy_limit = parse_amount(&csv_record.subsidy_limit, "subsidy_limit", &op_name)?;
    let amount = parse_amount(&csv_record.amount, "amount", &op_name)?;
    let source = parse_field::<PaymentId>(&csv_record.source, "source", &op_name)?;

    // Validate field presence per operation
    match op {
        OperationType::Fund => {
            require(payer.is_some(), "payer", &op_name)?;
            require(amount.is_some(), "amount", &op_name)?;
        }
        OperationType::Make => {
            require(id.is_some(), "id", &op_name)?;
            require(payer.is_some(), "payer", &op_name)?;
        }
        OperationType::Update => {
            require(id.is_some(), "id", &op_name)?;
            require(base.is_some() || extra.is_some(), "base or extra", &op_name)?;
        }
        OperationType::Refund | OperationType::Confirm => {
            require(id.is_some(), "id", &op_name)?;
            require(amount.is_some(), "amount", &op_name)?;
        }
        OperationType::Revoke | OperationType::Reverse => {
            require(id.is_some(), "id", &op_name)?;
        }
        OperationType::Merge => {
            require(id.is_some(), "id", &op_name)?;
            require(source.is_some(), "source", &op_name)?;
        }
    }

    Ok(OperationRecord {
        op,
        id,
        payer,
        base,
        extra,
        sponsor,
        subsidy_limit,
        amount,
        source,
    })
}

/// Treat a missing or blank CSV field as absent
fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn require(present: bool, name: &str, op: &str) -> Result<(), String> {
    if present {
        Ok(())
    } else {
        Err(format!("Operation '{}' requires {}", op, name))
    }
}

fn parse_field<T>(field: &Option<String>, name: &str, op: &str) -> Result<Option<T>, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(field) {
        None => Ok(None),
        Some(text) => text
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid {} '{}' for {}: {}", name, text, op, e)),
    }
}

fn parse_amount(field: &Option<String>, name: &str, op: &str) -> Result<Option<u64>, String> {
    match non_empty(field) {
        None => Ok(None),
        Some(text) => text
            .parse::<u64>()
            .map(Some)
            .map_err(|_| format!("Invalid {} '{}' for {}", name, text, op)),
    }
}

/// Write payment states to CSV format
///
/// Writes payments in CSV format with columns:
/// `id, payer, status, base, extra, refund, confirmed, cashback`.
/// Payments are sorted by identifier for deterministic output.
///
/// # Arguments
///
/// * `payments` - Payment states to write, with their identifiers
/// * `output` - Mutable reference to a writer for outputting CSV
///
/// # Returns
///
/// * `Ok(())` if writing succeeded
/// * `Err(String)` if a write error occurred
pub fn write_payments_csv(
    payments: &[(PaymentId, &Payment)],
    output: &mut dyn Write,
) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record([
            "id",
            "payer",
            "status",
            "base",
            "extra",
            "refund",
            "confirmed",
            "cashback",
        ])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    // Sort payments by identifier for deterministic output
    let mut sorted = payments.to_vec();
    sorted.sort_by_key(|(id, _)| *id);

    for (id, payment) in sorted {
        writer
            .write_record(&[
                id.to_string(),
                payment.payer.to_string(),
                payment.status.to_string(),
                payment.base_amount.to_string(),
                payment.extra_amount.to_string(),
                payment.refund_amount.to_string(),
                payment.confirmed_amount.to_string(),
                payment.cashback_amount.to_string(),
            ])
            .map_err(|e| format!("Failed to write payment record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}
