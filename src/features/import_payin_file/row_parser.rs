//! Typed parsing and validation of mapped CSV rows

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Asia::Tokyo;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::core::error::{AppError, Result};
use crate::features::import_payin_file::csv_reader::CsvRow;
use crate::features::import_payin_file::header_mapping::field;
use crate::features::payin_files::models::{
    PaypayPayinDetail, PaypayPayinSummary, PaypayPayinTransaction,
};
use crate::shared::validation::AMOUNT_NOISE_REGEX;

const DATE_FORMATS: [&str; 3] = ["%Y%m%d", "%Y-%m-%d", "%Y/%m/%d"];
const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y%m%d%H%M%S",
];

/// Record types found in settlement CSVs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Summary,
    Detail,
    Transaction,
}

impl Section {
    /// Columns that must be present for the section to be imported
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Section::Summary => &[field::MERCHANT_ID, field::TRANSACTION_AMOUNT, field::NET_AMOUNT],
            Section::Detail => &[field::STORE_ID, field::TRANSACTION_AMOUNT, field::NET_AMOUNT],
            Section::Transaction => &[field::PAYMENT_ID, field::TRANSACTION_AMOUNT],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Section::Summary => "summary",
            Section::Detail => "detail",
            Section::Transaction => "transaction",
        }
    }
}

/// Fail when `headers` lacks any of the section's required columns
pub fn validate_columns(section: Section, headers: &[String]) -> Result<()> {
    let missing: Vec<&str> = section
        .required_fields()
        .iter()
        .copied()
        .filter(|required| !headers.iter().any(|h| h == required))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "{} section is missing required columns: {}",
            section.name(),
            missing.join(", ")
        )))
    }
}

/// Validate columns once, then parse every row; the first bad row fails the
/// whole section
pub fn parse_rows<T>(
    section: Section,
    headers: &[String],
    rows: &[CsvRow],
    payin_file_id: i64,
    parse: fn(&CsvRow, i64) -> Result<T>,
) -> Result<Vec<T>> {
    validate_columns(section, headers)?;
    rows.iter().map(|row| parse(row, payin_file_id)).collect()
}

pub fn parse_summary(row: &CsvRow, payin_file_id: i64) -> Result<PaypayPayinSummary> {
    Ok(PaypayPayinSummary {
        payin_file_id,
        merchant_id: required_text(row, field::MERCHANT_ID)?,
        merchant_name: text(row, field::MERCHANT_NAME),
        settlement_date: date(row, field::SETTLEMENT_DATE)?,
        payment_date: date(row, field::PAYMENT_DATE)?,
        transaction_count: count(row, field::TRANSACTION_COUNT)?,
        transaction_amount: amount(row, field::TRANSACTION_AMOUNT)?,
        refund_amount: amount(row, field::REFUND_AMOUNT)?,
        fee: amount(row, field::FEE)?,
        tax: amount(row, field::TAX)?,
        cashback: amount(row, field::CASHBACK)?,
        adjustment: amount(row, field::ADJUSTMENT)?,
        net_amount: amount(row, field::NET_AMOUNT)?,
    })
}

pub fn parse_detail(row: &CsvRow, payin_file_id: i64) -> Result<PaypayPayinDetail> {
    Ok(PaypayPayinDetail {
        payin_file_id,
        merchant_id: text(row, field::MERCHANT_ID),
        store_id: required_text(row, field::STORE_ID)?,
        store_name: text(row, field::STORE_NAME),
        transaction_date: date(row, field::TRANSACTION_DATE)?,
        transaction_count: count(row, field::TRANSACTION_COUNT)?,
        transaction_amount: amount(row, field::TRANSACTION_AMOUNT)?,
        refund_amount: amount(row, field::REFUND_AMOUNT)?,
        fee: amount(row, field::FEE)?,
        tax: amount(row, field::TAX)?,
        cashback: amount(row, field::CASHBACK)?,
        adjustment: amount(row, field::ADJUSTMENT)?,
        net_amount: amount(row, field::NET_AMOUNT)?,
    })
}

pub fn parse_transaction(row: &CsvRow, payin_file_id: i64) -> Result<PaypayPayinTransaction> {
    Ok(PaypayPayinTransaction {
        payin_file_id,
        payment_id: required_text(row, field::PAYMENT_ID)?,
        merchant_payment_id: text(row, field::MERCHANT_PAYMENT_ID),
        merchant_id: text(row, field::MERCHANT_ID),
        store_id: text(row, field::STORE_ID),
        transaction_status: text(row, field::TRANSACTION_STATUS),
        transacted_at: timestamp(row, field::TRANSACTED_AT)?,
        payment_method: text(row, field::PAYMENT_METHOD),
        transaction_amount: amount(row, field::TRANSACTION_AMOUNT)?,
        refund_amount: amount(row, field::REFUND_AMOUNT)?,
        fee: amount(row, field::FEE)?,
        tax: amount(row, field::TAX)?,
        cashback: amount(row, field::CASHBACK)?,
        net_amount: amount(row, field::NET_AMOUNT)?,
        payment_detail: payment_detail(row),
    })
}

// =============================================================================
// CELL PARSERS
// =============================================================================

fn invalid(row: &CsvRow, key: &str, value: &str, expected: &str) -> AppError {
    AppError::Validation(format!(
        "line {}: column '{}' has '{}', expected {}",
        row.line(),
        key,
        value,
        expected
    ))
}

fn text(row: &CsvRow, key: &str) -> Option<String> {
    row.get(key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required_text(row: &CsvRow, key: &str) -> Result<String> {
    text(row, key).ok_or_else(|| {
        AppError::Validation(format!("line {}: column '{}' is empty", row.line(), key))
    })
}

/// Parse a monetary cell; blank or absent cells are zero
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned = AMOUNT_NOISE_REGEX.replace_all(raw, "");
    if cleaned.is_empty() {
        return Some(Decimal::ZERO);
    }

    // Japanese statements mark negatives with a triangle
    let (negative, digits) = match cleaned.strip_prefix(&['△', '▲'][..]) {
        Some(rest) => (true, rest),
        None => (false, &*cleaned),
    };

    let value = Decimal::from_str(digits).ok()?;
    Some(if negative { -value } else { value })
}

fn amount(row: &CsvRow, key: &str) -> Result<Decimal> {
    let raw = row.get(key).unwrap_or("");
    parse_amount(raw).ok_or_else(|| invalid(row, key, raw, "a decimal amount"))
}

fn count(row: &CsvRow, key: &str) -> Result<Option<i32>> {
    let raw = row.get(key).unwrap_or("");
    let cleaned = AMOUNT_NOISE_REGEX.replace_all(raw, "");
    if cleaned.is_empty() {
        return Ok(None);
    }
    cleaned
        .parse::<i32>()
        .map(Some)
        .map_err(|_| invalid(row, key, raw, "a whole number"))
}

/// Parse a date cell in any of the provider's date layouts
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .or_else(|| parse_timestamp(value).map(|ts| ts.with_timezone(&Tokyo).date_naive()))
}

fn date(row: &CsvRow, key: &str) -> Result<Option<NaiveDate>> {
    let raw = row.get(key).unwrap_or("").trim();
    if raw.is_empty() {
        return Ok(None);
    }
    parse_date(raw)
        .map(Some)
        .ok_or_else(|| invalid(row, key, raw, "a date"))
}

/// Parse a timestamp cell; values without an offset are Japan local time
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let value = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .and_then(|local| Tokyo.from_local_datetime(&local).earliest())
        .map(|ts| ts.with_timezone(&Utc))
}

fn timestamp(row: &CsvRow, key: &str) -> Result<Option<DateTime<Utc>>> {
    let raw = row.get(key).unwrap_or("").trim();
    if raw.is_empty() {
        return Ok(None);
    }
    parse_timestamp(raw)
        .map(Some)
        .ok_or_else(|| invalid(row, key, raw, "a timestamp"))
}

/// JSON payloads are kept as-is; anything else is stored as a JSON string
fn payment_detail(row: &CsvRow) -> Option<serde_json::Value> {
    let raw = text(row, field::PAYMENT_DETAIL)?;
    Some(serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw)))
}
