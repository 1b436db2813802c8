use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// One row of the summary section of a combined settlement CSV
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaypayPayinSummary {
    pub payin_file_id: i64,
    pub merchant_id: String,
    pub merchant_name: Option<String>,
    pub settlement_date: Option<NaiveDate>,
    pub payment_date: Option<NaiveDate>,
    pub transaction_count: Option<i32>,
    pub transaction_amount: Decimal,
    pub refund_amount: Decimal,
    pub fee: Decimal,
    pub tax: Decimal,
    pub cashback: Decimal,
    pub adjustment: Decimal,
    pub net_amount: Decimal,
}

/// One row of the detail section of a combined settlement CSV
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaypayPayinDetail {
    pub payin_file_id: i64,
    pub merchant_id: Option<String>,
    pub store_id: String,
    pub store_name: Option<String>,
    pub transaction_date: Option<NaiveDate>,
    pub transaction_count: Option<i32>,
    pub transaction_amount: Decimal,
    pub refund_amount: Decimal,
    pub fee: Decimal,
    pub tax: Decimal,
    pub cashback: Decimal,
    pub adjustment: Decimal,
    pub net_amount: Decimal,
}

/// One row of a transaction-report CSV
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaypayPayinTransaction {
    pub payin_file_id: i64,
    pub payment_id: String,
    pub merchant_payment_id: Option<String>,
    pub merchant_id: Option<String>,
    pub store_id: Option<String>,
    pub transaction_status: Option<String>,
    pub transacted_at: Option<DateTime<Utc>>,
    pub payment_method: Option<String>,
    pub transaction_amount: Decimal,
    pub refund_amount: Decimal,
    pub fee: Decimal,
    pub tax: Decimal,
    pub cashback: Decimal,
    pub net_amount: Decimal,
    /// Provider payload kept as opaque JSON until its shape is pinned down
    pub payment_detail: Option<serde_json::Value>,
}

/// Rows staged for one settlement file. Committing the batch writes the
/// rows and marks the file imported in the same transaction.
#[derive(Debug)]
pub struct PayinImportBatch {
    pub payin_file_id: i64,
    pub summaries: Vec<PaypayPayinSummary>,
    pub details: Vec<PaypayPayinDetail>,
    pub transactions: Vec<PaypayPayinTransaction>,
}

impl PayinImportBatch {
    pub fn new(payin_file_id: i64) -> Self {
        Self {
            payin_file_id,
            summaries: Vec::new(),
            details: Vec::new(),
            transactions: Vec::new(),
        }
    }

    pub fn stage_summaries(&mut self, rows: Vec<PaypayPayinSummary>) {
        self.summaries.extend(rows);
    }

    pub fn stage_details(&mut self, rows: Vec<PaypayPayinDetail>) {
        self.details.extend(rows);
    }

    pub fn stage_transactions(&mut self, rows: Vec<PaypayPayinTransaction>) {
        self.transactions.extend(rows);
    }

    pub fn row_count(&self) -> usize {
        self.summaries.len() + self.details.len() + self.transactions.len()
    }
}

/// Rows written by one committed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportedCounts {
    pub summaries: u64,
    pub details: u64,
    pub transactions: u64,
}

impl ImportedCounts {
    pub fn total(&self) -> u64 {
        self.summaries + self.details + self.transactions
    }
}
