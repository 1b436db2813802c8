//! Localized CSV column labels mapped to canonical field keys
//!
//! PayPay settlement files ship with Japanese headers; some exports and
//! hand-made fixtures use English ones. Both resolve to the keys in [`field`].

use lazy_static::lazy_static;
use std::collections::HashMap;

use crate::shared::constants::UTF8_BOM;

/// Canonical field keys
pub mod field {
    pub const MERCHANT_ID: &str = "merchant_id";
    pub const MERCHANT_NAME: &str = "merchant_name";
    pub const STORE_ID: &str = "store_id";
    pub const STORE_NAME: &str = "store_name";
    pub const SETTLEMENT_DATE: &str = "settlement_date";
    pub const PAYMENT_DATE: &str = "payment_date";
    pub const TRANSACTION_DATE: &str = "transaction_date";
    pub const TRANSACTION_COUNT: &str = "transaction_count";
    pub const TRANSACTION_AMOUNT: &str = "transaction_amount";
    pub const REFUND_AMOUNT: &str = "refund_amount";
    pub const FEE: &str = "fee";
    pub const TAX: &str = "tax";
    pub const CASHBACK: &str = "cashback";
    pub const ADJUSTMENT: &str = "adjustment";
    pub const NET_AMOUNT: &str = "net_amount";
    pub const PAYMENT_ID: &str = "payment_id";
    pub const MERCHANT_PAYMENT_ID: &str = "merchant_payment_id";
    pub const TRANSACTION_STATUS: &str = "transaction_status";
    pub const TRANSACTED_AT: &str = "transacted_at";
    pub const PAYMENT_METHOD: &str = "payment_method";
    pub const PAYMENT_DETAIL: &str = "payment_detail";
}

lazy_static! {
    static ref LOCALIZED_HEADERS: HashMap<&'static str, &'static str> = HashMap::from([
        ("加盟店ID", field::MERCHANT_ID),
        ("加盟店id", field::MERCHANT_ID),
        ("加盟店名", field::MERCHANT_NAME),
        ("店舗ID", field::STORE_ID),
        ("店舗id", field::STORE_ID),
        ("店舗名", field::STORE_NAME),
        ("締め日", field::SETTLEMENT_DATE),
        ("締日", field::SETTLEMENT_DATE),
        ("精算日", field::SETTLEMENT_DATE),
        ("支払日", field::PAYMENT_DATE),
        ("入金日", field::PAYMENT_DATE),
        ("振込日", field::PAYMENT_DATE),
        ("取引日", field::TRANSACTION_DATE),
        ("取引件数", field::TRANSACTION_COUNT),
        ("件数", field::TRANSACTION_COUNT),
        ("取引金額", field::TRANSACTION_AMOUNT),
        ("決済金額", field::TRANSACTION_AMOUNT),
        ("返金金額", field::REFUND_AMOUNT),
        ("返金額", field::REFUND_AMOUNT),
        ("手数料", field::FEE),
        ("決済手数料", field::FEE),
        ("消費税", field::TAX),
        ("税額", field::TAX),
        ("キャッシュバック", field::CASHBACK),
        ("調整額", field::ADJUSTMENT),
        ("調整金額", field::ADJUSTMENT),
        ("入金額", field::NET_AMOUNT),
        ("振込金額", field::NET_AMOUNT),
        ("差引支払額", field::NET_AMOUNT),
        ("決済番号", field::PAYMENT_ID),
        ("決済ID", field::PAYMENT_ID),
        ("取引ID", field::PAYMENT_ID),
        ("加盟店決済ID", field::MERCHANT_PAYMENT_ID),
        ("取引ステータス", field::TRANSACTION_STATUS),
        ("取引日時", field::TRANSACTED_AT),
        ("決済日時", field::TRANSACTED_AT),
        ("決済方法", field::PAYMENT_METHOD),
        ("支払方法", field::PAYMENT_METHOD),
        ("決済詳細", field::PAYMENT_DETAIL),
    ]);

    /// English labels after case and separator folding
    static ref ENGLISH_HEADERS: HashMap<&'static str, &'static str> = {
        let canonical = [
            field::MERCHANT_ID,
            field::MERCHANT_NAME,
            field::STORE_ID,
            field::STORE_NAME,
            field::SETTLEMENT_DATE,
            field::PAYMENT_DATE,
            field::TRANSACTION_DATE,
            field::TRANSACTION_COUNT,
            field::TRANSACTION_AMOUNT,
            field::REFUND_AMOUNT,
            field::FEE,
            field::TAX,
            field::CASHBACK,
            field::ADJUSTMENT,
            field::NET_AMOUNT,
            field::PAYMENT_ID,
            field::MERCHANT_PAYMENT_ID,
            field::TRANSACTION_STATUS,
            field::TRANSACTED_AT,
            field::PAYMENT_METHOD,
            field::PAYMENT_DETAIL,
        ];
        let mut map: HashMap<&'static str, &'static str> =
            canonical.iter().map(|key| (*key, *key)).collect();
        map.extend([
            ("status", field::TRANSACTION_STATUS),
            ("transaction_datetime", field::TRANSACTED_AT),
            ("transaction_at", field::TRANSACTED_AT),
            ("refund", field::REFUND_AMOUNT),
            ("fees", field::FEE),
            ("payout_amount", field::NET_AMOUNT),
            ("amount", field::TRANSACTION_AMOUNT),
        ]);
        map
    };
}

/// Map one raw header cell to its canonical key.
///
/// Unknown headers come back trimmed but otherwise verbatim.
pub fn normalize_header(raw: &str) -> String {
    let trimmed = raw.trim_start_matches(UTF8_BOM).trim();

    if let Some(key) = LOCALIZED_HEADERS.get(trimmed) {
        return (*key).to_string();
    }

    let folded: String = trimmed
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect();

    match ENGLISH_HEADERS.get(folded.as_str()) {
        Some(key) => (*key).to_string(),
        None => trimmed.to_string(),
    }
}
