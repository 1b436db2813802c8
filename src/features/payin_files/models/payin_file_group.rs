use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;

/// Database model for the files produced by one fetch run
#[derive(Debug, Clone, FromRow)]
pub struct PayinFileGroup {
    pub id: i64,
    pub group_name: String,
    pub provider_id: i64,
    pub import_date: NaiveDate,
    pub imported_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Data for creating a new file group
#[derive(Debug, Clone)]
pub struct CreatePayinFileGroup {
    pub group_name: String,
    pub provider_id: i64,
    pub import_date: NaiveDate,
}
