pub mod models;
pub mod repositories;

pub use repositories::{
    PayinFileGroupRepository, PayinFileRepository, PaypayRecordRepository,
    PgPayinFileGroupRepository, PgPayinFileRepository, PgPaypayRecordRepository,
};
