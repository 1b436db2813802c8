mod payin_file;
mod payin_file_group;
mod paypay_records;

pub use payin_file::{CreatePayinFile, PayinFile, PayinFileStatus, PayinFileType, StatusField};
pub use payin_file_group::{CreatePayinFileGroup, PayinFileGroup};
pub use paypay_records::{
    ImportedCounts, PayinImportBatch, PaypayPayinDetail, PaypayPayinSummary,
    PaypayPayinTransaction,
};
