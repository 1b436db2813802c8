pub mod fetch_payin_file;
pub mod import_payin_file;
pub mod payin_files;
