//! Fetch pipeline: settlement host -> local staging -> object storage

pub mod download_task;
pub mod remote_lister;
pub mod runner;

pub use download_task::DownloadUploadTask;
pub use remote_lister::{RemoteFileInfo, RemoteLister};
pub use runner::{FetchPayinFileJob, FetchReport};
