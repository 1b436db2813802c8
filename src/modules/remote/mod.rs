//! Remote file source for provider settlement files
//!
//! The provider publishes files on an SSH host. `RemoteFileSource` is the
//! seam the fetch job depends on; `SshRemoteClient` drives the system
//! OpenSSH client.

mod ssh_client;

use async_trait::async_trait;
use std::path::Path;

use crate::core::error::Result;

pub use ssh_client::{build_fetch_command, build_list_command, shell_quote, SshRemoteClient};

#[async_trait]
pub trait RemoteFileSource: Send + Sync {
    /// One page of absolute file paths under `root_dir`, sorted ascending
    /// and restricted to the settlement extensions. A page shorter than
    /// `limit` is the last one.
    async fn list_page(&self, root_dir: &str, offset: usize, limit: usize) -> Result<Vec<String>>;

    /// Copy `remote_path` to `local_path`
    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()>;
}
