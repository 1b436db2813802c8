use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::RemoteFileSource;
use crate::core::config::RemoteHostConfig;
use crate::core::error::{AppError, Result};
use crate::shared::constants::REMOTE_FILE_EXTENSIONS;

/// Quote `value` for a POSIX shell
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Remote shell command listing one sorted page of settlement files
pub fn build_list_command(root_dir: &str, offset: usize, limit: usize) -> String {
    let root = shell_quote(root_dir);
    let name_filters = REMOTE_FILE_EXTENSIONS
        .iter()
        .map(|ext| format!("-iname '*.{}'", ext))
        .collect::<Vec<_>>()
        .join(" -o ");

    format!(
        "[ -d {root} ] || {{ echo \"no such directory: \"{root} >&2; exit 2; }}; \
         find {root} -type f \\( {name_filters} \\) | LC_ALL=C sort | tail -n +{start} | head -n {limit}",
        root = root,
        name_filters = name_filters,
        start = offset + 1,
        limit = limit,
    )
}

/// Remote shell command streaming one file to stdout
pub fn build_fetch_command(remote_path: &str) -> String {
    format!("cat -- {}", shell_quote(remote_path))
}

/// Settlement host reached through the system `ssh` binary
pub struct SshRemoteClient {
    config: RemoteHostConfig,
}

impl SshRemoteClient {
    pub fn new(config: RemoteHostConfig) -> Self {
        Self { config }
    }

    fn common_options(&self) -> Vec<String> {
        let mut options = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout_secs),
        ];
        if let Some(identity) = &self.config.identity_file {
            options.push("-i".to_string());
            options.push(identity.display().to_string());
        }
        options
    }

    /// Check that the host accepts a non-interactive login
    pub async fn check_connection(&self) -> Result<()> {
        let output = Command::new("ssh")
            .arg("-p")
            .arg(self.config.port.to_string())
            .args(self.common_options())
            .arg(self.config.destination())
            .arg("true")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| AppError::RemoteList(format!("failed to start ssh: {}", e)))?;

        if !output.status.success() {
            return Err(AppError::RemoteList(format!(
                "cannot connect to {}: {}",
                self.config.destination(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteFileSource for SshRemoteClient {
    async fn list_page(&self, root_dir: &str, offset: usize, limit: usize) -> Result<Vec<String>> {
        let command = build_list_command(root_dir, offset, limit);
        debug!("Listing {} (offset={}, limit={})", root_dir, offset, limit);

        let output = Command::new("ssh")
            .arg("-p")
            .arg(self.config.port.to_string())
            .args(self.common_options())
            .arg(self.config.destination())
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| AppError::RemoteList(format!("failed to start ssh: {}", e)))?;

        if !output.status.success() {
            return Err(AppError::RemoteList(format!(
                "listing {} on {} exited with {}: {}",
                root_dir,
                self.config.destination(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let local_file = tokio::fs::File::create(local_path).await?.into_std().await;

        // Paths go through the remote shell quoted, the same way listings do
        let output = Command::new("ssh")
            .arg("-p")
            .arg(self.config.port.to_string())
            .args(self.common_options())
            .arg(self.config.destination())
            .arg(build_fetch_command(remote_path))
            .stdin(Stdio::null())
            .stdout(Stdio::from(local_file))
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AppError::RemoteTransfer(format!("failed to start ssh: {}", e)))?
            .wait_with_output()
            .await?;

        if !output.status.success() {
            return Err(AppError::RemoteTransfer(format!(
                "fetching {} exited with {}: {}",
                remote_path,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        debug!("Downloaded {} to {}", remote_path, local_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/data/out"), "'/data/out'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_build_list_command_pages() {
        let command = build_list_command("/home/paypay/out", 200, 100);

        assert!(command.contains("find '/home/paypay/out' -type f"));
        assert!(command.contains("-iname '*.csv' -o -iname '*.pdf' -o -iname '*.zip'"));
        assert!(command.contains("LC_ALL=C sort"));
        assert!(command.contains("tail -n +201"));
        assert!(command.ends_with("head -n 100"));
    }

    #[test]
    fn test_build_list_command_first_page_starts_at_one() {
        assert!(build_list_command("out", 0, 10).contains("tail -n +1 "));
    }

    #[test]
    fn test_build_fetch_command_quotes_path() {
        assert_eq!(
            build_fetch_command("/out/PayPay report 2024.zip"),
            "cat -- '/out/PayPay report 2024.zip'"
        );
        assert_eq!(
            build_fetch_command("/out/a'b;rm -rf x.csv"),
            r"cat -- '/out/a'\''b;rm -rf x.csv'"
        );
    }
}
