//! Backup port around the graph database.
//!
//! The loader only needs "capture a backup, hand me the restore command";
//! the concrete provider shells out to the vendor tool.

use std::fs;
use std::path::Path;
use std::process::Command;

use tracing::info;

use crate::error::LoadError;

/// Capture a backup of the target database before a destructive load.
pub trait BackupProvider {
    /// Back up into `folder` under `name`; returns the human-readable
    /// restore instructions.
    fn backup(&self, folder: &Path, name: &str) -> Result<String, LoadError>;
}

/// Shell-out provider using `neo4j-admin`, locally or over ssh.
pub struct Neo4jAdminBackup {
    address: String,
}

/// Host part of a bolt URI: `bolt://12.34.56.78:7687` -> `12.34.56.78`.
pub fn host_of(uri: &str) -> String {
    let without_scheme = uri.split_once("://").map(|(_, rest)| rest).unwrap_or(uri);
    without_scheme
        .split([':', '/'])
        .next()
        .unwrap_or(without_scheme)
        .to_string()
}

impl Neo4jAdminBackup {
    pub fn new(uri: &str) -> Self {
        Self {
            address: host_of(uri),
        }
    }

    fn is_local(&self) -> bool {
        matches!(self.address.as_str(), "localhost" | "127.0.0.1" | "")
    }

    /// The restore instructions reported after a successful backup.
    pub fn restore_command(&self, folder: &Path, name: &str) -> String {
        let admin_cmd = format!(
            "neo4j-admin restore --from={}/{} --force",
            folder.display(),
            name
        );
        let banner = "#".repeat(160);
        let body = if self.is_local() {
            format!("\t$ neo4j stop && {admin_cmd} && neo4j start")
        } else {
            format!(
                "\t$ echo \"sudo systemctl stop neo4j && {admin_cmd} && \
                 sudo systemctl start neo4j && exit\" | ssh -t {} sudo su - neo4j",
                self.address
            )
        };
        format!(
            "To restore the database from this backup (removing any changes caused \
             by the current load), run:\n{banner}\n{body}\n{banner}"
        )
    }
}

impl BackupProvider for Neo4jAdminBackup {
    fn backup(&self, folder: &Path, name: &str) -> Result<String, LoadError> {
        fs::create_dir_all(folder).map_err(|e| LoadError::Backup(e.to_string()))?;
        let backup_arg = format!("--backup-dir={}", folder.display());
        let mut command = if self.is_local() {
            let mut cmd = Command::new("neo4j-admin");
            cmd.arg("backup").arg(&backup_arg);
            cmd
        } else {
            let mut cmd = Command::new("ssh");
            cmd.arg(&self.address)
                .arg("-o")
                .arg("StrictHostKeyChecking=no")
                .arg("neo4j-admin")
                .arg("backup")
                .arg(&backup_arg);
            cmd
        };
        info!(folder = %folder.display(), "backing up database");
        let status = command
            .status()
            .map_err(|e| LoadError::Backup(e.to_string()))?;
        if !status.success() {
            return Err(LoadError::Backup(format!(
                "neo4j-admin exited with {status}"
            )));
        }
        Ok(self.restore_command(folder, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("bolt://12.34.56.78:7687"), "12.34.56.78");
        assert_eq!(host_of("bolt://localhost:7687"), "localhost");
        assert_eq!(host_of("neo4j://db.example.org"), "db.example.org");
        assert_eq!(host_of("localhost"), "localhost");
    }

    #[test]
    fn test_restore_command_local_vs_remote() {
        let folder = PathBuf::from("/backups");
        let local = Neo4jAdminBackup::new("bolt://localhost:7687");
        let text = local.restore_command(&folder, "20260801-120000");
        assert!(text.contains("neo4j stop"));
        assert!(text.contains("/backups/20260801-120000"));

        let remote = Neo4jAdminBackup::new("bolt://10.0.0.5:7687");
        let text = remote.restore_command(&folder, "20260801-120000");
        assert!(text.contains("ssh -t 10.0.0.5"));
    }
}
