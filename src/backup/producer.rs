//! Producing a new backup folder with `rsync`.
//!
//! The transfer writes into `<name>_progress`. A finished transfer is renamed
//! to `<name>`; a failed one to `<name>_error`, which listing ignores, so a
//! broken backup never takes part in rotation.

use crate::backup::backup_name::BackupName;
use crate::backup::dir_ops::remote::SshTarget;
use crate::backup::dir_ops::DirOps;
use crate::backup::function_path;
use crate::backup::listing::BackupEntry;
use crate::backup::process::{call, CallOutput};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::tier::TargetLayout;
use bon::Builder;
use function_name::named;
use getset::Getters;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

/// rsync exit codes for a run that finished but skipped some files
/// (partial transfer, vanished source files, `--max-delete` limit).
pub const PARTIAL_TRANSFER_EXIT_CODES: [i32; 3] = [23, 24, 25];

#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, PartialEq, Eq, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct RsyncConfig {
    #[serde(default = "default_rsync_binary")]
    #[validate(length(min = 1))]
    #[builder(default = default_rsync_binary(), into)]
    binary: String,
    /// Extra options appended after `-a --delete [--link-dest ...]`.
    #[serde(default)]
    #[builder(default, into)]
    options: Vec<String>,
}

fn default_rsync_binary() -> String {
    "rsync".to_owned()
}

impl Default for RsyncConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferOutcome {
    Complete,
    /// rsync reported that some files could not be transferred.
    Partial { exit_code: i32 },
}

/// Creates one backup folder per call in the main tier of a target.
pub struct RsyncProducer<'a> {
    rsync: &'a RsyncConfig,
    sources: &'a [PathBuf],
    remote: Option<&'a SshTarget>,
}

impl<'a> RsyncProducer<'a> {
    pub fn new(rsync: &'a RsyncConfig, sources: &'a [PathBuf], remote: Option<&'a SshTarget>) -> Self {
        Self {
            rsync,
            sources,
            remote,
        }
    }

    /// Arguments for rsync. `link_dest` must be relative to the target root;
    /// rsync resolves `--link-dest` relative to the destination folder, hence
    /// the `../`.
    pub fn rsync_args(&self, staging: &Path, link_dest: Option<&Path>) -> Result<Vec<String>> {
        let mut args = vec!["-a".to_owned(), "--delete".to_owned()];
        if let Some(link_dest) = link_dest {
            args.push("--link-dest".to_owned());
            args.push(Path::new("..").join(link_dest).display().to_string());
        }
        args.extend(self.rsync.options.iter().cloned());

        let ssh_args = self.remote.map(SshTarget::ssh_args).unwrap_or_default();
        let ssh_command = std::iter::once("ssh").chain(ssh_args.iter().map(String::as_str));
        args.push("-e".to_owned());
        args.push(shlex::try_join(ssh_command)?);

        args.extend(self.sources.iter().map(|s| s.display().to_string()));
        args.push(match self.remote {
            Some(remote) => format!("{}:{}", remote.host(), staging.display()),
            None => staging.display().to_string(),
        });
        Ok(args)
    }

    #[named]
    pub fn produce(
        &self,
        ops: &dyn DirOps,
        layout: &TargetLayout,
        name: BackupName,
        last_backup: Option<&BackupEntry>,
    ) -> Result<TransferOutcome> {
        tracing::info!("Backing up sources: {:?}", self.sources);
        let final_path = layout.root().join(name.to_string());
        let staging_path = layout.root().join(name.staging_name());
        let error_path = layout.root().join(name.error_name());

        let link_dest = last_backup.map(|b| layout.relative(&b.path).to_path_buf());
        match &link_dest {
            Some(link_dest) => tracing::info!("Hardlinking unchanged files against {:?}", link_dest),
            None => tracing::info!("No previous backup, transferring everything"),
        }

        let args = self.rsync_args(&staging_path, link_dest.as_deref())?;
        let output = call(&self.rsync.binary, &args, "rsync");
        let outcome = match classify(&output) {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::error!("Transfer into {:?} failed", staging_path);
                let error = match self.mark_failed(ops, &staging_path, &error_path) {
                    Ok(()) => error,
                    Err(rename_error) => error.chain(rename_error),
                };
                return Err(error.add_fn_name(function_path!()));
            }
        };

        if let TransferOutcome::Partial { exit_code } = outcome {
            tracing::warn!(
                "rsync exited with code {}; some files could not be transferred or deleted",
                exit_code
            );
        }

        tracing::debug!("Renaming {:?} to {:?}", staging_path, final_path);
        ops.move_dir(&staging_path, &final_path)
            .map_err(|e| Error::materialization(format!("Committing {}", name), e))
            .add_fn_name(function_path!())?;
        tracing::info!("Created backup {}", name);

        Ok(outcome)
    }

    fn mark_failed(&self, ops: &dyn DirOps, staging: &Path, error_path: &Path) -> Result<()> {
        if !ops.exists(staging)? {
            return Ok(());
        }
        tracing::info!("Renaming {:?} to {:?}", staging, error_path);
        ops.move_dir(staging, error_path)
            .add_msg(format!("Could not rename {staging:?} to {error_path:?}"))
    }
}

/// Sorts an rsync result into success, success with warning, or failure.
pub fn classify(output: &Result<CallOutput>) -> Result<TransferOutcome> {
    match output {
        Err(e) => Err(Error::transfer(format!("could not run rsync: {e}"), None)),
        Ok(output) => match output.exit_code {
            Some(0) => Ok(TransferOutcome::Complete),
            Some(code) if PARTIAL_TRANSFER_EXIT_CODES.contains(&code) => {
                Ok(TransferOutcome::Partial { exit_code: code })
            }
            code => Err(Error::transfer(
                format!("rsync failed: {}", output.stderr.join("\n")),
                code,
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::dir_ops::local::LocalDirOps;
    use crate::backup::listing::list_tier;
    use crate::backup::result_error::error::ErrorKind;
    use crate::backup::tier::Tier;
    use tempfile::TempDir;

    fn output(code: Option<i32>) -> Result<CallOutput> {
        Ok(CallOutput {
            stdout: Vec::new(),
            stderr: vec!["rsync error: something".to_owned()],
            exit_code: code,
        })
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(&output(Some(0))).unwrap(), TransferOutcome::Complete);
        for code in [23, 24, 25] {
            assert_eq!(
                classify(&output(Some(code))).unwrap(),
                TransferOutcome::Partial { exit_code: code }
            );
        }
        for code in [Some(1), Some(12), Some(255), None] {
            assert_eq!(classify(&output(code)).unwrap_err().kind(), ErrorKind::Transfer);
        }
        let spawn_error = Err(Error::from(std::io::Error::other("no rsync")));
        assert_eq!(classify(&spawn_error).unwrap_err().kind(), ErrorKind::Transfer);
    }

    #[test]
    fn test_rsync_args_local() {
        let rsync = RsyncConfig::builder()
            .options(vec!["--exclude".to_owned(), ".cache".to_owned()])
            .build();
        let sources = vec![PathBuf::from("/home/alice"), PathBuf::from("/etc")];
        let producer = RsyncProducer::new(&rsync, &sources, None);

        let args = producer
            .rsync_args(
                Path::new("/backup/2024-01-02_03-04-05_progress"),
                Some(Path::new("_daily/2024-01-01_03-04-05")),
            )
            .unwrap();
        assert_eq!(
            args,
            [
                "-a",
                "--delete",
                "--link-dest",
                "../_daily/2024-01-01_03-04-05",
                "--exclude",
                ".cache",
                "-e",
                "ssh",
                "/home/alice",
                "/etc",
                "/backup/2024-01-02_03-04-05_progress",
            ]
        );
    }

    #[test]
    fn test_rsync_args_remote() {
        let rsync = RsyncConfig::default();
        let sources = vec![PathBuf::from("/srv")];
        let remote = SshTarget::builder()
            .host("backup.example.com")
            .user("alice".to_owned())
            .port(2222)
            .build();
        let producer = RsyncProducer::new(&rsync, &sources, Some(&remote));

        let args = producer
            .rsync_args(Path::new("/backup/x_progress"), None)
            .unwrap();
        assert_eq!(
            args,
            [
                "-a",
                "--delete",
                "-e",
                "ssh -l alice -p 2222",
                "/srv",
                "backup.example.com:/backup/x_progress",
            ]
        );
    }

    fn fake_rsync(dir: &Path, script: &str) -> RsyncConfig {
        let path = dir.join("fake-rsync");
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        RsyncConfig::builder().binary(path.display().to_string()).build()
    }

    /// The destination is always the last argument.
    const MAKE_DEST: &str = "for last; do :; done; mkdir -p \"$last\"";

    #[test]
    fn test_produce_commits_staging_folder() {
        let dir = TempDir::new().unwrap();
        let layout = TargetLayout::new(dir.path().join("target"));
        std::fs::create_dir_all(layout.root()).unwrap();
        let rsync = fake_rsync(dir.path(), MAKE_DEST);
        let sources = vec![PathBuf::from("/src")];
        let name: BackupName = "2024-01-02_03-04-05".parse().unwrap();

        let outcome = RsyncProducer::new(&rsync, &sources, None)
            .produce(&LocalDirOps, &layout, name, None)
            .unwrap();

        assert_eq!(outcome, TransferOutcome::Complete);
        assert!(layout.root().join("2024-01-02_03-04-05").is_dir());
        assert!(!layout.root().join("2024-01-02_03-04-05_progress").exists());
        let listed = list_tier(&LocalDirOps, &layout, Tier::Main).unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn test_produce_tolerates_partial_transfer() {
        let dir = TempDir::new().unwrap();
        let layout = TargetLayout::new(dir.path().join("target"));
        std::fs::create_dir_all(layout.root()).unwrap();
        let rsync = fake_rsync(dir.path(), &format!("{MAKE_DEST}; exit 24"));
        let sources = vec![PathBuf::from("/src")];
        let name: BackupName = "2024-01-02_03-04-05".parse().unwrap();

        let outcome = RsyncProducer::new(&rsync, &sources, None)
            .produce(&LocalDirOps, &layout, name, None)
            .unwrap();

        assert_eq!(outcome, TransferOutcome::Partial { exit_code: 24 });
        assert!(layout.root().join("2024-01-02_03-04-05").is_dir());
    }

    #[test]
    fn test_produce_failure_leaves_error_folder() {
        let dir = TempDir::new().unwrap();
        let layout = TargetLayout::new(dir.path().join("target"));
        std::fs::create_dir_all(layout.root()).unwrap();
        let rsync = fake_rsync(dir.path(), &format!("{MAKE_DEST}; echo boom >&2; exit 11"));
        let sources = vec![PathBuf::from("/src")];
        let name: BackupName = "2024-01-02_03-04-05".parse().unwrap();

        let error = RsyncProducer::new(&rsync, &sources, None)
            .produce(&LocalDirOps, &layout, name, None)
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Transfer);
        assert!(error.to_string().contains("boom"));
        assert!(layout.root().join("2024-01-02_03-04-05_error").is_dir());
        assert!(!layout.root().join("2024-01-02_03-04-05").exists());
        assert!(list_tier(&LocalDirOps, &layout, Tier::Main).unwrap().is_empty());
    }

    #[test]
    fn test_produce_failure_without_staging_folder() {
        let dir = TempDir::new().unwrap();
        let layout = TargetLayout::new(dir.path().join("target"));
        std::fs::create_dir_all(layout.root()).unwrap();
        let rsync = fake_rsync(dir.path(), "exit 5");
        let sources = vec![PathBuf::from("/src")];
        let name: BackupName = "2024-01-02_03-04-05".parse().unwrap();

        let error = RsyncProducer::new(&rsync, &sources, None)
            .produce(&LocalDirOps, &layout, name, None)
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Transfer);
        assert!(!layout.root().join("2024-01-02_03-04-05_error").exists());
    }
}
