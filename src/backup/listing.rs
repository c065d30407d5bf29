use crate::backup::backup_name::{is_backup_name, parse_name, BackupName};
use crate::backup::dir_ops::DirOps;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::tier::{TargetLayout, Tier};
use std::path::{Path, PathBuf};

/// A backup folder found in a tier directory.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BackupEntry {
    pub tier: Tier,
    pub name: BackupName,
    /// Full path of the folder on the target.
    pub path: PathBuf,
}

/// Lists the backup folders directly inside `dir`.
///
/// Only immediate child directories whose name is exactly a backup name are
/// returned. Staging and error folders, the latest pointer and the tier
/// folders themselves are skipped. A folder that has the shape of a backup
/// name but no valid date aborts the listing.
pub fn list_backups(ops: &dyn DirOps, dir: &Path, tier: Tier) -> Result<Vec<BackupEntry>> {
    tracing::debug!("Listing backups in {:?}", dir);
    let names = ops
        .list_child_dirs(dir)
        .map_err(|e| Error::listing(dir, e))?;

    let mut entries = Vec::new();
    for folder_name in names {
        tracing::debug!("Candidate folder: {}", folder_name);
        if !is_backup_name(&folder_name) {
            continue;
        }

        let name = parse_name(&folder_name)?;
        tracing::debug!("Matched folder: {}", folder_name);
        entries.push(BackupEntry {
            tier,
            name,
            path: dir.join(&folder_name),
        });
    }

    Ok(entries)
}

pub fn list_tier(ops: &dyn DirOps, layout: &TargetLayout, tier: Tier) -> Result<Vec<BackupEntry>> {
    list_backups(ops, &layout.tier_dir(tier), tier)
}

/// Newest backup in any tier, used as hardlink reference for the next one.
pub fn determine_last_backup(ops: &dyn DirOps, layout: &TargetLayout) -> Result<Option<BackupEntry>> {
    let mut newest: Option<BackupEntry> = None;
    for tier in Tier::ALL {
        for entry in list_tier(ops, layout, tier)? {
            if newest.as_ref().map_or(true, |n| entry.name > n.name) {
                newest = Some(entry);
            }
        }
    }

    Ok(newest)
}
