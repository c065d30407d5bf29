use crate::backup::backup_name::BackupName;
use crate::backup::dir_ops::{DirOps, PathKind};
use crate::backup::listing::list_tier;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::retention::RetentionDecision;
use crate::backup::tier::{TargetLayout, Tier};
use std::path::Path;

/// Applies retention decisions to a target through [`DirOps`].
///
/// Every failure is returned as a materialization error. Steps already applied
/// are not rolled back; the next run lists the target again and carries on.
pub struct Materializer<'a> {
    ops: &'a dyn DirOps,
    layout: &'a TargetLayout,
}

impl<'a> Materializer<'a> {
    pub fn new(ops: &'a dyn DirOps, layout: &'a TargetLayout) -> Self {
        Self { ops, layout }
    }

    /// Makes sure the target root and the tier folders exist.
    pub fn prepare_target(&self) -> Result<()> {
        for tier in Tier::ALL {
            let dir = self.layout.tier_dir(tier);
            match self.ops.path_kind(&dir) {
                Ok(Some(PathKind::Directory | PathKind::Symlink)) => {
                    tracing::debug!("{:?} exists", dir)
                }
                Ok(None) => {
                    tracing::info!("Creating folder {:?}", dir);
                    self.ops
                        .create_dir_all(&dir)
                        .map_err(|e| Error::materialization(format!("Creating {dir:?}"), e))?;
                }
                Ok(Some(kind)) => {
                    return Err(Error::materialization(
                        format!("Preparing {dir:?}"),
                        Error::from(std::io::Error::other(format!(
                            "exists as {kind}, expected a directory"
                        ))),
                    ));
                }
                Err(e) => {
                    return Err(Error::materialization(format!("Checking {dir:?}"), e));
                }
            }
        }
        Ok(())
    }

    pub fn apply(&self, decision: &RetentionDecision) -> Result<()> {
        if let Some(destination) = decision.destination() {
            let destination_dir = self.layout.tier_dir(destination);
            for entry in &decision.moves {
                let to = destination_dir.join(entry.name.to_string());
                tracing::info!(
                    "Moving {} to {}",
                    self.display(&entry.path),
                    self.display(&destination_dir)
                );
                self.ops.move_dir(&entry.path, &to).map_err(|e| {
                    Error::materialization(
                        format!("Moving {} to {}", self.display(&entry.path), self.display(&to)),
                        e,
                    )
                })?;
            }
        } else if !decision.moves.is_empty() {
            return Err(Error::invariant(format!(
                "{} tier has no next tier to move {} backups to",
                decision.tier,
                decision.moves.len()
            )));
        }

        for entry in &decision.deletes {
            tracing::info!("Removing {}", self.display(&entry.path));
            self.ops.remove_all(&entry.path).map_err(|e| {
                Error::materialization(format!("Removing {}", self.display(&entry.path)), e)
            })?;
        }

        Ok(())
    }

    /// Points the tier's latest pointer at its newest backup, or replaces it
    /// with an empty folder when the tier is empty.
    pub fn refresh_latest(&self, tier: Tier) -> Result<Option<BackupName>> {
        let newest = list_tier(self.ops, self.layout, tier)?
            .into_iter()
            .map(|e| e.name)
            .max();
        let pointer = self.layout.latest_pointer(tier);
        tracing::info!(
            "Updating latest pointer {} to {}",
            self.display(&pointer),
            newest.map_or("an empty folder".to_owned(), |n| n.to_string())
        );

        let materialization = |e: Error| {
            Error::materialization(format!("Updating {}", self.display(&pointer)), e)
        };
        if self.ops.exists(&pointer).map_err(materialization)? {
            self.ops.remove_all(&pointer).map_err(materialization)?;
        }
        match newest {
            Some(name) => self
                .ops
                .symlink(Path::new(&name.to_string()), &pointer)
                .map_err(materialization)?,
            None => self.ops.create_dir_all(&pointer).map_err(materialization)?,
        }

        Ok(newest)
    }

    fn display(&self, path: &Path) -> String {
        let relative = self.layout.relative(path);
        if relative.as_os_str().is_empty() {
            ".".to_owned()
        } else {
            relative.display().to_string()
        }
    }
}
