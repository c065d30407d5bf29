//! Directory operations against a backup target.
//!
//! Everything that rotates or lists backups goes through [`DirOps`], so the
//! same code drives a local target and one reached over ssh.

pub mod local;
pub mod remote;

use crate::backup::result_error::result::Result;
use derive_more::Display;
use std::path::Path;

/// What a path points at, without following symlinks.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum PathKind {
    Directory,
    Symlink,
    Other,
}

pub trait DirOps {
    /// Names of the immediate child directories of `path`. Symlinks are not
    /// directories here.
    fn list_child_dirs(&self, path: &Path) -> Result<Vec<String>>;

    /// Renames `from` to `to`. Both live on the same target.
    fn move_dir(&self, from: &Path, to: &Path) -> Result<()>;

    /// Recursively removes `path`. A symlink is removed, not followed.
    fn remove_all(&self, path: &Path) -> Result<()>;

    /// Creates `link` pointing at `target`. `target` is stored as given.
    fn symlink(&self, target: &Path, link: &Path) -> Result<()>;

    /// Creates `path` and missing parents with mode 0700.
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    fn path_kind(&self, path: &Path) -> Result<Option<PathKind>>;

    fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.path_kind(path)?.is_some())
    }
}
