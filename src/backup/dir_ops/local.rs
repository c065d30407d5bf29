use crate::backup::dir_ops::{DirOps, PathKind};
use crate::backup::result_error::result::Result;
use std::fs::DirBuilder;
use std::io::ErrorKind;
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;

/// [`DirOps`] on the local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalDirOps;

impl DirOps for LocalDirOps {
    fn list_child_dirs(&self, path: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(name) => tracing::debug!("Skipping non UTF-8 folder name {:?}", name),
            }
        }
        Ok(names)
    }

    fn move_dir(&self, from: &Path, to: &Path) -> Result<()> {
        Ok(std::fs::rename(from, to)?)
    }

    fn remove_all(&self, path: &Path) -> Result<()> {
        if std::fs::symlink_metadata(path)?.is_dir() {
            std::fs::remove_dir_all(path)?;
        } else {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        Ok(std::os::unix::fs::symlink(target, link)?)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        Ok(DirBuilder::new().recursive(true).mode(0o700).create(path)?)
    }

    fn path_kind(&self, path: &Path) -> Result<Option<PathKind>> {
        match std::fs::symlink_metadata(path) {
            Ok(md) if md.is_symlink() => Ok(Some(PathKind::Symlink)),
            Ok(md) if md.is_dir() => Ok(Some(PathKind::Directory)),
            Ok(_) => Ok(Some(PathKind::Other)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
