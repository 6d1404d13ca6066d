use std::collections::BTreeMap;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::TempDir;
use tracing::debug;

use super::{TemplateEntry, TemplateStore, FIDDLE_FILES};
use crate::error::TemplateError;
use crate::version::Branch;

/// Filesystem-backed template cache.
///
/// Layout: `<root>/<branch>.zip` holds the downloaded archive and
/// `<root>/<branch>/` the unpacked template. Unpacking happens in a scratch
/// directory under `<root>` that is renamed into place once complete, so a
/// branch directory is either absent or whole.
pub struct FsTemplateStore {
    root: PathBuf,
}

impl FsTemplateStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn branch_dir(&self, branch: &Branch) -> PathBuf {
        self.root.join(branch.as_str())
    }

    fn archive_path(&self, branch: &Branch) -> PathBuf {
        self.root.join(format!("{branch}.zip"))
    }
}

#[async_trait]
impl TemplateStore for FsTemplateStore {
    async fn load_cached(&self, branch: &Branch) -> Result<Option<TemplateEntry>, TemplateError> {
        let dir = self.branch_dir(branch);
        tokio::task::spawn_blocking(move || {
            if dir.is_dir() {
                read_template_dir(&dir).map(Some)
            } else {
                Ok(None)
            }
        })
        .await
        .map_err(|e| TemplateError::Unpack(e.to_string()))?
    }

    async fn store_archive(
        &self,
        branch: &Branch,
        archive: Vec<u8>,
    ) -> Result<TemplateEntry, TemplateError> {
        let root = self.root.clone();
        let archive_path = self.archive_path(branch);
        let dest = self.branch_dir(branch);
        tokio::task::spawn_blocking(move || {
            fs::create_dir_all(&root)?;
            fs::write(&archive_path, &archive)?;

            let scratch = TempDir::new_in(&root)?;
            zip::ZipArchive::new(Cursor::new(archive))?.extract(scratch.path())?;
            let unpacked = scratch.keep();
            if let Err(e) = fs::rename(&unpacked, &dest) {
                // Another process may have unpacked the same branch first.
                let _ = fs::remove_dir_all(&unpacked);
                if !dest.is_dir() {
                    return Err(e.into());
                }
            }
            debug!(path = ?dest, "template archive unpacked");
            read_template_dir(&dest)
        })
        .await
        .map_err(|e| TemplateError::Unpack(e.to_string()))?
    }
}

/// Read the fiddle files of an unpacked template.
///
/// Archives that wrap everything in one top-level directory are descended
/// into.
pub fn read_template_dir(dir: &Path) -> Result<TemplateEntry, TemplateError> {
    let dir = template_root(dir)?;
    let mut files = BTreeMap::new();
    for name in FIDDLE_FILES {
        let path = dir.join(name);
        if path.is_file() {
            files.insert(name.to_string(), fs::read_to_string(&path)?);
        }
    }
    if files.is_empty() {
        return Err(TemplateError::Empty(dir));
    }
    Ok(TemplateEntry::new(files))
}

fn template_root(dir: &Path) -> Result<PathBuf, TemplateError> {
    let mut subdirs = Vec::new();
    let mut has_files = false;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            subdirs.push(entry.path());
        } else {
            has_files = true;
        }
    }
    match (has_files, subdirs.len()) {
        (false, 1) => Ok(subdirs.remove(0)),
        _ => Ok(dir.to_path_buf()),
    }
}
