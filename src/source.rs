// 📥 Document Source
// Where registry extracts come from. The registry site saves downloads as
// `ul-<...>.pdf`; we file them under `<inn>.pdf` in the same directory.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const DOWNLOAD_PREFIX: &str = "ul-";
const DOCUMENT_EXTENSION: &str = "pdf";

/// DocumentSource - given an INN, a path to its registry extract
pub trait DocumentSource {
    /// `Ok(None)` means the document is not available on this attempt
    fn fetch(&mut self, inn: &str) -> Result<Option<PathBuf>>;

    /// The document at `path` was issued for `owner_inn`, not the INN it was
    /// fetched for
    fn refile(&mut self, _path: &Path, _owner_inn: &str) -> Result<()> {
        Ok(())
    }
}

/// Picks up documents a downloader (browser, script) left in one directory
pub struct DownloadDirSource {
    dir: PathBuf,
}

impl DownloadDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DownloadDirSource { dir: dir.into() }
    }

    /// Create the directory if it does not exist yet
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create download directory: {}", self.dir.display()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn document_path(&self, inn: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", inn, DOCUMENT_EXTENSION))
    }

    /// Most recently modified `ul-*.pdf`, ties broken by name
    fn newest_download(&self) -> Result<Option<PathBuf>> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read download directory: {}", self.dir.display()))?;

        let mut newest: Option<(SystemTime, PathBuf)> = None;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !is_fresh_download(&path) {
                continue;
            }

            let modified = entry.metadata()?.modified()?;
            let is_newer = match &newest {
                Some((time, current)) => (modified, &path) > (*time, current),
                None => true,
            };
            if is_newer {
                newest = Some((modified, path));
            }
        }

        Ok(newest.map(|(_, path)| path))
    }
}

fn is_fresh_download(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.starts_with(DOWNLOAD_PREFIX)
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case(DOCUMENT_EXTENSION))
}

impl DocumentSource for DownloadDirSource {
    /// A fresh download wins over a document filed on an earlier run
    fn fetch(&mut self, inn: &str) -> Result<Option<PathBuf>> {
        let target = self.document_path(inn);

        if let Some(download) = self.newest_download()? {
            fs::rename(&download, &target).with_context(|| {
                format!("Failed to rename {} to {}", download.display(), target.display())
            })?;
            info!("Filed {} as {}", download.display(), target.display());
            return Ok(Some(target));
        }

        if target.is_file() {
            debug!("Using existing document {}", target.display());
            return Ok(Some(target));
        }

        debug!("No document for INN {} in {}", inn, self.dir.display());
        Ok(None)
    }

    /// Move a misfiled document to the name of the INN it belongs to
    fn refile(&mut self, path: &Path, owner_inn: &str) -> Result<()> {
        let target = self.document_path(owner_inn);
        fs::rename(path, &target).with_context(|| {
            format!("Failed to rename {} to {}", path.display(), target.display())
        })?;
        warn!("Refiled {} as {}", path.display(), target.display());
        Ok(())
    }
}
