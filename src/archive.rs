//! Scratch-space validation, staging directories and temporary archives.
//!
//! Copy mode pushes a directory dataset as one compressed tarball, and
//! thumbnails are rendered to disk before upload. Both are temporary files
//! written into a private staging directory: a fresh, uniquely named
//! directory inside scratch when one is usable, otherwise beside the source.
//! Generated names such as `raw.tar.gz` or `12.png` therefore never land on
//! top of a user's file. [`TempArchive`] ties removal of the archive and its
//! staging directory to scope so the success and error paths clean up the
//! same way.

use crate::naming;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
}

const PROBE_FILENAME: &str = ".catalog-mirror-write-probe";
/// Hidden, so a staging directory beside the source is never mirrored.
const STAGING_PREFIX: &str = ".catalog-mirror-";

/// Check that `path` exists, is a directory and accepts new files.
///
/// Returns the canonical path on success. Any failure is a warning and
/// `None`: callers then fall back to writing beside the source data.
pub fn validate_scratch_dir(path: &Path) -> Option<PathBuf> {
    if !path.exists() {
        warn!(path = %path.display(), "scratch directory does not exist");
        return None;
    }
    if !path.is_dir() {
        warn!(path = %path.display(), "scratch path is not a directory");
        return None;
    }

    let probe = path.join(PROBE_FILENAME);
    let writable = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&probe)
        .is_ok();
    if !writable {
        warn!(path = %path.display(), "scratch directory is not writable");
        return None;
    }
    if let Err(e) = fs::remove_file(&probe) {
        warn!(path = %probe.display(), error = %e, "cannot remove scratch probe file");
    }

    match path.canonicalize() {
        Ok(canonical) => Some(canonical),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot resolve scratch directory");
            None
        }
    }
}

/// Create a fresh private directory for temporary output about `source`.
///
/// The directory lives inside `scratch` when given, else beside `source`, and
/// is removed with everything in it when the returned guard drops.
pub fn staging_dir(source: &Path, scratch: Option<&Path>) -> Result<TempDir, ArchiveError> {
    let parent = match scratch {
        Some(dir) => dir,
        None => source
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new(".")),
    };
    let dir = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(parent)?;
    debug!(dir = %dir.path().display(), "staging directory created");
    Ok(dir)
}

/// Archive `source_dir` into `<name>.tar.gz`.
///
/// The archive goes into `dest_dir` when given, else beside the source. Its
/// file name is the directory name minus a final extension, and every entry
/// lives under a root entry named after the directory. Entries are added in
/// file-name order so the same tree always produces the same member list.
/// An existing file at the target path is an error, never overwritten.
pub fn make_tarball(source_dir: &Path, dest_dir: Option<&Path>) -> Result<PathBuf, ArchiveError> {
    if !source_dir.is_dir() {
        return Err(ArchiveError::NotADirectory(source_dir.to_path_buf()));
    }

    let name = naming::file_name(source_dir);
    let out_dir = match dest_dir {
        Some(dir) => dir.to_path_buf(),
        None => source_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };
    let out_path = out_dir.join(format!("{}.tar.gz", naming::strip_final_extension(&name)));

    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&out_path)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

    // A destination inside the dataset would otherwise archive the archive.
    let walker = WalkDir::new(source_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || (e.path() != out_dir && e.path() != out_path));
    for entry in walker {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source_dir)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        let member = Path::new(&name).join(relative);

        if entry.file_type().is_dir() {
            builder.append_dir(&member, entry.path())?;
        } else {
            builder.append_path_with_name(entry.path(), &member)?;
        }
    }

    builder.into_inner()?.finish()?;
    debug!(source = %source_dir.display(), archive = %out_path.display(), "archive written");
    Ok(out_path)
}

/// A temporary archive in its own staging directory, deleted when dropped.
#[derive(Debug)]
pub struct TempArchive {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl TempArchive {
    /// Archive `source_dir` into a staging directory under `scratch` (or
    /// beside the source) and take ownership of both.
    pub fn create(source_dir: &Path, scratch: Option<&Path>) -> Result<Self, ArchiveError> {
        let dir = staging_dir(source_dir, scratch)?;
        let path = make_tarball(source_dir, Some(dir.path()))?;
        Ok(Self {
            path,
            dir: Some(dir),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArchive {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take()
            && let Err(e) = dir.close()
        {
            warn!(path = %self.path.display(), error = %e, "cannot remove temporary archive");
        }
    }
}
