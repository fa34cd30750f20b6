//! Thumbnail publishing.
//!
//! Previews are rendered locally by the extractors, pushed to a public host,
//! and embedded into the record description as Markdown:
//!
//! ```text
//! ![Image](https://data.example.org/thumbs/1234.png)
//!
//! ```
//!
//! The host is any [`PublicUploader`]. Two are provided:
//!
//! | Provider | Type | Upload | Public URL |
//! |---|---|---|---|
//! | `directory` | [`DirectoryHost`] | copy into a web-served directory | `public_url/<file>` |
//! | `http` | [`HttpUploader`] | `PUT url/<file>` with the file bytes | `public_url/<file>`, or `url/<file>` |
//!
//! Without a configured host, publishing is a no-op that returns an empty
//! description; that is how thumbnails are switched off.
//!
//! ## Local files
//!
//! Every local preview is deleted once all uploads succeeded. When an upload
//! fails the error propagates immediately and the local previews are left to
//! the caller. The ingestor renders them into a staging directory that it
//! removes either way.

use crate::config::{ConfigError, PublishConfig};
use crate::naming;
use crate::types::ThumbnailPair;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Path has no file name: {}", .0.display())]
    NoFileName(PathBuf),
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to upload {}: {source}", path.display())]
    Upload {
        path: PathBuf,
        #[source]
        source: UploadError,
    },
}

/// A host that makes local files reachable under a public URL.
pub trait PublicUploader: Send + Sync {
    /// Upload `path` and return the URL it is now served at.
    fn upload_public_file(&self, path: &Path) -> Result<String, UploadError>;
}

/// Upload every pair and render the Markdown description.
///
/// Returns `""` without touching anything when `uploader` is `None` or there
/// is nothing to publish.
pub fn publish(
    pairs: &[ThumbnailPair],
    uploader: Option<&dyn PublicUploader>,
) -> Result<String, PublishError> {
    let Some(uploader) = uploader else {
        debug!("no public uploader configured, thumbnails disabled");
        return Ok(String::new());
    };

    let mut description = String::new();
    for pair in pairs {
        let url = uploader
            .upload_public_file(&pair.path)
            .map_err(|source| PublishError::Upload {
                path: pair.path.clone(),
                source,
            })?;
        debug!(label = %pair.label, url = %url, "thumbnail uploaded");
        description.push_str(&markdown_image(&pair.label, &url));
    }

    for pair in pairs {
        if let Err(e) = fs::remove_file(&pair.path) {
            warn!(path = %pair.path.display(), error = %e, "cannot remove local thumbnail");
        }
    }
    Ok(description)
}

/// One Markdown image line followed by a blank line.
pub fn markdown_image(label: &str, url: &str) -> String {
    format!("![{label}]({url})\n\n")
}

fn join_url(base: &str, name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), name)
}

fn upload_name(path: &Path) -> Result<String, UploadError> {
    let name = naming::file_name(path);
    if name.is_empty() {
        return Err(UploadError::NoFileName(path.to_path_buf()));
    }
    Ok(name)
}

// =============================================================================
// Providers
// =============================================================================

/// Publishes by copying into a directory that a web server exposes.
#[derive(Debug, Clone)]
pub struct DirectoryHost {
    directory: PathBuf,
    public_url: String,
}

impl DirectoryHost {
    pub fn new(directory: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            public_url: public_url.into(),
        }
    }
}

impl PublicUploader for DirectoryHost {
    fn upload_public_file(&self, path: &Path) -> Result<String, UploadError> {
        let name = upload_name(path)?;
        fs::create_dir_all(&self.directory)?;
        fs::copy(path, self.directory.join(&name))?;
        Ok(join_url(&self.public_url, &name))
    }
}

/// Publishes with an HTTP `PUT` of the raw file bytes, streamed from disk.
pub struct HttpUploader {
    url: String,
    public_url: Option<String>,
    client: reqwest::blocking::Client,
}

impl HttpUploader {
    pub fn new(url: impl Into<String>, public_url: Option<String>) -> Self {
        Self {
            url: url.into(),
            public_url,
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl PublicUploader for HttpUploader {
    fn upload_public_file(&self, path: &Path) -> Result<String, UploadError> {
        let name = upload_name(path)?;
        let file = fs::File::open(path)?;
        let target = join_url(&self.url, &name);
        debug!(path = %path.display(), bytes = file.metadata()?.len(), url = %target, "uploading");
        self.client
            .put(target)
            .body(file)
            .send()?
            .error_for_status()?;
        let base = self.public_url.as_deref().unwrap_or(&self.url);
        Ok(join_url(base, &name))
    }
}

/// Build the configured uploader. `Ok(None)` disables thumbnails.
pub fn uploader_from_config(
    config: Option<&PublishConfig>,
) -> Result<Option<Box<dyn PublicUploader>>, ConfigError> {
    let Some(config) = config else {
        return Ok(None);
    };
    config.validate()?;

    let missing = |field: &str| {
        ConfigError::Validation(format!(
            "publish.{field} is required for the {} provider",
            config.provider
        ))
    };
    let uploader: Box<dyn PublicUploader> = match config.provider.to_ascii_lowercase().as_str() {
        "directory" => Box::new(DirectoryHost::new(
            config.directory.clone().ok_or_else(|| missing("directory"))?,
            config.public_url.clone().ok_or_else(|| missing("public_url"))?,
        )),
        "http" => Box::new(HttpUploader::new(
            config.url.clone().ok_or_else(|| missing("url"))?,
            config.public_url.clone(),
        )),
        other => return Err(ConfigError::UnknownProvider(other.to_string())),
    };
    Ok(Some(uploader))
}
