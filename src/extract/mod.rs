//! Extractor dispatch.
//!
//! An [`Extractor`] reads domain metadata from a data file and can optionally
//! render preview images of it. The [`ExtractorRegistry`] holds an ordered list
//! of extractors and picks, for each file, the first one whose
//! [`probe`](Extractor::probe) accepts it.
//!
//! ## Order
//!
//! | Priority | Extractor | Accepts | Thumbnails |
//! |---|---|---|---|
//! | 1 | [`ImageExtractor`] | files decodable as raster images (content sniffed) | one `("Image", path)` pair |
//! | 2 | [`GenericExtractor`] | any regular file | unsupported |
//!
//! Specific extractors go first, the generic fallback last. New instrument
//! formats are added by implementing [`Extractor`] and registering the
//! implementation ahead of the fallback; ingestion never changes.
//!
//! ## Outcomes
//!
//! - No extractor accepts the file: `select` returns `None`. The record is
//!   still created, just without extracted metadata or thumbnails.
//! - `metadata` returns an empty map: the extractor understood the file but
//!   found nothing worth keeping.
//! - `thumbnails` returns `Ok(None)`: the extractor does not render previews.
//!   `Ok(Some(vec![]))` means it tried and produced nothing.
//!
//! Errors from either call are soft for the caller: ingestion logs them and
//! carries on with empty output.

pub mod analyzer;
pub mod generic;
pub mod image;
pub mod iptc;

pub use analyzer::{ContentAnalyzer, TikaClient};
pub use generic::GenericExtractor;
pub use image::ImageExtractor;

use crate::config::MirrorConfig;
use crate::normalize::RawMetadata;
use crate::types::ThumbnailPair;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] ::image::ImageError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Analyzer returned invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Analyzer returned {0}, expected a JSON object")]
    UnexpectedResponse(String),
}

/// A metadata and preview source for one family of data files.
pub trait Extractor: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Whether this extractor can handle `path`. Must not fail: unreadable
    /// or foreign files are simply rejected.
    fn probe(&self, path: &Path) -> bool;

    /// Raw, loosely typed metadata of `path`.
    fn metadata(&self, path: &Path) -> Result<RawMetadata, ExtractError>;

    /// Render previews of `path` named after `base_name`, written to
    /// `out_dir` or beside the source when `None`. An existing file with a
    /// preview's name is an error, never overwritten.
    fn thumbnails(
        &self,
        path: &Path,
        base_name: &str,
        out_dir: Option<&Path>,
    ) -> Result<Option<Vec<ThumbnailPair>>, ExtractError>;
}

/// Ordered list of extractors; the first accepting one wins.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn Extractor>>,
}

impl ExtractorRegistry {
    pub fn new(extractors: Vec<Box<dyn Extractor>>) -> Self {
        Self { extractors }
    }

    /// The stock registry: image extractor, then the generic fallback.
    ///
    /// Both extractors share one content-analysis client, which exists only
    /// when `extraction.tika_url` is configured.
    pub fn from_config(config: &MirrorConfig) -> Result<Self, ExtractError> {
        let analyzer = TikaClient::from_config(&config.extraction)?
            .map(|client| Arc::new(client) as Arc<dyn ContentAnalyzer>);
        let ignore_keys = &config.extraction.ignore_keys;

        let mut images = ImageExtractor::new(config.thumbnails.max_size);
        if let Some(analyzer) = &analyzer {
            images = images.with_analyzer(Arc::clone(analyzer), ignore_keys.clone());
        }
        Ok(Self::new(vec![
            Box::new(images),
            Box::new(GenericExtractor::new(analyzer, ignore_keys.clone())),
        ]))
    }

    /// Names of the registered extractors in priority order.
    pub fn names(&self) -> Vec<&'static str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }

    /// Pick the extractor for `path`, or `None` when nothing accepts it.
    pub fn select(&self, path: &Path) -> Option<Selected<'_>> {
        let extractor = self.extractors.iter().find(|e| e.probe(path))?;
        debug!(path = %path.display(), extractor = extractor.name(), "extractor selected");
        Some(Selected {
            extractor: extractor.as_ref(),
            path: path.to_path_buf(),
        })
    }
}

/// An extractor bound to the file it accepted.
pub struct Selected<'a> {
    extractor: &'a dyn Extractor,
    path: PathBuf,
}

impl Selected<'_> {
    pub fn name(&self) -> &'static str {
        self.extractor.name()
    }

    pub fn metadata(&self) -> Result<RawMetadata, ExtractError> {
        self.extractor.metadata(&self.path)
    }

    pub fn thumbnails(
        &self,
        base_name: &str,
        out_dir: Option<&Path>,
    ) -> Result<Option<Vec<ThumbnailPair>>, ExtractError> {
        self.extractor.thumbnails(&self.path, base_name, out_dir)
    }
}
