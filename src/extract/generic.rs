//! Fallback extractor for any regular file.

use super::{ContentAnalyzer, ExtractError, Extractor};
use crate::normalize::{self, IgnoreKeys, RawMetadata};
use crate::types::ThumbnailPair;
use std::path::Path;
use std::sync::Arc;

/// Accepts every regular file. Metadata comes from a [`ContentAnalyzer`] when
/// one is configured, after the string-typing pass; without one, metadata is
/// empty. Never renders thumbnails.
pub struct GenericExtractor {
    analyzer: Option<Arc<dyn ContentAnalyzer>>,
    ignore_keys: IgnoreKeys,
}

impl GenericExtractor {
    pub fn new(analyzer: Option<Arc<dyn ContentAnalyzer>>, ignore_keys: IgnoreKeys) -> Self {
        Self {
            analyzer,
            ignore_keys,
        }
    }
}

impl Extractor for GenericExtractor {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn probe(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn metadata(&self, path: &Path) -> Result<RawMetadata, ExtractError> {
        let Some(analyzer) = &self.analyzer else {
            return Ok(RawMetadata::new());
        };
        let raw = analyzer.analyze(path)?;
        let typed = normalize::parse_strings(&raw, &self.ignore_keys);
        Ok(normalize::raw_from_json(typed))
    }

    fn thumbnails(
        &self,
        _path: &Path,
        _base_name: &str,
        _out_dir: Option<&Path>,
    ) -> Result<Option<Vec<ThumbnailPair>>, ExtractError> {
        Ok(None)
    }
}
