//! Raster image extractor.
//!
//! Detector images, micrographs and camera frames are the common case on an
//! instrument share, so they get first pick in the registry.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Probe | `image::ImageReader::with_guessed_format` + `into_dimensions` |
//! | Decode (JPEG, PNG, TIFF, WebP, BMP, GIF) | `image` crate decoders |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | IPTC metadata | [`super::iptc`] (JPEG APP13) |
//! | EXIF / TIFF tags | optional [`ContentAnalyzer`], string-typed |
//!
//! ## Metadata
//!
//! Geometry, color layout and file size are read natively. With a content
//! analyzer configured, its output (EXIF, instrument TIFF tags) goes through
//! the same ignore-key filter and string-typing pass as the generic
//! extractor, and the native fields are laid over it. An analyzer failure is
//! logged and the native fields are still returned.
//!
//! ## Thumbnails
//!
//! One preview per image, labelled `"Image"`, scaled so its longest edge is at
//! most `max_size`. Images already within bounds are re-encoded at their own
//! size, never upscaled. JPEG sources stay JPEG; everything else is written
//! as PNG, since browsers cannot display TIFF and the preview ends up in a
//! web page. Previews are only ever written to new files; a file already
//! holding the preview's name is left untouched and the call fails.

use super::{ContentAnalyzer, ExtractError, Extractor, iptc};
use crate::naming;
use crate::normalize::{self, IgnoreKeys, RawMetadata, RawValue};
use crate::types::ThumbnailPair;
use ::image::imageops::FilterType;
use ::image::{DynamicImage, ImageFormat, ImageReader};
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

pub const THUMBNAIL_LABEL: &str = "Image";

pub struct ImageExtractor {
    max_size: u32,
    analyzer: Option<Arc<dyn ContentAnalyzer>>,
    ignore_keys: IgnoreKeys,
}

impl ImageExtractor {
    pub fn new(max_size: u32) -> Self {
        Self {
            max_size,
            analyzer: None,
            ignore_keys: IgnoreKeys::default(),
        }
    }

    /// Also ask `analyzer` for metadata, dropping `ignore_keys`.
    pub fn with_analyzer(
        mut self,
        analyzer: Arc<dyn ContentAnalyzer>,
        ignore_keys: IgnoreKeys,
    ) -> Self {
        self.analyzer = Some(analyzer);
        self.ignore_keys = ignore_keys;
        self
    }

    fn analyzed(&self, path: &Path) -> RawMetadata {
        let Some(analyzer) = &self.analyzer else {
            return RawMetadata::new();
        };
        match analyzer.analyze(path) {
            Ok(raw) => normalize::raw_from_json(normalize::parse_strings(&raw, &self.ignore_keys)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "content analysis failed");
                RawMetadata::new()
            }
        }
    }
}

/// Scale `(width, height)` to fit within a `max` square, keeping aspect ratio.
/// Never upscales; each edge is at least one pixel.
pub fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max || longest == 0 {
        return (width, height);
    }
    let scale = f64::from(max) / f64::from(longest);
    let w = (f64::from(width) * scale).round().max(1.0) as u32;
    let h = (f64::from(height) * scale).round().max(1.0) as u32;
    (w.min(max), h.min(max))
}

/// Output format and extension for a preview of a file named `source_name`.
fn preview_format(source_name: &str) -> (ImageFormat, &'static str) {
    match naming::extension_of(source_name).as_str() {
        "jpg" | "jpeg" => (ImageFormat::Jpeg, "jpg"),
        _ => (ImageFormat::Png, "png"),
    }
}

fn open_guessed(path: &Path) -> Result<ImageReader<std::io::BufReader<fs::File>>, ExtractError> {
    Ok(ImageReader::open(path)?.with_guessed_format()?)
}

impl Extractor for ImageExtractor {
    fn name(&self) -> &'static str {
        "image"
    }

    fn probe(&self, path: &Path) -> bool {
        if !path.is_file() {
            return false;
        }
        match open_guessed(path) {
            Ok(reader) => reader.format().is_some() && reader.into_dimensions().is_ok(),
            Err(_) => false,
        }
    }

    fn metadata(&self, path: &Path) -> Result<RawMetadata, ExtractError> {
        let reader = open_guessed(path)?;
        let format = reader.format();
        let img = reader.decode()?;
        let color = img.color();

        let mut md = self.analyzed(path);
        if let Some(format) = format {
            md.insert("format".into(), format!("{format:?}").to_uppercase().into());
        }
        md.insert("width".into(), img.width().into());
        md.insert("height".into(), img.height().into());
        md.insert("color_type".into(), format!("{color:?}").into());
        md.insert("bits_per_pixel".into(), color.bits_per_pixel().into());
        md.insert("channels".into(), color.channel_count().into());
        md.insert("has_alpha".into(), color.has_alpha().into());
        if img.height() > 0 {
            let ratio = f64::from(img.width()) / f64::from(img.height());
            md.insert("aspect_ratio".into(), ratio.into());
        }
        md.insert("file_size".into(), fs::metadata(path)?.len().into());

        if format == Some(ImageFormat::Jpeg) {
            let iptc = iptc::read_jpeg_iptc(&fs::read(path)?);
            if !iptc.is_empty() {
                md.insert("iptc".into(), RawValue::Map(iptc));
            }
        }
        Ok(md)
    }

    fn thumbnails(
        &self,
        path: &Path,
        base_name: &str,
        out_dir: Option<&Path>,
    ) -> Result<Option<Vec<ThumbnailPair>>, ExtractError> {
        let img = open_guessed(path)?.decode()?;
        let (width, height) = fit_within(img.width(), img.height(), self.max_size);
        let preview = if (width, height) == (img.width(), img.height()) {
            img
        } else {
            img.resize_exact(width, height, FilterType::Lanczos3)
        };

        let (format, ext) = preview_format(&naming::file_name(path));
        let dir: PathBuf = match out_dir {
            Some(dir) => dir.to_path_buf(),
            None => path.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        let out = dir.join(format!("{base_name}.{ext}"));

        // JPEG has no alpha channel.
        let preview = match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(preview.to_rgb8()),
            _ => preview,
        };
        let file = OpenOptions::new().write(true).create_new(true).open(&out)?;
        let mut writer = BufWriter::new(file);
        preview.write_to(&mut writer, format)?;
        writer.flush()?;
        debug!(source = %path.display(), thumbnail = %out.display(), width, height, "thumbnail written");

        Ok(Some(vec![ThumbnailPair::new(THUMBNAIL_LABEL, out)]))
    }
}
