//! Shared test utilities for the catalog-mirror test suite.
//!
//! Provides fixture builders (images, a small instrument tree), the stock
//! extractor registry, a canned content analyzer, recording/failing uploaders
//! that stand in for a public thumbnail host, and a one-shot local HTTP
//! server for the blocking clients.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! instrument_tree(tmp.path());
//! let registry = stock_registry();
//! let uploader = RecordingUploader::new("https://cdn.test");
//! ```

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread::JoinHandle;

use serde_json::{Map, Value};

use crate::config::MirrorConfig;
use crate::extract::{ContentAnalyzer, ExtractError, ExtractorRegistry};
use crate::publish::{PublicUploader, UploadError};

// =========================================================================
// Fixture setup
// =========================================================================

/// Write an RGB PNG with a horizontal gradient.
pub fn write_png(path: &Path, width: u32, height: u32) {
    gradient(width, height)
        .save_with_format(path, image::ImageFormat::Png)
        .unwrap();
}

/// Write an RGB JPEG, whatever the file extension says.
pub fn write_jpeg(path: &Path, width: u32, height: u32) {
    gradient(width, height)
        .save_with_format(path, image::ImageFormat::Jpeg)
        .unwrap();
}

fn gradient(width: u32, height: u32) -> image::RgbImage {
    image::RgbImage::from_fn(width, height, |x, _| {
        let v = (x * 255 / width.max(1)) as u8;
        image::Rgb([v, v, 128])
    })
}

/// Build a small instrument share under `root`:
///
/// ```text
/// root/
/// ├── notes.txt
/// ├── run-a/
/// │   ├── metadata.json     {"sample": "steel-7", "operator": "jd"}
/// │   ├── frame.png
/// │   ├── raw/
/// │   │   └── 0001.bin
/// │   └── spectrum.csv
/// └── run-b/
///     └── log.txt
/// ```
pub fn instrument_tree(root: &Path) -> PathBuf {
    let run_a = root.join("run-a");
    let run_b = root.join("run-b");
    std::fs::create_dir_all(run_a.join("raw")).unwrap();
    std::fs::create_dir_all(&run_b).unwrap();

    std::fs::write(root.join("notes.txt"), "top-level notes").unwrap();
    std::fs::write(
        run_a.join("metadata.json"),
        r#"{"sample": "steel-7", "operator": "jd"}"#,
    )
    .unwrap();
    write_png(&run_a.join("frame.png"), 64, 32);
    std::fs::write(run_a.join("raw/0001.bin"), [0u8, 1, 2, 3]).unwrap();
    std::fs::write(run_a.join("spectrum.csv"), "ev,counts\n1,2\n").unwrap();
    std::fs::write(run_b.join("log.txt"), "ok").unwrap();
    root.to_path_buf()
}

/// Image + generic extractors with default settings and no analyzer.
pub fn stock_registry() -> ExtractorRegistry {
    ExtractorRegistry::from_config(&MirrorConfig::default()).unwrap()
}

// =========================================================================
// Analyzers
// =========================================================================

/// Answers every file with the same JSON. Anything but an object is treated
/// as a bad server response.
pub struct CannedAnalyzer(pub Value);

impl ContentAnalyzer for CannedAnalyzer {
    fn analyze(&self, _path: &Path) -> Result<Map<String, Value>, ExtractError> {
        match &self.0 {
            Value::Object(map) => Ok(map.clone()),
            other => Err(ExtractError::UnexpectedResponse(other.to_string())),
        }
    }
}

// =========================================================================
// Uploaders
// =========================================================================

/// Records uploaded paths and serves them under `base_url/<file name>`.
pub struct RecordingUploader {
    base_url: String,
    uploads: Mutex<Vec<PathBuf>>,
}

impl RecordingUploader {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn uploaded(&self) -> Vec<PathBuf> {
        self.uploads.lock().unwrap().clone()
    }
}

impl PublicUploader for RecordingUploader {
    fn upload_public_file(&self, path: &Path) -> Result<String, UploadError> {
        assert!(path.exists(), "uploading missing file {}", path.display());
        self.uploads.lock().unwrap().push(path.to_path_buf());
        let name = path.file_name().unwrap().to_string_lossy();
        Ok(format!("{}/{}", self.base_url, name))
    }
}

/// Succeeds for the first `n` uploads, then fails every call.
pub struct FailingUploader {
    remaining: Mutex<usize>,
}

impl FailingUploader {
    pub fn after(n: usize) -> Self {
        Self {
            remaining: Mutex::new(n),
        }
    }
}

impl PublicUploader for FailingUploader {
    fn upload_public_file(&self, path: &Path) -> Result<String, UploadError> {
        let mut remaining = self.remaining.lock().unwrap();
        if *remaining == 0 {
            return Err(UploadError::Io(std::io::Error::other("host unavailable")));
        }
        *remaining -= 1;
        Ok(format!("https://ok.test/{}", path.display()))
    }
}

// =========================================================================
// Local HTTP server
// =========================================================================

/// Accepts a single connection on `127.0.0.1`, captures the raw request and
/// answers with a fixed response.
pub struct OneShotServer {
    pub url: String,
    handle: JoinHandle<String>,
}

impl OneShotServer {
    pub fn respond(status: &str, content_type: &str, body: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            stream.write_all(response.as_bytes()).unwrap();
            request
        });
        Self { url, handle }
    }

    /// The request the server received, headers and body.
    pub fn request(self) -> String {
        self.handle.join().unwrap()
    }
}

fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
        if head.contains("transfer-encoding: chunked") {
            if buf.ends_with(b"0\r\n\r\n") {
                break;
            }
            continue;
        }
        let length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= end + 4 + length {
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
