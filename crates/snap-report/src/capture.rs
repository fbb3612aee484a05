//! Screenshot Capture Adapter
//!
//! Asks the worker's browser session for a raster capture, saves it as
//! `Screenshot_<ddMMyyyy_HHmmss>.png` and keeps a base64 copy so the report can
//! embed the image without depending on the saved file.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  capture_png()  ┌──────────────────┐   attachment()   ┌───────────┐
//! │ BrowserSession   │────────────────►│ ScreenshotCapture│─────────────────►│ TestEntry │
//! │ (driver-provided)│                 │  save + encode   │                  │           │
//! └──────────────────┘                 └──────────────────┘                  └───────────┘
//!                                               │
//!                                               ▼
//!                                   Screenshots/Screenshot_<stamp>.png
//! ```
//!
//! Capture failures never reach the test: [`ScreenshotCapture::capture_or_warn`]
//! logs a warning and returns `None`.

use crate::entry::Attachment;
use crate::folders;
use crate::result::{ReportError, ReportResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Local};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Timestamp layout used in screenshot and report file names
pub const FILE_STAMP_FORMAT: &str = "%d%m%Y_%H%M%S";

/// Browser capability consumed by the capture adapter
///
/// Implemented by whatever drives the browser. Element location, clicking and
/// typing live elsewhere; the reporter only ever asks for pixels.
pub trait BrowserSession: Send + Sync {
    /// Capture the current view as PNG bytes
    fn capture_png(&self) -> ReportResult<Vec<u8>>;

    /// Capture the current view as a base64 string.
    ///
    /// Drivers whose protocol already returns base64 can override this to
    /// skip a decode/encode pair.
    fn capture_base64(&self) -> ReportResult<String> {
        Ok(STANDARD.encode(self.capture_png()?))
    }
}

/// A screenshot that was taken and (usually) saved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedScreenshot {
    /// Saved file, or `None` if writing it failed
    pub path: Option<PathBuf>,
    /// Base64-encoded PNG for inline embedding
    pub base64: String,
    /// Size of the raw PNG in bytes
    pub size_bytes: usize,
    /// When the capture was taken
    pub taken_at: DateTime<Local>,
}

impl CapturedScreenshot {
    /// Attachment that embeds this screenshot in a log record
    #[must_use]
    pub fn attachment(&self) -> Attachment {
        Attachment::png(self.base64.clone(), self.path.clone())
    }

    /// File name of the saved copy
    #[must_use]
    pub fn file_name(&self) -> Option<String> {
        self.path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
    }
}

/// Takes screenshots into a directory
#[derive(Debug, Clone)]
pub struct ScreenshotCapture {
    dir: PathBuf,
}

impl ScreenshotCapture {
    /// Create an adapter writing into `dir`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory screenshots are written to
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Capture the session's current view
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Capture`] if the session cannot produce an image.
    /// Failing to save the file is not an error: the screenshot is still
    /// returned with `path: None` so it can be embedded.
    pub fn capture(&self, session: &dyn BrowserSession) -> ReportResult<CapturedScreenshot> {
        self.capture_at(session, Local::now())
    }

    /// Capture with an explicit timestamp for the file name
    ///
    /// # Errors
    ///
    /// See [`ScreenshotCapture::capture`].
    pub fn capture_at(
        &self,
        session: &dyn BrowserSession,
        now: DateTime<Local>,
    ) -> ReportResult<CapturedScreenshot> {
        let data = session.capture_png()?;
        if data.is_empty() {
            return Err(ReportError::capture("browser returned an empty image"));
        }

        let path = match self.save(&data, now) {
            Ok(path) => {
                tracing::info!("Screenshot captured: {}", path.display());
                Some(path)
            }
            Err(e) => {
                tracing::warn!(
                    "Screenshot could not be saved to {}: {e}",
                    self.dir.display()
                );
                None
            }
        };

        Ok(CapturedScreenshot {
            path,
            base64: STANDARD.encode(&data),
            size_bytes: data.len(),
            taken_at: now,
        })
    }

    /// Capture, logging and swallowing any failure
    pub fn capture_or_warn(&self, session: &dyn BrowserSession) -> Option<CapturedScreenshot> {
        match self.capture(session) {
            Ok(shot) => Some(shot),
            Err(e) => {
                tracing::warn!("{e}");
                None
            }
        }
    }

    fn save(&self, data: &[u8], now: DateTime<Local>) -> ReportResult<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let stamp = now.format(FILE_STAMP_FORMAT).to_string();
        let (path, mut file) = folders::create_unique(&self.dir, "Screenshot", &stamp, "png")?;
        file.write_all(data)?;
        Ok(path)
    }
}

/// 1x1 transparent PNG used by [`MockSession::new`]
const MOCK_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

/// Browser session double for tests
#[derive(Debug, Default)]
pub struct MockSession {
    png: Option<Vec<u8>>,
    captures: AtomicUsize,
}

impl MockSession {
    /// Session that returns a 1x1 PNG
    #[must_use]
    pub fn new() -> Self {
        Self::with_png(MOCK_PNG.to_vec())
    }

    /// Session that returns the given bytes
    #[must_use]
    pub fn with_png(png: Vec<u8>) -> Self {
        Self {
            png: Some(png),
            captures: AtomicUsize::new(0),
        }
    }

    /// Session whose browser has already gone away
    #[must_use]
    pub fn closed() -> Self {
        Self::default()
    }

    /// Number of capture requests received
    #[must_use]
    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

impl BrowserSession for MockSession {
    fn capture_png(&self) -> ReportResult<Vec<u8>> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        self.png
            .clone()
            .ok_or_else(|| ReportError::capture("no active browser session"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 7, 14, 5, 9).unwrap()
    }

    mod capture_tests {
        use super::*;

        #[test]
        fn test_capture_writes_timestamped_png() {
            let dir = TempDir::new().unwrap();
            let capture = ScreenshotCapture::new(dir.path());
            let session = MockSession::new();

            let shot = capture.capture_at(&session, fixed_time()).unwrap();

            assert_eq!(shot.file_name().unwrap(), "Screenshot_07032024_140509.png");
            let saved = std::fs::read(shot.path.as_ref().unwrap()).unwrap();
            assert_eq!(saved, MOCK_PNG);
            assert_eq!(shot.size_bytes, MOCK_PNG.len());
            assert_eq!(session.captures(), 1);
        }

        #[test]
        fn test_same_second_does_not_overwrite() {
            let dir = TempDir::new().unwrap();
            let capture = ScreenshotCapture::new(dir.path());
            let session = MockSession::new();

            let first = capture.capture_at(&session, fixed_time()).unwrap();
            let second = capture.capture_at(&session, fixed_time()).unwrap();

            assert_ne!(first.path, second.path);
            assert_eq!(
                second.file_name().unwrap(),
                "Screenshot_07032024_140509_1.png"
            );
        }

        #[test]
        fn test_base64_matches_bytes() {
            let dir = TempDir::new().unwrap();
            let capture = ScreenshotCapture::new(dir.path());
            let session = MockSession::with_png(vec![1, 2, 3]);

            let shot = capture.capture(&session).unwrap();
            assert_eq!(STANDARD.decode(&shot.base64).unwrap(), vec![1, 2, 3]);
        }

        #[test]
        fn test_creates_missing_directory() {
            let dir = TempDir::new().unwrap();
            let nested = dir.path().join("Screenshots").join("run");
            let capture = ScreenshotCapture::new(&nested);

            let shot = capture.capture(&MockSession::new()).unwrap();
            assert!(shot.path.unwrap().starts_with(&nested));
        }

        #[test]
        fn test_closed_session_is_capture_error() {
            let dir = TempDir::new().unwrap();
            let capture = ScreenshotCapture::new(dir.path());

            let err = capture.capture(&MockSession::closed()).unwrap_err();
            assert!(matches!(err, ReportError::Capture { .. }));
            assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        }

        #[test]
        fn test_empty_image_is_capture_error() {
            let dir = TempDir::new().unwrap();
            let capture = ScreenshotCapture::new(dir.path());

            let err = capture.capture(&MockSession::with_png(Vec::new())).unwrap_err();
            assert!(matches!(err, ReportError::Capture { .. }));
        }

        #[test]
        fn test_default_base64_capture() {
            let session = MockSession::with_png(vec![0xde, 0xad]);
            assert_eq!(session.capture_base64().unwrap(), "3q0=");
            assert!(MockSession::closed().capture_base64().is_err());
        }

        #[test]
        fn test_capture_or_warn_swallows_failure() {
            let dir = TempDir::new().unwrap();
            let capture = ScreenshotCapture::new(dir.path());
            assert!(capture.capture_or_warn(&MockSession::closed()).is_none());
        }

        #[test]
        fn test_unwritable_dir_still_embeds() {
            let dir = TempDir::new().unwrap();
            let blocker = dir.path().join("not-a-dir");
            std::fs::write(&blocker, b"file").unwrap();
            let capture = ScreenshotCapture::new(&blocker);

            let shot = capture.capture(&MockSession::new()).unwrap();
            assert!(shot.path.is_none());
            assert!(!shot.base64.is_empty());
        }
    }

    mod attachment_tests {
        use super::*;

        #[test]
        fn test_attachment_is_inline_png() {
            let shot = CapturedScreenshot {
                path: Some(PathBuf::from("Screenshots/a.png")),
                base64: "AAAA".to_string(),
                size_bytes: 3,
                taken_at: fixed_time(),
            };
            match shot.attachment() {
                Attachment::Image {
                    mime_type,
                    base64,
                    path,
                } => {
                    assert_eq!(mime_type, "image/png");
                    assert_eq!(base64, "AAAA");
                    assert_eq!(path, Some(PathBuf::from("Screenshots/a.png")));
                }
                other => panic!("expected image, got {other:?}"),
            }
        }
    }
}
