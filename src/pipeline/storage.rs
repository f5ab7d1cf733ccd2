//! Run sessions and sequential frame files.
//!
//! A run session is a directory named after the moment it was created,
//! holding an `images/` subdirectory. Frames land there as
//! `frame_NNNNNN.<ext>` with a six-digit, zero-padded index.

use crate::capture::{Frame, FrameFileFormat, StorageConfig};
use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageError};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// `strftime` pattern used for session directory names.
pub const SESSION_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Name of the frame directory inside a session.
pub const IMAGES_DIR: &str = "images";

/// Errors that can occur while persisting frames.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Session directory could not be created.
    #[error("failed to create {}: {source}", path.display())]
    CreateDir {
        /// Path that was being created or written.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The encoder rejected the frame.
    #[error("failed to encode frame: {0}")]
    Encode(String),
    /// Frame file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        /// Path that was being created or written.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Filesystem scope of one acquisition run.
#[derive(Debug, Clone)]
pub struct RunSession {
    name: String,
    root: PathBuf,
    images_dir: PathBuf,
}

impl RunSession {
    /// Creates a session under `base_dir` named after the current local time.
    pub fn create(base_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::create_at(base_dir, Local::now())
    }

    /// Creates a session under `base_dir` named after `started`.
    ///
    /// An existing directory of the same name is reused.
    pub fn create_at(
        base_dir: impl AsRef<Path>,
        started: DateTime<Local>,
    ) -> Result<Self, StorageError> {
        let name = started.format(SESSION_TIMESTAMP_FORMAT).to_string();
        let root = base_dir.as_ref().join(&name);
        let images_dir = root.join(IMAGES_DIR);

        std::fs::create_dir_all(&images_dir).map_err(|source| StorageError::CreateDir {
            path: images_dir.clone(),
            source,
        })?;

        tracing::info!(session = %root.display(), "Session folder ready");
        Ok(Self {
            name,
            root,
            images_dir,
        })
    }

    /// Directory name (the creation timestamp).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Session directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory saved frames are written to.
    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }
}

/// File name for the frame persisted at `index`.
pub fn frame_file_name(index: u64, format: FrameFileFormat) -> String {
    format!("frame_{:06}.{}", index, format.extension())
}

/// Destination for persisted frames.
pub trait FrameSink: Send {
    /// Writes `frame` into slot `index` and returns where it went.
    fn persist(&mut self, frame: &Frame, index: u64) -> Result<PathBuf, StorageError>;
}

/// Writes frames as single-channel image files into a session's image directory.
#[derive(Debug, Clone)]
pub struct ImageDirectory {
    dir: PathBuf,
    format: FrameFileFormat,
    jpeg_quality: u8,
}

impl ImageDirectory {
    /// Writes into `session`'s image directory.
    pub fn new(session: &RunSession, config: &StorageConfig) -> Self {
        Self::in_dir(session.images_dir(), config)
    }

    /// Writes into an arbitrary existing directory.
    pub fn in_dir(dir: impl Into<PathBuf>, config: &StorageConfig) -> Self {
        Self {
            dir: dir.into(),
            format: config.image_format,
            jpeg_quality: config.jpeg_quality.clamp(1, 100),
        }
    }

    /// Full path for slot `index`.
    pub fn path_for(&self, index: u64) -> PathBuf {
        self.dir.join(frame_file_name(index, self.format))
    }

    fn encode(&self, frame: &Frame, writer: &mut BufWriter<File>) -> Result<(), ImageError> {
        let (width, height) = (frame.width(), frame.height());
        match self.format {
            FrameFileFormat::Jpeg => JpegEncoder::new_with_quality(writer, self.jpeg_quality)
                .encode(frame.pixels(), width, height, ExtendedColorType::L8),
            FrameFileFormat::Png => {
                PngEncoder::new(writer).write_image(frame.pixels(), width, height, ExtendedColorType::L8)
            }
        }
    }
}

impl FrameSink for ImageDirectory {
    fn persist(&mut self, frame: &Frame, index: u64) -> Result<PathBuf, StorageError> {
        if !frame.is_valid() {
            return Err(StorageError::Encode(format!(
                "{} pixel bytes do not fill {}x{}",
                frame.pixels().len(),
                frame.width(),
                frame.height()
            )));
        }

        let path = self.path_for(index);
        let write_error = |source| StorageError::Write {
            path: path.clone(),
            source,
        };

        let file = File::create(&path).map_err(write_error)?;
        let mut writer = BufWriter::new(file);
        let written = self
            .encode(frame, &mut writer)
            .map_err(|e| match e {
                ImageError::IoError(source) => write_error(source),
                other => StorageError::Encode(other.to_string()),
            })
            .and_then(|()| writer.flush().map_err(write_error));

        if let Err(e) = written {
            // A file on disk must always be a complete frame.
            drop(writer);
            discard_partial(&path);
            return Err(e);
        }
        Ok(path)
    }
}

fn discard_partial(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial frame file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn gradient(width: u32, height: u32) -> Frame {
        let pixels: Vec<u8> = (0..width * height).map(|i| (i % 256) as u8).collect();
        Frame::new(pixels, width, height, 0)
    }

    #[test]
    fn test_frame_file_name() {
        assert_eq!(frame_file_name(0, FrameFileFormat::Jpeg), "frame_000000.jpg");
        assert_eq!(frame_file_name(42, FrameFileFormat::Png), "frame_000042.png");
        assert_eq!(frame_file_name(1_234_567, FrameFileFormat::Jpeg), "frame_1234567.jpg");
    }

    #[test]
    fn test_session_layout() {
        let base = tempfile::tempdir().unwrap();
        let started = Local.with_ymd_and_hms(2025, 10, 6, 21, 15, 32).unwrap();

        let session = RunSession::create_at(base.path(), started).unwrap();

        assert_eq!(session.name(), "2025-10-06_21-15-32");
        assert_eq!(session.root(), base.path().join("2025-10-06_21-15-32"));
        assert_eq!(session.images_dir(), session.root().join("images"));
        assert!(session.images_dir().is_dir());

        // Same second again: directory is reused.
        assert!(RunSession::create_at(base.path(), started).is_ok());
    }

    #[test]
    fn test_session_under_file_fails() {
        let base = tempfile::tempdir().unwrap();
        let blocker = base.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let err = RunSession::create(&blocker).unwrap_err();
        assert!(matches!(err, StorageError::CreateDir { .. }));
    }

    #[test]
    fn test_jpeg_written_as_grayscale() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ImageDirectory::in_dir(dir.path(), &StorageConfig::default());

        let path = sink.persist(&gradient(64, 48), 7).unwrap();

        assert_eq!(path, dir.path().join("frame_000007.jpg"));
        let decoded = image::open(&path).unwrap();
        assert_eq!(decoded.width(), 64);
        assert_eq!(decoded.height(), 48);
        assert_eq!(decoded.color(), image::ColorType::L8);
    }

    #[test]
    fn test_png_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            image_format: FrameFileFormat::Png,
            ..Default::default()
        };
        let mut sink = ImageDirectory::in_dir(dir.path(), &config);
        let frame = gradient(16, 8);

        let path = sink.persist(&frame, 0).unwrap();

        let decoded = image::open(&path).unwrap().into_luma8();
        assert_eq!(decoded.as_raw().as_slice(), frame.pixels());
    }

    #[test]
    fn test_invalid_frame_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ImageDirectory::in_dir(dir.path(), &StorageConfig::default());
        let frame = Frame::new(vec![0u8; 10], 64, 48, 0);

        assert!(matches!(sink.persist(&frame, 0), Err(StorageError::Encode(_))));
        assert!(!sink.path_for(0).exists());
    }

    #[test]
    fn test_missing_directory_is_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink =
            ImageDirectory::in_dir(dir.path().join("gone"), &StorageConfig::default());

        let err = sink.persist(&gradient(8, 8), 0).unwrap_err();
        assert!(matches!(err, StorageError::Write { .. }));
        assert!(err.to_string().contains("frame_000000.jpg"));
    }

    #[test]
    fn test_rejected_encode_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ImageDirectory::in_dir(dir.path(), &StorageConfig::default());
        // Valid Mono8 buffer, but wider than JPEG allows.
        let frame = Frame::new(vec![0u8; 70_000], 70_000, 1, 0);

        assert!(sink.persist(&frame, 0).is_err());
        assert!(!sink.path_for(0).exists());
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
