//! Frame type representing a captured image with metadata.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Pixel encoding of a captured frame.
///
/// Only single-channel 8-bit is supported; frames are passed through
/// to the preview and storage sinks without conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// One unsigned byte per pixel.
    #[default]
    Mono8,
}

impl PixelFormat {
    /// Bytes used by a single pixel.
    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Mono8 => 1,
        }
    }
}

/// A single frame retrieved from the imaging device.
///
/// Pixels live behind an `Arc`, so handing the frame to both the
/// preview buffer and the storage path shares one allocation.
/// Frames are read-only once created.
#[derive(Clone)]
pub struct Frame {
    /// Raw Mono8 pixel data, row-major.
    pixels: Arc<[u8]>,
    /// Frame width in pixels.
    width: u32,
    /// Frame height in pixels.
    height: u32,
    /// Retrieval timestamp.
    timestamp: Instant,
    /// Sequence number assigned by the source.
    sequence: u64,
}

impl Frame {
    /// Creates a new frame stamped with the current instant.
    pub fn new(pixels: impl Into<Arc<[u8]>>, width: u32, height: u32, sequence: u64) -> Self {
        Self::with_timestamp(pixels, width, height, sequence, Instant::now())
    }

    /// Creates a new frame with an explicit capture instant.
    pub fn with_timestamp(
        pixels: impl Into<Arc<[u8]>>,
        width: u32,
        height: u32,
        sequence: u64,
        timestamp: Instant,
    ) -> Self {
        Self {
            pixels: pixels.into(),
            width,
            height,
            timestamp,
            sequence,
        }
    }

    /// Returns a reference to the raw pixel data.
    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Returns the frame width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the frame height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the capture timestamp.
    #[inline]
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Returns the sequence number.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Always `Mono8`.
    #[inline]
    pub fn pixel_format(&self) -> PixelFormat {
        PixelFormat::Mono8
    }

    /// Returns the total number of pixels (width * height).
    #[inline]
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Validates that the pixel buffer size matches dimensions.
    pub fn is_valid(&self) -> bool {
        self.pixels.len() == self.pixel_count() * self.pixel_format().bytes_per_pixel()
    }

    /// True when `other` shares this frame's pixel allocation.
    pub fn shares_pixels(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("pixel_bytes", &self.pixels.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation() {
        let pixels = vec![0u8; 640 * 480];
        let frame = Frame::new(pixels, 640, 480, 1);

        assert_eq!(frame.width(), 640);
        assert_eq!(frame.height(), 480);
        assert_eq!(frame.sequence(), 1);
        assert_eq!(frame.pixel_format(), PixelFormat::Mono8);
        assert!(frame.is_valid());
    }

    #[test]
    fn test_frame_invalid_size() {
        let pixels = vec![0u8; 100]; // Wrong size
        let frame = Frame::new(pixels, 640, 480, 1);

        assert!(!frame.is_valid());
    }

    #[test]
    fn test_clone_shares_pixels() {
        let frame = Frame::new(vec![7u8; 16], 4, 4, 3);
        let copy = frame.clone();

        assert!(frame.shares_pixels(&copy));
        assert_eq!(copy.pixels(), frame.pixels());
    }

    #[test]
    fn test_pixel_format_from_toml_name() {
        #[derive(Deserialize)]
        struct Wrapper {
            format: PixelFormat,
        }
        let parsed: Wrapper = toml::from_str("format = \"mono8\"").unwrap();
        assert_eq!(parsed.format, PixelFormat::Mono8);
        assert!(toml::from_str::<Wrapper>("format = \"rgb8\"").is_err());
    }
}
