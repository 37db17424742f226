//! Shared types for the bitrace pipeline.

use serde::{Deserialize, Serialize};

use crate::calibrate::CalibrationError;

/// Re-export `RgbaImage` so downstream crates can build buffers
/// without depending on `image` directly.
pub use image::RgbaImage;

/// A 2D point in image coordinates.
///
/// Traced coordinates live on the pixel-corner grid: `(0, 0)` is the
/// top-left corner of the top-left pixel and `+y` points down.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Multiply each axis by its own factor.
    #[must_use]
    pub fn scaled(self, sx: f64, sy: f64) -> Self {
        Self::new(self.x * sx, self.y * sy)
    }

    /// Point on the segment `self -> other` at parameter `lambda`.
    #[must_use]
    pub fn lerp(self, other: Self, lambda: f64) -> Self {
        Self::new(
            lambda.mul_add(other.x - self.x, self.x),
            lambda.mul_add(other.y - self.y, self.y),
        )
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Total number of pixels.
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Real-world size of a source image, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalSize {
    /// Width in millimetres.
    pub width_mm: f64,
    /// Height in millimetres.
    pub height_mm: f64,
}

impl PhysicalSize {
    /// Create a new physical size.
    #[must_use]
    pub const fn new(width_mm: f64, height_mm: f64) -> Self {
        Self {
            width_mm,
            height_mm,
        }
    }

    /// Physical size of an image at a fixed resolution in dots per inch.
    #[must_use]
    pub fn from_dpi(dimensions: Dimensions, dpi: f64) -> Self {
        let mm_per_dot = 25.4 / dpi;
        Self::new(
            f64::from(dimensions.width) * mm_per_dot,
            f64::from(dimensions.height) * mm_per_dot,
        )
    }
}

/// An immutable 8-bit RGBA pixel buffer.
///
/// There is no mutable access to the samples: every pipeline stage
/// that changes pixels produces a new buffer, so a buffer handed to one
/// stage can never be modified underneath another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer(RgbaImage);

impl PixelBuffer {
    /// Wrap a decoded RGBA image.
    #[must_use]
    pub const fn new(image: RgbaImage) -> Self {
        Self(image)
    }

    /// Build a buffer from raw RGBA samples.
    ///
    /// Returns `None` if `samples.len() != width * height * 4`.
    #[must_use]
    pub fn from_raw(width: u32, height: u32, samples: Vec<u8>) -> Option<Self> {
        RgbaImage::from_raw(width, height, samples).map(Self)
    }

    /// Build a buffer by evaluating `f` at every pixel.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> [u8; 4]) -> Self {
        Self(RgbaImage::from_fn(width, height, |x, y| image::Rgba(f(x, y))))
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.0.height()
    }

    /// Pixel dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.0.width(),
            height: self.0.height(),
        }
    }

    /// RGBA samples of one pixel.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.0.get_pixel(x, y).0
    }

    /// The underlying image, read-only.
    #[must_use]
    pub const fn image(&self) -> &RgbaImage {
        &self.0
    }

    /// Raw interleaved RGBA samples, row-major.
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        self.0.as_raw()
    }

    /// Consume the buffer and return the underlying image.
    #[must_use]
    pub fn into_image(self) -> RgbaImage {
        self.0
    }
}

/// Serde-compatible proxy for `PixelBuffer`.
///
/// `image::ImageBuffer` does not implement serde traits, so the
/// buffer crosses serialization boundaries as
/// `(width, height, raw_pixel_bytes)`.
#[derive(Serialize, Deserialize)]
struct PixelBufferProxy(u32, u32, Vec<u8>);

impl Serialize for PixelBuffer {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PixelBufferProxy(self.width(), self.height(), self.as_raw().to_vec()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PixelBuffer {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let PixelBufferProxy(width, height, raw) = PixelBufferProxy::deserialize(deserializer)?;
        Self::from_raw(width, height, raw)
            .ok_or_else(|| serde::de::Error::custom("invalid RGBA buffer dimensions"))
    }
}

/// Errors that can occur while loading a source image.
///
/// Uses custom `Serialize`/`Deserialize` because `image::ImageError`
/// does not implement serde traits. The `ImageDecode` variant is
/// serialized as its `Display` string.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// The image reference is not something the loader can read
    /// (e.g. a remote URL instead of a `data:` URL).
    #[error("unsupported image source: {0}")]
    UnsupportedSource(String),

    /// A `data:` URL was malformed or its payload was not valid base64.
    #[error("invalid data URL: {0}")]
    InvalidDataUrl(String),

    /// Configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Pixel or physical extents could not be used for calibration.
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}

/// Serde-compatible proxy for `PipelineError`.
#[derive(Serialize, Deserialize)]
enum PipelineErrorProxy {
    ImageDecode(String),
    EmptyInput,
    UnsupportedSource(String),
    InvalidDataUrl(String),
    InvalidConfig(String),
    Calibration(CalibrationError),
}

impl Serialize for PipelineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::ImageDecode(e) => PipelineErrorProxy::ImageDecode(e.to_string()),
            Self::EmptyInput => PipelineErrorProxy::EmptyInput,
            Self::UnsupportedSource(s) => PipelineErrorProxy::UnsupportedSource(s.clone()),
            Self::InvalidDataUrl(s) => PipelineErrorProxy::InvalidDataUrl(s.clone()),
            Self::InvalidConfig(s) => PipelineErrorProxy::InvalidConfig(s.clone()),
            Self::Calibration(e) => PipelineErrorProxy::Calibration(e.clone()),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipelineError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = PipelineErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            // The typed image::ImageError cannot be rebuilt; keep the message.
            PipelineErrorProxy::ImageDecode(msg) => {
                Self::InvalidConfig(format!("image decode error: {msg}"))
            }
            PipelineErrorProxy::EmptyInput => Self::EmptyInput,
            PipelineErrorProxy::UnsupportedSource(s) => Self::UnsupportedSource(s),
            PipelineErrorProxy::InvalidDataUrl(s) => Self::InvalidDataUrl(s),
            PipelineErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
            PipelineErrorProxy::Calibration(e) => Self::Calibration(e),
        })
    }
}
