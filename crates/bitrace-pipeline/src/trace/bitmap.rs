//! Binarized bitmaps for boundary decomposition.

use crate::types::PixelBuffer;

/// Luminance below which a pixel counts as foreground.
pub const FOREGROUND_THRESHOLD: f64 = 128.0;

/// A two-colour bitmap. `true` is foreground.
///
/// Coordinates are signed so that neighbourhood probes may step outside
/// the image; everything outside reads as background.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: i64,
    height: i64,
    bits: Vec<bool>,
}

impl Bitmap {
    /// An all-background bitmap.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: i64::from(width),
            height: i64::from(height),
            bits: vec![false; width as usize * height as usize],
        }
    }

    /// Threshold a pixel buffer.
    ///
    /// Each pixel's BT.709 luminance is composited over white by its
    /// alpha, so fully transparent pixels are always background.
    #[must_use]
    pub fn binarize(buffer: &PixelBuffer) -> Self {
        let bits = buffer
            .as_raw()
            .chunks_exact(4)
            .map(|px| {
                let [r, g, b, a] = [px[0], px[1], px[2], px[3]].map(f64::from);
                let luma = 0.0721f64.mul_add(b, 0.2126f64.mul_add(r, 0.7153 * g));
                let alpha = a / 255.0;
                let composited = alpha.mul_add(luma, (1.0 - alpha) * 255.0);
                composited < FOREGROUND_THRESHOLD
            })
            .collect();
        Self {
            width: i64::from(buffer.width()),
            height: i64::from(buffer.height()),
            bits,
        }
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> i64 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> i64 {
        self.height
    }

    fn index(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        usize::try_from(y * self.width + x).ok()
    }

    /// Whether `(x, y)` is foreground. Out-of-range reads are background.
    #[must_use]
    pub fn at(&self, x: i64, y: i64) -> bool {
        self.index(x, y).is_some_and(|i| self.bits[i])
    }

    /// Set one pixel. Out-of-range writes are ignored.
    pub fn set(&mut self, x: i64, y: i64, value: bool) {
        if let Some(i) = self.index(x, y) {
            self.bits[i] = value;
        }
    }

    /// Invert one pixel. Out-of-range writes are ignored.
    pub fn flip(&mut self, x: i64, y: i64) {
        if let Some(i) = self.index(x, y) {
            self.bits[i] = !self.bits[i];
        }
    }

    /// Number of foreground pixels.
    #[must_use]
    pub fn count(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    /// Whether every pixel has the same colour (including the empty bitmap).
    #[must_use]
    pub fn is_uniform(&self) -> bool {
        self.bits.windows(2).all(|w| w[0] == w[1])
    }

    /// The first foreground pixel at or after `(x, y)` in row-major order.
    #[must_use]
    pub fn next_set(&self, x: i64, y: i64) -> Option<(i64, i64)> {
        let start = self.index(x, y)?;
        let offset = self.bits[start..].iter().position(|&b| b)?;
        let i = i64::try_from(start + offset).ok()?;
        Some((i % self.width, i / self.width))
    }
}
