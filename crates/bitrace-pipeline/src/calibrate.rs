//! Unit calibration: pixel-space contours to physical units.
//!
//! The X and Y scale factors are computed independently, so sources with
//! non-square pixels keep their physical aspect ratio. The calibrated
//! document remembers the pixel extents for the `viewBox` and the
//! physical size for the declared width and height; the two aspect
//! ratios are allowed to differ.

use serde::{Deserialize, Serialize};

use crate::contour::VectorContour;
use crate::types::{Dimensions, PhysicalSize};

/// Errors from [`calibrate`].
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum CalibrationError {
    /// The source image has no pixels along one axis.
    #[error("pixel extent must be non-zero, got {width}x{height}")]
    ZeroPixelExtent {
        /// Pixel width.
        width: u32,
        /// Pixel height.
        height: u32,
    },

    /// The physical size is zero, negative, or not finite.
    #[error("physical size must be finite and positive, got {width_mm}mm x {height_mm}mm")]
    InvalidPhysicalSize {
        /// Width in millimetres.
        width_mm: f64,
        /// Height in millimetres.
        height_mm: f64,
    },
}

/// Millimetres per pixel along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    /// Horizontal factor.
    pub x: f64,
    /// Vertical factor.
    pub y: f64,
}

/// Contours rewritten into physical units, plus the extents needed to
/// declare the drawing's coordinate system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedDocument {
    contours: Vec<VectorContour>,
    scale: Scale,
    pixels: Dimensions,
    physical: PhysicalSize,
}

impl CalibratedDocument {
    /// The calibrated contours, in trace order.
    #[must_use]
    pub fn contours(&self) -> &[VectorContour] {
        &self.contours
    }

    /// Scale factors applied to every coordinate.
    #[must_use]
    pub const fn scale(&self) -> Scale {
        self.scale
    }

    /// Source pixel extents.
    #[must_use]
    pub const fn pixel_extent(&self) -> Dimensions {
        self.pixels
    }

    /// Declared physical size.
    #[must_use]
    pub const fn physical_size(&self) -> PhysicalSize {
        self.physical
    }

    /// `"0 0 <width> <height>"` in unscaled pixels.
    #[must_use]
    pub fn view_box(&self) -> String {
        format!("0 0 {} {}", self.pixels.width, self.pixels.height)
    }

    /// Declared width, e.g. `"25.000mm"`.
    #[must_use]
    pub fn width_attr(&self) -> String {
        format!("{:.3}mm", self.physical.width_mm)
    }

    /// Declared height, e.g. `"12.500mm"`.
    #[must_use]
    pub fn height_attr(&self) -> String {
        format!("{:.3}mm", self.physical.height_mm)
    }
}

/// Scale `contours` from pixels to millimetres.
///
/// Every point is rewritten, Bezier control points included:
/// `(x, y) -> (x * physical_width / pixel_width, y * physical_height / pixel_height)`.
///
/// # Errors
///
/// Returns [`CalibrationError::ZeroPixelExtent`] if either pixel extent
/// is zero and [`CalibrationError::InvalidPhysicalSize`] if either
/// physical extent is not finite and positive.
pub fn calibrate(
    contours: &[VectorContour],
    pixel_width: u32,
    pixel_height: u32,
    physical_width: f64,
    physical_height: f64,
) -> Result<CalibratedDocument, CalibrationError> {
    if pixel_width == 0 || pixel_height == 0 {
        return Err(CalibrationError::ZeroPixelExtent {
            width: pixel_width,
            height: pixel_height,
        });
    }
    let valid = |v: f64| v.is_finite() && v > 0.0;
    if !valid(physical_width) || !valid(physical_height) {
        return Err(CalibrationError::InvalidPhysicalSize {
            width_mm: physical_width,
            height_mm: physical_height,
        });
    }

    let scale = Scale {
        x: physical_width / f64::from(pixel_width),
        y: physical_height / f64::from(pixel_height),
    };
    let contours = contours
        .iter()
        .map(|c| c.map_points(|p| p.scaled(scale.x, scale.y)))
        .collect();

    Ok(CalibratedDocument {
        contours,
        scale,
        pixels: Dimensions {
            width: pixel_width,
            height: pixel_height,
        },
        physical: PhysicalSize::new(physical_width, physical_height),
    })
}
