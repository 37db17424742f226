//! Incremental pipeline: advance stage by stage, inspecting each
//! intermediate result before continuing.
//!
//! ```rust
//! # use bitrace_pipeline::{FilterSpec, ImageSource, PhysicalSize, Pipeline, PipelineError, TraceParams};
//! # fn run(png: Vec<u8>) -> Result<(), PipelineError> {
//! let calibrated = Pipeline::new(ImageSource::from(png))
//!     .decode()?
//!     .filter(&FilterSpec::new().with("invertColor", true))
//!     .trace(&TraceParams::default())
//!     .calibrate_dpi(96.0)?;
//!
//! let document = calibrated.into_document();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next state,
//! carrying forward only what later stages still need. The raster
//! buffers are dropped once tracing has produced contours.

use crate::calibrate::{CalibratedDocument, calibrate};
use crate::contour::VectorContour;
use crate::filters::{FilterSpec, apply_filters};
use crate::loader::ImageSource;
use crate::trace::{TraceParams, trace};
use crate::types::{Dimensions, PhysicalSize, PipelineError, PixelBuffer};

/// Entry point; see the [module docs](self).
pub struct Pipeline;

impl Pipeline {
    /// Start a pipeline for `source`.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(source: ImageSource) -> Pending {
        Pending { source }
    }
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Nothing decoded yet.
#[must_use = "pipeline stages are consumed by advancing; call .decode() to continue"]
pub struct Pending {
    source: ImageSource,
}

impl Pending {
    /// The undecoded source.
    #[must_use]
    pub const fn source(&self) -> &ImageSource {
        &self.source
    }

    /// Decode the source into pixels.
    ///
    /// # Errors
    ///
    /// Whatever [`ImageSource::load`] reports.
    pub fn decode(self) -> Result<Decoded, PipelineError> {
        let original = self.source.load()?;
        tracing::debug!(
            width = original.width(),
            height = original.height(),
            bytes = self.source.encoded_len(),
            "decoded source image"
        );
        Ok(Decoded { original })
    }
}

// ───────────────────────── Stage 1: Decoded ──────────────────────────

/// Decoded pixels, unfiltered.
#[must_use = "pipeline stages are consumed by advancing; call .filter() to continue"]
pub struct Decoded {
    original: PixelBuffer,
}

impl Decoded {
    /// The decoded image.
    #[must_use]
    pub const fn original(&self) -> &PixelBuffer {
        &self.original
    }

    /// Run the filter chain described by `spec`.
    pub fn filter(self, spec: &FilterSpec) -> Filtered {
        let filtered = apply_filters(&self.original, spec);
        Filtered {
            original: self.original,
            filtered,
        }
    }
}

// ───────────────────────── Stage 2: Filtered ─────────────────────────

/// Original and filtered pixels side by side.
#[must_use = "pipeline stages are consumed by advancing; call .trace() to continue"]
pub struct Filtered {
    original: PixelBuffer,
    filtered: PixelBuffer,
}

impl Filtered {
    /// The decoded image before filtering.
    #[must_use]
    pub const fn original(&self) -> &PixelBuffer {
        &self.original
    }

    /// The filtered image, i.e. what a preview displays.
    #[must_use]
    pub const fn filtered(&self) -> &PixelBuffer {
        &self.filtered
    }

    /// Give up the filtered buffer without tracing.
    #[must_use]
    pub fn into_filtered(self) -> PixelBuffer {
        self.filtered
    }

    /// Trace the filtered image.
    pub fn trace(self, params: &TraceParams) -> Traced {
        let contours = trace(&self.filtered, params);
        Traced {
            contours,
            dimensions: self.filtered.dimensions(),
        }
    }
}

// ───────────────────────── Stage 3: Traced ───────────────────────────

/// Pixel-space contours.
#[must_use = "pipeline stages are consumed by advancing; call .calibrate() to continue"]
pub struct Traced {
    contours: Vec<VectorContour>,
    dimensions: Dimensions,
}

impl Traced {
    /// Contours in pixel coordinates.
    #[must_use]
    pub fn contours(&self) -> &[VectorContour] {
        &self.contours
    }

    /// Pixel extents of the traced image.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Scale into `physical` millimetres.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Calibration`] for zero pixel extents or a
    /// physical size that is not finite and positive.
    pub fn calibrate(self, physical: PhysicalSize) -> Result<Calibrated, PipelineError> {
        let document = calibrate(
            &self.contours,
            self.dimensions.width,
            self.dimensions.height,
            physical.width_mm,
            physical.height_mm,
        )?;
        Ok(Calibrated { document })
    }

    /// Scale assuming the image was scanned at `dpi` dots per inch.
    ///
    /// # Errors
    ///
    /// See [`calibrate`](Self::calibrate).
    pub fn calibrate_dpi(self, dpi: f64) -> Result<Calibrated, PipelineError> {
        let physical = PhysicalSize::from_dpi(self.dimensions, dpi);
        self.calibrate(physical)
    }
}

// ───────────────────────── Stage 4: Calibrated ───────────────────────

/// The final stage.
#[must_use = "call .into_document() to extract the CalibratedDocument"]
pub struct Calibrated {
    document: CalibratedDocument,
}

impl Calibrated {
    /// The calibrated document.
    #[must_use]
    pub const fn document(&self) -> &CalibratedDocument {
        &self.document
    }

    /// Consume the pipeline.
    #[must_use]
    pub fn into_document(self) -> CalibratedDocument {
        self.document
    }
}
