//! bitrace-pipeline: pure bitmap-to-vector core (sans-IO).
//!
//! Turns a raster image into physically scaled outlines through:
//! decode -> filter -> binarize -> path decomposition -> optimal
//! polygon -> curve smoothing -> curve merging -> calibration.
//!
//! This crate has **no I/O dependencies**: it operates on in-memory
//! byte slices and returns structured data. Editor state and scheduling
//! live in `bitrace-editor`; serializers live in `bitrace-export`.

pub mod blur;
pub mod calibrate;
pub mod contour;
pub mod diagnostics;
pub mod filters;
pub mod loader;
pub mod pipeline;
pub mod trace;
pub mod tree;
pub mod types;

pub use calibrate::{CalibratedDocument, CalibrationError, Scale, calibrate};
pub use contour::{Polarity, Segment, VectorContour};
pub use filters::{
    FILTER_NAMES, FilterSettings, FilterSpec, FilterValue, GrayscaleAlgorithm, apply_filters,
};
pub use loader::{ImageSource, decode, decode_data_url, to_data_url};
pub use pipeline::Pipeline;
pub use trace::{TraceParams, TraceParamsPatch, TurnPolicy, trace};
pub use tree::Node;
pub use types::{Dimensions, PhysicalSize, PipelineError, PixelBuffer, Point, RgbaImage};

/// Run the whole pipeline on encoded image bytes.
///
/// Decodes `image_bytes`, applies `spec`, traces with `params` and
/// calibrates the contours to `physical`.
///
/// # Pipeline steps
///
/// 1. Decode to RGBA
/// 2. Filter chain (smoothing, color adjustments, grayscale, dithering)
/// 3. Binarize and trace closed contours
/// 4. Scale to millimetres
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `image_bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is unrecognized.
/// Returns [`PipelineError::Calibration`] if `physical` is not a usable size.
pub fn process(
    image_bytes: &[u8],
    spec: &FilterSpec,
    params: &TraceParams,
    physical: PhysicalSize,
) -> Result<CalibratedDocument, PipelineError> {
    Ok(Pipeline::new(ImageSource::from(image_bytes.to_vec()))
        .decode()?
        .filter(spec)
        .trace(params)
        .calibrate(physical)?
        .into_document())
}
