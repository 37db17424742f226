//! Bitmap-to-vector tracing.
//!
//! Converts a pixel buffer into closed [`VectorContour`]s:
//!
//! 1. Binarize (luminance below 128 is foreground).
//! 2. Decompose into lattice boundary paths in raster discovery order,
//!    resolving ambiguous corners with the [`TurnPolicy`].
//! 3. Drop speckles enclosing fewer than `min_feature_size^2` pixels.
//! 4. Fit an optimal polygon to each path; holes are reversed.
//! 5. With `curve_optimization`, smooth the polygon into corners and
//!    Bezier curves and merge curve runs within `opt_tolerance`.
//!    Without it, the polygon itself is the contour.

mod bitmap;
mod curve;
mod decompose;
mod polygon;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use bitmap::Bitmap;

use crate::contour::{Polarity, VectorContour};
use crate::types::PixelBuffer;

/// How to resolve ambiguous corners where two foreground pixels touch
/// diagonally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnPolicy {
    /// Prefer the colour that is locally in the minority.
    #[default]
    Minority,
    /// Prefer the colour that is locally in the majority.
    Majority,
    /// Connect foreground.
    Black,
    /// Connect background.
    White,
    /// Always turn right.
    Right,
    /// Always turn left.
    Left,
    /// Deterministic pseudo-random choice per corner.
    Random,
}

impl TurnPolicy {
    /// Every policy, in the order the editor lists them.
    pub const ALL: [Self; 7] = [
        Self::Minority,
        Self::Majority,
        Self::Black,
        Self::White,
        Self::Right,
        Self::Left,
        Self::Random,
    ];

    /// Lowercase name used by the editor.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Minority => "minority",
            Self::Majority => "majority",
            Self::Black => "black",
            Self::White => "white",
            Self::Right => "right",
            Self::Left => "left",
            Self::Random => "random",
        }
    }
}

impl fmt::Display for TurnPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown turn policy name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown turn policy: {0:?}")]
pub struct ParseTurnPolicyError(String);

impl FromStr for TurnPolicy {
    type Err = ParseTurnPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseTurnPolicyError(s.to_owned()))
    }
}

/// Tracing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceParams {
    /// Resolution of ambiguous corners.
    pub turn_policy: TurnPolicy,
    /// Side length in pixels of the smallest feature kept; regions
    /// enclosing fewer than its square are dropped as speckles.
    pub min_feature_size: u32,
    /// Fit and merge curves. When off, contours are straight polygons.
    pub curve_optimization: bool,
    /// Corner threshold (alphamax). Vertices at least this sharp stay
    /// corners; 0 keeps every corner, values above 4/3 smooth them all.
    pub corner_threshold: f64,
    /// Maximum deviation in pixels allowed when merging curves.
    pub opt_tolerance: f64,
}

impl TraceParams {
    /// Default turn policy.
    pub const DEFAULT_TURN_POLICY: TurnPolicy = TurnPolicy::Minority;

    /// Default minimum feature size (pixels).
    pub const DEFAULT_MIN_FEATURE_SIZE: u32 = 2;

    /// Curves are fitted by default.
    pub const DEFAULT_CURVE_OPTIMIZATION: bool = true;

    /// Default corner threshold.
    pub const DEFAULT_CORNER_THRESHOLD: f64 = 1.0;

    /// Default curve merging tolerance (pixels).
    pub const DEFAULT_OPT_TOLERANCE: f64 = 0.2;

    /// Return a copy with `patch` merged in.
    #[must_use]
    pub fn merged(self, patch: &TraceParamsPatch) -> Self {
        Self {
            turn_policy: patch.turn_policy.unwrap_or(self.turn_policy),
            min_feature_size: patch
                .min_feature_size
                .map_or(self.min_feature_size, clamp_feature_size),
            curve_optimization: patch.curve_optimization.unwrap_or(self.curve_optimization),
            corner_threshold: patch
                .corner_threshold
                .map_or(self.corner_threshold, non_negative),
            opt_tolerance: patch.opt_tolerance.map_or(self.opt_tolerance, non_negative),
        }
    }

    /// Return a copy with a different turn policy.
    #[must_use]
    pub const fn with_turn_policy(mut self, turn_policy: TurnPolicy) -> Self {
        self.turn_policy = turn_policy;
        self
    }

    /// Return a copy with a different minimum feature size.
    #[must_use]
    pub const fn with_min_feature_size(mut self, min_feature_size: u32) -> Self {
        self.min_feature_size = min_feature_size;
        self
    }

    /// Return a copy with curve optimization switched on or off.
    #[must_use]
    pub const fn with_curve_optimization(mut self, curve_optimization: bool) -> Self {
        self.curve_optimization = curve_optimization;
        self
    }

    /// Return a copy with a different corner threshold.
    #[must_use]
    pub fn with_corner_threshold(mut self, corner_threshold: f64) -> Self {
        self.corner_threshold = non_negative(corner_threshold);
        self
    }

    /// Return a copy with a different curve merging tolerance.
    #[must_use]
    pub fn with_opt_tolerance(mut self, opt_tolerance: f64) -> Self {
        self.opt_tolerance = non_negative(opt_tolerance);
        self
    }

    /// Area in pixels below which a region is a speckle.
    fn min_area(&self) -> i64 {
        let side = i64::from(self.min_feature_size);
        side * side
    }
}

impl Default for TraceParams {
    fn default() -> Self {
        Self {
            turn_policy: Self::DEFAULT_TURN_POLICY,
            min_feature_size: Self::DEFAULT_MIN_FEATURE_SIZE,
            curve_optimization: Self::DEFAULT_CURVE_OPTIMIZATION,
            corner_threshold: Self::DEFAULT_CORNER_THRESHOLD,
            opt_tolerance: Self::DEFAULT_OPT_TOLERANCE,
        }
    }
}

/// A partial update to [`TraceParams`]. Unset fields keep their value.
///
/// Numbers arrive from form inputs, so they are accepted as `f64` and
/// clamped into range on merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceParamsPatch {
    /// New turn policy.
    pub turn_policy: Option<TurnPolicy>,
    /// New minimum feature size; negatives clamp to zero.
    pub min_feature_size: Option<f64>,
    /// New curve optimization flag.
    pub curve_optimization: Option<bool>,
    /// New corner threshold; negatives clamp to zero.
    pub corner_threshold: Option<f64>,
    /// New merging tolerance; negatives clamp to zero.
    pub opt_tolerance: Option<f64>,
}

fn non_negative(v: f64) -> f64 {
    if v.is_finite() { v.max(0.0) } else { 0.0 }
}

fn clamp_feature_size(v: f64) -> u32 {
    // Clamped into u32 range first, so the cast is lossless.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let size = non_negative(v).min(f64::from(u32::MAX)).round() as u32;
    size
}

/// Trace `buffer` into closed contours in raster discovery order.
///
/// Never fails: uniform input (all foreground or all background)
/// yields an empty vector.
#[must_use]
pub fn trace(buffer: &PixelBuffer, params: &TraceParams) -> Vec<VectorContour> {
    trace_bitmap(&Bitmap::binarize(buffer), params)
}

/// Trace an already binarized bitmap.
#[must_use]
pub fn trace_bitmap(bitmap: &Bitmap, params: &TraceParams) -> Vec<VectorContour> {
    if bitmap.is_uniform() {
        tracing::debug!(
            width = bitmap.width(),
            height = bitmap.height(),
            "uniform bitmap, nothing to trace"
        );
        return Vec::new();
    }

    let corner_threshold = non_negative(params.corner_threshold);
    let opt_tolerance = non_negative(params.opt_tolerance);

    let paths = decompose::decompose(bitmap, params.turn_policy, params.min_area());
    let contours: Vec<VectorContour> = paths
        .iter()
        .filter_map(|path| {
            let mut vertices = polygon::fit(path);
            if path.polarity == Polarity::Hole {
                vertices.reverse();
            }
            let (start, segments) = if params.curve_optimization {
                let smoothed = curve::smooth(&vertices, corner_threshold);
                curve::optimize(&smoothed, opt_tolerance).segments()?
            } else {
                curve::polygon_segments(&vertices)?
            };
            Some(VectorContour::new(start, segments, path.polarity))
        })
        .collect();

    tracing::debug!(
        paths = paths.len(),
        contours = contours.len(),
        policy = %params.turn_policy,
        "traced bitmap"
    );
    contours
}
