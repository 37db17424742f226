//! Pipeline diagnostics: timing, counts, and other metrics for each stage.
//!
//! These are permanent instrumentation for tuning filter and trace
//! parameters. [`process_with_diagnostics`] runs the staged
//! [`Pipeline`](crate::Pipeline) and records one entry per stage.
//!
//! Timestamps are captured via the `web-time` crate, which uses
//! `performance.now()` on WASM and `std::time::Instant` on native.
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::calibrate::CalibratedDocument;
use crate::contour::{Polarity, Segment, VectorContour};
use crate::filters::FilterSpec;
use crate::loader::ImageSource;
use crate::pipeline::Pipeline;
use crate::trace::{Bitmap, TraceParams};
use crate::types::{PhysicalSize, PipelineError};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 0: image decoding.
    pub decode: StageDiagnostics,
    /// Stage 1: filter chain.
    pub filter: StageDiagnostics,
    /// Stage 2: binarize, decompose, fit and smooth.
    pub trace: StageDiagnostics,
    /// Stage 3: scaling to physical units.
    pub calibrate: StageDiagnostics,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Image decoding metrics.
    Decode {
        /// Size of the encoded source.
        input_bytes: usize,
        /// Decoded image width in pixels.
        width: u32,
        /// Decoded image height in pixels.
        height: u32,
        /// Total pixel count (`width * height`).
        pixel_count: u64,
    },
    /// Filter chain metrics.
    Filter {
        /// Names of the filter settings present in the [`FilterSpec`].
        active: Vec<String>,
        /// Whether Gaussian smoothing ran.
        smoothing: bool,
        /// Whether dithering ran.
        dithering: bool,
    },
    /// Tracing metrics.
    Trace {
        /// Turn policy name.
        turn_policy: String,
        /// Whether curves were smoothed and merged.
        curve_optimization: bool,
        /// Pixels classified as foreground.
        foreground_pixels: usize,
        /// Contours produced.
        contour_count: usize,
        /// Contours that are holes.
        hole_count: usize,
        /// Straight segments across all contours.
        line_count: usize,
        /// Cubic segments across all contours.
        cubic_count: usize,
    },
    /// Calibration metrics.
    Calibrate {
        /// Millimetres per pixel, horizontally.
        scale_x: f64,
        /// Millimetres per pixel, vertically.
        scale_y: f64,
        /// Declared width.
        width_mm: f64,
        /// Declared height.
        height_mm: f64,
    },
}

/// High-level summary counts for the entire pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Source image width in pixels.
    pub image_width: u32,
    /// Source image height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Number of contours traced.
    pub contour_count: usize,
    /// Segments across all contours.
    pub segment_count: usize,
}

impl PipelineDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Contours: {}  |  Segments: {}",
            self.summary.contour_count, self.summary.segment_count,
        ));

        lines.join("\n")
    }

    /// Stage names paired with their diagnostics, in execution order.
    #[must_use]
    pub fn stages(&self) -> [(&'static str, &StageDiagnostics); 4] {
        [
            ("Decode", &self.decode),
            ("Filter", &self.filter),
            ("Trace", &self.trace),
            ("Calibrate", &self.calibrate),
        ]
    }
}

/// Run decode, filter, trace and calibrate, timing each stage.
///
/// When `physical` is `None` the document is calibrated at 96 DPI.
///
/// # Errors
///
/// Propagates decode and calibration failures.
pub fn process_with_diagnostics(
    source: &ImageSource,
    spec: &FilterSpec,
    params: &TraceParams,
    physical: Option<PhysicalSize>,
) -> Result<(CalibratedDocument, PipelineDiagnostics), PipelineError> {
    let start = Instant::now();

    let t = Instant::now();
    let decoded = Pipeline::new(source.clone()).decode()?;
    let dimensions = decoded.original().dimensions();
    let decode = StageDiagnostics {
        duration: t.elapsed(),
        metrics: StageMetrics::Decode {
            input_bytes: source.encoded_len(),
            width: dimensions.width,
            height: dimensions.height,
            pixel_count: dimensions.pixel_count(),
        },
    };

    let t = Instant::now();
    let filtered = decoded.filter(spec);
    let settings = spec.settings();
    let filter = StageDiagnostics {
        duration: t.elapsed(),
        metrics: StageMetrics::Filter {
            active: spec.iter().map(|(name, _)| name.to_owned()).collect(),
            smoothing: settings.smoothing,
            dithering: settings.dithering,
        },
    };

    // Not part of the timed trace stage.
    let foreground_pixels = Bitmap::binarize(filtered.filtered()).count();

    let t = Instant::now();
    let traced = filtered.trace(params);
    let trace_duration = t.elapsed();
    let stats = contour_stats(traced.contours());
    let trace = StageDiagnostics {
        duration: trace_duration,
        metrics: StageMetrics::Trace {
            turn_policy: params.turn_policy.name().to_owned(),
            curve_optimization: params.curve_optimization,
            foreground_pixels,
            contour_count: stats.contours,
            hole_count: stats.holes,
            line_count: stats.lines,
            cubic_count: stats.cubics,
        },
    };

    let t = Instant::now();
    let physical = physical.unwrap_or_else(|| PhysicalSize::from_dpi(dimensions, DEFAULT_DPI));
    let document = traced.calibrate(physical)?.into_document();
    let scale = document.scale();
    let calibrate = StageDiagnostics {
        duration: t.elapsed(),
        metrics: StageMetrics::Calibrate {
            scale_x: scale.x,
            scale_y: scale.y,
            width_mm: physical.width_mm,
            height_mm: physical.height_mm,
        },
    };

    let diagnostics = PipelineDiagnostics {
        decode,
        filter,
        trace,
        calibrate,
        total_duration: start.elapsed(),
        summary: PipelineSummary {
            image_width: dimensions.width,
            image_height: dimensions.height,
            pixel_count: dimensions.pixel_count(),
            contour_count: stats.contours,
            segment_count: stats.lines + stats.cubics,
        },
    };
    tracing::debug!(
        total_ms = duration_ms(diagnostics.total_duration),
        contours = stats.contours,
        "pipeline finished"
    );

    Ok((document, diagnostics))
}

/// Resolution assumed when no physical size is given.
pub const DEFAULT_DPI: f64 = 96.0;

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Decode {
            input_bytes,
            width,
            height,
            ..
        } => format!("{input_bytes} bytes -> {width}x{height}"),
        StageMetrics::Filter {
            active,
            smoothing,
            dithering,
        } => {
            let names = if active.is_empty() {
                "none".to_owned()
            } else {
                active.join(",")
            };
            format!("[{names}] smoothing={smoothing} dithering={dithering}")
        }
        StageMetrics::Trace {
            turn_policy,
            curve_optimization,
            foreground_pixels,
            contour_count,
            hole_count,
            line_count,
            cubic_count,
        } => format!(
            "{turn_policy} opt={curve_optimization} fg={foreground_pixels} -> {contour_count} contours ({hole_count} holes), {line_count} lines, {cubic_count} cubics",
        ),
        StageMetrics::Calibrate {
            scale_x,
            scale_y,
            width_mm,
            height_mm,
        } => format!("{width_mm:.3}x{height_mm:.3}mm (x{scale_x:.4}, y{scale_y:.4} mm/px)"),
    }
}

/// Counts over a set of contours.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ContourStats {
    pub contours: usize,
    pub holes: usize,
    pub lines: usize,
    pub cubics: usize,
}

pub(crate) fn contour_stats(contours: &[VectorContour]) -> ContourStats {
    contours
        .iter()
        .fold(ContourStats::default(), |mut stats, contour| {
            stats.contours += 1;
            stats.holes += usize::from(contour.polarity == Polarity::Hole);
            for segment in &contour.segments {
                match segment {
                    Segment::Line { .. } => stats.lines += 1,
                    Segment::Cubic { .. } => stats.cubics += 1,
                }
            }
            stats
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::types::{PixelBuffer, Point};

    #[test]
    fn duration_ms_converts_correctly() {
        let d = Duration::from_millis(1234);
        let ms = duration_ms(d);
        assert!((ms - 1234.0).abs() < 0.01);
    }

    #[test]
    fn contour_stats_empty() {
        assert_eq!(contour_stats(&[]), ContourStats::default());
    }

    #[test]
    fn contour_stats_counts_segments_and_holes() {
        let p = Point::new(0.0, 0.0);
        let contours = vec![
            VectorContour::new(
                p,
                vec![
                    Segment::Line { to: p },
                    Segment::Cubic {
                        c1: p,
                        c2: p,
                        to: p,
                    },
                ],
                Polarity::Outer,
            ),
            VectorContour::new(p, vec![Segment::Line { to: p }], Polarity::Hole),
        ];
        assert_eq!(
            contour_stats(&contours),
            ContourStats {
                contours: 2,
                holes: 1,
                lines: 2,
                cubics: 1,
            }
        );
    }

    fn ring_png() -> Vec<u8> {
        let buffer = PixelBuffer::from_fn(16, 16, |x, y| {
            let ring = (3..13).contains(&x) && (3..13).contains(&y);
            let hole = (6..10).contains(&x) && (6..10).contains(&y);
            if ring && !hole {
                [0, 0, 0, 255]
            } else {
                [255, 255, 255, 255]
            }
        });
        let mut bytes = Vec::new();
        buffer
            .image()
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .unwrap();
        bytes
    }

    #[test]
    fn process_records_every_stage() {
        let source = ImageSource::from(ring_png());
        let (doc, diag) = process_with_diagnostics(
            &source,
            &FilterSpec::new(),
            &TraceParams::default(),
            Some(PhysicalSize::new(32.0, 16.0)),
        )
        .unwrap();

        assert_eq!(doc.contours().len(), 2);
        assert_eq!(diag.summary.contour_count, 2);
        assert_eq!(diag.summary.pixel_count, 256);
        match diag.trace.metrics {
            StageMetrics::Trace {
                foreground_pixels,
                hole_count,
                ..
            } => {
                assert_eq!(foreground_pixels, 100 - 16);
                assert_eq!(hole_count, 1);
            }
            ref other => panic!("unexpected metrics {other:?}"),
        }
        match diag.calibrate.metrics {
            StageMetrics::Calibrate {
                scale_x, scale_y, ..
            } => {
                assert!((scale_x - 2.0).abs() < 1e-12);
                assert!((scale_y - 1.0).abs() < 1e-12);
            }
            ref other => panic!("unexpected metrics {other:?}"),
        }
        assert!(diag.total_duration >= diag.decode.duration);
    }

    #[test]
    fn default_physical_size_is_96_dpi() {
        let (doc, _) = process_with_diagnostics(
            &ImageSource::from(ring_png()),
            &FilterSpec::new(),
            &TraceParams::default(),
            None,
        )
        .unwrap();
        assert!((doc.physical_size().width_mm - 16.0 * 25.4 / 96.0).abs() < 1e-9);
    }

    #[test]
    fn report_lists_stages() {
        let (_, diag) = process_with_diagnostics(
            &ImageSource::from(ring_png()),
            &FilterSpec::new().with("invertColor", true),
            &TraceParams::default(),
            None,
        )
        .unwrap();
        let report = diag.report();
        for stage in ["Decode", "Filter", "Trace", "Calibrate"] {
            assert!(report.contains(stage), "missing {stage}");
        }
        assert!(report.contains("invertColor"));
    }

    #[test]
    fn diagnostics_serialize_durations_as_seconds() {
        let stage = StageDiagnostics {
            duration: Duration::from_millis(1500),
            metrics: StageMetrics::Decode {
                input_bytes: 10,
                width: 1,
                height: 1,
                pixel_count: 1,
            },
        };
        let json = serde_json::to_value(&stage).unwrap();
        assert!((json["duration"].as_f64().unwrap() - 1.5).abs() < 1e-12);
        let back: StageDiagnostics = serde_json::from_value(json).unwrap();
        assert_eq!(back.duration, Duration::from_millis(1500));
    }

    #[test]
    fn negative_duration_is_rejected() {
        let json = serde_json::json!({
            "duration": -1.0,
            "metrics": { "Decode": { "input_bytes": 0, "width": 0, "height": 0, "pixel_count": 0 } }
        });
        assert!(serde_json::from_value::<StageDiagnostics>(json).is_err());
    }
}
