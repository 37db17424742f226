//! bitrace: trace an image file to a physically scaled SVG.
//!
//! Runs decode, filter, trace and calibrate on one image and prints
//! per-stage diagnostics. Useful for:
//!
//! - Trying filter settings before committing them to an operation
//! - Comparing turn policies and corner thresholds
//! - Measuring per-stage durations across repeated runs
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin bitrace -- [OPTIONS] <IMAGE_PATH>
//! ```
//!
//! Set `RUST_LOG=bitrace_pipeline=debug` for stage-level logging.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use bitrace_export::SvgMetadata;
use bitrace_pipeline::diagnostics::{PipelineDiagnostics, process_with_diagnostics};
use bitrace_pipeline::{
    FilterSpec, GrayscaleAlgorithm, ImageSource, PhysicalSize, TraceParams, TurnPolicy,
};

/// Trace a raster image into calibrated vector outlines.
///
/// Applies the raster filter chain, traces closed contours and writes
/// them as SVG scaled to the given physical size.
#[derive(Parser)]
#[command(name = "bitrace", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP, GIF).
    image_path: PathBuf,

    /// Gaussian smoothing before the colour filters.
    #[arg(long)]
    smoothing: bool,

    /// Invert colours.
    #[arg(long)]
    invert: bool,

    /// Brightness adjustment (-255..255).
    #[arg(long)]
    brightness: Option<f64>,

    /// Contrast adjustment (-255..255).
    #[arg(long)]
    contrast: Option<f64>,

    /// Gamma correction.
    #[arg(long)]
    gamma: Option<f64>,

    /// Grayscale algorithm (none, average, luma, luma-601, luma-709, ...).
    #[arg(long, value_parser = parse_grayscale)]
    grayscale: Option<GrayscaleAlgorithm>,

    /// Number of gray levels to quantize to.
    #[arg(long)]
    shades: Option<f64>,

    /// Floyd-Steinberg dithering to black and white.
    #[arg(long)]
    dithering: bool,

    /// How ambiguous corners are resolved.
    #[arg(long, value_enum, default_value_t = Policy::Minority)]
    turn_policy: Policy,

    /// Smallest feature kept, in pixels.
    #[arg(long, default_value_t = TraceParams::DEFAULT_MIN_FEATURE_SIZE)]
    min_feature_size: u32,

    /// Emit straight polygons instead of fitted curves.
    #[arg(long)]
    no_curve_optimization: bool,

    /// Corner threshold (alphamax).
    #[arg(long, default_value_t = TraceParams::DEFAULT_CORNER_THRESHOLD)]
    corner_threshold: f64,

    /// Curve merging tolerance in pixels.
    #[arg(long, default_value_t = TraceParams::DEFAULT_OPT_TOLERANCE)]
    opt_tolerance: f64,

    /// Full trace parameters as a JSON string.
    ///
    /// When provided, the individual trace parameter flags are ignored.
    /// Missing fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Physical width in millimetres. Requires `--height-mm`.
    #[arg(long, requires = "height_mm")]
    width_mm: Option<f64>,

    /// Physical height in millimetres. Requires `--width-mm`.
    #[arg(long, requires = "width_mm")]
    height_mm: Option<f64>,

    /// Resolution used to derive the physical size when no
    /// `--width-mm`/`--height-mm` is given.
    #[arg(long, conflicts_with_all = ["width_mm", "height_mm"])]
    dpi: Option<f64>,

    /// Write SVG output to file.
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,
}

/// Turn policy selection.
#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    /// Prefer the locally rarer colour.
    Minority,
    /// Prefer the locally dominant colour.
    Majority,
    /// Connect foreground.
    Black,
    /// Connect background.
    White,
    /// Always turn right.
    Right,
    /// Always turn left.
    Left,
    /// Deterministic per-corner coin.
    Random,
}

impl From<Policy> for TurnPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Minority => Self::Minority,
            Policy::Majority => Self::Majority,
            Policy::Black => Self::Black,
            Policy::White => Self::White,
            Policy::Right => Self::Right,
            Policy::Left => Self::Left,
            Policy::Random => Self::Random,
        }
    }
}

fn parse_grayscale(name: &str) -> Result<GrayscaleAlgorithm, String> {
    GrayscaleAlgorithm::from_name(name).ok_or_else(|| {
        let known: Vec<&str> = GrayscaleAlgorithm::ALL.iter().map(|a| a.name()).collect();
        format!("unknown grayscale algorithm {name:?}, expected one of: {}", known.join(", "))
    })
}

/// Build the filter settings from CLI flags.
fn filters_from_cli(cli: &Cli) -> FilterSpec {
    let mut spec = FilterSpec::new();
    if cli.smoothing {
        spec = spec.with("smoothing", true);
    }
    if cli.invert {
        spec = spec.with("invertColor", true);
    }
    for (name, value) in [
        ("brightness", cli.brightness),
        ("contrast", cli.contrast),
        ("gamma", cli.gamma),
        ("shadesOfGray", cli.shades),
    ] {
        if let Some(v) = value {
            spec = spec.with(name, v);
        }
    }
    if let Some(algorithm) = cli.grayscale {
        spec = spec.with("grayscale", algorithm.name());
    }
    if cli.dithering {
        spec = spec.with("dithering", true);
    }
    spec
}

/// Build [`TraceParams`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual trace flags are ignored.
fn params_from_cli(cli: &Cli) -> Result<TraceParams, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(TraceParams::default()
        .with_turn_policy(cli.turn_policy.into())
        .with_min_feature_size(cli.min_feature_size)
        .with_curve_optimization(!cli.no_curve_optimization)
        .with_corner_threshold(cli.corner_threshold)
        .with_opt_tolerance(cli.opt_tolerance))
}

/// The declared physical size, if any. `--dpi` is resolved later
/// against the decoded pixel size.
fn physical_from_cli(cli: &Cli) -> Option<PhysicalSize> {
    match (cli.width_mm, cli.height_mm) {
        (Some(w), Some(h)) => Some(PhysicalSize::new(w, h)),
        _ => None,
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let params = match params_from_cli(&cli) {
        Ok(p) => p,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    let filters = filters_from_cli(&cli);

    let image_bytes = match std::fs::read(&cli.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    let source = ImageSource::from(image_bytes);
    let physical = match (physical_from_cli(&cli), cli.dpi) {
        (Some(physical), _) => Some(physical),
        (None, Some(dpi)) => match source.load() {
            Ok(buffer) => Some(PhysicalSize::from_dpi(buffer.dimensions(), dpi)),
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                return ExitCode::FAILURE;
            }
        },
        (None, None) => None,
    };

    eprintln!(
        "Image: {} ({} bytes)",
        cli.image_path.display(),
        source.encoded_len(),
    );
    eprintln!("Filters: {filters:?}");
    eprintln!("Params: {params:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    tracing::debug!(
        physical = ?physical,
        filters = filters.iter().count(),
        "starting pipeline runs"
    );
    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        match process_with_diagnostics(&source, &filters, &params, physical) {
            Ok((document, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }

                // Write SVG on the first run only.
                if run == 0
                    && let Some(ref svg_path) = cli.svg
                {
                    let title = cli
                        .image_path
                        .file_name()
                        .and_then(|s| s.to_str())
                        .unwrap_or("image");
                    let params_json = serde_json::to_string(&params).ok();
                    let metadata = SvgMetadata {
                        title: Some(title),
                        description: None,
                        params_json: params_json.as_deref(),
                    };
                    let svg = bitrace_export::to_svg(&document, &metadata);
                    match std::fs::write(svg_path, &svg) {
                        Ok(()) => {
                            eprintln!(
                                "SVG written to {} ({} bytes, {} x {})",
                                svg_path.display(),
                                svg.len(),
                                document.width_attr(),
                                document.height_attr(),
                            );
                        }
                        Err(e) => {
                            eprintln!("Error writing SVG to {}: {e}", svg_path.display());
                        }
                    }
                }

                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let runs = all_diagnostics.len() as f64;
    for (i, (name, _)) in all_diagnostics[0].stages().into_iter().enumerate() {
        let total: f64 = all_diagnostics
            .iter()
            .map(|d| d.stages()[i].1.duration.as_secs_f64() * 1000.0)
            .sum();
        println!("{name:<24} {:>10.3}ms", total / runs);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_become_filter_settings() {
        let cli = Cli::parse_from([
            "bitrace",
            "in.png",
            "--invert",
            "--brightness",
            "12",
            "--grayscale",
            "luma-709",
        ]);
        let spec = filters_from_cli(&cli);
        assert_eq!(spec.iter().count(), 3);
        assert_eq!(spec.get("grayscale").and_then(|v| v.as_name()), Some("luma-709"));
        assert!(spec.get("smoothing").is_none());
    }

    #[test]
    fn unknown_grayscale_is_rejected() {
        assert!(Cli::try_parse_from(["bitrace", "in.png", "--grayscale", "sepia"]).is_err());
    }

    #[test]
    fn config_json_overrides_flags() {
        let cli = Cli::parse_from([
            "bitrace",
            "in.png",
            "--turn-policy",
            "left",
            "--config-json",
            r#"{"turn_policy": "white", "curve_optimization": false}"#,
        ]);
        let params = params_from_cli(&cli).unwrap();
        assert_eq!(params.turn_policy, TurnPolicy::White);
        assert!(!params.curve_optimization);
        assert_eq!(params.min_feature_size, TraceParams::DEFAULT_MIN_FEATURE_SIZE);
    }

    #[test]
    fn malformed_config_json_is_an_error() {
        let cli = Cli::parse_from(["bitrace", "in.png", "--config-json", "{nope"]);
        assert!(params_from_cli(&cli).unwrap_err().contains("--config-json"));
    }

    #[test]
    fn width_requires_height() {
        assert!(Cli::try_parse_from(["bitrace", "in.png", "--width-mm", "10"]).is_err());
        let cli = Cli::parse_from(["bitrace", "in.png", "--width-mm", "10", "--height-mm", "5"]);
        assert_eq!(physical_from_cli(&cli), Some(PhysicalSize::new(10.0, 5.0)));
    }

    #[test]
    fn dpi_conflicts_with_explicit_size() {
        assert!(
            Cli::try_parse_from([
                "bitrace",
                "in.png",
                "--dpi",
                "300",
                "--width-mm",
                "10",
                "--height-mm",
                "5"
            ])
            .is_err()
        );
    }
}
