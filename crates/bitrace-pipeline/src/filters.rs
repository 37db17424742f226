//! Bitmap filter pipeline.
//!
//! A [`FilterSpec`] is the filter subset of a raster operation's fields:
//! an ordered map from filter name to value. [`apply_filters`] resolves
//! it into clamped [`FilterSettings`] and runs the stages in a fixed
//! order, independent of how the keys were inserted:
//!
//! 1. `smoothing` (Gaussian, sigma 0.8)
//! 2. `invertColor`
//! 3. `brightness`
//! 4. `contrast`
//! 5. `gamma`
//! 6. `grayscale`
//! 7. `shadesOfGray` (only with an active grayscale algorithm)
//! 8. `dithering` (Floyd-Steinberg to black and white)
//!
//! Every per-pixel stage rounds and clamps back to 8 bits before the
//! next one runs. Alpha is never touched.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::blur;
use crate::types::{PixelBuffer, RgbaImage};

/// Recognized filter names, in pipeline order.
pub const FILTER_NAMES: [&str; 8] = [
    "smoothing",
    "invertColor",
    "brightness",
    "contrast",
    "gamma",
    "grayscale",
    "shadesOfGray",
    "dithering",
];

/// A single filter parameter value.
///
/// Operation fields come from form inputs, so numbers may arrive as
/// strings and flags as numbers. The accessors coerce leniently and
/// return `None` for anything that cannot be read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// A toggle.
    Flag(bool),
    /// A numeric parameter.
    Number(f64),
    /// A named choice (e.g. a grayscale algorithm).
    Name(String),
}

impl FilterValue {
    /// Convert a JSON field value. `null`, arrays and objects have no
    /// filter meaning and yield `None`.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Flag(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(Self::Number),
            serde_json::Value::String(s) => Some(Self::Name(s.clone())),
            _ => None,
        }
    }

    /// Read the value as a toggle.
    #[must_use]
    pub fn as_flag(&self) -> bool {
        match self {
            Self::Flag(b) => *b,
            Self::Number(n) => n.is_finite() && *n != 0.0,
            Self::Name(s) => matches!(s.trim(), "true" | "1"),
        }
    }

    /// Read the value as a finite number.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Flag(_) => None,
            Self::Number(n) => Some(*n),
            Self::Name(s) => s.trim().parse::<f64>().ok(),
        }
        .filter(|n| n.is_finite())
    }

    /// Read the value as a name.
    #[must_use]
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(s) => Some(s.as_str()),
            Self::Flag(_) | Self::Number(_) => None,
        }
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        Self::Flag(b)
    }
}

impl From<f64> for FilterValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        Self::Name(s.to_owned())
    }
}

/// The filter subset of an operation, keyed by filter name.
///
/// Two specs are equal when they hold the same names with equal values;
/// insertion order is irrelevant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSpec(BTreeMap<String, FilterValue>);

impl FilterSpec {
    /// An empty spec: [`apply_filters`] returns an unchanged copy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Project an operation's field map onto the recognized filter names.
    ///
    /// Fields that are not filters, and filter fields whose values have
    /// no filter meaning (`null`, arrays, objects), are left out.
    #[must_use]
    pub fn project(fields: &serde_json::Map<String, serde_json::Value>) -> Self {
        Self(
            FILTER_NAMES
                .iter()
                .filter_map(|&name| {
                    let value = FilterValue::from_json(fields.get(name)?)?;
                    Some((name.to_owned(), value))
                })
                .collect(),
        )
    }

    /// Return a copy with `name` set to `value`.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Look up a filter value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FilterValue> {
        self.0.get(name)
    }

    /// Whether no filter is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Resolve into clamped, typed settings.
    #[must_use]
    pub fn settings(&self) -> FilterSettings {
        FilterSettings::resolve(self)
    }
}

/// Grayscale conversion algorithms.
///
/// Names match the values the operation form stores, including the
/// `*-chanel` spelling of the single-channel variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GrayscaleAlgorithm {
    /// Leave colour alone.
    #[default]
    None,
    /// Mean of R, G and B.
    Average,
    /// `0.3 R + 0.59 G + 0.11 B`.
    Luma,
    /// ITU-R BT.601 weights.
    Luma601,
    /// ITU-R BT.709 weights.
    Luma709,
    /// SMPTE 240M weights.
    Luma240,
    /// Midpoint of the largest and smallest channel.
    Desaturation,
    /// Smallest channel.
    DecompositionMin,
    /// Largest channel.
    DecompositionMax,
    /// Red channel only.
    RedChannel,
    /// Green channel only.
    GreenChannel,
    /// Blue channel only.
    BlueChannel,
}

impl GrayscaleAlgorithm {
    /// All algorithms, in the order the form lists them.
    pub const ALL: [Self; 12] = [
        Self::None,
        Self::Average,
        Self::Luma,
        Self::Luma601,
        Self::Luma709,
        Self::Luma240,
        Self::Desaturation,
        Self::DecompositionMin,
        Self::DecompositionMax,
        Self::RedChannel,
        Self::GreenChannel,
        Self::BlueChannel,
    ];

    /// Parse a form value. Unknown names yield `None`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }

    /// The form value for this algorithm.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Average => "average",
            Self::Luma => "luma",
            Self::Luma601 => "luma-601",
            Self::Luma709 => "luma-709",
            Self::Luma240 => "luma-240",
            Self::Desaturation => "desaturation",
            Self::DecompositionMin => "decomposition-min",
            Self::DecompositionMax => "decomposition-max",
            Self::RedChannel => "red-chanel",
            Self::GreenChannel => "green-chanel",
            Self::BlueChannel => "blue-chanel",
        }
    }

    /// Gray level of one pixel, or `None` when disabled.
    fn gray(self, [r, g, b]: [f64; 3]) -> Option<f64> {
        let weighted = |wr: f64, wg: f64, wb: f64| wb.mul_add(b, wr.mul_add(r, wg * g));
        Some(match self {
            Self::None => return None,
            Self::Average => (r + g + b) / 3.0,
            Self::Luma => weighted(0.3, 0.59, 0.11),
            Self::Luma601 => weighted(0.299, 0.587, 0.114),
            Self::Luma709 => weighted(0.2126, 0.7152, 0.0722),
            Self::Luma240 => weighted(0.212, 0.701, 0.087),
            Self::Desaturation => (r.max(g).max(b) + r.min(g).min(b)) / 2.0,
            Self::DecompositionMin => r.min(g).min(b),
            Self::DecompositionMax => r.max(g).max(b),
            Self::RedChannel => r,
            Self::GreenChannel => g,
            Self::BlueChannel => b,
        })
    }
}

impl fmt::Display for GrayscaleAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A [`FilterSpec`] resolved to typed, clamped values.
///
/// Missing, unreadable and non-finite values fall back to the
/// corresponding `DEFAULT_*` (which disables the stage).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterSettings {
    /// Gaussian smoothing before any colour stage.
    pub smoothing: bool,
    /// Invert R, G and B.
    pub invert_color: bool,
    /// Additive offset in `[-255, 255]`.
    pub brightness: f64,
    /// Contrast adjustment in `[-255, 255]`.
    pub contrast: f64,
    /// Gamma in `[0.01, 7.99]`, or `None` when disabled.
    pub gamma: Option<f64>,
    /// Grayscale conversion.
    pub grayscale: GrayscaleAlgorithm,
    /// Number of gray levels in `[2, 256]`; 256 disables posterizing.
    pub shades_of_gray: u16,
    /// Floyd-Steinberg dithering to pure black and white.
    pub dithering: bool,
}

impl FilterSettings {
    /// Sigma of the smoothing blur.
    pub const SMOOTHING_SIGMA: f32 = 0.8;

    /// Default brightness offset (no change).
    pub const DEFAULT_BRIGHTNESS: f64 = 0.0;

    /// Default contrast (no change).
    pub const DEFAULT_CONTRAST: f64 = 0.0;

    /// Default number of gray shades (no posterizing).
    pub const DEFAULT_SHADES_OF_GRAY: u16 = 256;

    const MIN_GAMMA: f64 = 0.01;
    const MAX_GAMMA: f64 = 7.99;

    /// Resolve a spec, clamping every number into its domain.
    #[must_use]
    pub fn resolve(spec: &FilterSpec) -> Self {
        let flag = |name: &str| spec.get(name).is_some_and(FilterValue::as_flag);
        let number = |name: &str| spec.get(name).and_then(FilterValue::as_number);

        Self {
            smoothing: flag("smoothing"),
            invert_color: flag("invertColor"),
            brightness: number("brightness")
                .map_or(Self::DEFAULT_BRIGHTNESS, |b| b.clamp(-255.0, 255.0)),
            contrast: number("contrast").map_or(Self::DEFAULT_CONTRAST, |c| c.clamp(-255.0, 255.0)),
            gamma: number("gamma")
                .filter(|g| *g != 0.0)
                .map(|g| g.clamp(Self::MIN_GAMMA, Self::MAX_GAMMA)),
            grayscale: spec
                .get("grayscale")
                .and_then(FilterValue::as_name)
                .and_then(GrayscaleAlgorithm::from_name)
                .unwrap_or_default(),
            shades_of_gray: number("shadesOfGray").map_or(Self::DEFAULT_SHADES_OF_GRAY, |s| {
                // Clamped into [2, 256] first, so the cast is lossless.
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let shades = s.clamp(2.0, 256.0).round() as u16;
                shades
            }),
            dithering: flag("dithering"),
        }
    }

    /// Whether any per-pixel colour stage is active.
    fn adjusts_color(&self) -> bool {
        self.invert_color
            || self.brightness != 0.0
            || self.contrast != 0.0
            || self.gamma.is_some()
            || self.grayscale != GrayscaleAlgorithm::None
    }

    /// Run the colour stages on one pixel's RGB samples.
    fn adjust(&self, rgb: [u8; 3]) -> [u8; 3] {
        let mut c = rgb.map(f64::from);

        if self.invert_color {
            c = c.map(|v| 255.0 - v);
        }
        if self.brightness != 0.0 {
            c = c.map(|v| quantize(v + self.brightness));
        }
        if self.contrast != 0.0 {
            let factor =
                (259.0 * (self.contrast + 255.0)) / (255.0 * (259.0 - self.contrast));
            c = c.map(|v| quantize(factor.mul_add(v - 128.0, 128.0)));
        }
        if let Some(gamma) = self.gamma {
            c = c.map(|v| quantize(255.0 * (v / 255.0).powf(1.0 / gamma)));
        }
        if let Some(gray) = self.grayscale.gray(c) {
            let gray = if self.shades_of_gray < 256 {
                let step = 255.0 / f64::from(self.shades_of_gray - 1);
                (gray / step).round() * step
            } else {
                gray
            };
            c = [quantize(gray); 3];
        }

        c.map(to_u8)
    }
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self::resolve(&FilterSpec::new())
    }
}

/// Round and clamp to the 8-bit range, kept as `f64` for the next stage.
fn quantize(v: f64) -> f64 {
    v.round().clamp(0.0, 255.0)
}

fn to_u8(v: f64) -> u8 {
    // Clamped into [0, 255] first, so the cast is lossless.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let byte = quantize(v) as u8;
    byte
}

/// Apply a filter spec to a buffer, producing a new buffer of the same
/// dimensions.
///
/// Never fails: unknown names are ignored and out-of-range values are
/// clamped. The input is not modified.
#[must_use = "returns the filtered buffer"]
pub fn apply_filters(buffer: &PixelBuffer, spec: &FilterSpec) -> PixelBuffer {
    let settings = spec.settings();
    tracing::trace!(?settings, "applying filters");

    let smoothed = if settings.smoothing {
        blur::gaussian_blur(buffer, FilterSettings::SMOOTHING_SIGMA)
    } else {
        buffer.clone()
    };

    let mut image = smoothed.into_image();
    if settings.adjusts_color() {
        for px in image.pixels_mut() {
            let [r, g, b, a] = px.0;
            let [r, g, b] = settings.adjust([r, g, b]);
            px.0 = [r, g, b, a];
        }
    }
    if settings.dithering {
        dither(&mut image);
    }

    PixelBuffer::new(image)
}

/// Floyd-Steinberg error diffusion of the BT.709 luminance to black and
/// white, in place. Alpha is kept.
fn dither(image: &mut RgbaImage) {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let mut levels: Vec<f64> = image
        .pixels()
        .map(|px| {
            let [r, g, b, _] = px.0.map(f64::from);
            0.0722f64.mul_add(b, 0.2126f64.mul_add(r, 0.7152 * g))
        })
        .collect();

    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            let old = levels[i];
            let new = if old < 128.0 { 0.0 } else { 255.0 };
            levels[i] = new;
            let err = old - new;

            if x + 1 < w {
                levels[i + 1] += err * 7.0 / 16.0;
            }
            if y + 1 < h {
                if x > 0 {
                    levels[i + w - 1] += err * 3.0 / 16.0;
                }
                levels[i + w] += err * 5.0 / 16.0;
                if x + 1 < w {
                    levels[i + w + 1] += err / 16.0;
                }
            }
        }
    }

    for (px, level) in image.pixels_mut().zip(levels) {
        let v = to_u8(level);
        px.0 = [v, v, v, px.0[3]];
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, rgba: [u8; 4]) -> PixelBuffer {
        PixelBuffer::from_fn(w, h, |_, _| rgba)
    }

    // --- FilterSpec ---

    #[test]
    fn project_keeps_only_filter_fields() {
        let fields = serde_json::json!({
            "id": "op-1",
            "passes": 3,
            "brightness": 20,
            "grayscale": "luma",
            "dithering": true,
            "gamma": null,
        });
        let spec = FilterSpec::project(fields.as_object().unwrap());
        let names: Vec<&str> = spec.iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["brightness", "dithering", "grayscale"]);
        assert_eq!(spec.get("brightness"), Some(&FilterValue::Number(20.0)));
    }

    #[test]
    fn equality_ignores_insertion_order() {
        let a = FilterSpec::new().with("contrast", 10.0).with("smoothing", true);
        let b = FilterSpec::new().with("smoothing", true).with("contrast", 10.0);
        assert_eq!(a, b);
        assert_ne!(a, b.with("contrast", 11.0));
    }

    #[test]
    fn spec_serializes_as_plain_object() {
        let spec = FilterSpec::new()
            .with("grayscale", "average")
            .with("invertColor", true);
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"grayscale": "average", "invertColor": true})
        );
        let back: FilterSpec = serde_json::from_value(json).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn value_coercions() {
        assert!(FilterValue::Number(1.0).as_flag());
        assert!(!FilterValue::Number(0.0).as_flag());
        assert!(FilterValue::from("true").as_flag());
        assert_eq!(FilterValue::from(" 12.5 ").as_number(), Some(12.5));
        assert_eq!(FilterValue::Number(f64::NAN).as_number(), None);
        assert_eq!(FilterValue::Flag(true).as_number(), None);
    }

    // --- FilterSettings ---

    #[test]
    fn settings_clamp_out_of_range_values() {
        let spec = FilterSpec::new()
            .with("brightness", 900.0)
            .with("contrast", -900.0)
            .with("gamma", 50.0)
            .with("shadesOfGray", 1.0);
        let s = spec.settings();
        assert!((s.brightness - 255.0).abs() < f64::EPSILON);
        assert!((s.contrast + 255.0).abs() < f64::EPSILON);
        assert_eq!(s.gamma, Some(7.99));
        assert_eq!(s.shades_of_gray, 2);
    }

    #[test]
    fn zero_gamma_disables() {
        assert_eq!(FilterSpec::new().with("gamma", 0.0).settings().gamma, None);
        assert_eq!(
            FilterSpec::new().with("gamma", -3.0).settings().gamma,
            Some(0.01)
        );
    }

    #[test]
    fn unknown_grayscale_name_is_none() {
        let s = FilterSpec::new().with("grayscale", "sepia").settings();
        assert_eq!(s.grayscale, GrayscaleAlgorithm::None);
    }

    #[test]
    fn grayscale_names_round_trip() {
        for algo in GrayscaleAlgorithm::ALL {
            assert_eq!(GrayscaleAlgorithm::from_name(algo.name()), Some(algo));
        }
    }

    // --- apply_filters ---

    #[test]
    fn empty_spec_is_identity() {
        let buf = PixelBuffer::from_fn(5, 4, |x, y| [x as u8 * 40, y as u8 * 60, 7, 200]);
        assert_eq!(apply_filters(&buf, &FilterSpec::new()), buf);
    }

    #[test]
    fn unknown_filter_names_are_ignored() {
        let buf = solid(3, 3, [10, 20, 30, 255]);
        let spec = FilterSpec::new().with("sharpen", 5.0);
        assert_eq!(apply_filters(&buf, &spec), buf);
    }

    #[test]
    fn invert_preserves_alpha() {
        let buf = solid(2, 2, [10, 200, 255, 77]);
        let out = apply_filters(&buf, &FilterSpec::new().with("invertColor", true));
        assert_eq!(out.pixel(1, 1), [245, 55, 0, 77]);
    }

    #[test]
    fn brightness_is_additive_and_clamped() {
        let buf = solid(1, 1, [100, 250, 5, 255]);
        let out = apply_filters(&buf, &FilterSpec::new().with("brightness", 20.0));
        assert_eq!(out.pixel(0, 0), [120, 255, 25, 255]);
        let out = apply_filters(&buf, &FilterSpec::new().with("brightness", -20.0));
        assert_eq!(out.pixel(0, 0), [80, 230, 0, 255]);
    }

    #[test]
    fn contrast_pivots_around_128() {
        let buf = solid(1, 1, [128, 100, 160, 255]);
        let out = apply_filters(&buf, &FilterSpec::new().with("contrast", 100.0));
        let [r, g, b, _] = out.pixel(0, 0);
        assert_eq!(r, 128);
        assert!(g < 100);
        assert!(b > 160);
    }

    #[test]
    fn gamma_brightens_midtones_above_one() {
        let buf = solid(1, 1, [64, 128, 255, 255]);
        let out = apply_filters(&buf, &FilterSpec::new().with("gamma", 2.0));
        let [r, g, b, _] = out.pixel(0, 0);
        assert!(r > 64);
        assert!(g > 128);
        assert_eq!(b, 255);
    }

    #[test]
    fn grayscale_luma_709() {
        let buf = solid(1, 1, [255, 0, 0, 255]);
        let out = apply_filters(&buf, &FilterSpec::new().with("grayscale", "luma-709"));
        // 0.2126 * 255 = 54.2
        assert_eq!(out.pixel(0, 0), [54, 54, 54, 255]);
    }

    #[test]
    fn grayscale_decomposition_and_channels() {
        let buf = solid(1, 1, [30, 120, 200, 255]);
        let gray = |name: &str| apply_filters(&buf, &FilterSpec::new().with("grayscale", name)).pixel(0, 0)[0];
        assert_eq!(gray("decomposition-min"), 30);
        assert_eq!(gray("decomposition-max"), 200);
        assert_eq!(gray("desaturation"), 115);
        assert_eq!(gray("green-chanel"), 120);
        assert_eq!(gray("average"), 117);
    }

    #[test]
    fn shades_of_gray_posterizes() {
        let buf = PixelBuffer::from_fn(256, 1, |x, _| {
            let v = x as u8;
            [v, v, v, 255]
        });
        let spec = FilterSpec::new()
            .with("grayscale", "average")
            .with("shadesOfGray", 2.0);
        let out = apply_filters(&buf, &spec);
        for x in 0..256 {
            let v = out.pixel(x, 0)[0];
            assert!(v == 0 || v == 255, "pixel {x} has level {v}");
        }
    }

    #[test]
    fn shades_of_gray_without_grayscale_has_no_effect() {
        let buf = solid(2, 2, [33, 66, 99, 255]);
        let out = apply_filters(&buf, &FilterSpec::new().with("shadesOfGray", 4.0));
        assert_eq!(out, buf);
    }

    #[test]
    fn dithering_outputs_only_black_and_white() {
        let buf = PixelBuffer::from_fn(16, 16, |x, y| {
            let v = (x * 16 + y) as u8;
            [v, v, v, 128]
        });
        let out = apply_filters(&buf, &FilterSpec::new().with("dithering", true));
        for px in out.image().pixels() {
            assert!(px.0[0] == 0 || px.0[0] == 255);
            assert_eq!(px.0[0], px.0[1]);
            assert_eq!(px.0[1], px.0[2]);
            assert_eq!(px.0[3], 128);
        }
    }

    #[test]
    fn dithering_mid_gray_is_roughly_half_white() {
        let buf = solid(20, 20, [128, 128, 128, 255]);
        let out = apply_filters(&buf, &FilterSpec::new().with("dithering", true));
        let white = out.image().pixels().filter(|p| p.0[0] == 255).count();
        assert!((150..=250).contains(&white), "white count {white}");
    }

    #[test]
    fn stage_order_is_fixed() {
        // Invert before brightness: 200 -> 55 -> 75.
        let buf = solid(1, 1, [200, 200, 200, 255]);
        let spec = FilterSpec::new()
            .with("brightness", 20.0)
            .with("invertColor", true);
        assert_eq!(apply_filters(&buf, &spec).pixel(0, 0)[0], 75);
    }

    #[test]
    fn smoothing_keeps_dimensions() {
        let buf = PixelBuffer::from_fn(9, 7, |x, _| if x < 4 { [0, 0, 0, 255] } else { [255; 4] });
        let out = apply_filters(&buf, &FilterSpec::new().with("smoothing", true));
        assert_eq!(out.dimensions(), buf.dimensions());
        assert_ne!(out, buf);
    }
}
