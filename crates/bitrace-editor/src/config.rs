//! Editor configuration.
//!
//! | Field | Default | Range | Description |
//! |-------|---------|-------|-------------|
//! | `debounce_ms` | 200 | 0-5000 | Quiet period before a preview re-render |
//! | `default_dpi` | 96 | > 0 | Resolution assumed for documents without a physical size |
//!
//! # Environment Variables
//!
//! | Variable | Type | Default | Description |
//! |----------|------|---------|-------------|
//! | `BITRACE_DEBOUNCE_MS` | u64 | 200 | Preview debounce |

use serde::{Deserialize, Serialize};
use web_time::Duration;

use crate::error::EditorError;

/// Default preview debounce.
pub const DEFAULT_DEBOUNCE_MS: u64 = 200;

/// Upper bound for the preview debounce.
pub const MAX_DEBOUNCE_MS: u64 = 5000;

/// Default resolution for documents without a physical size.
pub const DEFAULT_DPI: f64 = 96.0;

/// Per-instance editor settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Quiet period, in milliseconds, a filter change must survive
    /// before the preview re-renders.
    pub debounce_ms: u64,
    /// Dots per inch assumed when a document declares no physical size.
    pub default_dpi: f64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            default_dpi: DEFAULT_DPI,
        }
    }
}

impl EditorConfig {
    /// Set the debounce.
    #[must_use]
    pub const fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    /// The debounce as a [`Duration`].
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Parse from JSON; missing fields take their defaults. The result
    /// is [`validated`](Self::validated).
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::Config`] for malformed JSON.
    pub fn from_json(json: &str) -> Result<Self, EditorError> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.validated())
    }

    /// Defaults overridden by `BITRACE_DEBOUNCE_MS` when it parses.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(val) = std::env::var("BITRACE_DEBOUNCE_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            config.debounce_ms = ms;
        }
        config.validated()
    }

    /// Clamp every field into its documented range.
    #[must_use]
    pub fn validated(mut self) -> Self {
        self.debounce_ms = self.debounce_ms.min(MAX_DEBOUNCE_MS);
        if !(self.default_dpi.is_finite() && self.default_dpi > 0.0) {
            self.default_dpi = DEFAULT_DPI;
        }
        self
    }
}
