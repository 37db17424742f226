//! Editor error type.

use bitrace_pipeline::{CalibrationError, PipelineError};

/// Errors surfaced to the editor's caller.
///
/// Lifecycle races (stale or post-teardown completions) are never
/// errors; they are dropped with a debug log.
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    /// A trace was requested with no document selected.
    #[error("no document selected")]
    NoDocumentSelected,

    /// The source image could not be loaded.
    #[error("failed to load source image: {0}")]
    Load(#[from] PipelineError),

    /// The traced contours could not be scaled to the document's size.
    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    /// Import was requested before anything was traced.
    #[error("nothing has been traced yet")]
    NothingTraced,

    /// The import collaborator rejected the traced document.
    #[error("import failed: {0}")]
    Import(String),

    /// Trace parameters could not be serialized into the SVG metadata.
    #[error("failed to serialize trace metadata: {0}")]
    Metadata(#[source] serde_json::Error),

    /// Editor configuration could not be parsed.
    #[error("invalid editor configuration: {0}")]
    Config(#[from] serde_json::Error),
}
