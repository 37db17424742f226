//! bitrace-editor: per-instance editor state.
//!
//! Owns everything that depends on time and lifecycle: the debounced
//! filter preview ([`PreviewScheduler`]), the trace-then-import flow
//! ([`TraceSession`]) and the liveness guard both share so that nothing
//! completes into a torn-down instance.
//!
//! The store, the render surface and the importer are collaborators
//! reached through [`store::Observation`], [`RenderSurface`] and
//! [`DocumentImporter`]. Nothing here touches the browser or the
//! filesystem.

pub mod config;
pub mod error;
pub mod liveness;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod surface;

pub use config::EditorConfig;
pub use error::EditorError;
pub use liveness::{LivenessSource, LivenessToken};
pub use scheduler::{DebounceWindow, PreviewScheduler, RenderJob, RenderOutcome};
pub use session::{DocumentImporter, TraceJob, TraceOutcome, TraceSession, TracedDrawing};
pub use store::{Observation, Operation, SourceDocument};
pub use surface::{BufferSurface, RenderSurface};
