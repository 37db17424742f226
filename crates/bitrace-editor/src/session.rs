//! Trace-then-import flow.
//!
//! A [`TraceSession`] holds the tracing parameters chosen in the trace
//! dialog, runs one trace at a time on the selected document, and hands
//! the last traced drawing to a [`DocumentImporter`] on commit.
//!
//! Like the preview, tracing is split into a job and a completion so the
//! host decides where the work runs. Completions are checked against the
//! session's liveness token and generation before they are stored.

use bitrace_export::{ImportRequest, SvgMetadata, Transform2d, resolve_embedded_images};
use bitrace_pipeline::{
    CalibratedDocument, FilterSpec, PhysicalSize, Pipeline, PipelineError, TraceParams,
    TraceParamsPatch,
};

use crate::config::EditorConfig;
use crate::error::EditorError;
use crate::liveness::{LivenessSource, LivenessToken};
use crate::store::SourceDocument;

/// Adds traced drawings to the document store.
pub trait DocumentImporter {
    /// Import `request` as a new document.
    ///
    /// # Errors
    ///
    /// A human-readable reason when the store rejects the document.
    fn import(&mut self, request: ImportRequest) -> Result<(), String>;
}

impl<F> DocumentImporter for F
where
    F: FnMut(ImportRequest) -> Result<(), String>,
{
    fn import(&mut self, request: ImportRequest) -> Result<(), String> {
        self(request)
    }
}

/// The result of the last completed trace.
#[derive(Debug, Clone, PartialEq)]
pub struct TracedDrawing {
    /// Name of the document it was traced from.
    pub source_name: String,
    /// Transform of the source document.
    pub transform2d: Option<Transform2d>,
    /// Parameters the drawing was traced with.
    pub params: TraceParams,
    /// The traced contours in millimetres.
    pub document: CalibratedDocument,
}

/// A trace ready to run.
#[derive(Debug)]
#[must_use = "a trace job does nothing until run"]
pub struct TraceJob {
    source: SourceDocument,
    filters: FilterSpec,
    params: TraceParams,
    default_dpi: f64,
    generation: u64,
    token: LivenessToken,
}

impl TraceJob {
    /// The document being traced.
    #[must_use]
    pub const fn source(&self) -> &SourceDocument {
        &self.source
    }

    /// Decode, filter, trace and calibrate.
    ///
    /// Documents without a physical size are calibrated at the
    /// configured default DPI.
    pub fn run(self) -> TraceOutcome {
        let result = self.trace();
        TraceOutcome {
            generation: self.generation,
            token: self.token,
            source_name: self.source.name,
            transform2d: self.source.transform2d,
            params: self.params,
            result,
        }
    }

    fn trace(&self) -> Result<CalibratedDocument, PipelineError> {
        let traced = Pipeline::new(self.source.image.clone())
            .decode()?
            .filter(&self.filters)
            .trace(&self.params);
        let physical = self
            .source
            .physical
            .unwrap_or_else(|| PhysicalSize::from_dpi(traced.dimensions(), self.default_dpi));
        Ok(traced.calibrate(physical)?.into_document())
    }
}

/// The result of a [`TraceJob`], to hand back to
/// [`TraceSession::complete`].
#[derive(Debug)]
pub struct TraceOutcome {
    generation: u64,
    token: LivenessToken,
    source_name: String,
    transform2d: Option<Transform2d>,
    params: TraceParams,
    result: Result<CalibratedDocument, PipelineError>,
}

impl TraceOutcome {
    /// The traced document, or why tracing failed.
    #[must_use]
    pub const fn result(&self) -> &Result<CalibratedDocument, PipelineError> {
        &self.result
    }
}

/// Per-instance trace dialog state.
#[derive(Debug)]
pub struct TraceSession {
    config: EditorConfig,
    params: TraceParams,
    filters: FilterSpec,
    liveness: LivenessSource,
    generation: u64,
    in_flight: Option<u64>,
    traced: Option<TracedDrawing>,
}

impl TraceSession {
    /// A session with default tracing parameters and no filters.
    #[must_use]
    pub fn new(config: EditorConfig) -> Self {
        Self {
            config: config.validated(),
            params: TraceParams::default(),
            filters: FilterSpec::new(),
            liveness: LivenessSource::new(),
            generation: 0,
            in_flight: None,
            traced: None,
        }
    }

    /// Current tracing parameters.
    #[must_use]
    pub const fn params(&self) -> &TraceParams {
        &self.params
    }

    /// Filters applied before tracing.
    #[must_use]
    pub const fn filters(&self) -> &FilterSpec {
        &self.filters
    }

    /// The last completed trace.
    #[must_use]
    pub const fn traced(&self) -> Option<&TracedDrawing> {
        self.traced.as_ref()
    }

    /// Whether a trace has been issued and not yet completed.
    #[must_use]
    pub const fn is_tracing(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Merge `patch` into the parameters.
    pub fn update_params(&mut self, patch: &TraceParamsPatch) {
        self.params = self.params.merged(patch);
        tracing::debug!(params = ?self.params, "trace parameters updated");
    }

    /// Replace the filters applied before tracing.
    pub fn set_filters(&mut self, filters: FilterSpec) {
        self.filters = filters;
    }

    /// Start a trace of `selected`.
    ///
    /// Returns `Ok(None)` when a trace is already running; the request
    /// is ignored rather than queued.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::NoDocumentSelected`] when `selected` is
    /// `None`.
    pub fn request(
        &mut self,
        selected: Option<&SourceDocument>,
    ) -> Result<Option<TraceJob>, EditorError> {
        let source = selected.ok_or(EditorError::NoDocumentSelected)?;
        if let Some(generation) = self.in_flight {
            tracing::debug!(generation, "trace already running, request ignored");
            return Ok(None);
        }

        self.generation += 1;
        self.in_flight = Some(self.generation);
        tracing::debug!(
            generation = self.generation,
            document = %source.id,
            "trace requested"
        );
        Ok(Some(TraceJob {
            source: source.clone(),
            filters: self.filters.clone(),
            params: self.params,
            default_dpi: self.config.default_dpi,
            generation: self.generation,
            token: self.liveness.token(),
        }))
    }

    /// Store a finished trace.
    ///
    /// Returns `Ok(true)` when the result was stored and `Ok(false)` when
    /// it was dropped as stale or post-teardown. A failed trace keeps the
    /// previous drawing.
    ///
    /// # Errors
    ///
    /// [`EditorError::Load`] or [`EditorError::Calibration`] when the
    /// trace failed.
    pub fn complete(&mut self, outcome: TraceOutcome) -> Result<bool, EditorError> {
        if !outcome.token.is_alive() {
            tracing::debug!(
                generation = outcome.generation,
                "dropping trace for torn-down session"
            );
            return Ok(false);
        }
        if self.in_flight != Some(outcome.generation) {
            tracing::debug!(generation = outcome.generation, "dropping stale trace");
            return Ok(false);
        }
        self.in_flight = None;

        match outcome.result {
            Ok(document) => {
                tracing::info!(
                    source = %outcome.source_name,
                    contours = document.contours().len(),
                    view_box = %document.view_box(),
                    "trace complete"
                );
                self.traced = Some(TracedDrawing {
                    source_name: outcome.source_name,
                    transform2d: outcome.transform2d,
                    params: outcome.params,
                    document,
                });
                Ok(true)
            }
            Err(PipelineError::Calibration(error)) => {
                tracing::warn!(%error, "trace could not be calibrated");
                Err(EditorError::Calibration(error))
            }
            Err(error) => {
                tracing::warn!(%error, "trace failed");
                Err(EditorError::Load(error))
            }
        }
    }

    /// The import payload for the last traced drawing.
    ///
    /// The SVG is titled after the source document and records the
    /// parameters the drawing was traced with in its metadata.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::NothingTraced`] before the first completed
    /// trace and [`EditorError::Metadata`] if the parameters cannot be
    /// serialized.
    pub fn import_request(&self) -> Result<ImportRequest, EditorError> {
        let drawing = self.traced.as_ref().ok_or(EditorError::NothingTraced)?;
        let params_json =
            serde_json::to_string(&drawing.params).map_err(EditorError::Metadata)?;
        let metadata = SvgMetadata {
            title: Some(drawing.source_name.as_str()),
            description: None,
            params_json: Some(params_json.as_str()),
        };
        Ok(ImportRequest::new(
            &drawing.source_name,
            &drawing.document,
            &metadata,
            drawing.transform2d,
        ))
    }

    /// Import the last traced drawing through `importer`.
    ///
    /// Embedded images in the markup tree are resolved first so the
    /// importer sees their natural sizes.
    ///
    /// # Errors
    ///
    /// [`EditorError::NothingTraced`] before the first completed trace;
    /// [`EditorError::Import`] when the importer rejects the document.
    pub fn commit(&self, importer: &mut impl DocumentImporter) -> Result<(), EditorError> {
        let mut request = self.import_request()?;
        let resolution = resolve_embedded_images(&mut request.tree);
        if !resolution.failed.is_empty() {
            tracing::warn!(
                failed = resolution.failed.len(),
                "some embedded images could not be resolved"
            );
        }
        let name = request.name.clone();
        importer.import(request).map_err(EditorError::Import)?;
        tracing::info!(%name, "traced drawing imported");
        Ok(())
    }

    /// Start a fresh lifecycle. Parameters and the last drawing are kept.
    pub fn mount(&mut self) {
        self.liveness = LivenessSource::new();
        self.in_flight = None;
    }

    /// Tear down. Outstanding jobs complete into nothing.
    pub fn unmount(&mut self) {
        self.liveness.revoke();
        self.in_flight = None;
    }
}

impl Default for TraceSession {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tracing_test::traced_test;

    use bitrace_pipeline::{ImageSource, PixelBuffer, TurnPolicy};

    use super::*;

    /// A white image with one black square.
    fn square_png(size: u32, lo: u32, hi: u32) -> ImageSource {
        let buffer = PixelBuffer::from_fn(size, size, |x, y| {
            if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
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
        ImageSource::from(bytes)
    }

    fn document() -> SourceDocument {
        SourceDocument::new("doc", "logo.png", square_png(20, 5, 15))
    }

    #[test]
    fn trace_without_selection_is_an_error() {
        let mut session = TraceSession::default();
        assert!(matches!(
            session.request(None),
            Err(EditorError::NoDocumentSelected)
        ));
        assert!(!session.is_tracing());
    }

    #[test]
    fn trace_at_default_dpi() {
        let mut session = TraceSession::default();
        let doc = document();
        let job = session.request(Some(&doc)).unwrap().unwrap();
        assert!(session.is_tracing());
        assert!(session.complete(job.run()).unwrap());
        assert!(!session.is_tracing());

        let drawing = session.traced().unwrap();
        assert_eq!(drawing.source_name, "logo.png");
        assert_eq!(drawing.document.contours().len(), 1);
        // 20 px at 96 DPI.
        let expected_mm = 20.0 * 25.4 / 96.0;
        assert!((drawing.document.physical_size().width_mm - expected_mm).abs() < 1e-9);
    }

    #[test]
    fn trace_uses_the_declared_physical_size() {
        let mut session = TraceSession::default();
        let doc = document()
            .with_physical(PhysicalSize::new(40.0, 40.0))
            .with_transform([1.0, 0.0, 0.0, 1.0, 3.0, 4.0]);
        let job = session.request(Some(&doc)).unwrap().unwrap();
        session.complete(job.run()).unwrap();

        let drawing = session.traced().unwrap();
        assert_eq!(drawing.document.width_attr(), "40.000mm");
        assert_eq!(drawing.transform2d, Some([1.0, 0.0, 0.0, 1.0, 3.0, 4.0]));
        let (lo, hi) = drawing.document.contours()[0].bounds().unwrap();
        // 2 mm per pixel; the square spans pixels 5..15.
        assert!((lo.x - 10.0).abs() < 1.5 && (hi.x - 30.0).abs() < 1.5);
    }

    #[test]
    #[traced_test]
    fn second_request_while_tracing_is_ignored() {
        let mut session = TraceSession::default();
        let doc = document();
        let first = session.request(Some(&doc)).unwrap().unwrap();
        assert!(session.request(Some(&doc)).unwrap().is_none());
        assert!(logs_contain("trace already running"));

        assert!(session.complete(first.run()).unwrap());
        assert!(session.request(Some(&doc)).unwrap().is_some());
    }

    #[test]
    #[traced_test]
    fn completion_after_teardown_is_dropped() {
        let mut session = TraceSession::default();
        let doc = document();
        let job = session.request(Some(&doc)).unwrap().unwrap();
        session.unmount();
        assert!(!session.complete(job.run()).unwrap());
        assert!(session.traced().is_none());
        assert!(logs_contain("dropping trace for torn-down session"));

        session.mount();
        let job = session.request(Some(&doc)).unwrap().unwrap();
        assert!(session.complete(job.run()).unwrap());
    }

    #[test]
    fn failed_trace_keeps_the_previous_drawing() {
        let mut session = TraceSession::default();
        let good = document();
        let job = session.request(Some(&good)).unwrap().unwrap();
        session.complete(job.run()).unwrap();

        let broken = SourceDocument::new("bad", "broken.png", ImageSource::from(Vec::new()));
        let job = session.request(Some(&broken)).unwrap().unwrap();
        let err = session.complete(job.run()).unwrap_err();
        assert!(matches!(err, EditorError::Load(PipelineError::EmptyInput)));
        assert!(!session.is_tracing());
        assert_eq!(session.traced().unwrap().source_name, "logo.png");
    }

    #[test]
    fn bad_physical_size_is_a_calibration_error() {
        let mut session = TraceSession::default();
        let doc = document().with_physical(PhysicalSize::new(0.0, 10.0));
        let job = session.request(Some(&doc)).unwrap().unwrap();
        assert!(matches!(
            session.complete(job.run()),
            Err(EditorError::Calibration(_))
        ));
    }

    #[test]
    fn params_patch_applies_to_the_next_trace() {
        let mut session = TraceSession::default();
        session.update_params(&TraceParamsPatch {
            turn_policy: Some(TurnPolicy::Black),
            curve_optimization: Some(false),
            min_feature_size: Some(-4.0),
            ..TraceParamsPatch::default()
        });
        assert_eq!(session.params().turn_policy, TurnPolicy::Black);
        assert_eq!(session.params().min_feature_size, 0);
        assert!(!session.params().curve_optimization);

        let doc = document();
        let job = session.request(Some(&doc)).unwrap().unwrap();
        session.complete(job.run()).unwrap();
        let contour = &session.traced().unwrap().document.contours()[0];
        assert!(
            contour
                .segments
                .iter()
                .all(|s| matches!(s, bitrace_pipeline::Segment::Line { .. }))
        );
    }

    #[test]
    fn inverted_filter_traces_the_background() {
        let mut session = TraceSession::default();
        session.set_filters(FilterSpec::new().with("invertColor", true));
        let doc = document();
        let job = session.request(Some(&doc)).unwrap().unwrap();
        session.complete(job.run()).unwrap();
        // The whole frame becomes foreground with the square as a hole.
        assert_eq!(session.traced().unwrap().document.contours().len(), 2);
    }

    #[test]
    fn commit_before_trace_is_an_error() {
        let session = TraceSession::default();
        let mut importer = |_: ImportRequest| -> Result<(), String> { Ok(()) };
        assert!(matches!(
            session.commit(&mut importer),
            Err(EditorError::NothingTraced)
        ));
    }

    #[test]
    fn commit_hands_the_drawing_to_the_importer() {
        let mut session = TraceSession::default();
        let doc = document().with_transform([2.0, 0.0, 0.0, 2.0, 0.0, 0.0]);
        let job = session.request(Some(&doc)).unwrap().unwrap();
        session.complete(job.run()).unwrap();

        let mut imported = Vec::new();
        let mut importer = |request: ImportRequest| -> Result<(), String> {
            imported.push(request);
            Ok(())
        };
        session.commit(&mut importer).unwrap();

        assert_eq!(imported.len(), 1);
        let request = &imported[0];
        assert_eq!(request.name, "Traced logo.png");
        assert_eq!(request.media_type, "image/svg+xml");
        assert_eq!(request.transform2d, Some([2.0, 0.0, 0.0, 2.0, 0.0, 0.0]));
        assert!(request.markup.contains("<title>logo.png</title>"));
        assert!(request.markup.contains("turn_policy"));
    }

    #[test]
    fn metadata_records_the_parameters_of_the_traced_drawing() {
        let mut session = TraceSession::default();
        let doc = document();
        let job = session.request(Some(&doc)).unwrap().unwrap();
        session.complete(job.run()).unwrap();

        session.update_params(&TraceParamsPatch {
            turn_policy: Some(TurnPolicy::Left),
            corner_threshold: Some(0.25),
            ..TraceParamsPatch::default()
        });
        assert_eq!(session.params().turn_policy, TurnPolicy::Left);
        assert_eq!(session.traced().unwrap().params, TraceParams::default());

        let request = session.import_request().unwrap();
        let nodes = request
            .tree
            .collect_depth_first(|el| el.name == "bitrace:params");
        let json = nodes[0].value.text.as_deref().unwrap();
        let recorded: TraceParams = serde_json::from_str(json).unwrap();
        assert_eq!(recorded, TraceParams::default());
    }

    #[test]
    fn importer_rejection_is_reported() {
        let mut session = TraceSession::default();
        let doc = document();
        let job = session.request(Some(&doc)).unwrap().unwrap();
        session.complete(job.run()).unwrap();

        let mut importer =
            |_: ImportRequest| -> Result<(), String> { Err("store is read-only".to_owned()) };
        let err = session.commit(&mut importer).unwrap_err();
        assert_eq!(err.to_string(), "import failed: store is read-only");
    }
}
