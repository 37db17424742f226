//! Debounced filter preview.
//!
//! The scheduler watches store snapshots and re-renders the filtered
//! preview once the filter settings have stopped changing for the
//! configured quiet period. It is driven entirely by the caller's clock:
//!
//! ```text
//! observe(snapshot, now)   every change notification
//! tick(now)                on a timer; renders when a window expires
//! ```
//!
//! Rendering is split into [`RenderJob::run`] and
//! [`PreviewScheduler::present`] so a host can run the job elsewhere and
//! deliver the outcome later. Every outcome carries the liveness token
//! and generation it was issued with; outcomes that arrive after
//! teardown, or after a newer window started, are dropped.

use web_time::Instant;

use bitrace_pipeline::{FilterSpec, Pipeline, PipelineError, PixelBuffer};

use crate::config::EditorConfig;
use crate::error::EditorError;
use crate::liveness::{LivenessSource, LivenessToken};
use crate::store::{Observation, SourceDocument};
use crate::surface::RenderSurface;

/// What a rendered preview depends on.
#[derive(Debug, Clone, PartialEq)]
struct PreviewKey {
    spec: FilterSpec,
    document: Option<String>,
}

/// A pending re-render waiting out its quiet period.
#[derive(Debug, Clone)]
pub struct DebounceWindow {
    deadline: Instant,
    generation: u64,
    target: PreviewKey,
    source: Option<SourceDocument>,
}

impl DebounceWindow {
    /// When the window expires.
    #[must_use]
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Generation the render will be tagged with.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// The filter settings that will be rendered.
    #[must_use]
    pub const fn spec(&self) -> &FilterSpec {
        &self.target.spec
    }
}

/// A render ready to run.
#[derive(Debug)]
#[must_use = "a render job does nothing until run"]
pub struct RenderJob {
    spec: FilterSpec,
    source: SourceDocument,
    generation: u64,
    token: LivenessToken,
}

impl RenderJob {
    /// The document being rendered.
    #[must_use]
    pub const fn source(&self) -> &SourceDocument {
        &self.source
    }

    /// The filter settings being rendered.
    #[must_use]
    pub const fn spec(&self) -> &FilterSpec {
        &self.spec
    }

    /// Decode the source image and apply the filters.
    pub fn run(self) -> RenderOutcome {
        let result = Pipeline::new(self.source.image.clone())
            .decode()
            .map(|decoded| decoded.filter(&self.spec).into_filtered());
        RenderOutcome {
            generation: self.generation,
            token: self.token,
            result,
        }
    }
}

/// The result of a [`RenderJob`], to hand back to
/// [`PreviewScheduler::present`].
#[derive(Debug)]
pub struct RenderOutcome {
    generation: u64,
    token: LivenessToken,
    result: Result<PixelBuffer, PipelineError>,
}

impl RenderOutcome {
    /// The filtered buffer, or why it could not be produced.
    #[must_use]
    pub const fn result(&self) -> &Result<PixelBuffer, PipelineError> {
        &self.result
    }
}

/// Per-instance preview state.
///
/// One scheduler belongs to one editor instance and is never shared.
pub struct PreviewScheduler<S: RenderSurface> {
    surface: S,
    config: EditorConfig,
    liveness: LivenessSource,
    mounted: bool,
    applied: Option<PreviewKey>,
    in_flight: Option<(u64, PreviewKey)>,
    pending: Option<DebounceWindow>,
    generation: u64,
}

impl<S: RenderSurface> PreviewScheduler<S> {
    /// A mounted scheduler drawing to `surface`. The surface starts hidden.
    pub fn new(mut surface: S, config: EditorConfig) -> Self {
        surface.set_visible(false);
        Self {
            surface,
            config: config.validated(),
            liveness: LivenessSource::new(),
            mounted: true,
            applied: None,
            in_flight: None,
            pending: None,
            generation: 0,
        }
    }

    /// The render surface.
    pub const fn surface(&self) -> &S {
        &self.surface
    }

    /// Whether a debounce window is open.
    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// The open debounce window, if any.
    pub const fn pending(&self) -> Option<&DebounceWindow> {
        self.pending.as_ref()
    }

    /// Whether the scheduler is between [`mount`](Self::mount) and
    /// [`unmount`](Self::unmount).
    pub const fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// React to a store snapshot taken at `now`.
    ///
    /// Visibility follows the snapshot immediately. A change in filter
    /// settings or target document (re)starts the debounce window; a
    /// snapshot matching what the surface shows, or is about to show,
    /// cancels any open window.
    pub fn observe(&mut self, observation: &Observation, now: Instant) {
        if !self.mounted {
            return;
        }

        self.surface.set_visible(observation.preview_visible());

        let Some(op) = observation.raster_operation() else {
            self.cancel();
            return;
        };

        let target_doc = observation.target_document();
        let key = PreviewKey {
            spec: op.filter_spec(),
            document: target_doc.map(|doc| doc.id.clone()),
        };

        if self.settled_key() == Some(&key) {
            self.cancel();
            return;
        }
        if self.pending.as_ref().is_some_and(|w| w.target == key) {
            return;
        }

        self.generation += 1;
        tracing::trace!(
            generation = self.generation,
            filters = key.spec.iter().count(),
            "debounce window opened"
        );
        self.pending = Some(DebounceWindow {
            deadline: now + self.config.debounce(),
            generation: self.generation,
            target: key,
            source: target_doc.cloned(),
        });
    }

    /// Take the render due at `now`, if its window has expired.
    ///
    /// While the job is out, observing its settings again does not
    /// schedule another render.
    pub fn poll(&mut self, now: Instant) -> Option<RenderJob> {
        if !self.mounted || self.pending.as_ref().is_none_or(|w| w.deadline > now) {
            return None;
        }
        let window = self.pending.take()?;

        let Some(source) = window.source else {
            tracing::debug!(
                generation = window.generation,
                "no target document, nothing to render"
            );
            self.applied = Some(window.target);
            self.in_flight = None;
            return None;
        };
        self.in_flight = Some((window.generation, window.target.clone()));
        Some(RenderJob {
            spec: window.target.spec,
            source,
            generation: window.generation,
            token: self.liveness.token(),
        })
    }

    /// Paint a finished render.
    ///
    /// Returns `Ok(true)` when the surface was painted and `Ok(false)`
    /// when the outcome was dropped as stale or post-teardown.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::Load`] when the render failed; the surface
    /// keeps its previous contents.
    pub fn present(&mut self, outcome: RenderOutcome) -> Result<bool, EditorError> {
        if !outcome.token.is_alive() {
            tracing::debug!(
                generation = outcome.generation,
                "dropping render for torn-down preview"
            );
            return Ok(false);
        }
        let issued = self
            .in_flight
            .as_ref()
            .is_some_and(|(generation, _)| *generation == outcome.generation);
        if !issued || self.pending.is_some() {
            tracing::debug!(
                generation = outcome.generation,
                current = self.generation,
                "dropping stale render"
            );
            if issued {
                self.in_flight = None;
            }
            return Ok(false);
        }
        self.applied = self.in_flight.take().map(|(_, key)| key);
        match outcome.result {
            Ok(buffer) => {
                self.surface.paint(&buffer);
                tracing::debug!(
                    generation = outcome.generation,
                    width = buffer.width(),
                    height = buffer.height(),
                    "preview painted"
                );
                Ok(true)
            }
            Err(error) => {
                tracing::warn!(%error, "preview render failed");
                Err(EditorError::Load(error))
            }
        }
    }

    /// [`poll`](Self::poll), run and [`present`](Self::present) in one
    /// step. Returns `Ok(false)` when nothing was due.
    ///
    /// # Errors
    ///
    /// See [`present`](Self::present).
    pub fn tick(&mut self, now: Instant) -> Result<bool, EditorError> {
        match self.poll(now) {
            Some(job) => self.present(job.run()),
            None => Ok(false),
        }
    }

    /// Start a fresh lifecycle. Anything issued before is invalidated.
    pub fn mount(&mut self) {
        self.liveness = LivenessSource::new();
        self.mounted = true;
        self.applied = None;
        self.in_flight = None;
        self.pending = None;
        self.surface.set_visible(false);
    }

    /// Tear down: cancel the open window, invalidate outstanding jobs and
    /// hide the surface.
    pub fn unmount(&mut self) {
        self.liveness.revoke();
        self.cancel();
        self.in_flight = None;
        self.mounted = false;
        self.surface.set_visible(false);
    }

    /// The settings the surface shows once the outstanding render, if
    /// any, lands.
    fn settled_key(&self) -> Option<&PreviewKey> {
        self.in_flight
            .as_ref()
            .map(|(_, key)| key)
            .or(self.applied.as_ref())
    }

    fn cancel(&mut self) {
        if let Some(window) = self.pending.take() {
            tracing::trace!(generation = window.generation, "debounce window cancelled");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tracing_test::traced_test;
    use web_time::Duration;

    use bitrace_pipeline::ImageSource;

    use super::*;
    use crate::store::Operation;
    use crate::surface::BufferSurface;

    fn png(width: u32, height: u32) -> ImageSource {
        let buffer = PixelBuffer::from_fn(width, height, |x, _| {
            if x < width / 2 {
                [0, 0, 0, 255]
            } else {
                [200, 200, 200, 255]
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

    fn observation(brightness: i32, image: ImageSource) -> Observation {
        let fields = serde_json::json!({ "brightness": brightness, "passes": 1 });
        Observation {
            enabled: true,
            operation: Some(Operation {
                id: "op".into(),
                kind: "Laser Raster".into(),
                documents: vec!["doc".into()],
                fields: fields.as_object().cloned().unwrap(),
            }),
            selected: Some(SourceDocument::new("doc", "photo", image)),
        }
    }

    fn scheduler() -> PreviewScheduler<BufferSurface> {
        PreviewScheduler::new(BufferSurface::new(), EditorConfig::default())
    }

    const WINDOW: Duration = Duration::from_millis(200);

    #[test]
    fn rapid_changes_render_once_with_the_last_settings() {
        let mut preview = scheduler();
        let t0 = Instant::now();
        let image = png(6, 4);

        preview.observe(&observation(10, image.clone()), t0);
        preview.observe(&observation(20, image.clone()), t0 + Duration::from_millis(50));
        preview.observe(&observation(30, image), t0 + Duration::from_millis(100));

        assert!(!preview.tick(t0 + Duration::from_millis(250)).unwrap());
        let window = preview.pending().unwrap();
        assert_eq!(
            window.spec().get("brightness").and_then(bitrace_pipeline::FilterValue::as_number),
            Some(30.0)
        );

        assert!(preview.tick(t0 + Duration::from_millis(300)).unwrap());
        assert_eq!(preview.surface().paint_count(), 1);
        assert!(preview.surface().is_visible());
        assert_eq!(preview.surface().size().width, 6);
        assert!(!preview.is_pending());
    }

    #[test]
    fn unchanged_settings_do_not_rerender() {
        let mut preview = scheduler();
        let t0 = Instant::now();
        let image = png(4, 4);

        preview.observe(&observation(10, image.clone()), t0);
        assert!(preview.tick(t0 + WINDOW).unwrap());

        preview.observe(&observation(10, image.clone()), t0 + WINDOW * 2);
        assert!(!preview.is_pending());

        // A change and a revert inside one window cancel each other.
        preview.observe(&observation(40, image.clone()), t0 + WINDOW * 3);
        assert!(preview.is_pending());
        preview.observe(&observation(10, image), t0 + WINDOW * 3);
        assert!(!preview.is_pending());
        assert!(!preview.tick(t0 + WINDOW * 10).unwrap());
        assert_eq!(preview.surface().paint_count(), 1);
    }

    #[test]
    fn identical_snapshots_keep_the_original_deadline() {
        let mut preview = scheduler();
        let t0 = Instant::now();
        let image = png(2, 2);
        preview.observe(&observation(10, image.clone()), t0);
        preview.observe(&observation(10, image), t0 + Duration::from_millis(150));
        assert_eq!(preview.pending().unwrap().deadline(), t0 + WINDOW);
        assert_eq!(preview.pending().unwrap().generation(), 1);
    }

    #[test]
    fn teardown_cancels_the_pending_render() {
        let mut preview = scheduler();
        let t0 = Instant::now();
        preview.observe(&observation(10, png(4, 4)), t0);
        preview.unmount();

        assert!(!preview.is_pending());
        assert!(!preview.tick(t0 + WINDOW * 5).unwrap());
        assert_eq!(preview.surface().paint_count(), 0);
        assert!(!preview.surface().is_visible());

        preview.observe(&observation(20, png(4, 4)), t0 + WINDOW * 6);
        assert!(!preview.is_pending());
    }

    #[test]
    #[traced_test]
    fn outcome_after_teardown_is_dropped() {
        let mut preview = scheduler();
        let t0 = Instant::now();
        preview.observe(&observation(10, png(4, 4)), t0);
        let job = preview.poll(t0 + WINDOW).unwrap();
        preview.unmount();

        assert!(!preview.present(job.run()).unwrap());
        assert_eq!(preview.surface().paint_count(), 0);
        assert!(logs_contain("dropping render for torn-down preview"));
    }

    #[test]
    #[traced_test]
    fn stale_outcome_is_dropped() {
        let mut preview = scheduler();
        let t0 = Instant::now();
        let image = png(4, 4);
        preview.observe(&observation(10, image.clone()), t0);
        let stale = preview.poll(t0 + WINDOW).unwrap();

        preview.observe(&observation(20, image), t0 + WINDOW);
        assert!(!preview.present(stale.run()).unwrap());
        assert!(logs_contain("dropping stale render"));

        assert!(preview.tick(t0 + WINDOW * 2).unwrap());
        assert_eq!(preview.surface().paint_count(), 1);
    }

    #[test]
    #[traced_test]
    fn load_failure_is_reported_and_keeps_the_surface() {
        let mut preview = scheduler();
        let t0 = Instant::now();
        preview.observe(&observation(10, png(3, 3)), t0);
        assert!(preview.tick(t0 + WINDOW).unwrap());

        let broken = ImageSource::from(vec![0xFF, 0x00, 0x12]);
        preview.observe(&observation(20, broken), t0 + WINDOW * 2);
        let err = preview.tick(t0 + WINDOW * 3).unwrap_err();
        assert!(matches!(err, EditorError::Load(PipelineError::ImageDecode(_))));
        assert!(logs_contain("preview render failed"));

        assert_eq!(preview.surface().paint_count(), 1);
        assert_eq!(preview.surface().size().width, 3);
        // Reported once; the failed settings count as applied.
        assert!(!preview.tick(t0 + WINDOW * 4).unwrap());
    }

    #[test]
    fn reverting_during_a_render_keeps_that_render() {
        let mut preview = scheduler();
        let t0 = Instant::now();
        let image = png(5, 3);

        preview.observe(&observation(10, image.clone()), t0);
        let job = preview.poll(t0 + WINDOW).unwrap();

        preview.observe(&observation(20, image.clone()), t0 + WINDOW);
        assert!(preview.is_pending());
        preview.observe(&observation(10, image), t0 + WINDOW);
        assert!(!preview.is_pending());

        assert!(preview.present(job.run()).unwrap());
        assert_eq!(preview.surface().paint_count(), 1);
        for i in 2..10 {
            assert!(!preview.tick(t0 + WINDOW * i).unwrap());
        }
        assert_eq!(preview.surface().paint_count(), 1);
    }

    #[test]
    fn superseded_render_still_leads_to_the_latest_settings() {
        let mut preview = scheduler();
        let t0 = Instant::now();
        let image = png(4, 4);

        preview.observe(&observation(10, image.clone()), t0);
        assert!(preview.tick(t0 + WINDOW).unwrap());

        // 20 goes out, then the user returns to the painted 10.
        preview.observe(&observation(20, image.clone()), t0 + WINDOW * 2);
        let job = preview.poll(t0 + WINDOW * 3).unwrap();
        preview.observe(&observation(10, image), t0 + WINDOW * 3);
        assert!(preview.is_pending());

        assert!(!preview.present(job.run()).unwrap());
        assert!(preview.tick(t0 + WINDOW * 4).unwrap());
        assert_eq!(preview.surface().paint_count(), 2);
        assert!(!preview.tick(t0 + WINDOW * 5).unwrap());
    }

    #[test]
    fn repeated_snapshot_during_a_render_does_not_restart() {
        let mut preview = scheduler();
        let t0 = Instant::now();
        let image = png(4, 4);

        preview.observe(&observation(10, image.clone()), t0);
        let job = preview.poll(t0 + WINDOW).unwrap();
        preview.observe(&observation(10, image), t0 + WINDOW);
        assert!(!preview.is_pending());
        assert!(preview.present(job.run()).unwrap());
    }

    #[test]
    fn unselected_document_hides_and_renders_nothing() {
        let mut preview = scheduler();
        let t0 = Instant::now();
        let mut obs = observation(10, png(4, 4));
        obs.selected = None;

        preview.observe(&obs, t0);
        assert!(!preview.surface().is_visible());
        assert!(preview.poll(t0 + WINDOW).is_none());
        assert_eq!(preview.surface().paint_count(), 0);
    }

    #[test]
    fn non_raster_operation_cancels_and_hides() {
        let mut preview = scheduler();
        let t0 = Instant::now();
        let mut obs = observation(10, png(4, 4));
        preview.observe(&obs, t0);
        assert!(preview.surface().is_visible());
        assert!(preview.is_pending());

        obs.operation.as_mut().unwrap().kind = "Laser Cut".into();
        preview.observe(&obs, t0 + Duration::from_millis(10));
        assert!(!preview.surface().is_visible());
        assert!(!preview.is_pending());
    }

    #[test]
    fn disabled_preview_still_renders_hidden() {
        let mut preview = scheduler();
        let t0 = Instant::now();
        let mut obs = observation(10, png(4, 4));
        obs.enabled = false;
        preview.observe(&obs, t0);
        assert!(!preview.surface().is_visible());
        assert!(preview.tick(t0 + WINDOW).unwrap());
        assert_eq!(preview.surface().paint_count(), 1);
    }

    #[test]
    fn remount_starts_over() {
        let mut preview = scheduler();
        let t0 = Instant::now();
        let image = png(4, 4);
        preview.observe(&observation(10, image.clone()), t0);
        assert!(preview.tick(t0 + WINDOW).unwrap());

        preview.unmount();
        preview.mount();
        assert!(preview.is_mounted());

        // The same settings render again after a remount.
        preview.observe(&observation(10, image), t0 + WINDOW * 2);
        assert!(preview.tick(t0 + WINDOW * 3).unwrap());
        assert_eq!(preview.surface().paint_count(), 2);
    }

    #[test]
    fn zero_debounce_renders_on_the_next_tick() {
        let mut preview =
            PreviewScheduler::new(BufferSurface::new(), EditorConfig::default().with_debounce_ms(0));
        let t0 = Instant::now();
        preview.observe(&observation(10, png(2, 2)), t0);
        assert!(preview.tick(t0).unwrap());
    }
}
