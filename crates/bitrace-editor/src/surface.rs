//! The preview's drawing target.

use bitrace_pipeline::{Dimensions, PixelBuffer};

/// Where a filtered preview is shown.
///
/// Only the preview scheduler writes to a surface; tracing never does.
pub trait RenderSurface {
    /// Show or hide the surface.
    fn set_visible(&mut self, visible: bool);

    /// Resize to the buffer's pixel dimensions and draw it.
    fn paint(&mut self, buffer: &PixelBuffer);
}

/// An in-memory surface that keeps the last painted buffer.
///
/// Useful for headless hosts and for tests.
#[derive(Debug, Clone, Default)]
pub struct BufferSurface {
    visible: bool,
    frame: Option<PixelBuffer>,
    paints: usize,
}

impl BufferSurface {
    /// A hidden, blank surface.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the surface is shown.
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        self.visible
    }

    /// The last painted buffer.
    #[must_use]
    pub const fn frame(&self) -> Option<&PixelBuffer> {
        self.frame.as_ref()
    }

    /// Current size, zero before the first paint.
    #[must_use]
    pub fn size(&self) -> Dimensions {
        self.frame.as_ref().map_or(
            Dimensions {
                width: 0,
                height: 0,
            },
            PixelBuffer::dimensions,
        )
    }

    /// Number of paints so far.
    #[must_use]
    pub const fn paint_count(&self) -> usize {
        self.paints
    }
}

impl RenderSurface for BufferSurface {
    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    fn paint(&mut self, buffer: &PixelBuffer) {
        self.frame = Some(buffer.clone());
        self.paints += 1;
    }
}

impl<S: RenderSurface + ?Sized> RenderSurface for &mut S {
    fn set_visible(&mut self, visible: bool) {
        (**self).set_visible(visible);
    }

    fn paint(&mut self, buffer: &PixelBuffer) {
        (**self).paint(buffer);
    }
}
