//! Traced vector contours.
//!
//! A [`VectorContour`] is a closed outline: a start point followed by
//! straight or cubic segments, the last of which ends back at the start.
//! Coordinates use the pixel-corner grid (`+y` down) until calibration
//! rewrites them into physical units.

use serde::{Deserialize, Serialize};

use crate::types::Point;

/// Which side of a boundary is foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarity {
    /// Encloses foreground.
    Outer,
    /// Encloses background inside an outer contour.
    Hole,
}

/// One piece of a contour, ending at `to`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Segment {
    /// Straight line.
    Line {
        /// End point.
        to: Point,
    },
    /// Cubic Bezier with two control points.
    Cubic {
        /// First control point.
        c1: Point,
        /// Second control point.
        c2: Point,
        /// End point.
        to: Point,
    },
}

impl Segment {
    /// End point of the segment.
    #[must_use]
    pub const fn end(&self) -> Point {
        match *self {
            Self::Line { to } | Self::Cubic { to, .. } => to,
        }
    }

    /// Apply `f` to every point, control points included.
    #[must_use]
    pub fn map_points(self, mut f: impl FnMut(Point) -> Point) -> Self {
        match self {
            Self::Line { to } => Self::Line { to: f(to) },
            Self::Cubic { c1, c2, to } => Self::Cubic {
                c1: f(c1),
                c2: f(c2),
                to: f(to),
            },
        }
    }
}

/// A closed vector outline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorContour {
    /// Where the outline begins (and ends).
    pub start: Point,
    /// Ordered segments; the last one ends at `start`.
    pub segments: Vec<Segment>,
    /// Outer boundary or hole.
    pub polarity: Polarity,
}

impl VectorContour {
    /// Create a contour.
    #[must_use]
    pub const fn new(start: Point, segments: Vec<Segment>, polarity: Polarity) -> Self {
        Self {
            start,
            segments,
            polarity,
        }
    }

    /// Every point of the contour in drawing order, starting with
    /// `start` and including control points.
    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        std::iter::once(self.start).chain(self.segments.iter().flat_map(|s| match *s {
            Segment::Line { to } => vec![to],
            Segment::Cubic { c1, c2, to } => vec![c1, c2, to],
        }))
    }

    /// Whether the last segment returns to `start`.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.segments
            .last()
            .is_some_and(|s| s.end().distance(self.start) < 1e-9)
    }

    /// Apply `f` to every point, control points included.
    #[must_use]
    pub fn map_points(&self, mut f: impl FnMut(Point) -> Point) -> Self {
        Self {
            start: f(self.start),
            segments: self.segments.iter().map(|s| s.map_points(&mut f)).collect(),
            polarity: self.polarity,
        }
    }

    /// Axis-aligned bounds `(min, max)` over all points, control points
    /// included. `None` never happens for a well-formed contour but is
    /// kept for the empty case.
    #[must_use]
    pub fn bounds(&self) -> Option<(Point, Point)> {
        self.points().fold(None, |acc, p| {
            Some(acc.map_or((p, p), |(lo, hi): (Point, Point)| {
                (
                    Point::new(lo.x.min(p.x), lo.y.min(p.y)),
                    Point::new(hi.x.max(p.x), hi.y.max(p.y)),
                )
            }))
        })
    }
}
