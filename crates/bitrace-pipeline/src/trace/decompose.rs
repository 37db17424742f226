//! Boundary decomposition: split a bitmap into closed lattice paths.
//!
//! Paths run along pixel corners. The scan finds the first foreground
//! pixel in row-major order, follows its boundary with the foreground on
//! the left, then XOR-fills the enclosed region so that whatever is
//! nested inside (holes, islands in holes) becomes the next foreground
//! found by the scan.

use std::hash::Hasher;

use siphasher::sip::SipHasher13;

use super::TurnPolicy;
use super::bitmap::Bitmap;
use crate::contour::Polarity;

/// An integer point on the pixel-corner lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridPoint {
    pub x: i64,
    pub y: i64,
}

/// A closed boundary path, one lattice step between consecutive points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPath {
    /// Corner points; the path closes from the last back to the first.
    pub points: Vec<GridPoint>,
    /// Enclosed pixel count.
    pub area: i64,
    /// `Outer` when it bounds foreground, `Hole` when it bounds background.
    pub polarity: Polarity,
    max_x: i64,
}

/// Decompose `bitmap` into boundary paths in discovery order.
///
/// Paths enclosing fewer than `min_area` pixels are dropped, but their
/// region is still cleared so the scan moves past it.
#[must_use]
pub fn decompose(bitmap: &Bitmap, policy: TurnPolicy, min_area: i64) -> Vec<RawPath> {
    let mut work = bitmap.clone();
    let mut paths = Vec::new();
    let mut cursor = (0, 0);

    while let Some((x, y)) = work.next_set(cursor.0, cursor.1) {
        let polarity = if bitmap.at(x, y) {
            Polarity::Outer
        } else {
            Polarity::Hole
        };
        let path = find_path(&work, GridPoint { x, y }, polarity, policy);
        xor_path(&mut work, &path);
        if path.area >= min_area {
            paths.push(path);
        } else {
            tracing::trace!(x, y, area = path.area, "dropping speckle");
        }
        cursor = (x, y);
    }

    paths
}

/// Follow the boundary that starts at the top-left corner of pixel
/// `start`, heading down.
fn find_path(bm: &Bitmap, start: GridPoint, polarity: Polarity, policy: TurnPolicy) -> RawPath {
    let (mut x, mut y) = (start.x, start.y);
    let (mut dirx, mut diry) = (0i64, 1i64);
    let mut points = Vec::new();
    let mut area = 0;
    let mut max_x = x;

    loop {
        points.push(GridPoint { x, y });
        max_x = max_x.max(x);

        x += dirx;
        y += diry;
        area -= x * diry;

        if x == start.x && y == start.y {
            break;
        }

        // `dirx + diry` is always odd, so these halvings are exact.
        let l = bm.at(x + (dirx + diry - 1) / 2, y + (diry - dirx - 1) / 2);
        let r = bm.at(x + (dirx - diry - 1) / 2, y + (diry + dirx - 1) / 2);

        let turn_right = if r && !l {
            match policy {
                TurnPolicy::Right => true,
                TurnPolicy::Left => false,
                TurnPolicy::Black => polarity == Polarity::Outer,
                TurnPolicy::White => polarity == Polarity::Hole,
                TurnPolicy::Majority => majority(bm, x, y),
                TurnPolicy::Minority => !majority(bm, x, y),
                TurnPolicy::Random => coin(x, y),
            }
        } else if r {
            true
        } else if !l {
            false
        } else {
            continue;
        };

        (dirx, diry) = if turn_right {
            (-diry, dirx)
        } else {
            (diry, -dirx)
        };
    }

    RawPath {
        points,
        area,
        polarity,
        max_x,
    }
}

/// Whether foreground dominates the neighbourhood of corner `(x, y)`.
///
/// Examines square rings of radius 2, 3 and 4 and decides on the first
/// ring that is not balanced. Fully balanced neighbourhoods count as
/// background.
fn majority(bm: &Bitmap, x: i64, y: i64) -> bool {
    for i in 2..5 {
        let mut ct = 0i32;
        for a in (-i + 1)..i {
            for (px, py) in [
                (x + a, y + i - 1),
                (x + i - 1, y + a - 1),
                (x + a - 1, y - i),
                (x - i, y + a),
            ] {
                ct += if bm.at(px, py) { 1 } else { -1 };
            }
        }
        if ct != 0 {
            return ct > 0;
        }
    }
    false
}

/// Deterministic per-corner coin flip for the random turn policy.
fn coin(x: i64, y: i64) -> bool {
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    hasher.write_i64(x);
    hasher.write_i64(y);
    hasher.finish() & 1 == 1
}

/// Invert every pixel enclosed by `path`.
///
/// For each vertical edge, flips the pixels from the edge to the path's
/// right extent on that edge's row. Pixels right of an even number of
/// edges end up unchanged.
fn xor_path(bm: &mut Bitmap, path: &RawPath) {
    let Some(first) = path.points.first() else {
        return;
    };
    let mut y1 = first.y;
    for p in path.points.iter().skip(1) {
        if p.y != y1 {
            let row = y1.min(p.y);
            for j in p.x..path.max_x {
                bm.flip(j, row);
            }
            y1 = p.y;
        }
    }
}
