//! Optimal polygon fitting for a lattice path.
//!
//! 1. [`longest_straight`]: for every point, the furthest point that can
//!    still be reached by a straight subpath.
//! 2. [`best_polygon`]: the polygon with the fewest vertices (ties broken
//!    by a least-squares penalty) whose edges are all straight subpaths.
//! 3. [`adjust_vertices`]: move each vertex off the lattice to the point
//!    that best fits the two adjacent edges, staying inside the unit
//!    square around the original corner.

use super::decompose::{GridPoint, RawPath};
use crate::types::Point;

/// Fit the optimal polygon to `path` and return its vertices.
#[must_use]
pub fn fit(path: &RawPath) -> Vec<Point> {
    let pts = &path.points;
    if pts.len() < 3 {
        return pts.iter().map(|p| grid_to_point(*p)).collect();
    }
    let sums = Sums::new(pts);
    let lon = longest_straight(pts);
    let polygon = best_polygon(pts, &sums, &lon);
    adjust_vertices(pts, &sums, &polygon)
}

#[allow(clippy::cast_precision_loss)]
fn grid_to_point(p: GridPoint) -> Point {
    Point::new(p.x as f64, p.y as f64)
}

/// Euclidean modulo: always in `0..n`.
pub(super) const fn modulo(a: i64, n: i64) -> i64 {
    a.rem_euclid(n)
}

/// `a <= b < c` on a cycle.
const fn cyclic(a: i64, b: i64, c: i64) -> bool {
    if a <= c { a <= b && b < c } else { a <= b || b < c }
}

fn xprod(a: (i64, i64), b: (i64, i64)) -> i64 {
    a.0 * b.1 - a.1 * b.0
}

/// Prefix sums of coordinates relative to the first point, used to get
/// the moments of any subpath in constant time.
struct Sums {
    x: Vec<f64>,
    y: Vec<f64>,
    xy: Vec<f64>,
    x2: Vec<f64>,
    y2: Vec<f64>,
}

impl Sums {
    #[allow(clippy::cast_precision_loss)]
    fn new(pts: &[GridPoint]) -> Self {
        let n = pts.len();
        let mut s = Self {
            x: Vec::with_capacity(n + 1),
            y: Vec::with_capacity(n + 1),
            xy: Vec::with_capacity(n + 1),
            x2: Vec::with_capacity(n + 1),
            y2: Vec::with_capacity(n + 1),
        };
        let (mut sx, mut sy, mut sxy, mut sx2, mut sy2) = (0.0, 0.0, 0.0, 0.0, 0.0);
        s.push(sx, sy, sxy, sx2, sy2);
        for p in pts {
            let x = (p.x - pts[0].x) as f64;
            let y = (p.y - pts[0].y) as f64;
            sx += x;
            sy += y;
            sxy += x * y;
            sx2 += x * x;
            sy2 += y * y;
            s.push(sx, sy, sxy, sx2, sy2);
        }
        s
    }

    fn push(&mut self, x: f64, y: f64, xy: f64, x2: f64, y2: f64) {
        self.x.push(x);
        self.y.push(y);
        self.xy.push(xy);
        self.x2.push(x2);
        self.y2.push(y2);
    }

    /// Moments `(x, y, xy, x2, y2)` of points `i..=j`, where the range
    /// wraps around the path `wraps` extra times.
    fn range(&self, i: usize, j: usize, wraps: f64) -> [f64; 5] {
        let n = self.x.len() - 1;
        let d = |v: &[f64]| wraps.mul_add(v[n], v[j + 1] - v[i]);
        [d(&self.x), d(&self.y), d(&self.xy), d(&self.x2), d(&self.y2)]
    }
}

#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn as_index(i: i64) -> usize {
    i as usize
}

/// For each point `i`, the furthest point `lon[i]` such that the
/// subpath `i..lon[i]` is straight.
#[allow(clippy::cast_possible_wrap)]
fn longest_straight(pts: &[GridPoint]) -> Vec<i64> {
    let n = pts.len() as i64;
    let at = |i: i64| pts[as_index(i)];
    let sign = |v: i64| v.signum();

    // nc[i]: next corner, the first k > i where the path leaves the
    // axis-parallel line through i.
    let mut nc = vec![0i64; pts.len()];
    let mut k = 0;
    for i in (0..n).rev() {
        if at(i).x != at(k).x && at(i).y != at(k).y {
            k = i + 1;
        }
        nc[as_index(i)] = k;
    }

    let mut pivk = vec![0i64; pts.len()];
    for i in (0..n).rev() {
        let mut ct = [0u32; 4];
        let next = at(modulo(i + 1, n));
        let dir = (3 + 3 * (next.x - at(i).x) + (next.y - at(i).y)) / 2;
        ct[as_index(dir)] += 1;

        let mut constraint = [(0i64, 0i64); 2];
        let mut k = nc[as_index(i)];
        let mut k1 = i;
        let mut found = false;

        loop {
            let dir = (3 + 3 * sign(at(k).x - at(k1).x) + sign(at(k).y - at(k1).y)) / 2;
            ct[as_index(dir)] += 1;

            if ct.iter().all(|&c| c > 0) {
                pivk[as_index(i)] = k1;
                found = true;
                break;
            }

            let cur = (at(k).x - at(i).x, at(k).y - at(i).y);
            if xprod(constraint[0], cur) < 0 || xprod(constraint[1], cur) > 0 {
                break;
            }

            if cur.0.abs() > 1 || cur.1.abs() > 1 {
                let off = (
                    cur.0 + if cur.1 >= 0 && (cur.1 > 0 || cur.0 < 0) { 1 } else { -1 },
                    cur.1 + if cur.0 <= 0 && (cur.0 < 0 || cur.1 < 0) { 1 } else { -1 },
                );
                if xprod(constraint[0], off) >= 0 {
                    constraint[0] = off;
                }
                let off = (
                    cur.0 + if cur.1 <= 0 && (cur.1 < 0 || cur.0 < 0) { 1 } else { -1 },
                    cur.1 + if cur.0 >= 0 && (cur.0 > 0 || cur.1 < 0) { 1 } else { -1 },
                );
                if xprod(constraint[1], off) <= 0 {
                    constraint[1] = off;
                }
            }

            k1 = k;
            k = nc[as_index(k1)];
            if !cyclic(k, i, k1) {
                break;
            }
        }

        if !found {
            // k1 was the last feasible point; extend along the direction
            // towards k as far as the constraints allow.
            let dk = (sign(at(k).x - at(k1).x), sign(at(k).y - at(k1).y));
            let cur = (at(k1).x - at(i).x, at(k1).y - at(i).y);
            let a = xprod(constraint[0], cur);
            let b = xprod(constraint[0], dk);
            let c = xprod(constraint[1], cur);
            let d = xprod(constraint[1], dk);
            let mut j = 10_000_000;
            if b < 0 {
                j = a.div_euclid(-b);
            }
            if d > 0 {
                j = j.min((-c).div_euclid(d));
            }
            pivk[as_index(i)] = modulo(k1 + j, n);
        }
    }

    let mut lon = vec![0i64; pts.len()];
    let mut j = pivk[as_index(n - 1)];
    lon[as_index(n - 1)] = j;
    for i in (0..n - 1).rev() {
        if cyclic(i + 1, pivk[as_index(i)], j) {
            j = pivk[as_index(i)];
        }
        lon[as_index(i)] = j;
    }
    let mut i = n - 1;
    while i >= 0 && cyclic(modulo(i + 1, n), j, lon[as_index(i)]) {
        lon[as_index(i)] = j;
        i -= 1;
    }
    lon
}

/// Least-squares penalty of approximating points `i..=j` (where `j` may
/// exceed `n` to wrap) by the straight segment from `pts[i]` to `pts[j]`.
#[allow(clippy::cast_precision_loss)]
fn penalty3(pts: &[GridPoint], sums: &Sums, i: usize, j: usize) -> f64 {
    let n = pts.len();
    let (j, wraps) = if j >= n { (j - n, 1.0) } else { (j, 0.0) };
    let [x, y, xy, x2, y2] = sums.range(i, j, wraps);
    let k = (j + 1) as f64 - i as f64 + wraps * n as f64;

    let (pi, pj, p0) = (pts[i], pts[j], pts[0]);
    let px = (pi.x + pj.x) as f64 / 2.0 - p0.x as f64;
    let py = (pi.y + pj.y) as f64 / 2.0 - p0.y as f64;
    let ey = (pj.x - pi.x) as f64;
    let ex = -(pj.y - pi.y) as f64;

    let a = (2.0 * x).mul_add(-px, x2) / k + px * px;
    let b = (xy - x * py - y * px) / k + px * py;
    let c = (2.0 * y).mul_add(-py, y2) / k + py * py;

    let s = (ey * ey).mul_add(c, (ex * ex).mul_add(a, 2.0 * ex * ey * b));
    s.max(0.0).sqrt()
}

/// Indices of the optimal polygon's vertices.
#[allow(clippy::cast_possible_wrap)]
fn best_polygon(pts: &[GridPoint], sums: &Sums, lon: &[i64]) -> Vec<usize> {
    let n = pts.len();
    let ni = n as i64;

    // clip0[i]: furthest vertex reachable from i in one straight edge.
    let clip0: Vec<usize> = (0..ni)
        .map(|i| {
            let mut c = modulo(lon[as_index(modulo(i - 1, ni))] - 1, ni);
            if c == i {
                c = modulo(i + 1, ni);
            }
            if c < i { n } else { as_index(c) }
        })
        .collect();

    // clip1[j]: earliest vertex from which j is reachable.
    let mut clip1 = vec![0usize; n + 1];
    let mut j = 1;
    for (i, &c0) in clip0.iter().enumerate() {
        while j <= c0 {
            clip1[j] = i;
            j += 1;
        }
    }

    // seg0/seg1: greedy bounds on where the j-th vertex can lie.
    let mut seg0 = Vec::with_capacity(n + 1);
    let mut i = 0;
    while i < n {
        seg0.push(i);
        i = clip0[i];
    }
    seg0.push(n);
    let m = seg0.len() - 1;

    let mut seg1 = vec![0usize; m + 1];
    let mut i = n;
    for j in (1..=m).rev() {
        seg1[j] = i;
        i = clip1[i];
    }

    let mut pen = vec![0.0f64; n + 1];
    let mut prev = vec![0usize; n + 1];
    for j in 1..=m {
        for i in seg1[j]..=seg0[j] {
            let mut best = -1.0;
            for k in (clip1[i]..=seg0[j - 1]).rev() {
                let this = penalty3(pts, sums, k, i) + pen[k];
                if best < 0.0 || this < best {
                    prev[i] = k;
                    best = this;
                }
            }
            pen[i] = best;
        }
    }

    let mut po = vec![0usize; m];
    let mut i = n;
    for slot in po.iter_mut().rev() {
        i = prev[i];
        *slot = i;
    }
    po
}

/// Center and unit direction of the best-fit line through points
/// `i..=j` (indices may be out of range and wrap).
#[allow(clippy::cast_possible_wrap, clippy::cast_precision_loss)]
fn point_slope(sums: &Sums, n: usize, i: i64, j: i64) -> (Point, Point) {
    let ni = n as i64;
    let wraps = j.div_euclid(ni) - i.div_euclid(ni);
    let (i, j) = (as_index(modulo(i, ni)), as_index(modulo(j, ni)));
    let [x, y, xy, x2, y2] = sums.range(i, j, wraps as f64);
    let k = (j + 1) as f64 - i as f64 + wraps as f64 * n as f64;

    let ctr = Point::new(x / k, y / k);

    let mut a = (x2 - x * x / k) / k;
    let b = (xy - x * y / k) / k;
    let mut c = (y2 - y * y / k) / k;

    // Larger eigenvalue of the covariance matrix.
    let lambda2 = (a + c + (a - c).mul_add(a - c, 4.0 * b * b).sqrt()) / 2.0;
    a -= lambda2;
    c -= lambda2;

    let dir = if a.abs() >= c.abs() {
        let l = a.hypot(b);
        if l == 0.0 { Point::default() } else { Point::new(-b / l, a / l) }
    } else {
        let l = c.hypot(b);
        if l == 0.0 { Point::default() } else { Point::new(-c / l, b / l) }
    };
    (ctr, dir)
}

/// A symmetric 3x3 quadratic form over homogeneous `(x, y, 1)`.
#[derive(Debug, Clone, Copy, Default)]
struct Quad([[f64; 3]; 3]);

impl Quad {
    fn outer(v: [f64; 3], scale: f64) -> Self {
        let mut q = [[0.0; 3]; 3];
        for (l, row) in q.iter_mut().enumerate() {
            for (k, cell) in row.iter_mut().enumerate() {
                *cell = v[l] * v[k] / scale;
            }
        }
        Self(q)
    }

    fn add(self, other: Self) -> Self {
        let mut q = self.0;
        for (l, row) in q.iter_mut().enumerate() {
            for (k, cell) in row.iter_mut().enumerate() {
                *cell += other.0[l][k];
            }
        }
        Self(q)
    }

    fn eval(&self, p: Point) -> f64 {
        let v = [p.x, p.y, 1.0];
        let mut sum = 0.0;
        for (l, row) in self.0.iter().enumerate() {
            for (k, cell) in row.iter().enumerate() {
                sum += v[l] * cell * v[k];
            }
        }
        sum
    }
}

/// Place each polygon vertex at the point minimizing the squared
/// distance to its two adjacent edge lines, constrained to the unit
/// square around the lattice corner.
#[allow(clippy::cast_possible_wrap, clippy::cast_precision_loss, clippy::many_single_char_names)]
fn adjust_vertices(pts: &[GridPoint], sums: &Sums, po: &[usize]) -> Vec<Point> {
    let n = pts.len();
    let m = po.len();
    let origin = grid_to_point(pts[0]);

    let lines: Vec<(Point, Point)> = (0..m)
        .map(|i| {
            let pi = po[i] as i64;
            let next = po[(i + 1) % m] as i64;
            let j = modulo(next - pi, n as i64) + pi;
            point_slope(sums, n, pi, j)
        })
        .collect();

    let quads: Vec<Quad> = lines
        .iter()
        .map(|&(ctr, dir)| {
            let d = dir.x.mul_add(dir.x, dir.y * dir.y);
            if d == 0.0 {
                Quad::default()
            } else {
                let v0 = dir.y;
                let v1 = -dir.x;
                Quad::outer([v0, v1, -v1 * ctr.y - v0 * ctr.x], d)
            }
        })
        .collect();

    (0..m)
        .map(|i| {
            let corner = grid_to_point(pts[po[i]]);
            let s = Point::new(corner.x - origin.x, corner.y - origin.y);
            let mut q = quads[(i + m - 1) % m].add(quads[i]);

            let w = loop {
                let [[q00, q01, q02], [q10, q11, q12], _] = q.0;
                let det = q00.mul_add(q11, -(q01 * q10));
                if det != 0.0 {
                    break Point::new(
                        (-q02).mul_add(q11, q12 * q01) / det,
                        q02.mul_add(q10, -(q12 * q00)) / det,
                    );
                }
                // Degenerate (parallel edges): add a constraint through
                // the lattice corner, orthogonal to the dominant edge.
                let (v0, v1) = if q00 > q11 {
                    (-q01, q00)
                } else if q11 != 0.0 {
                    (-q11, q10)
                } else {
                    (1.0, 0.0)
                };
                let d = v0.mul_add(v0, v1 * v1);
                q = q.add(Quad::outer([v0, v1, -v1 * s.y - v0 * s.x], d));
            };

            if (w.x - s.x).abs() <= 0.5 && (w.y - s.y).abs() <= 0.5 {
                return Point::new(w.x + origin.x, w.y + origin.y);
            }

            // The unconstrained optimum is outside the unit square: search
            // its edges and corners.
            let [[q00, q01, q02], [q10, q11, q12], _] = q.0;
            let mut best = s;
            let mut min = q.eval(s);
            if q00 != 0.0 {
                for z in [0.0, 1.0] {
                    let wy = s.y - 0.5 + z;
                    let cand = Point::new(-q01.mul_add(wy, q02) / q00, wy);
                    let value = q.eval(cand);
                    if (cand.x - s.x).abs() <= 0.5 && value < min {
                        min = value;
                        best = cand;
                    }
                }
            }
            if q11 != 0.0 {
                for z in [0.0, 1.0] {
                    let wx = s.x - 0.5 + z;
                    let cand = Point::new(wx, -q10.mul_add(wx, q12) / q11);
                    let value = q.eval(cand);
                    if (cand.y - s.y).abs() <= 0.5 && value < min {
                        min = value;
                        best = cand;
                    }
                }
            }
            for l in [0.0, 1.0] {
                for k in [0.0, 1.0] {
                    let cand = Point::new(s.x - 0.5 + l, s.y - 0.5 + k);
                    let value = q.eval(cand);
                    if value < min {
                        min = value;
                        best = cand;
                    }
                }
            }
            Point::new(best.x + origin.x, best.y + origin.y)
        })
        .collect()
}
