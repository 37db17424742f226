//! Curve fitting over an optimal polygon.
//!
//! [`smooth`] turns every polygon vertex into either a corner or a
//! cubic Bezier joint, depending on how sharp it is relative to the
//! corner threshold. [`optimize`] then merges runs of consecutive Bezier
//! segments into single segments where the result stays within the
//! optimization tolerance.

use crate::contour::Segment;
use crate::types::Point;

/// How a curve segment ends at its vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    /// Two straight lines meeting at the vertex.
    Corner,
    /// A cubic Bezier segment.
    Curve,
}

/// A closed piecewise curve with one segment per vertex.
///
/// Segment `i` runs from `c[i - 1][2]` to `c[i][2]`. For a corner,
/// `c[i][1]` is the vertex and `c[i][0]` is unused; for a curve, the
/// three points are the Bezier controls and the endpoint.
#[derive(Debug, Clone)]
pub struct Curve {
    tag: Vec<Tag>,
    c: Vec<[Point; 3]>,
    vertex: Vec<Point>,
    alpha: Vec<f64>,
}

fn sign(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn orientation(v: f64) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

/// Area of the parallelogram spanned by `p1 - p0` and `p2 - p0`.
fn dpara(p0: Point, p1: Point, p2: Point) -> f64 {
    (p1.x - p0.x).mul_add(p2.y - p0.y, -((p2.x - p0.x) * (p1.y - p0.y)))
}

/// Denominator of the corner sharpness ratio: `dpara` against the
/// L-infinity normal of `p2 - p0`.
fn ddenom(p0: Point, p2: Point) -> f64 {
    let rx = -sign(p2.y - p0.y);
    let ry = sign(p2.x - p0.x);
    ry.mul_add(p2.x - p0.x, -(rx * (p2.y - p0.y)))
}

/// Cross product of `p1 - p0` and `p3 - p2`.
fn cprod(p0: Point, p1: Point, p2: Point, p3: Point) -> f64 {
    (p1.x - p0.x).mul_add(p3.y - p2.y, -((p3.x - p2.x) * (p1.y - p0.y)))
}

/// Dot product of `p1 - p0` and `p2 - p0`.
fn iprod(p0: Point, p1: Point, p2: Point) -> f64 {
    (p1.x - p0.x).mul_add(p2.x - p0.x, (p1.y - p0.y) * (p2.y - p0.y))
}

/// Dot product of `p1 - p0` and `p3 - p2`.
fn iprod1(p0: Point, p1: Point, p2: Point, p3: Point) -> f64 {
    (p1.x - p0.x).mul_add(p3.x - p2.x, (p1.y - p0.y) * (p3.y - p2.y))
}

fn bezier(t: f64, p0: Point, p1: Point, p2: Point, p3: Point) -> Point {
    let s = 1.0 - t;
    let (a, b, c, d) = (s * s * s, 3.0 * s * s * t, 3.0 * t * t * s, t * t * t);
    Point::new(
        d.mul_add(p3.x, c.mul_add(p2.x, a.mul_add(p0.x, b * p1.x))),
        d.mul_add(p3.y, c.mul_add(p2.y, a.mul_add(p0.y, b * p1.y))),
    )
}

/// Parameter in `[0, 1]` where the Bezier's tangent is parallel to
/// `q1 - q0`, or `None`.
fn tangent(p0: Point, p1: Point, p2: Point, p3: Point, q0: Point, q1: Point) -> Option<f64> {
    let a0 = cprod(p0, p1, q0, q1);
    let b0 = cprod(p1, p2, q0, q1);
    let c0 = cprod(p2, p3, q0, q1);

    let a = 2.0f64.mul_add(-b0, a0) + c0;
    let b = 2.0 * (b0 - a0);
    let c = a0;
    let d = b.mul_add(b, -4.0 * a * c);
    if a == 0.0 || d < 0.0 {
        return None;
    }
    let s = d.sqrt();
    let r1 = (-b + s) / (2.0 * a);
    let r2 = (-b - s) / (2.0 * a);
    [r1, r2].into_iter().find(|r| (0.0..=1.0).contains(r))
}

/// Classify each vertex and place Bezier control points.
///
/// A vertex whose sharpness `alpha` reaches `alpha_max` stays a corner;
/// anything smoother becomes a curve with `alpha` clamped to
/// `[0.55, 1]`.
#[must_use]
pub fn smooth(vertex: &[Point], alpha_max: f64) -> Curve {
    let m = vertex.len();
    let mut curve = Curve {
        tag: vec![Tag::Corner; m],
        c: vec![[Point::default(); 3]; m],
        vertex: vertex.to_vec(),
        alpha: vec![0.0; m],
    };

    for i in 0..m {
        let j = (i + 1) % m;
        let k = (i + 2) % m;
        let p4 = vertex[k].lerp(vertex[j], 0.5);

        let denom = ddenom(vertex[i], vertex[k]);
        let mut alpha = if denom == 0.0 {
            4.0 / 3.0
        } else {
            let dd = (dpara(vertex[i], vertex[j], vertex[k]) / denom).abs();
            let alpha = if dd > 1.0 { 1.0 - 1.0 / dd } else { 0.0 };
            alpha / 0.75
        };

        if alpha >= alpha_max {
            curve.tag[j] = Tag::Corner;
            curve.c[j] = [Point::default(), vertex[j], p4];
        } else {
            alpha = alpha.clamp(0.55, 1.0);
            let lambda = 0.5f64.mul_add(alpha, 0.5);
            curve.tag[j] = Tag::Curve;
            curve.c[j] = [
                vertex[i].lerp(vertex[j], lambda),
                vertex[k].lerp(vertex[j], lambda),
                p4,
            ];
        }
        curve.alpha[j] = alpha;
    }

    curve
}

/// Candidate merged segment found by [`penalty`].
#[derive(Debug, Clone, Copy, Default)]
struct Merge {
    pen: f64,
    c: [Point; 2],
    alpha: f64,
    s: f64,
}

/// Try to replace segments `i+1..=j` with one Bezier.
///
/// Returns `None` when the run is not convex, turns by more than 179
/// degrees, or any vertex/endpoint deviates by more than `tolerance`.
#[allow(clippy::many_single_char_names)]
fn penalty(
    curve: &Curve,
    i: usize,
    j: usize,
    tolerance: f64,
    convc: &[i8],
    areac: &[f64],
) -> Option<Merge> {
    let m = curve.vertex.len();
    let v = &curve.vertex;
    let end = |k: usize| curve.c[k][2];

    if i == j {
        return None;
    }

    let i1 = (i + 1) % m;
    let conv = convc[i1];
    if conv == 0 {
        return None;
    }
    let d = v[i].distance(v[i1]);
    let mut k = i1;
    while k != j {
        let k1 = (k + 1) % m;
        let k2 = (k + 2) % m;
        if convc[k1] != conv {
            return None;
        }
        if orientation(cprod(v[i], v[i1], v[k1], v[k2])) != conv {
            return None;
        }
        // cos(179 degrees)
        if iprod1(v[i], v[i1], v[k1], v[k2]) < d * v[k1].distance(v[k2]) * -0.999_847_695_156 {
            return None;
        }
        k = k1;
    }

    let p0 = end(i);
    let mut p1 = v[i1];
    let mut p2 = v[j];
    let p3 = end(j);

    let mut area = areac[j] - areac[i];
    area -= dpara(v[0], end(i), end(j)) / 2.0;
    if i >= j {
        area += areac[m];
    }

    let a1 = dpara(p0, p1, p2);
    let a2 = dpara(p0, p1, p3);
    let a3 = dpara(p0, p2, p3);
    let a4 = a1 + a3 - a2;

    if a2 == a1 {
        return None;
    }

    let t = a3 / (a3 - a4);
    let s = a2 / (a2 - a1);
    let a = a2 * t / 2.0;
    if a == 0.0 {
        return None;
    }

    let r = area / a;
    let alpha = 2.0 - (4.0 - r / 0.3).sqrt();
    if !alpha.is_finite() {
        return None;
    }

    let c0 = p0.lerp(p1, t * alpha);
    let c1 = p3.lerp(p2, s * alpha);
    p1 = c0;
    p2 = c1;
    let mut pen = 0.0;

    // Polygon edges must stay close to the merged curve.
    let mut k = i1;
    while k != j {
        let k1 = (k + 1) % m;
        let t = tangent(p0, p1, p2, p3, v[k], v[k1])?;
        let pt = bezier(t, p0, p1, p2, p3);
        let d = v[k].distance(v[k1]);
        if d == 0.0 {
            return None;
        }
        let d1 = dpara(v[k], v[k1], pt) / d;
        if d1.abs() > tolerance {
            return None;
        }
        if iprod(v[k], v[k1], pt) < 0.0 || iprod(v[k1], v[k], pt) < 0.0 {
            return None;
        }
        pen += d1 * d1;
        k = k1;
    }

    // Segment joints must not be cut off.
    let mut k = i;
    while k != j {
        let k1 = (k + 1) % m;
        let t = tangent(p0, p1, p2, p3, end(k), end(k1))?;
        let pt = bezier(t, p0, p1, p2, p3);
        let d = end(k).distance(end(k1));
        if d == 0.0 {
            return None;
        }
        let mut d1 = dpara(end(k), end(k1), pt) / d;
        let mut d2 = dpara(end(k), end(k1), v[k1]) / d;
        d2 *= 0.75 * curve.alpha[k1];
        if d2 < 0.0 {
            d1 = -d1;
            d2 = -d2;
        }
        if d1 < d2 - tolerance {
            return None;
        }
        if d1 < d2 {
            pen += (d1 - d2) * (d1 - d2);
        }
        k = k1;
    }

    Some(Merge {
        pen,
        c: [c0, c1],
        alpha,
        s,
    })
}

/// Merge runs of Bezier segments where the deviation stays within
/// `tolerance`, preferring the fewest segments and then the smallest
/// penalty.
#[must_use]
pub fn optimize(curve: &Curve, tolerance: f64) -> Curve {
    let m = curve.vertex.len();
    if m == 0 {
        return curve.clone();
    }
    let v = &curve.vertex;

    let convc: Vec<i8> = (0..m)
        .map(|i| match curve.tag[i] {
            Tag::Curve => orientation(dpara(v[(i + m - 1) % m], v[i], v[(i + 1) % m])),
            Tag::Corner => 0,
        })
        .collect();

    // areac[i]: signed area enclosed by the first i segments and v[0].
    let mut areac = vec![0.0; m + 1];
    let mut area = 0.0;
    for i in 0..m {
        let i1 = (i + 1) % m;
        if curve.tag[i1] == Tag::Curve {
            let alpha = curve.alpha[i1];
            area += 0.3 * alpha * (4.0 - alpha) * dpara(curve.c[i][2], v[i1], curve.c[i1][2]) / 2.0;
            area += dpara(v[0], curve.c[i][2], curve.c[i1][2]) / 2.0;
        }
        areac[i + 1] = area;
    }

    let mut pt = vec![0usize; m + 1];
    let mut pen = vec![0.0f64; m + 1];
    let mut len = vec![0usize; m + 1];
    let mut opt: Vec<Option<Merge>> = vec![None; m + 1];

    for j in 1..=m {
        pt[j] = j - 1;
        pen[j] = pen[j - 1];
        len[j] = len[j - 1] + 1;
        for i in (0..j.saturating_sub(1)).rev() {
            let Some(o) = penalty(curve, i, j % m, tolerance, &convc, &areac) else {
                break;
            };
            if len[j] > len[i] + 1 || (len[j] == len[i] + 1 && pen[j] > pen[i] + o.pen) {
                pt[j] = i;
                pen[j] = pen[i] + o.pen;
                len[j] = len[i] + 1;
                opt[j] = Some(o);
            }
        }
    }

    let om = len[m];
    let mut out = Curve {
        tag: vec![Tag::Corner; om],
        c: vec![[Point::default(); 3]; om],
        vertex: vec![Point::default(); om],
        alpha: vec![0.0; om],
    };

    let mut j = m;
    for i in (0..om).rev() {
        let jm = j % m;
        match opt[j].filter(|_| pt[j] != j - 1) {
            None => {
                out.tag[i] = curve.tag[jm];
                out.c[i] = curve.c[jm];
                out.vertex[i] = curve.vertex[jm];
                out.alpha[i] = curve.alpha[jm];
            }
            Some(o) => {
                out.tag[i] = Tag::Curve;
                out.c[i] = [o.c[0], o.c[1], curve.c[jm][2]];
                out.vertex[i] = curve.c[jm][2].lerp(v[jm], o.s);
                out.alpha[i] = o.alpha;
            }
        }
        j = pt[j];
    }

    out
}

/// The polygon as a closed run of straight segments, starting at the
/// first vertex.
#[must_use]
pub fn polygon_segments(vertex: &[Point]) -> Option<(Point, Vec<Segment>)> {
    let (&start, rest) = vertex.split_first()?;
    let mut segments: Vec<Segment> = rest.iter().map(|&to| Segment::Line { to }).collect();
    segments.push(Segment::Line { to: start });
    Some((start, segments))
}

impl Curve {
    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vertex.len()
    }

    /// The curve as a start point and closed run of segments.
    ///
    /// A corner contributes two lines (into the vertex and out to the
    /// segment end), a curve contributes one cubic.
    #[must_use]
    pub fn segments(&self) -> Option<(Point, Vec<Segment>)> {
        let last = self.c.last()?;
        let start = last[2];
        let mut segments = Vec::with_capacity(self.len() * 2);
        for (tag, [c0, c1, c2]) in self.tag.iter().zip(&self.c) {
            match tag {
                Tag::Corner => {
                    segments.push(Segment::Line { to: *c1 });
                    segments.push(Segment::Line { to: *c2 });
                }
                Tag::Curve => segments.push(Segment::Cubic {
                    c1: *c0,
                    c2: *c1,
                    to: *c2,
                }),
            }
        }
        Some((start, segments))
    }
}
