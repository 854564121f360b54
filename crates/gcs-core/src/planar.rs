//! Planar geometry on projected coordinates.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// Metres. Absorbs floating-point error from projection and arithmetic.
const EPS_M: f64 = 1e-9;

/// A point in a projected frame (metres).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanarPoint {
    pub x: f64,
    pub y: f64,
}

impl PlanarPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &PlanarPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Scalar projection onto a unit `axis`.
    pub fn along(&self, axis: (f64, f64)) -> f64 {
        self.x * axis.0 + self.y * axis.1
    }

    fn lerp(&self, other: &PlanarPoint, t: f64) -> PlanarPoint {
        PlanarPoint::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }
}

fn cross(ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    ax * by - ay * bx
}

/// Signed shoelace area of an implicitly closed ring (positive = CCW).
pub fn signed_area(ring: &[PlanarPoint]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let origin = ring[0];
    let mut sum = 0.0;
    for (i, p) in ring.iter().enumerate() {
        let q = ring[(i + 1) % ring.len()];
        sum += cross(p.x - origin.x, p.y - origin.y, q.x - origin.x, q.y - origin.y);
    }
    sum / 2.0
}

/// Length of the closed boundary.
pub fn perimeter(ring: &[PlanarPoint]) -> f64 {
    if ring.len() < 2 {
        return 0.0;
    }
    ring.iter()
        .enumerate()
        .map(|(i, p)| p.distance(&ring[(i + 1) % ring.len()]))
        .sum()
}

/// Area centroid of a ring. Falls back to the vertex mean for degenerate rings.
pub fn centroid(ring: &[PlanarPoint]) -> PlanarPoint {
    if ring.is_empty() {
        return PlanarPoint::default();
    }
    let area = signed_area(ring);
    if area.abs() <= EPS_M {
        let n = ring.len() as f64;
        let (sx, sy) = ring.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        return PlanarPoint::new(sx / n, sy / n);
    }

    // Shift to the first vertex to keep the products small in projected metres.
    let origin = ring[0];
    let (mut cx, mut cy) = (0.0, 0.0);
    for (i, p) in ring.iter().enumerate() {
        let q = ring[(i + 1) % ring.len()];
        let (px, py) = (p.x - origin.x, p.y - origin.y);
        let (qx, qy) = (q.x - origin.x, q.y - origin.y);
        let f = px * qy - qx * py;
        cx += (px + qx) * f;
        cy += (py + qy) * f;
    }
    PlanarPoint::new(origin.x + cx / (6.0 * area), origin.y + cy / (6.0 * area))
}

/// Ray-casting containment test.
pub fn contains_point(ring: &[PlanarPoint], point: PlanarPoint) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (pi, pj) = (ring[i], ring[j]);
        if ((pi.y > point.y) != (pj.y > point.y))
            && (point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Convex hull in counter-clockwise order without collinear points.
pub fn convex_hull(points: &[PlanarPoint]) -> Vec<PlanarPoint> {
    let mut sorted: Vec<PlanarPoint> = points.to_vec();
    sorted.sort_by(|a, b| {
        a.x.partial_cmp(&b.x)
            .unwrap_or(Ordering::Equal)
            .then(a.y.partial_cmp(&b.y).unwrap_or(Ordering::Equal))
    });
    sorted.dedup();
    if sorted.len() < 3 {
        return sorted;
    }

    fn turn(o: &PlanarPoint, a: &PlanarPoint, b: &PlanarPoint) -> f64 {
        cross(a.x - o.x, a.y - o.y, b.x - o.x, b.y - o.y)
    }

    let mut lower: Vec<PlanarPoint> = Vec::new();
    for p in &sorted {
        while lower.len() >= 2 && turn(&lower[lower.len() - 2], &lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(*p);
    }
    let mut upper: Vec<PlanarPoint> = Vec::new();
    for p in sorted.iter().rev() {
        while upper.len() >= 2 && turn(&upper[upper.len() - 2], &upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(*p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// A rectangle with arbitrary orientation, stored as extents along two axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientedRect {
    pub axis_u: (f64, f64),
    pub axis_v: (f64, f64),
    pub min_u: f64,
    pub max_u: f64,
    pub min_v: f64,
    pub max_v: f64,
}

impl OrientedRect {
    pub fn width(&self) -> f64 {
        self.max_u - self.min_u
    }

    pub fn height(&self) -> f64 {
        self.max_v - self.min_v
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn corners(&self) -> [PlanarPoint; 4] {
        let at = |u: f64, v: f64| {
            PlanarPoint::new(
                u * self.axis_u.0 + v * self.axis_v.0,
                u * self.axis_u.1 + v * self.axis_v.1,
            )
        };
        [
            at(self.min_u, self.min_v),
            at(self.max_u, self.min_v),
            at(self.max_u, self.max_v),
            at(self.min_u, self.max_v),
        ]
    }

    /// Grow every side outward by `margin`.
    pub fn expanded(&self, margin: f64) -> OrientedRect {
        OrientedRect {
            min_u: self.min_u - margin,
            max_u: self.max_u + margin,
            min_v: self.min_v - margin,
            max_v: self.max_v + margin,
            ..*self
        }
    }

    /// Heading (radians from +x) of the longest side. Ties keep the first side.
    pub fn long_axis_angle(&self) -> f64 {
        let axis = if self.height() > self.width() {
            self.axis_v
        } else {
            self.axis_u
        };
        axis.1.atan2(axis.0)
    }
}

/// Minimum-area bounding rectangle by rotating calipers over the hull edges.
///
/// Returns `None` when the points are collinear or fewer than three.
pub fn minimum_area_rect(points: &[PlanarPoint]) -> Option<OrientedRect> {
    let hull = convex_hull(points);
    if hull.len() < 3 {
        return None;
    }

    let mut best: Option<OrientedRect> = None;
    for (i, p) in hull.iter().enumerate() {
        let q = hull[(i + 1) % hull.len()];
        let len = p.distance(&q);
        if len <= EPS_M {
            continue;
        }
        let axis_u = ((q.x - p.x) / len, (q.y - p.y) / len);
        let axis_v = (-axis_u.1, axis_u.0);

        let mut rect = OrientedRect {
            axis_u,
            axis_v,
            min_u: f64::INFINITY,
            max_u: f64::NEG_INFINITY,
            min_v: f64::INFINITY,
            max_v: f64::NEG_INFINITY,
        };
        for h in &hull {
            let u = h.along(axis_u);
            let v = h.along(axis_v);
            rect.min_u = rect.min_u.min(u);
            rect.max_u = rect.max_u.max(u);
            rect.min_v = rect.min_v.min(v);
            rect.max_v = rect.max_v.max(v);
        }

        match best {
            Some(current) if current.area() <= rect.area() => {}
            _ => best = Some(rect),
        }
    }
    best
}

/// Clip the segment `a`-`b` against a ring, returning the inside pieces in
/// order from `a` to `b`.
pub fn clip_segment(
    a: PlanarPoint,
    b: PlanarPoint,
    ring: &[PlanarPoint],
) -> Vec<(PlanarPoint, PlanarPoint)> {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let length = dx.hypot(dy);
    if ring.len() < 3 || length <= EPS_M {
        return Vec::new();
    }

    let mut cuts = vec![0.0, 1.0];
    for (i, p) in ring.iter().enumerate() {
        let q = ring[(i + 1) % ring.len()];
        let (ex, ey) = (q.x - p.x, q.y - p.y);
        let denom = cross(dx, dy, ex, ey);
        if denom.abs() <= f64::EPSILON {
            continue;
        }
        let (wx, wy) = (p.x - a.x, p.y - a.y);
        let t = cross(wx, wy, ex, ey) / denom;
        let s = cross(wx, wy, dx, dy) / denom;
        if (0.0..=1.0).contains(&t) && s >= -EPS_M && s <= 1.0 + EPS_M {
            cuts.push(t);
        }
    }
    cuts.sort_by(|x, y| x.total_cmp(y));
    let min_step = EPS_M / length;
    cuts.dedup_by(|later, earlier| (*later - *earlier).abs() <= min_step);

    let mut spans: Vec<(f64, f64)> = Vec::new();
    for pair in cuts.windows(2) {
        let (t0, t1) = (pair[0], pair[1]);
        if t1 - t0 <= min_step {
            continue;
        }
        if !contains_point(ring, a.lerp(&b, (t0 + t1) / 2.0)) {
            continue;
        }
        match spans.last_mut() {
            Some(last) if (last.1 - t0).abs() <= min_step => last.1 = t1,
            _ => spans.push((t0, t1)),
        }
    }

    spans
        .into_iter()
        .map(|(t0, t1)| (a.lerp(&b, t0), a.lerp(&b, t1)))
        .collect()
}
