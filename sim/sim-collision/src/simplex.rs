//! Simplex of support mappings for GJK, EPA and conservative advancement.
//!
//! A simplex holds up to four points of the Minkowski difference `A - B`,
//! each remembering the support points on `A` and `B` that produced it.
//! Reducing the simplex finds its point closest to the origin, stores the
//! barycentric weight of every vertex and drops the vertices that do not
//! contribute. The stored weights then give the closest points on `A`
//! and `B`.

use nalgebra::{Point3, Vector3};

/// Squared distance under which two Minkowski points are considered equal.
const DUPLICATE_TOLERANCE_SQ: f64 = 1e-12;

/// Signed volume under which a tetrahedron is treated as flat.
const DEGENERATE_VOLUME: f64 = 1e-14;

const TETRAHEDRON_FACES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];

/// A vertex of the simplex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupportMapping {
    /// Support point on shape A (world space).
    pub point_a: Point3<f64>,
    /// Support point on shape B (world space).
    pub point_b: Point3<f64>,
    /// `point_a - point_b`.
    pub point: Point3<f64>,
    /// Weight of this vertex in the last closest-point computation.
    pub barycentric: f64,
}

impl SupportMapping {
    /// Create a mapping from the two support points.
    #[must_use]
    pub fn new(point_a: Point3<f64>, point_b: Point3<f64>) -> Self {
        Self {
            point_a,
            point_b,
            point: Point3::from(point_a - point_b),
            barycentric: 0.0,
        }
    }
}

impl Default for SupportMapping {
    fn default() -> Self {
        Self::new(Point3::origin(), Point3::origin())
    }
}

/// A point, segment, triangle or tetrahedron of support mappings.
#[derive(Debug, Clone, Copy, Default)]
pub struct Simplex {
    points: [SupportMapping; 4],
    size: usize,
}

impl Simplex {
    /// Create an empty simplex.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vertices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.size
    }

    /// Whether the simplex has no vertex.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Vertices as a slice.
    #[must_use]
    pub fn points(&self) -> &[SupportMapping] {
        &self.points[..self.size]
    }

    /// Append a vertex. Returns `false` if the simplex is already full.
    pub fn add(&mut self, mapping: SupportMapping) -> bool {
        if self.size == 4 {
            return false;
        }
        self.points[self.size] = mapping;
        self.size += 1;
        true
    }

    /// Whether a vertex equal to `point` (within tolerance) is present.
    #[must_use]
    pub fn contains(&self, point: &Point3<f64>) -> bool {
        self.points()
            .iter()
            .any(|m| (m.point - point).norm_squared() <= DUPLICATE_TOLERANCE_SQ)
    }

    /// Largest squared norm among the vertices.
    #[must_use]
    pub fn max_norm_squared(&self) -> f64 {
        self.points()
            .iter()
            .map(|m| m.point.coords.norm_squared())
            .fold(0.0, f64::max)
    }

    /// Shift every vertex by the motion of each shape.
    pub fn translate(&mut self, offset_a: &Vector3<f64>, offset_b: &Vector3<f64>) {
        for m in &mut self.points[..self.size] {
            m.point_a += offset_a;
            m.point_b += offset_b;
            m.point += offset_a - offset_b;
        }
    }

    /// Closest points on A and B, from the barycentric weights of the
    /// last reduction.
    #[must_use]
    pub fn closest_points(&self) -> (Point3<f64>, Point3<f64>) {
        let mut a = Vector3::zeros();
        let mut b = Vector3::zeros();
        for m in self.points() {
            a += m.point_a.coords * m.barycentric;
            b += m.point_b.coords * m.barycentric;
        }
        (Point3::from(a), Point3::from(b))
    }

    /// Reduce to the smallest sub-simplex containing the point closest to
    /// the origin, and return that point.
    pub fn reduce_closest_to_origin(&mut self) -> Vector3<f64> {
        let mut weights = [0.0_f64; 4];
        match self.size {
            0 => return Vector3::zeros(),
            1 => weights[0] = 1.0,
            2 => {
                let w = segment_weights(&self.points[0].point, &self.points[1].point);
                weights[..2].copy_from_slice(&w);
            }
            3 => {
                let w = triangle_weights(
                    &self.points[0].point,
                    &self.points[1].point,
                    &self.points[2].point,
                );
                weights[..3].copy_from_slice(&w);
            }
            _ => weights = self.tetrahedron_weights(),
        }

        let mut kept = 0;
        for i in 0..self.size {
            if weights[i] > 0.0 {
                self.points[kept] = self.points[i];
                self.points[kept].barycentric = weights[i];
                kept += 1;
            }
        }
        self.size = kept;

        self.points()
            .iter()
            .fold(Vector3::zeros(), |acc, m| acc + m.point.coords * m.barycentric)
    }

    fn tetrahedron_weights(&self) -> [f64; 4] {
        let [a, b, c, d] = [
            self.points[0].point,
            self.points[1].point,
            self.points[2].point,
            self.points[3].point,
        ];
        let origin = Point3::origin();

        let volume = signed_volume(&a, &b, &c, &d);
        if volume.abs() > DEGENERATE_VOLUME {
            let weights = [
                signed_volume(&origin, &b, &c, &d) / volume,
                signed_volume(&a, &origin, &c, &d) / volume,
                signed_volume(&a, &b, &origin, &d) / volume,
                signed_volume(&a, &b, &c, &origin) / volume,
            ];
            if weights.iter().all(|&w| w >= 0.0) {
                return weights;
            }
        }

        // Origin outside (or flat tetrahedron): best of the four faces
        let corners = [a, b, c, d];
        let mut best = [1.0, 0.0, 0.0, 0.0];
        let mut best_dist = f64::INFINITY;
        for face in TETRAHEDRON_FACES {
            let w = triangle_weights(&corners[face[0]], &corners[face[1]], &corners[face[2]]);
            let closest = corners[face[0]].coords * w[0]
                + corners[face[1]].coords * w[1]
                + corners[face[2]].coords * w[2];
            let dist = closest.norm_squared();
            if dist < best_dist {
                best_dist = dist;
                best = [0.0; 4];
                for (k, &vertex) in face.iter().enumerate() {
                    best[vertex] = w[k];
                }
            }
        }
        best
    }
}

fn signed_volume(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>) -> f64 {
    (b - a).dot(&(c - a).cross(&(d - a)))
}

/// Barycentric weights of the point of segment `ab` closest to the origin.
fn segment_weights(a: &Point3<f64>, b: &Point3<f64>) -> [f64; 2] {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq <= DUPLICATE_TOLERANCE_SQ {
        return [1.0, 0.0];
    }
    let t = (-a.coords.dot(&ab) / len_sq).clamp(0.0, 1.0);
    [1.0 - t, t]
}

/// Barycentric weights of the point of triangle `abc` closest to the origin.
///
/// Voronoi region classification; a zero-area triangle falls back to its
/// closest edge.
fn triangle_weights(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> [f64; 3] {
    let ab = b - a;
    let ac = c - a;

    let ap = -a.coords;
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return [1.0, 0.0, 0.0];
    }

    let bp = -b.coords;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return [0.0, 1.0, 0.0];
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return [1.0 - v, v, 0.0];
    }

    let cp = -c.coords;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return [0.0, 0.0, 1.0];
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return [1.0 - w, 0.0, w];
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return [0.0, 1.0 - w, w];
    }

    let sum = va + vb + vc;
    if sum.abs() <= f64::EPSILON {
        return degenerate_triangle_weights(a, b, c);
    }
    let v = vb / sum;
    let w = vc / sum;
    [1.0 - v - w, v, w]
}

fn degenerate_triangle_weights(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> [f64; 3] {
    let candidates = [
        ([0, 1], segment_weights(a, b)),
        ([0, 2], segment_weights(a, c)),
        ([1, 2], segment_weights(b, c)),
    ];
    let corners = [a, b, c];
    let mut best = [1.0, 0.0, 0.0];
    let mut best_dist = f64::INFINITY;
    for (idx, w) in candidates {
        let p = corners[idx[0]].coords * w[0] + corners[idx[1]].coords * w[1];
        let dist = p.norm_squared();
        if dist < best_dist {
            best_dist = dist;
            best = [0.0; 3];
            best[idx[0]] = w[0];
            best[idx[1]] = w[1];
        }
    }
    best
}
