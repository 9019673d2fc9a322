//! Expanding polytope algorithm.
//!
//! Starting from the terminal GJK simplex of an overlapping pair, EPA grows
//! a polytope inside the Minkowski difference `A - B` until the face closest
//! to the origin lies on its boundary. That face gives the penetration depth
//! and normal, and its barycentric coordinates give the contact points.

use nalgebra::{Point3, Unit, UnitQuaternion, Vector3};
use sim_types::NarrowPhaseConfig;
use tracing::debug;

use crate::shape::SupportMap;
use crate::simplex::{Simplex, SupportMapping};

/// Cross product length under which a face is degenerate.
const DEGENERATE_AREA: f64 = 1e-12;

/// Hard cap on polytope faces.
const MAX_FACES: usize = 128;

/// Barycentric slack when testing whether a seed tetrahedron holds the origin.
const CONTAINMENT_TOLERANCE: f64 = 1e-9;

/// Outcome of an EPA query.
#[derive(Debug, Clone, Copy)]
pub enum EpaResult {
    /// Penetration found.
    Collide {
        /// Deepest point of A inside B.
        contact_point_a: Point3<f64>,
        /// Deepest point of B inside A.
        contact_point_b: Point3<f64>,
        /// Unit normal from B toward A. Translating A by `normal * depth`
        /// separates the shapes.
        normal: Vector3<f64>,
        /// Penetration depth (positive).
        depth: f64,
    },
    /// The shapes only touch.
    NoCollide,
    /// The polytope could not be built or became degenerate.
    Invalid,
}

#[derive(Debug, Clone, Copy)]
struct Face {
    vertices: [usize; 3],
    normal: Vector3<f64>,
    distance: f64,
}

/// EPA solver with limits taken from the narrow-phase configuration.
#[derive(Debug, Clone, Copy)]
pub struct EpaAlgorithm {
    max_iteration: usize,
    tolerance: f64,
}

impl EpaAlgorithm {
    /// Create a solver.
    #[must_use]
    pub fn new(config: &NarrowPhaseConfig) -> Self {
        Self {
            max_iteration: config.epa_max_iteration,
            tolerance: config.epa_termination_tolerance,
        }
    }

    /// Compute penetration from a GJK simplex that encloses the origin.
    pub fn process<A, B>(&self, a: &A, b: &B, simplex: &Simplex) -> EpaResult
    where
        A: SupportMap + ?Sized,
        B: SupportMap + ?Sized,
    {
        let support = |dir: &Vector3<f64>| SupportMapping::new(a.support_point(dir), b.support_point(&-dir));

        let Some(mut vertices) = seed_tetrahedron(simplex, &support) else {
            if simplex.len() == 1 {
                return EpaResult::NoCollide;
            }
            debug!(simplex_size = simplex.len(), "EPA could not build an initial polytope");
            return EpaResult::Invalid;
        };

        let Some(mut faces) = tetrahedron_faces(&vertices) else {
            debug!("EPA initial tetrahedron is degenerate");
            return EpaResult::Invalid;
        };

        let mut upper_bound = f64::INFINITY;
        let mut best = closest_face(&faces);

        for _ in 0..self.max_iteration {
            let face = faces[best];
            let w = support(&face.normal);
            upper_bound = upper_bound.min(w.point.coords.dot(&face.normal).abs());
            if upper_bound <= (1.0 + self.tolerance) * face.distance {
                break;
            }
            if vertices.iter().any(|v| (v.point - w.point).norm_squared() <= DEGENERATE_AREA) {
                break;
            }

            vertices.push(w);
            if !expand(&vertices, &mut faces, vertices.len() - 1) {
                vertices.pop();
                break;
            }
            best = closest_face(&faces);
            if faces.len() > MAX_FACES {
                break;
            }
        }

        contact_from_face(&vertices, &faces[best])
    }
}

/// Grow the GJK simplex into a tetrahedron enclosing the origin.
fn seed_tetrahedron(
    simplex: &Simplex,
    support: &impl Fn(&Vector3<f64>) -> SupportMapping,
) -> Option<Vec<SupportMapping>> {
    let points = simplex.points();
    match points.len() {
        2 => {
            let axis = points[1].point - points[0].point;
            let axis = Unit::try_new(axis, DEGENERATE_AREA)?;
            let min_axis = axis.iamin();
            let mut reference = Vector3::zeros();
            reference[min_axis] = 1.0;
            let first = axis.cross(&reference);
            let rotation = UnitQuaternion::from_axis_angle(&axis, std::f64::consts::TAU / 3.0);
            let second = rotation * first;
            let third = rotation * second;

            let ring = [support(&first), support(&second), support(&third)];
            [points[0], points[1]]
                .into_iter()
                .map(|apex| vec![apex, ring[0], ring[1], ring[2]])
                .find(|tetra| contains_origin(tetra))
        }
        3 => {
            let normal = (points[1].point - points[0].point).cross(&(points[2].point - points[0].point));
            if normal.norm() <= DEGENERATE_AREA {
                return None;
            }
            [support(&normal), support(&-normal)]
                .into_iter()
                .map(|apex| vec![points[0], points[1], points[2], apex])
                .find(|tetra| contains_origin(tetra))
        }
        4 => Some(points.to_vec()),
        _ => None,
    }
}

fn contains_origin(tetra: &[SupportMapping]) -> bool {
    let [a, b, c, d] = [tetra[0].point, tetra[1].point, tetra[2].point, tetra[3].point];
    let volume = signed_volume(&a, &b, &c, &d);
    if volume.abs() <= DEGENERATE_AREA {
        return false;
    }
    let o = Point3::origin();
    [
        signed_volume(&o, &b, &c, &d),
        signed_volume(&a, &o, &c, &d),
        signed_volume(&a, &b, &o, &d),
        signed_volume(&a, &b, &c, &o),
    ]
    .iter()
    .all(|v| v / volume >= -CONTAINMENT_TOLERANCE)
}

fn signed_volume(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>) -> f64 {
    (b - a).dot(&(c - a).cross(&(d - a)))
}

fn create_face(vertices: &[SupportMapping], indices: [usize; 3]) -> Option<Face> {
    let a = vertices[indices[0]].point;
    let b = vertices[indices[1]].point;
    let c = vertices[indices[2]].point;
    let normal = Unit::try_new((b - a).cross(&(c - a)), DEGENERATE_AREA)?.into_inner();
    Some(Face {
        vertices: indices,
        normal,
        distance: a.coords.dot(&normal),
    })
}

/// Four faces of the seed tetrahedron, each oriented away from the
/// opposite vertex.
fn tetrahedron_faces(vertices: &[SupportMapping]) -> Option<Vec<Face>> {
    const FACES: [([usize; 3], usize); 4] = [
        ([0, 1, 2], 3),
        ([0, 3, 1], 2),
        ([0, 2, 3], 1),
        ([1, 3, 2], 0),
    ];

    let mut faces = Vec::with_capacity(MAX_FACES);
    for (indices, opposite) in FACES {
        let mut face = create_face(vertices, indices)?;
        let to_opposite = vertices[opposite].point - vertices[indices[0]].point;
        if face.normal.dot(&to_opposite) > 0.0 {
            face.normal = -face.normal;
            face.distance = -face.distance;
            face.vertices.swap(1, 2);
        }
        faces.push(face);
    }
    Some(faces)
}

fn closest_face(faces: &[Face]) -> usize {
    faces
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.distance.total_cmp(&b.distance))
        .map_or(0, |(i, _)| i)
}

/// Add vertex `new` to the hull: drop the faces it can see and stitch the
/// horizon. Leaves `faces` untouched and returns `false` on failure.
fn expand(vertices: &[SupportMapping], faces: &mut Vec<Face>, new: usize) -> bool {
    let point = vertices[new].point;
    let mut edges: Vec<(usize, usize)> = Vec::new();
    let mut kept = Vec::with_capacity(faces.len() + 4);

    for face in faces.iter() {
        let on_face = vertices[face.vertices[0]].point;
        if face.normal.dot(&(point - on_face)) > 0.0 {
            let v = face.vertices;
            add_edge(&mut edges, v[0], v[1]);
            add_edge(&mut edges, v[1], v[2]);
            add_edge(&mut edges, v[2], v[0]);
        } else {
            kept.push(*face);
        }
    }

    if edges.is_empty() {
        return false;
    }
    for (v1, v2) in edges {
        match create_face(vertices, [new, v1, v2]) {
            Some(face) => kept.push(face),
            None => return false,
        }
    }

    *faces = kept;
    true
}

/// Toggle an edge: a shared edge appears twice in opposite order and is
/// removed, leaving only the horizon.
fn add_edge(edges: &mut Vec<(usize, usize)>, v1: usize, v2: usize) {
    if let Some(idx) = edges
        .iter()
        .position(|&(a, b)| (a == v2 && b == v1) || (a == v1 && b == v2))
    {
        edges.swap_remove(idx);
    } else {
        edges.push((v1, v2));
    }
}

fn contact_from_face(vertices: &[SupportMapping], face: &Face) -> EpaResult {
    let [ia, ib, ic] = face.vertices;
    let (a, b, c) = (vertices[ia], vertices[ib], vertices[ic]);
    let projected = Point3::from(face.normal * face.distance);

    let v0 = b.point - a.point;
    let v1 = c.point - a.point;
    let v2 = projected - a.point;
    let d00 = v0.dot(&v0);
    let d01 = v0.dot(&v1);
    let d11 = v1.dot(&v1);
    let d20 = v2.dot(&v0);
    let d21 = v2.dot(&v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() <= DEGENERATE_AREA * DEGENERATE_AREA || !face.normal.iter().all(|x| x.is_finite()) {
        debug!(denom, distance = face.distance, "EPA closest face is degenerate");
        return EpaResult::Invalid;
    }

    let lambda_b = (d11 * d20 - d01 * d21) / denom;
    let lambda_c = (d00 * d21 - d01 * d20) / denom;
    let lambda_a = 1.0 - lambda_b - lambda_c;

    let contact_point_a = Point3::from(
        a.point_a.coords * lambda_a + b.point_a.coords * lambda_b + c.point_a.coords * lambda_c,
    );
    let contact_point_b = Point3::from(
        a.point_b.coords * lambda_a + b.point_b.coords * lambda_b + c.point_b.coords * lambda_c,
    );

    EpaResult::Collide {
        contact_point_a,
        contact_point_b,
        normal: -face.normal,
        depth: face.distance.max(0.0),
    }
}
