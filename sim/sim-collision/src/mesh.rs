//! Triangle mesh shape indexed by a BVH.

use nalgebra::Point3;
use sim_types::{CollisionError, Result};

use crate::broad_phase::Aabb;
use crate::mid_phase::{Bvh, BvhPrimitive};
use crate::shape::Triangle;

/// Static triangle mesh in local coordinates.
///
/// The BVH is built once at construction; the mesh is immutable afterwards
/// and shared between bodies by `Arc`.
#[derive(Debug, Clone)]
pub struct TriangleMesh {
    vertices: Vec<Point3<f64>>,
    indices: Vec<[usize; 3]>,
    aabb: Aabb,
    bvh: Bvh,
}

impl PartialEq for TriangleMesh {
    fn eq(&self, other: &Self) -> bool {
        self.vertices == other.vertices && self.indices == other.indices
    }
}

impl TriangleMesh {
    /// Create a mesh from vertices and triangle index triples.
    ///
    /// # Errors
    ///
    /// Returns [`CollisionError::InvalidConfig`] for an empty mesh, an index
    /// out of bounds or a non-finite vertex.
    pub fn new(vertices: Vec<Point3<f64>>, indices: Vec<[usize; 3]>) -> Result<Self> {
        if indices.is_empty() {
            return Err(CollisionError::invalid_config(
                "triangle mesh needs at least one triangle",
            ));
        }
        if let Some(bad) = indices.iter().flatten().find(|&&i| i >= vertices.len()) {
            return Err(CollisionError::invalid_config(format!(
                "triangle index {bad} out of bounds ({} vertices)",
                vertices.len()
            )));
        }
        if vertices.iter().any(|v| !v.coords.iter().all(|c| c.is_finite())) {
            return Err(CollisionError::invalid_config(
                "triangle mesh vertices must be finite",
            ));
        }

        let primitives: Vec<BvhPrimitive> = indices
            .iter()
            .enumerate()
            .map(|(i, tri)| {
                BvhPrimitive::from_triangle(
                    &[vertices[tri[0]], vertices[tri[1]], vertices[tri[2]]],
                    i,
                )
            })
            .collect();
        let bvh = Bvh::build(primitives);
        let aabb = bvh.root_aabb().unwrap_or_default();

        Ok(Self {
            vertices,
            indices,
            aabb,
            bvh,
        })
    }

    /// Create a mesh from a flat index list (three entries per triangle).
    ///
    /// # Errors
    ///
    /// Fails if the index count is not a multiple of 3, or as [`TriangleMesh::new`].
    pub fn from_flat_indices(vertices: Vec<Point3<f64>>, indices: &[usize]) -> Result<Self> {
        if indices.len() % 3 != 0 {
            return Err(CollisionError::invalid_config(
                "triangle indices must be a multiple of 3",
            ));
        }
        let triples = indices.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();
        Self::new(vertices, triples)
    }

    /// Mesh vertices.
    #[must_use]
    pub fn vertices(&self) -> &[Point3<f64>] {
        &self.vertices
    }

    /// Number of triangles.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    /// Vertices of triangle `index`.
    #[must_use]
    pub fn triangle(&self, index: usize) -> Option<Triangle> {
        let tri = self.indices.get(index)?;
        Some([
            self.vertices[tri[0]],
            self.vertices[tri[1]],
            self.vertices[tri[2]],
        ])
    }

    /// Local bounds of the mesh.
    #[must_use]
    pub fn local_aabb(&self) -> Aabb {
        self.aabb
    }

    /// Append every triangle whose bounds overlap `aabb` (local space).
    pub fn find_triangles(&self, aabb: &Aabb, out: &mut Vec<Triangle>) {
        self.bvh.query(aabb, |i| {
            if let Some(tri) = self.triangle(i) {
                out.push(tri);
            }
        });
    }

    /// Append every triangle whose bounds the segment `from`-`to` crosses.
    pub fn find_segment_triangles(&self, from: &Point3<f64>, to: &Point3<f64>, out: &mut Vec<Triangle>) {
        self.bvh.query_segment(from, to, |i| {
            if let Some(tri) = self.triangle(i) {
                out.push(tri);
            }
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::cast_precision_loss)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    /// A flat grid of `n x n` quads in the XZ plane.
    fn floor_mesh(n: usize) -> TriangleMesh {
        let mut vertices = Vec::new();
        for z in 0..=n {
            for x in 0..=n {
                vertices.push(Point3::new(x as f64, 0.0, z as f64));
            }
        }
        let stride = n + 1;
        let mut indices = Vec::new();
        for z in 0..n {
            for x in 0..n {
                let i = z * stride + x;
                indices.push([i, i + stride, i + 1]);
                indices.push([i + 1, i + stride, i + stride + 1]);
            }
        }
        TriangleMesh::new(vertices, indices).unwrap()
    }

    #[test]
    fn test_validation() {
        let verts = vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)];
        assert!(TriangleMesh::new(verts.clone(), vec![[0, 1, 2]]).is_ok());
        assert!(TriangleMesh::new(verts.clone(), vec![[0, 1, 3]]).is_err());
        assert!(TriangleMesh::new(verts.clone(), Vec::new()).is_err());
        assert!(TriangleMesh::from_flat_indices(verts, &[0, 1]).is_err());
    }

    #[test]
    fn test_find_triangles() {
        let mesh = floor_mesh(10);
        assert_eq!(mesh.triangle_count(), 200);

        let mut out = Vec::new();
        let query = Aabb::from_center(Point3::new(4.5, 0.0, 4.5), Vector3::new(0.2, 0.2, 0.2));
        mesh.find_triangles(&query, &mut out);
        assert_eq!(out.len(), 2);

        out.clear();
        let above = Aabb::from_center(Point3::new(4.5, 2.0, 4.5), Vector3::new(0.2, 0.2, 0.2));
        mesh.find_triangles(&above, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_find_segment_triangles() {
        let mesh = floor_mesh(10);
        let mut out = Vec::new();
        mesh.find_segment_triangles(
            &Point3::new(2.3, 5.0, 7.6),
            &Point3::new(2.3, -5.0, 7.6),
            &mut out,
        );
        assert!(!out.is_empty());
        assert!(out.len() <= 2);
    }
}
