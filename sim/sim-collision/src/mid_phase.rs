//! Bounding volume hierarchy over the triangles of a mesh.
//!
//! The tree is built top-down: compute the bounds of all primitives, split on
//! the axis with the largest extent at the median centroid, recurse. Queries
//! only descend into nodes whose box overlaps the query volume, which keeps
//! the per-pair triangle fetch of concave collision close to O(log n).

use nalgebra::Point3;

use crate::broad_phase::Aabb;

/// A primitive stored in the BVH.
#[derive(Debug, Clone, Copy)]
pub struct BvhPrimitive {
    /// Bounds of the primitive.
    pub aabb: Aabb,
    /// Index into the owner's primitive array (e.g. triangle index).
    pub index: usize,
}

impl BvhPrimitive {
    /// Create a primitive.
    #[must_use]
    pub fn new(aabb: Aabb, index: usize) -> Self {
        Self { aabb, index }
    }

    /// Create a primitive bounding a triangle.
    #[must_use]
    pub fn from_triangle(vertices: &[Point3<f64>; 3], index: usize) -> Self {
        let aabb = Aabb::new(vertices[0], vertices[0])
            .including(&vertices[1])
            .including(&vertices[2]);
        Self::new(aabb, index)
    }

    fn centroid_on(&self, axis: usize) -> f64 {
        (self.aabb.min[axis] + self.aabb.max[axis]) * 0.5
    }
}

#[derive(Debug, Clone)]
enum BvhNode {
    Internal {
        aabb: Aabb,
        left: usize,
        right: usize,
    },
    Leaf {
        aabb: Aabb,
        first_primitive: usize,
        primitive_count: usize,
    },
}

impl BvhNode {
    fn aabb(&self) -> &Aabb {
        match self {
            Self::Internal { aabb, .. } | Self::Leaf { aabb, .. } => aabb,
        }
    }
}

/// Bounding volume hierarchy.
#[derive(Debug, Clone, Default)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    primitives: Vec<BvhPrimitive>,
}

impl Bvh {
    /// Maximum primitives per leaf node.
    pub const MAX_PRIMITIVES_PER_LEAF: usize = 4;

    /// Build a BVH from a list of primitives.
    #[must_use]
    pub fn build(mut primitives: Vec<BvhPrimitive>) -> Self {
        let mut bvh = Self::default();
        if primitives.is_empty() {
            return bvh;
        }

        bvh.nodes.reserve(primitives.len() * 2);
        let len = primitives.len();
        bvh.build_recursive(&mut primitives, 0, len);
        bvh.primitives = primitives;
        bvh
    }

    fn build_recursive(&mut self, primitives: &mut [BvhPrimitive], start: usize, end: usize) -> usize {
        let slice = &mut primitives[start..end];
        let aabb = slice
            .iter()
            .skip(1)
            .fold(slice[0].aabb, |acc, p| acc.merged(&p.aabb));

        let count = end - start;
        if count <= Self::MAX_PRIMITIVES_PER_LEAF {
            self.nodes.push(BvhNode::Leaf {
                aabb,
                first_primitive: start,
                primitive_count: count,
            });
            return self.nodes.len() - 1;
        }

        // Split on the axis with the largest extent
        let extent = aabb.max - aabb.min;
        let axis = extent.imax();
        slice.sort_by(|a, b| a.centroid_on(axis).total_cmp(&b.centroid_on(axis)));

        let mid = start + count / 2;
        let node_idx = self.nodes.len();
        self.nodes.push(BvhNode::Internal {
            aabb,
            left: 0,
            right: 0,
        });

        let left_idx = self.build_recursive(primitives, start, mid);
        let right_idx = self.build_recursive(primitives, mid, end);

        if let BvhNode::Internal { left, right, .. } = &mut self.nodes[node_idx] {
            *left = left_idx;
            *right = right_idx;
        }

        node_idx
    }

    /// Number of primitives in the tree.
    #[must_use]
    pub fn primitive_count(&self) -> usize {
        self.primitives.len()
    }

    /// Bounds of the whole tree.
    #[must_use]
    pub fn root_aabb(&self) -> Option<Aabb> {
        self.nodes.first().map(|n| *n.aabb())
    }

    /// Call `callback` with the index of every primitive overlapping `query`.
    pub fn query(&self, query: &Aabb, mut callback: impl FnMut(usize)) {
        self.traverse(|aabb| aabb.overlaps(query), &mut callback);
    }

    /// Call `callback` with the index of every primitive whose box the
    /// segment `from`-`to` passes through.
    pub fn query_segment(&self, from: &Point3<f64>, to: &Point3<f64>, mut callback: impl FnMut(usize)) {
        self.traverse(|aabb| aabb.intersects_segment(from, to), &mut callback);
    }

    fn traverse(&self, accept: impl Fn(&Aabb) -> bool, callback: &mut impl FnMut(usize)) {
        if self.nodes.is_empty() {
            return;
        }

        let mut stack = vec![0_usize];
        while let Some(node_idx) = stack.pop() {
            let node = &self.nodes[node_idx];
            if !accept(node.aabb()) {
                continue;
            }
            match node {
                BvhNode::Internal { left, right, .. } => {
                    stack.push(*right);
                    stack.push(*left);
                }
                BvhNode::Leaf {
                    first_primitive,
                    primitive_count,
                    ..
                } => {
                    for prim in &self.primitives[*first_primitive..*first_primitive + *primitive_count] {
                        if accept(&prim.aabb) {
                            callback(prim.index);
                        }
                    }
                }
            }
        }
    }
}
