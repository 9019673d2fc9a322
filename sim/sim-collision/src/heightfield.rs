//! Height field terrain shape.
//!
//! A height field is a regular 2D grid of height samples. It lies in the XY
//! plane of its local frame with heights along Z:
//! - Origin is at grid corner (0, 0)
//! - X spans `[0, (width - 1) * cell_size]`
//! - Y spans `[0, (depth - 1) * cell_size]`
//!
//! The grid itself is the spatial index: a box query maps directly to a
//! range of cells, each split into two triangles.

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation
)]

use nalgebra::Point3;
use sim_types::{CollisionError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::broad_phase::Aabb;
use crate::shape::Triangle;

/// Height field collision data.
///
/// Heights are stored in row-major order (X varies fastest).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HeightField {
    heights: Vec<f64>,
    width: usize,
    depth: usize,
    cell_size: f64,
    min_height: f64,
    max_height: f64,
}

impl HeightField {
    /// Create a height field from `width * depth` samples.
    ///
    /// # Errors
    ///
    /// Returns [`CollisionError::InvalidConfig`] if the grid has fewer than
    /// 2x2 samples, the sample count does not match, the cell size is not
    /// positive or a height is not finite.
    pub fn new(heights: Vec<f64>, width: usize, depth: usize, cell_size: f64) -> Result<Self> {
        if width < 2 || depth < 2 {
            return Err(CollisionError::invalid_config(
                "height field needs at least 2x2 samples",
            ));
        }
        if heights.len() != width * depth {
            return Err(CollisionError::invalid_config(format!(
                "height field data length {} doesn't match dimensions {width}x{depth}",
                heights.len()
            )));
        }
        if !(cell_size > 0.0 && cell_size.is_finite()) {
            return Err(CollisionError::invalid_config(
                "height field cell_size must be positive",
            ));
        }
        if heights.iter().any(|h| !h.is_finite()) {
            return Err(CollisionError::invalid_config(
                "height field heights must be finite",
            ));
        }

        let (min_height, max_height) = heights
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &h| {
                (min.min(h), max.max(h))
            });

        Ok(Self {
            heights,
            width,
            depth,
            cell_size,
            min_height,
            max_height,
        })
    }

    /// Create a flat height field at a given height.
    pub fn flat(width: usize, depth: usize, cell_size: f64, height: f64) -> Result<Self> {
        Self::new(vec![height; width * depth], width, depth, cell_size)
    }

    /// Create a height field by sampling `f(x, y)` at every grid vertex.
    pub fn from_fn<F>(width: usize, depth: usize, cell_size: f64, f: F) -> Result<Self>
    where
        F: Fn(f64, f64) -> f64,
    {
        let mut heights = Vec::with_capacity(width * depth);
        for y in 0..depth {
            for x in 0..width {
                heights.push(f(x as f64 * cell_size, y as f64 * cell_size));
            }
        }
        Self::new(heights, width, depth, cell_size)
    }

    /// Number of samples along X.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of samples along Y.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Size of each cell.
    #[must_use]
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Height at grid coordinates (x, y).
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> Option<f64> {
        (x < self.width && y < self.depth).then(|| self.heights[y * self.width + x])
    }

    fn vertex(&self, x: usize, y: usize) -> Point3<f64> {
        Point3::new(
            x as f64 * self.cell_size,
            y as f64 * self.cell_size,
            self.heights[y * self.width + x],
        )
    }

    /// Local bounds of the whole field.
    #[must_use]
    pub fn local_aabb(&self) -> Aabb {
        Aabb::new(
            Point3::new(0.0, 0.0, self.min_height),
            Point3::new(
                (self.width - 1) as f64 * self.cell_size,
                (self.depth - 1) as f64 * self.cell_size,
                self.max_height,
            ),
        )
    }

    /// Append the triangles of every cell overlapping `aabb` (local space).
    pub fn find_triangles(&self, aabb: &Aabb, out: &mut Vec<Triangle>) {
        if aabb.max.z < self.min_height || aabb.min.z > self.max_height {
            return;
        }

        let last_x = self.width - 1;
        let last_y = self.depth - 1;
        let x_start = (aabb.min.x / self.cell_size).floor().max(0.0) as usize;
        let y_start = (aabb.min.y / self.cell_size).floor().max(0.0) as usize;
        let x_end = ((aabb.max.x / self.cell_size).floor() + 1.0).max(0.0) as usize;
        let y_end = ((aabb.max.y / self.cell_size).floor() + 1.0).max(0.0) as usize;
        let (x_end, y_end) = (x_end.min(last_x), y_end.min(last_y));

        for cy in y_start..y_end {
            for cx in x_start..x_end {
                let v00 = self.vertex(cx, cy);
                let v10 = self.vertex(cx + 1, cy);
                let v01 = self.vertex(cx, cy + 1);
                let v11 = self.vertex(cx + 1, cy + 1);

                let lo = v00.z.min(v10.z).min(v01.z).min(v11.z);
                let hi = v00.z.max(v10.z).max(v01.z).max(v11.z);
                if aabb.max.z < lo || aabb.min.z > hi {
                    continue;
                }

                // Counter-clockwise seen from +Z
                out.push([v00, v10, v11]);
                out.push([v00, v11, v01]);
            }
        }
    }

    /// Append the triangles of every cell the segment `from`-`to` may cross.
    pub fn find_segment_triangles(&self, from: &Point3<f64>, to: &Point3<f64>, out: &mut Vec<Triangle>) {
        let bounds = Aabb::new(*from, *from).including(to);
        let start = out.len();
        self.find_triangles(&bounds, out);

        // Drop triangles whose bounds the segment misses
        let mut i = start;
        while i < out.len() {
            let tri = out[i];
            let tri_aabb = Aabb::new(tri[0], tri[0]).including(&tri[1]).including(&tri[2]);
            if tri_aabb.intersects_segment(from, to) {
                i += 1;
            } else {
                out.swap_remove(i);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn test_validation() {
        assert!(HeightField::new(vec![0.0; 4], 2, 2, 1.0).is_ok());
        assert!(HeightField::new(vec![0.0; 3], 2, 2, 1.0).is_err());
        assert!(HeightField::new(vec![0.0; 2], 1, 2, 1.0).is_err());
        assert!(HeightField::new(vec![0.0; 4], 2, 2, 0.0).is_err());
        assert!(HeightField::new(vec![0.0, 1.0, f64::NAN, 0.0], 2, 2, 1.0).is_err());
    }

    #[test]
    fn test_local_aabb() {
        let field = HeightField::from_fn(5, 3, 0.5, |x, _| x).unwrap();
        let aabb = field.local_aabb();
        assert_relative_eq!(aabb.max.x, 2.0, epsilon = 1e-10);
        assert_relative_eq!(aabb.max.y, 1.0, epsilon = 1e-10);
        assert_relative_eq!(aabb.max.z, 2.0, epsilon = 1e-10);
        assert_relative_eq!(aabb.min.z, 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_find_triangles() {
        let field = HeightField::flat(11, 11, 1.0, 0.0).unwrap();
        let mut triangles = Vec::new();

        let query = Aabb::from_center(Point3::new(2.5, 2.5, 0.0), Vector3::new(0.4, 0.4, 0.4));
        field.find_triangles(&query, &mut triangles);
        assert_eq!(triangles.len(), 2);
        for tri in &triangles {
            let normal = (tri[1] - tri[0]).cross(&(tri[2] - tri[0]));
            assert!(normal.z > 0.0);
        }

        // Above the surface: nothing
        triangles.clear();
        let above = Aabb::from_center(Point3::new(2.5, 2.5, 3.0), Vector3::new(0.4, 0.4, 0.4));
        field.find_triangles(&above, &mut triangles);
        assert!(triangles.is_empty());

        // Outside the grid: nothing
        let outside = Aabb::from_center(Point3::new(-5.0, 2.5, 0.0), Vector3::new(0.4, 0.4, 0.4));
        field.find_triangles(&outside, &mut triangles);
        assert!(triangles.is_empty());
    }

    #[test]
    fn test_find_segment_triangles() {
        let field = HeightField::flat(11, 11, 1.0, 0.0).unwrap();
        let mut triangles = Vec::new();
        field.find_segment_triangles(
            &Point3::new(3.5, 3.5, 5.0),
            &Point3::new(3.5, 3.5, -5.0),
            &mut triangles,
        );
        assert!(!triangles.is_empty());
        assert!(triangles.len() <= 2);
    }
}
