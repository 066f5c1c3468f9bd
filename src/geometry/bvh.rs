// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Bounding Volume Hierarchy (BVH) for spatial acceleration
//! Used to accelerate triangle-triangle and segment-triangle queries

use super::BoundingBox;
use nalgebra::Point3;

const MAX_DEPTH: usize = 32;
const MAX_LEAF_SIZE: usize = 4;

/// BVH node
#[derive(Debug, Clone)]
pub struct BVHNode {
    /// Bounding box of this node
    pub bbox: BoundingBox,
    /// Left child (None for leaf)
    pub left: Option<Box<BVHNode>>,
    /// Right child (None for leaf)
    pub right: Option<Box<BVHNode>>,
    /// Primitive indices with their boxes (only for leaf nodes)
    pub primitives: Vec<(usize, BoundingBox)>,
}

impl BVHNode {
    fn leaf(bbox: BoundingBox, primitives: Vec<(usize, BoundingBox)>) -> Self {
        Self {
            bbox,
            left: None,
            right: None,
            primitives,
        }
    }

    fn internal(bbox: BoundingBox, left: Box<BVHNode>, right: Box<BVHNode>) -> Self {
        Self {
            bbox,
            left: Some(left),
            right: Some(right),
            primitives: Vec::new(),
        }
    }

    /// Check if this is a leaf node
    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Bounding Volume Hierarchy over indexed primitives
#[derive(Debug, Clone)]
pub struct BVH {
    root: BVHNode,
    len: usize,
}

impl BVH {
    /// Build BVH from (primitive index, bbox) pairs
    pub fn build(primitives: Vec<(usize, BoundingBox)>) -> Self {
        let len = primitives.len();
        if primitives.is_empty() {
            return Self {
                root: BVHNode::leaf(BoundingBox::empty(), Vec::new()),
                len,
            };
        }

        let root = Self::build_recursive(primitives, 0);
        Self { root, len }
    }

    /// Build a BVH over the triangles of an indexed face buffer
    pub fn from_triangles(vertices: &[Point3<f64>], faces: &[[usize; 3]]) -> Self {
        let primitives = faces
            .iter()
            .enumerate()
            .map(|(idx, face)| {
                let bbox = BoundingBox::from_points(face.iter().map(|&v| &vertices[v]));
                (idx, bbox)
            })
            .collect();
        Self::build(primitives)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.root.bbox
    }

    fn build_recursive(mut primitives: Vec<(usize, BoundingBox)>, depth: usize) -> BVHNode {
        if primitives.len() <= MAX_LEAF_SIZE || depth >= MAX_DEPTH {
            let bbox = Self::compute_union_bbox(&primitives);
            return BVHNode::leaf(bbox, primitives);
        }

        let split_axis = Self::find_best_split_axis(&primitives);

        // Index breaks ties so the tree shape never depends on sort stability.
        primitives.sort_by(|(idx_a, bbox_a), (idx_b, bbox_b)| {
            let center_a = bbox_a.center()[split_axis];
            let center_b = bbox_b.center()[split_axis];
            center_a.total_cmp(&center_b).then(idx_a.cmp(idx_b))
        });

        let right_primitives = primitives.split_off(primitives.len() / 2);
        let left = Box::new(Self::build_recursive(primitives, depth + 1));
        let right = Box::new(Self::build_recursive(right_primitives, depth + 1));
        let bbox = left.bbox.union(&right.bbox);

        BVHNode::internal(bbox, left, right)
    }

    /// Find best split axis (longest axis of the centroid spread)
    fn find_best_split_axis(primitives: &[(usize, BoundingBox)]) -> usize {
        let centers = BoundingBox::from_points(primitives.iter().map(|(_, b)| b.center()).collect::<Vec<_>>().iter());
        let size = centers.size();

        if size.x >= size.y && size.x >= size.z {
            0
        } else if size.y >= size.z {
            1
        } else {
            2
        }
    }

    fn compute_union_bbox(primitives: &[(usize, BoundingBox)]) -> BoundingBox {
        primitives
            .iter()
            .fold(BoundingBox::empty(), |acc, (_, bbox)| acc.union(bbox))
    }

    /// Query primitives whose boxes overlap the given bounding box
    pub fn query(&self, bbox: &BoundingBox) -> Vec<usize> {
        let mut result = Vec::new();
        if self.len > 0 {
            Self::query_recursive(&self.root, bbox, &mut result);
        }
        result
    }

    fn query_recursive(node: &BVHNode, bbox: &BoundingBox, result: &mut Vec<usize>) {
        if !node.bbox.intersects(bbox) {
            return;
        }

        if node.is_leaf() {
            result.extend(
                node.primitives
                    .iter()
                    .filter(|(_, b)| b.intersects(bbox))
                    .map(|(idx, _)| *idx),
            );
        } else {
            if let Some(ref left) = node.left {
                Self::query_recursive(left, bbox, result);
            }
            if let Some(ref right) = node.right {
                Self::query_recursive(right, bbox, result);
            }
        }
    }

    /// Query primitives whose boxes are crossed by segment `a`-`b`
    pub fn query_segment(&self, a: &Point3<f64>, b: &Point3<f64>) -> Vec<usize> {
        let mut result = Vec::new();
        if self.len > 0 {
            Self::query_segment_recursive(&self.root, a, b, &mut result);
        }
        result
    }

    fn query_segment_recursive(node: &BVHNode, a: &Point3<f64>, b: &Point3<f64>, result: &mut Vec<usize>) {
        if !Self::segment_crosses(&node.bbox, a, b) {
            return;
        }

        if node.is_leaf() {
            result.extend(
                node.primitives
                    .iter()
                    .filter(|(_, bbox)| Self::segment_crosses(bbox, a, b))
                    .map(|(idx, _)| *idx),
            );
        } else {
            if let Some(ref left) = node.left {
                Self::query_segment_recursive(left, a, b, result);
            }
            if let Some(ref right) = node.right {
                Self::query_segment_recursive(right, a, b, result);
            }
        }
    }

    /// Inflate slightly so segments grazing a flat box are not lost to rounding.
    fn segment_crosses(bbox: &BoundingBox, a: &Point3<f64>, b: &Point3<f64>) -> bool {
        let tolerance = 1e-9 * (bbox.diagonal() + 1.0);
        bbox.inflated(tolerance).clip_segment(a, b).is_some()
    }

    /// Get root node (for testing)
    #[cfg(test)]
    pub fn root(&self) -> &BVHNode {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_triangles(n: usize) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
        let mut vertices = Vec::new();
        let mut faces = Vec::new();
        for i in 0..n {
            let x = i as f64 * 2.0;
            let base = vertices.len();
            vertices.push(Point3::new(x, 0.0, 0.0));
            vertices.push(Point3::new(x + 1.0, 0.0, 0.0));
            vertices.push(Point3::new(x, 1.0, 0.0));
            faces.push([base, base + 1, base + 2]);
        }
        (vertices, faces)
    }

    #[test]
    fn test_bvh_build() {
        let (vertices, faces) = grid_triangles(20);
        let bvh = BVH::from_triangles(&vertices, &faces);
        assert_eq!(bvh.len(), 20);
        assert!(!bvh.root().is_leaf());
    }

    #[test]
    fn test_bvh_query() {
        let (vertices, faces) = grid_triangles(20);
        let bvh = BVH::from_triangles(&vertices, &faces);

        let all = bvh.query(&bvh.bounding_box());
        assert_eq!(all.len(), 20);

        let window = BoundingBox::new(Point3::new(4.1, 0.1, -0.1), Point3::new(4.2, 0.2, 0.1));
        assert_eq!(bvh.query(&window), vec![2]);
    }

    #[test]
    fn test_bvh_segment_query() {
        let (vertices, faces) = grid_triangles(20);
        let bvh = BVH::from_triangles(&vertices, &faces);

        let hits = bvh.query_segment(&Point3::new(6.25, 0.25, -1.0), &Point3::new(6.25, 0.25, 1.0));
        assert_eq!(hits, vec![3]);

        let none = bvh.query_segment(&Point3::new(6.25, 5.0, -1.0), &Point3::new(6.25, 5.0, 1.0));
        assert!(none.is_empty());
    }

    #[test]
    fn test_leaf_neighbours_are_filtered() {
        // Triangles 2, 3 and 4 share a leaf; only the one under the box or segment is reported
        let (vertices, faces) = grid_triangles(5);
        let bvh = BVH::from_triangles(&vertices, &faces);
        assert!(!bvh.root().is_leaf());

        let window = BoundingBox::new(Point3::new(8.1, 0.1, -0.1), Point3::new(8.2, 0.2, 0.1));
        assert_eq!(bvh.query(&window), vec![4]);
        let hits = bvh.query_segment(&Point3::new(4.5, 0.25, -1.0), &Point3::new(4.5, 0.25, 1.0));
        assert_eq!(hits, vec![2]);
    }

    #[test]
    fn test_empty_bvh() {
        let bvh = BVH::build(Vec::new());
        assert!(bvh.is_empty());
        assert!(bvh.query(&BoundingBox::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0))).is_empty());
    }
}
