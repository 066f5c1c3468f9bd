// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Mesh representations: triangulated input surfaces and tetrahedral output meshes

use super::BoundingBox;
use crate::domain::{SubdomainId, SurfacePatchId};
use crate::error::{MeshError, MeshResult};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};

/// Triangle surface with shared vertices
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurfaceMesh {
    pub vertices: Vec<Point3<f64>>,
    pub faces: Vec<[usize; 3]>,
}

impl SurfaceMesh {
    pub fn new(vertices: Vec<Point3<f64>>, faces: Vec<[usize; 3]>) -> Self {
        Self { vertices, faces }
    }

    /// Build from flat `[x, y, z, ...]` and `[i, j, k, ...]` buffers
    pub fn from_buffers(vertices: &[f64], faces: &[u32]) -> MeshResult<Self> {
        if vertices.len() % 3 != 0 {
            return Err(MeshError::domain(format!(
                "vertex buffer length {} is not a multiple of 3",
                vertices.len()
            )));
        }
        if faces.len() % 3 != 0 {
            return Err(MeshError::domain(format!(
                "face buffer length {} is not a multiple of 3",
                faces.len()
            )));
        }
        if vertices.iter().any(|c| !c.is_finite()) {
            return Err(MeshError::degenerate("vertex buffer contains non-finite coordinates"));
        }
        let points = vertices.chunks_exact(3).map(|c| Point3::new(c[0], c[1], c[2])).collect();
        let triangles = faces
            .chunks_exact(3)
            .map(|f| [f[0] as usize, f[1] as usize, f[2] as usize])
            .collect();
        let mesh = Self::new(points, triangles);
        mesh.check_indices()?;
        Ok(mesh)
    }

    /// Fail when a face references a vertex that does not exist
    pub fn check_indices(&self) -> MeshResult<()> {
        let n = self.vertices.len();
        for (i, face) in self.faces.iter().enumerate() {
            if let Some(&bad) = face.iter().find(|&&v| v >= n) {
                return Err(MeshError::domain(format!(
                    "face {} references vertex {} but only {} vertices exist",
                    i, bad, n
                )));
            }
        }
        Ok(())
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn triangle(&self, face: usize) -> [Point3<f64>; 3] {
        self.faces[face].map(|v| self.vertices[v])
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(&self.vertices)
    }

    /// Enclosed volume; negative when faces wind inward
    pub fn signed_volume(&self) -> f64 {
        self.faces
            .iter()
            .map(|f| {
                let [a, b, c] = f.map(|v| self.vertices[v].coords);
                a.dot(&b.cross(&c))
            })
            .sum::<f64>()
            / 6.0
    }

    /// Flip every face's winding
    pub fn reverse_orientation(&mut self) {
        for face in &mut self.faces {
            face.swap(1, 2);
        }
    }

    /// Append another mesh (no welding)
    pub fn merge(&mut self, other: &SurfaceMesh) {
        let offset = self.vertices.len();
        self.vertices.extend_from_slice(&other.vertices);
        self.faces
            .extend(other.faces.iter().map(|f| f.map(|v| v + offset)));
    }

    /// Merge vertices with bit-identical coordinates
    ///
    /// Returns the number of vertices removed.
    pub fn weld_vertices(&mut self) -> usize {
        let original_count = self.vertices.len();
        let mut unique: HashMap<[u64; 3], usize> = HashMap::new();
        let mut new_vertices = Vec::new();
        let mut new_indices = Vec::with_capacity(original_count);

        for p in &self.vertices {
            // -0.0 and 0.0 are the same position
            let key = [p.x + 0.0, p.y + 0.0, p.z + 0.0].map(f64::to_bits);
            let index = *unique.entry(key).or_insert_with(|| {
                new_vertices.push(*p);
                new_vertices.len() - 1
            });
            new_indices.push(index);
        }

        for face in &mut self.faces {
            *face = face.map(|v| new_indices[v]);
        }
        self.vertices = new_vertices;
        original_count - self.vertices.len()
    }
}

/// Tetrahedron of the output mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TetCell {
    pub vertices: [usize; 4],
    pub label: SubdomainId,
}

/// Boundary triangle of the output mesh
///
/// Vertices are ordered so the right-hand normal points from the patch's
/// `inside` subdomain toward its `outside` subdomain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryFacet {
    pub vertices: [usize; 3],
    pub patch: SurfacePatchId,
}

/// Labeled tetrahedral mesh with its boundary facets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TetMesh {
    pub vertices: Vec<Point3<f64>>,
    pub cells: Vec<TetCell>,
    pub facets: Vec<BoundaryFacet>,
}

impl TetMesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn facet_count(&self) -> usize {
        self.facets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn tet(&self, cell: usize) -> [Point3<f64>; 4] {
        self.cells[cell].vertices.map(|v| self.vertices[v])
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(&self.vertices)
    }

    /// Distinct cell labels in ascending order
    pub fn subdomains(&self) -> Vec<SubdomainId> {
        self.cells
            .iter()
            .map(|c| c.label)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct `(inside, outside)` label pairs of the boundary facets
    pub fn patch_labels(&self) -> BTreeSet<(SubdomainId, SubdomainId)> {
        self.facets.iter().map(|f| f.patch.labels()).collect()
    }

    /// Boundary facets as a surface mesh sharing this mesh's vertex array
    pub fn boundary_surface(&self) -> SurfaceMesh {
        SurfaceMesh::new(self.vertices.clone(), self.facets.iter().map(|f| f.vertices).collect())
    }

    /// SHA-256 digest over vertex coordinates, cells and facets
    ///
    /// Two meshes with the same digest have bit-identical content.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update((self.vertices.len() as u64).to_le_bytes());
        for p in &self.vertices {
            for c in p.coords.iter() {
                hasher.update(c.to_bits().to_le_bytes());
            }
        }
        hasher.update((self.cells.len() as u64).to_le_bytes());
        for cell in &self.cells {
            for v in cell.vertices {
                hasher.update((v as u64).to_le_bytes());
            }
            hasher.update(cell.label.to_le_bytes());
        }
        hasher.update((self.facets.len() as u64).to_le_bytes());
        for facet in &self.facets {
            for v in facet.vertices {
                hasher.update((v as u64).to_le_bytes());
            }
            hasher.update(facet.patch.inside.to_le_bytes());
            hasher.update(facet.patch.outside.to_le_bytes());
            let surface = facet.patch.surface.map_or(u64::MAX, |s| s as u64);
            hasher.update(surface.to_le_bytes());
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Primitive;

    #[test]
    fn test_from_buffers() {
        let mesh = SurfaceMesh::from_buffers(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0], &[0, 1, 2]).unwrap();
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.faces, vec![[0, 1, 2]]);

        assert!(SurfaceMesh::from_buffers(&[0.0, 0.0], &[]).is_err());
        assert!(matches!(
            SurfaceMesh::from_buffers(&[0.0; 9], &[0, 1, 3]),
            Err(MeshError::DomainInconsistency(_))
        ));
    }

    #[test]
    fn test_signed_volume_and_reverse() {
        let mut cube = Primitive::cube(2.0).to_mesh();
        assert!((cube.signed_volume() - 8.0).abs() < 1e-12);
        cube.reverse_orientation();
        assert!((cube.signed_volume() + 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_weld_vertices() {
        let mut mesh = SurfaceMesh::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(-0.0, 1.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [3, 5, 4]],
        );
        assert_eq!(mesh.weld_vertices(), 2);
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.faces, vec![[0, 1, 2], [1, 3, 2]]);
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let mesh = TetMesh {
            vertices: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, 0.0, 1.0),
            ],
            cells: vec![TetCell {
                vertices: [0, 1, 2, 3],
                label: 1,
            }],
            facets: vec![BoundaryFacet {
                vertices: [0, 2, 1],
                patch: SurfacePatchId::new(1, 0),
            }],
        };
        let same = mesh.clone();
        assert_eq!(mesh.fingerprint(), same.fingerprint());
        assert_eq!(mesh.fingerprint().len(), 64);

        let mut relabeled = mesh.clone();
        relabeled.cells[0].label = 2;
        assert_ne!(mesh.fingerprint(), relabeled.fingerprint());
        assert_eq!(mesh.subdomains(), vec![1]);
        assert_eq!(mesh.patch_labels().into_iter().collect::<Vec<_>>(), vec![(1, 0)]);
    }
}
