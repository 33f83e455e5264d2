//! Mesh asset loading.
//!
//! Meshes serve two roles: as the template that every clone instance draws, and
//! as the surface a point cloud is sampled from (see [`crate::point_cloud`]).
//!
//! ## Normal Handling
//!
//! OBJ meshes use provided normals when available. Normals are generated only
//! when missing, using area-weighted averaging of adjacent face normals.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use glam::Vec3;

use crate::gpu::mesh::{create_cube_geometry, create_sphere_geometry, Vertex};

/// Axis-aligned bounding box for a mesh.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    /// Compute bounding box from a set of vertices.
    pub fn from_vertices(vertices: &[Vertex]) -> Self {
        if vertices.is_empty() {
            return Self::default();
        }

        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for v in vertices {
            let p = Vec3::from(v.position);
            min = min.min(p);
            max = max.max(p);
        }

        Self { min, max }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }
}

/// A loaded mesh with geometry ready for upload.
#[derive(Debug, Clone)]
pub struct MeshAsset {
    /// Identifier used in logs and GPU labels.
    pub id: String,
    pub vertices: Vec<Vertex>,
    /// Triangle list indices.
    pub indices: Vec<u32>,
    pub bounds: BoundingBox,
}

impl MeshAsset {
    pub fn new(id: String, vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        let bounds = BoundingBox::from_vertices(&vertices);
        Self {
            id,
            vertices,
            indices,
            bounds,
        }
    }

    /// Built-in unit cube.
    pub fn cube() -> Self {
        let (vertices, indices) = create_cube_geometry();
        Self::new("cube".to_string(), vertices, indices)
    }

    /// Built-in UV sphere of the given radius.
    pub fn sphere(lat_segments: u32, lon_segments: u32, radius: f32) -> Self {
        let (vertices, indices) = create_sphere_geometry(lat_segments, lon_segments, radius);
        Self::new("sphere".to_string(), vertices, indices)
    }

    /// Read and parse an OBJ file. The asset id is the file stem.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read mesh file {:?}", path))?;
        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mesh".to_string());
        Self::from_obj(id, &contents)
            .map_err(|e| anyhow::anyhow!(e))
            .with_context(|| format!("Failed to load mesh {:?}", path))
    }

    /// Parse a mesh asset from OBJ format content.
    ///
    /// Vertex positions and faces are required. Normals are used when present;
    /// otherwise they are computed using area-weighted averaging.
    pub fn from_obj(id: String, obj_content: &str) -> Result<Self, String> {
        let mut cursor = std::io::Cursor::new(obj_content.as_bytes());

        let load_options = tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        };

        let (models, _materials) = tobj::load_obj_buf(&mut cursor, &load_options, |_| {
            Ok((vec![], HashMap::new()))
        })
        .map_err(|e| format!("Failed to parse OBJ: {}", e))?;

        if models.is_empty() {
            return Err("OBJ file contains no models".to_string());
        }

        // Combine all models into a single mesh
        let mut positions: Vec<Vec3> = Vec::new();
        let mut provided_normals: Vec<Vec3> = Vec::new();
        let mut indices: Vec<u32> = Vec::new();
        let mut has_normals = true;

        for model in &models {
            let mesh = &model.mesh;
            if mesh.positions.is_empty() {
                continue;
            }

            let vertex_offset = positions.len() as u32;
            let model_has_normals = mesh.normals.len() == mesh.positions.len();
            has_normals &= model_has_normals;

            positions.extend(mesh.positions.chunks_exact(3).map(Vec3::from_slice));
            if model_has_normals {
                provided_normals.extend(mesh.normals.chunks_exact(3).map(Vec3::from_slice));
            }
            indices.extend(mesh.indices.iter().map(|idx| vertex_offset + idx));
        }

        if positions.is_empty() {
            return Err("OBJ file contains no vertices".to_string());
        }

        let normals = if has_normals && provided_normals.len() == positions.len() {
            provided_normals
        } else {
            compute_vertex_normals(&positions, &indices)
        };

        let vertices = positions
            .iter()
            .zip(normals.iter())
            .map(|(p, n)| {
                let n = n.try_normalize().unwrap_or(Vec3::Y);
                Vertex::new(p.to_array(), n.to_array())
            })
            .collect();

        Ok(Self::new(id, vertices, indices))
    }

    /// Indices consumed by one instance of this mesh.
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Compute area-weighted vertex normals from face normals.
///
/// The unnormalized face normal has magnitude twice the triangle area, so
/// summing them weights larger faces proportionally.
fn compute_vertex_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];

    for tri in indices.chunks_exact(3) {
        let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        if i0 >= positions.len() || i1 >= positions.len() || i2 >= positions.len() {
            continue;
        }

        let face_normal = (positions[i1] - positions[i0]).cross(positions[i2] - positions[i0]);
        normals[i0] += face_normal;
        normals[i1] += face_normal;
        normals[i2] += face_normal;
    }

    // Degenerate or unreferenced vertices fall back to Y-up
    normals
        .into_iter()
        .map(|n| n.try_normalize().unwrap_or(Vec3::Y))
        .collect()
}
