//! Point sources that clone instances are anchored to.

use glam::Vec3;

use crate::instance::MAX_POINT_COUNT;
use crate::mesh_asset::MeshAsset;

/// Read-only provider of sample points.
///
/// All three arrays have exactly `point_count()` entries and never change for
/// the lifetime of the provider. Implementations must be shareable across the
/// generator's worker threads.
pub trait PointSource: Send + Sync {
    fn point_count(&self) -> u32;
    fn positions(&self) -> &[Vec3];
    fn normals(&self) -> &[Vec3];
    fn tangents(&self) -> &[Vec3];
}

/// An owned, immutable set of sample points.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    tangents: Vec<Vec3>,
}

impl PointCloud {
    /// Build a point cloud from parallel arrays.
    pub fn new(
        positions: Vec<Vec3>,
        normals: Vec<Vec3>,
        tangents: Vec<Vec3>,
    ) -> Result<Self, String> {
        if positions.len() != normals.len() || positions.len() != tangents.len() {
            return Err(format!(
                "Point arrays differ in length: {} positions, {} normals, {} tangents",
                positions.len(),
                normals.len(),
                tangents.len()
            ));
        }
        if positions.len() > MAX_POINT_COUNT as usize {
            return Err(format!("Too many points: {}", positions.len()));
        }
        Ok(Self {
            positions,
            normals,
            tangents,
        })
    }

    /// One sample point per mesh vertex. Tangents are derived from the normals.
    pub fn from_mesh_asset(asset: &MeshAsset) -> Self {
        let positions: Vec<Vec3> = asset
            .vertices
            .iter()
            .map(|v| Vec3::from(v.position))
            .collect();
        let normals: Vec<Vec3> = asset
            .vertices
            .iter()
            .map(|v| Vec3::from(v.normal).try_normalize().unwrap_or(Vec3::Y))
            .collect();
        let tangents = normals.iter().map(|n| tangent_for(*n)).collect();

        Self {
            positions,
            normals,
            tangents,
        }
    }

    /// Points on a UV sphere, for demos and tests.
    pub fn sphere(lat_segments: u32, lon_segments: u32, radius: f32) -> Self {
        Self::from_mesh_asset(&MeshAsset::sphere(lat_segments, lon_segments, radius))
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

impl PointSource for PointCloud {
    fn point_count(&self) -> u32 {
        self.positions.len() as u32
    }

    fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    fn tangents(&self) -> &[Vec3] {
        &self.tangents
    }
}

/// A unit vector perpendicular to `normal`.
///
/// Runs around the world Y axis where possible so neighbouring points get
/// consistent tangents; falls back to the X axis near the poles.
pub fn tangent_for(normal: Vec3) -> Vec3 {
    let reference = if normal.y.abs() < 0.999 { Vec3::Y } else { Vec3::X };
    reference
        .cross(normal)
        .try_normalize()
        .unwrap_or(Vec3::Z)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_mismatched_arrays() {
        let result = PointCloud::new(vec![Vec3::ZERO; 3], vec![Vec3::Y; 3], vec![Vec3::X; 2]);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_mesh_asset_matches_vertices() {
        let asset = MeshAsset::cube();
        let cloud = PointCloud::from_mesh_asset(&asset);

        assert_eq!(cloud.point_count() as usize, asset.vertices.len());
        assert_eq!(cloud.positions().len(), cloud.normals().len());
        assert_eq!(cloud.positions().len(), cloud.tangents().len());
    }

    #[test]
    fn test_tangents_are_perpendicular_unit_vectors() {
        let cloud = PointCloud::sphere(6, 12, 1.0);
        for (n, t) in cloud.normals().iter().zip(cloud.tangents()) {
            assert!((t.length() - 1.0).abs() < 1e-4);
            assert!(n.dot(*t).abs() < 1e-4);
        }
    }

    #[test]
    fn test_tangent_at_pole() {
        let t = tangent_for(Vec3::Y);
        assert!((t.length() - 1.0).abs() < 1e-5);
        assert!(t.dot(Vec3::Y).abs() < 1e-5);
    }
}
