//! GPU-facing instance data: batch sizing, packed transforms and indirect draw
//! arguments.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use serde::Serialize;

/// Parallel batch width. Instance counts are always a multiple of this.
pub const BATCH_WIDTH: u32 = 64;

/// Largest point count whose padded instance count still fits in a `u32`.
pub const MAX_POINT_COUNT: u32 = u32::MAX - (BATCH_WIDTH - 1);

/// Sizing of one generation dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceBatch {
    /// Number of source points the batch was sized for.
    pub point_count: u32,
    /// Number of `BATCH_WIDTH`-wide groups.
    pub group_count: u32,
}

impl InstanceBatch {
    /// Round `point_count` up to whole batches. Always at least one batch.
    /// Counts above [`MAX_POINT_COUNT`] are capped.
    pub fn for_point_count(point_count: u32) -> Self {
        let point_count = point_count.min(MAX_POINT_COUNT);
        let group_count = point_count.div_ceil(BATCH_WIDTH).max(1);
        Self {
            point_count,
            group_count,
        }
    }

    /// Total instances drawn, including padding.
    pub fn instance_count(&self) -> u32 {
        self.group_count * BATCH_WIDTH
    }

    /// Instances past the last real point.
    pub fn padding(&self) -> u32 {
        self.instance_count() - self.point_count
    }
}

/// One instance transform as a 4x3 row-major matrix.
///
/// Row `r` holds `(right[r], up[r], forward[r], translation[r])`, so a local
/// position `p` maps to world space as `dot(row_r, (p, 1))`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize)]
pub struct InstanceTransform {
    pub rows: [[f32; 4]; 3],
}

impl InstanceTransform {
    /// Pack a basis and translation. The axes are expected to carry the scale.
    pub fn from_axes(right: Vec3, up: Vec3, forward: Vec3, translation: Vec3) -> Self {
        Self {
            rows: [
                [right.x, up.x, forward.x, translation.x],
                [right.y, up.y, forward.y, translation.y],
                [right.z, up.z, forward.z, translation.z],
            ],
        }
    }

    pub fn translation(&self) -> Vec3 {
        Vec3::new(self.rows[0][3], self.rows[1][3], self.rows[2][3])
    }

    /// Basis column `axis` (0 = right, 1 = up, 2 = forward).
    pub fn axis(&self, axis: usize) -> Vec3 {
        Vec3::new(self.rows[0][axis], self.rows[1][axis], self.rows[2][axis])
    }

    /// Uniform scale baked into the basis.
    pub fn scale(&self) -> f32 {
        self.axis(1).length()
    }

    /// Apply the transform to a local-space point.
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        let h = p.extend(1.0);
        Vec3::new(
            Vec4::from(self.rows[0]).dot(h),
            Vec4::from(self.rows[1]).dot(h),
            Vec4::from(self.rows[2]).dot(h),
        )
    }

    /// Returns the vertex buffer layout for instanced rendering.
    /// Bound as the second vertex buffer (slot 1) with `VertexStepMode::Instance`.
    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<InstanceTransform>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                // row0: vec4<f32>
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 2, // After mesh vertex attributes (0, 1)
                    format: wgpu::VertexFormat::Float32x4,
                },
                // row1: vec4<f32>
                wgpu::VertexAttribute {
                    offset: 16,
                    shader_location: 3,
                    format: wgpu::VertexFormat::Float32x4,
                },
                // row2: vec4<f32>
                wgpu::VertexAttribute {
                    offset: 32,
                    shader_location: 4,
                    format: wgpu::VertexFormat::Float32x4,
                },
            ],
        }
    }
}

/// Arguments for one indexed indirect draw.
///
/// Field order matches the layout `draw_indexed_indirect` reads from the
/// indirect buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawArgs {
    pub index_count_per_instance: u32,
    pub instance_count: u32,
    pub start_index_location: u32,
    pub base_vertex_location: i32,
    pub start_instance_location: u32,
}

impl DrawArgs {
    pub fn new(index_count_per_instance: u32, instance_count: u32) -> Self {
        Self {
            index_count_per_instance,
            instance_count,
            start_index_location: 0,
            base_vertex_location: 0,
            start_instance_location: 0,
        }
    }
}
