//! Headless wgpu implementation of [`RenderBackend`].
//!
//! Renders into an offscreen color + depth target that can be read back and
//! saved as PNG. Template geometry is uploaded once per mesh id; transform and
//! indirect-argument buffers follow the driver's allocate / release calls.

use std::collections::HashMap;
use std::iter;
use std::path::Path;

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

use crate::config::Bounds;
use crate::driver::{DrawCall, RenderBackend};
use crate::gpu::pipeline::{create_clone_pipeline, DEPTH_FORMAT};
use crate::instance::{DrawArgs, InstanceTransform};
use crate::material::{Gradient, Material, Shading};
use crate::mesh_asset::MeshAsset;

const GRADIENT_SIZE: usize = 8;

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.02,
    g: 0.02,
    b: 0.03,
    a: 1.0,
};

/// Matches `Uniforms` in shader_clones.wgsl.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct Uniforms {
    view_proj: [[f32; 4]; 4],
    light_dir: [f32; 4],
    /// x: emission, y: lit flag
    params: [f32; 4],
    gradient: [[f32; 4]; GRADIENT_SIZE],
}

impl Uniforms {
    fn new(view_proj: Mat4, material: &Material, gradient: &Gradient) -> Self {
        let lit = match material.shading {
            Shading::Lit => 1.0,
            Shading::Unlit => 0.0,
        };
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            light_dir: [0.4, 0.8, 0.45, 0.0],
            params: [material.emission, lit, 0.0, 0.0],
            gradient: gradient.bake::<GRADIENT_SIZE>(),
        }
    }
}

/// Camera that frames the clone bounds from slightly above.
fn view_projection_for(bounds: &Bounds, aspect: f32) -> Mat4 {
    let radius = (bounds.size.length() * 0.5).max(0.01);
    let eye = bounds.center + Vec3::new(0.0, 0.35, 1.0).normalize() * radius * 2.2;
    let view = Mat4::look_at_rh(eye, bounds.center, Vec3::Y);
    let proj = Mat4::perspective_rh(45f32.to_radians(), aspect, radius * 0.01, radius * 10.0);
    proj * view
}

struct TemplateBuffers {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    num_indices: u32,
}

/// One allocation: transform storage plus the indirect draw record.
pub struct CloneBuffers {
    transforms: wgpu::Buffer,
    args: wgpu::Buffer,
    capacity: u32,
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    target: wgpu::Texture,
    target_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    size: wgpu::Extent3d,
    templates: HashMap<String, TemplateBuffers>,
}

impl WgpuBackend {
    pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

    /// Create a device with no surface and an offscreen target of the given size.
    pub fn new_headless(width: u32, height: u32) -> Result<Self> {
        pollster::block_on(Self::new_headless_async(width, height))
    }

    async fn new_headless_async(width: u32, height: u32) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None, // Headless
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow::anyhow!("No adapter found"))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default(), None)
            .await
            .context("Failed to create device")?;

        Ok(Self::new(device, queue, width, height))
    }

    pub fn new(device: wgpu::Device, queue: wgpu::Queue, width: u32, height: u32) -> Self {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Clone Uniform Buffer"),
            size: std::mem::size_of::<Uniforms>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Clone Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Clone Bind Group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Clone Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = create_clone_pipeline(&device, &pipeline_layout, Self::COLOR_FORMAT);

        let target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Clone Target Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());

        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Clone Depth Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            device,
            queue,
            pipeline,
            uniform_buffer,
            bind_group,
            target,
            target_view,
            depth_view,
            size,
            templates: HashMap::new(),
        }
    }

    /// Upload template geometry on first use. Cached by mesh id and index count.
    fn ensure_template(&mut self, template: &MeshAsset) -> String {
        let key = format!("{}#{}", template.id, template.index_count());
        if !self.templates.contains_key(&key) {
            let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("Template Vertex Buffer: {}", template.id)),
                contents: bytemuck::cast_slice(&template.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
            let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("Template Index Buffer: {}", template.id)),
                contents: bytemuck::cast_slice(&template.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
            log::debug!(
                "Uploaded template '{}' ({} vertices, {} indices)",
                template.id,
                template.vertices.len(),
                template.indices.len()
            );
            self.templates.insert(
                key.clone(),
                TemplateBuffers {
                    vertex_buffer,
                    index_buffer,
                    num_indices: template.index_count(),
                },
            );
        }
        key
    }

    /// Read the offscreen target back as tightly packed RGBA8 rows.
    pub fn read_frame(&self) -> Result<Vec<u8>> {
        let width = self.size.width;
        let height = self.size.height;

        let u32_size = std::mem::size_of::<u32>() as u32;
        let unpadded_bytes_per_row = u32_size * width;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row_padding = (align - unpadded_bytes_per_row % align) % align;
        let padded_bytes_per_row = unpadded_bytes_per_row + padded_bytes_per_row_padding;

        let output_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: (padded_bytes_per_row * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &output_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            self.size,
        );
        self.queue.submit(iter::once(encoder.finish()));

        let buffer_slice = output_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = tx.send(v);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .context("Readback callback was dropped")?
            .context("Failed to map readback buffer")?;

        let data = buffer_slice.get_mapped_range();
        let mut unpadded_data = Vec::with_capacity((unpadded_bytes_per_row * height) as usize);
        for row in 0..height {
            let start = (row * padded_bytes_per_row) as usize;
            let end = start + unpadded_bytes_per_row as usize;
            unpadded_data.extend_from_slice(&data[start..end]);
        }
        drop(data);
        output_buffer.unmap();

        Ok(unpadded_data)
    }

    /// Save the offscreen target as a PNG.
    pub fn save_frame(&self, path: &Path) -> Result<()> {
        let pixels = self.read_frame()?;
        image::save_buffer(
            path,
            &pixels,
            self.size.width,
            self.size.height,
            image::ColorType::Rgba8,
        )
        .with_context(|| format!("Failed to write frame {}", path.display()))
    }
}

impl RenderBackend for WgpuBackend {
    type Buffers = CloneBuffers;

    fn allocate(&mut self, instance_count: u32) -> Result<CloneBuffers> {
        let transform_size =
            instance_count as u64 * std::mem::size_of::<InstanceTransform>() as u64;
        let limit = self.device.limits().max_buffer_size;
        if transform_size > limit {
            anyhow::bail!(
                "{} instances need {} bytes, device limit is {}",
                instance_count,
                transform_size,
                limit
            );
        }

        let transforms = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Clone Transform Buffer"),
            size: transform_size,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let args = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Clone Draw Args Buffer"),
            size: std::mem::size_of::<DrawArgs>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(CloneBuffers {
            transforms,
            args,
            capacity: instance_count,
        })
    }

    fn release(&mut self, buffers: CloneBuffers) {
        buffers.transforms.destroy();
        buffers.args.destroy();
    }

    fn write_draw_args(&mut self, buffers: &mut CloneBuffers, args: &DrawArgs) {
        self.queue
            .write_buffer(&buffers.args, 0, bytemuck::bytes_of(args));
    }

    fn write_transforms(&mut self, buffers: &mut CloneBuffers, transforms: &[InstanceTransform]) {
        let count = transforms.len().min(buffers.capacity as usize);
        self.queue
            .write_buffer(&buffers.transforms, 0, bytemuck::cast_slice(&transforms[..count]));
    }

    fn submit(&mut self, draw: DrawCall<'_, CloneBuffers>) {
        let key = self.ensure_template(draw.template);
        let Some(template) = self.templates.get(&key) else {
            return;
        };
        if template.num_indices == 0 {
            return;
        }

        let aspect = self.size.width as f32 / self.size.height as f32;
        let uniforms = Uniforms::new(
            view_projection_for(draw.bounds, aspect),
            draw.material,
            draw.gradient,
        );
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Clone Encoder"),
        });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clone Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &self.bind_group, &[]);

            // Slot 0: Template vertices
            render_pass.set_vertex_buffer(0, template.vertex_buffer.slice(..));
            // Slot 1: Instance transforms
            render_pass.set_vertex_buffer(1, draw.buffers.transforms.slice(..));

            render_pass
                .set_index_buffer(template.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed_indirect(&draw.buffers.args, 0);
        }

        self.queue.submit(iter::once(encoder.finish()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_layout() {
        // mat4 + 2 vec4 + 8 vec4
        assert_eq!(std::mem::size_of::<Uniforms>(), 64 + 32 + 128);
        assert_eq!(std::mem::size_of::<Uniforms>() % 16, 0);
    }

    #[test]
    fn test_camera_sees_bounds_center() {
        let bounds = Bounds::new(Vec3::new(1.0, 2.0, 3.0), Vec3::splat(4.0));
        let clip = view_projection_for(&bounds, 16.0 / 9.0) * bounds.center.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(clip.w > 0.0);
        assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn test_uniforms_from_material() {
        let mut material = Material::new("flat", Shading::Unlit);
        material.emission = 2.0;
        let uniforms = Uniforms::new(Mat4::IDENTITY, &material, &Gradient::solid([0.5; 4]));
        assert_eq!(uniforms.params[0], 2.0);
        assert_eq!(uniforms.params[1], 0.0);
        assert_eq!(uniforms.gradient[3], [0.5; 4]);
    }
}
