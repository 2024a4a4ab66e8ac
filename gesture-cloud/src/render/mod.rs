//! Particle rendering
//!
//! Particles are drawn as instanced camera-facing quads with additive
//! blending, sized in world units and attenuated by distance, then faded
//! into the background with exponential-squared fog.

pub mod view;

pub use view::OrbitView;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::color::Rgb;
use crate::template::Point3;

/// Background and fog color
pub const BACKGROUND: Rgb = Rgb::new(0x07, 0x0c, 0x14);
pub const FOG_DENSITY: f32 = 0.042;
/// Quad size in world units at unit distance
pub const POINT_SIZE: f32 = 0.05;
pub const OPACITY: f32 = 0.95;

/// Vertices per particle quad (two triangles)
const QUAD_VERTICES: u32 = 6;

/// Per-instance particle data
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ParticleInstance {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

impl ParticleInstance {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<ParticleInstance>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Uniforms shared by every particle, matching `Uniforms` in particle.wgsl
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ParticleUniforms {
    pub proj: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
    pub fog_color: [f32; 4],
    /// x: point size, y: opacity, z: fog density, w: aspect
    pub params: [f32; 4],
}

impl ParticleUniforms {
    pub fn new(view: &OrbitView, model: Mat4) -> Self {
        let [r, g, b] = BACKGROUND.to_linear();
        Self {
            proj: view.projection_matrix().to_cols_array_2d(),
            view: view.view_matrix().to_cols_array_2d(),
            model: model.to_cols_array_2d(),
            fog_color: [r, g, b, 1.0],
            params: [POINT_SIZE, OPACITY, FOG_DENSITY, view.aspect()],
        }
    }
}

/// Clear color for the scene in linear space
pub fn clear_color() -> wgpu::Color {
    let [r, g, b] = BACKGROUND.to_linear();
    wgpu::Color {
        r: r as f64,
        g: g as f64,
        b: b as f64,
        a: 1.0,
    }
}

/// Interleave positions and colors into instance data
pub fn pack_instances(positions: &[Point3], colors: &[[f32; 3]], out: &mut Vec<ParticleInstance>) {
    out.clear();
    out.extend(
        positions
            .iter()
            .zip(colors)
            .map(|(position, color)| ParticleInstance {
                position: position.to_array(),
                color: *color,
            }),
    );
}

/// GPU resources for the particle cloud
pub struct ParticleRenderer {
    pipeline: wgpu::RenderPipeline,
    instance_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    /// Reused staging for instance packing
    instances: Vec<ParticleInstance>,
    capacity: usize,
    instance_count: u32,
}

impl ParticleRenderer {
    /// Create the pipeline and buffers for `capacity` particles
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat, capacity: usize) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Particle Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/particle.wgsl").into()),
        });

        let instance_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Instance Buffer"),
            size: (capacity.max(1) * std::mem::size_of::<ParticleInstance>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Uniform Buffer"),
            size: std::mem::size_of::<ParticleUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Particle Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Particle Bind Group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Particle Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        // Additive: src * alpha + dst, no depth writes
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Particle Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[ParticleInstance::layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState {
                        color: wgpu::BlendComponent {
                            src_factor: wgpu::BlendFactor::SrcAlpha,
                            dst_factor: wgpu::BlendFactor::One,
                            operation: wgpu::BlendOperation::Add,
                        },
                        alpha: wgpu::BlendComponent {
                            src_factor: wgpu::BlendFactor::Zero,
                            dst_factor: wgpu::BlendFactor::One,
                            operation: wgpu::BlendOperation::Add,
                        },
                    }),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            instance_buffer,
            uniform_buffer,
            bind_group,
            instances: Vec::with_capacity(capacity),
            capacity,
            instance_count: 0,
        }
    }

    /// Upload this frame's particles and uniforms
    pub fn upload(
        &mut self,
        queue: &wgpu::Queue,
        positions: &[Point3],
        colors: &[[f32; 3]],
        uniforms: &ParticleUniforms,
    ) {
        pack_instances(positions, colors, &mut self.instances);
        if self.instances.len() > self.capacity {
            log::warn!(
                "Dropping {} particles over renderer capacity {}",
                self.instances.len() - self.capacity,
                self.capacity
            );
            self.instances.truncate(self.capacity);
        }
        self.instance_count = self.instances.len() as u32;

        queue.write_buffer(&self.instance_buffer, 0, bytemuck::cast_slice(&self.instances));
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));
    }

    /// Record the particle pass, clearing `view` to the background first
    pub fn render(&self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Particle Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear_color()),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        if self.instance_count == 0 {
            return;
        }

        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &self.bind_group, &[]);
        render_pass.set_vertex_buffer(0, self.instance_buffer.slice(..));
        render_pass.draw(0..QUAD_VERTICES, 0..self.instance_count);
    }

    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_layout_sizes() {
        assert_eq!(std::mem::size_of::<ParticleInstance>(), 24);
        // 3 mat4 + 2 vec4, all 16-byte aligned for WGSL uniforms
        assert_eq!(std::mem::size_of::<ParticleUniforms>(), 224);
        assert_eq!(std::mem::size_of::<ParticleUniforms>() % 16, 0);
    }

    #[test]
    fn test_pack_instances() {
        let positions = [Point3::new(1.0, 2.0, 3.0), Point3::new(-1.0, 0.5, 0.0)];
        let colors = [[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]];
        let mut out = vec![ParticleInstance::default(); 7];

        pack_instances(&positions, &colors, &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].position, [-1.0, 0.5, 0.0]);
        assert_eq!(out[1].color, [0.4, 0.5, 0.6]);
    }

    #[test]
    fn test_uniforms_carry_rotation_and_fog() {
        let view = OrbitView::new(2.0);
        let model = Mat4::from_rotation_y(0.5);
        let uniforms = ParticleUniforms::new(&view, model);

        assert_eq!(uniforms.model, model.to_cols_array_2d());
        assert_eq!(uniforms.params, [POINT_SIZE, OPACITY, FOG_DENSITY, 2.0]);
        assert_eq!(uniforms.fog_color[3], 1.0);
        assert!(uniforms.fog_color[2] > uniforms.fog_color[0]);
    }
}
