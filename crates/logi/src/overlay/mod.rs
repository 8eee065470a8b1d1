//! 2D overlay renderers: text and UI image quads.
//!
//! Both consume the same shader cache and state-tracking discipline as the
//! 3D pipeline but draw straight onto the swapchain view in screen space,
//! after the assembly pass. They share the quad emission helpers and the
//! [`OverlayPipeline`] wrapper here.
//!
//! Screen space follows the original convention: origin at the bottom-left,
//! y up, units in pixels.

pub mod text;
pub mod ui;

use bytemuck::{Pod, Zeroable};

use crate::forward::mesh::MeshVertex;
use crate::shader::ShaderCache;

/// Uniforms for both overlay shaders: projection + tint color. 80 bytes.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub(crate) struct OverlayGpu {
    pub ortho: [[f32; 4]; 4],
    pub color: [f32; 4],
}

/// Pixel-space orthographic projection, origin bottom-left.
pub(crate) fn ortho_matrix(width: u32, height: u32) -> glam::Mat4 {
    glam::Mat4::orthographic_rh(0.0, width as f32, 0.0, height as f32, -1.0, 1.0)
}

/// Two CCW triangles covering a screen-space rectangle, UV v=0 at the top.
pub(crate) fn quad_vertices(
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    uv: [f32; 4], // u_min, v_min, u_max, v_max
) -> [MeshVertex; 6] {
    let [u0, v0, u1, v1] = uv;
    let vertex = |px: f32, py: f32, u: f32, v: f32| MeshVertex {
        position: [px, py, 0.0],
        normal: [0.0, 0.0, 1.0],
        uv: [u, v],
        tangent: [1.0, 0.0, 0.0],
    };
    [
        vertex(x, y + height, u0, v0),
        vertex(x, y, u0, v1),
        vertex(x + width, y, u1, v1),
        vertex(x, y + height, u0, v0),
        vertex(x + width, y, u1, v1),
        vertex(x + width, y + height, u1, v0),
    ]
}

/// Quad for an image of `width`×`height` pixels at (x, y), optionally
/// centered on that point.
pub(crate) fn image_quad(
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    centered: bool,
) -> [MeshVertex; 6] {
    let (x, y) = if centered {
        (x - width / 2.0, y - height / 2.0)
    } else {
        (x, y)
    };
    quad_vertices(x, y, width, height, [0.0, 0.0, 1.0, 1.0])
}

/// One overlay render pipeline (text or ui), rebuilt when its shader
/// hot-reloads. No depth attachment; straight alpha blending.
pub(crate) struct OverlayPipeline {
    pub uniform_layout: wgpu::BindGroupLayout,
    pub texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipeline: Option<wgpu::RenderPipeline>,
    generation: u64,
    shader_key: &'static str,
}

impl OverlayPipeline {
    pub fn new(device: &wgpu::Device, shader_key: &'static str) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("overlay uniform layout"),
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
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("overlay texture layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("overlay pipeline layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        Self {
            uniform_layout,
            texture_layout,
            pipeline_layout,
            pipeline: None,
            generation: 0,
            shader_key,
        }
    }

    /// The pipeline for the current shader generation, or `None` if the
    /// shader never compiled.
    pub fn ensure(
        &mut self,
        device: &wgpu::Device,
        shaders: &ShaderCache,
        format: wgpu::TextureFormat,
    ) -> Option<&wgpu::RenderPipeline> {
        let program = shaders.get(self.shader_key)?;
        if self.pipeline.is_none() || self.generation != program.generation() {
            let module = program.module()?;
            self.pipeline = Some(device.create_render_pipeline(
                &wgpu::RenderPipelineDescriptor {
                    label: Some(self.shader_key),
                    layout: Some(&self.pipeline_layout),
                    vertex: wgpu::VertexState {
                        module,
                        entry_point: Some("vs_main"),
                        buffers: &[MeshVertex::LAYOUT],
                        compilation_options: Default::default(),
                    },
                    fragment: Some(wgpu::FragmentState {
                        module,
                        entry_point: Some("fs_main"),
                        targets: &[Some(wgpu::ColorTargetState {
                            format,
                            blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                        compilation_options: Default::default(),
                    }),
                    primitive: wgpu::PrimitiveState {
                        topology: wgpu::PrimitiveTopology::TriangleList,
                        strip_index_format: None,
                        front_face: wgpu::FrontFace::Ccw,
                        cull_mode: None,
                        polygon_mode: wgpu::PolygonMode::Fill,
                        unclipped_depth: false,
                        conservative: false,
                    },
                    depth_stencil: None,
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                    cache: None,
                },
            ));
            self.generation = program.generation();
        }
        self.pipeline.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_uniform_size_matches_wgsl() {
        assert_eq!(std::mem::size_of::<OverlayGpu>(), 80);
    }

    #[test]
    fn image_quad_centers_on_request() {
        let quad = image_quad(100.0, 100.0, 40.0, 20.0, true);
        // Bottom-left corner of the rectangle.
        assert_eq!(quad[1].position, [80.0, 90.0, 0.0]);
        // Top-right corner.
        assert_eq!(quad[5].position, [120.0, 110.0, 0.0]);
    }

    #[test]
    fn image_quad_anchors_bottom_left_by_default() {
        let quad = image_quad(10.0, 20.0, 40.0, 20.0, false);
        assert_eq!(quad[1].position, [10.0, 20.0, 0.0]);
        assert_eq!(quad[5].position, [50.0, 40.0, 0.0]);
    }

    #[test]
    fn quad_uv_v_is_zero_at_top() {
        let quad = quad_vertices(0.0, 0.0, 1.0, 1.0, [0.0, 0.0, 1.0, 1.0]);
        // Top-left vertex samples v=0, bottom-left samples v=1.
        assert_eq!(quad[0].uv, [0.0, 0.0]);
        assert_eq!(quad[1].uv, [0.0, 1.0]);
    }
}
