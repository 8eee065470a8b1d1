//! UI overlay: screen-space image quads with a path-keyed texture cache.
//!
//! Images load on first use and stay cached for the renderer's lifetime;
//! a failed load is cached too, so a bad path logs once instead of hitting
//! the filesystem every frame.

use std::collections::HashMap;

use super::{image_quad, ortho_matrix, OverlayGpu, OverlayPipeline};
use crate::forward::mesh::GeometryBuffer;
use crate::forward::texture::Texture;
use crate::render::gpu::GpuContext;
use crate::shader::ShaderCache;

struct CachedImage {
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

/// Renders UI image quads. Owned by the
/// [`Renderer`](crate::forward::Renderer); call through
/// [`Renderer::render_ui`](crate::forward::Renderer::render_ui).
pub struct UiRenderer {
    pipeline: OverlayPipeline,
    sampler: wgpu::Sampler,
    // None records a failed load so it is not retried.
    cache: HashMap<String, Option<CachedImage>>,
    quad_buffer: GeometryBuffer,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
}

impl UiRenderer {
    pub fn new(gpu: &GpuContext) -> Self {
        let device = &gpu.device;
        let pipeline = OverlayPipeline::new(device, "ui");

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ui overlay uniforms"),
            size: std::mem::size_of::<OverlayGpu>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ui overlay uniform bind group"),
            layout: &pipeline.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("ui sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let quad_buffer = GeometryBuffer::dynamic(device, "ui quad", 6);

        Self {
            pipeline,
            sampler,
            cache: HashMap::new(),
            quad_buffer,
            uniform_buffer,
            uniform_bind_group,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn render_ui(
        &mut self,
        gpu: &GpuContext,
        shaders: &ShaderCache,
        target: &wgpu::TextureView,
        screen: (u32, u32),
        image_path: &str,
        pos_x: f32,
        pos_y: f32,
        scale: f32,
        centered: bool,
    ) {
        if !self.cache.contains_key(image_path) {
            let entry = match Texture::from_path(&gpu.device, &gpu.queue, image_path) {
                Ok(texture) => Some(CachedImage {
                    bind_group: gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some(image_path),
                        layout: &self.pipeline.texture_layout,
                        entries: &[
                            wgpu::BindGroupEntry {
                                binding: 0,
                                resource: wgpu::BindingResource::TextureView(&texture.view),
                            },
                            wgpu::BindGroupEntry {
                                binding: 1,
                                resource: wgpu::BindingResource::Sampler(&self.sampler),
                            },
                        ],
                    }),
                    width: texture.width,
                    height: texture.height,
                }),
                Err(e) => {
                    log::warn!("{e}");
                    None
                }
            };
            self.cache.insert(image_path.to_owned(), entry);
        }
        let Some(Some(image)) = self.cache.get(image_path) else {
            return;
        };

        let vertices = image_quad(
            pos_x,
            pos_y,
            image.width as f32 * scale,
            image.height as f32 * scale,
            centered,
        );
        self.quad_buffer.update_vertices(&gpu.queue, &vertices);

        let overlay = OverlayGpu {
            ortho: ortho_matrix(screen.0, screen.1).to_cols_array_2d(),
            color: [1.0, 1.0, 1.0, 1.0],
        };
        gpu.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&overlay));

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("ui overlay encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("ui overlay pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            let Some(pipeline) = self
                .pipeline
                .ensure(&gpu.device, shaders, gpu.surface_format())
            else {
                return;
            };
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            pass.set_bind_group(1, &image.bind_group, &[]);
            self.quad_buffer.draw(&mut pass);
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));
    }
}
