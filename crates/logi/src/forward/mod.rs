//! # Forward — The Forward+ Pipeline Orchestrator
//!
//! [`Renderer`] owns every persistent and frame-scoped GPU resource of the
//! Forward+ pipeline and drives the per-frame sequence:
//!
//! ```text
//! draw(gpu)
//!   │
//!   ├─ 1. Depth prepass ──── opaque batches, depth only
//!   ├─ 2. Depth copy ─────── prepass depth → HDR target's depth
//!   ├─ 3. Light upload ───── overwrite the GPU light table
//!   ├─ 4. Light culling ──── compute, one invocation per tile
//!   │                        (skipped without compute support)
//!   ├─ 5. Opaque shading ─── depth Equal, blending off
//!   ├─ 6. Alpha shading ──── depth Less, blending on, alpha cutout
//!   ├─ 7. Light debug ────── flag-gated octahedron gizmos
//!   └─ 8. Assembly ───────── fullscreen quad resolves HDR → swapchain
//! ```
//!
//! Everything is recorded into a single command encoder, so the culling
//! dispatch is ordered after the prepass and before shading — wgpu's pass
//! boundaries carry the producer/consumer barrier the tile buffer needs.
//!
//! The caller contract per frame: `update()` (resize + hot-reload poll),
//! fill `uniforms`, `add_attrib` per visible object, `draw()`, optional
//! overlay calls, `present()`, `flush_attribs()`. The live
//! [`RenderState`](crate::render::state::RenderState) is saved on entry to
//! `draw` and each overlay helper and restored on exit, so nested renderers
//! never observe someone else's state.

pub mod batch;
pub mod culling;
pub mod mesh;
pub(crate) mod pipeline;
pub mod targets;
pub mod texture;
pub mod uniforms;

pub use batch::Attrib;
pub use targets::ResolutionDeps;

use std::sync::Arc;

use glam::{Mat4, Vec3};

use crate::config::RenderConfig;
use crate::render::gpu::GpuContext;
use crate::render::state::{BlendFunc, DepthFunc, PolygonMode, PrimitiveMode, RenderState, StateTracker};
use crate::shader::ShaderCache;
use batch::partition_by_mask;
use culling::CullingPass;
use mesh::GeometryBuffer;
use pipeline::{RenderPipelines, Stage};
use targets::Targets;
use texture::TextureArray;
use uniforms::{DrawGpu, FrameUniforms, LightsGpu, NUM_LIGHTS};

/// Counters from the most recent `draw()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameStats {
    pub geometry_draws: u32,
    pub opaque_draws: u32,
    pub alpha_draws: u32,
    pub gizmo_draws: u32,
    pub culling_dispatched: bool,
}

struct AcquiredFrame {
    texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

/// The Forward+ renderer. One instance per window/GPU context.
pub struct Renderer {
    /// Per-frame globals, rewritten wholesale by the caller before `draw`.
    pub uniforms: FrameUniforms,

    attribs: Vec<Attrib>,
    state: StateTracker,
    shaders: ShaderCache,
    pipelines: RenderPipelines,
    targets: Targets,
    culling: Option<CullingPass>,

    frame_buffer: wgpu::Buffer,
    lights_buffer: wgpu::Buffer,
    visible_buffer: Option<wgpu::Buffer>,
    draw_buffer: wgpu::Buffer,
    draw_capacity: usize,
    draw_stride: u32,

    frame_bind_group: wgpu::BindGroup,
    lights_bind_group: wgpu::BindGroup,
    draw_bind_group: wgpu::BindGroup,
    culling_bind_group: Option<wgpu::BindGroup>,
    present_bind_group: wgpu::BindGroup,

    material_sampler: wgpu::Sampler,
    present_sampler: wgpu::Sampler,
    fallback_array: Arc<TextureArray>,

    quad: GeometryBuffer,
    octahedron: GeometryBuffer,

    frame: Option<AcquiredFrame>,
    stats: FrameStats,
    clear_color: wgpu::Color,
    width: u32,
    height: u32,

    #[cfg(feature = "overlay")]
    text: crate::overlay::text::TextRenderer,
    #[cfg(feature = "overlay")]
    ui: crate::overlay::ui::UiRenderer,
}

impl Renderer {
    /// Allocate every GPU resource for the current surface size.
    pub fn new(gpu: &GpuContext, config: &RenderConfig) -> Self {
        let device = &gpu.device;
        let (width, height) = gpu.surface_size();

        let shaders = ShaderCache::new(device);
        let pipelines = RenderPipelines::new(device);
        let targets = Targets::new(device, width, height);
        let culling = gpu.compute_capable.then(|| CullingPass::new(device));

        // ── Frame + light buffers ───────────────────────────────────────
        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame uniforms"),
            size: std::mem::size_of::<uniforms::FrameGpu>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // Storage on the tiled path; plain uniform on the fallback path,
        // where storage buffers may not exist at all.
        let lights_usage = if gpu.compute_capable {
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST
        } else {
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST
        };
        let lights_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("light table"),
            size: std::mem::size_of::<LightsGpu>() as u64,
            usage: lights_usage,
            mapped_at_creation: false,
        });

        let visible_buffer = gpu
            .compute_capable
            .then(|| create_visible_buffer(device, &targets.deps));

        // ── Per-draw dynamic buffer ─────────────────────────────────────
        let draw_stride = align_up(
            std::mem::size_of::<DrawGpu>(),
            device.limits().min_uniform_buffer_offset_alignment as usize,
        ) as u32;
        let draw_capacity = 256;
        let draw_buffer = create_draw_buffer(device, draw_stride, draw_capacity);

        // ── Static bind groups ──────────────────────────────────────────
        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame bind group"),
            layout: &pipelines.layouts.frame,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buffer.as_entire_binding(),
            }],
        });
        let lights_bind_group = create_lights_bind_group(
            device,
            &pipelines.layouts,
            &lights_buffer,
            visible_buffer.as_ref(),
        );
        let draw_bind_group =
            create_draw_bind_group(device, &pipelines.layouts.draw, &draw_buffer);

        let material_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("material sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let present_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("present sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let present_bind_group = create_present_bind_group(
            device,
            &pipelines.layouts.present,
            &targets.hdr_view,
            &present_sampler,
        );

        let culling_bind_group = match (&culling, &visible_buffer) {
            (Some(pass), Some(visible)) => Some(create_culling_bind_group(
                device,
                pass,
                &frame_buffer,
                &lights_buffer,
                visible,
                &targets.depth_view,
            )),
            _ => None,
        };

        let fallback_array = Arc::new(TextureArray::solid(
            device,
            &gpu.queue,
            "fallback white array",
            [255, 255, 255, 255],
        ));

        // ── Service geometry ────────────────────────────────────────────
        let (quad_vertices, quad_indices) = mesh::fullscreen_quad();
        let quad = GeometryBuffer::with_indices(device, "fullscreen quad", &quad_vertices, &quad_indices);
        let (octa_vertices, octa_indices) = mesh::octahedron();
        let octahedron =
            GeometryBuffer::with_indices(device, "light gizmo", &octa_vertices, &octa_indices);

        let clear_color = wgpu::Color {
            r: config.clear_color[0],
            g: config.clear_color[1],
            b: config.clear_color[2],
            a: config.clear_color[3],
        };

        let mut uniforms = FrameUniforms::default();
        uniforms.debug = config.debug;
        uniforms.light_debug = config.light_debug;

        #[cfg(feature = "overlay")]
        let text = crate::overlay::text::TextRenderer::new(gpu, config);
        #[cfg(feature = "overlay")]
        let ui = crate::overlay::ui::UiRenderer::new(gpu);

        Self {
            uniforms,
            attribs: Vec::new(),
            state: StateTracker::new(),
            shaders,
            pipelines,
            targets,
            culling,
            frame_buffer,
            lights_buffer,
            visible_buffer,
            draw_buffer,
            draw_capacity,
            draw_stride,
            frame_bind_group,
            lights_bind_group,
            draw_bind_group,
            culling_bind_group,
            present_bind_group,
            material_sampler,
            present_sampler,
            fallback_array,
            quad,
            octahedron,
            frame: None,
            stats: FrameStats::default(),
            clear_color,
            width,
            height,
            #[cfg(feature = "overlay")]
            text,
            #[cfg(feature = "overlay")]
            ui,
        }
    }

    /// Append a draw batch. No validation, O(1) amortized.
    pub fn add_attrib(&mut self, attrib: Attrib) {
        self.attribs.push(attrib);
    }

    /// Clear the batch. The caller does this once per frame after `draw`.
    pub fn flush_attribs(&mut self) {
        self.attribs.clear();
    }

    pub fn screen_width(&self) -> u32 {
        self.width
    }

    pub fn screen_height(&self) -> u32 {
        self.height
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Byte size of the visible-light-index buffer; zero on the no-compute
    /// fallback path. Always `tile_count_x * tile_count_y *
    /// MAX_LIGHTS_PER_TILE * 4` for the current viewport.
    pub fn visible_buffer_size(&self) -> u64 {
        self.visible_buffer.as_ref().map_or(0, |buffer| buffer.size())
    }

    /// Poll shader hot-reload and react to viewport changes. On a resize,
    /// every resolution-dependent resource is dropped and recreated at the
    /// new size — nothing is patched incrementally.
    pub fn update(&mut self, gpu: &GpuContext, width: u32, height: u32) {
        self.shaders.update(&gpu.device);

        if (width, height) != (self.width, self.height) && width > 0 && height > 0 {
            self.width = width;
            self.height = height;
            self.rebuild_resolution_resources(gpu);
            log::debug!("Rebuilt render targets at {width}x{height}");
        }
    }

    fn rebuild_resolution_resources(&mut self, gpu: &GpuContext) {
        let device = &gpu.device;
        self.targets = Targets::new(device, self.width, self.height);

        if self.culling.is_some() {
            let visible = create_visible_buffer(device, &self.targets.deps);
            self.lights_bind_group = create_lights_bind_group(
                device,
                &self.pipelines.layouts,
                &self.lights_buffer,
                Some(&visible),
            );
            self.culling_bind_group = self.culling.as_ref().map(|pass| {
                create_culling_bind_group(
                    device,
                    pass,
                    &self.frame_buffer,
                    &self.lights_buffer,
                    &visible,
                    &self.targets.depth_view,
                )
            });
            self.visible_buffer = Some(visible);
        }

        self.present_bind_group = create_present_bind_group(
            device,
            &self.pipelines.layouts.present,
            &self.targets.hdr_view,
            &self.present_sampler,
        );
    }

    /// Acquire the swapchain frame and clear it. Useful when a frame draws
    /// overlays only.
    pub fn clear_screen(&mut self, gpu: &GpuContext) -> Result<(), wgpu::SurfaceError> {
        self.ensure_frame(gpu)?;
        let view = &self.frame.as_ref().expect("frame acquired").view;
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("clear encoder"),
            });
        {
            let _render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("clear pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    /// Present the frame acquired by `draw`/`clear_screen`. The environment
    /// loop calls this once per frame, after any overlays.
    pub fn present(&mut self) {
        if let Some(frame) = self.frame.take() {
            frame.texture.present();
        }
    }

    /// Run the full Forward+ sequence over the current batch. Requires
    /// `uniforms` to be populated for this frame. The live render state is
    /// restored before returning.
    pub fn draw(&mut self, gpu: &GpuContext) -> Result<(), wgpu::SurfaceError> {
        let backup = self.state.current();
        self.ensure_frame(gpu)?;
        let device = &gpu.device;
        let features = gpu.features();
        let surface_format = gpu.surface_format();

        // ── Frame + light upload ────────────────────────────────────────
        // Both are write-only overwrites: the previous contents are gone.
        let frame_gpu = self
            .uniforms
            .to_gpu((self.width, self.height), self.targets.deps.tile_counts());
        gpu.queue
            .write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(&frame_gpu));
        let lights_gpu = LightsGpu::from(&self.uniforms.lights);
        gpu.queue
            .write_buffer(&self.lights_buffer, 0, bytemuck::bytes_of(&lights_gpu));

        // ── Partition and fill the per-draw slots ───────────────────────
        let (opaque, alpha) = partition_by_mask(self.attribs.iter().map(|a| a.alpha_mask));

        let gizmos: Vec<usize> = if self.uniforms.light_debug {
            (0..NUM_LIGHTS)
                .filter(|&i| self.uniforms.lights.lights[i].radius > 0.0)
                .collect()
        } else {
            Vec::new()
        };

        let slot_count = self.attribs.len() + gizmos.len();
        self.ensure_draw_capacity(device, slot_count);

        let stride = self.draw_stride as usize;
        let mut draw_data = vec![0u8; stride * slot_count.max(1)];
        for (i, attrib) in self.attribs.iter().enumerate() {
            let slot = DrawGpu {
                model: attrib.model.to_cols_array_2d(),
                normal_matrix: attrib.model.inverse().transpose().to_cols_array_2d(),
                material: attrib.material.to_gpu(attrib.tex_indices()),
                tex_indices: attrib.tex_indices(),
                alpha_mask: attrib.alpha_mask as u32,
                _pad: [0; 3],
            };
            let offset = i * stride;
            draw_data[offset..offset + std::mem::size_of::<DrawGpu>()]
                .copy_from_slice(bytemuck::bytes_of(&slot));
        }
        for (k, &light_index) in gizmos.iter().enumerate() {
            let light = &self.uniforms.lights.lights[light_index];
            let mut material = uniforms::Material::default();
            material.diffuse = light.color;
            let model = Mat4::from_translation(light.position) * Mat4::from_scale(Vec3::splat(0.125));
            let slot = DrawGpu {
                model: model.to_cols_array_2d(),
                normal_matrix: Mat4::IDENTITY.to_cols_array_2d(),
                material: material.to_gpu([-1; 4]),
                tex_indices: [-1; 4],
                alpha_mask: 0,
                _pad: [0; 3],
            };
            let offset = (self.attribs.len() + k) * stride;
            draw_data[offset..offset + std::mem::size_of::<DrawGpu>()]
                .copy_from_slice(bytemuck::bytes_of(&slot));
        }
        if slot_count > 0 {
            gpu.queue.write_buffer(&self.draw_buffer, 0, &draw_data);
        }

        let textures_bind_group = self.create_textures_bind_group(device);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("forward encoder"),
        });

        // ── 1. Depth prepass ────────────────────────────────────────────
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("depth prepass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.targets.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let mut bound: Option<RenderState> = None;
            for &i in &opaque {
                let attrib = &self.attribs[i];
                let desired = prepass_state(&attrib.state);
                self.state.set_state(desired);
                if bound != Some(desired) {
                    let Some(pipeline) = self.pipelines.get(
                        device,
                        features,
                        surface_format,
                        &self.shaders,
                        Stage::DepthPrepass,
                        desired,
                    ) else {
                        continue;
                    };
                    pass.set_pipeline(pipeline);
                    pass.set_bind_group(0, &self.frame_bind_group, &[]);
                    bound = Some(desired);
                }
                pass.set_bind_group(1, &self.draw_bind_group, &[i as u32 * self.draw_stride]);
                self.attribs[i].geometry.draw(&mut pass);
            }
        }

        // ── 2. Depth copy into the HDR target ───────────────────────────
        self.targets.blit_depth(&mut encoder);

        // ── 3/4. Light culling dispatch ─────────────────────────────────
        let mut culling_dispatched = false;
        if let (Some(culling), Some(bind_group)) = (&mut self.culling, &self.culling_bind_group) {
            if culling.ensure_pipeline(device, &self.shaders) {
                culling.record(&mut encoder, bind_group, self.targets.deps.tile_counts());
                culling_dispatched = true;
            }
        }

        // ── 5/6/7. Shading into the HDR target ──────────────────────────
        // The stage follows the lights binding, not the dispatch: on the
        // compute path an undispatched frame still binds the tiled layout
        // and reads the -1-initialized (empty) tile lists.
        let shading_stage = if self.culling.is_some() {
            Stage::Shading
        } else {
            Stage::ShadingFallback
        };
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("shading pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.targets.hdr_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                // The depth buffer holds the blitted prepass depth; load it.
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.targets.hdr_depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let mut bound: Option<RenderState> = None;
            let sub_passes: [(&[usize], fn(&RenderState) -> RenderState); 2] =
                [(&opaque, opaque_state), (&alpha, alpha_state)];
            let mut sub_counts = [0u32; 2];

            for (sub, (indices, make_state)) in sub_passes.iter().enumerate() {
                for &i in *indices {
                    let attrib = &self.attribs[i];
                    let desired = make_state(&attrib.state);
                    self.state.set_state(desired);
                    if bound != Some(desired) {
                        let Some(pipeline) = self.pipelines.get(
                            device,
                            features,
                            surface_format,
                            &self.shaders,
                            shading_stage,
                            desired,
                        ) else {
                            continue;
                        };
                        pass.set_pipeline(pipeline);
                        pass.set_bind_group(0, &self.frame_bind_group, &[]);
                        pass.set_bind_group(1, &self.lights_bind_group, &[]);
                        pass.set_bind_group(2, &textures_bind_group, &[]);
                        bound = Some(desired);
                    }
                    pass.set_bind_group(3, &self.draw_bind_group, &[i as u32 * self.draw_stride]);
                    self.attribs[i].geometry.draw(&mut pass);
                    sub_counts[sub] += 1;
                }
            }
            let (opaque_draws, alpha_draws) = (sub_counts[0], sub_counts[1]);

            // Light gizmos share the pass; depth Less so they sit in the scene.
            let mut gizmo_draws = 0;
            if !gizmos.is_empty() {
                let desired = gizmo_state();
                self.state.set_state(desired);
                if let Some(pipeline) = self.pipelines.get(
                    device,
                    features,
                    surface_format,
                    &self.shaders,
                    Stage::LightDebug,
                    desired,
                ) {
                    pass.set_pipeline(pipeline);
                    pass.set_bind_group(0, &self.frame_bind_group, &[]);
                    for k in 0..gizmos.len() {
                        let offset = (self.attribs.len() + k) as u32 * self.draw_stride;
                        pass.set_bind_group(1, &self.draw_bind_group, &[offset]);
                        self.octahedron.draw(&mut pass);
                        gizmo_draws += 1;
                    }
                }
            }

            self.stats = FrameStats {
                geometry_draws: opaque_draws + alpha_draws,
                opaque_draws,
                alpha_draws,
                gizmo_draws,
                culling_dispatched,
            };
        }

        // ── 8. Assembly: resolve HDR to the swapchain ───────────────────
        {
            let frame_view = &self.frame.as_ref().expect("frame acquired").view;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("assembly pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: frame_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let desired = present_state();
            self.state.set_state(desired);
            if let Some(pipeline) = self.pipelines.get(
                device,
                features,
                surface_format,
                &self.shaders,
                Stage::Present,
                desired,
            ) {
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &self.present_bind_group, &[]);
                self.quad.draw(&mut pass);
            }
        }

        gpu.queue.submit(std::iter::once(encoder.finish()));

        // Restore the caller's state so overlay renderers are unaffected.
        self.state.set_state(backup);
        Ok(())
    }

    /// Draw a text overlay onto the current frame. Saves and restores the
    /// live render state around its own draws.
    #[cfg(feature = "overlay")]
    pub fn render_text(
        &mut self,
        gpu: &GpuContext,
        pos_x: f32,
        pos_y: f32,
        scale: f32,
        text: &str,
        color: Vec3,
    ) -> Result<(), wgpu::SurfaceError> {
        let backup = self.state.current();
        self.state.switch_polygon_mode(PolygonMode::Fill);
        self.state.switch_depth_test(true);
        self.state.switch_blend_func(BlendFunc::OneMinusSrcAlpha);
        self.state.switch_blending(true);

        self.ensure_frame(gpu)?;
        let view = &self.frame.as_ref().expect("frame acquired").view;
        self.text.render_text(
            gpu,
            &self.shaders,
            view,
            (self.width, self.height),
            pos_x,
            pos_y,
            scale,
            text,
            color,
        );

        self.state.set_state(backup);
        Ok(())
    }

    /// Draw a screen-space image onto the current frame. The image is
    /// loaded (and cached) by path on first use; a failed load is a logged
    /// no-op.
    #[cfg(feature = "overlay")]
    pub fn render_ui(
        &mut self,
        gpu: &GpuContext,
        image_path: &str,
        pos_x: f32,
        pos_y: f32,
        scale: f32,
        centered: bool,
    ) -> Result<(), wgpu::SurfaceError> {
        let backup = self.state.current();
        self.state.switch_polygon_mode(PolygonMode::Fill);
        self.state.switch_depth_test(false);
        self.state.switch_blend_func(BlendFunc::OneMinusSrcAlpha);
        self.state.switch_blending(true);

        self.ensure_frame(gpu)?;
        let view = &self.frame.as_ref().expect("frame acquired").view;
        self.ui.render_ui(
            gpu,
            &self.shaders,
            view,
            (self.width, self.height),
            image_path,
            pos_x,
            pos_y,
            scale,
            centered,
        );

        self.state.set_state(backup);
        Ok(())
    }

    fn ensure_frame(&mut self, gpu: &GpuContext) -> Result<(), wgpu::SurfaceError> {
        if self.frame.is_none() {
            let texture = gpu.surface.get_current_texture()?;
            let view = texture
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default());
            self.frame = Some(AcquiredFrame { texture, view });
        }
        Ok(())
    }

    fn ensure_draw_capacity(&mut self, device: &wgpu::Device, needed: usize) {
        if needed > self.draw_capacity {
            let new_capacity = needed.next_power_of_two();
            self.draw_buffer = create_draw_buffer(device, self.draw_stride, new_capacity);
            self.draw_bind_group =
                create_draw_bind_group(device, &self.pipelines.layouts.draw, &self.draw_buffer);
            self.draw_capacity = new_capacity;
        }
    }

    fn create_textures_bind_group(&self, device: &wgpu::Device) -> wgpu::BindGroup {
        let fallback: &TextureArray = &self.fallback_array;
        let albedo = self.uniforms.albedo_array.as_deref().unwrap_or(fallback);
        let normal = self.uniforms.normal_array.as_deref().unwrap_or(fallback);
        let metallic = self.uniforms.metallic_array.as_deref().unwrap_or(fallback);
        let roughness = self.uniforms.roughness_array.as_deref().unwrap_or(fallback);

        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("material textures bind group"),
            layout: &self.pipelines.layouts.textures,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&albedo.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&normal.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&metallic.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&roughness.view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&self.material_sampler),
                },
            ],
        })
    }
}

// ── Sub-pass state rules ────────────────────────────────────────────────────
// Topology and fill mode come from the batch; depth and blend are dictated
// by the sub-pass.

fn prepass_state(attrib: &RenderState) -> RenderState {
    RenderState {
        primitive_mode: attrib.primitive_mode,
        polygon_mode: attrib.polygon_mode,
        depth_func: DepthFunc::Less,
        blend_func: BlendFunc::Zero,
        depth_test: true,
        blending: false,
    }
}

fn opaque_state(attrib: &RenderState) -> RenderState {
    RenderState {
        primitive_mode: attrib.primitive_mode,
        polygon_mode: attrib.polygon_mode,
        // Only pixels whose depth matches the prepass get shaded; anything
        // behind is rejected without running the fragment shader.
        depth_func: DepthFunc::Equal,
        blend_func: BlendFunc::Zero,
        depth_test: true,
        blending: false,
    }
}

fn alpha_state(attrib: &RenderState) -> RenderState {
    RenderState {
        primitive_mode: attrib.primitive_mode,
        polygon_mode: attrib.polygon_mode,
        depth_func: DepthFunc::Less,
        blend_func: BlendFunc::OneMinusSrcAlpha,
        depth_test: true,
        blending: true,
    }
}

fn gizmo_state() -> RenderState {
    RenderState {
        primitive_mode: PrimitiveMode::Triangles,
        polygon_mode: PolygonMode::Fill,
        depth_func: DepthFunc::Less,
        blend_func: BlendFunc::Zero,
        depth_test: true,
        blending: false,
    }
}

fn present_state() -> RenderState {
    RenderState {
        primitive_mode: PrimitiveMode::Triangles,
        polygon_mode: PolygonMode::Fill,
        depth_func: DepthFunc::Always,
        blend_func: BlendFunc::Zero,
        depth_test: false,
        blending: false,
    }
}

// ── Resource helpers ────────────────────────────────────────────────────────

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

fn create_visible_buffer(device: &wgpu::Device, deps: &ResolutionDeps) -> wgpu::Buffer {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("visible light indices"),
        size: deps.visible_buffer_bytes(),
        usage: wgpu::BufferUsages::STORAGE,
        mapped_at_creation: true,
    });
    // All bytes 0xFF = i32 -1 terminators: every tile list reads as empty
    // until the first culling dispatch writes real indices.
    buffer.slice(..).get_mapped_range_mut().fill(0xFF);
    buffer.unmap();
    buffer
}

fn create_draw_buffer(device: &wgpu::Device, stride: u32, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("per-draw uniforms"),
        size: stride as u64 * capacity as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_draw_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("draw bind group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer,
                offset: 0,
                size: wgpu::BufferSize::new(std::mem::size_of::<DrawGpu>() as u64),
            }),
        }],
    })
}

fn create_lights_bind_group(
    device: &wgpu::Device,
    layouts: &pipeline::PipelineLayouts,
    lights_buffer: &wgpu::Buffer,
    visible_buffer: Option<&wgpu::Buffer>,
) -> wgpu::BindGroup {
    match visible_buffer {
        Some(visible) => device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lights bind group (tiled)"),
            layout: &layouts.lights_tiled,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: lights_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: visible.as_entire_binding(),
                },
            ],
        }),
        None => device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lights bind group (fallback)"),
            layout: &layouts.lights_fallback,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: lights_buffer.as_entire_binding(),
            }],
        }),
    }
}

fn create_culling_bind_group(
    device: &wgpu::Device,
    pass: &CullingPass,
    frame_buffer: &wgpu::Buffer,
    lights_buffer: &wgpu::Buffer,
    visible_buffer: &wgpu::Buffer,
    depth_view: &wgpu::TextureView,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("light culling bind group"),
        layout: &pass.bind_group_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: lights_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: visible_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::TextureView(depth_view),
            },
        ],
    })
}

fn create_present_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    hdr_view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("present bind group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(hdr_view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_pass_states_pin_depth_and_blend() {
        let mut batch_state = RenderState::default();
        batch_state.primitive_mode = PrimitiveMode::TriangleStrip;
        batch_state.depth_func = DepthFunc::Always; // ignored by sub-passes

        let opaque = opaque_state(&batch_state);
        assert_eq!(opaque.depth_func, DepthFunc::Equal);
        assert!(!opaque.blending);
        assert_eq!(opaque.primitive_mode, PrimitiveMode::TriangleStrip);

        let alpha = alpha_state(&batch_state);
        assert_eq!(alpha.depth_func, DepthFunc::Less);
        assert!(alpha.blending);
        assert_eq!(alpha.blend_func, BlendFunc::OneMinusSrcAlpha);

        let prepass = prepass_state(&batch_state);
        assert_eq!(prepass.depth_func, DepthFunc::Less);
        assert!(!prepass.blending);
    }

    #[test]
    fn align_up_rounds_to_alignment() {
        assert_eq!(align_up(304, 256), 512);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(1, 64), 64);
        assert_eq!(align_up(0, 64), 0);
    }
}
