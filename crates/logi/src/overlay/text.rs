//! # Text — Glyph Atlas Overlay Rendering
//!
//! Uses [fontdue](https://docs.rs/fontdue) to rasterize a TTF/OTF font into
//! a texture atlas at startup: ASCII 32–126 packed row by row into a
//! 512×512 RGBA texture as white pixels with coverage in alpha, so the text
//! shader's `color × sample` tint works without branches.
//!
//! Layout is separated from drawing: [`FontMetrics::layout`] turns a string
//! into pixel-space glyph quads (baseline semantics — `offset_y` hangs
//! descenders below the anchor), and the renderer only uploads and draws
//! whatever layout produced. If no font was configured or it failed to
//! load, every call is a logged no-op.

use glam::Vec3;

use super::{ortho_matrix, quad_vertices, OverlayGpu, OverlayPipeline};
use crate::config::RenderConfig;
use crate::forward::mesh::{GeometryBuffer, MeshVertex};
use crate::render::gpu::GpuContext;
use crate::shader::ShaderCache;

const ATLAS_SIZE: u32 = 512;
const GLYPH_PADDING: u32 = 1;
/// Enough for 512 glyph quads per call; longer strings are truncated by
/// the dynamic buffer (logged there).
const MAX_GLYPH_VERTICES: u32 = 512 * 6;

/// Per-glyph metrics and UV rectangle in the atlas.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GlyphInfo {
    pub u_min: f32,
    pub v_min: f32,
    pub u_max: f32,
    pub v_max: f32,
    /// Horizontal advance to the next glyph, in pixels.
    pub advance: f32,
    /// Offset from the cursor to the glyph's left edge.
    pub offset_x: f32,
    /// Offset from the baseline to the glyph's bottom edge (negative for
    /// descenders).
    pub offset_y: f32,
    pub width: f32,
    pub height: f32,
}

/// Glyph table for one rasterized font.
pub(crate) struct FontMetrics {
    /// Indexed by `char as u32 - 32` for ASCII 32–126.
    glyphs: Vec<Option<GlyphInfo>>,
    line_height: f32,
}

impl FontMetrics {
    pub fn glyph(&self, ch: char) -> Option<&GlyphInfo> {
        let code = ch as u32;
        if !(32..=126).contains(&code) {
            return None;
        }
        self.glyphs[(code - 32) as usize].as_ref()
    }

    /// Emit one quad per visible glyph, anchored at (x, y) on the baseline,
    /// in pixel space. Unsupported characters are skipped; newlines move
    /// down one line and return to the starting x.
    pub fn layout(&self, x: f32, y: f32, scale: f32, text: &str) -> Vec<MeshVertex> {
        let mut vertices = Vec::with_capacity(text.len() * 6);
        let mut cursor_x = x;
        let mut cursor_y = y;

        for ch in text.chars() {
            if ch == '\n' {
                cursor_x = x;
                cursor_y -= self.line_height * scale;
                continue;
            }
            let Some(glyph) = self.glyph(ch) else {
                continue;
            };
            if glyph.width == 0.0 || glyph.height == 0.0 {
                cursor_x += glyph.advance * scale;
                continue;
            }

            let quad = quad_vertices(
                cursor_x + glyph.offset_x * scale,
                cursor_y + glyph.offset_y * scale,
                glyph.width * scale,
                glyph.height * scale,
                [glyph.u_min, glyph.v_min, glyph.u_max, glyph.v_max],
            );
            vertices.extend_from_slice(&quad);
            cursor_x += glyph.advance * scale;
        }

        vertices
    }
}

struct FontAtlas {
    metrics: FontMetrics,
    bind_group: wgpu::BindGroup,
}

/// Renders text overlays from a glyph atlas. Owned by the
/// [`Renderer`](crate::forward::Renderer); call through
/// [`Renderer::render_text`](crate::forward::Renderer::render_text).
pub struct TextRenderer {
    pipeline: OverlayPipeline,
    font: Option<FontAtlas>,
    quad_buffer: GeometryBuffer,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    missing_font_warned: bool,
}

impl TextRenderer {
    pub fn new(gpu: &GpuContext, config: &RenderConfig) -> Self {
        let device = &gpu.device;
        let pipeline = OverlayPipeline::new(device, "text");

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("text overlay uniforms"),
            size: std::mem::size_of::<OverlayGpu>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("text overlay uniform bind group"),
            layout: &pipeline.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let quad_buffer = GeometryBuffer::dynamic(device, "text quads", MAX_GLYPH_VERTICES);

        let font = match &config.font_path {
            Some(path) => match load_font_atlas(gpu, &pipeline, path, config.font_size) {
                Ok(atlas) => Some(atlas),
                Err(e) => {
                    log::warn!("Text overlay disabled: {e}");
                    None
                }
            },
            None => None,
        };

        Self {
            pipeline,
            font,
            quad_buffer,
            uniform_buffer,
            uniform_bind_group,
            missing_font_warned: false,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn render_text(
        &mut self,
        gpu: &GpuContext,
        shaders: &ShaderCache,
        target: &wgpu::TextureView,
        screen: (u32, u32),
        pos_x: f32,
        pos_y: f32,
        scale: f32,
        text: &str,
        color: Vec3,
    ) {
        let Some(font) = &self.font else {
            if !self.missing_font_warned {
                log::warn!("Cannot render text, no font was loaded");
                self.missing_font_warned = true;
            }
            return;
        };

        let vertices = font.metrics.layout(pos_x, pos_y, scale, text);
        if vertices.is_empty() {
            return;
        }

        self.quad_buffer.update_vertices(&gpu.queue, &vertices);
        let overlay = OverlayGpu {
            ortho: ortho_matrix(screen.0, screen.1).to_cols_array_2d(),
            color: color.extend(1.0).to_array(),
        };
        gpu.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&overlay));

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("text overlay encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("text overlay pass"),
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
            pass.set_bind_group(1, &font.bind_group, &[]);
            self.quad_buffer.draw(&mut pass);
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));
    }
}

/// Rasterize ASCII 32–126 into a packed atlas and upload it.
fn load_font_atlas(
    gpu: &GpuContext,
    pipeline: &OverlayPipeline,
    path: &str,
    size: f32,
) -> Result<FontAtlas, String> {
    let font_data =
        std::fs::read(path).map_err(|e| format!("cannot read font '{path}': {e}"))?;
    let font = fontdue::Font::from_bytes(
        font_data,
        fontdue::FontSettings {
            scale: size,
            ..Default::default()
        },
    )
    .map_err(|e| format!("cannot parse font '{path}': {e}"))?;

    let mut atlas_rgba = vec![0u8; (ATLAS_SIZE * ATLAS_SIZE * 4) as usize];
    let mut glyphs: Vec<Option<GlyphInfo>> = Vec::with_capacity(95);
    let mut cursor_x = GLYPH_PADDING;
    let mut cursor_y = GLYPH_PADDING;
    let mut row_height = 0u32;

    for code in 32u8..=126 {
        let ch = code as char;
        let (metrics, bitmap) = font.rasterize(ch, size);
        let (gw, gh) = (metrics.width as u32, metrics.height as u32);

        // Space and other zero-size glyphs still advance the cursor.
        if gw == 0 || gh == 0 {
            glyphs.push(Some(GlyphInfo {
                u_min: 0.0,
                v_min: 0.0,
                u_max: 0.0,
                v_max: 0.0,
                advance: metrics.advance_width,
                offset_x: 0.0,
                offset_y: 0.0,
                width: 0.0,
                height: 0.0,
            }));
            continue;
        }

        if cursor_x + gw + GLYPH_PADDING > ATLAS_SIZE {
            cursor_x = GLYPH_PADDING;
            cursor_y += row_height + GLYPH_PADDING;
            row_height = 0;
        }
        if cursor_y + gh + GLYPH_PADDING > ATLAS_SIZE {
            log::warn!("Font atlas overflow at '{ch}', glyph dropped");
            glyphs.push(None);
            continue;
        }

        // White with coverage in alpha.
        for gy in 0..gh {
            for gx in 0..gw {
                let alpha = bitmap[(gy * gw + gx) as usize];
                let dst = (((cursor_y + gy) * ATLAS_SIZE + cursor_x + gx) * 4) as usize;
                atlas_rgba[dst] = 255;
                atlas_rgba[dst + 1] = 255;
                atlas_rgba[dst + 2] = 255;
                atlas_rgba[dst + 3] = alpha;
            }
        }

        glyphs.push(Some(GlyphInfo {
            u_min: cursor_x as f32 / ATLAS_SIZE as f32,
            v_min: cursor_y as f32 / ATLAS_SIZE as f32,
            u_max: (cursor_x + gw) as f32 / ATLAS_SIZE as f32,
            v_max: (cursor_y + gh) as f32 / ATLAS_SIZE as f32,
            advance: metrics.advance_width,
            offset_x: metrics.xmin as f32,
            offset_y: metrics.ymin as f32,
            width: gw as f32,
            height: gh as f32,
        }));

        cursor_x += gw + GLYPH_PADDING;
        row_height = row_height.max(gh);
    }

    let device = &gpu.device;
    let texture = wgpu::util::DeviceExt::create_texture_with_data(
        device,
        &gpu.queue,
        &wgpu::TextureDescriptor {
            label: Some("font atlas"),
            size: wgpu::Extent3d {
                width: ATLAS_SIZE,
                height: ATLAS_SIZE,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        &atlas_rgba,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("font atlas sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("font atlas bind group"),
        layout: &pipeline.texture_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&sampler),
            },
        ],
    });

    let line_height = size * 1.2;
    Ok(FontAtlas {
        metrics: FontMetrics {
            glyphs,
            line_height,
        },
        bind_group,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_metrics() -> FontMetrics {
        let mut glyphs = vec![None; 95];
        // Space: zero-size, advance only.
        glyphs[0] = Some(GlyphInfo {
            u_min: 0.0,
            v_min: 0.0,
            u_max: 0.0,
            v_max: 0.0,
            advance: 5.0,
            offset_x: 0.0,
            offset_y: 0.0,
            width: 0.0,
            height: 0.0,
        });
        // 'A' (code 65 → index 33): 10x20 box, advance 12.
        glyphs[33] = Some(GlyphInfo {
            u_min: 0.1,
            v_min: 0.1,
            u_max: 0.2,
            v_max: 0.3,
            advance: 12.0,
            offset_x: 1.0,
            offset_y: -2.0,
            width: 10.0,
            height: 20.0,
        });
        FontMetrics {
            glyphs,
            line_height: 24.0,
        }
    }

    #[test]
    fn layout_emits_one_quad_per_visible_glyph() {
        let metrics = test_metrics();
        let vertices = metrics.layout(0.0, 0.0, 1.0, "A A");
        // Two 'A's, one space: 2 quads × 6 vertices.
        assert_eq!(vertices.len(), 12);
    }

    #[test]
    fn layout_advances_through_spaces() {
        let metrics = test_metrics();
        let vertices = metrics.layout(100.0, 50.0, 1.0, "A A");
        // Second quad's left edge: 100 + advance(A) + advance(space) + offset_x.
        assert_eq!(vertices[7].position[0], 100.0 + 12.0 + 5.0 + 1.0);
    }

    #[test]
    fn layout_scales_advance_and_size() {
        let metrics = test_metrics();
        let vertices = metrics.layout(0.0, 0.0, 2.0, "A");
        // Bottom-left at (offset_x, offset_y) * 2, quad spans 20x40.
        assert_eq!(vertices[1].position[0], 2.0);
        assert_eq!(vertices[1].position[1], -4.0);
        assert_eq!(vertices[5].position[0], 2.0 + 20.0);
    }

    #[test]
    fn layout_newline_returns_to_origin_x() {
        let metrics = test_metrics();
        let vertices = metrics.layout(10.0, 100.0, 1.0, "A\nA");
        let first_x = vertices[1].position[0];
        let second_x = vertices[7].position[0];
        assert_eq!(first_x, second_x);
        // One line down.
        assert_eq!(vertices[7].position[1], 100.0 - 24.0 - 2.0);
    }

    #[test]
    fn layout_skips_unsupported_characters() {
        let metrics = test_metrics();
        let vertices = metrics.layout(0.0, 0.0, 1.0, "A\u{7f}A");
        assert_eq!(vertices.len(), 12);
    }

    #[test]
    fn glyph_lookup_rejects_out_of_range() {
        let metrics = test_metrics();
        assert!(metrics.glyph('\u{1f600}').is_none());
        assert!(metrics.glyph('\t').is_none());
        assert!(metrics.glyph('A').is_some());
    }
}
