//! # Pipeline — Bind Group Layouts and State-Keyed Pipeline Variants
//!
//! wgpu has no mutable pipeline state, so the GL-style "switch depth func"
//! becomes "bind a different pipeline variant". Variants are cached per
//! `(stage, RenderState)` and built lazily from the shader cache; each
//! cached entry remembers the shader generation it was built from, so a
//! hot-reload transparently rebuilds on next use.
//!
//! Bind groups are split by change frequency, most stable first:
//!
//! ```text
//! group 0  frame uniforms     (once per frame)
//! group 1  light data         (once per frame; storage or uniform fallback)
//! group 2  texture arrays     (once per frame)
//! group 3  per-draw uniforms  (dynamic offset per draw call)
//! ```
//!
//! The depth prepass and light-debug stages only use groups 0 and 1 (frame
//! + draw); the present stage has its own single group.

use std::collections::HashMap;

use super::mesh::MeshVertex;
use super::targets::{DEPTH_FORMAT, HDR_FORMAT};
use super::uniforms::DrawGpu;
use crate::render::state::{self, DepthFunc, PolygonMode, RenderState};
use crate::shader::ShaderCache;

/// The render stages that own graphics pipelines. (Light culling is a
/// compute pipeline and lives in [`culling`](super::culling).)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Stage {
    DepthPrepass,
    Shading,
    ShadingFallback,
    LightDebug,
    Present,
}

fn shader_key(stage: Stage) -> &'static str {
    match stage {
        Stage::DepthPrepass => "depth_prepass",
        Stage::Shading => "shading",
        Stage::ShadingFallback => "shading_fallback",
        Stage::LightDebug => "light_debug",
        Stage::Present => "present",
    }
}

/// All bind group layouts, shared by every pipeline variant.
pub(crate) struct PipelineLayouts {
    pub frame: wgpu::BindGroupLayout,
    pub lights_tiled: wgpu::BindGroupLayout,
    pub lights_fallback: wgpu::BindGroupLayout,
    pub textures: wgpu::BindGroupLayout,
    pub draw: wgpu::BindGroupLayout,
    pub present: wgpu::BindGroupLayout,
}

impl PipelineLayouts {
    fn new(device: &wgpu::Device) -> Self {
        let uniform_entry = |binding, visibility| wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let storage_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let array_texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                multisampled: false,
                view_dimension: wgpu::TextureViewDimension::D2Array,
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
            },
            count: None,
        };

        let frame = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame layout"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX_FRAGMENT)],
        });

        let lights_tiled = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lights layout (tiled)"),
            entries: &[storage_entry(0), storage_entry(1)],
        });

        let lights_fallback = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lights layout (fallback)"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::FRAGMENT)],
        });

        let textures = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("material textures layout"),
            entries: &[
                array_texture_entry(0),
                array_texture_entry(1),
                array_texture_entry(2),
                array_texture_entry(3),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let draw = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("draw layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(
                        std::mem::size_of::<DrawGpu>() as u64
                    ),
                },
                count: None,
            }],
        });

        let present = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("present layout"),
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

        Self {
            frame,
            lights_tiled,
            lights_fallback,
            textures,
            draw,
            present,
        }
    }
}

struct CachedPipeline {
    generation: u64,
    pipeline: wgpu::RenderPipeline,
}

/// Lazily-built cache of pipeline variants, one per `(stage, state)`.
pub(crate) struct RenderPipelines {
    pub layouts: PipelineLayouts,
    prepass_layout: wgpu::PipelineLayout,
    shading_layout: wgpu::PipelineLayout,
    fallback_layout: wgpu::PipelineLayout,
    present_layout: wgpu::PipelineLayout,
    cache: HashMap<(Stage, RenderState), CachedPipeline>,
}

impl RenderPipelines {
    pub fn new(device: &wgpu::Device) -> Self {
        let layouts = PipelineLayouts::new(device);

        let prepass_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("prepass pipeline layout"),
            bind_group_layouts: &[&layouts.frame, &layouts.draw],
            push_constant_ranges: &[],
        });
        let shading_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("shading pipeline layout"),
            bind_group_layouts: &[
                &layouts.frame,
                &layouts.lights_tiled,
                &layouts.textures,
                &layouts.draw,
            ],
            push_constant_ranges: &[],
        });
        let fallback_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("shading fallback pipeline layout"),
            bind_group_layouts: &[
                &layouts.frame,
                &layouts.lights_fallback,
                &layouts.textures,
                &layouts.draw,
            ],
            push_constant_ranges: &[],
        });
        let present_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("present pipeline layout"),
            bind_group_layouts: &[&layouts.present],
            push_constant_ranges: &[],
        });

        Self {
            layouts,
            prepass_layout,
            shading_layout,
            fallback_layout,
            present_layout,
            cache: HashMap::new(),
        }
    }

    /// Fetch (building if stale or absent) the pipeline for a stage under a
    /// given render state. Returns `None` when the stage's shader has never
    /// compiled — the caller skips those draws.
    pub fn get(
        &mut self,
        device: &wgpu::Device,
        features: wgpu::Features,
        surface_format: wgpu::TextureFormat,
        shaders: &ShaderCache,
        stage: Stage,
        state: RenderState,
    ) -> Option<&wgpu::RenderPipeline> {
        let program = shaders.get(shader_key(stage))?;
        let generation = program.generation();

        let stale = match self.cache.get(&(stage, state)) {
            Some(cached) => cached.generation != generation,
            None => true,
        };
        if stale {
            let module = program.module()?;
            let pipeline = self.build(device, features, surface_format, module, stage, state);
            self.cache.insert(
                (stage, state),
                CachedPipeline {
                    generation,
                    pipeline,
                },
            );
        }

        self.cache.get(&(stage, state)).map(|c| &c.pipeline)
    }

    fn build(
        &self,
        device: &wgpu::Device,
        features: wgpu::Features,
        surface_format: wgpu::TextureFormat,
        module: &wgpu::ShaderModule,
        stage: Stage,
        state: RenderState,
    ) -> wgpu::RenderPipeline {
        let layout = match stage {
            Stage::DepthPrepass | Stage::LightDebug => &self.prepass_layout,
            Stage::Shading => &self.shading_layout,
            Stage::ShadingFallback => &self.fallback_layout,
            Stage::Present => &self.present_layout,
        };

        let compare = if state.depth_test {
            state::compare_function(state.depth_func)
        } else {
            wgpu::CompareFunction::Always
        };
        // The Equal sub-pass shades what the prepass already wrote; writing
        // depth again would be redundant and racy with blending.
        let depth_write = match stage {
            Stage::DepthPrepass | Stage::LightDebug => true,
            Stage::Shading | Stage::ShadingFallback => state.depth_func != DepthFunc::Equal,
            Stage::Present => false,
        };
        let depth_stencil = match stage {
            Stage::Present => None,
            _ => Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: depth_write,
                depth_compare: compare,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
        };

        let fragment_targets: [Option<wgpu::ColorTargetState>; 1] = match stage {
            Stage::DepthPrepass => [None],
            Stage::Present => [Some(wgpu::ColorTargetState {
                format: surface_format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            _ => [Some(wgpu::ColorTargetState {
                format: HDR_FORMAT,
                blend: state::blend_state(&state),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        };
        let fragment = match stage {
            Stage::DepthPrepass => None,
            _ => Some(wgpu::FragmentState {
                module,
                entry_point: Some("fs_main"),
                targets: &fragment_targets,
                compilation_options: Default::default(),
            }),
        };

        let mut polygon = state::polygon_mode(state.polygon_mode);
        let needed = match state.polygon_mode {
            PolygonMode::Fill => wgpu::Features::empty(),
            PolygonMode::Line => wgpu::Features::POLYGON_MODE_LINE,
            PolygonMode::Point => wgpu::Features::POLYGON_MODE_POINT,
        };
        if !features.contains(needed) {
            log::warn!("Polygon mode {:?} unsupported, using Fill", state.polygon_mode);
            polygon = wgpu::PolygonMode::Fill;
        }

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(shader_key(stage)),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module,
                entry_point: Some("vs_main"),
                buffers: &[MeshVertex::LAYOUT],
                compilation_options: Default::default(),
            },
            fragment,
            primitive: wgpu::PrimitiveState {
                topology: state::topology(state.primitive_mode),
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                // Alpha-masked foliage is double-sided; leave culling off
                // across the board like the original pipeline.
                cull_mode: None,
                polygon_mode: polygon,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    }
}
