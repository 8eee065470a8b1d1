//! # Culling — Tiled Light Binning
//!
//! The screen is cut into `TILE_SIZE`-pixel tiles. Once per frame a compute
//! dispatch runs one invocation per tile: it scans the depth-prepass texture
//! for the tile's min/max depth, builds the tile's view-frustum slab, and
//! writes the indices of every light whose influence sphere touches the
//! slab into that tile's slot of the visible-light-index buffer. The
//! shading pass then evaluates only those lights per fragment.
//!
//! ## Plane construction
//!
//! Planes come from row combinations of the view-projection matrix
//! (Gribb/Hartmann), generalized from the full frustum to a sub-frustum:
//! for an NDC bound `x/w >= x_min` the plane is `row0 - x_min * row3`, and
//! symmetrically for the other five bounds. The near/far bounds are the
//! tile's min/max sampled depth, so the slab hugs the visible geometry.
//!
//! The same math is implemented twice: in `light_culling.wgsl` for the GPU
//! pass, and here in [`TileFrustum`] as the reference the tests run
//! against. Keep the two in sync.
//!
//! ## Determinism
//!
//! One invocation owns one tile, so lights are tested strictly in index
//! order and the per-tile list is first-found-in-index-order. Overflow
//! beyond [`MAX_LIGHTS_PER_TILE`] drops later indices silently. A `-1`
//! terminator ends short lists.

use glam::{Mat4, Vec3, Vec4};

use super::uniforms::Light;
use crate::shader::ShaderCache;

/// Screen-space tile edge in pixels.
pub const TILE_SIZE: u32 = 16;

/// Per-tile capacity of the visible-light-index buffer.
pub const MAX_LIGHTS_PER_TILE: usize = 64;

/// Workgroup edge of the culling dispatch; each invocation culls one tile.
pub(crate) const CULL_WORKGROUP: u32 = 8;

/// Tile grid dimensions for a viewport.
pub fn tile_counts(width: u32, height: u32) -> (u32, u32) {
    (width.div_ceil(TILE_SIZE), height.div_ceil(TILE_SIZE))
}

/// One tile's view-frustum slab: four side planes plus near/far from the
/// tile's sampled depth bounds. Plane vectors are `(nx, ny, nz, d)` with
/// inward-facing normals, normalized so plane distances are metric.
#[derive(Debug, Clone, Copy)]
pub struct TileFrustum {
    planes: [Vec4; 6],
}

impl TileFrustum {
    /// Build the frustum for `tile` (tile coordinates, not pixels) under
    /// `view_proj`, with `depth_bounds` = (min, max) in [0, 1].
    pub fn from_tile(
        view_proj: &Mat4,
        screen: (u32, u32),
        tile: (u32, u32),
        depth_bounds: (f32, f32),
    ) -> Self {
        let (width, height) = (screen.0 as f32, screen.1 as f32);

        // Tile pixel rectangle, clamped so edge tiles only cover real pixels.
        let px0 = (tile.0 * TILE_SIZE) as f32;
        let px1 = ((tile.0 + 1) * TILE_SIZE).min(screen.0) as f32;
        let py0 = (tile.1 * TILE_SIZE) as f32;
        let py1 = ((tile.1 + 1) * TILE_SIZE).min(screen.1) as f32;

        let x_min = px0 / width * 2.0 - 1.0;
        let x_max = px1 / width * 2.0 - 1.0;
        // Screen y runs down, NDC y runs up.
        let y_max = 1.0 - 2.0 * py0 / height;
        let y_min = 1.0 - 2.0 * py1 / height;
        let (z_min, z_max) = depth_bounds;

        let r0 = view_proj.row(0);
        let r1 = view_proj.row(1);
        let r2 = view_proj.row(2);
        let r3 = view_proj.row(3);

        let planes = [
            r0 - r3 * x_min, // left:   x/w >= x_min
            r3 * x_max - r0, // right:  x/w <= x_max
            r1 - r3 * y_min, // bottom: y/w >= y_min
            r3 * y_max - r1, // top:    y/w <= y_max
            r2 - r3 * z_min, // near:   z/w >= z_min
            r3 * z_max - r2, // far:    z/w <= z_max
        ];

        Self {
            planes: planes.map(normalize_plane),
        }
    }

    /// Inclusive sphere test: a sphere exactly tangent to a plane counts as
    /// intersecting, so lights on tile boundaries land in both tiles and
    /// shading shows no seams.
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        let p = center.extend(1.0);
        self.planes.iter().all(|plane| plane.dot(p) >= -radius)
    }
}

fn normalize_plane(plane: Vec4) -> Vec4 {
    let len = plane.truncate().length();
    if len > 1e-12 { plane / len } else { plane }
}

/// CPU reference of the per-tile binning the compute shader performs:
/// light indices in ascending order, capped at [`MAX_LIGHTS_PER_TILE`].
pub fn visible_lights(frustum: &TileFrustum, lights: &[Light]) -> Vec<i32> {
    let mut visible = Vec::new();
    for (index, light) in lights.iter().enumerate() {
        if visible.len() == MAX_LIGHTS_PER_TILE {
            break;
        }
        if frustum.intersects_sphere(light.position, light.radius) {
            visible.push(index as i32);
        }
    }
    visible
}

/// The GPU side of the culling stage: bind group layout and compute
/// pipeline. Only constructed when the adapter reports compute support.
pub(crate) struct CullingPass {
    pub bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipeline: Option<wgpu::ComputePipeline>,
    shader_generation: u64,
}

impl CullingPass {
    pub fn new(device: &wgpu::Device) -> Self {
        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("light culling layout"),
                entries: &[
                    // FrameGpu
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    // Lights table (read-only)
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    // Visible-light-index buffer (written per tile)
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: false },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    // Depth-prepass texture
                    wgpu::BindGroupLayoutEntry {
                        binding: 3,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Texture {
                            multisampled: false,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            sample_type: wgpu::TextureSampleType::Depth,
                        },
                        count: None,
                    },
                ],
            });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("light culling pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        Self {
            bind_group_layout,
            pipeline_layout,
            pipeline: None,
            shader_generation: 0,
        }
    }

    /// Build (or rebuild after hot-reload) the compute pipeline. Returns
    /// false if the shader is missing or has never compiled — the culling
    /// stage is then skipped for the frame.
    pub fn ensure_pipeline(&mut self, device: &wgpu::Device, shaders: &ShaderCache) -> bool {
        let Some(program) = shaders.get("light_culling") else {
            return false;
        };
        let Some(module) = program.module() else {
            return false;
        };
        if self.pipeline.is_none() || self.shader_generation != program.generation() {
            self.pipeline = Some(device.create_compute_pipeline(
                &wgpu::ComputePipelineDescriptor {
                    label: Some("light culling pipeline"),
                    layout: Some(&self.pipeline_layout),
                    module,
                    entry_point: Some("cs_main"),
                    compilation_options: Default::default(),
                    cache: None,
                },
            ));
            self.shader_generation = program.generation();
        }
        true
    }

    /// Record the culling dispatch: one invocation per tile.
    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        bind_group: &wgpu::BindGroup,
        tiles: (u32, u32),
    ) {
        let Some(pipeline) = &self.pipeline else {
            return;
        };
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("light culling"),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(
            tiles.0.div_ceil(CULL_WORKGROUP),
            tiles.1.div_ceil(CULL_WORKGROUP),
            1,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // With an identity view-projection, clip space equals world space and
    // w = 1, so NDC coordinates can be read straight off light positions.
    fn identity_tile(tile: (u32, u32), depth: (f32, f32)) -> TileFrustum {
        TileFrustum::from_tile(&Mat4::IDENTITY, (64, 64), tile, depth)
    }

    fn light(position: Vec3, radius: f32) -> Light {
        Light {
            position,
            radius,
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }

    #[test]
    fn tile_counts_round_up() {
        assert_eq!(tile_counts(800, 600), (50, 38));
        assert_eq!(tile_counts(1280, 720), (80, 45));
        assert_eq!(tile_counts(1, 1), (1, 1));
        assert_eq!(tile_counts(16, 16), (1, 1));
        assert_eq!(tile_counts(17, 16), (2, 1));
    }

    #[test]
    fn light_inside_tile_is_visible() {
        // 64x64 screen, 4x4 tiles. Tile (0,0) covers NDC x in [-1,-0.5],
        // y in [0.5,1] (screen y down).
        let frustum = identity_tile((0, 0), (0.0, 1.0));
        assert!(frustum.intersects_sphere(Vec3::new(-0.75, 0.75, 0.5), 0.05));
    }

    #[test]
    fn light_in_other_tile_is_not_visible() {
        let frustum = identity_tile((0, 0), (0.0, 1.0));
        assert!(!frustum.intersects_sphere(Vec3::new(0.75, 0.75, 0.5), 0.05));
        assert!(!frustum.intersects_sphere(Vec3::new(-0.75, -0.75, 0.5), 0.05));
    }

    #[test]
    fn sphere_tangent_to_tile_boundary_is_included() {
        // Tile (0,0)'s right plane sits at NDC x = -0.5. A sphere centered
        // at x = -0.4 with radius 0.1 touches it exactly: inclusive test.
        let frustum = identity_tile((0, 0), (0.0, 1.0));
        assert!(frustum.intersects_sphere(Vec3::new(-0.4, 0.75, 0.5), 0.1));
        // Pull it a hair farther away and it must drop out.
        assert!(!frustum.intersects_sphere(Vec3::new(-0.4 + 1e-4, 0.75, 0.5), 0.1));
    }

    #[test]
    fn light_behind_far_bound_by_more_than_radius_is_excluded() {
        let frustum = identity_tile((0, 0), (0.4, 0.6));
        // z = 0.8 with radius 0.1: 0.1 short of the far bound at 0.6 + r.
        assert!(!frustum.intersects_sphere(Vec3::new(-0.75, 0.75, 0.8), 0.1));
        // Exactly tangent to the far bound: included.
        assert!(frustum.intersects_sphere(Vec3::new(-0.75, 0.75, 0.7), 0.1));
    }

    #[test]
    fn visible_lights_keep_index_order() {
        let frustum = identity_tile((0, 0), (0.0, 1.0));
        let inside = Vec3::new(-0.75, 0.75, 0.5);
        let outside = Vec3::new(0.75, -0.75, 0.5);
        let lights = vec![
            light(inside, 0.05),
            light(outside, 0.05),
            light(inside, 0.05),
            light(inside, 0.05),
        ];
        assert_eq!(visible_lights(&frustum, &lights), vec![0, 2, 3]);
    }

    #[test]
    fn overflow_drops_lights_beyond_cap_in_index_order() {
        let frustum = identity_tile((0, 0), (0.0, 1.0));
        let inside = Vec3::new(-0.75, 0.75, 0.5);
        let lights = vec![light(inside, 0.05); MAX_LIGHTS_PER_TILE + 8];
        let visible = visible_lights(&frustum, &lights);
        assert_eq!(visible.len(), MAX_LIGHTS_PER_TILE);
        // First-found-in-index-order: exactly indices 0..cap.
        assert_eq!(visible[0], 0);
        assert_eq!(*visible.last().unwrap(), MAX_LIGHTS_PER_TILE as i32 - 1);
    }

    #[test]
    fn perspective_frustum_rejects_light_behind_camera() {
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let view_proj = proj * view;
        // Center tile of a 64x64 screen, full depth range.
        let frustum = TileFrustum::from_tile(&view_proj, (64, 64), (1, 1), (0.0, 1.0));
        assert!(frustum.intersects_sphere(Vec3::new(0.0, 0.0, -5.0), 0.5));
        assert!(!frustum.intersects_sphere(Vec3::new(0.0, 0.0, 5.0), 0.5));
    }
}
