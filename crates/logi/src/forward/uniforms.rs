//! # Uniforms — Per-Frame Data and Its GPU Layouts
//!
//! Two families of types live here. The caller-facing structs
//! ([`FrameUniforms`], [`Light`], [`Material`]) use glam types and are
//! rewritten wholesale by the application once per frame. Their GPU mirrors
//! (`*Gpu`) are `bytemuck` POD structs whose layout matches the WGSL
//! declarations byte for byte — the padding fields are load-bearing, and
//! the size assertions in the tests below pin them down.
//!
//! ## Buffer layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Group 0 — FrameGpu (per frame, uniform)                      │
//! │   view/proj/inv_proj/view_proj + camera + tiling + flags     │
//! │   304 bytes                                                  │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Group 1 — LightsGpu (per frame; storage, or uniform on the   │
//! │   no-compute fallback)   32 bytes × NUM_LIGHTS               │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Group 3 — DrawGpu (per draw, dynamic offset)                 │
//! │   model + normal matrix + material + texture indices         │
//! │   304 bytes per slot (aligned up to the device minimum)      │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use super::texture::TextureArray;

/// Fixed capacity of the light table. The table is a flat snapshot, not a
/// dynamic collection; a light's index is its identity in the culling pass.
pub const NUM_LIGHTS: usize = 128;

/// One point light. Populated by the simulation layer each frame; the
/// renderer copies the whole table to the GPU as a read-only snapshot.
#[derive(Debug, Clone, Copy)]
pub struct Light {
    /// World-space position.
    pub position: Vec3,
    /// Influence cutoff radius. Zero disables the light.
    pub radius: f32,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            radius: 0.0,
            color: Vec3::ONE,
            intensity: 0.0,
        }
    }
}

/// The full fixed-size light table.
#[derive(Debug, Clone, Copy)]
pub struct Lights {
    pub lights: [Light; NUM_LIGHTS],
}

impl Default for Lights {
    fn default() -> Self {
        Self {
            lights: [Light::default(); NUM_LIGHTS],
        }
    }
}

/// PBR material record, one per draw batch. Immutable once produced by the
/// asset layer; copied by value into the per-draw uniform slot each frame.
#[derive(Debug, Clone, Copy)]
pub struct Material {
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub transmittance: Vec3,
    pub emission: Vec3,
    pub shininess: f32,
    pub ior: f32,
    pub opacity: f32,
    pub roughness: f32,
    pub metallic: f32,
    pub sheen: f32,
    pub clearcoat_thickness: f32,
    pub clearcoat_roughness: f32,
    pub anisotropy: f32,
    pub anisotropy_rotation: f32,
    /// Fragments below this alpha are discarded in the alpha-tested sub-pass.
    pub alpha_cutoff: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            ambient: Vec3::splat(0.02),
            diffuse: Vec3::splat(0.8),
            specular: Vec3::splat(0.5),
            transmittance: Vec3::ZERO,
            emission: Vec3::ZERO,
            shininess: 32.0,
            ior: 1.45,
            opacity: 1.0,
            roughness: 0.5,
            metallic: 0.0,
            sheen: 0.0,
            clearcoat_thickness: 0.0,
            clearcoat_roughness: 0.0,
            anisotropy: 0.0,
            anisotropy_rotation: 0.0,
            alpha_cutoff: 0.5,
        }
    }
}

/// Per-frame globals, written by the caller before `draw()` and treated as
/// read-only for the rest of the frame.
#[derive(Clone, Default)]
pub struct FrameUniforms {
    pub view: Mat4,
    pub proj: Mat4,
    pub inv_proj: Mat4,
    pub view_proj: Mat4,
    /// World-space camera position.
    pub view_pos: Vec3,
    /// Elapsed time in seconds.
    pub time: f32,
    pub lights: Lights,
    pub albedo_array: Option<Arc<TextureArray>>,
    pub normal_array: Option<Arc<TextureArray>>,
    pub metallic_array: Option<Arc<TextureArray>>,
    pub roughness_array: Option<Arc<TextureArray>>,
    /// Shading debug visualization toggle.
    pub debug: bool,
    /// Draw a gizmo at every light position.
    pub light_debug: bool,
}

// ── GPU mirrors ─────────────────────────────────────────────────────────────

/// One light as the shaders see it. 32 bytes: the radius and intensity ride
/// in the vec3 padding slots.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct LightGpu {
    pub position: [f32; 3], // 12 bytes
    pub radius: f32,        // 4 bytes
    pub color: [f32; 3],    // 12 bytes
    pub intensity: f32,     // 4 bytes → total 32
}

impl From<&Light> for LightGpu {
    fn from(light: &Light) -> Self {
        Self {
            position: light.position.to_array(),
            radius: light.radius,
            color: light.color.to_array(),
            intensity: light.intensity,
        }
    }
}

/// The whole light table, uploaded with a single write each frame.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct LightsGpu {
    pub lights: [LightGpu; NUM_LIGHTS],
}

impl From<&Lights> for LightsGpu {
    fn from(lights: &Lights) -> Self {
        let mut out = LightsGpu::zeroed();
        for (dst, src) in out.lights.iter_mut().zip(lights.lights.iter()) {
            *dst = LightGpu::from(src);
        }
        out
    }
}

/// Frame globals as the shaders see them. 304 bytes.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct FrameGpu {
    pub view: [[f32; 4]; 4],     // 64 bytes
    pub proj: [[f32; 4]; 4],     // 64 bytes
    pub inv_proj: [[f32; 4]; 4], // 64 bytes
    pub view_proj: [[f32; 4]; 4], // 64 bytes → 256
    pub view_pos: [f32; 3],      // 12 bytes
    pub time: f32,               // 4 bytes → 272
    pub screen_size: [u32; 2],   // 8 bytes
    pub tile_count: [u32; 2],    // 8 bytes → 288
    pub num_lights: u32,
    pub max_lights_per_tile: u32,
    pub debug: u32,
    pub light_debug: u32,        // 16 bytes → 304
}

/// Material parameters in WGSL layout. 144 bytes.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct MaterialGpu {
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    pub transmittance: [f32; 4],
    pub emission: [f32; 4],       // 80
    pub shininess: f32,
    pub ior: f32,
    pub opacity: f32,
    pub roughness: f32,           // 96
    pub metallic: f32,
    pub sheen: f32,
    pub clearcoat_thickness: f32,
    pub clearcoat_roughness: f32, // 112
    pub anisotropy: f32,
    pub anisotropy_rotation: f32,
    pub alpha_cutoff: f32,
    pub _pad0: f32,               // 128
    pub has_albedo: u32,
    pub has_normal: u32,
    pub has_metallic: u32,
    pub has_roughness: u32,       // 144
}

impl Material {
    /// Pack for GPU upload. Texture-presence flags come from the batch's
    /// texture-array indices: -1 means "no texture".
    pub(crate) fn to_gpu(&self, tex_indices: [i32; 4]) -> MaterialGpu {
        MaterialGpu {
            ambient: self.ambient.extend(1.0).to_array(),
            diffuse: self.diffuse.extend(1.0).to_array(),
            specular: self.specular.extend(1.0).to_array(),
            transmittance: self.transmittance.extend(1.0).to_array(),
            emission: self.emission.extend(1.0).to_array(),
            shininess: self.shininess,
            ior: self.ior,
            opacity: self.opacity,
            roughness: self.roughness,
            metallic: self.metallic,
            sheen: self.sheen,
            clearcoat_thickness: self.clearcoat_thickness,
            clearcoat_roughness: self.clearcoat_roughness,
            anisotropy: self.anisotropy,
            anisotropy_rotation: self.anisotropy_rotation,
            alpha_cutoff: self.alpha_cutoff,
            _pad0: 0.0,
            has_albedo: (tex_indices[0] >= 0) as u32,
            has_normal: (tex_indices[1] >= 0) as u32,
            has_metallic: (tex_indices[2] >= 0) as u32,
            has_roughness: (tex_indices[3] >= 0) as u32,
        }
    }
}

/// Per-draw data, written at a dynamic offset into one shared uniform
/// buffer. 304 bytes (aligned up to the device stride when written).
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct DrawGpu {
    pub model: [[f32; 4]; 4],         // 64 bytes
    pub normal_matrix: [[f32; 4]; 4], // 64 bytes → 128
    pub material: MaterialGpu,        // 144 bytes → 272
    pub tex_indices: [i32; 4],        // 16 bytes → 288
    pub alpha_mask: u32,
    pub _pad: [u32; 3],               // 16 bytes → 304
}

impl FrameUniforms {
    /// Pack the frame globals. `tile_count` comes from the current
    /// resolution-dependent buffers, not from the caller.
    pub(crate) fn to_gpu(
        &self,
        screen_size: (u32, u32),
        tile_count: (u32, u32),
    ) -> FrameGpu {
        FrameGpu {
            view: self.view.to_cols_array_2d(),
            proj: self.proj.to_cols_array_2d(),
            inv_proj: self.inv_proj.to_cols_array_2d(),
            view_proj: self.view_proj.to_cols_array_2d(),
            view_pos: self.view_pos.to_array(),
            time: self.time,
            screen_size: [screen_size.0, screen_size.1],
            tile_count: [tile_count.0, tile_count.1],
            num_lights: NUM_LIGHTS as u32,
            max_lights_per_tile: super::culling::MAX_LIGHTS_PER_TILE as u32,
            debug: self.debug as u32,
            light_debug: self.light_debug as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn gpu_struct_sizes_match_wgsl() {
        assert_eq!(size_of::<LightGpu>(), 32);
        assert_eq!(size_of::<LightsGpu>(), 32 * NUM_LIGHTS);
        assert_eq!(size_of::<FrameGpu>(), 304);
        assert_eq!(size_of::<MaterialGpu>(), 144);
        assert_eq!(size_of::<DrawGpu>(), 304);
    }

    #[test]
    fn gpu_struct_sizes_are_uniform_aligned() {
        // WGSL requires uniform struct sizes to round to 16 bytes.
        assert_eq!(size_of::<FrameGpu>() % 16, 0);
        assert_eq!(size_of::<MaterialGpu>() % 16, 0);
        assert_eq!(size_of::<DrawGpu>() % 16, 0);
        assert_eq!(size_of::<LightsGpu>() % 16, 0);
    }

    #[test]
    fn texture_presence_flags_follow_indices() {
        let gpu = Material::default().to_gpu([3, -1, 0, -1]);
        assert_eq!(gpu.has_albedo, 1);
        assert_eq!(gpu.has_normal, 0);
        assert_eq!(gpu.has_metallic, 1);
        assert_eq!(gpu.has_roughness, 0);
    }

    #[test]
    fn default_light_is_disabled() {
        let light = Light::default();
        assert_eq!(light.radius, 0.0);
        assert_eq!(light.intensity, 0.0);
    }

    #[test]
    fn lights_snapshot_round_trips_fields() {
        let mut lights = Lights::default();
        lights.lights[5] = Light {
            position: Vec3::new(1.0, 2.0, 3.0),
            radius: 4.5,
            color: Vec3::new(0.1, 0.2, 0.3),
            intensity: 2.0,
        };
        let gpu = LightsGpu::from(&lights);
        assert_eq!(gpu.lights[5].position, [1.0, 2.0, 3.0]);
        assert_eq!(gpu.lights[5].radius, 4.5);
        assert_eq!(gpu.lights[5].intensity, 2.0);
        assert_eq!(gpu.lights[0].radius, 0.0);
    }
}
