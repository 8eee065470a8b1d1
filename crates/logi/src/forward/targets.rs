//! Off-screen render targets and resolution-dependent sizing.
//!
//! The depth-prepass target and the HDR accumulation target (color + its
//! own depth attachment) live here, together with [`ResolutionDeps`], the
//! one place that computes how big every resolution-dependent resource must
//! be. On resize the targets are dropped and recreated wholesale — no
//! incremental reallocation.
//!
//! Between the prepass and the shading pass the prepass depth is blitted
//! into the HDR target's depth attachment (`blit_depth`), so shading reuses
//! the exact depth the culling pass saw without re-rendering geometry.

use super::culling::{tile_counts, MAX_LIGHTS_PER_TILE};

/// Depth format shared by the prepass target and the HDR depth attachment.
pub(crate) const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Light-accumulation format; resolved to the swapchain by the assembly pass.
pub(crate) const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Sizing rules for every resolution-dependent buffer. After a resize,
/// each allocated resource must agree with these numbers exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionDeps {
    pub width: u32,
    pub height: u32,
}

impl ResolutionDeps {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    pub fn tile_counts(&self) -> (u32, u32) {
        tile_counts(self.width, self.height)
    }

    /// Total `i32` entries in the visible-light-index buffer.
    pub fn visible_index_count(&self) -> u64 {
        let (tx, ty) = self.tile_counts();
        tx as u64 * ty as u64 * MAX_LIGHTS_PER_TILE as u64
    }

    /// Byte size of the visible-light-index buffer.
    pub fn visible_buffer_bytes(&self) -> u64 {
        self.visible_index_count() * std::mem::size_of::<i32>() as u64
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// The two off-screen targets, always sized for the current viewport.
pub(crate) struct Targets {
    pub depth_texture: wgpu::Texture,
    pub depth_view: wgpu::TextureView,
    pub hdr_texture: wgpu::Texture,
    pub hdr_view: wgpu::TextureView,
    pub hdr_depth_texture: wgpu::Texture,
    pub hdr_depth_view: wgpu::TextureView,
    pub deps: ResolutionDeps,
}

impl Targets {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let deps = ResolutionDeps::new(width, height);
        let extent = wgpu::Extent3d {
            width: deps.width,
            height: deps.height,
            depth_or_array_layers: 1,
        };

        let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth prepass target"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let depth_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let hdr_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("hdr accumulation target"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: HDR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let hdr_view = hdr_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let hdr_depth_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("hdr depth attachment"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let hdr_depth_view =
            hdr_depth_texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            depth_texture,
            depth_view,
            hdr_texture,
            hdr_view,
            hdr_depth_texture,
            hdr_depth_view,
            deps,
        }
    }

    /// Copy the prepass depth into the HDR target's depth attachment.
    pub fn blit_depth(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.copy_texture_to_texture(
            self.depth_texture.as_image_copy(),
            self.hdr_depth_texture.as_image_copy(),
            wgpu::Extent3d {
                width: self.deps.width,
                height: self.deps.height,
                depth_or_array_layers: 1,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visible_buffer_matches_tile_grid() {
        let deps = ResolutionDeps::new(800, 600);
        assert_eq!(deps.tile_counts(), (50, 38));
        assert_eq!(deps.visible_index_count(), 50 * 38 * 64);
        assert_eq!(deps.visible_buffer_bytes(), 50 * 38 * 64 * 4);
    }

    #[test]
    fn odd_sizes_round_tiles_up() {
        let deps = ResolutionDeps::new(801, 601);
        assert_eq!(deps.tile_counts(), (51, 38));
    }

    #[test]
    fn zero_size_clamps_to_one_pixel() {
        let deps = ResolutionDeps::new(0, 0);
        assert_eq!((deps.width, deps.height), (1, 1));
        assert_eq!(deps.tile_counts(), (1, 1));
        assert_eq!(deps.pixel_count(), 1);
    }

    #[test]
    fn resize_changes_every_dependent_size() {
        let before = ResolutionDeps::new(1280, 720);
        let after = ResolutionDeps::new(1920, 1080);
        assert_ne!(before.tile_counts(), after.tile_counts());
        assert_ne!(before.visible_buffer_bytes(), after.visible_buffer_bytes());
        assert_eq!(after.tile_counts(), (120, 68));
    }
}
