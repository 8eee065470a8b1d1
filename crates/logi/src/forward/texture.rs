//! # Texture — Image Resources and the Indexed Texture Array
//!
//! [`Texture`] is a single 2D image with a CPU-generated mip chain.
//! [`TextureArray`] deduplicates a list of image paths by exact string
//! equality and packs the unique set into one `D2Array` texture, so a whole
//! scene's materials can be bound once and indexed per draw from the
//! per-draw uniforms.
//!
//! Layer lookup is an exact-match table: [`TextureArray::texture_index`]
//! returns `-1` (and logs) for unknown names, and callers must treat `-1`
//! as "no texture" — it flows straight into the material's presence flags.
//!
//! Mip generation happens on the CPU with `image`'s resize before upload.
//! For the texture sizes a scene loader hands us this is a one-time cost at
//! load, and it keeps the GPU side a plain `create_texture_with_data`.

use std::collections::HashMap;
use std::fmt;

use image::RgbaImage;
use wgpu::util::DeviceExt;

/// An error loading or decoding a texture source image.
#[derive(Debug)]
pub enum TextureError {
    /// The file could not be read or decoded into pixels.
    Decode {
        path: String,
        detail: String,
    },
    /// An array was requested from an empty path list.
    EmptyArray,
}

impl fmt::Display for TextureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureError::Decode { path, detail } => {
                write!(f, "Cannot load texture '{path}': {detail}")
            }
            TextureError::EmptyArray => write!(f, "Texture array has no usable layers"),
        }
    }
}

impl std::error::Error for TextureError {}

/// Number of mip levels for a full chain down to 1×1.
pub(crate) fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Build the full mip chain for an image, level 0 included.
fn build_mip_chain(base: RgbaImage) -> Vec<RgbaImage> {
    let levels = mip_level_count(base.width(), base.height());
    let mut chain = Vec::with_capacity(levels as usize);
    chain.push(base);
    for level in 1..levels {
        let prev = &chain[(level - 1) as usize];
        let w = (prev.width() / 2).max(1);
        let h = (prev.height() / 2).max(1);
        chain.push(image::imageops::resize(
            prev,
            w,
            h,
            image::imageops::FilterType::Triangle,
        ));
    }
    chain
}

/// The deduplicated name → layer-index table behind a [`TextureArray`].
///
/// Duplicate names collapse to the first occurrence's layer; empty names
/// (meshes without that texture) are dropped entirely.
#[derive(Debug, Clone, Default)]
pub(crate) struct ArrayLayout {
    names: Vec<String>,
    index: HashMap<String, i32>,
}

impl ArrayLayout {
    pub fn new(requested: &[String]) -> Self {
        let mut layout = ArrayLayout::default();
        for name in requested {
            if name.is_empty() {
                continue;
            }
            if !layout.index.contains_key(name) {
                layout.index.insert(name.clone(), layout.names.len() as i32);
                layout.names.push(name.clone());
            }
        }
        layout
    }

    pub fn unique_names(&self) -> &[String] {
        &self.names
    }

    pub fn lookup(&self, name: &str) -> Option<i32> {
        self.index.get(name).copied()
    }
}

/// One GPU 2D texture with mips. The handle is exclusively owned; dropping
/// the struct releases the GPU resource.
pub struct Texture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl Texture {
    /// Decode an image file and upload it. Decode failure is a hard error —
    /// the caller asked for this specific file.
    pub fn from_path(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        path: &str,
    ) -> Result<Self, TextureError> {
        let img = image::open(path)
            .map_err(|e| TextureError::Decode {
                path: path.to_owned(),
                detail: e.to_string(),
            })?
            .to_rgba8();
        Ok(Self::from_rgba8(device, queue, path, img))
    }

    /// Upload decoded RGBA8 pixels with a full mip chain.
    pub fn from_rgba8(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        img: RgbaImage,
    ) -> Self {
        let (width, height) = img.dimensions();
        let chain = build_mip_chain(img);
        let mut data = Vec::new();
        for level in &chain {
            data.extend_from_slice(level.as_raw());
        }

        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: chain.len() as u32,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &data,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            width,
            height,
        }
    }
}

/// A deduplicated set of same-purpose images packed into one indexed
/// 2D-array texture (one array per material channel: albedo, normal, ...).
///
/// Shared across many draw batches within a frame through `Arc` — read-only
/// sharing, never concurrent mutation.
pub struct TextureArray {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    layout: ArrayLayout,
    width: u32,
    height: u32,
}

impl TextureArray {
    /// Decode and pack the unique set of `paths`. All layers take the first
    /// image's dimensions; mismatched images are resized to fit (logged).
    /// A decode failure is a hard error, an empty unique set yields
    /// [`TextureError::EmptyArray`].
    pub fn from_paths(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        paths: &[String],
    ) -> Result<Self, TextureError> {
        let layout = ArrayLayout::new(paths);
        if layout.unique_names().is_empty() {
            return Err(TextureError::EmptyArray);
        }

        let mut images = Vec::with_capacity(layout.unique_names().len());
        for path in layout.unique_names() {
            let img = image::open(path)
                .map_err(|e| TextureError::Decode {
                    path: path.clone(),
                    detail: e.to_string(),
                })?
                .to_rgba8();
            images.push(img);
        }

        let (width, height) = images[0].dimensions();
        for (img, path) in images.iter_mut().zip(layout.unique_names()) {
            if img.dimensions() != (width, height) {
                log::warn!(
                    "Texture '{}' is {}x{}, resizing to array dimensions {}x{}",
                    path,
                    img.width(),
                    img.height(),
                    width,
                    height
                );
                *img = image::imageops::resize(
                    img,
                    width,
                    height,
                    image::imageops::FilterType::Triangle,
                );
            }
        }

        Ok(Self::from_images(device, queue, label, layout, images))
    }

    /// A single-layer solid-color array, bound wherever the caller supplied
    /// no texture array at all. The shader still sees a valid binding.
    pub fn solid(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        rgba: [u8; 4],
    ) -> Self {
        let mut img = RgbaImage::new(1, 1);
        img.put_pixel(0, 0, image::Rgba(rgba));
        Self::from_images(device, queue, label, ArrayLayout::default(), vec![img])
    }

    fn from_images(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        layout: ArrayLayout,
        images: Vec<RgbaImage>,
    ) -> Self {
        let (width, height) = images[0].dimensions();
        let layers = images.len() as u32;
        let mips = mip_level_count(width, height);

        // Layer-major: all mips of layer 0, then layer 1, ...
        let mut data = Vec::new();
        for img in images {
            for level in build_mip_chain(img) {
                data.extend_from_slice(level.as_raw());
            }
        }

        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: layers,
                },
                mip_level_count: mips,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &data,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });

        Self {
            texture,
            view,
            layout,
            width,
            height,
        }
    }

    /// Exact-match layer lookup. `-1` means "no texture" and must never be
    /// used as a layer index.
    pub fn texture_index(&self, name: &str) -> i32 {
        match self.layout.lookup(name) {
            Some(index) => index,
            None => {
                log::warn!("Texture '{name}' not in array, using -1");
                -1
            }
        }
    }

    pub fn layer_count(&self) -> u32 {
        self.texture.depth_or_array_layers()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn layout_dedupes_exact_matches() {
        let layout = ArrayLayout::new(&names(&[
            "stone.png",
            "wood.png",
            "stone.png",
            "cloth.png",
            "wood.png",
        ]));
        assert_eq!(layout.unique_names().len(), 3);
        // Both occurrences of a duplicate resolve to the same layer.
        assert_eq!(layout.lookup("stone.png"), Some(0));
        assert_eq!(layout.lookup("wood.png"), Some(1));
        assert_eq!(layout.lookup("cloth.png"), Some(2));
    }

    #[test]
    fn layout_drops_empty_names() {
        let layout = ArrayLayout::new(&names(&["", "a.png", "", "b.png"]));
        assert_eq!(layout.unique_names().len(), 2);
        assert_eq!(layout.lookup(""), None);
    }

    #[test]
    fn layout_miss_is_none() {
        let layout = ArrayLayout::new(&names(&["a.png"]));
        assert_eq!(layout.lookup("missing.png"), None);
    }

    #[test]
    fn near_match_does_not_resolve() {
        // Lookup is exact string equality, not path normalization.
        let layout = ArrayLayout::new(&names(&["textures/a.png"]));
        assert_eq!(layout.lookup("a.png"), None);
        assert_eq!(layout.lookup("./textures/a.png"), None);
    }

    #[test]
    fn mip_count_covers_full_chain() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 2), 2);
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(640, 480), 10);
        assert_eq!(mip_level_count(0, 0), 1);
    }

    #[test]
    fn mip_chain_halves_down_to_one_pixel() {
        let base = RgbaImage::new(8, 4);
        let chain = build_mip_chain(base);
        let dims: Vec<(u32, u32)> = chain.iter().map(|i| i.dimensions()).collect();
        assert_eq!(dims, vec![(8, 4), (4, 2), (2, 1), (1, 1)]);
    }
}
