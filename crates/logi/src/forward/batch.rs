//! Draw-call descriptors and batch partitioning.
//!
//! An [`Attrib`] describes one draw: transform, geometry, material, texture
//! array indices, and the pipeline state it wants. The application creates
//! one per visible object per frame; the renderer owns the batch only until
//! `flush_attribs` clears it. Nothing here is validated — garbage in,
//! garbage out, at full speed.

use std::sync::Arc;

use glam::Mat4;

use super::mesh::GeometryBuffer;
use super::uniforms::Material;
use crate::render::state::RenderState;

/// One draw-call descriptor. Lives for a single frame.
#[derive(Clone)]
pub struct Attrib {
    /// Model transform.
    pub model: Mat4,
    /// The mesh, shared with the asset layer.
    pub geometry: Arc<GeometryBuffer>,
    pub material: Material,
    /// Texture-array layer indices; -1 means "no texture".
    pub albedo_index: i32,
    pub normal_index: i32,
    pub metallic_index: i32,
    pub roughness_index: i32,
    /// Routes the draw into the alpha-tested sub-pass.
    pub alpha_mask: bool,
    /// Pipeline state for this batch (topology and fill mode are honored;
    /// depth/blend are forced per sub-pass).
    pub state: RenderState,
}

impl Attrib {
    pub fn new(geometry: Arc<GeometryBuffer>) -> Self {
        Self {
            model: Mat4::IDENTITY,
            geometry,
            material: Material::default(),
            albedo_index: -1,
            normal_index: -1,
            metallic_index: -1,
            roughness_index: -1,
            alpha_mask: false,
            state: RenderState::default(),
        }
    }

    pub(crate) fn tex_indices(&self) -> [i32; 4] {
        [
            self.albedo_index,
            self.normal_index,
            self.metallic_index,
            self.roughness_index,
        ]
    }
}

/// Split batch indices into (opaque, alpha-tested), preserving insertion
/// order inside each sub-pass.
pub(crate) fn partition_by_mask(masks: impl Iterator<Item = bool>) -> (Vec<usize>, Vec<usize>) {
    let mut opaque = Vec::new();
    let mut alpha = Vec::new();
    for (index, mask) in masks.enumerate() {
        if mask {
            alpha.push(index);
        } else {
            opaque.push(index);
        }
    }
    (opaque, alpha)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_preserves_insertion_order() {
        let masks = [false, true, false, false, true];
        let (opaque, alpha) = partition_by_mask(masks.into_iter());
        assert_eq!(opaque, vec![0, 2, 3]);
        assert_eq!(alpha, vec![1, 4]);
    }

    #[test]
    fn partition_counts_sum_to_batch_size() {
        let masks = [true, true, false, true, false, false, false];
        let (opaque, alpha) = partition_by_mask(masks.into_iter());
        assert_eq!(opaque.len() + alpha.len(), masks.len());
    }

    #[test]
    fn empty_batch_partitions_empty() {
        let (opaque, alpha) = partition_by_mask(std::iter::empty());
        assert!(opaque.is_empty());
        assert!(alpha.is_empty());
    }
}
