//! # Logi — Forward+ Tiled Renderer
//!
//! A real-time 3D renderer built around a Forward+ (tiled forward) pipeline:
//! a depth prepass, a compute pass that bins point lights into screen-space
//! tiles, and a shading pass that only evaluates the lights assigned to each
//! tile.
//!
//! Create a [`render::GpuContext`] for a window, then drive a
//! [`forward::Renderer`] once per frame: fill `renderer.uniforms`, queue
//! draw batches with [`forward::Renderer::add_attrib`], call `draw`, then
//! `present`.

pub mod config;
pub mod forward;
pub mod prelude;
pub mod render;
pub mod shader;

#[cfg(feature = "overlay")]
pub mod overlay;
