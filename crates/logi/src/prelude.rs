//! Common imports: `use logi::prelude::*`.

pub use crate::config::RenderConfig;
pub use crate::forward::batch::Attrib;
pub use crate::forward::mesh::{GeometryBuffer, MeshVertex};
pub use crate::forward::texture::TextureArray;
pub use crate::forward::uniforms::{FrameUniforms, Light, Lights, Material, NUM_LIGHTS};
pub use crate::forward::Renderer;
pub use crate::render::gpu::GpuContext;
pub use crate::render::state::{BlendFunc, DepthFunc, PolygonMode, PrimitiveMode, RenderState};

pub use glam::{Mat4, Vec2, Vec3, Vec4};
