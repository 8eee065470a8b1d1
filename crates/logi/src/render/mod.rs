//! Rendering substrate — GPU context and pipeline state tracking.

pub mod gpu;
pub mod state;

pub use gpu::GpuContext;
pub use state::{RenderState, StateTracker};
