//! # RenderState — Pipeline State Tracking and Diffing
//!
//! GL-style renderers mutate one global pipeline state; wgpu bakes state
//! into immutable pipeline objects. This module keeps the useful half of
//! the old model: a [`RenderState`] snapshot per draw batch and a
//! [`StateTracker`] that diffs requested state against the live state, so
//! the pass recorder only rebinds a pipeline variant when something
//! actually changed.
//!
//! The tracker is the single authority on live state: every state change
//! during a frame goes through it, and anything that flips state
//! temporarily (overlays, the draw orchestrator itself) snapshots
//! `current()` on entry and replays it with `set_state` on exit.

/// Primitive topology for a draw batch. The closed set wgpu supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveMode {
    Points,
    Lines,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
}

/// Polygon rasterization mode. `Line` and `Point` require optional
/// hardware features; pipelines fall back to `Fill` without them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
    Point,
}

/// Depth comparison function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthFunc {
    Never,
    #[default]
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Destination blend factor. The source factor is always `SrcAlpha`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendFunc {
    #[default]
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    Constant,
    OneMinusConstant,
}

/// One pipeline-state snapshot: topology, fill mode, depth and blend
/// configuration. Attached to every draw batch; diffed by [`StateTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderState {
    pub primitive_mode: PrimitiveMode,
    pub polygon_mode: PolygonMode,
    pub depth_func: DepthFunc,
    pub blend_func: BlendFunc,
    pub depth_test: bool,
    pub blending: bool,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            primitive_mode: PrimitiveMode::Triangles,
            polygon_mode: PolygonMode::Fill,
            depth_func: DepthFunc::Less,
            blend_func: BlendFunc::Zero,
            depth_test: true,
            blending: true,
        }
    }
}

// ── Enum → wgpu lookup tables ───────────────────────────────────────────────
// A fixed closed set maps cleanest as an indexed table, not trait dispatch.

pub(crate) fn topology(mode: PrimitiveMode) -> wgpu::PrimitiveTopology {
    const TABLE: [wgpu::PrimitiveTopology; 5] = [
        wgpu::PrimitiveTopology::PointList,
        wgpu::PrimitiveTopology::LineList,
        wgpu::PrimitiveTopology::LineStrip,
        wgpu::PrimitiveTopology::TriangleList,
        wgpu::PrimitiveTopology::TriangleStrip,
    ];
    TABLE[mode as usize]
}

pub(crate) fn polygon_mode(mode: PolygonMode) -> wgpu::PolygonMode {
    const TABLE: [wgpu::PolygonMode; 3] = [
        wgpu::PolygonMode::Fill,
        wgpu::PolygonMode::Line,
        wgpu::PolygonMode::Point,
    ];
    TABLE[mode as usize]
}

pub(crate) fn compare_function(func: DepthFunc) -> wgpu::CompareFunction {
    const TABLE: [wgpu::CompareFunction; 8] = [
        wgpu::CompareFunction::Never,
        wgpu::CompareFunction::Less,
        wgpu::CompareFunction::Equal,
        wgpu::CompareFunction::LessEqual,
        wgpu::CompareFunction::Greater,
        wgpu::CompareFunction::NotEqual,
        wgpu::CompareFunction::GreaterEqual,
        wgpu::CompareFunction::Always,
    ];
    TABLE[func as usize]
}

pub(crate) fn blend_factor(func: BlendFunc) -> wgpu::BlendFactor {
    const TABLE: [wgpu::BlendFactor; 12] = [
        wgpu::BlendFactor::Zero,
        wgpu::BlendFactor::One,
        wgpu::BlendFactor::Src,
        wgpu::BlendFactor::OneMinusSrc,
        wgpu::BlendFactor::Dst,
        wgpu::BlendFactor::OneMinusDst,
        wgpu::BlendFactor::SrcAlpha,
        wgpu::BlendFactor::OneMinusSrcAlpha,
        wgpu::BlendFactor::DstAlpha,
        wgpu::BlendFactor::OneMinusDstAlpha,
        wgpu::BlendFactor::Constant,
        wgpu::BlendFactor::OneMinusConstant,
    ];
    TABLE[func as usize]
}

/// The blend state a [`RenderState`] maps to, or `None` with blending off.
pub(crate) fn blend_state(state: &RenderState) -> Option<wgpu::BlendState> {
    if !state.blending {
        return None;
    }
    Some(wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::SrcAlpha,
            dst_factor: blend_factor(state.blend_func),
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: blend_factor(state.blend_func),
            operation: wgpu::BlendOperation::Add,
        },
    })
}

/// Tracks the live pipeline state and suppresses redundant transitions.
///
/// Each `switch_*` is a no-op unless the requested value differs from the
/// tracked value; a real change bumps the transition counter and returns
/// `true`, telling the caller a pipeline rebind is due.
#[derive(Debug, Clone)]
pub struct StateTracker {
    current: RenderState,
    transitions: u64,
}

impl StateTracker {
    pub fn new() -> Self {
        Self {
            current: RenderState::default(),
            transitions: 0,
        }
    }

    /// The state most recently requested (and therefore live).
    pub fn current(&self) -> RenderState {
        self.current
    }

    /// Total state transitions actually issued since creation.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    pub fn switch_primitive_mode(&mut self, mode: PrimitiveMode) -> bool {
        if mode != self.current.primitive_mode {
            self.current.primitive_mode = mode;
            self.transitions += 1;
            return true;
        }
        false
    }

    pub fn switch_polygon_mode(&mut self, mode: PolygonMode) -> bool {
        if mode != self.current.polygon_mode {
            self.current.polygon_mode = mode;
            self.transitions += 1;
            return true;
        }
        false
    }

    pub fn switch_depth_func(&mut self, func: DepthFunc) -> bool {
        if func != self.current.depth_func {
            self.current.depth_func = func;
            self.transitions += 1;
            return true;
        }
        false
    }

    pub fn switch_depth_test(&mut self, enabled: bool) -> bool {
        if enabled != self.current.depth_test {
            self.current.depth_test = enabled;
            self.transitions += 1;
            return true;
        }
        false
    }

    pub fn switch_blend_func(&mut self, func: BlendFunc) -> bool {
        if func != self.current.blend_func {
            self.current.blend_func = func;
            self.transitions += 1;
            return true;
        }
        false
    }

    pub fn switch_blending(&mut self, enabled: bool) -> bool {
        if enabled != self.current.blending {
            self.current.blending = enabled;
            self.transitions += 1;
            return true;
        }
        false
    }

    /// Apply a full state snapshot. Every field goes through its switch, so
    /// only the differing fields count as transitions. Returns whether any
    /// transition was issued.
    pub fn set_state(&mut self, state: RenderState) -> bool {
        let mut changed = false;
        changed |= self.switch_primitive_mode(state.primitive_mode);
        changed |= self.switch_polygon_mode(state.polygon_mode);
        changed |= self.switch_depth_func(state.depth_func);
        changed |= self.switch_depth_test(state.depth_test);
        changed |= self.switch_blend_func(state.blend_func);
        changed |= self.switch_blending(state.blending);
        changed
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_is_idempotent() {
        let mut tracker = StateTracker::new();
        assert!(tracker.switch_depth_test(false));
        assert_eq!(tracker.transitions(), 1);
        // Same value again: no transition issued.
        assert!(!tracker.switch_depth_test(false));
        assert_eq!(tracker.transitions(), 1);
    }

    #[test]
    fn switch_back_and_forth_counts_each_change() {
        let mut tracker = StateTracker::new();
        tracker.switch_blending(false);
        tracker.switch_blending(true);
        tracker.switch_blending(false);
        assert_eq!(tracker.transitions(), 3);
    }

    #[test]
    fn set_state_only_issues_differing_fields() {
        let mut tracker = StateTracker::new();
        let mut state = RenderState::default();
        state.depth_func = DepthFunc::Equal;
        state.blending = false;

        assert!(tracker.set_state(state));
        assert_eq!(tracker.transitions(), 2);
        assert_eq!(tracker.current(), state);

        // Replaying the same snapshot is a full no-op.
        assert!(!tracker.set_state(state));
        assert_eq!(tracker.transitions(), 2);
    }

    #[test]
    fn save_restore_round_trip() {
        let mut tracker = StateTracker::new();
        let backup = tracker.current();

        tracker.switch_depth_func(DepthFunc::Always);
        tracker.switch_polygon_mode(PolygonMode::Line);
        tracker.set_state(backup);

        assert_eq!(tracker.current(), backup);
    }

    #[test]
    fn default_state_matches_tracker_start() {
        let tracker = StateTracker::new();
        assert_eq!(tracker.current(), RenderState::default());
        assert_eq!(tracker.transitions(), 0);
    }

    #[test]
    fn lookup_tables_cover_every_variant() {
        // Spot-check the ends of each table; an off-by-one here would
        // silently bind the wrong fixed-function state.
        assert_eq!(
            topology(PrimitiveMode::Points),
            wgpu::PrimitiveTopology::PointList
        );
        assert_eq!(
            topology(PrimitiveMode::TriangleStrip),
            wgpu::PrimitiveTopology::TriangleStrip
        );
        assert_eq!(
            compare_function(DepthFunc::Never),
            wgpu::CompareFunction::Never
        );
        assert_eq!(
            compare_function(DepthFunc::Always),
            wgpu::CompareFunction::Always
        );
        assert_eq!(blend_factor(BlendFunc::Zero), wgpu::BlendFactor::Zero);
        assert_eq!(
            blend_factor(BlendFunc::OneMinusConstant),
            wgpu::BlendFactor::OneMinusConstant
        );
    }

    #[test]
    fn blending_disabled_maps_to_no_blend_state() {
        let mut state = RenderState::default();
        state.blending = false;
        assert!(blend_state(&state).is_none());
        state.blending = true;
        assert!(blend_state(&state).is_some());
    }
}
