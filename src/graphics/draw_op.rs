//! Queued draw operations and their render state.
//!
//! A `DrawOp` is one primitive instance, stamped at submission time with
//! the active transform, effective clip rect, Z value, and blend mode. Ops
//! are immutable once created and owned by the queue until flush or
//! compile consumes them.

use std::sync::Arc;

use crate::graphics::clip_stack::ClipRect;
use crate::graphics::color::Color;
use crate::graphics::renderer::{GpuVertex, TextureId};
use crate::graphics::transform::Transform;

/// How source pixels combine with the framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// Straight-alpha source-over blending.
    #[default]
    Alpha,
    /// Additive: destination plus alpha-scaled source.
    Additive,
    /// Modulate: destination times source.
    Multiply,
}

/// One untransformed vertex as submitted by application code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub x: f32,
    pub y: f32,
    pub color: Color,
}

impl Vertex {
    pub const fn new(x: f32, y: f32, color: Color) -> Self {
        Self { x, y, color }
    }
}

/// Normalized texture coordinates of a chunk inside its atlas page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

/// A frozen run of same-state vertices produced by compiling a recorded
/// queue. Positions already carry their submission-time transforms.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledBatch {
    pub texture: Option<TextureId>,
    pub blend_mode: BlendMode,
    pub vertices: Vec<GpuVertex>,
}

/// Geometry payload of a draw op.
#[derive(Debug, Clone)]
pub enum Geometry {
    /// Up to four vertices: 2 = line, 3 = triangle, 4 = quad given as
    /// top-left, top-right, bottom-left, bottom-right.
    Primitive {
        vertices: [Vertex; 4],
        count: usize,
        uv: Option<UvRect>,
    },
    /// A compiled macro batch replayed as a unit.
    Compiled(Arc<CompiledBatch>),
}

/// One queued rendering primitive.
#[derive(Debug, Clone)]
pub struct DrawOp {
    pub z: f32,
    pub transform: Transform,
    pub clip_rect: Option<ClipRect>,
    pub blend_mode: BlendMode,
    pub texture: Option<TextureId>,
    pub geometry: Geometry,
}

/// The minimal GPU state tracked while flushing; two ops with equal state
/// can share one vertex batch submission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderState {
    pub texture: Option<TextureId>,
    pub blend_mode: BlendMode,
    pub clip_rect: Option<ClipRect>,
    pub transform: Transform,
}

impl RenderState {
    pub fn of(op: &DrawOp) -> Self {
        Self {
            texture: op.texture,
            blend_mode: op.blend_mode,
            clip_rect: op.clip_rect,
            transform: op.transform,
        }
    }
}

fn gpu_vertex(v: &Vertex, u: f32, t: f32) -> GpuVertex {
    GpuVertex {
        x: v.x,
        y: v.y,
        u,
        v: t,
        color: v.color.to_rgba_bytes(),
    }
}

impl DrawOp {
    /// Append this op's geometry to `out` as triangle-list vertices.
    /// Quads split into two triangles; lines become screen-space thin quads
    /// so every backend can render a pure triangle stream.
    pub fn expand_into(&self, out: &mut Vec<GpuVertex>) {
        match &self.geometry {
            Geometry::Primitive { vertices, count, uv } => match count {
                4 => {
                    let (l, t, r, b) = match uv {
                        Some(rect) => (rect.left, rect.top, rect.right, rect.bottom),
                        None => (0.0, 0.0, 0.0, 0.0),
                    };
                    let tl = gpu_vertex(&vertices[0], l, t);
                    let tr = gpu_vertex(&vertices[1], r, t);
                    let bl = gpu_vertex(&vertices[2], l, b);
                    let br = gpu_vertex(&vertices[3], r, b);
                    out.extend_from_slice(&[tl, tr, bl, bl, tr, br]);
                }
                3 => {
                    out.extend(vertices[..3].iter().map(|v| gpu_vertex(v, 0.0, 0.0)));
                }
                2 => {
                    let (a, b) = (&vertices[0], &vertices[1]);
                    let dx = b.x - a.x;
                    let dy = b.y - a.y;
                    let len = (dx * dx + dy * dy).sqrt();
                    if len == 0.0 {
                        return;
                    }
                    // Half-pixel perpendicular offset.
                    let nx = -dy / len * 0.5;
                    let ny = dx / len * 0.5;
                    let corner = |v: &Vertex, sign: f32| {
                        gpu_vertex(&Vertex::new(v.x + nx * sign, v.y + ny * sign, v.color), 0.0, 0.0)
                    };
                    let a0 = corner(a, 1.0);
                    let a1 = corner(a, -1.0);
                    let b0 = corner(b, 1.0);
                    let b1 = corner(b, -1.0);
                    out.extend_from_slice(&[a0, b0, a1, a1, b0, b1]);
                }
                _ => {}
            },
            Geometry::Compiled(batch) => {
                out.extend_from_slice(&batch.vertices);
            }
        }
    }
}
