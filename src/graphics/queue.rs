//! The draw-op queue: ordering, state-change coalescing, and recording.
//!
//! Submissions are stamped with the active transform and clip rect, then
//! ordered by `(z, submission order)`: a stable sort on Z keeps ties in
//! painter's order. Flushing walks the ordered ops once, eliding every
//! redundant state change between adjacent ops so same-state runs collapse
//! into a single vertex batch. Batching never reorders ops.
//!
//! A stack of queues supports macro recording: the screen queue sits at
//! depth 0, and each `record` scope pushes a fresh queue (with its own
//! transform stack) that is later compiled into a frozen vertex snapshot.

use std::sync::Arc;

use log::debug;

use crate::graphics::clip_stack::ClipRectStack;
use crate::graphics::draw_op::{
    BlendMode, CompiledBatch, DrawOp, Geometry, RenderState, UvRect, Vertex,
};
use crate::graphics::renderer::{GpuVertex, Renderer, TextureId};
use crate::graphics::transform::Transform;
use crate::graphics::GraphicsError;

/// Counters from one flush, mostly interesting for batching assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushStats {
    pub ops: usize,
    pub draw_calls: usize,
    pub vertices: usize,
    pub texture_binds: usize,
    pub blend_changes: usize,
    pub clip_changes: usize,
    pub transform_changes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueMode {
    Screen,
    Recording,
}

/// An ordered multiset of draw ops plus the clip/transform context used to
/// stamp new submissions.
#[derive(Debug)]
pub struct DrawOpQueue {
    mode: QueueMode,
    ops: Vec<DrawOp>,
    clip_stack: ClipRectStack,
    transforms: Vec<Transform>,
}

impl DrawOpQueue {
    /// The base queue drawing directly to the screen.
    pub fn screen() -> Self {
        Self::with_mode(QueueMode::Screen)
    }

    /// A nested queue capturing ops for macro compilation.
    pub fn recording() -> Self {
        Self::with_mode(QueueMode::Recording)
    }

    fn with_mode(mode: QueueMode) -> Self {
        Self {
            mode,
            ops: Vec::new(),
            clip_stack: ClipRectStack::new(),
            transforms: vec![Transform::IDENTITY],
        }
    }

    pub fn is_recording(&self) -> bool {
        self.mode == QueueMode::Recording
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The composition of all transforms pushed in this queue's scope.
    pub fn current_transform(&self) -> &Transform {
        self.transforms.last().expect("transform stack is never empty")
    }

    /// Push `transform` composed onto the current top.
    pub fn push_transform(&mut self, transform: &Transform) {
        let composed = transform.concat(self.current_transform());
        self.transforms.push(composed);
    }

    pub fn pop_transform(&mut self) -> Result<(), GraphicsError> {
        if self.transforms.len() <= 1 {
            return Err(GraphicsError::TransformStackUnderflow);
        }
        self.transforms.pop();
        Ok(())
    }

    /// Push a clip rect. Not available while recording, since a macro's
    /// frozen vertex snapshot cannot carry clip state.
    pub fn begin_clipping(&mut self, x: i32, y: i32, width: u32, height: u32) -> Result<(), GraphicsError> {
        if self.is_recording() {
            return Err(GraphicsError::ClipWhileRecording);
        }
        self.clip_stack.begin_clipping(x, y, width, height);
        Ok(())
    }

    pub fn end_clipping(&mut self) -> Result<(), GraphicsError> {
        self.clip_stack.end_clipping()
    }

    pub fn clip_stack(&self) -> &ClipRectStack {
        &self.clip_stack
    }

    /// Queue one primitive, stamping the active transform and effective
    /// clip rect. Submissions inside a fully-clipped scope are dropped
    /// before an op is even constructed.
    pub fn add_draw_op(
        &mut self,
        texture: Option<TextureId>,
        uv: Option<UvRect>,
        vertices: [Vertex; 4],
        count: usize,
        z: f32,
        blend_mode: BlendMode,
    ) {
        if self.clip_stack.is_fully_clipped() {
            return;
        }
        self.ops.push(DrawOp {
            z,
            transform: *self.current_transform(),
            clip_rect: self.clip_stack.effective_rect(),
            blend_mode,
            texture,
            geometry: Geometry::Primitive { vertices, count, uv },
        });
    }

    /// Queue a compiled macro batch for replay.
    pub fn add_compiled_op(&mut self, batch: Arc<CompiledBatch>, z: f32) {
        if self.clip_stack.is_fully_clipped() {
            return;
        }
        self.ops.push(DrawOp {
            z,
            transform: *self.current_transform(),
            clip_rect: self.clip_stack.effective_rect(),
            blend_mode: batch.blend_mode,
            texture: batch.texture,
            geometry: Geometry::Compiled(batch),
        });
    }

    // Stable sort: equal-Z ops keep submission order.
    fn take_ordered_ops(&mut self) -> Vec<DrawOp> {
        let mut ops = std::mem::take(&mut self.ops);
        ops.sort_by(|a, b| a.z.total_cmp(&b.z));
        ops
    }

    /// Flush every queued op to the backend in `(z, submission)` order,
    /// emitting a state-change call only when the next op actually differs
    /// from the current render state. The queue is empty afterwards.
    pub fn perform(&mut self, renderer: &mut dyn Renderer) -> FlushStats {
        let ops = self.take_ordered_ops();
        let mut stats = FlushStats::default();
        let mut state: Option<RenderState> = None;
        let mut batch: Vec<GpuVertex> = Vec::new();

        for op in &ops {
            let next = RenderState::of(op);
            let changed = state.map_or(true, |current| current != next);
            if changed {
                if !batch.is_empty() {
                    renderer.draw_triangles(&batch);
                    stats.draw_calls += 1;
                    stats.vertices += batch.len();
                    batch.clear();
                }
                let current = state.as_ref();
                if current.map_or(true, |s| s.texture != next.texture) {
                    renderer.bind_texture(next.texture);
                    stats.texture_binds += 1;
                }
                if current.map_or(true, |s| s.blend_mode != next.blend_mode) {
                    renderer.set_blend_mode(next.blend_mode);
                    stats.blend_changes += 1;
                }
                if current.map_or(true, |s| s.clip_rect != next.clip_rect) {
                    renderer.set_clip_rect(next.clip_rect);
                    stats.clip_changes += 1;
                }
                if current.map_or(true, |s| s.transform != next.transform) {
                    renderer.set_transform(&next.transform);
                    stats.transform_changes += 1;
                }
                state = Some(next);
            }
            op.expand_into(&mut batch);
            stats.ops += 1;
        }

        if !batch.is_empty() {
            renderer.draw_triangles(&batch);
            stats.draw_calls += 1;
            stats.vertices += batch.len();
        }

        debug!(
            "flushed {} ops as {} draw calls ({} vertices)",
            stats.ops, stats.draw_calls, stats.vertices
        );
        stats
    }

    /// Freeze this queue's ops into static vertex batches. Transforms are
    /// baked into the vertex positions; consecutive ops sharing texture and
    /// blend mode merge into one batch.
    pub fn compile(mut self) -> Vec<Arc<CompiledBatch>> {
        let ops = self.take_ordered_ops();
        let mut batches: Vec<CompiledBatch> = Vec::new();
        let mut expanded: Vec<GpuVertex> = Vec::new();

        for op in &ops {
            expanded.clear();
            op.expand_into(&mut expanded);
            for vertex in &mut expanded {
                let (x, y) = op.transform.apply(vertex.x, vertex.y);
                vertex.x = x;
                vertex.y = y;
            }
            match batches.last_mut() {
                Some(last) if last.texture == op.texture && last.blend_mode == op.blend_mode => {
                    last.vertices.extend_from_slice(&expanded);
                }
                _ => batches.push(CompiledBatch {
                    texture: op.texture,
                    blend_mode: op.blend_mode,
                    vertices: expanded.clone(),
                }),
            }
        }

        batches.into_iter().map(Arc::new).collect()
    }
}

/// The queue stack: screen queue at the bottom, one recording queue per
/// active `record` scope above it.
#[derive(Debug)]
pub struct QueueStack {
    queues: Vec<DrawOpQueue>,
}

impl QueueStack {
    pub fn new() -> Self {
        Self {
            queues: vec![DrawOpQueue::screen()],
        }
    }

    pub fn depth(&self) -> usize {
        self.queues.len()
    }

    pub fn is_recording(&self) -> bool {
        self.queues.len() > 1
    }

    pub fn current(&self) -> &DrawOpQueue {
        self.queues.last().expect("queue stack is never empty")
    }

    pub fn current_mut(&mut self) -> &mut DrawOpQueue {
        self.queues.last_mut().expect("queue stack is never empty")
    }

    pub fn push_recording(&mut self) {
        self.queues.push(DrawOpQueue::recording());
    }

    /// Pop the innermost recording queue. Calling this with no recording
    /// active is a bug in the caller, not a runtime condition.
    pub fn pop_recording(&mut self) -> DrawOpQueue {
        assert!(self.queues.len() > 1, "no recording queue to pop");
        self.queues.pop().expect("queue stack is never empty")
    }
}

impl Default for QueueStack {
    fn default() -> Self {
        Self::new()
    }
}
