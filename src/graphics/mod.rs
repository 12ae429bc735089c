//! 2D rendering core: texture atlas, Z-ordered draw-op batching, and
//! macro recording.
//!
//! Key concepts:
//! - Color / Bitmap: packed ARGB pixels and owned pixel grids
//! - BlockAllocator / Texture: bin-packed atlas pages
//! - TexChunk / LargeImage / MacroImage: the closed drawable set
//! - DrawOpQueue / QueueStack: Z-ordered, clip-aware deferred drawing
//! - Graphics: the façade owning pages, queues, and the backend

pub mod bitmap;
pub mod block_alloc;
pub mod clip_stack;
pub mod color;
pub mod context;
pub mod draw_op;
pub mod image_data;
pub mod opengl;
pub mod queue;
pub mod renderer;
pub mod software;
pub mod texture;
pub mod transform;

pub use bitmap::{apply_border_flags, Bitmap, ImageFlags};
pub use block_alloc::{Block, BlockAllocator};
pub use clip_stack::{ClipRect, ClipRectStack};
pub use color::Color;
pub use context::{Graphics, GraphicsConfig};
pub use draw_op::{BlendMode, DrawOp, UvRect, Vertex};
pub use image_data::{ImageData, LargeImage, MacroImage, TexChunk};
pub use opengl::GlRenderer;
pub use queue::{DrawOpQueue, FlushStats, QueueStack};
pub use renderer::{GpuVertex, Renderer, TextureId};
pub use software::SoftwareRenderer;
pub use texture::Texture;
pub use transform::Transform;

/// Errors surfaced by the rendering core.
///
/// Environment failures (texture/backend creation) are fatal to the
/// subsystem; the remaining variants flag logic errors in the embedding
/// application and are meant to fail loudly rather than corrupt ordering
/// state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphicsError {
    #[error("invalid graphics configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to create a {size}x{size} texture page: {reason}")]
    TextureCreation { size: u32, reason: String },

    #[error("graphics backend error: {0}")]
    Backend(String),

    #[error("end_clipping called with no active clip region")]
    ClipStackUnderflow,

    #[error("pop_transform called with no pushed transform")]
    TransformStackUnderflow,

    #[error("clipping is not available while recording a macro")]
    ClipWhileRecording,

    #[error("flush is not available while recording a macro")]
    FlushWhileRecording,

    #[error("operation not supported on a compiled macro")]
    FrozenMacro,

    #[error("image dimensions must be non-zero")]
    EmptyImage,

    #[error("source rectangle ({x}, {y}) {width}x{height} is out of bounds")]
    SourceOutOfBounds { x: u32, y: u32, width: u32, height: u32 },
}
