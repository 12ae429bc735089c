//! tessera: a 2D rendering core for games.
//!
//! Application bitmaps are packed into shared GPU texture pages; draw
//! calls are deferred into a clip-aware queue ordered by Z and submission
//! time, then flushed to a pluggable backend with as few state changes as
//! possible. Recordings compile into reusable macro images.
//!
//! The core is single-threaded by design: all submission and flushing
//! happens on the thread owning the graphics context.

pub mod graphics;

pub use graphics::{
    apply_border_flags, Bitmap, BlendMode, ImageFlags, Color, DrawOpQueue, FlushStats, GlRenderer,
    Graphics, GraphicsConfig, GraphicsError, ImageData, Renderer, SoftwareRenderer, Transform,
    Vertex,
};
