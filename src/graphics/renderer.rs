//! The abstract GPU binding.
//!
//! The rendering core never talks to a graphics API directly; it emits the
//! state/batch sequence below and a backend adapter realizes it. Two
//! adapters ship in-tree: [`crate::graphics::software::SoftwareRenderer`]
//! (reference rasterizer, used by the tests) and
//! [`crate::graphics::opengl::GlRenderer`] (desktop OpenGL).

use crate::graphics::bitmap::Bitmap;
use crate::graphics::clip_stack::ClipRect;
use crate::graphics::draw_op::BlendMode;
use crate::graphics::transform::Transform;
use crate::graphics::GraphicsError;

/// Opaque handle to one backend texture page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// One vertex as submitted to the backend, in pixel coordinates with
/// normalized UVs and RGBA color bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct GpuVertex {
    pub x: f32,
    pub y: f32,
    pub u: f32,
    pub v: f32,
    pub color: [u8; 4],
}

/// Backend adapter contract.
///
/// All calls assume a single current graphics context on the calling
/// thread; implementations perform no internal synchronization. State
/// setters are sticky until changed, and `draw_triangles` consumes the
/// current state. Vertex batches are pure triangle lists.
pub trait Renderer {
    /// Create a square texture page. `retro` selects nearest-neighbor
    /// filtering. Failure here is fatal to the caller.
    fn create_texture(&mut self, size: u32, retro: bool) -> Result<TextureId, GraphicsError>;

    fn delete_texture(&mut self, id: TextureId);

    /// Upload pixels into a sub-rectangle of a page.
    fn upload(&mut self, id: TextureId, x: u32, y: u32, pixels: &Bitmap);

    /// Read back a whole page. Expensive; off the hot path only.
    fn read_texture(&mut self, id: TextureId) -> Bitmap;

    /// Start a frame targeting a `width` x `height` screen.
    fn begin_frame(&mut self, width: u32, height: u32);

    fn end_frame(&mut self);

    fn bind_texture(&mut self, id: Option<TextureId>);

    fn set_blend_mode(&mut self, mode: BlendMode);

    /// `None` disables clipping.
    fn set_clip_rect(&mut self, clip: Option<ClipRect>);

    fn set_transform(&mut self, transform: &Transform);

    /// Submit a triangle list under the current state.
    fn draw_triangles(&mut self, vertices: &[GpuVertex]);

    /// Redirect drawing into a fresh transparent `width` x `height` target.
    fn begin_offscreen(&mut self, width: u32, height: u32) -> Result<(), GraphicsError>;

    /// Finish offscreen rendering and return the rendered pixels.
    fn end_offscreen(&mut self) -> Bitmap;
}
