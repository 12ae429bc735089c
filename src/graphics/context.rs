//! The `Graphics` façade: pages, queue stack, and the public draw surface.

use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use log::debug;

use crate::graphics::bitmap::{apply_border_flags, Bitmap, ImageFlags};
use crate::graphics::color::Color;
use crate::graphics::draw_op::{BlendMode, Vertex};
use crate::graphics::image_data::{ImageData, LargeImage, LargeTile, MacroImage, TexChunk};
use crate::graphics::queue::{FlushStats, QueueStack};
use crate::graphics::renderer::Renderer;
use crate::graphics::texture::Texture;
use crate::graphics::transform::Transform;
use crate::graphics::GraphicsError;

/// Padding border around every chunk, filled per the border-flag contract.
const CHUNK_PADDING: u32 = 1;

/// Tuning knobs for the atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphicsConfig {
    /// Side length of each texture page. Power of two.
    pub page_size: u32,
    /// Tile side length used when splitting oversized images.
    pub large_tile_size: u32,
}

impl GraphicsConfig {
    pub const fn standard() -> Self {
        Self {
            page_size: 1024,
            large_tile_size: 256,
        }
    }

    pub fn validate(&self) -> Result<(), GraphicsError> {
        if !self.page_size.is_power_of_two() || self.page_size < 64 {
            return Err(GraphicsError::InvalidConfig(format!(
                "page_size must be a power of two >= 64, got {}",
                self.page_size
            )));
        }
        if self.large_tile_size < 16
            || self.large_tile_size + 2 * CHUNK_PADDING > self.page_size
        {
            return Err(GraphicsError::InvalidConfig(format!(
                "large_tile_size {} does not fit a {} page",
                self.large_tile_size, self.page_size
            )));
        }
        Ok(())
    }
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self::standard()
    }
}

/// The rendering context application code talks to.
///
/// Owns the backend, the list of atlas pages (which grows monotonically
/// for the context's lifetime), and the queue stack. All methods assume
/// the single thread owning the backend's graphics context.
pub struct Graphics<R: Renderer> {
    renderer: R,
    config: GraphicsConfig,
    width: u32,
    height: u32,
    pages: Vec<Arc<RwLock<Texture>>>,
    queues: QueueStack,
}

impl<R: Renderer> Graphics<R> {
    /// Create a context targeting a `width` x `height` screen.
    pub fn new(renderer: R, width: u32, height: u32) -> Result<Self, GraphicsError> {
        Self::with_config(renderer, width, height, GraphicsConfig::standard())
    }

    pub fn with_config(
        renderer: R,
        width: u32,
        height: u32,
        config: GraphicsConfig,
    ) -> Result<Self, GraphicsError> {
        config.validate()?;
        Ok(Self {
            renderer,
            config,
            width,
            height,
            pages: Vec::new(),
            queues: QueueStack::new(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    /// Number of atlas pages opened so far.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Turn a bitmap into a drawable image. Small sources land as one
    /// atlas chunk; sources exceeding a page split into a tile grid.
    pub fn create_image(
        &mut self,
        source: &Bitmap,
        flags: ImageFlags,
    ) -> Result<ImageData, GraphicsError> {
        if source.width() == 0 || source.height() == 0 {
            return Err(GraphicsError::EmptyImage);
        }
        let max_inner = self.config.page_size - 2 * CHUNK_PADDING;
        if source.width() <= max_inner && source.height() <= max_inner {
            Ok(ImageData::Chunk(self.alloc_chunk(source, flags)?))
        } else {
            self.create_large_image(source, flags)
        }
    }

    /// Like [`Graphics::create_image`] for a sub-rectangle of `source`.
    pub fn create_image_region(
        &mut self,
        source: &Bitmap,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        flags: ImageFlags,
    ) -> Result<ImageData, GraphicsError> {
        let cropped = source.crop(x, y, width, height)?;
        self.create_image(&cropped, flags)
    }

    // Place one padded bitmap on an existing page, opening a new page when
    // every page is exhausted. Allocator exhaustion never escapes here.
    fn alloc_chunk(
        &mut self,
        source: &Bitmap,
        flags: ImageFlags,
    ) -> Result<TexChunk, GraphicsError> {
        let padded = apply_border_flags(source, flags);
        for page in &self.pages {
            let mut guard = page.write().unwrap();
            if guard.retro() != flags.retro {
                continue;
            }
            if let Some(block) = guard.try_alloc(&mut self.renderer, &padded) {
                drop(guard);
                return Ok(TexChunk::new(Arc::clone(page), block, CHUNK_PADDING));
            }
        }

        let texture = Texture::new(&mut self.renderer, self.config.page_size, flags.retro)?;
        debug!(
            "opened atlas page {} ({}x{})",
            self.pages.len() + 1,
            self.config.page_size,
            self.config.page_size
        );
        let page = Arc::new(RwLock::new(texture));
        self.pages.push(Arc::clone(&page));
        let block = page
            .write()
            .unwrap()
            .try_alloc(&mut self.renderer, &padded)
            .expect("a fresh page fits any size-checked image");
        Ok(TexChunk::new(page, block, CHUNK_PADDING))
    }

    fn create_large_image(
        &mut self,
        source: &Bitmap,
        flags: ImageFlags,
    ) -> Result<ImageData, GraphicsError> {
        let tile_size = self.config.large_tile_size;
        let mut tiles = Vec::new();
        let mut y = 0;
        while y < source.height() {
            let tile_h = tile_size.min(source.height() - y);
            let mut x = 0;
            while x < source.width() {
                let tile_w = tile_size.min(source.width() - x);
                let sub = source.crop(x, y, tile_w, tile_h)?;
                // Interior edges replicate their neighbors' pixels so the
                // seams survive bilinear filtering; outer edges keep the
                // caller's flags.
                let tile_flags = ImageFlags {
                    tileable_left: x > 0 || flags.tileable_left,
                    tileable_top: y > 0 || flags.tileable_top,
                    tileable_right: x + tile_w < source.width() || flags.tileable_right,
                    tileable_bottom: y + tile_h < source.height() || flags.tileable_bottom,
                    retro: flags.retro,
                };
                let chunk = self.alloc_chunk(&sub, tile_flags)?;
                tiles.push(LargeTile { x, y, chunk });
                x += tile_w;
            }
            y += tile_h;
        }
        debug!(
            "split {}x{} image into {} tiles",
            source.width(),
            source.height(),
            tiles.len()
        );
        Ok(ImageData::Large(LargeImage::new(
            source.width(),
            source.height(),
            tiles,
        )))
    }

    /// Queue an axis-aligned solid rectangle.
    pub fn draw_rect(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Color,
        z: f32,
        mode: BlendMode,
    ) {
        let corners = [
            Vertex::new(x, y, color),
            Vertex::new(x + width, y, color),
            Vertex::new(x, y + height, color),
            Vertex::new(x + width, y + height, color),
        ];
        self.draw_quad(corners, z, mode);
    }

    /// Queue an untextured quad. Corners are top-left, top-right,
    /// bottom-left, bottom-right.
    pub fn draw_quad(&mut self, corners: [Vertex; 4], z: f32, mode: BlendMode) {
        self.queues
            .current_mut()
            .add_draw_op(None, None, corners, 4, z, mode);
    }

    /// Queue an untextured triangle.
    pub fn draw_triangle(&mut self, a: Vertex, b: Vertex, c: Vertex, z: f32, mode: BlendMode) {
        self.queues
            .current_mut()
            .add_draw_op(None, None, [a, b, c, c], 3, z, mode);
    }

    /// Queue a one-pixel line.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_line(
        &mut self,
        x1: f32,
        y1: f32,
        color1: Color,
        x2: f32,
        y2: f32,
        color2: Color,
        z: f32,
        mode: BlendMode,
    ) {
        let a = Vertex::new(x1, y1, color1);
        let b = Vertex::new(x2, y2, color2);
        self.queues
            .current_mut()
            .add_draw_op(None, None, [a, b, b, b], 2, z, mode);
    }

    /// Queue an image at `(x, y)`.
    pub fn draw_image(
        &mut self,
        image: &ImageData,
        x: f32,
        y: f32,
        z: f32,
        color: Color,
        mode: BlendMode,
    ) {
        image.draw(self.queues.current_mut(), x, y, z, color, mode);
    }

    /// Queue an image with explicit corners.
    pub fn draw_image_quad(
        &mut self,
        image: &ImageData,
        corners: [Vertex; 4],
        z: f32,
        mode: BlendMode,
    ) -> Result<(), GraphicsError> {
        image.draw_quad(self.queues.current_mut(), corners, z, mode)
    }

    /// Compose `transform` onto the current transform stack.
    pub fn push_transform(&mut self, transform: &Transform) {
        self.queues.current_mut().push_transform(transform);
    }

    pub fn pop_transform(&mut self) -> Result<(), GraphicsError> {
        self.queues.current_mut().pop_transform()
    }

    pub fn begin_clipping(
        &mut self,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    ) -> Result<(), GraphicsError> {
        self.queues.current_mut().begin_clipping(x, y, width, height)
    }

    pub fn end_clipping(&mut self) -> Result<(), GraphicsError> {
        self.queues.current_mut().end_clipping()
    }

    /// Record `body`'s draw calls into an offscreen scope and compile them
    /// into a reusable macro image.
    ///
    /// The recording queue is popped on every exit path: an error or panic
    /// inside `body` discards the queue and leaves the stack intact.
    pub fn record<F>(
        &mut self,
        width: u32,
        height: u32,
        body: F,
    ) -> Result<ImageData, GraphicsError>
    where
        F: FnOnce(&mut Self) -> Result<(), GraphicsError>,
    {
        self.queues.push_recording();
        let outcome = catch_unwind(AssertUnwindSafe(|| body(&mut *self)));
        let recorded = self.queues.pop_recording();
        match outcome {
            Err(payload) => resume_unwind(payload),
            Ok(Err(err)) => Err(err),
            Ok(Ok(())) => {
                let batches = recorded.compile();
                Ok(ImageData::Macro(MacroImage::new(width, height, batches)))
            }
        }
    }

    /// Flush the frame: every queued op reaches the backend in
    /// `(z, submission)` order and the queue starts the next frame empty.
    pub fn flush(&mut self) -> Result<FlushStats, GraphicsError> {
        if self.queues.is_recording() {
            return Err(GraphicsError::FlushWhileRecording);
        }
        self.renderer.begin_frame(self.width, self.height);
        let stats = self.queues.current_mut().perform(&mut self.renderer);
        self.renderer.end_frame();
        Ok(stats)
    }

    /// Read an image's pixels back through the backend.
    pub fn image_to_bitmap(&mut self, image: &ImageData) -> Result<Bitmap, GraphicsError> {
        image.to_bitmap(&mut self.renderer)
    }

    /// Overwrite part of an image's pixels, clipping silently.
    pub fn insert_into_image(
        &mut self,
        image: &ImageData,
        source: &Bitmap,
        x: i32,
        y: i32,
    ) -> Result<(), GraphicsError> {
        image.insert(&mut self.renderer, source, x, y)
    }
}

impl<R: Renderer> Drop for Graphics<R> {
    fn drop(&mut self) {
        for page in &self.pages {
            self.renderer.delete_texture(page.read().unwrap().id());
        }
    }
}
