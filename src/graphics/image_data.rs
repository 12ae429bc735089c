//! Drawable images: atlas chunks, tiled large images, compiled macros.
//!
//! The drawable kinds are a closed set, so flush and dispatch code can
//! match exhaustively:
//! - `TexChunk`: a live allocation inside one atlas page
//! - `LargeImage`: a grid of chunks for sources bigger than a page
//! - `MacroImage`: a frozen vertex snapshot compiled from a recording

use std::sync::{Arc, RwLock};

use crate::graphics::bitmap::Bitmap;
use crate::graphics::block_alloc::Block;
use crate::graphics::color::Color;
use crate::graphics::draw_op::{BlendMode, CompiledBatch, UvRect, Vertex};
use crate::graphics::queue::DrawOpQueue;
use crate::graphics::renderer::{Renderer, TextureId};
use crate::graphics::texture::Texture;
use crate::graphics::transform::Transform;
use crate::graphics::GraphicsError;

/// A handle to a live allocation inside an atlas page.
///
/// The chunk shares ownership of its page, so the page outlives every
/// chunk referencing it. Only owning chunks return their block to the
/// allocator on drop; subimage handles borrow the same region without
/// owning it.
#[derive(Debug)]
pub struct TexChunk {
    texture: Arc<RwLock<Texture>>,
    texture_id: TextureId,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    uv: UvRect,
    owned_block: Option<Block>,
}

impl TexChunk {
    /// Wrap a freshly allocated padded block. The chunk's visible rect is
    /// the block inset by `padding` on every side.
    pub(crate) fn new(texture: Arc<RwLock<Texture>>, block: Block, padding: u32) -> Self {
        let x = block.left + padding;
        let y = block.top + padding;
        let width = block.width - 2 * padding;
        let height = block.height - 2 * padding;
        let (texture_id, uv) = {
            let page = texture.read().unwrap();
            (page.id(), page.uv_rect(x, y, width, height))
        };
        Self {
            texture,
            texture_id,
            x,
            y,
            width,
            height,
            uv,
            owned_block: Some(block),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn texture(&self) -> &Arc<RwLock<Texture>> {
        &self.texture
    }

    /// Queue this chunk as a textured quad. Corners are given as top-left,
    /// top-right, bottom-left, bottom-right.
    pub fn draw_quad(&self, queue: &mut DrawOpQueue, corners: [Vertex; 4], z: f32, mode: BlendMode) {
        queue.add_draw_op(Some(self.texture_id), Some(self.uv), corners, 4, z, mode);
    }

    /// Re-upload `source` into this chunk at `(x, y)`. Pixels falling
    /// outside the chunk are silently dropped; the chunk never grows.
    pub fn insert(
        &self,
        renderer: &mut dyn Renderer,
        source: &Bitmap,
        x: i32,
        y: i32,
    ) -> Result<(), GraphicsError> {
        let src_x = (-x).max(0) as u32;
        let src_y = (-y).max(0) as u32;
        let dst_x = x.max(0) as u32;
        let dst_y = y.max(0) as u32;
        if src_x >= source.width()
            || src_y >= source.height()
            || dst_x >= self.width
            || dst_y >= self.height
        {
            return Ok(());
        }
        let copy_w = (source.width() - src_x).min(self.width - dst_x);
        let copy_h = (source.height() - src_y).min(self.height - dst_y);
        let sub = source.crop(src_x, src_y, copy_w, copy_h)?;
        renderer.upload(self.texture_id, self.x + dst_x, self.y + dst_y, &sub);
        Ok(())
    }

    /// Read this chunk's pixels back from the page.
    pub fn to_bitmap(&self, renderer: &mut dyn Renderer) -> Result<Bitmap, GraphicsError> {
        self.texture
            .read()
            .unwrap()
            .to_bitmap(renderer, self.x, self.y, self.width, self.height)
    }

    /// A narrower view of the same allocation. Shares the page, performs
    /// no new GPU allocation, and does not own the underlying block; the
    /// region is only valid while the parent chunk is alive.
    pub fn subimage(&self, x: u32, y: u32, width: u32, height: u32) -> Option<TexChunk> {
        if x + width > self.width || y + height > self.height || width == 0 || height == 0 {
            return None;
        }
        let abs_x = self.x + x;
        let abs_y = self.y + y;
        let uv = self.texture.read().unwrap().uv_rect(abs_x, abs_y, width, height);
        Some(TexChunk {
            texture: Arc::clone(&self.texture),
            texture_id: self.texture_id,
            x: abs_x,
            y: abs_y,
            width,
            height,
            uv,
            owned_block: None,
        })
    }
}

impl Drop for TexChunk {
    fn drop(&mut self) {
        if let Some(block) = self.owned_block.take() {
            self.texture.write().unwrap().free_block(&block);
        }
    }
}

/// One grid cell of a [`LargeImage`], positioned in source pixel space.
#[derive(Debug)]
pub struct LargeTile {
    pub x: u32,
    pub y: u32,
    pub chunk: TexChunk,
}

/// A source bitmap too big for one page, split into a grid of chunks.
#[derive(Debug)]
pub struct LargeImage {
    width: u32,
    height: u32,
    tiles: Vec<LargeTile>,
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn bilerp_vertex(corners: &[Vertex; 4], u: f32, v: f32) -> Vertex {
    let top = Vertex::new(
        lerp(corners[0].x, corners[1].x, u),
        lerp(corners[0].y, corners[1].y, u),
        corners[0].color.interpolate(corners[1].color, f64::from(u)),
    );
    let bottom = Vertex::new(
        lerp(corners[2].x, corners[3].x, u),
        lerp(corners[2].y, corners[3].y, u),
        corners[2].color.interpolate(corners[3].color, f64::from(u)),
    );
    Vertex::new(
        lerp(top.x, bottom.x, v),
        lerp(top.y, bottom.y, v),
        top.color.interpolate(bottom.color, f64::from(v)),
    )
}

impl LargeImage {
    pub(crate) fn new(width: u32, height: u32, tiles: Vec<LargeTile>) -> Self {
        Self { width, height, tiles }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Queue one op per tile, interpolating the quad's vertices and colors
    /// so the grid renders as a single continuous image.
    pub fn draw_quad(&self, queue: &mut DrawOpQueue, corners: [Vertex; 4], z: f32, mode: BlendMode) {
        let w = self.width as f32;
        let h = self.height as f32;
        for tile in &self.tiles {
            let u0 = tile.x as f32 / w;
            let u1 = (tile.x + tile.chunk.width()) as f32 / w;
            let v0 = tile.y as f32 / h;
            let v1 = (tile.y + tile.chunk.height()) as f32 / h;
            let tile_corners = [
                bilerp_vertex(&corners, u0, v0),
                bilerp_vertex(&corners, u1, v0),
                bilerp_vertex(&corners, u0, v1),
                bilerp_vertex(&corners, u1, v1),
            ];
            tile.chunk.draw_quad(queue, tile_corners, z, mode);
        }
    }

    /// Route an insert to every tile it touches, each clipping locally.
    pub fn insert(
        &self,
        renderer: &mut dyn Renderer,
        source: &Bitmap,
        x: i32,
        y: i32,
    ) -> Result<(), GraphicsError> {
        for tile in &self.tiles {
            tile.chunk
                .insert(renderer, source, x - tile.x as i32, y - tile.y as i32)?;
        }
        Ok(())
    }

    /// Reassemble the full image from its tiles.
    pub fn to_bitmap(&self, renderer: &mut dyn Renderer) -> Result<Bitmap, GraphicsError> {
        let mut out = Bitmap::new(self.width, self.height);
        for tile in &self.tiles {
            let pixels = tile.chunk.to_bitmap(renderer)?;
            out.insert(&pixels, tile.x as i32, tile.y as i32);
        }
        Ok(out)
    }
}

/// A recording compiled into static vertex batches.
///
/// The internal ordering was frozen at compile time: the macro can be
/// replayed or read back, but not mutated or re-layered.
#[derive(Debug, Clone)]
pub struct MacroImage {
    width: u32,
    height: u32,
    batches: Vec<Arc<CompiledBatch>>,
}

impl MacroImage {
    pub(crate) fn new(width: u32, height: u32, batches: Vec<Arc<CompiledBatch>>) -> Self {
        Self { width, height, batches }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Replay the snapshot under the queue's current transform, all
    /// batches at one Z.
    pub fn draw(&self, queue: &mut DrawOpQueue, z: f32) {
        for batch in &self.batches {
            queue.add_compiled_op(Arc::clone(batch), z);
        }
    }

    /// Render the snapshot into an offscreen target and read it back.
    pub fn to_bitmap(&self, renderer: &mut dyn Renderer) -> Result<Bitmap, GraphicsError> {
        renderer.begin_offscreen(self.width, self.height)?;
        renderer.set_transform(&Transform::IDENTITY);
        renderer.set_clip_rect(None);
        for batch in &self.batches {
            renderer.bind_texture(batch.texture);
            renderer.set_blend_mode(batch.blend_mode);
            renderer.draw_triangles(&batch.vertices);
        }
        Ok(renderer.end_offscreen())
    }
}

/// The public drawable: every image the application holds is one of these.
#[derive(Debug)]
pub enum ImageData {
    Chunk(TexChunk),
    Large(LargeImage),
    Macro(MacroImage),
}

impl ImageData {
    pub fn width(&self) -> u32 {
        match self {
            ImageData::Chunk(chunk) => chunk.width(),
            ImageData::Large(large) => large.width(),
            ImageData::Macro(mac) => mac.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            ImageData::Chunk(chunk) => chunk.height(),
            ImageData::Large(large) => large.height(),
            ImageData::Macro(mac) => mac.height(),
        }
    }

    /// Queue this image at `(x, y)` with a modulation color. Macros replay
    /// their frozen batches and ignore the modulation color.
    pub fn draw(
        &self,
        queue: &mut DrawOpQueue,
        x: f32,
        y: f32,
        z: f32,
        color: Color,
        mode: BlendMode,
    ) {
        match self {
            ImageData::Chunk(_) | ImageData::Large(_) => {
                let w = self.width() as f32;
                let h = self.height() as f32;
                let corners = [
                    Vertex::new(x, y, color),
                    Vertex::new(x + w, y, color),
                    Vertex::new(x, y + h, color),
                    Vertex::new(x + w, y + h, color),
                ];
                // Infallible for these variants.
                let _ = self.draw_quad(queue, corners, z, mode);
            }
            ImageData::Macro(mac) => {
                queue.push_transform(&Transform::translate(x, y));
                mac.draw(queue, z);
                queue.pop_transform().expect("transform pushed above");
            }
        }
    }

    /// Queue this image with explicit corners (top-left, top-right,
    /// bottom-left, bottom-right). Not supported for compiled macros,
    /// whose geometry is frozen.
    pub fn draw_quad(
        &self,
        queue: &mut DrawOpQueue,
        corners: [Vertex; 4],
        z: f32,
        mode: BlendMode,
    ) -> Result<(), GraphicsError> {
        match self {
            ImageData::Chunk(chunk) => {
                chunk.draw_quad(queue, corners, z, mode);
                Ok(())
            }
            ImageData::Large(large) => {
                large.draw_quad(queue, corners, z, mode);
                Ok(())
            }
            ImageData::Macro(_) => Err(GraphicsError::FrozenMacro),
        }
    }

    /// Overwrite part of the image's pixels. Out-of-bounds regions clip
    /// silently; inserting into a compiled macro is a logic error.
    pub fn insert(
        &self,
        renderer: &mut dyn Renderer,
        source: &Bitmap,
        x: i32,
        y: i32,
    ) -> Result<(), GraphicsError> {
        match self {
            ImageData::Chunk(chunk) => chunk.insert(renderer, source, x, y),
            ImageData::Large(large) => large.insert(renderer, source, x, y),
            ImageData::Macro(_) => Err(GraphicsError::FrozenMacro),
        }
    }

    /// Read the image's pixels back.
    pub fn to_bitmap(&self, renderer: &mut dyn Renderer) -> Result<Bitmap, GraphicsError> {
        match self {
            ImageData::Chunk(chunk) => chunk.to_bitmap(renderer),
            ImageData::Large(large) => large.to_bitmap(renderer),
            ImageData::Macro(mac) => mac.to_bitmap(renderer),
        }
    }

    /// A view of a sub-rectangle sharing the same texture. `None` for
    /// variants that cannot share their storage.
    pub fn subimage(&self, x: u32, y: u32, width: u32, height: u32) -> Option<ImageData> {
        match self {
            ImageData::Chunk(chunk) => chunk.subimage(x, y, width, height).map(ImageData::Chunk),
            ImageData::Large(_) | ImageData::Macro(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::bitmap::{apply_border_flags, ImageFlags};
    use crate::graphics::software::SoftwareRenderer;

    fn make_chunk(renderer: &mut SoftwareRenderer, bitmap: &Bitmap) -> TexChunk {
        let texture = Arc::new(RwLock::new(Texture::new(renderer, 64, false).unwrap()));
        let padded = apply_border_flags(bitmap, ImageFlags::NONE);
        let block = texture.write().unwrap().try_alloc(renderer, &padded).unwrap();
        TexChunk::new(texture, block, 1)
    }

    #[test]
    fn chunk_reports_unpadded_size() {
        let mut renderer = SoftwareRenderer::new(8, 8);
        let chunk = make_chunk(&mut renderer, &Bitmap::filled(10, 6, Color::RED));
        assert_eq!(chunk.width(), 10);
        assert_eq!(chunk.height(), 6);
    }

    #[test]
    fn chunk_to_bitmap_excludes_padding() {
        let mut renderer = SoftwareRenderer::new(8, 8);
        let chunk = make_chunk(&mut renderer, &Bitmap::filled(3, 3, Color::GREEN));
        let read = chunk.to_bitmap(&mut renderer).unwrap();
        assert_eq!(read.width(), 3);
        assert!(read.pixels().iter().all(|&p| p == Color::GREEN));
    }

    #[test]
    fn dropping_chunk_frees_its_block() {
        let mut renderer = SoftwareRenderer::new(8, 8);
        let chunk = make_chunk(&mut renderer, &Bitmap::filled(4, 4, Color::RED));
        let texture = Arc::clone(chunk.texture());
        assert_eq!(texture.read().unwrap().num_chunks(), 1);
        drop(chunk);
        assert_eq!(texture.read().unwrap().num_chunks(), 0);
    }

    #[test]
    fn subimage_shares_without_owning() {
        let mut renderer = SoftwareRenderer::new(8, 8);
        let chunk = make_chunk(&mut renderer, &Bitmap::filled(8, 8, Color::BLUE));
        let texture = Arc::clone(chunk.texture());

        let sub = chunk.subimage(2, 2, 4, 4).unwrap();
        assert_eq!(sub.width(), 4);
        drop(sub);
        // The parent's block is still allocated.
        assert_eq!(texture.read().unwrap().num_chunks(), 1);
    }

    #[test]
    fn subimage_rejects_out_of_bounds() {
        let mut renderer = SoftwareRenderer::new(8, 8);
        let chunk = make_chunk(&mut renderer, &Bitmap::filled(8, 8, Color::BLUE));
        assert!(chunk.subimage(4, 4, 8, 8).is_none());
        assert!(chunk.subimage(0, 0, 0, 4).is_none());
    }

    #[test]
    fn subimage_reads_its_region() {
        let mut renderer = SoftwareRenderer::new(8, 8);
        let mut bitmap = Bitmap::filled(4, 4, Color::RED);
        bitmap.set_pixel(3, 3, Color::BLUE);
        let chunk = make_chunk(&mut renderer, &bitmap);

        let sub = chunk.subimage(3, 3, 1, 1).unwrap();
        let read = sub.to_bitmap(&mut renderer).unwrap();
        assert_eq!(read.pixel(0, 0), Color::BLUE);
    }

    #[test]
    fn insert_negative_offset_clips() {
        let mut renderer = SoftwareRenderer::new(8, 8);
        let chunk = make_chunk(&mut renderer, &Bitmap::filled(10, 10, Color::BLACK));
        let patch = Bitmap::filled(10, 10, Color::RED);
        chunk.insert(&mut renderer, &patch, -5, -5).unwrap();

        let read = chunk.to_bitmap(&mut renderer).unwrap();
        // Only the top-left 5x5 quadrant received the patch's pixels.
        assert_eq!(read.pixel(0, 0), Color::RED);
        assert_eq!(read.pixel(4, 4), Color::RED);
        assert_eq!(read.pixel(5, 5), Color::BLACK);
        assert_eq!(read.pixel(9, 9), Color::BLACK);
    }

    #[test]
    fn insert_fully_outside_is_noop() {
        let mut renderer = SoftwareRenderer::new(8, 8);
        let chunk = make_chunk(&mut renderer, &Bitmap::filled(4, 4, Color::BLACK));
        let patch = Bitmap::filled(2, 2, Color::RED);
        chunk.insert(&mut renderer, &patch, 100, 100).unwrap();
        chunk.insert(&mut renderer, &patch, -100, -100).unwrap();
        let read = chunk.to_bitmap(&mut renderer).unwrap();
        assert!(read.pixels().iter().all(|&p| p == Color::BLACK));
    }

    #[test]
    fn macro_insert_is_a_logic_error() {
        let mac = ImageData::Macro(MacroImage::new(4, 4, Vec::new()));
        let mut renderer = SoftwareRenderer::new(8, 8);
        let patch = Bitmap::filled(2, 2, Color::RED);
        assert!(matches!(
            mac.insert(&mut renderer, &patch, 0, 0),
            Err(GraphicsError::FrozenMacro)
        ));
    }

    #[test]
    fn macro_draw_quad_is_a_logic_error() {
        let mac = ImageData::Macro(MacroImage::new(4, 4, Vec::new()));
        let mut queue = DrawOpQueue::screen();
        let corners = [Vertex::new(0.0, 0.0, Color::WHITE); 4];
        assert!(matches!(
            mac.draw_quad(&mut queue, corners, 0.0, BlendMode::Alpha),
            Err(GraphicsError::FrozenMacro)
        ));
    }

    #[test]
    fn empty_macro_reads_back_transparent() {
        let mac = MacroImage::new(5, 7, Vec::new());
        let mut renderer = SoftwareRenderer::new(8, 8);
        let bitmap = mac.to_bitmap(&mut renderer).unwrap();
        assert_eq!(bitmap.width(), 5);
        assert_eq!(bitmap.height(), 7);
        assert!(bitmap.pixels().iter().all(|&p| p == Color::NONE));
    }

    #[test]
    fn macro_subimage_unsupported() {
        let mac = ImageData::Macro(MacroImage::new(4, 4, Vec::new()));
        assert!(mac.subimage(0, 0, 2, 2).is_none());
    }

    #[test]
    fn bilerp_hits_corners_and_center() {
        let corners = [
            Vertex::new(0.0, 0.0, Color::BLACK),
            Vertex::new(10.0, 0.0, Color::BLACK),
            Vertex::new(0.0, 10.0, Color::WHITE),
            Vertex::new(10.0, 10.0, Color::WHITE),
        ];
        let tl = bilerp_vertex(&corners, 0.0, 0.0);
        assert_eq!((tl.x, tl.y), (0.0, 0.0));
        let center = bilerp_vertex(&corners, 0.5, 0.5);
        assert_eq!((center.x, center.y), (5.0, 5.0));
        assert_eq!(center.color.red(), 128);
    }
}
